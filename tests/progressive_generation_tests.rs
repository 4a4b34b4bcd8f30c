use async_trait::async_trait;
use chrono::NaiveDate;
use meal_planner::api_connection::{ApiConnectionError, ChatCompletionRequest, ChatCompletionResponse, CompletionClient};
use meal_planner::handlers::{self, CallableRequest};
use meal_planner::models::Slot;
use meal_planner::planning::{MealPlanner, PlannerSettings};
use meal_planner::search::{RecipeChunk, RecipeRetriever, RecipeSearch};
use meal_planner::store::{plan_path, weekly_plan_path, DocPath, DocumentStore, DocumentWrite, MemoryDocumentStore};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Answers completion calls from a queue of canned contents.
struct CannedCompletion {
    replies: Mutex<VecDeque<Result<Value, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl CannedCompletion {
    fn new(replies: Vec<Result<Value, &str>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(|r| r.map_err(str::to_string)).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for CannedCompletion {
    async fn call_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ApiConnectionError> {
        if let Some(message) = request.messages.last() {
            self.prompts.lock().unwrap().push(message.content.clone());
        }
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("script exhausted".to_string()));
        match reply {
            Ok(content) => Ok(serde_json::from_value(json!({
                "id": "chatcmpl-it",
                "created": 0,
                "model": "it",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": content.to_string()}}]
            }))?),
            Err(error_body) => Err(ApiConnectionError::ApiError {
                status: reqwest::StatusCode::BAD_GATEWAY,
                error_body,
            }),
        }
    }
}

struct UnreachableIndex;

#[async_trait]
impl RecipeSearch for UnreachableIndex {
    async fn similarity_search(&self, _query: &str, _k: usize) -> anyhow::Result<Vec<RecipeChunk>> {
        anyhow::bail!("index server unreachable")
    }
}

fn options(prefix: &str) -> Value {
    let items: Vec<Value> = (1..=3)
        .map(|i| {
            json!({
                "name": format!("{} {}", prefix, i),
                "description": "A weeknight favourite",
                "calories": 480,
                "macros": {"calories": 480, "protein": 24, "carbs": 61, "fats": 14.6},
                "ingredients": ["chickpeas", "spinach"],
                "instructions": ["simmer", "serve"]
            })
        })
        .collect();
    json!({ "items": items })
}

fn settings() -> PlannerSettings {
    PlannerSettings {
        today: NaiveDate::from_ymd_opt(2024, 3, 10),
        ..PlannerSettings::default()
    }
}

fn payload(date: &str) -> Value {
    json!({
        "dietPreference": "Vegan",
        "preferences": {"cuisine": "Indian", "custom": "no mushrooms"},
        "macros": {"calories": 2000, "protein": 100, "carbs": 250, "fats": 60},
        "progressive": true,
        "dateId": date
    })
}

#[tokio::test]
async fn progressive_plan_is_persisted_slot_by_slot() {
    let completion = CannedCompletion::new(Slot::ALL.iter().map(|s| Ok(options(s.as_str()))).collect());
    let store = Arc::new(MemoryDocumentStore::new());
    let planner = MealPlanner::new(completion.clone(), store.clone(), settings());

    let response = handlers::generate_meal_plan(&planner, &CallableRequest::new(Some("alice"), payload("2024-03-11"))).await;
    assert_eq!(response, json!({"status": "started", "mode": "progressive"}));

    let doc = store.snapshot(&plan_path("alice", "2024-03-11")).await.unwrap();
    assert_eq!(doc["status"], "ready");
    assert_eq!(doc["selected"], json!({}));
    for slot in Slot::ALL {
        assert_eq!(doc[slot.as_str()].as_array().unwrap().len(), 3);
    }
    // Fractional macros are rounded when read back from the model.
    assert_eq!(doc["lunch"][0]["macros"]["fats"], 15);

    let prompts = completion.prompts();
    assert!(prompts[0].contains("Calories: 500 kcal"));
    assert!(prompts[0].contains("Protein: 25 g"));
    assert!(prompts[0].contains("Carbs: 63 g"));
    assert!(prompts[0].contains("Fats: 15 g"));
}

#[tokio::test]
async fn failing_dinner_leaves_earlier_slots_and_marks_error() {
    let completion = CannedCompletion::new(vec![
        Ok(options("breakfast")),
        Ok(options("lunch")),
        Err("model overloaded"),
    ]);
    let store = Arc::new(MemoryDocumentStore::new());
    let planner = MealPlanner::new(completion.clone(), store.clone(), settings());

    let response = handlers::generate_meal_plan(&planner, &CallableRequest::new(Some("alice"), payload("2024-03-11"))).await;
    assert_eq!(response["error"], "Failed generating dinner");

    let doc = store.snapshot(&plan_path("alice", "2024-03-11")).await.unwrap();
    assert_eq!(doc["status"], "error");
    assert!(doc["error"].as_str().unwrap().contains("model overloaded"));
    assert_eq!(doc["breakfast"][2]["name"], "breakfast 3");
    assert_eq!(doc["lunch"][0]["name"], "lunch 1");
    assert_eq!(doc["dinner"], json!([]));
    assert_eq!(doc["snack"], json!([]));
    assert_eq!(completion.prompts().len(), 3);
}

#[tokio::test]
async fn history_feeds_the_avoid_list() {
    let store = Arc::new(MemoryDocumentStore::new());
    store
        .set(
            &plan_path("alice", "2024-03-08"),
            DocumentWrite::new().field("breakfast", json!([{"name": "Masala Oats"}])),
        )
        .await
        .unwrap();
    let completion = CannedCompletion::new(Slot::ALL.iter().map(|s| Ok(options(s.as_str()))).collect());
    let planner = MealPlanner::new(completion.clone(), store, settings());

    handlers::generate_meal_plan(&planner, &CallableRequest::new(Some("alice"), payload("2024-03-11"))).await;
    assert!(completion.prompts()[0].contains("Masala Oats"));
}

#[tokio::test]
async fn grounded_run_degrades_when_retrieval_fails() {
    let completion = CannedCompletion::new(Slot::ALL.iter().map(|s| Ok(options(s.as_str()))).collect());
    let store = Arc::new(MemoryDocumentStore::new());
    let planner = MealPlanner::new(completion.clone(), store.clone(), settings())
        .with_retriever(RecipeRetriever::new(Arc::new(UnreachableIndex)));

    let response =
        handlers::generate_meal_plan_rag(&planner, &CallableRequest::new(Some("alice"), payload("2024-03-11"))).await;
    assert_eq!(response, json!({"status": "started", "mode": "progressive_rag"}));

    let doc = store.snapshot(&plan_path("alice", "2024-03-11")).await.unwrap();
    assert_eq!(doc["status"], "ready");
    assert_eq!(completion.prompts().len(), 4);
}

#[tokio::test]
async fn unavailable_plan_document_is_a_store_error() {
    let completion = CannedCompletion::new(Vec::new());
    let store = Arc::new(MemoryDocumentStore::new());
    store.make_unavailable(plan_path("alice", "2024-03-11")).await;
    let planner = MealPlanner::new(completion.clone(), store, settings());

    let response = handlers::generate_meal_plan(&planner, &CallableRequest::new(Some("alice"), payload("2024-03-11"))).await;
    assert!(response["error"].is_string());
    assert!(completion.prompts().is_empty());
}

#[tokio::test]
async fn grocery_list_round_trip() {
    let store = Arc::new(MemoryDocumentStore::new());
    let week = weekly_plan_path("alice", "2024-W11");
    store
        .set(
            &week,
            DocumentWrite::new().field(
                "days",
                json!({"2024-03-11": {"meals": {"dinner": {"name": "Chana Masala", "tags": ["Vegan"]}}}}),
            ),
        )
        .await
        .unwrap();
    let completion = CannedCompletion::new(vec![Ok(json!({
        "items": [{"name": "Chickpeas", "quantity": "2 cans", "category": "Pantry"}],
        "notes": []
    }))]);
    let planner = MealPlanner::new(completion.clone(), store.clone(), settings());

    let response =
        handlers::generate_grocery_list(&planner, &CallableRequest::new(Some("alice"), json!({"weekId": "2024-W11"})))
            .await;
    assert_eq!(response["items"][0]["name"], "Chickpeas");
    assert!(completion.prompts()[0].contains("Chana Masala"));

    let doc = store.get(&week).await.unwrap().unwrap();
    assert_eq!(doc["groceryStatus"], "ready");
    assert_eq!(doc["days"]["2024-03-11"]["meals"]["dinner"]["name"], "Chana Masala");
}

#[tokio::test]
async fn macros_are_rounded_integers() {
    let completion = CannedCompletion::new(vec![Ok(json!({
        "calories": 2199.6, "protein": 120.4, "carbs": 250, "fats": 70.5
    }))]);
    let planner = MealPlanner::new(completion, Arc::new(MemoryDocumentStore::new()), settings());
    let response = handlers::generate_macros(
        &planner,
        &CallableRequest::new(
            None,
            json!({
                "dateOfBirth": "1990-05-01",
                "weightKg": 70,
                "heightCm": 175,
                "gender": "female",
                "activityLevel": "moderate",
                "goal": "maintain",
                "dietPreference": "Vegan"
            }),
        ),
    )
    .await;
    assert_eq!(response, json!({"calories": 2200, "protein": 120, "carbs": 250, "fats": 71}));
}

#[test]
fn plan_paths_are_nested_under_users() {
    assert_eq!(plan_path("alice", "2024-03-11"), DocPath::parse("users/alice/plans/2024-03-11").unwrap());
}
