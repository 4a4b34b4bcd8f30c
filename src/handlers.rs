//! Callable entry points. Each takes the caller identity plus a JSON payload
//! and answers with either the result document or an `{error, details?}` body.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::{GroceryList, MacroProfile, Macros, MealPlanRequest};
use crate::planning::{normalize_date_key, ErrorResponse, MealPlanner, PlanError};
use crate::store::StoreError;

/// Caller identity and payload of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallableRequest {
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl CallableRequest {
    pub fn new(uid: Option<&str>, data: Value) -> Self {
        Self {
            uid: uid.map(str::to_string),
            data,
        }
    }

    fn user_id(&self) -> Option<&str> {
        self.uid.as_deref().map(str::trim).filter(|uid| !uid.is_empty())
    }

    fn payload<T: serde::de::DeserializeOwned>(&self, what: &str) -> Result<T, PlanError> {
        let data = if self.data.is_null() { json!({}) } else { self.data.clone() };
        serde_json::from_value(data).map_err(|err| PlanError::InvalidRequest(format!("Invalid {}: {}", what, err)))
    }
}

fn respond<T: Serialize>(result: Result<T, PlanError>, summary: &str) -> Value {
    match result.and_then(|value| {
        serde_json::to_value(value).map_err(|err| PlanError::Store(StoreError::from(err)))
    }) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, summary, "request failed");
            error_body(err.to_response(summary))
        }
    }
}

fn error_body(response: ErrorResponse) -> Value {
    serde_json::to_value(&response).unwrap_or_else(|_| json!({ "error": response.error }))
}

async fn macros(planner: &MealPlanner, request: &CallableRequest) -> Result<Macros, PlanError> {
    let profile: MacroProfile = request.payload("macro profile")?;
    planner.generate_macros(&profile).await
}

pub async fn generate_macros(planner: &MealPlanner, request: &CallableRequest) -> Value {
    respond(macros(planner, request).await, "Could not parse response")
}

fn parse_plan_request(request: &CallableRequest) -> Result<MealPlanRequest, PlanError> {
    let plan: MealPlanRequest = request.payload("meal plan request")?;
    if plan.diet_preference.trim().is_empty() {
        return Err(PlanError::InvalidRequest("Missing dietPreference.".to_string()));
    }
    Ok(plan)
}

/// Resolves caller and target date of a progressive run.
fn progressive_target<'a>(
    request: &'a CallableRequest,
    plan: &MealPlanRequest,
) -> Result<(&'a str, String), PlanError> {
    let user_id = request.user_id().ok_or_else(|| {
        PlanError::Unauthenticated("Unauthenticated progressive generation requires user auth.".to_string())
    })?;
    let raw = plan
        .date_id
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| PlanError::InvalidRequest("Missing dateId for progressive generation.".to_string()))?;
    let date_key = normalize_date_key(raw)
        .ok_or_else(|| PlanError::InvalidRequest(format!("Invalid dateId '{}': expected YYYY-MM-DD.", raw)))?;
    Ok((user_id, date_key))
}

async fn meal_plan(planner: &MealPlanner, request: &CallableRequest, grounded: bool) -> Value {
    let (progressive_summary, summary) = if grounded {
        (
            "Could not generate meal plan progressively with RAG",
            "Could not generate meal plan with RAG",
        )
    } else {
        ("Could not generate meal plan progressively", "Could not generate meal plan")
    };

    let plan = match parse_plan_request(request) {
        Ok(plan) => plan,
        Err(err) => return respond::<()>(Err(err), summary),
    };
    let user_id = request.user_id();

    if plan.progressive {
        let (user_id, date_key) = match progressive_target(request, &plan) {
            Ok(target) => target,
            Err(err) => return respond::<()>(Err(err), progressive_summary),
        };
        let recent = planner.recent_meals(Some(user_id)).await;
        let result = planner
            .generate_progressive(user_id, &date_key, &plan, recent, grounded)
            .await;
        return respond(result, progressive_summary);
    }

    let recent = planner.recent_meals(user_id).await;
    let result = if grounded {
        planner.generate_plan_with_rag(&plan, recent).await
    } else {
        planner.generate_single_shot(&plan, &recent).await
    };
    respond(result, summary)
}

pub async fn generate_meal_plan(planner: &MealPlanner, request: &CallableRequest) -> Value {
    meal_plan(planner, request, false).await
}

/// Same contract as [`generate_meal_plan`], grounded on retrieved recipes.
/// Refuses to start when the recipe index cannot serve queries.
pub async fn generate_meal_plan_rag(planner: &MealPlanner, request: &CallableRequest) -> Value {
    if let Err(err) = planner.check_retrieval().await {
        return respond::<()>(Err(err), "RAG is not available");
    }
    meal_plan(planner, request, true).await
}

async fn grocery_list(planner: &MealPlanner, request: &CallableRequest) -> Result<GroceryList, PlanError> {
    let user_id = request
        .user_id()
        .ok_or_else(|| PlanError::Unauthenticated("Authentication required.".to_string()))?;
    let week_id = request
        .data
        .get("weekId")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .ok_or_else(|| PlanError::InvalidRequest("Missing weekId.".to_string()))?;
    planner.generate_grocery_list(user_id, week_id).await
}

pub async fn generate_grocery_list(planner: &MealPlanner, request: &CallableRequest) -> Value {
    respond(grocery_list(planner, request).await, "Could not generate grocery list")
}
