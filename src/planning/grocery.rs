use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::completion::request_structured;
use super::error::PlanError;
use super::orchestrator::MealPlanner;
use super::prompts::{grocery_list_prompt, GROCERY_SYSTEM_PROMPT};
use crate::models::{GroceryList, Slot};
use crate::store::{weekly_plan_path, Document, DocumentWrite, StoreError};

/// One planned meal of a week, as listed in the grocery prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroceryMeal {
    pub day: String,
    pub slot: String,
    pub name: String,
    #[serde(default)]
    pub meal_type: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn slot_rank(slot: &str) -> usize {
    Slot::parse(slot)
        .and_then(|slot| Slot::ALL.iter().position(|s| *s == slot))
        .unwrap_or(Slot::ALL.len())
}

fn text(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
}

/// Collects `days.<date>.meals.<slot>` objects of a weekly plan, ordered by day
/// then slot. Entries that are not objects are ignored.
pub fn flatten_weekly_plan(plan: &Document) -> Vec<GroceryMeal> {
    let Some(days) = plan.get("days").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut meals: Vec<GroceryMeal> = days
        .iter()
        .filter_map(|(day, data)| Some((day, data.get("meals")?.as_object()?)))
        .flat_map(|(day, slots)| {
            slots.iter().filter_map(move |(slot, meal)| {
                let meal = meal.as_object()?;
                Some(GroceryMeal {
                    day: day.clone(),
                    slot: slot.clone(),
                    name: text(meal.get("name"))
                        .or_else(|| text(meal.get("title")))
                        .unwrap_or("Meal")
                        .to_string(),
                    meal_type: text(meal.get("mealType")).map(str::to_string),
                    tags: meal
                        .get("tags")
                        .and_then(Value::as_array)
                        .map(|tags| tags.iter().filter_map(Value::as_str).map(str::to_string).collect())
                        .unwrap_or_default(),
                })
            })
        })
        .collect();

    meals.sort_by(|a, b| {
        a.day
            .cmp(&b.day)
            .then_with(|| slot_rank(&a.slot).cmp(&slot_rank(&b.slot)))
            .then_with(|| a.slot.cmp(&b.slot))
    });
    meals
}

impl MealPlanner {
    /// Builds a shopping list for `users/{uid}/weekly_plans/{week_id}` and
    /// records its progress on that document.
    pub async fn generate_grocery_list(&self, user_id: &str, week_id: &str) -> Result<GroceryList, PlanError> {
        let path = weekly_plan_path(user_id, week_id);
        let plan = self
            .store()
            .get(&path)
            .await?
            .ok_or_else(|| PlanError::NotFound("Weekly plan not found.".to_string()))?;

        let meals = flatten_weekly_plan(&plan);
        if meals.is_empty() {
            return Err(PlanError::NotFound("No meals found for the selected week.".to_string()));
        }

        let generating = DocumentWrite::new()
            .field("groceryStatus", "generating")
            .server_timestamp("groceryUpdatedAt")
            .server_timestamp("updatedAt");
        self.store().set_merge(&path, generating).await?;
        tracing::info!(user_id, week_id, meals = meals.len(), "generating grocery list");

        let result = request_structured::<GroceryList>(
            self.completion(),
            &self.settings().model,
            GROCERY_SYSTEM_PROMPT,
            grocery_list_prompt(&meals),
        )
        .await;

        match result {
            Ok(list) => {
                let ready = DocumentWrite::new()
                    .field("groceryList", serde_json::to_value(&list).map_err(StoreError::from)?)
                    .field("groceryStatus", "ready")
                    .server_timestamp("groceryGeneratedAt")
                    .server_timestamp("updatedAt");
                self.store().set_merge(&path, ready).await?;
                tracing::info!(user_id, week_id, items = list.items.len(), "grocery list ready");
                Ok(list)
            }
            Err(err) => {
                tracing::error!(user_id, week_id, error = %err, "grocery list generation failed");
                let failed = DocumentWrite::new()
                    .field("groceryStatus", "error")
                    .field("groceryError", err.to_string())
                    .server_timestamp("groceryUpdatedAt")
                    .server_timestamp("updatedAt");
                if let Err(store_err) = self.store().set_merge(&path, failed).await {
                    tracing::warn!(user_id, week_id, error = %store_err, "could not record grocery failure");
                }
                Err(err)
            }
        }
    }
}
