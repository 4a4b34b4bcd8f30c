//! Meal plan generation: slot targets, prompts, history, and the planner that
//! ties them to the completion endpoint and the document store.

pub mod completion;
pub mod daily_macros;
pub mod error;
pub mod grocery;
pub mod history;
pub mod orchestrator;
pub mod prompts;
pub mod targets;

pub use error::{ErrorResponse, PlanError};
pub use grocery::{flatten_weekly_plan, GroceryMeal};
pub use history::{date_key, normalize_date_key, recent_meal_names};
pub use orchestrator::{GenerationMode, MealPlanner, PlannerSettings, ProgressiveOutcome};
pub use targets::{compute_slot_targets, Distribution, SlotTarget, SlotTargets};
