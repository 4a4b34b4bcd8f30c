use crate::models::{MealPlanRequest, Slot};

const PLACEHOLDERS: [&str; 2] = ["any", "no preference"];

fn meaningful(value: Option<&str>) -> Option<&str> {
    let value = value?.trim();
    if value.is_empty() || PLACEHOLDERS.contains(&value.to_lowercase().as_str()) {
        None
    } else {
        Some(value)
    }
}

/// Text query for the recipe index built from the textual preferences only.
/// Macro numbers are left out so matches follow cuisine and style.
pub fn build_retrieval_query(request: &MealPlanRequest, slot: Slot) -> String {
    let parts: Vec<&str> = [
        Some(request.diet_preference.as_str()),
        request.preferences.cuisine.as_deref(),
        request.preferences.custom.as_deref(),
    ]
    .into_iter()
    .filter_map(meaningful)
    .collect();

    if parts.is_empty() {
        format!("{} recipe", slot)
    } else {
        parts.join(" ")
    }
}
