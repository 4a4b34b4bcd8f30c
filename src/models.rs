use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Number of options every slot must carry.
pub const OPTIONS_PER_SLOT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

impl Slot {
    /// Generation order.
    pub const ALL: [Slot; 4] = [Slot::Breakfast, Slot::Lunch, Slot::Dinner, Slot::Snack];

    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Breakfast => "breakfast",
            Slot::Lunch => "lunch",
            Slot::Dinner => "dinner",
            Slot::Snack => "snack",
        }
    }

    /// Progress reported once this slot has been persisted.
    pub fn progress_percent(&self) -> u8 {
        match self {
            Slot::Breakfast => 25,
            Slot::Lunch => 50,
            Slot::Dinner => 75,
            Slot::Snack => 100,
        }
    }

    pub fn parse(raw: &str) -> Option<Slot> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "breakfast" => Some(Slot::Breakfast),
            "lunch" => Some(Slot::Lunch),
            "dinner" => Some(Slot::Dinner),
            "snack" => Some(Slot::Snack),
            _ => None,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{context} must include exactly {expected} meal options, got {actual}")]
    TooFewOptions {
        context: String,
        expected: usize,
        actual: usize,
    },
    #[error("{context} contains a meal without a name")]
    UnnamedMeal { context: String },
}

fn rounded_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = f64::deserialize(deserializer)?;
    if value.is_finite() && value > 0.0 {
        Ok(value.round().min(u32::MAX as f64) as u32)
    } else {
        Ok(0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Macros {
    #[serde(deserialize_with = "rounded_u32")]
    pub calories: u32,
    #[serde(deserialize_with = "rounded_u32")]
    pub protein: u32,
    #[serde(deserialize_with = "rounded_u32")]
    pub carbs: u32,
    #[serde(deserialize_with = "rounded_u32")]
    pub fats: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    pub name: String,
    pub description: String,
    #[serde(deserialize_with = "rounded_u32")]
    pub calories: u32,
    pub macros: Macros,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
}

fn validate_meals(context: &str, mut meals: Vec<Meal>) -> Result<Vec<Meal>, ValidationError> {
    if meals.len() < OPTIONS_PER_SLOT {
        return Err(ValidationError::TooFewOptions {
            context: context.to_string(),
            expected: OPTIONS_PER_SLOT,
            actual: meals.len(),
        });
    }
    meals.truncate(OPTIONS_PER_SLOT);
    if meals.iter().any(|meal| meal.name.trim().is_empty()) {
        return Err(ValidationError::UnnamedMeal {
            context: context.to_string(),
        });
    }
    Ok(meals)
}

/// Three options for a single slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealOptions {
    pub items: Vec<Meal>,
}

impl MealOptions {
    /// Keeps the first three items; fewer than three is rejected rather than padded.
    pub fn validated(self) -> Result<Self, ValidationError> {
        Ok(Self {
            items: validate_meals("meal options", self.items)?,
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|meal| meal.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPlan {
    pub breakfast: Vec<Meal>,
    pub lunch: Vec<Meal>,
    pub dinner: Vec<Meal>,
    pub snack: Vec<Meal>,
}

impl MealPlan {
    pub fn validated(self) -> Result<Self, ValidationError> {
        Ok(Self {
            breakfast: validate_meals("breakfast", self.breakfast)?,
            lunch: validate_meals("lunch", self.lunch)?,
            dinner: validate_meals("dinner", self.dinner)?,
            snack: validate_meals("snack", self.snack)?,
        })
    }

    /// Assembles a plan from per-slot options; every slot must be present.
    pub fn from_slots(mut slots: BTreeMap<Slot, MealOptions>) -> Result<Self, ValidationError> {
        let mut take = |slot: Slot| {
            slots
                .remove(&slot)
                .map(|options| options.items)
                .unwrap_or_default()
        };
        MealPlan {
            breakfast: take(Slot::Breakfast),
            lunch: take(Slot::Lunch),
            dinner: take(Slot::Dinner),
            snack: take(Slot::Snack),
        }
        .validated()
    }

    pub fn slot(&self, slot: Slot) -> &[Meal] {
        match slot {
            Slot::Breakfast => &self.breakfast,
            Slot::Lunch => &self.lunch,
            Slot::Dinner => &self.dinner,
            Slot::Snack => &self.snack,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroceryItem {
    pub name: String,
    pub quantity: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroceryList {
    pub items: Vec<GroceryItem>,
    #[serde(default)]
    pub notes: Vec<String>,
}

fn coerce_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn non_null<'a>(object: &'a serde_json::Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).filter(|value| !value.is_null())
}

/// Daily totals as sent by clients. Missing or malformed fields read as 0 and
/// `proteins` is accepted as an alias of `protein`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct DailyMacros {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fats: f64,
}

impl From<Value> for DailyMacros {
    fn from(value: Value) -> Self {
        let Value::Object(object) = value else {
            return Self::default();
        };
        let protein = non_null(&object, "proteins").or_else(|| non_null(&object, "protein"));
        Self {
            calories: coerce_number(non_null(&object, "calories")),
            protein: coerce_number(protein),
            carbs: coerce_number(non_null(&object, "carbs")),
            fats: coerce_number(non_null(&object, "fats")),
        }
    }
}

/// Treats an explicit JSON `null` like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// String map whose `null` values count as absent entries.
fn without_null_values<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error> {
    let entries: Option<BTreeMap<String, Option<String>>> = Option::deserialize(deserializer)?;
    Ok(entries
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value)))
        .collect())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default, deserialize_with = "null_as_default")]
    pub cuisine: Option<String>,
    #[serde(default, deserialize_with = "without_null_values")]
    pub proteins: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub custom: Option<String>,
}

impl Preferences {
    pub fn protein_for(&self, slot: Slot) -> Option<&str> {
        self.proteins
            .get(slot.as_str())
            .map(String::as_str)
            .filter(|p| !p.trim().is_empty())
    }

    pub fn custom_text(&self) -> Option<&str> {
        self.custom.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }

    pub fn cuisine(&self) -> Option<&str> {
        self.cuisine.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }
}

/// Input of both plan generation entry points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealPlanRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub diet_preference: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub preferences: Preferences,
    #[serde(default)]
    pub macros: DailyMacros,
    #[serde(default, deserialize_with = "null_as_default")]
    pub progressive: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date_id: Option<String>,
}

fn display_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Physical profile used to derive daily macro targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroProfile {
    pub date_of_birth: String,
    #[serde(deserialize_with = "display_number")]
    pub weight_kg: String,
    #[serde(deserialize_with = "display_number")]
    pub height_cm: String,
    pub gender: String,
    pub activity_level: String,
    pub goal: String,
    pub diet_preference: String,
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn meal_options_truncate_to_three_preserving_order() {
        let options = MealOptions { items: meals("Bowl", 5) }.validated().unwrap();
        let names: Vec<&str> = options.names().collect();
        assert_eq!(names, vec!["Bowl 1", "Bowl 2", "Bowl 3"]);
    }

    #[test]
    fn meal_options_with_fewer_than_three_are_rejected() {
        for count in 0..3 {
            let err = MealOptions { items: meals("Bowl", count) }.validated().unwrap_err();
            assert_eq!(
                err,
                ValidationError::TooFewOptions {
                    context: "meal options".to_string(),
                    expected: 3,
                    actual: count,
                }
            );
        }
    }

    #[test]
    fn unnamed_meal_is_rejected() {
        let mut items = meals("Soup", 3);
        items[1].name = "  ".to_string();
        assert!(matches!(
            MealOptions { items }.validated(),
            Err(ValidationError::UnnamedMeal { .. })
        ));
    }

    #[test]
    fn meal_plan_validates_every_slot() {
        let plan = MealPlan {
            breakfast: meals("B", 4),
            lunch: meals("L", 3),
            dinner: meals("D", 2),
            snack: meals("S", 3),
        };
        let err = plan.validated().unwrap_err();
        assert!(err.to_string().starts_with("dinner"));
    }

    #[test]
    fn meal_plan_from_slots_requires_all_slots() {
        let mut slots = BTreeMap::new();
        for slot in [Slot::Breakfast, Slot::Lunch, Slot::Dinner] {
            slots.insert(slot, MealOptions { items: meals(slot.as_str(), 3) });
        }
        assert!(MealPlan::from_slots(slots.clone()).is_err());
        slots.insert(Slot::Snack, MealOptions { items: meals("snack", 3) });
        let plan = MealPlan::from_slots(slots).unwrap();
        assert_eq!(plan.slot(Slot::Snack)[0].name, "snack 1");
    }

    #[test]
    fn macros_round_fractional_values() {
        let macros: Macros =
            serde_json::from_value(json!({"calories": 512.6, "protein": 30, "carbs": -4, "fats": 9.4}))
                .unwrap();
        assert_eq!(
            macros,
            Macros {
                calories: 513,
                protein: 30,
                carbs: 0,
                fats: 9
            }
        );
    }

    #[test]
    fn daily_macros_are_lenient() {
        let macros: DailyMacros =
            serde_json::from_value(json!({"calories": "2000", "proteins": 120, "carbs": "lots"}))
                .unwrap();
        assert_eq!(macros.calories, 2000.0);
        assert_eq!(macros.protein, 120.0);
        assert_eq!(macros.carbs, 0.0);
        assert_eq!(macros.fats, 0.0);

        let macros: DailyMacros = serde_json::from_value(json!(null)).unwrap();
        assert_eq!(macros, DailyMacros::default());
    }

    #[test]
    fn meal_plan_request_accepts_nulls_and_camel_case() {
        let request: MealPlanRequest = serde_json::from_value(json!({
            "dietPreference": "Vegan",
            "preferences": {"cuisine": null, "proteins": {"lunch": "tofu"}, "custom": "  "},
            "macros": {"calories": 2000, "protein": 100},
            "progressive": null,
            "dateId": "2024-3-7"
        }))
        .unwrap();
        assert_eq!(request.diet_preference, "Vegan");
        assert_eq!(request.preferences.protein_for(Slot::Lunch), Some("tofu"));
        assert_eq!(request.preferences.protein_for(Slot::Dinner), None);
        assert_eq!(request.preferences.custom_text(), None);
        assert!(!request.progressive);
        assert_eq!(request.date_id.as_deref(), Some("2024-3-7"));
    }

    #[test]
    fn null_slot_protein_counts_as_unset() {
        let request: MealPlanRequest = serde_json::from_value(json!({
            "dietPreference": "Vegan",
            "preferences": {"proteins": {"lunch": null, "dinner": "tofu"}}
        }))
        .unwrap();
        assert_eq!(request.preferences.protein_for(Slot::Lunch), None);
        assert_eq!(request.preferences.protein_for(Slot::Dinner), Some("tofu"));

        let request: MealPlanRequest =
            serde_json::from_value(json!({"dietPreference": "Vegan", "preferences": {"proteins": null}})).unwrap();
        assert!(request.preferences.proteins.is_empty());
    }

    #[test]
    fn macro_profile_accepts_numeric_measurements() {
        let profile: MacroProfile = serde_json::from_value(json!({
            "dateOfBirth": "1990-01-01",
            "weightKg": 72.5,
            "heightCm": "180",
            "gender": "female",
            "activityLevel": "Moderate",
            "goal": "Maintain",
            "dietPreference": "Vegetarian"
        }))
        .unwrap();
        assert_eq!(profile.weight_kg, "72.5");
        assert_eq!(profile.height_cm, "180");
    }
}
