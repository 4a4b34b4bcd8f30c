//! Instruction text sent to the completion endpoint, one renderer per output
//! shape. All renderers are pure; the calendar date is passed in.

use chrono::NaiveDate;
use std::fmt::Write;

use super::grocery::GroceryMeal;
use super::targets::SlotTarget;
use crate::models::{MacroProfile, MealPlanRequest, Slot};

pub const MACROS_SYSTEM_PROMPT: &str =
    "You are an expert in nutrition and fitness. Help the user with their daily macronutrient needs.";
pub const PLAN_SYSTEM_PROMPT: &str = "You are a creative nutritionist and chef specializing in diverse meal planning. Always include exactly 3 diverse options for each of breakfast, lunch, dinner, and snack.";
pub const SLOT_SYSTEM_PROMPT: &str =
    "You are a creative nutritionist and chef. Return exactly 3 structured options.";
pub const RAG_SLOT_SYSTEM_PROMPT: &str =
    "You are a nutritionist-chef. Return exactly 3 grounded, realistic options.";
pub const GROCERY_SYSTEM_PROMPT: &str = "You generate accurate, consolidated grocery lists from meal names. Respond only with valid JSON matching the schema.";

const ANY: &str = "any";

fn long_date(today: NaiveDate) -> String {
    today.format("%B %d, %Y").to_string()
}

fn number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

pub fn daily_macros_prompt(profile: &MacroProfile) -> String {
    format!(
        "Generate the recommended daily calorie intake and macronutrient breakdown (in grams) for:\n\
         - Date of birth: {dob}\n\
         - Weight in kg: {weight}kg\n\
         - Height in cm: {height}cm\n\
         - gender: {gender}\n\
         - Activity Level: {activity} (e.g., 'Low': 'Mostly sedentary lifestyle, little to no exercise.', 'Moderate': 'Light exercise or daily activity like walking.', 'High': 'Frequent intense workouts or physically demanding job.')\n\
         - Goal: {goal} (e.g., 'Lose Weight': 'Focus on fat loss and calorie control.', 'Build Muscle': 'Support muscle growth with nutrition and training.', 'Maintain': 'Sustain your current physique and health.')\n\
         - Dietary Preferences: {diet} (e.g., 'No Preference': 'No specific dietary restriction or preference.', 'Vegetarian': 'No meat, but includes dairy and eggs.', 'Vegan': 'No animal products of any kind.', 'Low Carb': 'Focus on reducing carbohydrate intake.', 'High Protein': 'Emphasizes protein-rich foods for muscle growth.')\n\
         Respond with whole-number values for calories, protein, carbs and fats.\n",
        dob = profile.date_of_birth,
        weight = profile.weight_kg,
        height = profile.height_cm,
        gender = profile.gender,
        activity = profile.activity_level,
        goal = profile.goal,
        diet = profile.diet_preference,
    )
}

/// Prompt for a whole day: three options for each of the four slots.
pub fn full_plan_prompt(request: &MealPlanRequest, recent_meals: &[String], today: NaiveDate) -> String {
    let prefs = &request.preferences;
    let macros = &request.macros;
    let slot_protein = |slot: Slot| prefs.protein_for(slot).unwrap_or(ANY);

    let mut prompt = format!(
        "Generate a unique daily meal plan for one person for {date} with EXACTLY 3 diverse options for EACH of these meals:
- breakfast
- lunch
- dinner
- snack

NUTRITIONAL REQUIREMENTS:
- Total Daily Calories: {calories} calories
- Total Daily Macros: {protein}g protein, {carbs}g carbs, {fats}g fats
- Dietary Preference: {diet}

VARIETY GUIDELINES for today:
- Feature cuisine: {cuisine}
- Breakfast proteins: {p_breakfast}
- Lunch proteins: {p_lunch}
- Dinner proteins: {p_dinner}
- Snack proteins: {p_snack}

CREATIVITY REQUIREMENTS:
1. Each of the 12 meal options should be completely unique
2. Vary ingredients, flavors, textures, and presentations
3. Include different spice profiles and seasonings
4. Mix cooking temperatures (hot, room temp, cold dishes)
5. Balance simple and complex preparations
6. Ensure visual variety (colors, plating styles)
",
        date = long_date(today),
        calories = number(macros.calories),
        protein = number(macros.protein),
        carbs = number(macros.carbs),
        fats = number(macros.fats),
        diet = request.diet_preference,
        cuisine = prefs.cuisine().unwrap_or(ANY),
        p_breakfast = slot_protein(Slot::Breakfast),
        p_lunch = slot_protein(Slot::Lunch),
        p_dinner = slot_protein(Slot::Dinner),
        p_snack = slot_protein(Slot::Snack),
    );

    if !recent_meals.is_empty() {
        let _ = write!(
            prompt,
            "
AVOID REPETITION:
Recently suggested meals to avoid repeating: {}
Create completely different meal concepts from these previous suggestions.
Use different ingredients, cooking methods, and flavor profiles.
",
            recent_meals.join(", ")
        );
    }

    prompt.push_str(
        "

Each meal must include:
- Creative, descriptive name that reflects the cuisine/style
- Brief description
- Accurate calorie count
- Precise macro breakdown (protein, carbs, fats in grams)
- Ingredients list
- Preparation instructions

Ensure nutritional accuracy and that meals are practical to prepare.",
    );

    if let Some(custom) = prefs.custom_text() {
        let _ = write!(prompt, "\n\nADDITIONAL USER PREFERENCES TO RESPECT:\n{}\n", custom);
    }
    prompt
}

/// Prompt for three options of one slot, optionally pinned to a per-option target.
pub fn slot_prompt(
    request: &MealPlanRequest,
    recent_meals: &[String],
    slot: Slot,
    target: Option<&SlotTarget>,
    today: NaiveDate,
) -> String {
    let prefs = &request.preferences;
    let macros = &request.macros;

    let mut prompt = format!(
        "For {date}, generate EXACTLY 3 unique {slot} options.
Return JSON matching the expected schema with 3 structured items.

CONTEXT:
- Daily Calories: {calories}
- Daily Macros: {protein}g protein, {carbs}g carbs, {fats}g fats
- Dietary Preference: {diet}
- Cuisine focus: {cuisine}
- Preferred protein for {slot}: {slot_protein}
",
        date = long_date(today),
        slot = slot,
        calories = number(macros.calories),
        protein = number(macros.protein),
        carbs = number(macros.carbs),
        fats = number(macros.fats),
        diet = request.diet_preference,
        cuisine = prefs.cuisine().unwrap_or(ANY),
        slot_protein = prefs.protein_for(slot).unwrap_or(ANY),
    );

    if let Some(target) = target {
        let _ = write!(
            prompt,
            "
TARGET FOR THIS {upper} (per option):
- Calories: {calories} kcal (within ±10%)
- Protein: {protein} g (within ±10%)
- Carbs: {carbs} g (within ±10%)
- Fats: {fats} g (within ±10%)
Each of the 3 options should individually respect these targets so that any single option combined with the other meals will approximate daily totals.
",
            upper = slot.as_str().to_uppercase(),
            calories = target.calories,
            protein = target.protein,
            carbs = target.carbs,
            fats = target.fats,
        );
    }

    if !recent_meals.is_empty() {
        let _ = write!(prompt, "\nAvoid repeating any of these meals: {}.\n", recent_meals.join(", "));
    }

    if let Some(custom) = prefs.custom_text() {
        let _ = write!(prompt, "\nADDITIONAL USER PREFERENCES:\n{}\n", custom);
    }

    prompt.push_str(
        "
Each option must include:
- name
- description
- calories
- macros: calories (duplicate ok), protein, carbs, fats
- ingredients (list)
- instructions (list)
Ensure portions and macros align with daily targets proportionally for this meal.
",
    );
    prompt
}

/// Appends retrieved reference recipes (or a note that none were found) to a slot prompt.
pub fn rag_slot_prompt(base: &str, slot: Slot, context: &str) -> String {
    if context.trim().is_empty() {
        return format!(
            "{}\n\nNo reference recipes were retrieved; rely on general culinary knowledge while keeping options practical.",
            base
        );
    }
    format!(
        "{base}

REFERENCE RECIPES (use as factual inspiration; keep macros aligned for {slot}):
{context}

Prefer ingredients and preparation styles from the reference where possible, but adjust to match the user's macros and dietary preference. Keep options distinct from each other."
    )
}

pub fn grocery_list_prompt(meals: &[GroceryMeal]) -> String {
    let mut listing = String::new();
    for meal in meals {
        let _ = write!(listing, "- {} | {}: {}", meal.day, meal.slot, meal.name);
        if let Some(meal_type) = meal.meal_type.as_deref().filter(|t| !t.is_empty()) {
            let _ = write!(listing, " ({})", meal_type);
        }
        if !meal.tags.is_empty() {
            let _ = write!(listing, " [{}]", meal.tags.join(", "));
        }
        listing.push('\n');
    }

    format!(
        "Create a consolidated grocery list for the following meals planned this week:
{listing}
REQUIREMENTS:
- Combine duplicate ingredients across meals into a single line with a total quantity
- Use practical store quantities (e.g. \"2 lb\", \"1 dozen\", \"3 cans\")
- Assign every item a category such as Produce, Protein, Dairy, Grains, Pantry, Frozen, Spices or Other
- Group items by category
- Add short notes only for useful shopping tips (substitutions, storage, items likely already at home)
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DailyMacros, Preferences};
    use std::collections::BTreeMap;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
    }

    fn request() -> MealPlanRequest {
        MealPlanRequest {
            diet_preference: "Vegan".to_string(),
            preferences: Preferences {
                cuisine: Some("Thai".to_string()),
                proteins: BTreeMap::from([("dinner".to_string(), "tempeh".to_string())]),
                custom: Some("  no peanuts  ".to_string()),
            },
            macros: DailyMacros {
                calories: 2000.0,
                protein: 100.0,
                carbs: 250.0,
                fats: 60.0,
            },
            ..Default::default()
        }
    }

    #[test]
    fn full_plan_prompt_renders_preferences_and_history() {
        let prompt = full_plan_prompt(&request(), &["Pad Thai".to_string(), "Green Curry".to_string()], today());
        assert!(prompt.contains("for March 07, 2024"));
        assert!(prompt.contains("Total Daily Calories: 2000 calories"));
        assert!(prompt.contains("100g protein, 250g carbs, 60g fats"));
        assert!(prompt.contains("Feature cuisine: Thai"));
        assert!(prompt.contains("Breakfast proteins: any"));
        assert!(prompt.contains("Dinner proteins: tempeh"));
        assert!(prompt.contains("Recently suggested meals to avoid repeating: Pad Thai, Green Curry"));
        assert!(prompt.ends_with("ADDITIONAL USER PREFERENCES TO RESPECT:\nno peanuts\n"));
    }

    #[test]
    fn full_plan_prompt_omits_empty_clauses() {
        let mut request = request();
        request.preferences = Preferences::default();
        let prompt = full_plan_prompt(&request, &[], today());
        assert!(!prompt.contains("AVOID REPETITION"));
        assert!(!prompt.contains("ADDITIONAL USER PREFERENCES"));
        assert!(prompt.contains("Feature cuisine: any"));
    }

    #[test]
    fn slot_prompt_includes_target_block() {
        let target = SlotTarget {
            calories: 700,
            protein: 35,
            carbs: 88,
            fats: 21,
        };
        let prompt = slot_prompt(&request(), &[], Slot::Dinner, Some(&target), today());
        assert!(prompt.starts_with("For March 07, 2024, generate EXACTLY 3 unique dinner options."));
        assert!(prompt.contains("Preferred protein for dinner: tempeh"));
        assert!(prompt.contains("TARGET FOR THIS DINNER (per option):"));
        assert!(prompt.contains("- Carbs: 88 g (within ±10%)"));
        assert!(!prompt.contains("Avoid repeating"));
    }

    #[test]
    fn slot_prompt_is_deterministic_for_same_inputs() {
        let recent = vec!["Oat Bowl".to_string()];
        let a = slot_prompt(&request(), &recent, Slot::Breakfast, None, today());
        let b = slot_prompt(&request(), &recent, Slot::Breakfast, None, today());
        assert_eq!(a, b);
        assert!(a.contains("Avoid repeating any of these meals: Oat Bowl."));
        assert!(!a.contains("TARGET FOR THIS"));
    }

    #[test]
    fn rag_prompt_appends_reference_or_fallback() {
        let grounded = rag_slot_prompt("BASE", Slot::Lunch, "Title: Laksa\nnoodles");
        assert!(grounded.starts_with("BASE\n\nREFERENCE RECIPES"));
        assert!(grounded.contains("keep macros aligned for lunch"));
        assert!(grounded.contains("Title: Laksa\nnoodles"));

        let fallback = rag_slot_prompt("BASE", Slot::Lunch, "");
        assert!(fallback.contains("No reference recipes were retrieved"));
    }

    #[test]
    fn fractional_macros_render_as_given() {
        let mut request = request();
        request.macros.protein = 92.5;
        let prompt = full_plan_prompt(&request, &[], today());
        assert!(prompt.contains("92.5g protein"));
    }

    #[test]
    fn grocery_prompt_lists_each_meal() {
        let meals = vec![
            GroceryMeal {
                day: "2024-03-04".to_string(),
                slot: "breakfast".to_string(),
                name: "Oat Bowl".to_string(),
                meal_type: Some("Breakfast".to_string()),
                tags: vec!["Quick".to_string()],
            },
            GroceryMeal {
                day: "2024-03-04".to_string(),
                slot: "dinner".to_string(),
                name: "Tofu Curry".to_string(),
                meal_type: None,
                tags: vec![],
            },
        ];
        let prompt = grocery_list_prompt(&meals);
        assert!(prompt.contains("- 2024-03-04 | breakfast: Oat Bowl (Breakfast) [Quick]\n"));
        assert!(prompt.contains("- 2024-03-04 | dinner: Tofu Curry\n"));
        assert!(prompt.contains("Group items by category"));
    }
}
