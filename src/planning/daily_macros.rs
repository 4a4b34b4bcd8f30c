use super::completion::request_structured;
use super::error::PlanError;
use super::orchestrator::MealPlanner;
use super::prompts::{daily_macros_prompt, MACROS_SYSTEM_PROMPT};
use crate::models::{MacroProfile, Macros};

fn blank_fields(profile: &MacroProfile) -> Vec<&'static str> {
    [
        ("dateOfBirth", &profile.date_of_birth),
        ("weightKg", &profile.weight_kg),
        ("heightCm", &profile.height_cm),
        ("gender", &profile.gender),
        ("activityLevel", &profile.activity_level),
        ("goal", &profile.goal),
        ("dietPreference", &profile.diet_preference),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(name, _)| name)
    .collect()
}

impl MealPlanner {
    /// Daily calorie and macronutrient targets for a physical profile.
    pub async fn generate_macros(&self, profile: &MacroProfile) -> Result<Macros, PlanError> {
        let blank = blank_fields(profile);
        if !blank.is_empty() {
            return Err(PlanError::InvalidRequest(format!("Missing profile fields: {}", blank.join(", "))));
        }
        let macros = request_structured::<Macros>(
            self.completion(),
            &self.settings().model,
            MACROS_SYSTEM_PROMPT,
            daily_macros_prompt(profile),
        )
        .await?;
        tracing::info!(calories = macros.calories, "generated daily macros");
        Ok(macros)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::orchestrator::test_support::{fixed_settings, ScriptedCompletion};
    use crate::store::MemoryDocumentStore;
    use serde_json::json;
    use std::sync::Arc;

    fn profile() -> MacroProfile {
        serde_json::from_value(json!({
            "dateOfBirth": "1990-05-01",
            "weightKg": 70,
            "heightCm": 175.5,
            "gender": "female",
            "activityLevel": "Moderate",
            "goal": "Maintain",
            "dietPreference": "Vegan"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn parses_rounded_macros() {
        let completion = Arc::new(ScriptedCompletion::new(vec![Ok(
            json!({"calories": 2100.4, "protein": 95, "carbs": 260.6, "fats": 70}),
        )]));
        let planner = MealPlanner::new(completion.clone(), Arc::new(MemoryDocumentStore::new()), fixed_settings());
        let macros = planner.generate_macros(&profile()).await.unwrap();
        assert_eq!((macros.calories, macros.carbs), (2100, 261));

        let requests = completion.requests.lock().await;
        assert_eq!(requests[0].messages[0].content, MACROS_SYSTEM_PROMPT);
        assert!(requests[0].messages[1].content.contains("Height in cm: 175.5cm"));
        assert_eq!(requests[0].response_format.as_ref().unwrap().json_schema.as_ref().unwrap().name, "macros");
    }

    #[tokio::test]
    async fn blank_fields_are_rejected_before_calling_out() {
        let completion = Arc::new(ScriptedCompletion::default());
        let planner = MealPlanner::new(completion.clone(), Arc::new(MemoryDocumentStore::new()), fixed_settings());
        let mut profile = profile();
        profile.goal = "  ".to_string();
        profile.gender.clear();
        let err = planner.generate_macros(&profile).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing profile fields: gender, goal");
        assert!(completion.requests.lock().await.is_empty());
    }
}
