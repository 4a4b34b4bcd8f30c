use serde::de::DeserializeOwned;

use super::error::PlanError;
use crate::api_connection::endpoints::{ChatCompletionRequest, ChatMessage, JsonSchema, ResponseFormat};
use crate::api_connection::{first_choice_content, parse_json_content, CompletionClient};
use crate::models::{GroceryList, Macros, MealOptions, MealPlan, ValidationError};

/// A document shape the completion endpoint can be asked to produce.
pub trait StructuredOutput: DeserializeOwned + Sized {
    const SCHEMA_NAME: &'static str;

    fn schema() -> JsonSchema;

    fn validated(self) -> Result<Self, ValidationError> {
        Ok(self)
    }
}

fn macros_schema() -> JsonSchema {
    JsonSchema::object(vec![
        ("calories", JsonSchema::integer().describe("Kilocalories")),
        ("protein", JsonSchema::integer().describe("Grams of protein")),
        ("carbs", JsonSchema::integer().describe("Grams of carbohydrate")),
        ("fats", JsonSchema::integer().describe("Grams of fat")),
    ])
}

fn meal_schema() -> JsonSchema {
    JsonSchema::object(vec![
        ("name", JsonSchema::string()),
        ("description", JsonSchema::string()),
        ("calories", JsonSchema::integer()),
        ("macros", macros_schema()),
        ("ingredients", JsonSchema::array(JsonSchema::string())),
        ("instructions", JsonSchema::array(JsonSchema::string())),
    ])
}

fn meal_list_schema() -> JsonSchema {
    JsonSchema::array(meal_schema()).describe("Exactly 3 distinct meal options")
}

impl StructuredOutput for Macros {
    const SCHEMA_NAME: &'static str = "macros";

    fn schema() -> JsonSchema {
        macros_schema()
    }
}

impl StructuredOutput for MealOptions {
    const SCHEMA_NAME: &'static str = "meal_options";

    fn schema() -> JsonSchema {
        JsonSchema::object(vec![("items", meal_list_schema())])
    }

    fn validated(self) -> Result<Self, ValidationError> {
        MealOptions::validated(self)
    }
}

impl StructuredOutput for MealPlan {
    const SCHEMA_NAME: &'static str = "meal_plan";

    fn schema() -> JsonSchema {
        JsonSchema::object(vec![
            ("breakfast", meal_list_schema()),
            ("lunch", meal_list_schema()),
            ("dinner", meal_list_schema()),
            ("snack", meal_list_schema()),
        ])
    }

    fn validated(self) -> Result<Self, ValidationError> {
        MealPlan::validated(self)
    }
}

impl StructuredOutput for GroceryList {
    const SCHEMA_NAME: &'static str = "grocery_list";

    fn schema() -> JsonSchema {
        let item = JsonSchema::object(vec![
            ("name", JsonSchema::string()),
            ("quantity", JsonSchema::string().describe("Total amount as free text, e.g. \"2 lb\"")),
            ("category", JsonSchema::string()),
        ]);
        JsonSchema::object(vec![
            ("items", JsonSchema::array(item)),
            ("notes", JsonSchema::array(JsonSchema::string())),
        ])
    }
}

/// Sends one request and parses the first choice as `T`. A single attempt;
/// transport, parse and validation failures all surface as errors.
pub async fn request_structured<T: StructuredOutput>(
    client: &dyn CompletionClient,
    model: &str,
    system_prompt: &str,
    user_prompt: String,
) -> Result<T, PlanError> {
    let request = ChatCompletionRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)],
        response_format: Some(ResponseFormat::json_schema(T::SCHEMA_NAME, T::schema())),
        temperature: None,
        max_tokens: None,
    };

    let response = client.call_chat_completion(request).await?;
    let content = first_choice_content(&response)?;
    let parsed: T = parse_json_content(content).map_err(|err| {
        tracing::debug!(schema = T::SCHEMA_NAME, content, "failed to deserialize completion content");
        err
    })?;
    Ok(parsed.validated()?)
}
