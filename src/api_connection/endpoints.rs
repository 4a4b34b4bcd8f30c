use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// OpenAI-compatible chat completion backends.
///
/// `api_key` holds the *name* of the environment variable carrying the key;
/// the key itself is only read when a request is sent.
#[derive(Clone, Debug)]
pub enum Provider {
    OpenAi {
        api_key: String,
        base_url: String,
        client: Client,
    },
    OpenRouter {
        api_key: String,
        site_url: String,
        app_name: String,
        client: Client,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A JSON schema node. Object nodes built with [`JsonSchema::object`] list every
/// property as required and forbid extra properties, which strict structured
/// output requires.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct JsonSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, JsonSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<JsonSchema>>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub required: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "additionalProperties")]
    pub additional_properties: Option<bool>,
}

impl JsonSchema {
    fn leaf(schema_type: &str) -> Self {
        Self {
            schema_type: schema_type.to_string(),
            ..Default::default()
        }
    }

    pub fn string() -> Self {
        Self::leaf("string")
    }

    pub fn integer() -> Self {
        Self::leaf("integer")
    }

    pub fn array(items: JsonSchema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::leaf("array")
        }
    }

    pub fn object(properties: Vec<(&str, JsonSchema)>) -> Self {
        let required = properties.iter().map(|(name, _)| name.to_string()).collect();
        let properties = properties
            .into_iter()
            .map(|(name, schema)| (name.to_string(), schema))
            .collect();
        Self {
            properties: Some(properties),
            required,
            additional_properties: Some(false),
            ..Self::leaf("object")
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JsonSchemaDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
    pub schema: JsonSchema,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<JsonSchemaDefinition>,
}

impl ResponseFormat {
    pub fn json_schema(name: &str, schema: JsonSchema) -> Self {
        Self {
            format_type: "json_schema".to_string(),
            json_schema: Some(JsonSchemaDefinition {
                name: name.to_string(),
                strict: Some(true),
                schema,
            }),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionResponseMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub refusal: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionChoice {
    pub message: ChatCompletionResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
    pub index: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: Option<u32>,
    pub total_tokens: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionResponse {
    pub id: String,
    #[serde(default)]
    pub object: Option<String>,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    pub usage: Option<ChatCompletionUsage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_schema_requires_every_property() {
        let schema = JsonSchema::object(vec![
            ("name", JsonSchema::string()),
            ("tags", JsonSchema::array(JsonSchema::string())),
        ]);
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value["type"], "object");
        assert_eq!(value["additionalProperties"], false);
        assert_eq!(value["required"], json!(["name", "tags"]));
        assert_eq!(value["properties"]["tags"]["items"]["type"], "string");
        assert!(value["properties"]["name"].get("required").is_none());
    }

    #[test]
    fn response_format_is_strict_json_schema() {
        let format = ResponseFormat::json_schema("macros", JsonSchema::integer());
        let value = serde_json::to_value(&format).unwrap();
        assert_eq!(value["type"], "json_schema");
        assert_eq!(value["json_schema"]["name"], "macros");
        assert_eq!(value["json_schema"]["strict"], true);
    }

    #[test]
    fn response_tolerates_null_content() {
        let raw = json!({
            "id": "chatcmpl-1",
            "created": 1,
            "model": "gpt-4.1-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": null, "refusal": "no"},
                "finish_reason": "stop"
            }]
        });
        let response: ChatCompletionResponse = serde_json::from_value(raw).unwrap();
        assert!(response.choices[0].message.content.is_none());
        assert_eq!(response.choices[0].message.refusal.as_deref(), Some("no"));
    }
}
