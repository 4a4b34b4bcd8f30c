use async_trait::async_trait;
use dotenv::dotenv;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::env;
use std::time::Duration;

use super::endpoints::{
    ChatCompletionRequest, ChatCompletionResponse, Provider, OPENAI_BASE_URL,
    OPENROUTER_BASE_URL,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, thiserror::Error)]
pub enum ApiConnectionError {
    #[error("API key not found in environment: {0}")]
    MissingApiKey(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("API error {status}: {error_body}")]
    ApiError {
        status: reqwest::StatusCode,
        error_body: String,
    },
    #[error("Empty response: {0}")]
    EmptyResponse(String),
}

/// The completion endpoint as seen by the planner. Implemented by [`Provider`]
/// for real traffic and by scripted fakes in tests.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn call_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ApiConnectionError>;
}

fn build_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}

impl Provider {
    pub fn openai(api_key_env_var_name: &str, base_url: Option<&str>) -> Self {
        Self::OpenAi {
            api_key: api_key_env_var_name.to_string(),
            base_url: base_url
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            client: build_client(),
        }
    }

    pub fn openrouter(api_key_env_var_name: &str, site_url: &str, app_name: &str) -> Self {
        Self::OpenRouter {
            api_key: api_key_env_var_name.to_string(),
            site_url: site_url.to_string(),
            app_name: app_name.to_string(),
            client: build_client(),
        }
    }

    fn resolve_api_key(api_key_env_var_name: &str) -> Result<String, ApiConnectionError> {
        dotenv().ok();
        env::var(api_key_env_var_name)
            .map_err(|_| ApiConnectionError::MissingApiKey(api_key_env_var_name.to_string()))
    }
}

#[async_trait]
impl CompletionClient for Provider {
    async fn call_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ApiConnectionError> {
        let builder = match self {
            Provider::OpenAi {
                api_key,
                base_url,
                client,
            } => {
                let actual_api_key = Self::resolve_api_key(api_key)?;
                client
                    .post(format!("{}/chat/completions", base_url))
                    .bearer_auth(actual_api_key)
            }
            Provider::OpenRouter {
                api_key,
                site_url,
                app_name,
                client,
            } => {
                let actual_api_key = Self::resolve_api_key(api_key)?;
                client
                    .post(format!("{}/chat/completions", OPENROUTER_BASE_URL))
                    .bearer_auth(actual_api_key)
                    .header("HTTP-Referer", site_url)
                    .header("X-Title", app_name)
            }
        };

        tracing::debug!(model = %request.model, messages = request.messages.len(), "sending chat completion");
        let response = builder.json(&request).send().await?;

        if response.status().is_success() {
            let chat_response = response.json::<ChatCompletionResponse>().await?;
            Ok(chat_response)
        } else {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            Err(ApiConnectionError::ApiError { status, error_body })
        }
    }
}

/// Returns the text content of the first choice, or an error when the model
/// refused or produced nothing.
pub fn first_choice_content(response: &ChatCompletionResponse) -> Result<&str, ApiConnectionError> {
    let choice = response
        .choices
        .first()
        .ok_or_else(|| ApiConnectionError::EmptyResponse("No response choices received from API".to_string()))?;

    if let Some(refusal) = choice.message.refusal.as_deref().filter(|r| !r.is_empty()) {
        return Err(ApiConnectionError::EmptyResponse(format!("Model refused: {}", refusal)));
    }

    match choice.message.content.as_deref().map(str::trim) {
        Some(content) if !content.is_empty() => Ok(content),
        _ => Err(ApiConnectionError::EmptyResponse(
            "API returned empty content".to_string(),
        )),
    }
}

fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    if !(trimmed.starts_with("```") && trimmed.ends_with("```") && trimmed.len() >= 6) {
        return trimmed;
    }
    let inner = &trimmed[3..trimmed.len() - 3];
    inner.strip_prefix("json").unwrap_or(inner).trim()
}

/// Parses model output as JSON, tolerating markdown fences and prose around a
/// single top-level object.
pub fn parse_json_content<T: DeserializeOwned>(content: &str) -> Result<T, ApiConnectionError> {
    let stripped = strip_code_fences(content);
    match serde_json::from_str(stripped) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            let (Some(start), Some(end)) = (stripped.find('{'), stripped.rfind('}')) else {
                return Err(first_err.into());
            };
            if end <= start {
                return Err(first_err.into());
            }
            serde_json::from_str(&stripped[start..=end]).map_err(|_| first_err.into())
        }
    }
}
