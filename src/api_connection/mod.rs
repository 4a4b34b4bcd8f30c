pub mod connection;
pub mod endpoints;

pub use connection::{first_choice_content, parse_json_content, ApiConnectionError, CompletionClient};
pub use endpoints::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, JsonSchema, Provider,
    ResponseFormat,
};
