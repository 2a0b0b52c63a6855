//! Chat model abstraction used by the evaluation agents.
//!
//! Agents talk to a [`ChatModel`] rather than a concrete HTTP client so the
//! pipeline can run against a scripted model in tests. [`complete_structured`]
//! layers JSON-schema constrained output with parse/validate/re-ask on top.

mod openai;

pub use openai::OpenAiClient;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Error type for chat model operations
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Model request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Model returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Model returned no content")]
    EmptyResponse,

    #[error("Invalid structured output after {attempts} attempts: {message}")]
    InvalidResponse { attempts: u32, message: String },

    #[error("Failed to build request: {0}")]
    Request(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// JSON schema the response must follow
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

/// A single chat completion request
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Logical name of the call (agent and step), used for logs and traces
    pub name: &'static str,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub response_schema: Option<ResponseSchema>,
}

impl ChatRequest {
    /// Deterministic plain-text request
    pub fn new(name: &'static str, messages: Vec<ChatMessage>) -> Self {
        Self {
            name,
            messages,
            temperature: 0.0,
            response_schema: None,
        }
    }

    /// Text of the last user message
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Token usage reported by the model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, for logs and trace metadata
    fn model_name(&self) -> &str;

    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, LlmError>;
}

/// Output type the model is asked to produce as JSON.
///
/// `validate` enforces constraints the schema alone cannot, such as score ranges.
pub trait StructuredOutput: DeserializeOwned + JsonSchema {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Build the response schema for `T`
pub fn response_schema<T: JsonSchema>(name: &str) -> Result<ResponseSchema, LlmError> {
    let mut schema = serde_json::to_value(schemars::schema_for!(T))
        .map_err(|e| LlmError::Request(format!("schema for {}: {}", name, e)))?;
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
    }
    Ok(ResponseSchema {
        name: name.to_string(),
        schema,
    })
}

/// Remove a surrounding markdown code fence, if any
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // Drop an info string such as "json" on the opening fence
    match inner.find('\n') {
        Some(pos) if !inner[..pos].trim().contains(' ') => inner[pos + 1..].trim(),
        _ => inner.trim(),
    }
}

fn parse_structured<T: StructuredOutput>(content: &str) -> Result<T, String> {
    let value: T = serde_json::from_str(strip_code_fence(content)).map_err(|e| e.to_string())?;
    value.validate()?;
    Ok(value)
}

/// Ask for output matching `T`, re-asking with the error on failure.
///
/// Makes at most `max_retries + 1` calls. Transport and status errors are not
/// retried.
pub async fn complete_structured<T: StructuredOutput>(
    model: &dyn ChatModel,
    name: &'static str,
    messages: Vec<ChatMessage>,
    max_retries: u32,
) -> Result<(T, Option<TokenUsage>), LlmError> {
    let mut request = ChatRequest::new(name, messages);
    request.response_schema = Some(response_schema::<T>(name)?);

    let attempts = max_retries + 1;
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        let completion = model.complete(&request).await?;
        match parse_structured::<T>(&completion.content) {
            Ok(value) => return Ok((value, completion.usage)),
            Err(message) => {
                tracing::warn!(
                    call = name,
                    attempt,
                    error = %message,
                    "Structured output rejected"
                );
                request.messages.push(ChatMessage::assistant(completion.content));
                request.messages.push(ChatMessage::user(format!(
                    "Your previous answer was invalid: {}. Reply again with only a JSON object that matches the required schema.",
                    message
                )));
                last_error = message;
            }
        }
    }

    Err(LlmError::InvalidResponse {
        attempts,
        message: last_error,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted chat model for unit tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replies with queued responses in order and records every request.
    #[derive(Default)]
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, u16>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedModel {
        pub fn new<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Queue an HTTP-status failure
        pub fn push_failure(&self, status: u16) {
            self.replies.lock().unwrap().push_back(Err(status));
        }

        pub fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(content)) => Ok(ChatCompletion {
                    content,
                    usage: None,
                }),
                Some(Err(status)) => Err(LlmError::Status {
                    status,
                    body: "scripted failure".to_string(),
                }),
                None => Err(LlmError::EmptyResponse),
            }
        }
    }
}
