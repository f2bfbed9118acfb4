//! OpenAI-compatible `chat/completions` client (DeepSeek by default).

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use outlinekb_shared::{CompletionConfig, OutlineKbError, Result};

use crate::CompletionService;

/// User-Agent string for completion requests.
const USER_AGENT: &str = concat!("outlinekb/", env!("CARGO_PKG_VERSION"));

/// Longest slice of an error body echoed into error messages.
const MAX_ERROR_BODY_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// `{"error": {"message": "..."}}` as returned on 4xx/5xx.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Completion client speaking the OpenAI chat-completions protocol.
#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl ChatCompletionClient {
    /// Build a client from config plus the already-resolved API key.
    pub fn new(config: &CompletionConfig, api_key: impl Into<String>) -> Result<Self> {
        let base = Url::parse(&config.base_url).map_err(|e| {
            OutlineKbError::config(format!("invalid completion base_url '{}': {e}", config.base_url))
        })?;
        let endpoint = format!("{}/chat/completions", base.as_str().trim_end_matches('/'));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OutlineKbError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            api_key: api_key.into(),
        })
    }

    /// Full URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl CompletionService for ChatCompletionClient {
    #[instrument(skip_all, fields(model = %self.model, prompt_len = user_prompt.len()))]
    async fn complete(&self, system_role: &str, user_prompt: &str, temperature: f32) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_role,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature,
            stream: false,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OutlineKbError::Network(format!("{}: request timed out", self.endpoint))
                } else {
                    OutlineKbError::Network(format!("{}: {e}", self.endpoint))
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            OutlineKbError::Network(format!("{}: failed to read body: {e}", self.endpoint))
        })?;

        if !status.is_success() {
            return Err(OutlineKbError::Completion(format!(
                "HTTP {status}: {}",
                error_detail(&body)
            )));
        }

        let answer = parse_answer(&body)?;
        debug!(answer_len = answer.len(), "completion received");
        Ok(answer)
    }
}

/// Extract the first choice's trimmed content from a response body.
fn parse_answer(body: &str) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| OutlineKbError::Completion(format!("malformed response: {e}")))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| OutlineKbError::Completion("empty response".into()))
}

/// Human-readable reason from an error body.
fn error_detail(body: &str) -> String {
    if let Ok(api) = serde_json::from_str::<ApiErrorBody>(body) {
        return api.error.message;
    }
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}
