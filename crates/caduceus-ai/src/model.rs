//! Chat-completion model client boundary.
//!
//! `ModelClient` is the one seam between the verifier and any AI provider:
//! a system prompt, mixed text/image user content, and a JSON-object reply
//! with token usage. `OpenAiClient` talks to the OpenAI chat completions
//! API; `ScriptedModelClient` replays canned replies for tests and demos.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use caduceus_contracts::error::{CaduceusError, CaduceusResult};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Token counts reported by the provider for one call.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// One piece of the user message.
#[derive(Debug, Clone)]
pub enum UserPart {
    Text(String),
    /// An inline image, sent as a `data:` URL.
    InlineImage { mime_type: String, bytes: Vec<u8> },
}

/// A fully assembled model invocation.
#[derive(Debug, Clone)]
pub struct ModelCall {
    pub model: String,
    pub system_prompt: String,
    pub user_parts: Vec<UserPart>,
}

/// The provider's reply: raw JSON text plus usage for cost accounting.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub content: String,
    pub usage: TokenUsage,
}

/// A chat-completion-style AI provider.
///
/// Implementations must request a JSON-object response; the verifier
/// schema-validates `content` and treats anything malformed as a
/// verification failure, not a crash.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, call: &ModelCall) -> CaduceusResult<ModelResponse>;
}

// ── OpenAI ────────────────────────────────────────────────────────────────────

pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, timeout: Duration) -> CaduceusResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CaduceusError::ConfigError {
                reason: format!("http client init failed: {e}"),
            })?;
        Ok(Self { client, api_key })
    }

    fn user_content(parts: &[UserPart]) -> Vec<Value> {
        parts
            .iter()
            .map(|part| match part {
                UserPart::Text(text) => json!({ "type": "text", "text": text }),
                UserPart::InlineImage { mime_type, bytes } => json!({
                    "type": "image_url",
                    "image_url": {
                        "url": format!("data:{mime_type};base64,{}", BASE64.encode(bytes)),
                    },
                }),
            })
            .collect()
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn complete(&self, call: &ModelCall) -> CaduceusResult<ModelResponse> {
        let body = json!({
            "model": call.model,
            "messages": [
                { "role": "system", "content": call.system_prompt },
                { "role": "user", "content": Self::user_content(&call.user_parts) },
            ],
            "response_format": { "type": "json_object" },
        });

        debug!(model = %call.model, parts = call.user_parts.len(), "calling chat completions");
        let response = self
            .client
            .post(format!("{OPENAI_API_BASE}/chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CaduceusError::ModelResponseInvalid {
                reason: format!("transport failure: {e}"),
            })?;

        let status = response.status();
        let payload: Value =
            response
                .json()
                .await
                .map_err(|e| CaduceusError::ModelResponseInvalid {
                    reason: format!("non-JSON provider reply: {e}"),
                })?;

        if !status.is_success() {
            let detail = payload["error"]["message"].as_str().unwrap_or("unknown");
            return Err(CaduceusError::ModelResponseInvalid {
                reason: format!("provider error {status}: {detail}"),
            });
        }

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| CaduceusError::ModelResponseInvalid {
                reason: "empty completion content".to_string(),
            })?
            .to_string();

        let usage: TokenUsage =
            serde_json::from_value(payload["usage"].clone()).unwrap_or_default();

        Ok(ModelResponse { content, usage })
    }
}

// ── Scripted client ───────────────────────────────────────────────────────────

/// Replays a fixed queue of responses; counts invocations and remembers
/// the last call it saw.
///
/// Used by tests (cache-idempotence and guard properties need "the model
/// was not called" assertions) and by the offline demo binary.
pub struct ScriptedModelClient {
    responses: Mutex<Vec<CaduceusResult<ModelResponse>>>,
    calls: Mutex<u32>,
    last_call: Mutex<Option<ModelCall>>,
}

impl ScriptedModelClient {
    pub fn new(mut responses: Vec<CaduceusResult<ModelResponse>>) -> Self {
        // Stored reversed so `pop` yields them in the given order.
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
            calls: Mutex::new(0),
            last_call: Mutex::new(None),
        }
    }

    /// A client that always answers with `content` and the given usage.
    pub fn always(content: &str, usage: TokenUsage) -> Self {
        Self::new(vec![Ok(ModelResponse {
            content: content.to_string(),
            usage,
        })])
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().expect("scripted client lock poisoned")
    }

    /// Model name of the most recent call, if any.
    pub fn last_model(&self) -> Option<String> {
        self.last_call
            .lock()
            .expect("scripted client lock poisoned")
            .as_ref()
            .map(|call| call.model.clone())
    }

    /// System prompt of the most recent call, if any.
    pub fn last_system_prompt(&self) -> Option<String> {
        self.last_call
            .lock()
            .expect("scripted client lock poisoned")
            .as_ref()
            .map(|call| call.system_prompt.clone())
    }
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    async fn complete(&self, call: &ModelCall) -> CaduceusResult<ModelResponse> {
        *self.calls.lock().expect("scripted client lock poisoned") += 1;
        *self.last_call.lock().expect("scripted client lock poisoned") = Some(call.clone());
        let mut responses = self
            .responses
            .lock()
            .expect("scripted client lock poisoned");
        if responses.len() > 1 {
            if let Some(outcome) = responses.pop() {
                return outcome;
            }
        }
        // The last remaining response is replayed indefinitely.
        match responses.first() {
            Some(outcome) => clone_outcome(outcome),
            None => Err(CaduceusError::ModelResponseInvalid {
                reason: "scripted client exhausted".to_string(),
            }),
        }
    }
}

fn clone_outcome(outcome: &CaduceusResult<ModelResponse>) -> CaduceusResult<ModelResponse> {
    match outcome {
        Ok(response) => Ok(response.clone()),
        Err(err) => Err(CaduceusError::ModelResponseInvalid {
            reason: err.to_string(),
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
