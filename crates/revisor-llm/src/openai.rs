use async_trait::async_trait;
use serde_json::json;

use crate::{FinishReason, ProviderAdapter, Request, Response, Usage};
use revisor_types::RevisorError;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_MODEL: &str = "openrouter/auto";

// ---------------------------------------------------------------------------
// OpenAiChatAdapter
// ---------------------------------------------------------------------------

/// Adapter for OpenAI-compatible `chat/completions` endpoints (OpenRouter by default).
#[derive(Debug)]
pub struct OpenAiChatAdapter {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    default_model: String,
    http_referer: Option<String>,
    x_title: Option<String>,
}

impl OpenAiChatAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            http_referer: None,
            x_title: None,
        }
    }

    /// Build from `OPENAI_API_KEY`, `OPENAI_MODEL`, `OPENAI_BASE_URL` and the
    /// optional OpenRouter attribution variables.
    pub fn from_env() -> Result<Self, RevisorError> {
        let key = std::env::var("OPENAI_API_KEY")
            .map_err(|e| RevisorError::Config(format!("OPENAI_API_KEY: {e}")))?;
        let mut adapter = Self::new(key);
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            adapter.default_model = model;
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            adapter.base_url = url;
        }
        adapter.http_referer = std::env::var("OPENROUTER_HTTP_REFERER").ok();
        adapter.x_title = std::env::var("OPENROUTER_X_TITLE").ok();
        Ok(adapter)
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    pub fn with_default_model(mut self, model: String) -> Self {
        self.default_model = model;
        self
    }

    fn build_request_body(&self, request: &Request) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|msg| json!({ "role": msg.role.as_str(), "content": msg.content }))
            .collect();

        let model = if request.model.is_empty() {
            self.default_model.as_str()
        } else {
            request.model.as_str()
        };

        let mut body = json!({
            "model": model,
            "messages": messages,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }
        body
    }

    fn parse_response(&self, body: serde_json::Value) -> Result<Response, RevisorError> {
        let id = body["id"].as_str().unwrap_or("").to_string();
        let model = body["model"].as_str().unwrap_or("").to_string();

        let choice = &body["choices"][0];
        let text = choice["message"]["content"]
            .as_str()
            .ok_or_else(|| RevisorError::ProviderError {
                provider: "openai".into(),
                status: 200,
                message: "response has no choices[0].message.content".into(),
                retryable: false,
            })?
            .to_string();

        let finish_reason = match choice["finish_reason"].as_str() {
            Some("length") => FinishReason::MaxTokens,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::EndTurn,
        };

        let usage_obj = &body["usage"];
        let input_tokens = usage_obj["prompt_tokens"].as_u64().unwrap_or(0);
        let output_tokens = usage_obj["completion_tokens"].as_u64().unwrap_or(0);
        let total_tokens = usage_obj["total_tokens"]
            .as_u64()
            .unwrap_or(input_tokens + output_tokens);

        Ok(Response {
            id,
            text,
            usage: Usage {
                input_tokens,
                output_tokens,
                total_tokens,
            },
            model,
            finish_reason,
        })
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn map_error(status: reqwest::StatusCode, body: &str) -> RevisorError {
    let status_u16 = status.as_u16();
    match status_u16 {
        429 => {
            let retry_ms = serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|v| v["error"]["retry_after"].as_f64())
                .map(|s| (s * 1000.0) as u64)
                .unwrap_or(1000);
            RevisorError::RateLimited {
                provider: "openai".into(),
                retry_after_ms: retry_ms,
            }
        }
        401 | 403 => RevisorError::AuthError {
            provider: "openai".into(),
        },
        500 | 502 | 503 | 504 => RevisorError::ProviderError {
            provider: "openai".into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: true,
        },
        _ => RevisorError::ProviderError {
            provider: "openai".into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: false,
        },
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}

// ---------------------------------------------------------------------------
// ProviderAdapter implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ProviderAdapter for OpenAiChatAdapter {
    async fn complete(&self, request: &Request) -> Result<Response, RevisorError> {
        let body = self.build_request_body(request);

        let mut http = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if let Some(ref referer) = self.http_referer {
            http = http.header("HTTP-Referer", referer);
        }
        if let Some(ref title) = self.x_title {
            http = http.header("X-Title", title);
        }

        let resp = http
            .json(&body)
            .send()
            .await
            .map_err(|e| RevisorError::ProviderError {
                provider: "openai".into(),
                status: 0,
                message: e.to_string(),
                retryable: true,
            })?;

        let status = resp.status();
        let response_body = resp.text().await.map_err(|e| RevisorError::ProviderError {
            provider: "openai".into(),
            status: 0,
            message: e.to_string(),
            retryable: true,
        })?;

        if !status.is_success() {
            return Err(map_error(status, &response_body));
        }

        let json: serde_json::Value =
            serde_json::from_str(&response_body).map_err(|e| RevisorError::ProviderError {
                provider: "openai".into(),
                status: status.as_u16(),
                message: format!("Failed to parse response JSON: {e}"),
                retryable: false,
            })?;

        self.parse_response(json)
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
