use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use coach_core::{ApiKey, CompletionOptions, CompletionProvider, CompletionRequest, GatewayError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for any `POST {base}/chat/completions` endpoint speaking the OpenAI
/// chat format.
pub struct OpenAiProvider {
    client: Client,
    request_timeout: Duration,
    name: String,
    endpoint: String,
    api_key: ApiKey,
    model: String,
}

impl OpenAiProvider {
    pub fn new(name: &str, base_url: &str, api_key: ApiKey, model: &str) -> Self {
        Self {
            client: build_client(REQUEST_TIMEOUT),
            request_timeout: REQUEST_TIMEOUT,
            name: name.to_string(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model: model.to_string(),
        }
    }

    /// Cap a single HTTP attempt; an attempt that runs over fails with
    /// [`GatewayError::Timeout`].
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self.request_timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_body<'a>(
        &'a self,
        request: &'a CompletionRequest,
        options: &CompletionOptions,
    ) -> ChatBody<'a> {
        let mut messages = Vec::with_capacity(request.messages.len() + request.directives.len() + 1);
        messages.push(WireMessage {
            role: "system",
            content: &request.system_prompt,
        });
        for directive in &request.directives {
            messages.push(WireMessage {
                role: "system",
                content: directive,
            });
        }
        for message in &request.messages {
            messages.push(WireMessage {
                role: message.role.as_str(),
                content: &message.content,
            });
        }

        ChatBody {
            model: &self.model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        }
    }
}

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Pull the reply text out of a chat completion body.
fn extract_reply(body: &str) -> Result<String, GatewayError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| GatewayError::MalformedResponse(format!("invalid JSON: {e}")))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GatewayError::MalformedResponse("no reply content in choices[0]".into()))
}

/// Prefer the API's own `error.message` over the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}

fn transport_error(e: reqwest::Error, timeout: Duration) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout(timeout)
    } else {
        GatewayError::NetworkError(e.to_string())
    }
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(provider = %self.name, model = %self.model))]
    async fn complete(
        &self,
        request: &CompletionRequest,
        options: &CompletionOptions,
    ) -> Result<String, GatewayError> {
        let body = self.build_body(request, options);

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, self.request_timeout))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let hint = retry_after(resp.headers());
            let text = resp.text().await.unwrap_or_default();
            return Err(match GatewayError::from_status(status, error_message(&text)) {
                GatewayError::RateLimited { .. } => GatewayError::RateLimited { retry_after: hint },
                other => other,
            });
        }

        let text = resp
            .text()
            .await
            .map_err(|e| transport_error(e, self.request_timeout))?;
        let reply = extract_reply(&text)?;
        debug!(chars = reply.len(), "completion received");
        Ok(reply)
    }
}
