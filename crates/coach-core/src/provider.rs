use async_trait::async_trait;

use crate::errors::GatewayError;
use crate::messages::ChatMessage;

/// Options controlling generation behavior.
#[derive(Clone, Debug)]
pub struct CompletionOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_tokens: Some(600),
            temperature: Some(0.6),
        }
    }
}

/// Everything a provider receives for one exchange.
#[derive(Clone, Debug, Default)]
pub struct CompletionRequest {
    /// Fixed business instruction.
    pub system_prompt: String,
    /// Extra per-request instructions (e.g. reply language), sent after the system prompt.
    pub directives: Vec<String>,
    /// Stored history followed by the new user message.
    pub messages: Vec<ChatMessage>,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }
}

/// Stateless request/response text generation.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    async fn complete(
        &self,
        request: &CompletionRequest,
        options: &CompletionOptions,
    ) -> Result<String, GatewayError>;
}
