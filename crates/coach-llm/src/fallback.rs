use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use coach_core::{CompletionOptions, CompletionProvider, CompletionRequest, GatewayError};

/// Tries each provider in order and returns the first reply.
///
/// Fatal errors from one endpoint (a revoked key, say) still move on to the
/// next; only when every provider failed is [`GatewayError::Exhausted`] returned.
pub struct FallbackProvider {
    providers: Vec<Arc<dyn CompletionProvider>>,
}

impl FallbackProvider {
    pub fn new(providers: Vec<Arc<dyn CompletionProvider>>) -> Self {
        Self { providers }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl CompletionProvider for FallbackProvider {
    fn name(&self) -> &str {
        "fallback"
    }

    fn model(&self) -> &str {
        self.providers.first().map(|p| p.model()).unwrap_or("none")
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        options: &CompletionOptions,
    ) -> Result<String, GatewayError> {
        let mut failures = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            match provider.complete(request, options).await {
                Ok(reply) => return Ok(reply),
                Err(e) => {
                    warn!(
                        provider = provider.name(),
                        kind = e.error_kind(),
                        error = %e,
                        "provider failed, trying next"
                    );
                    failures.push(format!("{}: {e}", provider.name()));
                }
            }
        }

        Err(GatewayError::Exhausted(failures))
    }
}
