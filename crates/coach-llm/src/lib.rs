//! Completion providers: an OpenAI-compatible HTTP client plus the retry and
//! fallback wrappers the chat controller talks to.

pub mod fallback;
pub mod mock;
pub mod openai;
pub mod reliable;

use std::sync::Arc;
use std::time::Duration;

use coach_core::{ApiKey, CompletionProvider};
use coach_settings::LlmSettings;
use tracing::{info, warn};

pub use fallback::FallbackProvider;
pub use openai::OpenAiProvider;
pub use reliable::{ReliableConfig, ReliableProvider};

/// Build the provider chain from settings.
///
/// Returns `None` when no endpoint has an API key; the controller then answers
/// every chat with "upstream unavailable" instead of calling out.
pub fn build_provider(settings: &LlmSettings) -> Option<Arc<dyn CompletionProvider>> {
    let attempt_timeout = Duration::from_secs(settings.timeout_secs);
    let reliable = ReliableConfig {
        max_retries: settings.max_retries,
        ..Default::default()
    };

    let mut chain: Vec<Arc<dyn CompletionProvider>> = Vec::new();

    if let Some(key) = ApiKey::non_empty(settings.api_key.as_deref()) {
        let primary = OpenAiProvider::new("openai", &settings.base_url, key, &settings.model)
            .with_request_timeout(attempt_timeout);
        chain.push(Arc::new(ReliableProvider::new(primary, reliable.clone())));
    }

    for endpoint in &settings.fallback {
        match ApiKey::non_empty(endpoint.api_key.as_deref()) {
            Some(key) => {
                let name = if endpoint.name.is_empty() { "fallback" } else { endpoint.name.as_str() };
                let provider = OpenAiProvider::new(name, &endpoint.base_url, key, &endpoint.model)
                    .with_request_timeout(attempt_timeout);
                chain.push(Arc::new(ReliableProvider::new(provider, reliable.clone())));
            }
            None => warn!(endpoint = %endpoint.name, "fallback endpoint has no API key, skipped"),
        }
    }

    match chain.len() {
        0 => {
            warn!("no completion API key configured, chat replies disabled");
            None
        }
        1 => chain.pop(),
        n => {
            info!(providers = n, "completion fallback chain enabled");
            Some(Arc::new(FallbackProvider::new(chain)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coach_settings::LlmEndpointSettings;

    #[test]
    fn no_key_means_no_provider() {
        let settings = LlmSettings::default();
        assert!(build_provider(&settings).is_none());
    }

    #[test]
    fn single_key_builds_plain_provider() {
        let settings = LlmSettings {
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        let provider = build_provider(&settings).unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.model(), "gpt-4o-mini");
    }

    #[test]
    fn fallback_endpoints_without_key_are_skipped() {
        let settings = LlmSettings {
            api_key: Some("sk-test".into()),
            fallback: vec![
                LlmEndpointSettings {
                    name: "backup".into(),
                    base_url: "http://localhost:1".into(),
                    api_key: Some("k2".into()),
                    model: "m2".into(),
                },
                LlmEndpointSettings {
                    name: "keyless".into(),
                    base_url: "http://localhost:2".into(),
                    api_key: None,
                    model: "m3".into(),
                },
            ],
            ..Default::default()
        };
        let provider = build_provider(&settings).unwrap();
        assert_eq!(provider.name(), "fallback");
    }
}
