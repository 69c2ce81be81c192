use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use coach_core::{CompletionOptions, CompletionProvider, CompletionRequest, GatewayError};

/// Retry and circuit breaker tuning for [`ReliableProvider`].
#[derive(Clone, Debug)]
pub struct ReliableConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_cooldown: Duration,
}

impl Default for ReliableConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter_factor: 0.2,
            circuit_breaker_threshold: 5,
            circuit_breaker_cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum CircuitState {
    Closed,
    Open { since: Instant },
    HalfOpen,
}

/// Wraps a provider with retry logic and a circuit breaker.
///
/// - Retries retryable errors with exponential backoff + jitter
/// - Respects `retry_after` hints from rate limit responses
/// - N consecutive failures open the circuit; after the cooldown one probe is let through
pub struct ReliableProvider<P: CompletionProvider> {
    inner: P,
    config: ReliableConfig,
    circuit_state: RwLock<CircuitState>,
    consecutive_failures: AtomicU32,
    total_retries: AtomicU64,
}

impl<P: CompletionProvider> ReliableProvider<P> {
    pub fn new(inner: P, config: ReliableConfig) -> Self {
        Self {
            inner,
            config,
            circuit_state: RwLock::new(CircuitState::Closed),
            consecutive_failures: AtomicU32::new(0),
            total_retries: AtomicU64::new(0),
        }
    }

    pub fn with_defaults(inner: P) -> Self {
        Self::new(inner, ReliableConfig::default())
    }

    fn check_circuit(&self) -> Result<(), GatewayError> {
        let state = self.circuit_state.read();
        match &*state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open { since } => {
                if since.elapsed() >= self.config.circuit_breaker_cooldown {
                    drop(state);
                    *self.circuit_state.write() = CircuitState::HalfOpen;
                    Ok(())
                } else {
                    Err(GatewayError::ProviderOverloaded)
                }
            }
        }
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let mut state = self.circuit_state.write();
        if *state != CircuitState::Closed {
            info!(provider = self.inner.name(), "circuit breaker closed after successful request");
            *state = CircuitState::Closed;
        }
    }

    fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.config.circuit_breaker_threshold {
            let mut state = self.circuit_state.write();
            if *state == CircuitState::Closed || *state == CircuitState::HalfOpen {
                warn!(
                    provider = self.inner.name(),
                    failures,
                    cooldown_secs = self.config.circuit_breaker_cooldown.as_secs(),
                    "circuit breaker opened"
                );
                *state = CircuitState::Open {
                    since: Instant::now(),
                };
            }
        }
    }

    /// Exponential backoff with jitter, unless the server suggested a delay.
    fn retry_delay(&self, attempt: u32, suggested: Option<Duration>) -> Duration {
        if let Some(delay) = suggested {
            return delay.min(self.config.max_delay);
        }

        let exp_delay = self.config.base_delay.as_millis() as f64 * 2.0_f64.powi(attempt as i32);
        let capped = exp_delay.min(self.config.max_delay.as_millis() as f64);

        let jitter_range = capped * self.config.jitter_factor;
        let jitter = (random_u64() % (jitter_range as u64 * 2 + 1)) as f64 - jitter_range;
        let final_ms = (capped + jitter).max(50.0);

        Duration::from_millis(final_ms as u64)
    }

    pub fn total_retries(&self) -> u64 {
        self.total_retries.load(Ordering::Relaxed)
    }

    pub fn circuit_state_name(&self) -> &'static str {
        match &*self.circuit_state.read() {
            CircuitState::Closed => "closed",
            CircuitState::Open { .. } => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Non-cryptographic xorshift, good enough for jitter.
fn random_u64() -> u64 {
    use std::cell::Cell;
    use std::time::SystemTime;

    thread_local! {
        static STATE: Cell<u64> = Cell::new(
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64
                | 1
        );
    }

    STATE.with(|s| {
        let mut x = s.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        s.set(x);
        x
    })
}

#[async_trait]
impl<P: CompletionProvider> CompletionProvider for ReliableProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        options: &CompletionOptions,
    ) -> Result<String, GatewayError> {
        self.check_circuit()?;

        let mut attempt = 0;
        loop {
            match self.inner.complete(request, options).await {
                Ok(reply) => {
                    self.record_success();
                    return Ok(reply);
                }
                Err(e) => {
                    if e.is_fatal() {
                        debug!(provider = self.inner.name(), kind = e.error_kind(), "fatal error, not retried");
                        self.record_failure();
                        return Err(e);
                    }
                    if !e.is_retryable() || attempt >= self.config.max_retries {
                        self.record_failure();
                        return Err(e);
                    }

                    let delay = self.retry_delay(attempt, e.suggested_delay());
                    self.total_retries.fetch_add(1, Ordering::Relaxed);

                    warn!(
                        provider = self.inner.name(),
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying completion"
                    );

                    tokio::time::sleep(delay).await;
                    self.check_circuit()?;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockProvider, MockResponse};

    fn server_error() -> MockResponse {
        MockResponse::Error(GatewayError::ServerError {
            status: 500,
            body: "internal".into(),
        })
    }

    fn fast(max_retries: u32) -> ReliableConfig {
        ReliableConfig {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..Default::default()
        }
    }

    async fn call<P: CompletionProvider>(p: &ReliableProvider<P>) -> Result<String, GatewayError> {
        p.complete(&CompletionRequest::new("sys"), &CompletionOptions::default())
            .await
    }

    #[tokio::test]
    async fn success_on_first_try() {
        let reliable = ReliableProvider::with_defaults(MockProvider::new(vec![MockResponse::text("hello")]));
        assert_eq!(call(&reliable).await.unwrap(), "hello");
        assert_eq!(reliable.total_retries(), 0);
    }

    #[tokio::test]
    async fn retries_on_retryable_error() {
        let mock = MockProvider::new(vec![server_error(), server_error(), MockResponse::text("recovered")]);
        let reliable = ReliableProvider::new(mock, fast(3));

        assert_eq!(call(&reliable).await.unwrap(), "recovered");
        assert_eq!(reliable.total_retries(), 2);
    }

    #[tokio::test]
    async fn fatal_error_not_retried() {
        let mock = MockProvider::new(vec![
            MockResponse::Error(GatewayError::AuthenticationFailed("bad key".into())),
            MockResponse::text("should not reach"),
        ]);
        let reliable = ReliableProvider::with_defaults(mock);

        let err = call(&reliable).await.unwrap_err();
        assert!(matches!(err, GatewayError::AuthenticationFailed(_)));
        assert_eq!(reliable.total_retries(), 0);
        assert_eq!(reliable.inner.call_count(), 1);
    }

    #[tokio::test]
    async fn attempt_timeout_not_retried() {
        let mock = MockProvider::new(vec![
            MockResponse::Error(GatewayError::Timeout(Duration::from_secs(30))),
            MockResponse::text("should not reach"),
        ]);
        let reliable = ReliableProvider::new(mock, fast(3));

        let err = call(&reliable).await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout(_)));
        assert_eq!(reliable.inner.call_count(), 1);
        assert_eq!(reliable.total_retries(), 0);
    }

    #[tokio::test]
    async fn max_retries_exhausted() {
        let mock = MockProvider::new(vec![server_error(), server_error(), server_error()]);
        let reliable = ReliableProvider::new(mock, fast(2));

        assert!(call(&reliable).await.is_err());
        assert_eq!(reliable.total_retries(), 2);
    }

    #[tokio::test]
    async fn circuit_breaker_trips_after_threshold() {
        let mock = MockProvider::new(vec![
            server_error(),
            server_error(),
            server_error(),
            MockResponse::text("unreachable"),
        ]);
        let config = ReliableConfig {
            circuit_breaker_threshold: 3,
            circuit_breaker_cooldown: Duration::from_secs(60),
            ..fast(0)
        };
        let reliable = ReliableProvider::new(mock, config);

        for _ in 0..3 {
            let _ = call(&reliable).await;
        }
        assert_eq!(reliable.circuit_state_name(), "open");

        let err = call(&reliable).await.unwrap_err();
        assert!(matches!(err, GatewayError::ProviderOverloaded));
        assert_eq!(reliable.inner.call_count(), 3);
    }

    #[tokio::test]
    async fn circuit_breaker_recovers_after_cooldown() {
        let mock = MockProvider::new(vec![
            server_error(),
            server_error(),
            server_error(),
            MockResponse::text("recovered"),
        ]);
        let config = ReliableConfig {
            circuit_breaker_threshold: 3,
            circuit_breaker_cooldown: Duration::from_millis(30),
            ..fast(0)
        };
        let reliable = ReliableProvider::new(mock, config);

        for _ in 0..3 {
            let _ = call(&reliable).await;
        }
        assert_eq!(reliable.circuit_state_name(), "open");

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(call(&reliable).await.unwrap(), "recovered");
        assert_eq!(reliable.circuit_state_name(), "closed");
    }

    #[test]
    fn retry_delay_respects_suggested_up_to_max() {
        let reliable = ReliableProvider::with_defaults(MockProvider::new(vec![]));
        assert_eq!(reliable.retry_delay(0, Some(Duration::from_secs(5))), Duration::from_secs(5));
        assert_eq!(reliable.retry_delay(0, Some(Duration::from_secs(60))), Duration::from_secs(8));
    }

    #[test]
    fn retry_delay_exponential_backoff() {
        let config = ReliableConfig {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.0,
            ..Default::default()
        };
        let reliable = ReliableProvider::new(MockProvider::new(vec![]), config);

        assert_eq!(reliable.retry_delay(0, None).as_millis(), 100);
        assert_eq!(reliable.retry_delay(1, None).as_millis(), 200);
        assert_eq!(reliable.retry_delay(2, None).as_millis(), 400);
        assert_eq!(reliable.retry_delay(20, None).as_millis(), 30_000);
    }

    #[test]
    fn provider_delegates_properties() {
        let reliable = ReliableProvider::with_defaults(MockProvider::new(vec![]));
        assert_eq!(reliable.name(), "mock");
        assert_eq!(reliable.model(), "mock-model");
    }
}
