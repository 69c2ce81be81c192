use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use coach_core::{CompletionOptions, CompletionProvider, CompletionRequest, GatewayError};

/// Pre-programmed responses for deterministic testing without API calls.
#[derive(Clone, Debug)]
pub enum MockResponse {
    Text(String),
    Error(GatewayError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn text(text: &str) -> Self {
        Self::Text(text.to_string())
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock provider that returns pre-programmed responses in sequence.
pub struct MockProvider {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<CompletionRequest>>,
    call_count: AtomicUsize,
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// The most recent request seen, if any.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        _options: &CompletionOptions,
    ) -> Result<String, GatewayError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().push(request.clone());

        let Some(mut current) = self.responses.lock().pop_front() else {
            return Err(GatewayError::InvalidRequest(format!(
                "MockProvider: no response configured for call {idx}"
            )));
        };

        loop {
            match current {
                MockResponse::Text(text) => return Ok(text),
                MockResponse::Error(e) => return Err(e),
                MockResponse::Delay(duration, inner) => {
                    tokio::time::sleep(duration).await;
                    current = *inner;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequential_responses() {
        let mock = MockProvider::new(vec![MockResponse::text("first"), MockResponse::text("second")]);
        let req = CompletionRequest::new("sys");
        let opts = CompletionOptions::default();

        assert_eq!(mock.complete(&req, &opts).await.unwrap(), "first");
        assert_eq!(mock.complete(&req, &opts).await.unwrap(), "second");
        assert_eq!(mock.call_count(), 2);
        assert!(mock.complete(&req, &opts).await.is_err());
    }

    #[tokio::test]
    async fn error_response() {
        let mock = MockProvider::new(vec![MockResponse::Error(GatewayError::AuthenticationFailed(
            "bad".into(),
        ))]);
        let result = mock
            .complete(&CompletionRequest::new("sys"), &CompletionOptions::default())
            .await;
        assert!(matches!(result, Err(GatewayError::AuthenticationFailed(_))));
    }

    #[tokio::test]
    async fn records_last_request() {
        let mock = MockProvider::new(vec![MockResponse::text("ok")]);
        let req = CompletionRequest::new("sys").with_directive("Reply in English.");
        mock.complete(&req, &CompletionOptions::default()).await.unwrap();
        assert_eq!(mock.last_request().unwrap().directives, vec!["Reply in English."]);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_response() {
        let mock = MockProvider::new(vec![MockResponse::delayed(
            Duration::from_secs(5),
            MockResponse::text("after delay"),
        )]);

        let start = tokio::time::Instant::now();
        let reply = mock
            .complete(&CompletionRequest::new("sys"), &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(reply, "after delay");
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
