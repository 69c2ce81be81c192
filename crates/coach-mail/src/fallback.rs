use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use coach_core::{MailError, MailSender, OutboundMail};

/// Tries each sender in order; the first success wins.
pub struct FallbackMailer {
    senders: Vec<Arc<dyn MailSender>>,
}

impl FallbackMailer {
    pub fn new(senders: Vec<Arc<dyn MailSender>>) -> Self {
        Self { senders }
    }
}

#[async_trait]
impl MailSender for FallbackMailer {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn send(&self, mail: &OutboundMail) -> Result<(), MailError> {
        let mut failures = Vec::with_capacity(self.senders.len());

        for sender in &self.senders {
            match sender.send(mail).await {
                Ok(()) => return Ok(()),
                // Every sender would refuse the same address.
                Err(e @ MailError::InvalidAddress(_)) => return Err(e),
                Err(e) => {
                    warn!(sender = sender.name(), kind = e.error_kind(), error = %e, "mail sender failed, trying next");
                    failures.push(format!("{}: {e}", sender.name()));
                }
            }
        }

        Err(MailError::AllFailed(failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingMailer;

    fn chain(senders: &[&Arc<RecordingMailer>]) -> FallbackMailer {
        FallbackMailer::new(
            senders
                .iter()
                .map(|s| Arc::clone(s) as Arc<dyn MailSender>)
                .collect(),
        )
    }

    fn mail() -> OutboundMail {
        OutboundMail::text("staff@example.com", "subject", "body")
    }

    #[tokio::test]
    async fn first_success_wins() {
        let a = Arc::new(RecordingMailer::new());
        let b = Arc::new(RecordingMailer::new());
        chain(&[&a, &b]).send(&mail()).await.unwrap();
        assert_eq!(a.sent().len(), 1);
        assert!(b.sent().is_empty());
    }

    #[tokio::test]
    async fn falls_back_on_failure() {
        let a = Arc::new(RecordingMailer::failing());
        let b = Arc::new(RecordingMailer::new());
        chain(&[&a, &b]).send(&mail()).await.unwrap();
        assert_eq!(b.sent().len(), 1);
    }

    #[tokio::test]
    async fn aggregates_all_failures() {
        let a = Arc::new(RecordingMailer::failing());
        let b = Arc::new(RecordingMailer::failing());
        match chain(&[&a, &b]).send(&mail()).await {
            Err(MailError::AllFailed(failures)) => assert_eq!(failures.len(), 2),
            other => panic!("expected AllFailed, got {other:?}"),
        }
    }
}
