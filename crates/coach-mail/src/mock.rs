use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use coach_core::{MailError, MailSender, OutboundMail};

/// Captures outbound mail instead of delivering it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutboundMail>>,
    failing: AtomicBool,
    refused: Mutex<HashSet<String>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every send fails with a transport error.
    pub fn failing() -> Self {
        let mailer = Self::default();
        mailer.set_failing(true);
        mailer
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Fail only for this recipient.
    pub fn refuse(&self, address: &str) {
        self.refused.lock().insert(address.to_string());
    }

    pub fn sent(&self) -> Vec<OutboundMail> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, address: &str) -> Vec<OutboundMail> {
        self.sent
            .lock()
            .iter()
            .filter(|m| m.to == address)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MailSender for RecordingMailer {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, mail: &OutboundMail) -> Result<(), MailError> {
        if self.failing.load(Ordering::Relaxed) || self.refused.lock().contains(&mail.to) {
            return Err(MailError::Transport(format!("refused delivery to {}", mail.to)));
        }
        self.sent.lock().push(mail.clone());
        Ok(())
    }
}
