use async_trait::async_trait;

use crate::errors::MailError;

/// A single message handed to a mail transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMail {
    pub to: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: Option<String>,
}

impl OutboundMail {
    pub fn text(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body_text: body.into(),
            body_html: None,
        }
    }
}

/// Best-effort delivery of one message. `Ok` means the transport confirmed acceptance.
#[async_trait]
pub trait MailSender: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, mail: &OutboundMail) -> Result<(), MailError>;
}
