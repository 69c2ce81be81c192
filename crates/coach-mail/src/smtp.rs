use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, instrument};

use coach_core::{MailError, MailSender, OutboundMail};
use coach_settings::SmtpSettings;

const SMTP_TIMEOUT: Duration = Duration::from_secs(20);
const IMPLICIT_TLS_PORT: u16 = 465;

/// Sends through an authenticated SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings, from_name: &str) -> Result<Self, MailError> {
        let from = sender_mailbox(from_name, &settings.user)?;

        let builder = if settings.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
        }
        .map_err(|e| MailError::Transport(e.to_string()))?;

        let transport = builder
            .port(settings.port)
            .credentials(Credentials::new(settings.user.clone(), settings.pass.clone()))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Ok(Self { transport, from })
    }

    pub fn from(&self) -> &Mailbox {
        &self.from
    }

    fn build_message(&self, mail: &OutboundMail) -> Result<Message, MailError> {
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|_| MailError::InvalidAddress(mail.to.clone()))?;

        let builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.clone());

        let message = match &mail.body_html {
            Some(html) => builder.multipart(MultiPart::alternative_plain_html(
                mail.body_text.clone(),
                html.clone(),
            )),
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(mail.body_text.clone()),
        };

        message.map_err(|e| MailError::Transport(e.to_string()))
    }
}

/// `"<name> <address>"` for the From header.
pub(crate) fn sender_mailbox(name: &str, address: &str) -> Result<Mailbox, MailError> {
    let address = address
        .parse()
        .map_err(|_| MailError::InvalidAddress(address.to_string()))?;
    Ok(Mailbox::new(Some(name.to_string()), address))
}

#[async_trait]
impl MailSender for SmtpMailer {
    fn name(&self) -> &str {
        "smtp"
    }

    #[instrument(skip_all, fields(sender = "smtp"))]
    async fn send(&self, mail: &OutboundMail) -> Result<(), MailError> {
        let message = self.build_message(mail)?;
        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        debug!(code = %response.code(), "smtp accepted message");
        Ok(())
    }
}
