use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};

use coach_core::{ApiKey, MailError, MailSender, OutboundMail};
use coach_settings::HttpMailSettings;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Sends through a JSON mail API (Resend-compatible request shape).
pub struct HttpMailer {
    client: Client,
    endpoint: String,
    api_key: ApiKey,
    from: String,
}

#[derive(Serialize)]
struct SendBody<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<&'a str>,
}

impl HttpMailer {
    pub fn new(settings: &HttpMailSettings, from_name: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            endpoint: settings.endpoint.clone(),
            api_key: ApiKey::new(settings.api_key.clone()),
            from: format!("{from_name} <{}>", settings.from),
        }
    }

    pub fn from(&self) -> &str {
        &self.from
    }
}

#[async_trait]
impl MailSender for HttpMailer {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip_all, fields(sender = "http"))]
    async fn send(&self, mail: &OutboundMail) -> Result<(), MailError> {
        if !mail.to.contains('@') {
            return Err(MailError::InvalidAddress(mail.to.clone()));
        }

        let body = SendBody {
            from: &self.from,
            to: [mail.to.as_str()],
            subject: &mail.subject,
            text: &mail.body_text,
            html: mail.body_html.as_deref(),
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(status = status.as_u16(), "mail API accepted message");
        Ok(())
    }
}
