//! Outbound mail: SMTP and HTTP-API senders, an ordered fallback chain,
//! a recording mock, and the summary renderer.

pub mod fallback;
pub mod http;
pub mod mock;
pub mod render;
pub mod smtp;

use std::sync::Arc;

use coach_core::MailSender;
use coach_settings::MailSettings;
use tracing::{info, warn};

pub use fallback::FallbackMailer;
pub use http::HttpMailer;
pub use mock::RecordingMailer;
pub use render::{render_body, render_subject};
pub use smtp::SmtpMailer;

/// Build the sender chain from settings, SMTP first.
///
/// Returns `None` when no transport is fully configured. Must run inside a
/// tokio runtime (the SMTP pool spawns its idle reaper).
pub fn build_mailer(settings: &MailSettings, from_name: &str) -> Option<Arc<dyn MailSender>> {
    let mut chain: Vec<Arc<dyn MailSender>> = Vec::new();

    if let Some(smtp) = settings.smtp.as_ref().filter(|s| s.is_complete()) {
        match SmtpMailer::new(smtp, from_name) {
            Ok(mailer) => chain.push(Arc::new(mailer)),
            Err(e) => warn!(host = %smtp.host, error = %e, "SMTP sender disabled"),
        }
    }

    if let Some(http) = settings.http.as_ref().filter(|h| h.is_complete()) {
        chain.push(Arc::new(HttpMailer::new(http, from_name)));
    }

    match chain.len() {
        0 => {
            warn!("no mail transport configured, summaries will not be delivered");
            None
        }
        1 => chain.pop(),
        n => {
            info!(senders = n, "mail fallback chain enabled");
            Some(Arc::new(FallbackMailer::new(chain)))
        }
    }
}
