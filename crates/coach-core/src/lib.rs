//! Shared vocabulary for the coach service: identifiers, transcript turns,
//! and the two outbound seams (completion provider, mail sender).

pub mod errors;
pub mod ids;
pub mod mail;
pub mod messages;
pub mod provider;
pub mod security;

pub use errors::{GatewayError, MailError};
pub use ids::{RequestId, SessionId};
pub use mail::{MailSender, OutboundMail};
pub use messages::{ChatMessage, Role, Turn};
pub use provider::{CompletionOptions, CompletionProvider, CompletionRequest};
pub use security::ApiKey;
