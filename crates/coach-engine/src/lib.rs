//! Chat orchestration: trigger classifiers, the notification policy, summary
//! dispatch, the per-message controller and the inactivity sweeper.

pub mod controller;
pub mod error;
pub mod notifier;
pub mod policy;
pub mod prompt;
pub mod sweeper;
pub mod triggers;

pub use controller::{ChatReply, ControllerConfig, ConversationController};
pub use error::EngineError;
pub use notifier::{Claim, Delivery, DispatchOutcome, Notifier, NotifierConfig, Prepared};
pub use policy::{Decision, NotificationPolicy, ReasonCode};
pub use sweeper::start_expiry_sweeper;
pub use triggers::{Language, Triggers};
