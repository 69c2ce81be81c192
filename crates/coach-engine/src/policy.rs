//! When does a conversation summary go out, and to whom.

use serde::Serialize;

use coach_settings::PostRecommendationMode;
use coach_store::Session;

/// Why a summary is being considered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonCode {
    AutoInactivity,
    Manual,
    ClosingDetected,
    PostRecommendation,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoInactivity => "auto-inactivity",
            Self::Manual => "manual",
            Self::ClosingDetected => "closing-detected",
            Self::PostRecommendation => "post-recommendation",
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, Self::Manual)
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Send {
        to_staff: bool,
        to_user: Option<String>,
    },
    /// Surface the "send summary" action instead of sending.
    Offer,
    Suppress,
}

impl Decision {
    fn send(session: &Session) -> Self {
        Self::Send {
            to_staff: true,
            to_user: session.contact_email.clone(),
        }
    }
}

/// Pure decision function over session state. Has no side effects; the
/// [`Notifier`](crate::Notifier) acts on what it returns.
#[derive(Clone, Copy, Debug, Default)]
pub struct NotificationPolicy {
    post_recommendation: PostRecommendationMode,
}

impl NotificationPolicy {
    pub fn new(post_recommendation: PostRecommendationMode) -> Self {
        Self { post_recommendation }
    }

    pub fn decide(&self, session: &Session, reason: ReasonCode) -> Decision {
        // At most one automatic send, counting one in flight.
        if !reason.is_manual() && (session.summary_dispatched || session.dispatch_pending()) {
            return Decision::Suppress;
        }

        match reason {
            ReasonCode::Manual => Decision::send(session),
            ReasonCode::AutoInactivity => {
                if session.history.is_empty() {
                    Decision::Suppress
                } else {
                    Decision::send(session)
                }
            }
            ReasonCode::ClosingDetected => Decision::send(session),
            ReasonCode::PostRecommendation => {
                if !session.recommendation_made || session.contact_email.is_none() {
                    return Decision::Suppress;
                }
                match self.post_recommendation {
                    PostRecommendationMode::Send => Decision::send(session),
                    PostRecommendationMode::Offer if session.summary_offered => Decision::Suppress,
                    PostRecommendationMode::Offer => Decision::Offer,
                }
            }
        }
    }
}
