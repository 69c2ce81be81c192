use std::time::Duration;

/// Typed error hierarchy for completion-provider calls.
/// Classifies errors as fatal (don't retry), retryable, or operational.
#[derive(Clone, Debug, thiserror::Error)]
pub enum GatewayError {
    // Fatal: never retried
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    // Retryable
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("provider overloaded")]
    ProviderOverloaded,
    #[error("network error: {0}")]
    NetworkError(String),

    // Operational
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("all providers failed: {}", .0.join("; "))]
    Exhausted(Vec<String>),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::ServerError { .. }
                | Self::ProviderOverloaded
                | Self::NetworkError(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed(_) | Self::InvalidRequest(_) | Self::MalformedResponse(_)
        )
    }

    pub fn suggested_delay(&self) -> Option<Duration> {
        if let Self::RateLimited { retry_after } = self {
            *retry_after
        } else {
            None
        }
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::MalformedResponse(_) => "malformed_response",
            Self::RateLimited { .. } => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::ProviderOverloaded => "provider_overloaded",
            Self::NetworkError(_) => "network_error",
            Self::Timeout(_) => "timeout",
            Self::Exhausted(_) => "exhausted",
        }
    }

    /// Classify an HTTP status code into the appropriate error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            400 | 404 | 422 => Self::InvalidRequest(body),
            429 => Self::RateLimited { retry_after: None },
            503 | 529 => Self::ProviderOverloaded,
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}

/// Failures of the best-effort summary mail path. Never surfaced to chat users.
#[derive(Clone, Debug, thiserror::Error)]
pub enum MailError {
    #[error("no mail transport configured")]
    NotConfigured,
    #[error("no recipients for summary")]
    NoRecipients,
    #[error("transcript is empty")]
    EmptyTranscript,
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("mail API rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("all mail senders failed: {}", .0.join("; "))]
    AllFailed(Vec<String>),
}

impl MailError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::NoRecipients => "no_recipients",
            Self::EmptyTranscript => "empty_transcript",
            Self::InvalidAddress(_) => "invalid_address",
            Self::Transport(_) => "transport",
            Self::Rejected { .. } => "rejected",
            Self::AllFailed(_) => "all_failed",
        }
    }
}
