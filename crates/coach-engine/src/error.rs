use std::time::Duration;

use coach_core::{GatewayError, MailError};
use coach_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("session id is missing or empty")]
    InvalidId,

    /// Empty user text. Not a failure for the caller: `prompt` is the reply.
    #[error("empty message")]
    MissingInput { prompt: String },

    #[error("completion provider is not configured")]
    UpstreamUnavailable,

    #[error("completion provider timed out after {0:?}")]
    UpstreamTimeout(Duration),

    #[error("completion provider failed: {0}")]
    Upstream(#[from] GatewayError),

    #[error("summary mail failed: {0}")]
    Mail(#[from] MailError),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidId => Self::InvalidId,
            other => Self::Store(other),
        }
    }
}

impl EngineError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidId => "invalid_id",
            Self::MissingInput { .. } => "missing_input",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::UpstreamTimeout(_) => "upstream_timeout",
            Self::Upstream(_) => "upstream_error",
            Self::Mail(_) => "mail_error",
            Self::Store(_) => "store_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_id_from_store_maps_to_invalid_id() {
        let err: EngineError = StoreError::InvalidId.into();
        assert!(matches!(err, EngineError::InvalidId));
        let err: EngineError = StoreError::NotFound("x".into()).into();
        assert_eq!(err.error_kind(), "store_error");
    }

    #[test]
    fn upstream_wraps_gateway_error() {
        let err: EngineError = GatewayError::ProviderOverloaded.into();
        assert_eq!(err.error_kind(), "upstream_error");
        assert_eq!(err.to_string(), "completion provider failed: provider overloaded");
    }
}
