#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("session id is missing or empty")]
    InvalidId,

    #[error("session not found: {0}")]
    NotFound(String),
}
