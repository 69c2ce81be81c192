//! In-memory session state. Process restart loses every session.

pub mod error;
pub mod sessions;

pub use error::StoreError;
pub use sessions::{Session, SessionStore};
