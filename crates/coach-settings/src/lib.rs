//! # coach-settings
//!
//! Configuration for the coach chat service, loaded from three layers
//! (in priority order):
//! 1. **Compiled defaults**: [`CoachSettings::default()`]
//! 2. **Settings file**: `~/.coach/settings.json` or an explicit path (deep-merged over defaults)
//! 3. **Environment variables**: `PORT`, `OPENAI_API_KEY`, `SMTP_*`, `COACH_*` (highest priority)
//!
//! Settings are loaded once by the binary and handed to each component;
//! there is no process-wide settings singleton.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_env_overrides_from, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;
