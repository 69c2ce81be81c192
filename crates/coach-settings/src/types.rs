//! Settings types. Every section is `#[serde(default)]` so a settings file
//! only needs the keys it overrides.

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoachSettings {
    pub server: ServerSettings,
    pub brand: BrandSettings,
    pub llm: LlmSettings,
    pub mail: MailSettings,
    pub session: SessionSettings,
    pub triggers: TriggerSettings,
    pub telemetry: TelemetrySettings,
}

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS. Empty means permissive.
    pub allowed_origins: Vec<String>,
    /// Upper bound for a whole HTTP request, provider call included.
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            allowed_origins: Vec::new(),
            request_timeout_secs: 120,
        }
    }
}

/// Business-facing texts.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrandSettings {
    /// Signature used in mail subjects and the sender name.
    pub name: String,
    /// Reply for an empty user message.
    pub greeting: String,
    /// Appended to the reply when a summary mail was dispatched.
    pub summary_note: String,
    /// Appended to the reply when a summary is offered instead of sent.
    pub offer_note: String,
    /// Replaces the built-in business prompt when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for BrandSettings {
    fn default() -> Self {
        Self {
            name: "SALVA.COACH".to_string(),
            greeting: "Hola, soy SALVA.COACH – VELOXTREM. ¿En qué te ayudo? Cuéntame tu objetivo en bici."
                .to_string(),
            summary_note: "(Te he enviado un resumen de esta conversación por email.)".to_string(),
            offer_note: "¿Quieres que te envíe un resumen por email? Pulsa «Enviar resumen».".to_string(),
            system_prompt: None,
        }
    }
}

/// Completion provider settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmSettings {
    /// OpenAI-compatible base URL (without `/chat/completions`).
    pub base_url: String,
    /// Absent key means the provider is unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Bound on one complete provider exchange, retries included.
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Further endpoints tried in order when the primary fails.
    pub fallback: Vec<LlmEndpointSettings>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.6,
            max_tokens: 600,
            timeout_secs: 30,
            max_retries: 2,
            fallback: Vec::new(),
        }
    }
}

/// An additional OpenAI-compatible endpoint.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmEndpointSettings {
    pub name: String,
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
}

/// Outbound mail settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MailSettings {
    /// Staff inbox that receives every summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staff_address: Option<String>,
    /// Display name of the sender; defaults to the brand name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smtp: Option<SmtpSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpMailSettings>,
}

/// SMTP relay. Port 465 uses implicit TLS, anything else STARTTLS.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 587,
            user: String::new(),
            pass: String::new(),
        }
    }
}

impl SmtpSettings {
    pub fn is_complete(&self) -> bool {
        !self.host.is_empty() && !self.user.is_empty() && !self.pass.is_empty()
    }
}

/// JSON mail API (Resend-style `POST {from, to, subject, text}` with bearer auth).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpMailSettings {
    pub endpoint: String,
    pub api_key: String,
    pub from: String,
}

impl HttpMailSettings {
    pub fn is_complete(&self) -> bool {
        !self.endpoint.is_empty() && !self.api_key.is_empty() && !self.from.is_empty()
    }
}

/// What rule 5 of the notification policy does once a recommendation was made
/// and a contact address is known.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostRecommendationMode {
    /// Mail the summary right away.
    #[default]
    Send,
    /// Only suggest the "send summary" action in the reply.
    Offer,
}

/// Session lifecycle settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Turns retained per session; older turns are evicted.
    pub max_history: usize,
    /// Idle time after which a session is summarized and dropped.
    pub inactivity_secs: u64,
    /// How often the inactivity sweep runs.
    pub sweep_interval_secs: u64,
    /// Drop the session once a summary was delivered.
    pub forget_after_summary: bool,
    pub post_recommendation: PostRecommendationMode,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_history: 20,
            inactivity_secs: 7200,
            sweep_interval_secs: 60,
            forget_after_summary: false,
            post_recommendation: PostRecommendationMode::Send,
        }
    }
}

/// Overrides for the keyword catalogs. `None` keeps the built-in catalog.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TriggerSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation_keywords: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closing_phrases: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_request_phrases: Option<Vec<String>>,
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelemetrySettings {
    /// Default level; `RUST_LOG` wins when set.
    pub level: String,
    /// JSON lines on stdout, otherwise human-readable.
    pub json: bool,
    /// Warn+ records kept in memory for `/logs/recent`.
    pub recent_log_capacity: usize,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
            recent_log_capacity: 200,
        }
    }
}

impl CoachSettings {
    /// Reject values the service cannot run with.
    pub fn validate(&self) -> crate::Result<()> {
        if self.session.max_history == 0 {
            return Err(crate::SettingsError::InvalidValue(
                "session.maxHistory must be greater than 0".into(),
            ));
        }
        if self.session.sweep_interval_secs == 0 {
            return Err(crate::SettingsError::InvalidValue(
                "session.sweepIntervalSecs must be greater than 0".into(),
            ));
        }
        if self.llm.timeout_secs == 0 {
            return Err(crate::SettingsError::InvalidValue(
                "llm.timeoutSecs must be greater than 0".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(crate::SettingsError::InvalidValue(format!(
                "llm.temperature {} outside 0.0..=2.0",
                self.llm.temperature
            )));
        }
        Ok(())
    }

    /// Sender display name for summary mails.
    pub fn mail_from_name(&self) -> &str {
        self.mail.from_name.as_deref().unwrap_or(&self.brand.name)
    }
}
