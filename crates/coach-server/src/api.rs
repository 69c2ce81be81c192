//! Wire types for the HTTP endpoints and the JSON error mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use coach_core::{ChatMessage, Role, SessionId};
use coach_engine::EngineError;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub session_id: Option<String>,
    pub message: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub reply: String,
    /// `"scheduled"` or `"offered"` when this turn touched the summary flow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<&'static str>,
}

/// A transcript entry sent back by the widget.
#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRequest {
    pub session_id: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub messages: Vec<WireMessage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndConversationRequest {
    pub session_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<WireMessage>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub detail: String,
}

/// Client session id, rejected when missing or blank.
pub fn session_id(raw: Option<&str>) -> Result<SessionId, ApiError> {
    SessionId::parse_client(raw).ok_or(ApiError::Engine(EngineError::InvalidId))
}

/// Keep user/assistant entries with content; anything else is dropped.
pub fn to_messages(wire: Vec<WireMessage>) -> Vec<ChatMessage> {
    wire.into_iter()
        .filter_map(|m| {
            let role = Role::parse(&m.role)?;
            (!m.content.trim().is_empty()).then_some(ChatMessage {
                role,
                content: m.content,
            })
        })
        .collect()
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Engine(EngineError),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self::Engine(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Engine(e) => match e {
                EngineError::InvalidId | EngineError::MissingInput { .. } => StatusCode::BAD_REQUEST,
                EngineError::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                EngineError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
                EngineError::Upstream(_) | EngineError::Mail(_) => StatusCode::BAD_GATEWAY,
                EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            Self::BadRequest(detail) => ErrorBody {
                error: "bad_request".into(),
                detail: detail.clone(),
            },
            Self::Engine(e) => {
                let detail = match e {
                    EngineError::Upstream(g) => format!("{}: {g}", g.error_kind()),
                    other => other.to_string(),
                };
                ErrorBody {
                    error: e.error_kind().into(),
                    detail,
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coach_core::GatewayError;
    use std::time::Duration;

    #[test]
    fn status_mapping() {
        let cases = [
            (EngineError::InvalidId, StatusCode::BAD_REQUEST),
            (EngineError::UpstreamUnavailable, StatusCode::SERVICE_UNAVAILABLE),
            (EngineError::UpstreamTimeout(Duration::from_secs(30)), StatusCode::GATEWAY_TIMEOUT),
            (EngineError::Upstream(GatewayError::ProviderOverloaded), StatusCode::BAD_GATEWAY),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn upstream_detail_carries_kind() {
        let body = ApiError::from(EngineError::Upstream(GatewayError::AuthenticationFailed("bad key".into()))).body();
        assert_eq!(body.error, "upstream_error");
        assert!(body.detail.starts_with(GatewayError::AuthenticationFailed(String::new()).error_kind()));
        assert!(body.detail.contains("bad key"));
    }

    #[test]
    fn blank_session_id_is_invalid() {
        assert!(matches!(session_id(Some("  ")), Err(ApiError::Engine(EngineError::InvalidId))));
        assert!(matches!(session_id(None), Err(ApiError::Engine(EngineError::InvalidId))));
        assert_eq!(session_id(Some(" abc ")).unwrap().as_str(), "abc");
    }

    #[test]
    fn wire_messages_drop_unknown_roles_and_blanks() {
        let wire = vec![
            WireMessage { role: "user".into(), content: "hola".into() },
            WireMessage { role: "system".into(), content: "ignore".into() },
            WireMessage { role: "assistant".into(), content: "  ".into() },
            WireMessage { role: "assistant".into(), content: "Pack 1 a 1".into() },
        ];
        let messages = to_messages(wire);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::Assistant);
    }
}
