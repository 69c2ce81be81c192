//! Endpoint handlers. Each one parses the body, calls the controller and
//! maps the outcome onto the wire types in [`crate::api`].

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::{info_span, Instrument};

use coach_core::RequestId;
use coach_engine::{DispatchOutcome, EngineError};
use coach_telemetry::{LogRecord, MetricsSnapshot};

use crate::api::{
    self, ApiError, ChatRequest, ChatResponse, EndConversationRequest, OkResponse, SummaryRequest,
};
use crate::server::AppState;

pub async fn health() -> &'static str {
    "ok"
}

pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(req) = payload?;
    let id = api::session_id(req.session_id.as_deref())?;
    let message = req.message.unwrap_or_default();

    let span = info_span!("chat", request_id = %RequestId::new(), session_id = %id);
    let result = state
        .controller
        .handle_user_message(&id, &message, req.language.as_deref())
        .instrument(span)
        .await;

    match result {
        Ok(out) => {
            let summary = if out.dispatch.is_some() {
                Some("scheduled")
            } else if out.offered {
                Some("offered")
            } else {
                None
            };
            Ok(Json(ChatResponse {
                reply: out.reply,
                summary,
            }))
        }
        Err(EngineError::MissingInput { prompt }) => Ok(Json(ChatResponse {
            reply: prompt,
            summary: None,
        })),
        Err(e) => Err(e.into()),
    }
}

pub async fn send_summary(
    State(state): State<AppState>,
    payload: Result<Json<SummaryRequest>, JsonRejection>,
) -> Result<Json<OkResponse>, ApiError> {
    let Json(req) = payload?;
    let id = api::session_id(req.session_id.as_deref())?;

    let span = info_span!("send_summary", request_id = %RequestId::new(), session_id = %id);
    let result = state
        .controller
        .request_summary(&id, req.email.as_deref(), api::to_messages(req.messages))
        .instrument(span)
        .await;

    match result {
        Ok(outcome) => Ok(Json(OkResponse {
            ok: matches!(outcome, DispatchOutcome::Sent(_)),
        })),
        // Already logged by the notifier; the caller only learns it failed.
        Err(EngineError::Mail(_)) => Ok(Json(OkResponse { ok: false })),
        Err(e) => Err(e.into()),
    }
}

pub async fn end_conversation(
    State(state): State<AppState>,
    payload: Result<Json<EndConversationRequest>, JsonRejection>,
) -> Result<Json<OkResponse>, ApiError> {
    let Json(req) = payload?;
    let id = api::session_id(req.session_id.as_deref())?;
    let reason = req.reason.as_deref().unwrap_or("fin");

    let span = info_span!("end_conversation", request_id = %RequestId::new(), session_id = %id);
    let result = state
        .controller
        .end_conversation(&id, api::to_messages(req.messages), Some(reason))
        .instrument(span)
        .await;

    match result {
        Ok(_) => Ok(Json(OkResponse { ok: true })),
        Err(EngineError::Mail(_)) => Ok(Json(OkResponse { ok: false })),
        Err(e) => Err(e.into()),
    }
}

pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.controller.metrics().snapshot())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentLogsQuery {
    pub session_id: Option<String>,
}

pub async fn recent_logs(
    State(state): State<AppState>,
    Query(query): Query<RecentLogsQuery>,
) -> impl IntoResponse {
    let records: Vec<LogRecord> = match query.session_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => state.recent_logs.for_session(id),
        _ => state.recent_logs.snapshot(),
    };
    Json(records)
}
