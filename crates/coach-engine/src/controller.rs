use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use coach_core::{
    ChatMessage, CompletionOptions, CompletionProvider, CompletionRequest, GatewayError, SessionId, Turn,
};
use coach_settings::CoachSettings;
use coach_store::SessionStore;
use coach_telemetry::ChatMetrics;

use crate::error::EngineError;
use crate::notifier::{DispatchOutcome, Notifier, Prepared};
use crate::policy::ReasonCode;
use crate::prompt;
use crate::triggers::{Language, Triggers};

/// Texts and provider tuning for the controller.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    pub system_prompt: String,
    /// Reply to an empty message.
    pub greeting: String,
    pub summary_note: String,
    pub offer_note: String,
    pub options: CompletionOptions,
    /// Bound on one provider exchange.
    pub timeout: Duration,
}

impl ControllerConfig {
    pub fn from_settings(settings: &CoachSettings) -> Self {
        Self {
            system_prompt: prompt::system_prompt(&settings.brand),
            greeting: settings.brand.greeting.clone(),
            summary_note: settings.brand.summary_note.clone(),
            offer_note: settings.brand.offer_note.clone(),
            options: CompletionOptions {
                max_tokens: Some(settings.llm.max_tokens),
                temperature: Some(settings.llm.temperature),
            },
            timeout: Duration::from_secs(settings.llm.timeout_secs),
        }
    }
}

/// Result of one chat exchange.
#[derive(Debug)]
pub struct ChatReply {
    pub reply: String,
    /// Summary trigger evaluated for this turn, if any.
    pub trigger: Option<ReasonCode>,
    pub offered: bool,
    /// Background summary send started by this turn.
    pub dispatch: Option<JoinHandle<()>>,
}

/// Runs one request/response cycle per inbound message.
pub struct ConversationController {
    store: Arc<SessionStore>,
    provider: Option<Arc<dyn CompletionProvider>>,
    notifier: Arc<Notifier>,
    triggers: Arc<Triggers>,
    config: ControllerConfig,
    metrics: Arc<ChatMetrics>,
}

fn check_id(id: &SessionId) -> Result<(), EngineError> {
    if id.is_blank() {
        Err(EngineError::InvalidId)
    } else {
        Ok(())
    }
}

impl ConversationController {
    pub fn new(
        store: Arc<SessionStore>,
        provider: Option<Arc<dyn CompletionProvider>>,
        notifier: Arc<Notifier>,
        triggers: Arc<Triggers>,
        config: ControllerConfig,
        metrics: Arc<ChatMetrics>,
    ) -> Self {
        Self {
            store,
            provider,
            notifier,
            triggers,
            config,
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<ChatMetrics> {
        &self.metrics
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn handle_user_message(
        &self,
        session_id: &SessionId,
        text: &str,
        language: Option<&str>,
    ) -> Result<ChatReply, EngineError> {
        check_id(session_id)?;

        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::MissingInput {
                prompt: self.config.greeting.clone(),
            });
        }

        let provider = self.provider.as_ref().ok_or(EngineError::UpstreamUnavailable)?;

        // Nothing is written until the provider has answered.
        let email = self.triggers.find_email(text);
        let history = self
            .store
            .get(session_id)
            .map(|s| s.messages())
            .unwrap_or_default();

        let mut request = CompletionRequest::new(&self.config.system_prompt);
        if let Some(lang) = Language::resolve(language, text) {
            request = request.with_directive(lang.directive());
        }
        let mut messages = history;
        messages.push(ChatMessage::user(text));
        request = request.with_messages(messages);

        let reply = match tokio::time::timeout(self.config.timeout, provider.complete(&request, &self.config.options)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(GatewayError::Timeout(after))) => {
                self.metrics.record_provider_timeout();
                warn!(provider = provider.name(), timeout_secs = after.as_secs(), "completion attempt timed out");
                return Err(EngineError::UpstreamTimeout(after));
            }
            Ok(Err(e)) => {
                self.metrics.record_provider_error();
                warn!(provider = provider.name(), kind = e.error_kind(), error = %e, "completion failed");
                return Err(EngineError::Upstream(e));
            }
            Err(_) => {
                self.metrics.record_provider_timeout();
                warn!(provider = provider.name(), timeout_secs = self.config.timeout.as_secs(), "completion timed out");
                return Err(EngineError::UpstreamTimeout(self.config.timeout));
            }
        };

        self.store.append_exchange(session_id, text, &reply)?;
        if let Some(email) = email {
            if self.store.set_contact_email(session_id, email)? {
                info!("contact email captured");
            }
        }
        if self.triggers.is_recommendation(&reply) {
            self.store.mark_recommended(session_id)?;
        }
        self.metrics.record_message();

        let mut out = ChatReply {
            reply,
            trigger: self.select_trigger(session_id, text),
            offered: false,
            dispatch: None,
        };

        if let Some(reason) = out.trigger {
            match self.notifier.prepare(session_id, reason) {
                Ok(Prepared::Dispatch(claim)) => {
                    let notifier = Arc::clone(&self.notifier);
                    out.dispatch = Some(tokio::spawn(async move {
                        // Failures are logged inside complete().
                        let _ = notifier.complete(claim).await;
                    }));
                    push_note(&mut out.reply, &self.config.summary_note);
                }
                Ok(Prepared::Offered) => {
                    out.offered = true;
                    push_note(&mut out.reply, &self.config.offer_note);
                }
                Ok(Prepared::Suppressed) => debug!(%reason, "summary suppressed"),
                Err(e) => warn!(%reason, error = %e, "summary evaluation failed"),
            }
        }

        Ok(out)
    }

    /// First match wins: explicit request, then goodbye, then a recommendation
    /// with a known address.
    fn select_trigger(&self, id: &SessionId, text: &str) -> Option<ReasonCode> {
        if self.triggers.is_summary_request(text) {
            return Some(ReasonCode::Manual);
        }
        if self.triggers.is_closing(text) {
            return Some(ReasonCode::ClosingDetected);
        }
        let session = self.store.get(id)?;
        (session.recommendation_made && session.contact_email.is_some())
            .then_some(ReasonCode::PostRecommendation)
    }

    fn seed(&self, id: &SessionId, messages: Vec<ChatMessage>) -> Result<(), EngineError> {
        let turns: Vec<Turn> = messages
            .into_iter()
            .filter(|m| !m.content.trim().is_empty())
            .map(|m| Turn::new(m.role, m.content))
            .collect();
        if !turns.is_empty() {
            debug!(turns = turns.len(), "transcript seeded by client");
            self.store.replace_history(id, turns)?;
        }
        Ok(())
    }

    /// The explicit "send summary" action. Always sends when there is
    /// something to summarize.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn request_summary(
        &self,
        session_id: &SessionId,
        email: Option<&str>,
        messages: Vec<ChatMessage>,
    ) -> Result<DispatchOutcome, EngineError> {
        check_id(session_id)?;
        self.store.get_or_create(session_id)?;
        self.seed(session_id, messages)?;

        if let Some(raw) = email.map(str::trim).filter(|e| !e.is_empty()) {
            match self.triggers.find_email(raw) {
                Some(address) => {
                    self.store.set_contact_email(session_id, address)?;
                }
                None => warn!("ignoring malformed contact email"),
            }
        }

        self.notifier.dispatch(session_id, ReasonCode::Manual).await
    }

    /// Client-side close (reset, tab exit). Sends at most once, then forgets
    /// the session.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn end_conversation(
        &self,
        session_id: &SessionId,
        messages: Vec<ChatMessage>,
        client_reason: Option<&str>,
    ) -> Result<DispatchOutcome, EngineError> {
        check_id(session_id)?;
        self.store.get_or_create(session_id)?;
        self.seed(session_id, messages)?;
        if let Some(reason) = client_reason {
            debug!(client_reason = reason, "conversation ended by client");
        }

        if self.store.get(session_id).map_or(true, |s| s.history.is_empty()) {
            self.store.remove(session_id);
            return Ok(DispatchOutcome::Suppressed);
        }

        let outcome = self.notifier.dispatch(session_id, ReasonCode::ClosingDetected).await?;

        let already_sent = self.store.get(session_id).is_some_and(|s| s.summary_dispatched);
        if matches!(outcome, DispatchOutcome::Sent(_)) || already_sent {
            self.store.remove(session_id);
        }
        Ok(outcome)
    }
}

fn push_note(reply: &mut String, note: &str) {
    if !note.is_empty() {
        reply.push_str("\n\n");
        reply.push_str(note);
    }
}
