use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use coach_core::{MailError, MailSender, OutboundMail, SessionId};
use coach_mail::{render_body, render_subject};
use coach_store::{Session, SessionStore};
use coach_telemetry::ChatMetrics;

use crate::error::EngineError;
use crate::policy::{Decision, NotificationPolicy, ReasonCode};

#[derive(Clone, Debug, Default)]
pub struct NotifierConfig {
    /// Signature used in the subject line.
    pub brand: String,
    /// Staff inbox; without it only the user copy is sent.
    pub staff_address: Option<String>,
    /// Drop the session once a summary was delivered.
    pub forget_after_summary: bool,
}

/// A granted right to send one summary.
#[derive(Clone, Debug)]
pub struct Claim {
    pub session: Session,
    pub reason: ReasonCode,
    pub to_staff: bool,
    pub to_user: Option<String>,
    /// The session is no longer in the store (expired).
    detached: bool,
}

#[derive(Debug)]
pub enum Prepared {
    Dispatch(Claim),
    Offered,
    Suppressed,
}

/// Which recipients confirmed delivery.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    pub staff: bool,
    pub user: bool,
}

impl Delivery {
    pub fn delivered(&self) -> bool {
        self.staff || self.user
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent(Delivery),
    Offered,
    Suppressed,
}

/// Applies [`NotificationPolicy`] decisions: claims the dispatch in the
/// store, renders the summary and hands it to the mail sender.
pub struct Notifier {
    store: Arc<SessionStore>,
    mailer: Option<Arc<dyn MailSender>>,
    policy: NotificationPolicy,
    config: NotifierConfig,
    metrics: Arc<ChatMetrics>,
}

impl Notifier {
    pub fn new(
        store: Arc<SessionStore>,
        mailer: Option<Arc<dyn MailSender>>,
        policy: NotificationPolicy,
        config: NotifierConfig,
        metrics: Arc<ChatMetrics>,
    ) -> Self {
        Self {
            store,
            mailer,
            policy,
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

    /// Decide for a live session and, on `Send`, claim the dispatch.
    pub fn prepare(&self, id: &SessionId, reason: ReasonCode) -> Result<Prepared, EngineError> {
        let session = self
            .store
            .get(id)
            .ok_or_else(|| coach_store::StoreError::NotFound(id.to_string()))?;

        match self.policy.decide(&session, reason) {
            Decision::Suppress => Ok(Prepared::Suppressed),
            Decision::Offer => {
                if self.store.mark_offered(id)? {
                    Ok(Prepared::Offered)
                } else {
                    Ok(Prepared::Suppressed)
                }
            }
            Decision::Send { .. } if self.mailer.is_none() => {
                debug!(%reason, "no mail transport, summary not claimed");
                Ok(Prepared::Suppressed)
            }
            Decision::Send { to_staff, to_user } => {
                match self.store.begin_dispatch(id, reason.is_manual())? {
                    Some(session) => Ok(Prepared::Dispatch(Claim {
                        session,
                        reason,
                        to_staff,
                        to_user,
                        detached: false,
                    })),
                    None => Ok(Prepared::Suppressed),
                }
            }
        }
    }

    /// Decide for a session already taken out of the store.
    pub fn prepare_detached(&self, session: Session, reason: ReasonCode) -> Prepared {
        match self.policy.decide(&session, reason) {
            Decision::Send { to_staff, to_user } => Prepared::Dispatch(Claim {
                session,
                reason,
                to_staff,
                to_user,
                detached: true,
            }),
            Decision::Offer | Decision::Suppress => Prepared::Suppressed,
        }
    }

    /// Send a claimed summary and record the result on the session.
    #[instrument(skip_all, fields(session_id = %claim.session.id, reason = %claim.reason))]
    pub async fn complete(&self, claim: Claim) -> Result<Delivery, EngineError> {
        let result = self.deliver(&claim).await;
        let delivered = matches!(&result, Ok(d) if d.delivered());
        self.metrics.record_summary(delivered);

        let id = &claim.session.id;
        if !claim.detached {
            if let Err(e) = self.store.finish_dispatch(id, delivered) {
                debug!(error = %e, "session gone before dispatch finished");
            }
            if delivered && self.config.forget_after_summary {
                self.store.remove(id);
            }
        }

        match result {
            Ok(delivery) => {
                info!(staff = delivery.staff, user = delivery.user, "summary sent");
                Ok(delivery)
            }
            Err(e) => {
                warn!(kind = e.error_kind(), error = %e, "summary not sent");
                Err(e.into())
            }
        }
    }

    /// Decide, claim and send in one step.
    pub async fn dispatch(&self, id: &SessionId, reason: ReasonCode) -> Result<DispatchOutcome, EngineError> {
        match self.prepare(id, reason)? {
            Prepared::Dispatch(claim) => self.complete(claim).await.map(DispatchOutcome::Sent),
            Prepared::Offered => Ok(DispatchOutcome::Offered),
            Prepared::Suppressed => Ok(DispatchOutcome::Suppressed),
        }
    }

    /// Inactivity notification for a session the sweeper removed.
    pub async fn dispatch_expired(&self, session: Session) -> Result<DispatchOutcome, EngineError> {
        match self.prepare_detached(session, ReasonCode::AutoInactivity) {
            Prepared::Dispatch(claim) => self.complete(claim).await.map(DispatchOutcome::Sent),
            _ => Ok(DispatchOutcome::Suppressed),
        }
    }

    fn recipients(&self, claim: &Claim) -> (Option<String>, Option<String>) {
        let staff = if claim.to_staff {
            self.config.staff_address.clone()
        } else {
            None
        };
        let user = claim
            .to_user
            .clone()
            .filter(|u| staff.as_deref().map_or(true, |s| !s.eq_ignore_ascii_case(u)));
        (staff, user)
    }

    async fn deliver(&self, claim: &Claim) -> Result<Delivery, MailError> {
        if claim.session.history.is_empty() {
            return Err(MailError::EmptyTranscript);
        }
        let mailer = self.mailer.as_ref().ok_or(MailError::NotConfigured)?;

        let (staff, user) = self.recipients(claim);
        if staff.is_none() && user.is_none() {
            return Err(MailError::NoRecipients);
        }

        let subject = render_subject(&self.config.brand, claim.reason.as_str());
        let body = render_body(&claim.session.turns());

        let mut delivery = Delivery::default();
        let mut failures = Vec::new();

        if let Some(to) = staff {
            match mailer.send(&OutboundMail::text(&to, &subject, &body)).await {
                Ok(()) => delivery.staff = true,
                Err(e) => failures.push(format!("staff: {e}")),
            }
        }
        if let Some(to) = user {
            match mailer.send(&OutboundMail::text(&to, &subject, &body)).await {
                Ok(()) => delivery.user = true,
                Err(e) => failures.push(format!("user: {e}")),
            }
        }

        if delivery.delivered() {
            if !failures.is_empty() {
                warn!(failures = ?failures, "summary partially delivered");
            }
            Ok(delivery)
        } else {
            Err(MailError::AllFailed(failures))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coach_core::Role;
    use coach_mail::RecordingMailer;
    use coach_settings::PostRecommendationMode;

    struct Fixture {
        store: Arc<SessionStore>,
        mailer: Arc<RecordingMailer>,
        metrics: Arc<ChatMetrics>,
        notifier: Notifier,
    }

    fn fixture(config: NotifierConfig) -> Fixture {
        let store = Arc::new(SessionStore::new(20));
        let mailer = Arc::new(RecordingMailer::new());
        let metrics = Arc::new(ChatMetrics::default());
        let notifier = Notifier::new(
            Arc::clone(&store),
            Some(Arc::clone(&mailer) as Arc<dyn MailSender>),
            NotificationPolicy::new(PostRecommendationMode::Send),
            config,
            Arc::clone(&metrics),
        );
        Fixture {
            store,
            mailer,
            metrics,
            notifier,
        }
    }

    #[tokio::test]
    async fn nothing_is_claimed_without_a_mailer() {
        let store = Arc::new(SessionStore::new(20));
        let notifier = Notifier::new(
            Arc::clone(&store),
            None,
            NotificationPolicy::new(PostRecommendationMode::Send),
            staffed(),
            Arc::new(ChatMetrics::default()),
        );
        store.append_exchange(&sid(), "hola", "Pack 1 a 1").unwrap();

        for reason in [ReasonCode::ClosingDetected, ReasonCode::Manual] {
            assert!(matches!(notifier.prepare(&sid(), reason).unwrap(), Prepared::Suppressed));
        }
        let session = store.get(&sid()).unwrap();
        assert!(!session.dispatch_pending());
        assert!(!session.summary_dispatched);
    }

    fn staffed() -> NotifierConfig {
        NotifierConfig {
            brand: "SALVA.COACH".into(),
            staff_address: Some("staff@veloxtrem.com".into()),
            forget_after_summary: false,
        }
    }

    fn sid() -> SessionId {
        SessionId::from_raw("abc")
    }

    #[tokio::test]
    async fn sends_to_staff_and_user() {
        let f = fixture(staffed());
        f.store.append_exchange(&sid(), "hola", "Pack 1 a 1").unwrap();
        f.store.set_contact_email(&sid(), "ana@example.com").unwrap();

        let outcome = f.notifier.dispatch(&sid(), ReasonCode::ClosingDetected).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Sent(Delivery { staff: true, user: true }));

        let sent = f.mailer.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].subject, "Resumen SALVA.COACH (closing-detected)");
        assert!(sent[0].body_text.contains("USER: hola"));
        assert_eq!(f.mailer.sent_to("ana@example.com").len(), 1);
        assert!(f.store.get(&sid()).unwrap().summary_dispatched);
        assert_eq!(f.metrics.snapshot().summaries_sent, 1);
    }

    #[tokio::test]
    async fn second_automatic_trigger_is_suppressed() {
        let f = fixture(staffed());
        f.store.append_turn(&sid(), Role::User, "hola").unwrap();

        f.notifier.dispatch(&sid(), ReasonCode::ClosingDetected).await.unwrap();
        let again = f.notifier.dispatch(&sid(), ReasonCode::ClosingDetected).await.unwrap();
        assert_eq!(again, DispatchOutcome::Suppressed);
        assert_eq!(f.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn manual_resends_after_dispatch() {
        let f = fixture(staffed());
        f.store.append_turn(&sid(), Role::User, "hola").unwrap();

        f.notifier.dispatch(&sid(), ReasonCode::ClosingDetected).await.unwrap();
        let manual = f.notifier.dispatch(&sid(), ReasonCode::Manual).await.unwrap();
        assert!(matches!(manual, DispatchOutcome::Sent(_)));
        assert_eq!(f.mailer.sent().len(), 2);
    }

    #[tokio::test]
    async fn failed_send_leaves_flag_unset_and_can_retry() {
        let f = fixture(staffed());
        f.store.append_turn(&sid(), Role::User, "hola").unwrap();
        f.mailer.set_failing(true);

        let err = f.notifier.dispatch(&sid(), ReasonCode::ClosingDetected).await.unwrap_err();
        assert!(matches!(err, EngineError::Mail(MailError::AllFailed(_))));
        let session = f.store.get(&sid()).unwrap();
        assert!(!session.summary_dispatched);
        assert!(!session.dispatch_pending());
        assert_eq!(f.metrics.snapshot().summaries_failed, 1);

        f.mailer.set_failing(false);
        let retry = f.notifier.dispatch(&sid(), ReasonCode::ClosingDetected).await.unwrap();
        assert!(matches!(retry, DispatchOutcome::Sent(_)));
    }

    #[tokio::test]
    async fn partial_delivery_counts_as_dispatched() {
        let f = fixture(staffed());
        f.store.append_turn(&sid(), Role::User, "hola").unwrap();
        f.store.set_contact_email(&sid(), "ana@example.com").unwrap();
        f.mailer.refuse("ana@example.com");

        let outcome = f.notifier.dispatch(&sid(), ReasonCode::ClosingDetected).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Sent(Delivery { staff: true, user: false }));
        assert!(f.store.get(&sid()).unwrap().summary_dispatched);
    }

    #[tokio::test]
    async fn empty_transcript_is_refused() {
        let f = fixture(staffed());
        f.store.get_or_create(&sid()).unwrap();
        let err = f.notifier.dispatch(&sid(), ReasonCode::Manual).await.unwrap_err();
        assert!(matches!(err, EngineError::Mail(MailError::EmptyTranscript)));
        assert!(f.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn no_recipients_without_staff_or_email() {
        let f = fixture(NotifierConfig {
            brand: "SALVA.COACH".into(),
            ..Default::default()
        });
        f.store.append_turn(&sid(), Role::User, "hola").unwrap();
        let err = f.notifier.dispatch(&sid(), ReasonCode::Manual).await.unwrap_err();
        assert!(matches!(err, EngineError::Mail(MailError::NoRecipients)));
    }

    #[tokio::test]
    async fn user_equal_to_staff_gets_one_copy() {
        let f = fixture(staffed());
        f.store.append_turn(&sid(), Role::User, "hola").unwrap();
        f.store.set_contact_email(&sid(), "STAFF@veloxtrem.com").unwrap();
        f.notifier.dispatch(&sid(), ReasonCode::Manual).await.unwrap();
        assert_eq!(f.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn forget_after_summary_removes_session() {
        let f = fixture(NotifierConfig {
            forget_after_summary: true,
            ..staffed()
        });
        f.store.append_turn(&sid(), Role::User, "hola").unwrap();
        f.notifier.dispatch(&sid(), ReasonCode::Manual).await.unwrap();
        assert!(f.store.get(&sid()).is_none());
    }

    #[tokio::test]
    async fn expired_session_dispatches_without_store() {
        let f = fixture(staffed());
        f.store.append_turn(&sid(), Role::User, "hola").unwrap();
        let session = f.store.remove(&sid()).unwrap();

        let outcome = f.notifier.dispatch_expired(session).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Sent(_)));
        assert_eq!(f.mailer.sent()[0].subject, "Resumen SALVA.COACH (auto-inactivity)");
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let f = fixture(staffed());
        let err = f.notifier.dispatch(&sid(), ReasonCode::Manual).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(coach_store::StoreError::NotFound(_))));
    }
}
