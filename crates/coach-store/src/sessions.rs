use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, instrument};

use coach_core::{ChatMessage, Role, SessionId, Turn};

use crate::error::StoreError;

/// One conversation's state.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub history: VecDeque<Turn>,
    pub contact_email: Option<String>,
    pub recommendation_made: bool,
    /// The "send summary" affordance was already surfaced once.
    pub summary_offered: bool,
    pub summary_dispatched: bool,
    /// Summary sends in flight; a manual claim may overlap an automatic one.
    pub dispatches_in_flight: u32,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            history: VecDeque::new(),
            contact_email: None,
            recommendation_made: false,
            summary_offered: false,
            summary_dispatched: false,
            dispatches_in_flight: 0,
            created_at: now,
            last_activity: now,
        }
    }

    /// At least one summary send is in flight.
    pub fn dispatch_pending(&self) -> bool {
        self.dispatches_in_flight > 0
    }

    /// History in provider format, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.history.iter().map(Turn::to_message).collect()
    }

    pub fn turns(&self) -> Vec<Turn> {
        self.history.iter().cloned().collect()
    }

    fn push(&mut self, turn: Turn, max_history: usize) {
        self.last_activity = turn.timestamp;
        self.history.push_back(turn);
        while self.history.len() > max_history {
            self.history.pop_front();
        }
    }
}

/// Owns every [`Session`]. All mutation goes through these methods; each one
/// locks a single map entry for its whole read-modify-write.
///
/// Nothing serializes whole exchanges: two overlapping chat requests for the
/// same id each build their prompt from the history they read, and their
/// turns land in completion order.
pub struct SessionStore {
    sessions: DashMap<SessionId, Session>,
    max_history: usize,
}

impl SessionStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_history: max_history.max(1),
        }
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    fn check(id: &SessionId) -> Result<(), StoreError> {
        if id.is_blank() {
            Err(StoreError::InvalidId)
        } else {
            Ok(())
        }
    }

    /// Existing session unchanged, or a fresh one.
    pub fn get_or_create(&self, id: &SessionId) -> Result<Session, StoreError> {
        Self::check(id)?;
        let entry = self.sessions.entry(id.clone()).or_insert_with(|| {
            debug!(session_id = %id, "session created");
            Session::new(id.clone())
        });
        Ok(entry.value().clone())
    }

    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    /// Append one turn, evicting the oldest beyond the bound. Refreshes
    /// `last_activity`. Creates the session when it is gone.
    #[instrument(level = "debug", skip_all, fields(session_id = %id))]
    pub fn append_turn(&self, id: &SessionId, role: Role, content: &str) -> Result<(), StoreError> {
        Self::check(id)?;
        let max = self.max_history;
        self.sessions
            .entry(id.clone())
            .or_insert_with(|| Session::new(id.clone()))
            .push(Turn::new(role, content), max);
        Ok(())
    }

    /// Append a user turn and its reply under one lock so no other turn lands
    /// between them.
    #[instrument(level = "debug", skip_all, fields(session_id = %id))]
    pub fn append_exchange(&self, id: &SessionId, user: &str, assistant: &str) -> Result<(), StoreError> {
        Self::check(id)?;
        let max = self.max_history;
        let mut session = self
            .sessions
            .entry(id.clone())
            .or_insert_with(|| Session::new(id.clone()));
        session.push(Turn::user(user), max);
        session.push(Turn::assistant(assistant), max);
        Ok(())
    }

    /// Replace the transcript with client-held turns (bounded to the newest).
    pub fn replace_history(&self, id: &SessionId, turns: Vec<Turn>) -> Result<(), StoreError> {
        Self::check(id)?;
        let max = self.max_history;
        let mut session = self
            .sessions
            .entry(id.clone())
            .or_insert_with(|| Session::new(id.clone()));
        session.history.clear();
        for turn in turns {
            session.push(turn, max);
        }
        session.last_activity = Utc::now();
        Ok(())
    }

    fn update<R>(&self, id: &SessionId, f: impl FnOnce(&mut Session) -> R) -> Result<R, StoreError> {
        Self::check(id)?;
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(f(&mut session))
    }

    pub fn mark_recommended(&self, id: &SessionId) -> Result<(), StoreError> {
        self.update(id, |s| s.recommendation_made = true)
    }

    /// Returns `true` only for the call that set the flag.
    pub fn mark_offered(&self, id: &SessionId) -> Result<bool, StoreError> {
        self.update(id, |s| !std::mem::replace(&mut s.summary_offered, true))
    }

    pub fn mark_summary_dispatched(&self, id: &SessionId) -> Result<(), StoreError> {
        self.update(id, |s| s.summary_dispatched = true)
    }

    /// First write wins. Returns `true` when the address was stored.
    #[instrument(level = "debug", skip_all, fields(session_id = %id))]
    pub fn set_contact_email(&self, id: &SessionId, email: &str) -> Result<bool, StoreError> {
        self.update(id, |s| {
            if s.contact_email.is_some() {
                false
            } else {
                s.contact_email = Some(email.to_string());
                true
            }
        })
    }

    /// Claim the right to send a summary. Automatic triggers are refused once
    /// a summary was delivered or while another send is in flight; manual
    /// ones always get through. Returns the state to summarize.
    pub fn begin_dispatch(&self, id: &SessionId, manual: bool) -> Result<Option<Session>, StoreError> {
        self.update(id, |s| {
            if !manual && (s.summary_dispatched || s.dispatch_pending()) {
                return None;
            }
            s.dispatches_in_flight += 1;
            Some(s.clone())
        })
    }

    /// Release the claim taken by [`begin_dispatch`](Self::begin_dispatch).
    pub fn finish_dispatch(&self, id: &SessionId, delivered: bool) -> Result<(), StoreError> {
        self.update(id, |s| {
            s.dispatches_in_flight = s.dispatches_in_flight.saturating_sub(1);
            if delivered {
                s.summary_dispatched = true;
            }
        })
    }

    pub fn remove(&self, id: &SessionId) -> Option<Session> {
        let removed = self.sessions.remove(id).map(|(_, s)| s);
        if removed.is_some() {
            debug!(session_id = %id, "session removed");
        }
        removed
    }

    /// Remove and return every session idle for at least `threshold`.
    pub fn take_expired(&self, threshold: Duration) -> Vec<Session> {
        self.take_expired_at(Utc::now(), threshold)
    }

    /// [`take_expired`](Self::take_expired) against an explicit clock.
    ///
    /// Each removal re-checks the idle time under the entry lock, so a turn
    /// that lands mid-sweep keeps its session alive.
    pub fn take_expired_at(&self, now: DateTime<Utc>, threshold: Duration) -> Vec<Session> {
        let threshold = chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(threshold).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let candidates: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| entry.last_activity <= cutoff)
            .map(|entry| entry.key().clone())
            .collect();

        candidates
            .into_iter()
            .filter_map(|id| {
                self.sessions
                    .remove_if(&id, |_, s| s.last_activity <= cutoff)
                    .map(|(_, s)| s)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Insert or overwrite a session wholesale.
    pub fn insert(&self, session: Session) {
        self.sessions.insert(session.id.clone(), session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(s: &str) -> SessionId {
        SessionId::from_raw(s)
    }

    #[test]
    fn get_or_create_rejects_blank_id() {
        let store = SessionStore::new(20);
        assert_eq!(store.get_or_create(&sid("")).unwrap_err(), StoreError::InvalidId);
        assert_eq!(store.get_or_create(&sid("   ")).unwrap_err(), StoreError::InvalidId);
        assert!(store.is_empty());
    }

    #[test]
    fn get_or_create_initializes_and_then_returns_existing() {
        let store = SessionStore::new(20);
        let fresh = store.get_or_create(&sid("abc")).unwrap();
        assert!(fresh.history.is_empty());
        assert!(fresh.contact_email.is_none());
        assert!(!fresh.recommendation_made && !fresh.summary_dispatched);

        store.append_turn(&sid("abc"), Role::User, "hola").unwrap();
        let again = store.get_or_create(&sid("abc")).unwrap();
        assert_eq!(again.history.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn history_never_exceeds_bound() {
        let store = SessionStore::new(4);
        let id = sid("s");
        for i in 0..10 {
            store.append_turn(&id, Role::User, &format!("m{i}")).unwrap();
            assert!(store.get(&id).unwrap().history.len() <= 4);
        }
        store.append_exchange(&id, "u", "a").unwrap();

        let history = store.get(&id).unwrap().history;
        assert_eq!(history.len(), 4);
        let contents: Vec<&str> = history.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m8", "m9", "u", "a"]);
    }

    #[test]
    fn append_exchange_keeps_order() {
        let store = SessionStore::new(20);
        let id = sid("abc");
        store.append_exchange(&id, "Hola, quiero mejorar mi FTP", "Pack 1 a 1").unwrap();
        let session = store.get(&id).unwrap();
        assert_eq!(session.history.len(), 2);
        assert_eq!(session.history[0].role, Role::User);
        assert_eq!(session.history[1].role, Role::Assistant);
    }

    #[test]
    fn contact_email_first_write_wins() {
        let store = SessionStore::new(20);
        let id = sid("abc");
        store.get_or_create(&id).unwrap();
        assert!(store.set_contact_email(&id, "ana@example.com").unwrap());
        assert!(!store.set_contact_email(&id, "otro@x.com").unwrap());
        assert_eq!(store.get(&id).unwrap().contact_email.as_deref(), Some("ana@example.com"));
    }

    #[test]
    fn setters_need_existing_session() {
        let store = SessionStore::new(20);
        assert!(matches!(store.mark_recommended(&sid("nope")), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn mark_offered_reports_first_call_only() {
        let store = SessionStore::new(20);
        let id = sid("abc");
        store.get_or_create(&id).unwrap();
        assert!(store.mark_offered(&id).unwrap());
        assert!(!store.mark_offered(&id).unwrap());
    }

    #[test]
    fn automatic_dispatch_is_claimed_once() {
        let store = SessionStore::new(20);
        let id = sid("abc");
        store.append_turn(&id, Role::User, "hola").unwrap();

        assert!(store.begin_dispatch(&id, false).unwrap().is_some());
        // In flight: a second automatic trigger is refused.
        assert!(store.begin_dispatch(&id, false).unwrap().is_none());

        store.finish_dispatch(&id, true).unwrap();
        let session = store.get(&id).unwrap();
        assert!(session.summary_dispatched);
        assert!(!session.dispatch_pending());
        assert!(store.begin_dispatch(&id, false).unwrap().is_none());

        // Manual always gets through.
        assert!(store.begin_dispatch(&id, true).unwrap().is_some());
    }

    #[test]
    fn overlapping_manual_claim_keeps_automatic_triggers_blocked() {
        let store = SessionStore::new(20);
        let id = sid("abc");
        store.append_turn(&id, Role::User, "hola").unwrap();

        store.begin_dispatch(&id, false).unwrap().unwrap();
        store.begin_dispatch(&id, true).unwrap().unwrap();
        assert_eq!(store.get(&id).unwrap().dispatches_in_flight, 2);

        // The manual send fails first; the automatic one is still running.
        store.finish_dispatch(&id, false).unwrap();
        assert!(store.get(&id).unwrap().dispatch_pending());
        assert!(store.begin_dispatch(&id, false).unwrap().is_none());

        store.finish_dispatch(&id, false).unwrap();
        assert!(!store.get(&id).unwrap().dispatch_pending());
        assert!(store.begin_dispatch(&id, false).unwrap().is_some());
    }

    #[test]
    fn failed_dispatch_can_be_retried() {
        let store = SessionStore::new(20);
        let id = sid("abc");
        store.append_turn(&id, Role::User, "hola").unwrap();

        store.begin_dispatch(&id, false).unwrap().unwrap();
        store.finish_dispatch(&id, false).unwrap();
        assert!(!store.get(&id).unwrap().summary_dispatched);
        assert!(store.begin_dispatch(&id, false).unwrap().is_some());
    }

    #[test]
    fn replace_history_is_bounded() {
        let store = SessionStore::new(3);
        let id = sid("abc");
        store.append_turn(&id, Role::User, "old").unwrap();
        let turns = (0..5).map(|i| Turn::user(format!("t{i}"))).collect();
        store.replace_history(&id, turns).unwrap();

        let history = store.get(&id).unwrap().history;
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "t2");
    }

    #[test]
    fn take_expired_removes_only_idle_sessions() {
        let store = SessionStore::new(20);
        store.append_turn(&sid("idle"), Role::User, "hola").unwrap();
        store.append_turn(&sid("busy"), Role::User, "hola").unwrap();

        let mut busy = store.get(&sid("busy")).unwrap();
        busy.last_activity = Utc::now() + chrono::Duration::hours(3);
        store.insert(busy);

        let later = Utc::now() + chrono::Duration::hours(2) + chrono::Duration::seconds(1);
        let expired = store.take_expired_at(later, Duration::from_secs(2 * 60 * 60));

        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, sid("idle"));
        assert!(store.get(&sid("idle")).is_none());
        assert!(store.get(&sid("busy")).is_some());

        // Already taken: a second sweep finds nothing.
        assert!(store.take_expired_at(later, Duration::from_secs(2 * 60 * 60)).is_empty());
    }

    #[test]
    fn remove_closes_session_and_next_turn_starts_fresh() {
        let store = SessionStore::new(20);
        let id = sid("abc");
        store.append_turn(&id, Role::User, "hola").unwrap();
        store.get_or_create(&id).unwrap();
        store.mark_summary_dispatched(&id).unwrap();

        assert!(store.remove(&id).is_some());
        let fresh = store.get_or_create(&id).unwrap();
        assert!(fresh.history.is_empty());
        assert!(!fresh.summary_dispatched);
    }

    #[test]
    fn session_serializes_camel_case() {
        let store = SessionStore::new(20);
        let session = store.get_or_create(&sid("abc")).unwrap();
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["summaryDispatched"], false);
        assert!(json["lastActivity"].is_string());
    }
}
