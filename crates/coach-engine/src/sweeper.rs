use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::notifier::{DispatchOutcome, Notifier};

/// Start a background task that summarizes and drops idle sessions.
///
/// Expired sessions are removed from the store before the mail goes out, so
/// each one is notified at most once even if a sweep overlaps a new turn.
pub fn start_expiry_sweeper(
    notifier: Arc<Notifier>,
    interval: Duration,
    threshold: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let expired = notifier.store().take_expired(threshold);
            if expired.is_empty() {
                continue;
            }
            let count = expired.len();
            notifier.metrics().record_expired(count as u64);

            let mut sent = 0usize;
            for session in expired {
                let id = session.id.clone();
                match notifier.dispatch_expired(session).await {
                    Ok(DispatchOutcome::Sent(_)) => sent += 1,
                    Ok(_) => {}
                    Err(e) => warn!(session_id = %id, error = %e, "inactivity summary failed"),
                }
            }
            info!(expired = count, sent, "inactive sessions swept");
        }
    })
}
