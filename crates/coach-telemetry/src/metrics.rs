use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic counters for the chat service.
#[derive(Debug, Default)]
pub struct ChatMetrics {
    messages_total: AtomicU64,
    provider_errors: AtomicU64,
    provider_timeouts: AtomicU64,
    summaries_sent: AtomicU64,
    summaries_failed: AtomicU64,
    sessions_expired: AtomicU64,
}

/// Point-in-time copy of [`ChatMetrics`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub messages_total: u64,
    pub provider_errors: u64,
    pub provider_timeouts: u64,
    pub summaries_sent: u64,
    pub summaries_failed: u64,
    pub sessions_expired: u64,
}

impl ChatMetrics {
    pub fn record_message(&self) {
        self.messages_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_provider_error(&self) {
        self.provider_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_provider_timeout(&self) {
        self.provider_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_summary(&self, delivered: bool) {
        if delivered {
            self.summaries_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.summaries_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_expired(&self, n: u64) {
        self.sessions_expired.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_total: self.messages_total.load(Ordering::Relaxed),
            provider_errors: self.provider_errors.load(Ordering::Relaxed),
            provider_timeouts: self.provider_timeouts.load(Ordering::Relaxed),
            summaries_sent: self.summaries_sent.load(Ordering::Relaxed),
            summaries_failed: self.summaries_failed.load(Ordering::Relaxed),
            sessions_expired: self.sessions_expired.load(Ordering::Relaxed),
        }
    }
}
