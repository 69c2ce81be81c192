mod metrics;
mod recent;

pub use metrics::{ChatMetrics, MetricsSnapshot};
pub use recent::{LogRecord, RecentLogLayer, RecentLogs};

use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: String,
    /// Per-module level overrides (e.g. "coach_llm" => "debug").
    pub module_levels: Vec<(String, String)>,
    /// JSON lines instead of human-readable output.
    pub json: bool,
    /// How many warn+ records to keep in memory.
    pub recent_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            module_levels: Vec::new(),
            json: true,
            recent_capacity: 200,
        }
    }
}

/// Handles to the in-process telemetry state.
#[derive(Clone)]
pub struct TelemetryGuard {
    recent: Arc<RecentLogs>,
    metrics: Arc<ChatMetrics>,
}

impl TelemetryGuard {
    /// Guard that is not attached to any subscriber (tests, embedded use).
    pub fn detached(recent_capacity: usize) -> Self {
        Self {
            recent: Arc::new(RecentLogs::new(recent_capacity)),
            metrics: Arc::new(ChatMetrics::default()),
        }
    }

    pub fn recent_logs(&self) -> Arc<RecentLogs> {
        Arc::clone(&self.recent)
    }

    pub fn metrics(&self) -> Arc<ChatMetrics> {
        Arc::clone(&self.metrics)
    }
}

/// Build the filter string from a default level and per-module overrides.
pub fn filter_directives(config: &TelemetryConfig) -> String {
    let mut filter_str = config.log_level.to_lowercase();
    for (module, level) in &config.module_levels {
        filter_str.push_str(&format!(",{}={}", module, level.to_lowercase()));
    }
    filter_str
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let guard = TelemetryGuard::detached(config.recent_capacity);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(&config)));

    let (json_layer, plain_layer) = if config.json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true);
        (Some(layer), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer().with_target(true)))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(plain_layer)
        .with(RecentLogLayer::new(guard.recent_logs()))
        .init();

    guard
}
