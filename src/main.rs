//! # coach
//!
//! Chat coach service binary: loads settings, wires the provider, mailer,
//! session store and controller together and serves HTTP until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use coach_engine::{
    start_expiry_sweeper, ControllerConfig, ConversationController, NotificationPolicy, Notifier,
    NotifierConfig, Triggers,
};
use coach_server::{AppState, ServerConfig};
use coach_settings::CoachSettings;
use coach_store::SessionStore;
use coach_telemetry::TelemetryConfig;

/// Sales-coach chat backend.
#[derive(Parser, Debug)]
#[command(name = "coach", about = "Chat coach backend")]
struct Cli {
    /// Settings file (defaults to ~/.coach/settings.json).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,
}

fn load(cli: &Cli) -> Result<CoachSettings> {
    let mut settings = match &cli.config {
        Some(path) => coach_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => coach_settings::load_settings().context("Failed to load settings")?,
    };
    if let Some(host) = &cli.host {
        settings.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let settings = load(&cli)?;

    let telemetry = coach_telemetry::init_telemetry(TelemetryConfig {
        log_level: settings.telemetry.level.clone(),
        json: settings.telemetry.json,
        recent_capacity: settings.telemetry.recent_log_capacity,
        ..Default::default()
    });
    let metrics = telemetry.metrics();

    let provider = coach_llm::build_provider(&settings.llm);
    let mailer = coach_mail::build_mailer(&settings.mail, settings.mail_from_name());
    if settings.mail.staff_address.is_none() {
        tracing::warn!("no staff address configured, summaries go to users only");
    }

    let triggers = Triggers::new(&settings.triggers).context("Invalid trigger phrase catalog")?;
    let store = Arc::new(SessionStore::new(settings.session.max_history));

    let notifier = Arc::new(Notifier::new(
        Arc::clone(&store),
        mailer,
        NotificationPolicy::new(settings.session.post_recommendation),
        NotifierConfig {
            brand: settings.brand.name.clone(),
            staff_address: settings.mail.staff_address.clone(),
            forget_after_summary: settings.session.forget_after_summary,
        },
        Arc::clone(&metrics),
    ));

    let controller = Arc::new(ConversationController::new(
        Arc::clone(&store),
        provider,
        Arc::clone(&notifier),
        Arc::new(triggers),
        ControllerConfig::from_settings(&settings),
        metrics,
    ));

    let cancel = CancellationToken::new();
    let sweeper = start_expiry_sweeper(
        notifier,
        Duration::from_secs(settings.session.sweep_interval_secs),
        Duration::from_secs(settings.session.inactivity_secs),
        cancel.clone(),
    );

    let state = AppState {
        controller,
        recent_logs: telemetry.recent_logs(),
    };
    let server = coach_server::start(ServerConfig::from_settings(&settings.server), state)
        .await
        .with_context(|| {
            format!(
                "Failed to bind {}:{}",
                settings.server.host, settings.server.port
            )
        })?;

    tracing::info!(port = server.port, model = %settings.llm.model, "coach ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!(sessions = store.len(), "shutting down");
    cancel.cancel();
    server.shutdown().await;
    let _ = sweeper.await;

    Ok(())
}
