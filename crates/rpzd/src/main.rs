// # rpzd - RPZ Loader Daemon
//
// This daemon is a thin integration layer. All zone logic lives in
// rpz-core; this binary only:
//
// 1. Reads its settings from environment variables
// 2. Loads and validates the YAML configuration
// 3. Wires the HTTP feed source and the PowerDNS client into a sync runner
// 4. Runs the orchestrator until SIGTERM or SIGINT
//
// ## Environment
//
// - `RPZ_CONFIG`: path to the YAML configuration (default
//   `/etc/rpz-loader/config.yaml`)
// - `RPZ_LOG_LEVEL`: trace, debug, info, warn or error (default info)
// - `RPZ_LOG_FORMAT`: `text` (default) or `json`
// - `RPZ_DRY_RUN`: `true` or `1` writes zone files without loading them,
//   overriding `dry_run` from the file
//
// ## Example
//
// ```bash
// export RPZ_CONFIG=/etc/rpz-loader/config.yaml
// export RPZ_LOG_FORMAT=json
//
// rpzd
// ```

use anyhow::{Context, Result};
use rpz_core::{
    JobMetrics, Orchestrator, OrchestratorEvent, OrchestratorOptions, RpzConfig, SyncOptions,
    SyncRunner, SyncStatus, ZoneSpec,
};
use rpz_feed_http::HttpFeedSource;
use rpz_pdns::PowerDns;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Default configuration file location
const DEFAULT_CONFIG_PATH: &str = "/etc/rpz-loader/config.yaml";

/// How long to wait for the event logger to drain after shutdown
const EVENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum RpzExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<RpzExitCode> for ExitCode {
    fn from(code: RpzExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

/// Settings read from the environment
#[derive(Debug)]
struct Settings {
    config_path: PathBuf,
    log_level: String,
    log_format: LogFormat,
    dry_run_override: Option<bool>,
}

impl Settings {
    /// Load settings from environment variables
    fn from_env() -> Result<Self> {
        Self::parse(
            env::var("RPZ_CONFIG").ok(),
            env::var("RPZ_LOG_LEVEL").ok(),
            env::var("RPZ_LOG_FORMAT").ok(),
            env::var("RPZ_DRY_RUN").ok(),
        )
    }

    fn parse(
        config_path: Option<String>,
        log_level: Option<String>,
        log_format: Option<String>,
        dry_run: Option<String>,
    ) -> Result<Self> {
        let log_level = log_level
            .unwrap_or_else(|| "info".to_string())
            .to_lowercase();
        match log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "RPZ_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                log_level
            ),
        }

        let log_format = match log_format.as_deref().map(str::to_lowercase).as_deref() {
            None | Some("") | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => anyhow::bail!(
                "RPZ_LOG_FORMAT '{}' is not valid. Valid formats: text, json",
                other
            ),
        };

        Ok(Self {
            config_path: config_path
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
            log_level,
            log_format,
            dry_run_override: dry_run.map(|v| parse_flag(&v)),
        })
    }
}

/// `true` and `1` enable a flag; anything else disables it
fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1")
}

fn init_tracing(settings: &Settings) -> Result<()> {
    let filter = EnvFilter::try_new(&settings.log_level)
        .with_context(|| format!("Invalid log level '{}'", settings.log_level))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match settings.log_format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))
}

/// Load, override and validate the configuration
fn load_config(settings: &Settings) -> Result<(RpzConfig, Vec<ZoneSpec>)> {
    let mut config = RpzConfig::load(&settings.config_path).with_context(|| {
        format!(
            "Failed to load configuration from {}",
            settings.config_path.display()
        )
    })?;

    if let Some(dry_run) = settings.dry_run_override {
        config.dry_run = dry_run;
    }

    config.validate()?;
    let zones = config.zone_specs()?;
    Ok((config, zones))
}

fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return RpzExitCode::ConfigError.into();
        }
    };

    if let Err(e) = init_tracing(&settings) {
        eprintln!("{}", e);
        return RpzExitCode::ConfigError.into();
    }

    let (config, zones) = match load_config(&settings) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("Configuration validation error: {:#}", e);
            return RpzExitCode::ConfigError.into();
        }
    };

    info!(
        "Starting rpzd daemon: {} zone(s), data_dir={}",
        zones.len(),
        config.data_dir.display()
    );
    if config.dry_run {
        warn!("Dry-run mode enabled: zone files are written but never loaded");
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return RpzExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config, zones).await {
            error!("Daemon error: {:#}", e);
            RpzExitCode::RuntimeError
        } else {
            RpzExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: RpzConfig, zones: Vec<ZoneSpec>) -> Result<()> {
    let feed = HttpFeedSource::with_timeout(config.scheduler.fetch_timeout());
    let server = PowerDns::new(
        &config.pdnsutil_path,
        &config.pdns_control_path,
        config.scheduler.command_timeout(),
    );

    let runner = SyncRunner::new(
        Arc::new(feed),
        Arc::new(server),
        SyncOptions {
            dry_run: config.dry_run,
            also_notify: config.also_notify.clone(),
            notify: config.notify,
        },
    );

    let metrics = Arc::new(JobMetrics::new());
    let (orchestrator, events) = Orchestrator::new(
        zones,
        runner,
        metrics.clone(),
        OrchestratorOptions::from(&config.scheduler),
    )?;

    for entry in orchestrator.entries() {
        info!(
            zone = %entry.zone.name,
            kind = entry.zone.kind_name(),
            triggers = entry.triggers.len(),
            "Managing zone file {}",
            entry.zone.file_path.display()
        );
    }

    let event_logger = tokio::spawn(log_events(events));

    orchestrator.run_until(shutdown_signal()).await?;

    // Dropping the orchestrator closes the event channel
    drop(orchestrator);
    if tokio::time::timeout(EVENT_DRAIN_TIMEOUT, event_logger)
        .await
        .is_err()
    {
        warn!("Event logger did not drain within {:?}", EVENT_DRAIN_TIMEOUT);
    }

    info!("Final metrics:\n{}", metrics.render_prometheus());
    info!("Shutting down daemon");
    Ok(())
}

/// Log orchestrator events until the channel closes
async fn log_events(mut events: tokio::sync::mpsc::Receiver<OrchestratorEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            OrchestratorEvent::JobCompleted { trigger, outcome } => match outcome.status {
                SyncStatus::Failed => warn!(
                    zone = %outcome.zone,
                    trigger = %trigger,
                    cause = ?outcome.failure_kind(),
                    "Zone reload failed, next attempt on schedule"
                ),
                status => info!(
                    zone = %outcome.zone,
                    trigger = %trigger,
                    status = %status,
                    duration_ms = outcome.duration.as_millis() as u64,
                    "Zone reload finished"
                ),
            },
            OrchestratorEvent::JobDropped { zone, trigger } => {
                warn!(zone = %zone, trigger = %trigger, "Queued reload dropped at shutdown")
            }
            other => tracing::debug!("Orchestrator event: {:?}", other),
        }
    }
}

/// Resolve when SIGTERM or SIGINT arrives
#[cfg(unix)]
async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to setup SIGTERM handler: {}", e);
            return ctrl_c().await;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to setup SIGINT handler: {}", e);
            return ctrl_c().await;
        }
    };

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    info!("Received shutdown signal: {}", name);
}

/// Resolve on CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn shutdown_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal: SIGINT"),
        Err(e) => {
            error!("Failed to wait for CTRL-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
