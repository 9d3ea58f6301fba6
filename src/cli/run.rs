use crate::config::parse::ConfigError;
use crate::config::types::Config;
use crate::pipeline::{run_poll_loop, Tailer, TickError, TickOutcome};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("no session transcript found in {}", .0.display())]
    NoSessionFile(PathBuf),

    #[error("processing failed: {0}")]
    Tick(#[from] TickError),

    #[error("watch loop aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Follow the active transcript until Ctrl+C or SIGTERM.
pub async fn run(config_path: Option<PathBuf>) -> Result<(), RunError> {
    let config = crate::config::load_config(config_path.as_deref())?;
    log_startup(&config, config_path.as_ref());

    let tailer = Tailer::from_config(&config);
    run_poll_loop(tailer, &config.poll, shutdown_signal()).await?;

    info!("Conversation logger stopped");
    Ok(())
}

/// Process whatever is pending in the active transcript, then return.
pub fn once(config_path: Option<PathBuf>) -> Result<(), RunError> {
    let config = crate::config::load_config(config_path.as_deref())?;
    log_startup(&config, config_path.as_ref());

    match process_pending(&config)? {
        TickOutcome::Processed(report) => {
            info!(session = %report.identity, entries = report.records, "One-time processing complete");
        }
        TickOutcome::Vanished(identity) => {
            warn!(session = %identity, "Transcript disappeared while processing");
        }
        TickOutcome::Idle => {}
    }
    Ok(())
}

/// Run a single tick with a freshly loaded store.
///
/// Finding no transcript at all is an error here, unlike in the watch loop,
/// which just keeps waiting.
pub fn process_pending(config: &Config) -> Result<TickOutcome, RunError> {
    let mut tailer = Tailer::from_config(config);
    match tailer.tick()? {
        TickOutcome::Idle => Err(RunError::NoSessionFile(config.sessions.dir.clone())),
        outcome => Ok(outcome),
    }
}

fn log_startup(config: &Config, config_path: Option<&PathBuf>) {
    info!(
        config = %config_path.map(|p| p.display().to_string()).unwrap_or_else(|| "(defaults)".to_string()),
        sessions = %config.sessions.dir.display(),
        conversations = %config.output.dir.display(),
        state = %config.state.path.display(),
        timezone = %config.output.timezone,
        "Starting conversation logger"
    );

    if let Err(e) = fs::create_dir_all(&config.output.dir) {
        warn!(dir = %config.output.dir.display(), error = %e, "Could not create conversations directory");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Could not listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
