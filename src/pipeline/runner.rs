use super::tailer::{Tailer, TickOutcome};
use crate::config::types::PollConfig;
use crate::record::RecordParser;
use crate::render::Renderer;
use std::future::Future;
use tokio::task::JoinError;
use tracing::{debug, error, info};

/// Tick `tailer` until `shutdown` resolves, then hand it back.
///
/// Ticks run back to back with `poll.interval` between them, or
/// `poll.error_backoff` after a failed tick. Failures never leave the loop.
/// Each tick does blocking file I/O, so it runs on the blocking pool.
/// Shutdown is only observed between ticks, so an in-flight tick always
/// finishes and persists; the store is persisted once more before returning.
///
/// The only error is a tick that panicked, which takes the tailer with it.
pub async fn run_poll_loop<P, R, F>(
    mut tailer: Tailer<P, R>,
    poll: &PollConfig,
    shutdown: F,
) -> Result<Tailer<P, R>, JoinError>
where
    P: RecordParser + Send + 'static,
    R: Renderer + Send + 'static,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    info!(interval = ?poll.interval, backoff = ?poll.error_backoff, "Entering watch loop");

    let mut was_idle = false;
    loop {
        let (returned, result) = tokio::task::spawn_blocking(move || {
            let result = tailer.tick();
            (tailer, result)
        })
        .await
        .map_err(|e| {
            error!(error = %e, "Tick aborted, stopping watch loop");
            e
        })?;
        tailer = returned;

        let delay = match result {
            Ok(TickOutcome::Idle) => {
                if !was_idle {
                    info!("No transcript found yet, waiting");
                    was_idle = true;
                }
                poll.interval
            }
            Ok(outcome) => {
                was_idle = false;
                debug!(?outcome, "Tick complete");
                poll.interval
            }
            Err(e) => {
                error!(error = %e, backoff = ?poll.error_backoff, "Poll failed, backing off");
                poll.error_backoff
            }
        };

        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }

    let tailer = tokio::task::spawn_blocking(move || {
        tailer.persist();
        tailer
    })
    .await?;
    info!("Watch loop stopped, offset state saved");
    Ok(tailer)
}
