//! OS signal handling.
//!
//! # Design Decisions
//! - ctrl-c and SIGTERM end the wait so the caller can shut down
//! - SIGHUP fires the reload trigger and keeps waiting

use std::sync::Arc;

use tokio::sync::Notify;

/// Wait until a termination signal arrives, forwarding SIGHUP to `reload`.
///
/// Returns the name of the signal that ended the wait.
#[cfg(unix)]
pub async fn wait_for_shutdown(reload: Arc<Notify>) -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                return Ok("SIGINT");
            }
            _ = terminate.recv() => return Ok("SIGTERM"),
            _ = hangup.recv() => {
                tracing::info!("SIGHUP received, reloading configuration");
                reload.notify_one();
            }
        }
    }
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown(_reload: Arc<Notify>) -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
