//! Raw source file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::Notify;

/// Watches the raw configuration file and wakes the reload task when it changes.
///
/// The watcher only signals; loading, diffing and publishing stay in the
/// reload task so a change is never applied twice.
pub struct ConfigWatcher {
    path: PathBuf,
    trigger: Arc<Notify>,
}

impl ConfigWatcher {
    pub fn new(path: &Path, trigger: Arc<Notify>) -> Self {
        Self {
            path: path.to_path_buf(),
            trigger,
        }
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let trigger = Arc::clone(&self.trigger);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Raw config change detected, requesting reload");
                        trigger.notify_one();
                    }
                }
                Err(e) => tracing::error!(error = %e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}
