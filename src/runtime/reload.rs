//! Background reload of the raw configuration source.
//!
//! # Responsibilities
//! - Periodically (or on demand) load a fresh raw snapshot
//! - Diff it against the previous snapshot over registered keys only
//! - Build, fill and publish a new default bundle when something changed
//!
//! # Design Decisions
//! - A failed load keeps the previous bundle and the previous baseline
//! - Cycles are serialized: a manual reload waits for a running periodic one
//! - The loader runs on the blocking pool, the loop itself never blocks

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, Notify};
use tokio::time::{self, MissedTickBehavior};

use crate::config::loader::RawSourceLoader;
use crate::config::schema::ReloadConfig;
use crate::observability::metrics;
use crate::registry::ConfigKey;
use crate::runtime::context::DynamicConfig;

/// Answer to a manual reload while dynamic loading is off.
pub const LOADING_DISABLED: &str = "Dynamic configuration loading is disabled.";

/// Phase of the reload task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ReloadState {
    Idle = 0,
    Reloading = 1,
    NoChange = 2,
    Updated = 3,
    Failed = 4,
}

impl From<u8> for ReloadState {
    fn from(v: u8) -> Self {
        match v {
            1 => ReloadState::Reloading,
            2 => ReloadState::NoChange,
            3 => ReloadState::Updated,
            4 => ReloadState::Failed,
            _ => ReloadState::Idle,
        }
    }
}

/// Result of one reload cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReloadOutcome {
    NoChange,
    Updated {
        changed: Vec<ConfigKey>,
        generation: u64,
    },
    Failed {
        error: String,
    },
}

impl ReloadOutcome {
    fn state(&self) -> ReloadState {
        match self {
            ReloadOutcome::NoChange => ReloadState::NoChange,
            ReloadOutcome::Updated { .. } => ReloadState::Updated,
            ReloadOutcome::Failed { .. } => ReloadState::Failed,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ReloadOutcome::NoChange => "no_change",
            ReloadOutcome::Updated { .. } => "updated",
            ReloadOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReloadError {
    #[error("Dynamic configuration loading is disabled.")]
    Disabled,
}

/// Point-in-time view of the reload task for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadStatus {
    pub enabled: bool,
    pub state: ReloadState,
    pub last_result: ReloadState,
    pub cycles: u64,
    pub failures: u64,
    pub interval_secs: u64,
}

/// Reloads the raw source and republishes the default bundle.
pub struct ReloadTask {
    ctx: Arc<DynamicConfig>,
    loader: Box<dyn RawSourceLoader>,
    enabled: bool,
    interval: Duration,
    trigger: Arc<Notify>,
    cycle: Mutex<()>,
    state: AtomicU8,
    last_result: AtomicU8,
    cycles: AtomicU64,
    failures: AtomicU64,
}

impl ReloadTask {
    pub fn new(ctx: Arc<DynamicConfig>, loader: Box<dyn RawSourceLoader>, config: &ReloadConfig) -> Self {
        Self {
            ctx,
            loader,
            enabled: config.enabled,
            interval: Duration::from_secs(config.interval_secs.max(1)),
            trigger: Arc::new(Notify::new()),
            cycle: Mutex::new(()),
            state: AtomicU8::new(ReloadState::Idle as u8),
            last_result: AtomicU8::new(ReloadState::Idle as u8),
            cycles: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Notifier that makes the running loop reload immediately.
    pub fn trigger(&self) -> Arc<Notify> {
        Arc::clone(&self.trigger)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> ReloadState {
        ReloadState::from(self.state.load(Ordering::Acquire))
    }

    pub fn status(&self) -> ReloadStatus {
        ReloadStatus {
            enabled: self.enabled,
            state: self.state(),
            last_result: ReloadState::from(self.last_result.load(Ordering::Acquire)),
            cycles: self.cycles.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            interval_secs: self.interval.as_secs(),
        }
    }

    /// Manual reload, refused when dynamic loading is off.
    pub fn reload_now(&self) -> Result<ReloadOutcome, ReloadError> {
        if !self.enabled {
            tracing::info!("{}", LOADING_DISABLED);
            return Err(ReloadError::Disabled);
        }
        Ok(self.reload_once())
    }

    /// Run one cycle: load, diff, and publish if anything registered changed.
    pub fn reload_once(&self) -> ReloadOutcome {
        let _cycle = self.cycle.lock().expect("reload cycle lock poisoned");
        self.state.store(ReloadState::Reloading as u8, Ordering::Release);

        let outcome = self.run_cycle();

        match &outcome {
            ReloadOutcome::NoChange => tracing::debug!("Reload found no changes"),
            ReloadOutcome::Updated { changed, generation } => tracing::info!(
                changed = changed.len(),
                generation,
                "Reload published new configuration"
            ),
            ReloadOutcome::Failed { error } => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    source = %self.loader.describe(),
                    error = %error,
                    "Reload failed, keeping previous configuration"
                );
            }
        }

        metrics::record_reload(outcome.label());
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.last_result
            .store(outcome.state() as u8, Ordering::Release);
        self.state.store(ReloadState::Idle as u8, Ordering::Release);
        outcome
    }

    fn run_cycle(&self) -> ReloadOutcome {
        let fresh = match self.loader.load() {
            Ok(fresh) => fresh,
            Err(e) => {
                return ReloadOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        let _writer = self.ctx.writer_lock();
        let previous = self.ctx.baseline();

        let keys: BTreeSet<ConfigKey> = self
            .ctx
            .registry()
            .registered_keys()
            .into_iter()
            .map(|(_, key)| key)
            .collect();
        let changed: Vec<ConfigKey> = keys
            .into_iter()
            .filter(|key| fresh.get(key) != previous.get(key))
            .collect();

        if changed.is_empty() {
            return ReloadOutcome::NoChange;
        }

        let bundle = match self.ctx.build_bundle(&fresh) {
            Ok(bundle) => bundle,
            Err(e) => {
                return ReloadOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };
        let generation = self.ctx.publish(bundle);
        self.ctx.set_baseline(fresh);

        ReloadOutcome::Updated {
            changed,
            generation,
        }
    }

    /// Reload on every tick or trigger until shutdown.
    ///
    /// Returns immediately when dynamic loading is off.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if !self.enabled {
            tracing::info!("{}", LOADING_DISABLED);
            return;
        }

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately and initialize already loaded.
        ticker.tick().await;

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            source = %self.loader.describe(),
            "Reload task started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.trigger.notified() => {
                    tracing::debug!("Reload triggered");
                }
                _ = shutdown.recv() => {
                    tracing::info!("Reload task shutting down");
                    break;
                }
            }

            let task = Arc::clone(&self);
            if let Err(e) = tokio::task::spawn_blocking(move || task.reload_once()).await {
                tracing::error!(error = %e, "Reload cycle panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigError, RawConfig, ThrottlingConfig};

    #[derive(Clone, Default)]
    struct Fixed(Arc<Mutex<Option<RawConfig>>>);

    impl Fixed {
        fn set(&self, raw: Option<RawConfig>) {
            *self.0.lock().unwrap() = raw;
        }
    }

    impl RawSourceLoader for Fixed {
        fn load(&self) -> Result<RawConfig, ConfigError> {
            self.0.lock().unwrap().clone().ok_or_else(|| ConfigError::Io {
                path: "fixed".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            })
        }

        fn describe(&self) -> String {
            "fixed".to_string()
        }
    }

    fn source(value: &str) -> RawConfig {
        let mut raw = RawConfig::new();
        raw.set("SEC", "V", value);
        raw.set("OTHER", "UNREGISTERED", value);
        raw
    }

    #[test]
    fn test_state_from_u8() {
        for state in [
            ReloadState::Idle,
            ReloadState::Reloading,
            ReloadState::NoChange,
            ReloadState::Updated,
            ReloadState::Failed,
        ] {
            assert_eq!(ReloadState::from(state as u8), state);
        }
        assert_eq!(ReloadState::from(200), ReloadState::Idle);
    }

    #[test]
    fn test_reload_outcomes() {
        let ctx = Arc::new(DynamicConfig::new(&ThrottlingConfig::default()));
        let value = ctx.register("SEC", "V", 0i64);
        ctx.initialize(source("1")).unwrap();

        let loader = Fixed::default();
        loader.set(Some(source("1")));
        let task = ReloadTask::new(
            Arc::clone(&ctx),
            Box::new(loader.clone()),
            &ReloadConfig::default(),
        );

        assert_eq!(task.reload_once(), ReloadOutcome::NoChange);

        loader.set(Some(source("2")));
        assert_eq!(
            task.reload_once(),
            ReloadOutcome::Updated {
                changed: vec![ConfigKey::new("SEC", "V")],
                generation: 2
            }
        );
        assert_eq!(*value.value(&ctx.current()), 2);

        loader.set(None);
        assert!(matches!(task.reload_once(), ReloadOutcome::Failed { .. }));
        assert_eq!(*value.value(&ctx.current()), 2);

        let status = task.status();
        assert_eq!(status.cycles, 3);
        assert_eq!(status.failures, 1);
        assert_eq!(status.last_result, ReloadState::Failed);
        assert_eq!(status.state, ReloadState::Idle);
    }

    #[test]
    fn test_manual_reload_when_disabled() {
        let ctx = Arc::new(DynamicConfig::new(&ThrottlingConfig::default()));
        ctx.initialize(RawConfig::new()).unwrap();
        let config = ReloadConfig {
            enabled: false,
            ..ReloadConfig::default()
        };
        let task = ReloadTask::new(ctx, Box::new(Fixed::default()), &config);

        let err = task.reload_now().unwrap_err();
        assert_eq!(err.to_string(), "Dynamic configuration loading is disabled.");
        assert_eq!(task.status().cycles, 0);
    }
}
