//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dynconfig::admin::{self, AdminState};
use dynconfig::config::{FileLoader, RawSourceLoader, ReloadConfig, ThrottlingConfig};
use dynconfig::lifecycle::Shutdown;
use dynconfig::runtime::{DynamicConfig, ReloadTask};
use dynconfig::throttling::Throttler;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const API_KEY: &str = "test-admin-key";

/// A context initialized from a raw source file in a temp dir.
pub struct Harness {
    _dir: TempDir,
    pub path: PathBuf,
    pub ctx: Arc<DynamicConfig>,
    pub reloader: Arc<ReloadTask>,
    pub throttler: Arc<Throttler>,
}

impl Harness {
    pub fn new(content: &str) -> Self {
        Self::build(content, ReloadConfig::default(), |_| {})
    }

    /// `register` runs before the layout is compiled.
    pub fn build(content: &str, reload: ReloadConfig, register: impl FnOnce(&DynamicConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dynconfig.toml");
        std::fs::write(&path, content).unwrap();

        let ctx = Arc::new(DynamicConfig::new(&ThrottlingConfig::default()));
        register(&ctx);

        let loader = FileLoader::new(&path);
        ctx.initialize(loader.load().unwrap()).unwrap();

        let throttler = Arc::new(Throttler::new(ctx.throttle_rules().clone()));
        throttler.refresh(&ctx.current());
        let reloader = Arc::new(ReloadTask::new(Arc::clone(&ctx), Box::new(loader), &reload));

        Self {
            _dir: dir,
            path,
            ctx,
            reloader,
            throttler,
        }
    }

    pub fn write(&self, content: &str) {
        std::fs::write(&self.path, content).unwrap();
    }

    pub fn admin_state(&self) -> AdminState {
        AdminState {
            ctx: Arc::clone(&self.ctx),
            reloader: Arc::clone(&self.reloader),
            throttler: Arc::clone(&self.throttler),
            api_key: Arc::from(API_KEY),
        }
    }

    /// Serve the admin router on an ephemeral port.
    pub async fn start_admin(&self, shutdown: &Shutdown) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = self.admin_state();
        let rx = shutdown.subscribe();
        tokio::spawn(async move {
            admin::serve(listener, state, rx).await.unwrap();
        });
        addr
    }
}

/// Poll `check` until it returns true or `timeout` passes.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
