//! dynconfigd: dynamic configuration daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!    dynconfig.toml ──► FileLoader ──► ReloadTask ──► DynamicConfig ──► ArcSwap<Bundle>
//!          │                              ▲   ▲                              │
//!    ConfigWatcher (notify) ──────────────┘   │                              ▼
//!    SIGHUP / POST /admin/reload ─────────────┘              Transaction::begin + Throttler
//!
//!    admin (axum, bearer key): status, config, reload, override, throttle
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use dynconfig::admin::{self, AdminState};
use dynconfig::config::{
    load_settings, validate_settings, ConfigError, ConfigWatcher, DaemonSettings, FileLoader,
    RawSourceLoader,
};
use dynconfig::lifecycle::{wait_for_shutdown, Shutdown};
use dynconfig::observability::{logging, metrics};
use dynconfig::runtime::{DynamicConfig, ReloadTask};
use dynconfig::throttling::Throttler;

#[derive(Parser)]
#[command(name = "dynconfigd")]
#[command(about = "Dynamic configuration and admission control daemon", long_about = None)]
struct Args {
    /// Daemon settings file (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Raw configuration source, overriding `source.path` from settings.
    #[arg(long)]
    source: Option<PathBuf>,
}

fn resolve_settings(args: &Args) -> Result<DaemonSettings, ConfigError> {
    let mut settings = match &args.settings {
        Some(path) => load_settings(path)?,
        None => DaemonSettings::default(),
    };
    if let Some(source) = &args.source {
        settings.source.path = source.display().to_string();
    }
    validate_settings(&settings).map_err(ConfigError::Validation)?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let settings = resolve_settings(&args)?;

    logging::init_logging(&settings.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "dynconfigd starting");

    if settings.observability.metrics_enabled {
        match settings.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %settings.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Registration first, then the layout freezes in initialize.
    let ctx = Arc::new(DynamicConfig::new(&settings.throttling));
    for declared in &settings.values {
        ctx.declare(declared)?;
    }

    let loader = FileLoader::new(&settings.source.path);
    let initial = loader.load()?;
    let generation = ctx.initialize(initial)?;
    tracing::info!(
        source = %loader.describe(),
        generation,
        handles = ctx.registry().handle_count(),
        "Configuration loaded"
    );

    let throttler = Arc::new(Throttler::new(ctx.throttle_rules().clone()));
    throttler.refresh(&ctx.current());

    let shutdown = Shutdown::new();
    let reloader = Arc::new(ReloadTask::new(
        Arc::clone(&ctx),
        Box::new(loader.clone()),
        &settings.reload,
    ));

    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(Arc::clone(&reloader).run(shutdown.subscribe())));

    // The watcher stops when dropped, keep it for the life of main.
    let _watcher = if settings.source.watch && settings.reload.enabled {
        match ConfigWatcher::new(loader.path(), reloader.trigger()).run() {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(error = %e, "File watcher unavailable, relying on periodic reload");
                None
            }
        }
    } else {
        None
    };

    if settings.admin.enabled {
        let listener = TcpListener::bind(&settings.admin.bind_address).await?;
        let state = AdminState {
            ctx: Arc::clone(&ctx),
            reloader: Arc::clone(&reloader),
            throttler: Arc::clone(&throttler),
            api_key: Arc::from(settings.admin.api_key.as_str()),
        };
        let admin_shutdown = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = admin::serve(listener, state, admin_shutdown).await {
                tracing::error!(error = %e, "Admin server failed");
            }
        }));
    }

    let signal = wait_for_shutdown(reloader.trigger()).await?;
    shutdown.trigger(signal);

    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Task ended abnormally");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
