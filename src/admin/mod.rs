//! Admin HTTP surface.
//!
//! Every route sits behind the bearer-key middleware. Permanent overrides
//! posted here go through the same checks as override requests coming from
//! transactions.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::runtime::{DynamicConfig, ReloadTask};
use crate::throttling::Throttler;

/// Shared state behind every admin handler.
#[derive(Clone)]
pub struct AdminState {
    pub ctx: Arc<DynamicConfig>,
    pub reloader: Arc<ReloadTask>,
    pub throttler: Arc<Throttler>,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/config", get(get_config))
        .route("/admin/reload", post(post_reload))
        .route("/admin/override", post(post_override))
        .route("/admin/throttle", get(get_throttle))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin router on `listener` until shutdown.
pub async fn serve(
    listener: TcpListener,
    state: AdminState,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin server starting");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!("Admin server stopped");
    Ok(())
}
