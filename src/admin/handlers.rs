use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::bundle::ValueEntry;
use crate::runtime::{OverrideError, OverrideOutcome, OverrideRequest, ReloadError, ReloadOutcome, ReloadStatus};
use crate::throttling::CounterSnapshot;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub generation: u64,
    pub layout_revision: Option<u64>,
    pub layout_frozen: bool,
    pub registered_handles: usize,
    pub permanent_overrides: usize,
    pub throttle_rules: usize,
    pub reload: ReloadStatus,
}

#[derive(Serialize)]
pub struct ConfigDump {
    pub generation: u64,
    pub values: Vec<ValueEntry>,
}

/// JSON error body with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

impl From<OverrideError> for ApiError {
    fn from(e: OverrideError) -> Self {
        let status = match e {
            OverrideError::Disabled => StatusCode::FORBIDDEN,
            OverrideError::MalformedName(_) | OverrideError::InvalidValue { .. } => {
                StatusCode::BAD_REQUEST
            }
            OverrideError::UnknownTarget(_) => StatusCode::NOT_FOUND,
        };
        Self::new(status, e.to_string())
    }
}

impl From<ReloadError> for ApiError {
    fn from(e: ReloadError) -> Self {
        match e {
            ReloadError::Disabled => Self::new(StatusCode::CONFLICT, e.to_string()),
        }
    }
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let layout = state.ctx.layout();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        generation: state.ctx.generation(),
        layout_revision: layout.map(|plan| plan.revision()),
        layout_frozen: state.ctx.is_layout_frozen(),
        registered_handles: state.ctx.registry().handle_count(),
        permanent_overrides: state.ctx.permanent_overrides().len(),
        throttle_rules: state.throttler.rule_count(),
        reload: state.reloader.status(),
    })
}

pub async fn get_config(State(state): State<AdminState>) -> Result<Json<ConfigDump>, ApiError> {
    let bundle = state
        .ctx
        .try_current()
        .ok_or_else(|| ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "not initialized"))?;
    Ok(Json(ConfigDump {
        generation: bundle.generation(),
        values: bundle.entries(),
    }))
}

pub async fn post_reload(State(state): State<AdminState>) -> Result<Json<ReloadOutcome>, ApiError> {
    let reloader = state.reloader.clone();
    let outcome = tokio::task::spawn_blocking(move || reloader.reload_now())
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))??;

    // Keep the throttler in step with whatever was just published.
    if let Some(bundle) = state.ctx.try_current() {
        state.throttler.refresh(&bundle);
    }
    Ok(Json(outcome))
}

pub async fn post_override(
    State(state): State<AdminState>,
    Json(request): Json<OverrideRequest>,
) -> Result<Json<OverrideOutcome>, ApiError> {
    let outcome = state.ctx.apply_permanent_override(&request)?;
    if let Some(bundle) = state.ctx.try_current() {
        state.throttler.refresh(&bundle);
    }
    Ok(Json(outcome))
}

pub async fn get_throttle(State(state): State<AdminState>) -> Json<Vec<CounterSnapshot>> {
    if let Some(bundle) = state.ctx.try_current() {
        state.throttler.refresh(&bundle);
    }
    Json(state.throttler.snapshot())
}
