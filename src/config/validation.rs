//! Settings validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: DaemonSettings → Result<(), Vec<ValidationError>>
//! - Runs before the settings are accepted

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{DaemonSettings, DeclaredValue, PLACEHOLDER_API_KEY};
use crate::registry::{with_kind, ConfigKey, ConfigValue, ConversionError};

/// A single semantic problem with the settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("source.path must not be empty")]
    EmptySourcePath,

    #[error("reload.interval_secs must be greater than zero")]
    ZeroReloadInterval,

    #[error("throttling section and option must not be empty")]
    EmptyThrottlingKey,

    #[error("{field} is not a valid socket address: {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("admin.api_key must be changed before enabling the admin surface")]
    PlaceholderApiKey,

    #[error("declared value {key} has an invalid default: {error}")]
    InvalidDefault { key: ConfigKey, error: ConversionError },

    #[error("declared value has an empty section or option")]
    EmptyDeclaredKey,
}

/// Check `settings` for semantic errors.
pub fn validate_settings(settings: &DaemonSettings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if settings.source.path.trim().is_empty() {
        errors.push(ValidationError::EmptySourcePath);
    }

    if settings.reload.interval_secs == 0 {
        errors.push(ValidationError::ZeroReloadInterval);
    }

    if settings.throttling.section.trim().is_empty() || settings.throttling.option.trim().is_empty()
    {
        errors.push(ValidationError::EmptyThrottlingKey);
    }

    if settings.admin.enabled {
        check_address("admin.bind_address", &settings.admin.bind_address, &mut errors);
        if settings.admin.api_key == PLACEHOLDER_API_KEY || settings.admin.api_key.is_empty() {
            errors.push(ValidationError::PlaceholderApiKey);
        }
    }

    if settings.observability.metrics_enabled {
        check_address(
            "observability.metrics_address",
            &settings.observability.metrics_address,
            &mut errors,
        );
    }

    for declared in &settings.values {
        check_declared(declared, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_declared(declared: &DeclaredValue, errors: &mut Vec<ValidationError>) {
    if declared.section.trim().is_empty() || declared.option.trim().is_empty() {
        errors.push(ValidationError::EmptyDeclaredKey);
        return;
    }
    let Some(raw) = &declared.default else {
        return;
    };
    let parsed = with_kind!(declared.kind, T => { T::parse_raw(raw).map(|_| ()) });
    if let Err(error) = parsed {
        errors.push(ValidationError::InvalidDefault {
            key: ConfigKey::new(&declared.section, &declared.option),
            error,
        });
    }
}
