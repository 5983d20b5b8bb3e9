//! Daemon settings schema.
//!
//! These settings configure the daemon itself (where the raw source lives,
//! how often it is reloaded, the admin surface). The dynamic values served
//! to transactions come from the raw source, not from here.

use serde::{Deserialize, Serialize};

use crate::registry::ValueKind;

/// Root settings for the dynamic configuration daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DaemonSettings {
    /// Raw configuration source.
    pub source: SourceConfig,

    /// Background reload behaviour.
    pub reload: ReloadConfig,

    /// Where the throttling rule string is read from.
    pub throttling: ThrottlingConfig,

    /// Admin HTTP surface.
    pub admin: AdminConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    /// Values the daemon registers itself at startup, next to the built-ins.
    pub values: Vec<DeclaredValue>,
}

/// A value registered from settings rather than from code.
///
/// ```toml
/// [[values]]
/// section = "PRICING"
/// option = "MAX_SEGMENTS"
/// kind = "number"
/// default = "16"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeclaredValue {
    pub section: String,
    pub option: String,
    pub kind: ValueKind,

    /// Raw default text; the kind's zero value when absent.
    #[serde(default)]
    pub default: Option<String>,
}

/// Raw configuration source settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Path to the TOML file holding sections and options.
    pub path: String,

    /// Trigger a reload as soon as the file changes on disk.
    pub watch: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: "dynconfig.toml".to_string(),
            watch: true,
        }
    }
}

/// Reload task settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReloadConfig {
    /// Enable dynamic loading. When off, the snapshot built at startup is final.
    pub enabled: bool,

    /// Seconds between reload cycles.
    pub interval_secs: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
        }
    }
}

/// Location of the throttling rule string.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThrottlingConfig {
    pub section: String,
    pub option: String,
}

impl Default for ThrottlingConfig {
    fn default() -> Self {
        Self {
            section: "SERVER".to_string(),
            option: "TRX_THROTTLING".to_string(),
        }
    }
}

/// Admin surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin surface.
    pub enabled: bool,

    /// Bind address.
    pub bind_address: String,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

pub(crate) const PLACEHOLDER_API_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1:8081".to_string(),
            api_key: PLACEHOLDER_API_KEY.to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human format.
    pub json_logs: bool,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
