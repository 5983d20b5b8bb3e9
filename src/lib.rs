//! Dynamic configuration and admission control for long-running transaction servers.
//!
//! Call sites register typed values once, then read them on every transaction
//! through a cached slot. A background task reloads the raw source and
//! publishes whole new snapshots; transactions keep the snapshot they started
//! with and may override values privately. A throttler built from one of the
//! dynamic values admits or refuses transactions against live limits.

pub mod admin;
pub mod bundle;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod runtime;
pub mod throttling;

pub use bundle::{Bundle, SharedBundle};
pub use config::schema::DaemonSettings;
pub use lifecycle::Shutdown;
pub use registry::{ConfigKey, ConfigValue, ValueHandle, ValueKind};
pub use runtime::{DynamicConfig, ReloadTask, Transaction};
pub use throttling::{Throttler, TrxIdentity};
