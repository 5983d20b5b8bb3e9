//! Configuration subsystem.
//!
//! # Data Flow
//! ```text
//! settings file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → DaemonSettings (immutable for the life of the daemon)
//!
//! raw source file (TOML sections/options)
//!     → raw.rs (RawConfig, case-insensitive lookup)
//!     → FileLoader, re-read from scratch on every reload cycle
//!     → watcher.rs wakes the reload task when the file changes
//! ```
//!
//! # Design Decisions
//! - Raw values are kept as text; conversion belongs to the value kinds
//! - All settings fields have defaults to allow minimal files
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod raw;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_settings, ConfigError, FileLoader, RawSourceLoader};
pub use raw::{OverlaySource, RawConfig, RawSource};
pub use schema::{
    AdminConfig, DaemonSettings, DeclaredValue, ObservabilityConfig, ReloadConfig, SourceConfig,
    ThrottlingConfig,
};
pub use validation::{validate_settings, ValidationError};
pub use watcher::ConfigWatcher;
