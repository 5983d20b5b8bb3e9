//! Runtime: the live configuration context and the things that change it.
//!
//! # Responsibilities
//! - Own the registry, the compiled layout and the published default bundle
//! - Reload the raw source in the background and republish on change
//! - Apply override requests locally (per transaction) or permanently
//!
//! # Data Flow
//! ```text
//! RawSourceLoader ──► ReloadTask ──diff──► DynamicConfig::publish ──► ArcSwap<Bundle>
//!                                                                        │
//! Transaction::begin ◄──────────── current() (lock-free load) ◄──────────┘
//!        │
//!        └─ apply_override ──► SharedBundle::make_unique ──► private copy
//! ```
//!
//! # Design Decisions
//! - Readers never lock; writers serialize on one mutex and swap whole bundles
//! - The layout freezes on the first bundle allocation
//! - Permanent overrides are layered over every reload

pub mod context;
pub mod overrides;
pub mod reload;
pub mod transaction;

pub use context::{DynamicConfig, LayoutError, OVERRIDE_ENABLED, OVERRIDE_PERMANENT};
pub use overrides::{OverrideError, OverrideOutcome, OverrideRequest};
pub use reload::{ReloadError, ReloadOutcome, ReloadState, ReloadStatus, ReloadTask, LOADING_DISABLED};
pub use transaction::{Transaction, TransactionError};
