//! Admission control (throttling).
//!
//! # Responsibilities
//! - Parse the throttling rule string into predicate + limit rules
//! - Share one counter per distinct rule across rule rebuilds
//! - Admit or refuse transactions, releasing counters on every exit path
//!
//! # Data Flow
//! ```text
//! Bundle ──rule string──► Throttler::refresh ──► [ThrottleRule] ──► CounterRegistry
//!                                                      │
//! Transaction::begin ──TrxIdentity──► Throttler::admit ┘──► AdmissionGuard
//! ```

pub mod counter;
pub mod rule;
pub mod throttler;

pub use counter::{CounterRegistry, CounterTag};
pub use rule::{parse_clause, parse_rules, RuleParseError, RuleSpec, ThrottleRule, TrxIdentity};
pub use throttler::{AdmissionError, AdmissionGuard, CounterSnapshot, Throttler};
