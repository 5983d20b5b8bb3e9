//! Configuration snapshots.
//!
//! # Data Flow
//! ```text
//! LayoutPlan → Bundle::allocate (defaults) → Bundle::fill (raw source)
//!     → SharedBundle (publisher, transactions)
//!     → make_unique + update_one for a private override
//! ```

pub mod shared;
pub mod snapshot;

pub use shared::SharedBundle;
pub use snapshot::{Bundle, Columns, FillReport, ValueEntry};
