//! Typed value registry.
//!
//! # Data Flow
//! ```text
//! call site
//!     → DynamicConfig::register (key normalized, handle created)
//!     → TypedPool<T> for the handle's kind
//!     → LayoutPlan::compile (slot per distinct key, recorded on every handle)
//!     → Bundle columns sized from the plan
//! ```
//!
//! # Design Decisions
//! - Registration happens at startup; steady state only reads cached slots
//! - Unregistering an unknown handle is a programming error and panics

pub mod handle;
pub mod key;
pub mod layout;
pub mod pool;
pub mod value;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;

pub use handle::ValueHandle;
pub use key::ConfigKey;
pub use layout::{KindLayout, LayoutPlan};
pub use pool::TypedPool;
pub use value::{ConfigValue, ConversionError, ValueKind};

use handle::HandleEntry;

/// Run `$body` with `$t` bound to the Rust type of `$kind`.
macro_rules! with_kind {
    ($kind:expr, $t:ident => $body:block) => {
        match $kind {
            $crate::registry::ValueKind::Number => {
                type $t = i64;
                $body
            }
            $crate::registry::ValueKind::Float => {
                type $t = f64;
                $body
            }
            $crate::registry::ValueKind::Text => {
                type $t = String;
                $body
            }
            $crate::registry::ValueKind::Date => {
                type $t = chrono::NaiveDate;
                $body
            }
            $crate::registry::ValueKind::Flag => {
                type $t = bool;
                $body
            }
        }
    };
}

pub(crate) use with_kind;

/// Handle pools for every value kind.
pub struct Registry {
    pub(crate) numbers: TypedPool<i64>,
    pub(crate) floats: TypedPool<f64>,
    pub(crate) texts: TypedPool<String>,
    pub(crate) dates: TypedPool<NaiveDate>,
    pub(crate) flags: TypedPool<bool>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            numbers: TypedPool::new(),
            floats: TypedPool::new(),
            texts: TypedPool::new(),
            dates: TypedPool::new(),
            flags: TypedPool::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Insert a new handle for `key` into the pool of `T`.
    pub(crate) fn register<T: ConfigValue>(&self, key: ConfigKey, default: T) -> ValueHandle<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(HandleEntry::new(id, key, default));
        T::pool(self).insert(Arc::clone(&entry));
        ValueHandle::from_entry(entry)
    }

    /// Remove exactly `handle` from its pool.
    ///
    /// # Panics
    /// If the handle is not registered.
    pub(crate) fn unregister<T: ConfigValue>(&self, handle: ValueHandle<T>) {
        let entry = handle.entry();
        let removed = T::pool(self).remove(entry.key(), entry.id());
        assert!(
            removed,
            "unregistering {} handle for {} that was never registered",
            T::KIND,
            entry.key()
        );
    }

    /// Whether `key` is registered for `kind`.
    pub fn contains(&self, kind: ValueKind, key: &ConfigKey) -> bool {
        with_kind!(kind, T => { T::pool(self).contains_key(key) })
    }

    /// The first kind, in layout order, that has `key` registered.
    pub fn kind_of(&self, key: &ConfigKey) -> Option<ValueKind> {
        ValueKind::layout_order()
            .into_iter()
            .find(|&kind| self.contains(kind, key))
    }

    /// Every distinct key of every kind, in layout order then key order.
    pub fn registered_keys(&self) -> Vec<(ValueKind, ConfigKey)> {
        ValueKind::layout_order()
            .into_iter()
            .flat_map(|kind| {
                let keys = with_kind!(kind, T => { T::pool(self).keys() });
                keys.into_iter().map(move |key| (kind, key))
            })
            .collect()
    }

    pub fn handle_count(&self) -> usize {
        ValueKind::ALL
            .iter()
            .map(|&kind| with_kind!(kind, T => { T::pool(self).handle_count() }))
            .sum()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
