//! Call-site handles to registered values.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;

use crate::bundle::Bundle;
use crate::config::raw::RawSource;
use crate::registry::key::ConfigKey;
use crate::registry::value::ConfigValue;
use crate::runtime::Transaction;

const UNASSIGNED: usize = usize::MAX;

/// Registry-side state of one handle.
pub(crate) struct HandleEntry<T: ConfigValue> {
    id: u64,
    key: ConfigKey,
    default: T,
    slot: AtomicUsize,
}

impl<T: ConfigValue> HandleEntry<T> {
    pub(crate) fn new(id: u64, key: ConfigKey, default: T) -> Self {
        Self {
            id,
            key,
            default,
            slot: AtomicUsize::new(UNASSIGNED),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn key(&self) -> &ConfigKey {
        &self.key
    }

    pub(crate) fn default_value(&self) -> &T {
        &self.default
    }

    pub(crate) fn slot(&self) -> Option<usize> {
        match self.slot.load(Ordering::Acquire) {
            UNASSIGNED => None,
            slot => Some(slot),
        }
    }

    pub(crate) fn assign_slot(&self, slot: usize) {
        // A slot, once assigned, is stable for the life of the process.
        match self
            .slot
            .compare_exchange(UNASSIGNED, slot, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {}
            Err(existing) => assert_eq!(
                existing, slot,
                "slot for {} moved from {} to {}",
                self.key, existing, slot
            ),
        }
    }

    /// Read this handle's value from `source`, falling back to the default
    /// when the text is missing or does not convert.
    pub(crate) fn fetch(&self, source: &dyn RawSource) -> T {
        let Some(raw) = source.get_value(self.key.section(), self.key.option()) else {
            tracing::debug!(key = %self.key, kind = %T::KIND, "Value missing, using default");
            return self.default.clone();
        };

        match T::parse_raw(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    key = %self.key,
                    error = %e,
                    default = %self.default.render(),
                    "Malformed value, using default"
                );
                self.default.clone()
            }
        }
    }
}

/// One call site's registered configuration value.
///
/// Created through [`crate::runtime::DynamicConfig::register`]. The handle
/// caches the slot assigned by the layout compiler and reads it from whatever
/// bundle the caller's transaction is using.
pub struct ValueHandle<T: ConfigValue> {
    entry: Arc<HandleEntry<T>>,
}

impl<T: ConfigValue> ValueHandle<T> {
    pub(crate) fn from_entry(entry: Arc<HandleEntry<T>>) -> Self {
        Self { entry }
    }

    pub(crate) fn entry(&self) -> &Arc<HandleEntry<T>> {
        &self.entry
    }

    pub fn key(&self) -> &ConfigKey {
        self.entry.key()
    }

    /// The slot assigned by the layout compiler, if any.
    pub fn slot(&self) -> Option<usize> {
        self.entry.slot()
    }

    pub fn default_value(&self) -> &T {
        self.entry.default_value()
    }

    /// Resolve the value in `bundle`.
    ///
    /// An unassigned handle, or a slot the bundle's layout does not cover,
    /// yields the handle's own default.
    ///
    /// # Panics
    /// If `bundle` was never allocated.
    pub fn value<'a>(&'a self, bundle: &'a Bundle) -> &'a T {
        match self.slot() {
            Some(slot) if slot < bundle.layout().slot_count(T::KIND) => bundle.get::<T>(slot),
            _ => self.entry.default_value(),
        }
    }

    /// The value as seen by `trx`, including any local override it applied.
    pub fn current_value(&self, trx: &Transaction) -> T {
        self.value(trx.bundle()).clone()
    }
}

impl ValueHandle<NaiveDate> {
    /// True when `on` is at or after the configured activation date.
    pub fn is_effective(&self, bundle: &Bundle, on: NaiveDate) -> bool {
        on >= *self.value(bundle)
    }
}

impl<T: ConfigValue> Clone for ValueHandle<T> {
    fn clone(&self) -> Self {
        Self {
            entry: Arc::clone(&self.entry),
        }
    }
}

impl<T: ConfigValue> fmt::Debug for ValueHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueHandle")
            .field("key", self.key())
            .field("kind", &T::KIND)
            .field("slot", &self.slot())
            .finish()
    }
}
