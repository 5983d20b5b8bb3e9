//! The configuration snapshot.
//!
//! # Responsibilities
//! - Hold one value per laid-out key of every kind
//! - Refresh all slots, or a single one, from a raw source
//! - Copy itself for copy-on-write
//!
//! # Design Decisions
//! - A bundle is bound to the plan it was created with and never reads or
//!   writes through a later plan
//! - An empty bundle (no columns) is distinct from one full of defaults
//! - Reading an empty bundle is a programming error and panics

use std::sync::Arc;

use serde::Serialize;

use crate::config::raw::RawSource;
use crate::registry::key::ConfigKey;
use crate::registry::layout::LayoutPlan;
use crate::registry::value::{ConfigValue, ValueKind};
use crate::registry::{with_kind, Registry};

/// Typed storage, one column per value kind.
#[derive(Debug, Clone, Default)]
pub struct Columns {
    pub(crate) numbers: Vec<i64>,
    pub(crate) floats: Vec<f64>,
    pub(crate) texts: Vec<String>,
    pub(crate) dates: Vec<chrono::NaiveDate>,
    pub(crate) flags: Vec<bool>,
}

impl Columns {
    fn with_defaults(layout: &LayoutPlan) -> Self {
        let mut columns = Columns::default();
        for kind_layout in layout.kinds() {
            with_kind!(kind_layout.kind, T => {
                *T::column_mut(&mut columns) = vec![T::default(); kind_layout.slot_count];
            });
        }
        columns
    }
}

/// Summary of one `fill`.
#[derive(Debug, Clone, Default)]
pub struct FillReport {
    /// Number of slots refreshed.
    pub refreshed: usize,
    /// Keys whose value differs from the previous content of the bundle.
    pub changed: Vec<ConfigKey>,
}

/// One rendered slot, for dumps.
#[derive(Debug, Clone, Serialize)]
pub struct ValueEntry {
    pub kind: ValueKind,
    pub section: String,
    pub option: String,
    pub slot: usize,
    pub value: String,
}

/// A fixed-layout container holding one value per registered key.
#[derive(Debug)]
pub struct Bundle {
    layout: Arc<LayoutPlan>,
    columns: Option<Columns>,
    generation: u64,
}

impl Bundle {
    /// An empty bundle bound to `layout`.
    pub(crate) fn new(layout: Arc<LayoutPlan>) -> Self {
        Self {
            layout,
            columns: None,
            generation: 0,
        }
    }

    /// Default-construct every slot of every kind.
    ///
    /// # Panics
    /// If the bundle is already allocated.
    pub fn allocate(&mut self) {
        assert!(self.columns.is_none(), "bundle allocated twice");
        self.columns = Some(Columns::with_defaults(&self.layout));
    }

    pub fn is_allocated(&self) -> bool {
        self.columns.is_some()
    }

    pub fn layout(&self) -> &LayoutPlan {
        &self.layout
    }

    /// Publish generation this bundle was built for, 0 if never published.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    fn columns(&self) -> &Columns {
        match &self.columns {
            Some(columns) => columns,
            None => panic!("bundle read before allocation"),
        }
    }

    fn columns_mut(&mut self) -> &mut Columns {
        match &mut self.columns {
            Some(columns) => columns,
            None => panic!("bundle written before allocation"),
        }
    }

    /// The value of kind `T` at `slot`.
    ///
    /// # Panics
    /// If the bundle is not allocated or `slot` is outside the layout.
    pub fn get<T: ConfigValue>(&self, slot: usize) -> &T {
        &T::column(self.columns())[slot]
    }

    /// Mutable access to the value of kind `T` at `slot`.
    ///
    /// Callers holding a shared bundle must go through
    /// [`crate::bundle::SharedBundle::make_unique`] first.
    pub fn get_mut<T: ConfigValue>(&mut self, slot: usize) -> &mut T {
        &mut T::column_mut(self.columns_mut())[slot]
    }

    /// Refresh every laid-out slot from `source`, allocating first if needed.
    ///
    /// Missing or malformed values fall back to the handle default without
    /// stopping the rest of the fill.
    pub fn fill(&mut self, registry: &Registry, source: &dyn RawSource) -> FillReport {
        if !self.is_allocated() {
            self.allocate();
        }

        let mut report = FillReport::default();
        for kind in ValueKind::layout_order() {
            with_kind!(kind, T => {
                self.fill_kind::<T>(registry, source, &mut report);
            });
        }

        tracing::debug!(
            refreshed = report.refreshed,
            changed = report.changed.len(),
            "Bundle filled"
        );
        report
    }

    fn fill_kind<T: ConfigValue>(
        &mut self,
        registry: &Registry,
        source: &dyn RawSource,
        report: &mut FillReport,
    ) {
        for entry in T::pool(registry).representatives() {
            // Handles registered after this bundle's layout have no slot here.
            let Some(slot) = self.layout.slot_of(T::KIND, entry.key()) else {
                continue;
            };
            let value = entry.fetch(source);
            if self.store(slot, entry.key(), value) {
                report.changed.push(entry.key().clone());
            }
            report.refreshed += 1;
        }
    }

    /// Refresh only the slot registered under `(section, option)`.
    ///
    /// Kinds are searched in layout order and the first one holding the key
    /// wins. Returns false, leaving every slot untouched, when no kind has it.
    pub fn update_one(
        &mut self,
        registry: &Registry,
        source: &dyn RawSource,
        section: &str,
        option: &str,
    ) -> bool {
        let key = ConfigKey::new(section, option);
        for kind in ValueKind::layout_order() {
            let updated = with_kind!(kind, T => { self.update_kind::<T>(registry, source, &key) });
            if let Some(updated) = updated {
                return updated;
            }
        }
        tracing::debug!(key = %key, "No registered value to update");
        false
    }

    /// `None` when the pool of `T` does not hold `key`.
    fn update_kind<T: ConfigValue>(
        &mut self,
        registry: &Registry,
        source: &dyn RawSource,
        key: &ConfigKey,
    ) -> Option<bool> {
        let entry = T::pool(registry).representative(key)?;
        let Some(slot) = self.layout.slot_of(T::KIND, key) else {
            tracing::warn!(key = %key, kind = %T::KIND, "Value registered after layout, cannot update");
            return Some(false);
        };
        let value = entry.fetch(source);
        self.store(slot, key, value);
        Some(true)
    }

    /// Write `value` into `slot`, returning whether it changed.
    fn store<T: ConfigValue>(&mut self, slot: usize, key: &ConfigKey, value: T) -> bool {
        let current = self.get_mut::<T>(slot);
        if *current == value {
            return false;
        }
        tracing::info!(
            key = %key,
            kind = %T::KIND,
            old = %current.render(),
            new = %value.render(),
            "Configuration value changed"
        );
        *current = value;
        true
    }

    /// Every laid-out slot rendered as text, in layout order.
    pub fn entries(&self) -> Vec<ValueEntry> {
        let mut entries = Vec::new();
        for kind_layout in self.layout.kinds() {
            for (key, slot) in kind_layout.keys() {
                let value = with_kind!(kind_layout.kind, T => { self.get::<T>(slot).render() });
                entries.push(ValueEntry {
                    kind: kind_layout.kind,
                    section: key.section().to_string(),
                    option: key.option().to_string(),
                    slot,
                    value,
                });
            }
        }
        entries
    }
}

impl Clone for Bundle {
    /// Copy every slot into a new bundle with the same layout.
    ///
    /// # Panics
    /// If `self` is not allocated.
    fn clone(&self) -> Self {
        Self {
            layout: Arc::clone(&self.layout),
            columns: Some(self.columns().clone()),
            generation: self.generation,
        }
    }
}
