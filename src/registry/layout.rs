//! Layout compiler.
//!
//! # Responsibilities
//! - Assign one stable slot per distinct key of every value kind
//! - Record where each kind's sub-array would sit in a shared arena
//!
//! # Design Decisions
//! - Kinds are visited by descending alignment, so no padding is needed
//!   between sub-arrays of the notional arena
//! - Keys already laid out keep their slot on recompilation; new keys are
//!   appended (first registrant wins)
//! - Storage is one typed column per kind, the byte offsets are bookkeeping

use std::collections::BTreeMap;

use serde::Serialize;

use crate::registry::key::ConfigKey;
use crate::registry::value::{ConfigValue, ValueKind};
use crate::registry::{with_kind, Registry};

/// The layout of one kind's sub-array.
#[derive(Debug, Clone, Serialize)]
pub struct KindLayout {
    pub kind: ValueKind,
    pub slot_count: usize,
    pub byte_offset: usize,
    pub element_size: usize,
    #[serde(skip)]
    slots: BTreeMap<ConfigKey, usize>,
}

impl KindLayout {
    pub fn slot_of(&self, key: &ConfigKey) -> Option<usize> {
        self.slots.get(key).copied()
    }

    /// Keys laid out for this kind, in key order.
    pub fn keys(&self) -> impl Iterator<Item = (&ConfigKey, usize)> {
        self.slots.iter().map(|(key, &slot)| (key, slot))
    }
}

/// Immutable result of one layout compilation.
#[derive(Debug, Clone, Serialize)]
pub struct LayoutPlan {
    kinds: Vec<KindLayout>,
    total_bytes: usize,
    revision: u64,
}

impl LayoutPlan {
    /// Compile the plan for everything currently registered.
    pub(crate) fn compile(registry: &Registry, previous: Option<&LayoutPlan>) -> LayoutPlan {
        let mut kinds = Vec::with_capacity(ValueKind::ALL.len());
        let mut offset = 0;

        for kind in ValueKind::layout_order() {
            let mut slots = previous
                .map(|plan| plan.kind(kind).slots.clone())
                .unwrap_or_default();

            with_kind!(kind, T => {
                let pool = T::pool(registry);
                for key in pool.keys() {
                    let next = slots.len();
                    slots.entry(key).or_insert(next);
                }
                pool.assign_slots(&slots);
            });

            let element_size = kind.element_size();
            let slot_count = slots.len();
            kinds.push(KindLayout {
                kind,
                slot_count,
                byte_offset: offset,
                element_size,
                slots,
            });
            offset += slot_count * element_size;
        }

        let revision = previous.map(|plan| plan.revision + 1).unwrap_or(1);
        tracing::debug!(revision, total_bytes = offset, "Layout compiled");

        LayoutPlan {
            kinds,
            total_bytes: offset,
            revision,
        }
    }

    /// Per-kind layouts in layout order.
    pub fn kinds(&self) -> &[KindLayout] {
        &self.kinds
    }

    pub fn kind(&self, kind: ValueKind) -> &KindLayout {
        self.kinds
            .iter()
            .find(|layout| layout.kind == kind)
            .expect("every value kind is laid out")
    }

    pub fn slot_of(&self, kind: ValueKind, key: &ConfigKey) -> Option<usize> {
        self.kind(kind).slot_of(key)
    }

    pub fn slot_count(&self, kind: ValueKind) -> usize {
        self.kind(kind).slot_count
    }

    /// Size in bytes of one bundle's worth of values.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// 1 for the first compile, incremented on every recompile.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_keys_get_distinct_slots() {
        let registry = Registry::new();
        let a = registry.register(ConfigKey::new("SEC", "NAM"), String::new());
        let b = registry.register(ConfigKey::new("SEC2", "NAM2"), String::new());

        let plan = LayoutPlan::compile(&registry, None);
        assert_eq!(plan.slot_count(ValueKind::Text), 2);
        assert_ne!(a.slot(), b.slot());
        assert!(a.slot().is_some() && b.slot().is_some());
    }

    #[test]
    fn test_duplicate_keys_share_a_slot() {
        let registry = Registry::new();
        let a = registry.register(ConfigKey::new("SEC", "NAM"), String::new());
        let b = registry.register(ConfigKey::new("sec", "nam"), String::from("other default"));

        let plan = LayoutPlan::compile(&registry, None);
        assert_eq!(plan.slot_count(ValueKind::Text), 1);
        assert_eq!(a.slot(), b.slot());
    }

    #[test]
    fn test_offsets_follow_layout_order() {
        let registry = Registry::new();
        registry.register(ConfigKey::new("S", "N1"), 0i64);
        registry.register(ConfigKey::new("S", "N2"), 0i64);
        registry.register(ConfigKey::new("S", "F"), false);

        let plan = LayoutPlan::compile(&registry, None);
        let mut expected_offset = 0;
        for layout in plan.kinds() {
            assert_eq!(layout.byte_offset, expected_offset);
            expected_offset += layout.slot_count * layout.element_size;
        }
        assert_eq!(plan.total_bytes(), expected_offset);
        assert_eq!(
            plan.total_bytes(),
            2 * std::mem::size_of::<i64>() + std::mem::size_of::<bool>()
        );
    }

    #[test]
    fn test_recompile_keeps_existing_slots() {
        let registry = Registry::new();
        let late = registry.register(ConfigKey::new("ZZZ", "LAST"), 0i64);
        let first = LayoutPlan::compile(&registry, None);
        let slot = late.slot();

        // Sorts before the existing key but must not displace it.
        let early = registry.register(ConfigKey::new("AAA", "FIRST"), 0i64);
        let second = LayoutPlan::compile(&registry, Some(&first));

        assert_eq!(late.slot(), slot);
        assert_eq!(early.slot(), Some(1));
        assert_eq!(second.revision(), 2);

        let third = LayoutPlan::compile(&registry, Some(&second));
        assert_eq!(late.slot(), slot);
        assert_eq!(third.slot_count(ValueKind::Number), 2);
    }
}
