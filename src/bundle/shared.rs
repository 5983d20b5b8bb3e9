//! Shared ownership and copy-on-write for bundles.

use std::ops::Deref;
use std::sync::Arc;

use crate::bundle::snapshot::Bundle;

/// A reference-counted handle to a [`Bundle`].
///
/// The publisher and any number of transactions may share one bundle. It is
/// never mutated while shared: a writer calls [`SharedBundle::make_unique`]
/// and gets an exclusive copy if anybody else still holds the original.
#[derive(Debug, Clone)]
pub struct SharedBundle {
    inner: Arc<Bundle>,
}

impl SharedBundle {
    pub fn new(bundle: Bundle) -> Self {
        Self {
            inner: Arc::new(bundle),
        }
    }

    pub(crate) fn from_arc(inner: Arc<Bundle>) -> Self {
        Self { inner }
    }

    pub fn as_arc(&self) -> &Arc<Bundle> {
        &self.inner
    }

    pub fn into_arc(self) -> Arc<Bundle> {
        self.inner
    }

    /// Exclusive access to the bundle, cloning it first if it is shared.
    ///
    /// `Arc::make_mut` checks uniqueness with acquire ordering, which pairs
    /// with the release performed by every other owner's drop, so a count of
    /// one is never observed ahead of the memory effects of that drop. Other
    /// owners keep seeing the old bundle unchanged.
    pub fn make_unique(&mut self) -> &mut Bundle {
        if Arc::get_mut(&mut self.inner).is_none() {
            tracing::debug!(
                generation = self.inner.generation(),
                owners = Arc::strong_count(&self.inner),
                "Cloning shared bundle for local write"
            );
        }
        Arc::make_mut(&mut self.inner)
    }

    /// Whether the caller is the sole owner right now.
    pub fn is_unique(&mut self) -> bool {
        Arc::get_mut(&mut self.inner).is_some()
    }

    /// Number of owners, for diagnostics only.
    pub fn owner_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn ptr_eq(&self, other: &SharedBundle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Deref for SharedBundle {
    type Target = Bundle;

    fn deref(&self) -> &Bundle {
        &self.inner
    }
}

impl From<Bundle> for SharedBundle {
    fn from(bundle: Bundle) -> Self {
        Self::new(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::raw::RawConfig;
    use crate::registry::{ConfigKey, LayoutPlan, Registry};

    fn filled(registry: &Registry) -> Bundle {
        let mut bundle = Bundle::new(Arc::new(LayoutPlan::compile(registry, None)));
        let mut cfg = RawConfig::new();
        cfg.set("SEC", "NAM", "shared");
        bundle.fill(registry, &cfg);
        bundle
    }

    #[test]
    fn test_make_unique_on_unique_bundle_is_noop() {
        let registry = Registry::new();
        let handle = registry.register(ConfigKey::new("SEC", "NAM"), String::new());
        let mut shared = SharedBundle::new(filled(&registry));
        let slot = handle.slot().unwrap();

        let before: *const String = shared.get::<String>(slot);
        let after: *const String = shared.make_unique().get::<String>(slot);
        assert_eq!(before, after);
    }

    #[test]
    fn test_make_unique_on_shared_bundle_clones() {
        let registry = Registry::new();
        let handle = registry.register(ConfigKey::new("SEC", "NAM"), String::new());
        let original = SharedBundle::new(filled(&registry));
        let slot = handle.slot().unwrap();

        let mut writer = original.clone();
        assert_eq!(writer.owner_count(), 2);
        *writer.make_unique().get_mut::<String>(slot) = "local".to_string();

        assert!(!writer.ptr_eq(&original));
        assert_eq!(original.get::<String>(slot), "shared");
        assert_eq!(writer.get::<String>(slot), "local");
        assert!(writer.is_unique());
    }
}
