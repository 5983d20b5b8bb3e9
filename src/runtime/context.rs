//! The process-wide dynamic configuration context.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwapOption;
use thiserror::Error;

use crate::bundle::{Bundle, SharedBundle};
use crate::config::raw::{OverlaySource, RawConfig, RawSource};
use crate::config::schema::{DeclaredValue, ThrottlingConfig};
use crate::observability::metrics;
use crate::registry::{
    with_kind, ConfigKey, ConfigValue, ConversionError, LayoutPlan, Registry, ValueHandle,
};

/// Built-in flag: override requests are refused unless this is on.
pub const OVERRIDE_ENABLED: (&str, &str) = ("SERVER", "DYNAMIC_CONFIG_OVERRIDE_ENABLED");

/// Built-in flag: override requests are published instead of staying local.
pub const OVERRIDE_PERMANENT: (&str, &str) = ("SERVER", "DYNAMIC_CONFIG_OVERRIDE_PERMANENT");

/// Layout lifecycle errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("layout has not been compiled")]
    NotCompiled,

    #[error("layout revision {revision} is frozen: a bundle has already been allocated")]
    Frozen { revision: u64 },
}

#[derive(Default)]
struct LayoutState {
    plan: Option<Arc<LayoutPlan>>,
    frozen: bool,
}

/// Everything a server needs to serve dynamic configuration.
///
/// Holds the registry, the compiled layout, the published default bundle and
/// the permanent overrides. One instance is created at startup and shared
/// behind an `Arc`.
///
/// Readers call [`DynamicConfig::current`], a lock-free load. Writers (the
/// reload task and permanent overrides) serialize on an internal lock, build
/// a new bundle off to the side and swap it in.
pub struct DynamicConfig {
    registry: Registry,
    layout: Mutex<LayoutState>,
    published: ArcSwapOption<Bundle>,
    writer: Mutex<()>,
    permanent: Mutex<BTreeMap<ConfigKey, String>>,
    baseline: Mutex<RawConfig>,
    generation: AtomicU64,
    override_enabled: ValueHandle<bool>,
    override_permanent: ValueHandle<bool>,
    throttle_rules: ValueHandle<String>,
}

impl DynamicConfig {
    pub fn new(throttling: &ThrottlingConfig) -> Self {
        let registry = Registry::new();
        let override_enabled =
            registry.register(ConfigKey::new(OVERRIDE_ENABLED.0, OVERRIDE_ENABLED.1), false);
        let override_permanent =
            registry.register(ConfigKey::new(OVERRIDE_PERMANENT.0, OVERRIDE_PERMANENT.1), false);
        let throttle_rules = registry.register(
            ConfigKey::new(&throttling.section, &throttling.option),
            String::new(),
        );

        Self {
            registry,
            layout: Mutex::new(LayoutState::default()),
            published: ArcSwapOption::empty(),
            writer: Mutex::new(()),
            permanent: Mutex::new(BTreeMap::new()),
            baseline: Mutex::new(RawConfig::new()),
            generation: AtomicU64::new(0),
            override_enabled,
            override_permanent,
            throttle_rules,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Register a value for `(section, option)` with a default.
    ///
    /// Registering after the layout froze resolves the handle to the existing
    /// slot when its key is already laid out. Otherwise the handle stays
    /// unassigned and reads return `default`.
    pub fn register<T: ConfigValue>(&self, section: &str, option: &str, default: T) -> ValueHandle<T> {
        let key = ConfigKey::new(section, option);
        let handle = self.registry.register(key, default);

        let state = self.layout.lock().expect("layout lock poisoned");
        if let Some(plan) = &state.plan {
            match plan.slot_of(T::KIND, handle.key()) {
                Some(slot) => handle.entry().assign_slot(slot),
                None if state.frozen => tracing::warn!(
                    key = %handle.key(),
                    kind = %T::KIND,
                    "Registered after layout froze, value will always be its default"
                ),
                None => {}
            }
        }

        handle
    }

    /// Register a value declared in settings. The handle is not needed
    /// afterwards: the registry keeps it alive.
    pub fn declare(&self, declared: &DeclaredValue) -> Result<(), ConversionError> {
        with_kind!(declared.kind, T => {
            let default = match &declared.default {
                Some(raw) => T::parse_raw(raw)?,
                None => T::default(),
            };
            self.register::<T>(&declared.section, &declared.option, default);
        });
        Ok(())
    }

    /// Remove exactly `handle` from the registry.
    ///
    /// # Panics
    /// If the handle was never registered.
    pub fn unregister<T: ConfigValue>(&self, handle: ValueHandle<T>) {
        self.registry.unregister(handle);
    }

    /// Compute (or recompute) the layout from the current registry contents.
    pub fn compile_layout(&self) -> Result<Arc<LayoutPlan>, LayoutError> {
        let mut state = self.layout.lock().expect("layout lock poisoned");
        if state.frozen {
            let revision = state.plan.as_ref().map_or(0, |plan| plan.revision());
            return Err(LayoutError::Frozen { revision });
        }

        let plan = Arc::new(LayoutPlan::compile(&self.registry, state.plan.as_deref()));
        tracing::info!(
            revision = plan.revision(),
            total_bytes = plan.total_bytes(),
            handles = self.registry.handle_count(),
            "Layout compiled"
        );
        state.plan = Some(Arc::clone(&plan));
        Ok(plan)
    }

    /// The compiled layout, if any.
    pub fn layout(&self) -> Option<Arc<LayoutPlan>> {
        self.layout
            .lock()
            .expect("layout lock poisoned")
            .plan
            .clone()
    }

    pub fn is_layout_frozen(&self) -> bool {
        self.layout.lock().expect("layout lock poisoned").frozen
    }

    /// Allocate a bundle holding every registered default.
    ///
    /// The first allocation freezes the layout.
    pub fn allocate_bundle(&self) -> Result<Bundle, LayoutError> {
        let plan = {
            let mut state = self.layout.lock().expect("layout lock poisoned");
            let plan = state.plan.clone().ok_or(LayoutError::NotCompiled)?;
            state.frozen = true;
            plan
        };
        let mut bundle = Bundle::new(plan);
        bundle.allocate();
        Ok(bundle)
    }

    /// Compile, build the first bundle from `source` and publish it.
    pub fn initialize(&self, source: RawConfig) -> Result<u64, LayoutError> {
        let _writer = self.writer.lock().expect("writer lock poisoned");

        if !self.is_layout_frozen() {
            self.compile_layout()?;
        }
        let mut bundle = self.allocate_bundle()?;
        let report = {
            let permanent = self.permanent.lock().expect("permanent overrides lock poisoned");
            bundle.fill(&self.registry, &OverlaySource::new(&source, &permanent))
        };
        *self.baseline.lock().expect("baseline lock poisoned") = source;

        let generation = self.publish(bundle);
        tracing::info!(
            generation,
            values = report.refreshed,
            "Dynamic configuration initialized"
        );
        Ok(generation)
    }

    /// Atomically replace the default bundle. Returns its generation.
    ///
    /// Transactions that already hold the previous bundle keep it until they
    /// finish.
    pub fn publish(&self, mut bundle: Bundle) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        bundle.set_generation(generation);
        self.published.store(Some(Arc::new(bundle)));
        metrics::record_published_generation(generation);
        tracing::info!(generation, "Published configuration bundle");
        generation
    }

    /// The published default bundle.
    ///
    /// # Panics
    /// If nothing has been published yet.
    pub fn current(&self) -> SharedBundle {
        self.try_current()
            .expect("dynamic configuration read before initialize")
    }

    pub fn try_current(&self) -> Option<SharedBundle> {
        self.published.load_full().map(SharedBundle::from_arc)
    }

    /// Generation of the published default bundle, 0 before initialize.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn override_enabled(&self) -> &ValueHandle<bool> {
        &self.override_enabled
    }

    pub fn override_permanent(&self) -> &ValueHandle<bool> {
        &self.override_permanent
    }

    /// Handle holding the throttling rule string.
    pub fn throttle_rules(&self) -> &ValueHandle<String> {
        &self.throttle_rules
    }

    /// Permanent overrides currently layered over the raw source.
    pub fn permanent_overrides(&self) -> BTreeMap<ConfigKey, String> {
        self.permanent
            .lock()
            .expect("permanent overrides lock poisoned")
            .clone()
    }

    pub(crate) fn writer_lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.writer.lock().expect("writer lock poisoned")
    }

    pub(crate) fn set_permanent(&self, key: ConfigKey, value: String) {
        self.permanent
            .lock()
            .expect("permanent overrides lock poisoned")
            .insert(key, value);
    }

    pub(crate) fn baseline(&self) -> RawConfig {
        self.baseline.lock().expect("baseline lock poisoned").clone()
    }

    pub(crate) fn set_baseline(&self, source: RawConfig) {
        *self.baseline.lock().expect("baseline lock poisoned") = source;
    }

    /// Allocate and fill a bundle from `source` with permanent overrides on top.
    pub(crate) fn build_bundle(&self, source: &dyn RawSource) -> Result<Bundle, LayoutError> {
        let mut bundle = self.allocate_bundle()?;
        let permanent = self.permanent.lock().expect("permanent overrides lock poisoned");
        bundle.fill(&self.registry, &OverlaySource::new(source, &permanent));
        Ok(bundle)
    }
}
