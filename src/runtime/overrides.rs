//! Override requests.
//!
//! A request names a target as `group\name` (value supplied separately) or
//! `group\name\value`. With `substitute` set, spaces become underscores and
//! `::` or `/` act as separators, so `SERVER::MAX TRX/9` reads the same as
//! `SERVER\MAX_TRX\9`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::raw::RawConfig;
use crate::observability::metrics;
use crate::registry::{with_kind, ConfigKey, ConfigValue, ConversionError, LayoutPlan, Registry};
use crate::runtime::context::DynamicConfig;

/// An incoming override request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverrideRequest {
    pub name: String,
    pub value: String,
    pub substitute: bool,
    pub optional: bool,
}

impl OverrideRequest {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn substitute(mut self) -> Self {
        self.substitute = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Parse the name into a key and the raw value to apply.
    pub fn target(&self) -> Result<(ConfigKey, String), OverrideError> {
        let name = if self.substitute {
            self.name
                .trim()
                .replace(' ', "_")
                .replace("::", "\\")
                .replace('/', "\\")
        } else {
            self.name.trim().to_string()
        };

        let parts: Vec<&str> = name.split('\\').collect();
        let (group, option, value) = match parts.as_slice() {
            [group, option] => (*group, *option, self.value.as_str()),
            [group, option, value] => (*group, *option, *value),
            _ => return Err(OverrideError::MalformedName(self.name.clone())),
        };
        if group.trim().is_empty() || option.trim().is_empty() {
            return Err(OverrideError::MalformedName(self.name.clone()));
        }

        Ok((ConfigKey::new(group, option), value.to_string()))
    }

    /// Resolve against the registry and the layout of the bundle it will
    /// be applied to. `Ok(None)` means an optional request for an unknown
    /// key, which is skipped.
    ///
    /// A key registered after the layout froze has no slot and counts as
    /// unknown. The value must convert to the target's kind.
    pub(crate) fn resolve(
        &self,
        registry: &Registry,
        layout: &LayoutPlan,
    ) -> Result<Option<(ConfigKey, String)>, OverrideError> {
        let (key, value) = self.target()?;
        let kind = registry
            .kind_of(&key)
            .filter(|&kind| layout.slot_of(kind, &key).is_some());
        let Some(kind) = kind else {
            if self.optional {
                tracing::warn!(key = %key, "Optional override for unknown value skipped");
                metrics::record_override("skipped");
                return Ok(None);
            }
            return Err(OverrideError::UnknownTarget(key));
        };

        if let Err(error) = with_kind!(kind, T => { T::parse_raw(&value).map(drop) }) {
            return Err(OverrideError::InvalidValue { key, error });
        }
        Ok(Some((key, value)))
    }
}

/// Why an override request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverrideError {
    #[error("dynamic configuration override is disabled")]
    Disabled,

    #[error("malformed override name {0:?}")]
    MalformedName(String),

    #[error("no dynamic configuration value named {0}")]
    UnknownTarget(ConfigKey),

    #[error("invalid override for {key}: {error}")]
    InvalidValue { key: ConfigKey, error: ConversionError },
}

/// What an accepted override did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OverrideOutcome {
    /// Applied to one transaction's private bundle only.
    Local,
    /// Published as the new default.
    Permanent { generation: u64 },
    /// Optional request for an unknown key.
    Skipped,
}

/// A one-value raw source for feeding an override to `Bundle::update_one`.
pub(crate) fn single_value(key: &ConfigKey, value: &str) -> RawConfig {
    let mut source = RawConfig::new();
    source.set(key.section(), key.option(), value);
    source
}

impl DynamicConfig {
    /// Apply `request` to the published default and keep it across reloads.
    pub fn apply_permanent_override(
        &self,
        request: &OverrideRequest,
    ) -> Result<OverrideOutcome, OverrideError> {
        let current = self.current();
        if !*self.override_enabled().value(&current) {
            return Err(OverrideError::Disabled);
        }
        let Some((key, value)) = request.resolve(self.registry(), current.layout())? else {
            return Ok(OverrideOutcome::Skipped);
        };

        let _writer = self.writer_lock();
        self.set_permanent(key.clone(), value.clone());

        let mut bundle = (*self.current()).clone();
        bundle.update_one(
            self.registry(),
            &single_value(&key, &value),
            key.section(),
            key.option(),
        );
        let generation = self.publish(bundle);

        tracing::info!(key = %key, value = %value, generation, "Permanent override applied");
        metrics::record_override("permanent");
        Ok(OverrideOutcome::Permanent { generation })
    }
}
