//! Raw textual configuration sources.
//!
//! The server reads dynamic values from a section/option/value store. This
//! module defines the interface the core needs from it plus a TOML-backed
//! implementation, where top-level tables are sections and their scalar
//! keys are options.

use std::collections::BTreeMap;

use crate::config::loader::ConfigError;
use crate::registry::key::ConfigKey;

/// Read access to raw configuration text.
pub trait RawSource: Send + Sync {
    /// The raw text stored under `(section, option)`, case-insensitively.
    fn get_value(&self, section: &str, option: &str) -> Option<String>;

    /// Every `(section, option, value)` triple, used for diffing on reload.
    fn all_values(&self) -> Vec<(String, String, String)>;
}

/// An in-memory section/option/value store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawConfig {
    values: BTreeMap<ConfigKey, String>,
}

impl RawConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML text. Non-scalar values are skipped with a warning.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = content.parse().map_err(ConfigError::Parse)?;
        let mut config = Self::new();

        for (section, value) in table {
            let toml::Value::Table(options) = value else {
                tracing::warn!(key = %section, "Ignoring value outside of a section");
                continue;
            };
            for (option, value) in options {
                match scalar_text(&value) {
                    Some(text) => config.set(&section, &option, text),
                    None => tracing::warn!(
                        section = %section,
                        option = %option,
                        "Ignoring non-scalar value"
                    ),
                }
            }
        }

        Ok(config)
    }

    pub fn set(&mut self, section: &str, option: &str, value: impl Into<String>) {
        self.values.insert(ConfigKey::new(section, option), value.into());
    }

    pub fn remove(&mut self, section: &str, option: &str) -> Option<String> {
        self.values.remove(&ConfigKey::new(section, option))
    }

    pub fn get(&self, key: &ConfigKey) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConfigKey, &str)> {
        self.values.iter().map(|(key, value)| (key, value.as_str()))
    }
}

fn scalar_text(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}

impl RawSource for RawConfig {
    fn get_value(&self, section: &str, option: &str) -> Option<String> {
        self.values.get(&ConfigKey::new(section, option)).cloned()
    }

    fn all_values(&self) -> Vec<(String, String, String)> {
        self.values
            .iter()
            .map(|(key, value)| {
                (
                    key.section().to_string(),
                    key.option().to_string(),
                    value.clone(),
                )
            })
            .collect()
    }
}

/// A base source with a set of values layered on top.
pub struct OverlaySource<'a> {
    base: &'a dyn RawSource,
    overrides: &'a BTreeMap<ConfigKey, String>,
}

impl<'a> OverlaySource<'a> {
    pub fn new(base: &'a dyn RawSource, overrides: &'a BTreeMap<ConfigKey, String>) -> Self {
        Self { base, overrides }
    }
}

impl RawSource for OverlaySource<'_> {
    fn get_value(&self, section: &str, option: &str) -> Option<String> {
        self.overrides
            .get(&ConfigKey::new(section, option))
            .cloned()
            .or_else(|| self.base.get_value(section, option))
    }

    fn all_values(&self) -> Vec<(String, String, String)> {
        let mut merged: BTreeMap<ConfigKey, String> = self
            .base
            .all_values()
            .into_iter()
            .map(|(section, option, value)| (ConfigKey::new(section, option), value))
            .collect();
        merged.extend(
            self.overrides
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        merged
            .into_iter()
            .map(|(key, value)| {
                (
                    key.section().to_string(),
                    key.option().to_string(),
                    value,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sections_and_scalars() {
        let config = RawConfig::from_toml_str(
            r#"
            [sec]
            nam = "123"
            count = 4
            ratio = 0.5
            enabled = true
            list = [1, 2]

            [SEC2]
            NAM2 = "x"
            "#,
        )
        .unwrap();

        assert_eq!(config.get_value("SEC", "NAM").as_deref(), Some("123"));
        assert_eq!(config.get_value("sec", "count").as_deref(), Some("4"));
        assert_eq!(config.get_value("SEC", "RATIO").as_deref(), Some("0.5"));
        assert_eq!(config.get_value("SEC", "ENABLED").as_deref(), Some("true"));
        assert_eq!(config.get_value("SEC", "LIST"), None);
        assert_eq!(config.get_value("sec2", "nam2").as_deref(), Some("x"));
        assert_eq!(config.len(), 5);
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = RawConfig::from_toml_str("[sec\nnam = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_overlay_prefers_overrides() {
        let mut base = RawConfig::new();
        base.set("SEC", "A", "base");
        base.set("SEC", "B", "base");
        let mut overrides = BTreeMap::new();
        overrides.insert(ConfigKey::new("SEC", "A"), "override".to_string());

        let overlay = OverlaySource::new(&base, &overrides);
        assert_eq!(overlay.get_value("sec", "a").as_deref(), Some("override"));
        assert_eq!(overlay.get_value("SEC", "B").as_deref(), Some("base"));
        assert_eq!(overlay.all_values().len(), 2);
    }
}
