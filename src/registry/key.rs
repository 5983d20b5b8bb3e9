//! Normalized configuration keys.

use std::fmt;

use serde::Serialize;

/// A `(section, option)` pair, upper-cased so lookups are case-insensitive.
///
/// Keys are not unique to a value kind: every kind keeps its own namespace, so
/// the same key may be registered as a number in one place and a flag in another.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ConfigKey {
    section: String,
    option: String,
}

impl ConfigKey {
    /// Build a normalized key.
    pub fn new(section: impl AsRef<str>, option: impl AsRef<str>) -> Self {
        Self {
            section: normalize(section.as_ref()),
            option: normalize(option.as_ref()),
        }
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn option(&self) -> &str {
        &self.option
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\\{}", self.section, self.option)
    }
}

pub(crate) fn normalize(raw: &str) -> String {
    raw.trim().to_uppercase()
}
