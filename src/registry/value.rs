//! Value kinds that can be registered as dynamic configuration.
//!
//! # Design Decisions
//! - One typed pool per kind in the registry, one typed column per kind in a bundle
//! - Conversion failures never abort a fill: the caller falls back to the default
//! - Kinds are laid out by descending alignment, ties in declaration order

use std::fmt;
use std::mem::{align_of, size_of};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bundle::Columns;
use crate::registry::pool::TypedPool;
use crate::registry::Registry;

/// The closed set of value kinds a bundle can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Number,
    Float,
    Text,
    Date,
    Flag,
}

impl ValueKind {
    /// Every kind, in declaration order.
    pub const ALL: [ValueKind; 5] = [
        ValueKind::Number,
        ValueKind::Float,
        ValueKind::Text,
        ValueKind::Date,
        ValueKind::Flag,
    ];

    /// Kinds in layout order: descending natural alignment, stable on ties.
    pub fn layout_order() -> Vec<ValueKind> {
        let mut kinds = Self::ALL.to_vec();
        kinds.sort_by(|a, b| b.align().cmp(&a.align()));
        kinds
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Number => "number",
            ValueKind::Float => "float",
            ValueKind::Text => "text",
            ValueKind::Date => "date",
            ValueKind::Flag => "flag",
        }
    }

    pub fn align(self) -> usize {
        match self {
            ValueKind::Number => align_of::<i64>(),
            ValueKind::Float => align_of::<f64>(),
            ValueKind::Text => align_of::<String>(),
            ValueKind::Date => align_of::<NaiveDate>(),
            ValueKind::Flag => align_of::<bool>(),
        }
    }

    pub fn element_size(self) -> usize {
        match self {
            ValueKind::Number => size_of::<i64>(),
            ValueKind::Float => size_of::<f64>(),
            ValueKind::Text => size_of::<String>(),
            ValueKind::Date => size_of::<NaiveDate>(),
            ValueKind::Flag => size_of::<bool>(),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw text that could not be converted to the requested kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot convert {raw:?} to {kind}")]
pub struct ConversionError {
    pub kind: ValueKind,
    pub raw: String,
}

impl ConversionError {
    fn new(kind: ValueKind, raw: &str) -> Self {
        Self {
            kind,
            raw: raw.to_string(),
        }
    }
}

/// A type that can live in a configuration bundle.
///
/// Implemented for `i64`, `f64`, `String`, `NaiveDate` and `bool`. The hidden
/// accessors tie each type to its registry pool and bundle column; callers
/// always know `T` from their own handle, so there is no runtime type tag.
pub trait ConfigValue: Clone + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    const KIND: ValueKind;

    /// Convert raw configuration text.
    fn parse_raw(raw: &str) -> Result<Self, ConversionError>;

    /// Render back to configuration text (used by dumps and the admin surface).
    fn render(&self) -> String;

    #[doc(hidden)]
    fn pool(registry: &Registry) -> &TypedPool<Self>;

    #[doc(hidden)]
    fn column(columns: &Columns) -> &Vec<Self>;

    #[doc(hidden)]
    fn column_mut(columns: &mut Columns) -> &mut Vec<Self>;
}

impl ConfigValue for i64 {
    const KIND: ValueKind = ValueKind::Number;

    fn parse_raw(raw: &str) -> Result<Self, ConversionError> {
        raw.trim()
            .parse()
            .map_err(|_| ConversionError::new(Self::KIND, raw))
    }

    fn render(&self) -> String {
        self.to_string()
    }

    fn pool(registry: &Registry) -> &TypedPool<Self> {
        &registry.numbers
    }

    fn column(columns: &Columns) -> &Vec<Self> {
        &columns.numbers
    }

    fn column_mut(columns: &mut Columns) -> &mut Vec<Self> {
        &mut columns.numbers
    }
}

impl ConfigValue for f64 {
    const KIND: ValueKind = ValueKind::Float;

    fn parse_raw(raw: &str) -> Result<Self, ConversionError> {
        raw.trim()
            .parse()
            .map_err(|_| ConversionError::new(Self::KIND, raw))
    }

    fn render(&self) -> String {
        self.to_string()
    }

    fn pool(registry: &Registry) -> &TypedPool<Self> {
        &registry.floats
    }

    fn column(columns: &Columns) -> &Vec<Self> {
        &columns.floats
    }

    fn column_mut(columns: &mut Columns) -> &mut Vec<Self> {
        &mut columns.floats
    }
}

impl ConfigValue for String {
    const KIND: ValueKind = ValueKind::Text;

    fn parse_raw(raw: &str) -> Result<Self, ConversionError> {
        Ok(raw.trim().to_string())
    }

    fn render(&self) -> String {
        self.clone()
    }

    fn pool(registry: &Registry) -> &TypedPool<Self> {
        &registry.texts
    }

    fn column(columns: &Columns) -> &Vec<Self> {
        &columns.texts
    }

    fn column_mut(columns: &mut Columns) -> &mut Vec<Self> {
        &mut columns.texts
    }
}

impl ConfigValue for NaiveDate {
    const KIND: ValueKind = ValueKind::Date;

    fn parse_raw(raw: &str) -> Result<Self, ConversionError> {
        let trimmed = raw.trim();
        // Datetimes are accepted and truncated to their date part.
        let date_part = trimmed.get(..10).unwrap_or(trimmed);
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            .map_err(|_| ConversionError::new(Self::KIND, raw))
    }

    fn render(&self) -> String {
        self.format("%Y-%m-%d").to_string()
    }

    fn pool(registry: &Registry) -> &TypedPool<Self> {
        &registry.dates
    }

    fn column(columns: &Columns) -> &Vec<Self> {
        &columns.dates
    }

    fn column_mut(columns: &mut Columns) -> &mut Vec<Self> {
        &mut columns.dates
    }
}

impl ConfigValue for bool {
    const KIND: ValueKind = ValueKind::Flag;

    fn parse_raw(raw: &str) -> Result<Self, ConversionError> {
        match raw.trim().to_uppercase().as_str() {
            "Y" | "YES" | "T" | "TRUE" | "ON" | "1" => Ok(true),
            "N" | "NO" | "F" | "FALSE" | "OFF" | "0" => Ok(false),
            _ => Err(ConversionError::new(Self::KIND, raw)),
        }
    }

    fn render(&self) -> String {
        let text = if *self { "Y" } else { "N" };
        text.to_string()
    }

    fn pool(registry: &Registry) -> &TypedPool<Self> {
        &registry.flags
    }

    fn column(columns: &Columns) -> &Vec<Self> {
        &columns.flags
    }

    fn column_mut(columns: &mut Columns) -> &mut Vec<Self> {
        &mut columns.flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_order_is_alignment_descending() {
        let order = ValueKind::layout_order();
        for pair in order.windows(2) {
            assert!(pair[0].align() >= pair[1].align());
        }
        assert_eq!(order.last(), Some(&ValueKind::Flag));
    }

    #[test]
    fn test_flag_parsing() {
        assert_eq!(bool::parse_raw("yes"), Ok(true));
        assert_eq!(bool::parse_raw(" 0 "), Ok(false));
        assert_eq!(bool::parse_raw("off"), Ok(false));
        assert!(bool::parse_raw("maybe").is_err());
    }

    #[test]
    fn test_number_parsing() {
        assert_eq!(i64::parse_raw(" -42"), Ok(-42));
        let err = i64::parse_raw("12x").unwrap_err();
        assert_eq!(err.kind, ValueKind::Number);
        assert_eq!(err.raw, "12x");
    }

    #[test]
    fn test_date_parsing_truncates_datetime() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(NaiveDate::parse_raw("2024-03-01"), Ok(date));
        assert_eq!(NaiveDate::parse_raw("2024-03-01T10:00:00"), Ok(date));
        assert!(NaiveDate::parse_raw("03/01/2024").is_err());
        assert_eq!(date.render(), "2024-03-01");
    }
}
