//! Throttle rule parsing and matching.
//!
//! # Grammar
//! ```text
//! rules     := clause ( "|" clause )*
//! clause    := conditions ":" limit
//! conditions:= condition ( "&" condition )*
//! condition := ATTR "=" VALUE | VALUE | "*"
//! ```
//!
//! A bare `VALUE` matches when any identity attribute equals it. Matching is
//! case-insensitive. Malformed clauses are skipped, the rest still compile.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::throttling::counter::CounterTag;

/// The attributes a transaction is identified by (service, PCC, LNIATA, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrxIdentity {
    attrs: BTreeMap<String, String>,
}

impl TrxIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, attr: &str, value: &str) -> Self {
        self.attrs
            .insert(attr.trim().to_uppercase(), value.trim().to_uppercase());
        self
    }

    pub fn get(&self, attr: &str) -> Option<&str> {
        self.attrs.get(&attr.trim().to_uppercase()).map(String::as_str)
    }

    fn has_value(&self, value: &str) -> bool {
        self.attrs.values().any(|v| v == value)
    }
}

impl fmt::Display for TrxIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (attr, value) in &self.attrs {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{}={}", attr, value)?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Condition {
    Any,
    Attr { name: String, value: String },
    Value(String),
}

impl Condition {
    fn matches(&self, identity: &TrxIdentity) -> bool {
        match self {
            Condition::Any => true,
            Condition::Attr { name, value } => identity.get(name) == Some(value.as_str()),
            Condition::Value(value) => identity.has_value(value),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Any => f.write_str("*"),
            Condition::Attr { name, value } => write!(f, "{}={}", name, value),
            Condition::Value(value) => f.write_str(value),
        }
    }
}

/// Why a clause failed to compile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleParseError {
    #[error("clause {0:?} has no ':limit'")]
    MissingLimit(String),

    #[error("clause {clause:?} has an invalid limit {limit:?}")]
    InvalidLimit { clause: String, limit: String },

    #[error("clause {0:?} has an empty condition")]
    EmptyCondition(String),
}

/// A parsed clause, not yet bound to a counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSpec {
    text: String,
    conditions: Vec<Condition>,
    limit: u32,
}

impl RuleSpec {
    /// Normalized clause text; identical rules have identical text.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub(crate) fn bind(self, counter: Arc<CounterTag>) -> ThrottleRule {
        ThrottleRule {
            text: self.text,
            conditions: self.conditions,
            limit: self.limit,
            counter,
        }
    }
}

/// Parse one clause.
pub fn parse_clause(clause: &str) -> Result<RuleSpec, RuleParseError> {
    let clause = clause.trim();
    let (conditions, limit) = clause
        .rsplit_once(':')
        .ok_or_else(|| RuleParseError::MissingLimit(clause.to_string()))?;

    let limit_text = limit.trim();
    let limit: u32 = limit_text
        .parse()
        .map_err(|_| RuleParseError::InvalidLimit {
            clause: clause.to_string(),
            limit: limit_text.to_string(),
        })?;

    let mut parsed = Vec::new();
    for condition in conditions.split('&') {
        let condition = condition.trim().to_uppercase();
        if condition.is_empty() {
            return Err(RuleParseError::EmptyCondition(clause.to_string()));
        }
        let parsed_condition = match condition.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() && !value.trim().is_empty() => {
                Condition::Attr {
                    name: name.trim().to_string(),
                    value: value.trim().to_string(),
                }
            }
            Some(_) => return Err(RuleParseError::EmptyCondition(clause.to_string())),
            None if condition == "*" => Condition::Any,
            None => Condition::Value(condition),
        };
        parsed.push(parsed_condition);
    }

    let text = format!(
        "{}:{}",
        parsed
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("&"),
        limit
    );

    Ok(RuleSpec {
        text,
        conditions: parsed,
        limit,
    })
}

/// Parse a whole rule string, skipping (and logging) malformed clauses.
pub fn parse_rules(raw: &str) -> Vec<RuleSpec> {
    raw.split('|')
        .filter(|clause| !clause.trim().is_empty())
        .filter_map(|clause| match parse_clause(clause) {
            Ok(spec) => Some(spec),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed throttle clause");
                None
            }
        })
        .collect()
}

/// A compiled predicate plus a concurrency limit, bound to its shared counter.
#[derive(Debug)]
pub struct ThrottleRule {
    text: String,
    conditions: Vec<Condition>,
    limit: u32,
    pub(crate) counter: Arc<CounterTag>,
}

impl ThrottleRule {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// All conditions must hold (AND).
    pub fn matches(&self, identity: &TrxIdentity) -> bool {
        self.conditions.iter().all(|c| c.matches(identity))
    }
}
