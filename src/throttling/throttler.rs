//! Live admission control driven by the throttling rule string.

use std::sync::{Arc, RwLock};

use serde::Serialize;
use thiserror::Error;

use crate::bundle::Bundle;
use crate::observability::metrics;
use crate::registry::ValueHandle;
use crate::throttling::counter::{fingerprint, CounterRegistry, CounterTag};
use crate::throttling::rule::{parse_rules, ThrottleRule, TrxIdentity};

/// A transaction was refused admission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("TRANSACTION THRESHOLD REACHED")]
    ThresholdReached { rule: String, limit: u32 },
}

/// Counter state of one rule, for the admin surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub rule: String,
    pub count: u32,
    pub limit: u32,
}

#[derive(Default)]
struct CompiledRules {
    raw: String,
    /// Bundle generation the rules were read from.
    generation: u64,
    rules: Vec<ThrottleRule>,
}

/// Decrements every counter it incremented when dropped.
#[must_use = "dropping the guard releases the admission immediately"]
#[derive(Debug)]
pub struct AdmissionGuard {
    held: Vec<Arc<CounterTag>>,
}

impl AdmissionGuard {
    /// Number of rules this admission counted against.
    pub fn counters_held(&self) -> usize {
        self.held.len()
    }

    /// Release the admission early.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        for counter in self.held.drain(..) {
            counter.release();
        }
    }
}

/// Admission control over a live, reconfigurable rule list.
///
/// The rule list is rebuilt only when the rule text read from a bundle
/// differs from the text it was last built from. Counters are shared across
/// rebuilds through the [`CounterRegistry`], keyed by rule fingerprint.
pub struct Throttler {
    rule_value: ValueHandle<String>,
    compiled: RwLock<CompiledRules>,
    counters: CounterRegistry,
}

impl Throttler {
    /// `rule_value` is the registered handle holding the rule string.
    pub fn new(rule_value: ValueHandle<String>) -> Self {
        Self {
            rule_value,
            compiled: RwLock::new(CompiledRules::default()),
            counters: CounterRegistry::new(),
        }
    }

    /// Rebuild the rule list if `bundle` carries different rule text.
    ///
    /// A bundle older than the one the rules were last read from is ignored,
    /// so a late transaction cannot roll the rules back. Returns true if a
    /// rebuild happened.
    pub fn refresh(&self, bundle: &Bundle) -> bool {
        let raw = self.rule_value.value(bundle);
        let generation = bundle.generation();
        {
            let compiled = self.compiled.read().expect("throttle rules lock poisoned");
            if generation < compiled.generation || compiled.raw == *raw {
                return false;
            }
        }
        self.rebuild_from(raw, Some(generation))
    }

    /// Replace the rule list with the rules parsed from `raw`.
    pub fn rebuild(&self, raw: &str) -> bool {
        self.rebuild_from(raw, None)
    }

    fn rebuild_from(&self, raw: &str, generation: Option<u64>) -> bool {
        let mut compiled = self.compiled.write().expect("throttle rules lock poisoned");
        if let Some(generation) = generation {
            if generation < compiled.generation {
                return false;
            }
            compiled.generation = generation;
        }
        if compiled.raw == raw {
            return false;
        }

        let mut rules: Vec<ThrottleRule> = Vec::new();
        for spec in parse_rules(raw) {
            if rules.iter().any(|rule| rule.text() == spec.text()) {
                tracing::warn!(rule = %spec.text(), "Ignoring duplicate throttle rule");
                continue;
            }
            let counter = self
                .counters
                .counter_for(fingerprint(spec.text()), spec.limit());
            rules.push(spec.bind(counter));
        }

        compiled.raw = raw.to_string();
        let previous = std::mem::replace(&mut compiled.rules, rules);
        drop(previous);
        let pruned = self.counters.prune();

        tracing::info!(
            rules = compiled.rules.len(),
            counters = self.counters.len(),
            pruned,
            "Throttle rules rebuilt"
        );
        true
    }

    /// Count `identity` against every matching rule.
    ///
    /// Each matching counter is taken in rule order with a bounded atomic
    /// increment. The first counter already at its limit refuses the
    /// transaction, and the counters taken before it are given back.
    pub fn admit(&self, identity: &TrxIdentity) -> Result<AdmissionGuard, AdmissionError> {
        let compiled = self.compiled.read().expect("throttle rules lock poisoned");
        let mut guard = AdmissionGuard { held: Vec::new() };
        let mut exceeded: Option<&ThrottleRule> = None;

        for rule in compiled.rules.iter().filter(|rule| rule.matches(identity)) {
            if !rule.counter.try_acquire() {
                exceeded = Some(rule);
                break;
            }
            guard.held.push(Arc::clone(&rule.counter));
        }

        match exceeded {
            None => {
                metrics::record_admission("admitted");
                Ok(guard)
            }
            Some(rule) => {
                drop(guard);
                tracing::warn!(
                    identity = %identity,
                    rule = %rule.text(),
                    limit = rule.limit(),
                    "TRANSACTION THRESHOLD REACHED"
                );
                metrics::record_admission("rejected");
                Err(AdmissionError::ThresholdReached {
                    rule: rule.text().to_string(),
                    limit: rule.limit(),
                })
            }
        }
    }

    /// Current counters of every live rule.
    pub fn snapshot(&self) -> Vec<CounterSnapshot> {
        let compiled = self.compiled.read().expect("throttle rules lock poisoned");
        compiled
            .rules
            .iter()
            .map(|rule| CounterSnapshot {
                rule: rule.text().to_string(),
                count: rule.counter.count(),
                limit: rule.limit(),
            })
            .collect()
    }

    pub fn rule_count(&self) -> usize {
        self.compiled
            .read()
            .expect("throttle rules lock poisoned")
            .rules
            .len()
    }

    /// Rule text the current list was built from.
    pub fn rule_text(&self) -> String {
        self.compiled
            .read()
            .expect("throttle rules lock poisoned")
            .raw
            .clone()
    }
}
