//! Per-transaction view of dynamic configuration.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::bundle::{Bundle, SharedBundle};
use crate::observability::metrics;
use crate::runtime::context::DynamicConfig;
use crate::runtime::overrides::{single_value, OverrideError, OverrideOutcome, OverrideRequest};
use crate::throttling::{AdmissionError, AdmissionGuard, Throttler, TrxIdentity};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("dynamic configuration has not been initialized")]
    NotInitialized,

    #[error(transparent)]
    Admission(#[from] AdmissionError),
}

/// One admitted unit of work.
///
/// Captures the default bundle at begin and reads it for its whole life, so
/// a reload that publishes mid-transaction is not observed. Dropping the
/// transaction releases its admission counters and its bundle reference.
pub struct Transaction {
    id: Uuid,
    identity: TrxIdentity,
    bundle: SharedBundle,
    overridden: bool,
    ctx: Arc<DynamicConfig>,
    _admission: AdmissionGuard,
}

impl Transaction {
    /// Snapshot the current bundle, refresh throttle rules from it and admit.
    pub fn begin(
        ctx: &Arc<DynamicConfig>,
        throttler: &Throttler,
        identity: TrxIdentity,
    ) -> Result<Self, TransactionError> {
        let bundle = ctx.try_current().ok_or(TransactionError::NotInitialized)?;
        throttler.refresh(&bundle);
        let admission = throttler.admit(&identity)?;

        let id = Uuid::new_v4();
        tracing::debug!(
            trx_id = %id,
            identity = %identity,
            generation = bundle.generation(),
            "Transaction started"
        );

        Ok(Self {
            id,
            identity,
            bundle,
            overridden: false,
            ctx: Arc::clone(ctx),
            _admission: admission,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn identity(&self) -> &TrxIdentity {
        &self.identity
    }

    /// The bundle this transaction reads from.
    pub fn bundle(&self) -> &Bundle {
        &self.bundle
    }

    pub fn shared_bundle(&self) -> &SharedBundle {
        &self.bundle
    }

    /// Whether a local override gave this transaction a private bundle.
    pub fn is_overridden(&self) -> bool {
        self.overridden
    }

    /// Apply `request` to this transaction only.
    ///
    /// The shared bundle is copied on first write. Other transactions and the
    /// published default are not affected.
    pub fn apply_override(
        &mut self,
        request: &OverrideRequest,
    ) -> Result<OverrideOutcome, OverrideError> {
        if !*self.ctx.override_enabled().value(&self.bundle) {
            return Err(OverrideError::Disabled);
        }
        let Some((key, value)) = request.resolve(self.ctx.registry(), self.bundle.layout())? else {
            return Ok(OverrideOutcome::Skipped);
        };

        let source = single_value(&key, &value);
        self.bundle
            .make_unique()
            .update_one(self.ctx.registry(), &source, key.section(), key.option());
        self.overridden = true;

        tracing::info!(trx_id = %self.id, key = %key, value = %value, "Local override applied");
        metrics::record_override("local");
        Ok(OverrideOutcome::Local)
    }

    /// Apply `request` locally or permanently, as the override-permanent flag
    /// in this transaction's bundle says.
    pub fn apply_request_override(
        &mut self,
        request: &OverrideRequest,
    ) -> Result<OverrideOutcome, OverrideError> {
        if *self.ctx.override_permanent().value(&self.bundle) {
            self.ctx.apply_permanent_override(request)
        } else {
            self.apply_override(request)
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        tracing::debug!(trx_id = %self.id, overridden = self.overridden, "Transaction finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RawConfig, ThrottlingConfig};

    fn context(rules: &str) -> (Arc<DynamicConfig>, Throttler) {
        let ctx = Arc::new(DynamicConfig::new(&ThrottlingConfig::default()));
        let mut source = RawConfig::new();
        source.set("SERVER", "TRX_THROTTLING", rules);
        source.set("SERVER", "DYNAMIC_CONFIG_OVERRIDE_ENABLED", "Y");
        ctx.initialize(source).unwrap();
        let throttler = Throttler::new(ctx.throttle_rules().clone());
        (ctx, throttler)
    }

    #[test]
    fn test_begin_before_initialize() {
        let ctx = Arc::new(DynamicConfig::new(&ThrottlingConfig::default()));
        let throttler = Throttler::new(ctx.throttle_rules().clone());
        let err = Transaction::begin(&ctx, &throttler, TrxIdentity::new()).err();
        assert_eq!(err, Some(TransactionError::NotInitialized));
    }

    #[test]
    fn test_begin_shares_published_bundle() {
        let (ctx, throttler) = context("");
        let trx = Transaction::begin(&ctx, &throttler, TrxIdentity::new()).unwrap();
        assert!(trx.shared_bundle().ptr_eq(&ctx.current()));
        assert!(!trx.is_overridden());
    }

    #[test]
    fn test_throttled_begin_and_release_on_drop() {
        let (ctx, throttler) = context("cust:1");
        let identity = TrxIdentity::new().with("PCC", "CUST");

        let first = Transaction::begin(&ctx, &throttler, identity.clone()).unwrap();
        let refused = Transaction::begin(&ctx, &throttler, identity.clone()).err();
        assert!(matches!(refused, Some(TransactionError::Admission(_))));

        drop(first);
        assert!(Transaction::begin(&ctx, &throttler, identity).is_ok());
    }

    #[test]
    fn test_override_refusals() {
        let (ctx, throttler) = context("");
        let mut trx = Transaction::begin(&ctx, &throttler, TrxIdentity::new()).unwrap();

        assert_eq!(
            trx.apply_override(&OverrideRequest::new("SEC\\MISSING", "1")),
            Err(OverrideError::UnknownTarget(crate::registry::ConfigKey::new("SEC", "MISSING")))
        );
        assert_eq!(
            trx.apply_override(&OverrideRequest::new("SEC\\MISSING", "1").optional()),
            Ok(OverrideOutcome::Skipped)
        );
        assert!(!trx.is_overridden());
        assert!(trx.shared_bundle().ptr_eq(&ctx.current()));
    }

    #[test]
    fn test_unconvertible_local_override_is_refused() {
        let ctx = Arc::new(DynamicConfig::new(&ThrottlingConfig::default()));
        let segments = ctx.register("PRICING", "MAX_SEGMENTS", 4i64);
        let mut source = RawConfig::new();
        source.set("SERVER", "DYNAMIC_CONFIG_OVERRIDE_ENABLED", "Y");
        source.set("PRICING", "MAX_SEGMENTS", "16");
        ctx.initialize(source).unwrap();
        let throttler = Throttler::new(ctx.throttle_rules().clone());
        let mut trx = Transaction::begin(&ctx, &throttler, TrxIdentity::new()).unwrap();

        let err = trx
            .apply_override(&OverrideRequest::new("PRICING\\MAX_SEGMENTS", "lots"))
            .unwrap_err();
        assert!(matches!(err, OverrideError::InvalidValue { .. }));
        assert!(!trx.is_overridden());
        assert!(trx.shared_bundle().ptr_eq(&ctx.current()));
        assert_eq!(segments.current_value(&trx), 16);
    }

    #[test]
    fn test_override_disabled_by_default() {
        let ctx = Arc::new(DynamicConfig::new(&ThrottlingConfig::default()));
        ctx.initialize(RawConfig::new()).unwrap();
        let throttler = Throttler::new(ctx.throttle_rules().clone());
        let mut trx = Transaction::begin(&ctx, &throttler, TrxIdentity::new()).unwrap();

        assert_eq!(
            trx.apply_request_override(&OverrideRequest::new("SERVER\\TRX_THROTTLING", "x:1")),
            Err(OverrideError::Disabled)
        );
    }

    #[test]
    fn test_local_override_of_laid_out_value() {
        let (ctx, throttler) = context("cust:3");
        let mut trx = Transaction::begin(&ctx, &throttler, TrxIdentity::new()).unwrap();
        let outcome = trx
            .apply_override(&OverrideRequest::new("SERVER\\TRX_THROTTLING", "cust:9"))
            .unwrap();

        assert_eq!(outcome, OverrideOutcome::Local);
        assert!(trx.is_overridden());
        assert!(!trx.shared_bundle().ptr_eq(&ctx.current()));
        assert_eq!(ctx.throttle_rules().current_value(&trx), "cust:9");
        assert_eq!(ctx.throttle_rules().value(&ctx.current()), "cust:3");
    }
}
