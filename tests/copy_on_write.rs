//! Local overrides stay private to their transaction.

mod common;

use std::sync::Barrier;

use common::Harness;
use dynconfig::config::ReloadConfig;
use dynconfig::registry::{ConfigKey, ValueHandle};
use dynconfig::runtime::{OverrideError, OverrideOutcome, OverrideRequest, ReloadOutcome, Transaction};
use dynconfig::throttling::TrxIdentity;

const SOURCE: &str = r#"
[SERVER]
DYNAMIC_CONFIG_OVERRIDE_ENABLED = "Y"

[FARES]
ROUNDING = 2
CARRIER = "XX"
"#;

fn harness(source: &str) -> (Harness, ValueHandle<i64>, ValueHandle<String>) {
    let mut handles = None;
    let harness = Harness::build(source, ReloadConfig::default(), |ctx| {
        handles = Some((
            ctx.register("FARES", "ROUNDING", 0i64),
            ctx.register("FARES", "CARRIER", String::new()),
        ));
    });
    let (rounding, carrier) = handles.unwrap();
    (harness, rounding, carrier)
}

#[test]
fn test_concurrent_local_overrides_are_isolated() {
    let (harness, rounding, carrier) = harness(SOURCE);
    let threads = 16;
    let barrier = Barrier::new(threads);

    std::thread::scope(|s| {
        for i in 0..threads {
            let (harness, rounding, carrier, barrier) = (&harness, &rounding, &carrier, &barrier);
            s.spawn(move || {
                let mut trx =
                    Transaction::begin(&harness.ctx, &harness.throttler, TrxIdentity::new())
                        .unwrap();
                barrier.wait();

                // Only even threads override; odd ones must keep seeing the default.
                if i % 2 == 0 {
                    let request = OverrideRequest::new(format!("FARES\\ROUNDING\\{i}"), "");
                    assert_eq!(trx.apply_override(&request), Ok(OverrideOutcome::Local));
                    assert!(trx.is_overridden());
                }
                barrier.wait();

                let expected = if i % 2 == 0 { i as i64 } else { 2 };
                assert_eq!(rounding.current_value(&trx), expected);
                assert_eq!(carrier.current_value(&trx), "XX");
            });
        }
    });

    assert_eq!(*rounding.value(&harness.ctx.current()), 2);
    assert_eq!(harness.ctx.generation(), 1);
}

#[test]
fn test_second_override_reuses_private_copy() {
    let (harness, rounding, carrier) = harness(SOURCE);
    let mut trx = Transaction::begin(&harness.ctx, &harness.throttler, TrxIdentity::new()).unwrap();

    trx.apply_override(&OverrideRequest::new("fares::rounding", "5").substitute())
        .unwrap();
    trx.apply_override(&OverrideRequest::new("FARES/CARRIER/YY", "").substitute())
        .unwrap();

    assert_eq!(trx.shared_bundle().owner_count(), 1);
    assert_eq!(rounding.current_value(&trx), 5);
    assert_eq!(carrier.current_value(&trx), "YY");
    assert_eq!(carrier.value(&harness.ctx.current()), "XX");
}

#[test]
fn test_request_override_goes_permanent_when_flagged() {
    let source = SOURCE.replace("[SERVER]\n", "[SERVER]\nDYNAMIC_CONFIG_OVERRIDE_PERMANENT = \"Y\"\n");
    let (harness, rounding, _) = harness(&source);
    let mut trx = Transaction::begin(&harness.ctx, &harness.throttler, TrxIdentity::new()).unwrap();

    let outcome = trx
        .apply_request_override(&OverrideRequest::new("FARES\\ROUNDING", "7"))
        .unwrap();
    assert_eq!(outcome, OverrideOutcome::Permanent { generation: 2 });

    // The running transaction keeps its snapshot; new ones see the override.
    assert_eq!(rounding.current_value(&trx), 2);
    assert_eq!(*rounding.value(&harness.ctx.current()), 7);
}

#[test]
fn test_overrides_refused_when_disabled() {
    let (harness, _, _) = harness(&SOURCE.replace("\"Y\"", "\"N\""));
    let mut trx = Transaction::begin(&harness.ctx, &harness.throttler, TrxIdentity::new()).unwrap();

    assert_eq!(
        trx.apply_override(&OverrideRequest::new("FARES\\ROUNDING", "7")),
        Err(OverrideError::Disabled)
    );
    assert!(!trx.is_overridden());
}

#[test]
fn test_override_of_value_registered_after_layout_is_refused() {
    let (harness, _, _) = harness(SOURCE);
    let late = harness.ctx.register("PRICING", "LATE", 1i64);
    let mut trx = Transaction::begin(&harness.ctx, &harness.throttler, TrxIdentity::new()).unwrap();
    let request = OverrideRequest::new("PRICING\\LATE", "42");

    assert_eq!(
        trx.apply_override(&request),
        Err(OverrideError::UnknownTarget(ConfigKey::new("PRICING", "LATE")))
    );
    assert_eq!(
        trx.apply_override(&request.clone().optional()),
        Ok(OverrideOutcome::Skipped)
    );
    assert!(!trx.is_overridden());
    assert!(trx.shared_bundle().ptr_eq(&harness.ctx.current()));

    assert_eq!(
        harness.ctx.apply_permanent_override(&request),
        Err(OverrideError::UnknownTarget(ConfigKey::new("PRICING", "LATE")))
    );
    assert!(harness.ctx.permanent_overrides().is_empty());
    assert_eq!(harness.ctx.generation(), 1);
    assert_eq!(late.current_value(&trx), 1);
}

#[test]
fn test_unconvertible_override_does_not_mask_the_source() {
    let (harness, rounding, _) = harness(SOURCE);
    let mut trx = Transaction::begin(&harness.ctx, &harness.throttler, TrxIdentity::new()).unwrap();
    let request = OverrideRequest::new("FARES\\ROUNDING", "lots");

    assert!(matches!(
        trx.apply_override(&request),
        Err(OverrideError::InvalidValue { .. })
    ));
    assert!(!trx.is_overridden());

    let err = harness.ctx.apply_permanent_override(&request).unwrap_err();
    assert_eq!(err.to_string(), "invalid override for FARES\\ROUNDING: cannot convert \"lots\" to number");
    assert!(harness.ctx.permanent_overrides().is_empty());
    assert_eq!(harness.ctx.generation(), 1);

    // The file stays authoritative on the next reload.
    harness.write(&SOURCE.replace("ROUNDING = 2", "ROUNDING = 3"));
    assert!(matches!(
        harness.reloader.reload_once(),
        ReloadOutcome::Updated { .. }
    ));
    assert_eq!(*rounding.value(&harness.ctx.current()), 3);
}
