//! Reload, publish and snapshot isolation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{wait_until, Harness};
use dynconfig::config::ReloadConfig;
use dynconfig::lifecycle::Shutdown;
use dynconfig::registry::{ConfigKey, ValueHandle};
use dynconfig::runtime::{OverrideOutcome, OverrideRequest, ReloadOutcome, ReloadState, Transaction};
use dynconfig::throttling::TrxIdentity;

const INITIAL: &str = r#"
[PRICING]
MAX_SEGMENTS = 16
MARKUP = 1.5

[SERVER]
DYNAMIC_CONFIG_OVERRIDE_ENABLED = "Y"
"#;

fn harness() -> (Harness, ValueHandle<i64>, ValueHandle<f64>) {
    harness_with(ReloadConfig::default())
}

fn harness_with(reload: ReloadConfig) -> (Harness, ValueHandle<i64>, ValueHandle<f64>) {
    let mut handles = None;
    let harness = Harness::build(INITIAL, reload, |ctx| {
        handles = Some((
            ctx.register("PRICING", "MAX_SEGMENTS", 4i64),
            ctx.register("PRICING", "MARKUP", 1.0f64),
        ));
    });
    let (segments, markup) = handles.unwrap();
    (harness, segments, markup)
}

#[test]
fn test_reload_publishes_only_on_registered_change() {
    let (harness, segments, markup) = harness();
    assert_eq!(*segments.value(&harness.ctx.current()), 16);

    harness.write(&format!("{INITIAL}\n[UNRELATED]\nANYTHING = 1\n"));
    assert_eq!(harness.reloader.reload_once(), ReloadOutcome::NoChange);
    assert_eq!(harness.ctx.generation(), 1);

    harness.write(&INITIAL.replace("MAX_SEGMENTS = 16", "MAX_SEGMENTS = 24"));
    let outcome = harness.reloader.reload_once();
    assert_eq!(
        outcome,
        ReloadOutcome::Updated {
            changed: vec![ConfigKey::new("PRICING", "MAX_SEGMENTS")],
            generation: 2,
        }
    );

    let bundle = harness.ctx.current();
    assert_eq!(*segments.value(&bundle), 24);
    assert_eq!(*markup.value(&bundle), 1.5);
}

#[test]
fn test_in_flight_transaction_keeps_its_snapshot() {
    let (harness, segments, _) = harness();
    let trx = Transaction::begin(&harness.ctx, &harness.throttler, TrxIdentity::new()).unwrap();

    harness.write(&INITIAL.replace("MAX_SEGMENTS = 16", "MAX_SEGMENTS = 32"));
    assert!(matches!(
        harness.reloader.reload_once(),
        ReloadOutcome::Updated { .. }
    ));

    assert_eq!(segments.current_value(&trx), 16);
    assert_eq!(trx.bundle().generation(), 1);
    // The old bundle is now owned by the transaction alone.
    assert_eq!(trx.shared_bundle().owner_count(), 1);

    let fresh = Transaction::begin(&harness.ctx, &harness.throttler, TrxIdentity::new()).unwrap();
    assert_eq!(segments.current_value(&fresh), 32);
}

#[test]
fn test_failed_reload_keeps_previous_bundle() {
    let (harness, segments, _) = harness();
    let before = harness.ctx.current();

    harness.write("[PRICING\nMAX_SEGMENTS = ");
    assert!(matches!(
        harness.reloader.reload_once(),
        ReloadOutcome::Failed { .. }
    ));
    assert!(harness.ctx.current().ptr_eq(&before));

    // Recovery diffs against the last good snapshot.
    harness.write(INITIAL);
    assert_eq!(harness.reloader.reload_once(), ReloadOutcome::NoChange);
    assert_eq!(*segments.value(&harness.ctx.current()), 16);

    let status = harness.reloader.status();
    assert_eq!(status.failures, 1);
    assert_eq!(status.last_result, ReloadState::NoChange);
}

#[test]
fn test_malformed_value_falls_back_to_default() {
    let (harness, segments, _) = harness();
    harness.write(&INITIAL.replace("MAX_SEGMENTS = 16", "MAX_SEGMENTS = \"lots\""));

    assert!(matches!(
        harness.reloader.reload_once(),
        ReloadOutcome::Updated { .. }
    ));
    assert_eq!(*segments.value(&harness.ctx.current()), 4);
}

#[test]
fn test_permanent_override_survives_reload() {
    let (harness, segments, markup) = harness();

    let outcome = harness
        .ctx
        .apply_permanent_override(&OverrideRequest::new("PRICING\\MAX_SEGMENTS", "99"))
        .unwrap();
    assert_eq!(outcome, OverrideOutcome::Permanent { generation: 2 });
    assert_eq!(*segments.value(&harness.ctx.current()), 99);

    harness.write(&INITIAL.replace("MARKUP = 1.5", "MARKUP = 2.5"));
    assert!(matches!(
        harness.reloader.reload_once(),
        ReloadOutcome::Updated { .. }
    ));

    let bundle = harness.ctx.current();
    assert_eq!(*segments.value(&bundle), 99);
    assert_eq!(*markup.value(&bundle), 2.5);
    assert_eq!(bundle.generation(), 3);
}

#[tokio::test]
async fn test_run_loop_reloads_on_trigger_and_stops_on_shutdown() {
    let (harness, segments, _) = harness_with(ReloadConfig {
        enabled: true,
        interval_secs: 3600,
    });
    let shutdown = Shutdown::new();
    let task = tokio::spawn(Arc::clone(&harness.reloader).run(shutdown.subscribe()));

    harness.write(&INITIAL.replace("MAX_SEGMENTS = 16", "MAX_SEGMENTS = 8"));
    let trigger = harness.reloader.trigger();
    let ctx = Arc::clone(&harness.ctx);
    let reloaded = wait_until(Duration::from_secs(5), || {
        trigger.notify_one();
        let ctx = Arc::clone(&ctx);
        async move { ctx.generation() == 2 }
    })
    .await;
    assert!(reloaded);
    assert_eq!(*segments.value(&harness.ctx.current()), 8);

    shutdown.trigger("test");
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("reload loop did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_disabled_loading_does_not_start_loop() {
    let (harness, _, _) = harness_with(ReloadConfig {
        enabled: false,
        interval_secs: 1,
    });
    let shutdown = Shutdown::new();

    // Returns without waiting for shutdown.
    tokio::time::timeout(
        Duration::from_secs(1),
        Arc::clone(&harness.reloader).run(shutdown.subscribe()),
    )
    .await
    .unwrap();

    let err = harness.reloader.reload_now().unwrap_err();
    assert_eq!(err.to_string(), "Dynamic configuration loading is disabled.");
}
