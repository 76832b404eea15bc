// tests/output_semantics.rs

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use stackflow::engine::Context;
use stackflow::errors::RuntimeError;
use stackflow::output::{
    PendingTracker, current_callback, in_callback_scope, lift, run_in_callback_scope,
};
use stackflow::resource::{ResourceKind, ResourceOptions, ResourceSet};
use stackflow::value::PropertyMap;
use stackflow::{InputMap, InputValue, Output, PropertyValue, Resource};

use crate::common::{default_context, init_tracing, observe, with_timeout};

fn thing(ctx: &Context, name: &str) -> Resource {
    ctx.allocate(
        ResourceKind::Custom,
        "test:index:Thing",
        name,
        &ResourceOptions::new(),
    )
    .expect("allocate")
}

#[tokio::test]
async fn apply_never_runs_on_unknown_input() {
    init_tracing();

    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    let out = Output::<String>::unknown().apply(move |s| {
        flag.store(true, Ordering::SeqCst);
        s.len()
    });

    let observed = with_timeout(observe(&out)).await;
    assert!(!observed.known);
    assert_eq!(observed.value, None);
    assert!(!called.load(Ordering::SeqCst), "callback ran on unknown input");
}

#[tokio::test]
async fn apply_keeps_dependencies_and_secrecy() {
    init_tracing();
    let (ctx, _monitor) = default_context().await;
    let a = thing(&ctx, "a");

    let out = Output::from_resource(a.id(), 21_i64).secret().apply(|n| n * 2);
    assert_eq!(out.dependencies(), ResourceSet::from([a.id()]));

    let observed = with_timeout(observe(&out)).await;
    assert_eq!(observed.value, Some(42));
    assert!(observed.known);
    assert!(observed.secret);
}

#[tokio::test]
async fn all_is_known_only_when_every_input_is() {
    init_tracing();
    let (ctx, _monitor) = default_context().await;
    let a = thing(&ctx, "a");
    let b = thing(&ctx, "b");

    let combined = Output::all(vec![
        Output::from_resource(a.id(), 1_i64),
        Output::unknown_with(ResourceSet::from([b.id()])),
    ]);
    assert_eq!(combined.dependencies(), ResourceSet::from([a.id(), b.id()]));

    let observed = with_timeout(observe(&combined)).await;
    assert!(!observed.known);
    assert_eq!(observed.value, None);
}

#[tokio::test]
async fn all_is_secret_when_any_input_is() {
    init_tracing();

    let combined = Output::all(vec![
        Output::known("x".to_string()),
        Output::known("y".to_string()).secret(),
    ]);

    let observed = with_timeout(observe(&combined)).await;
    assert_eq!(observed.value, Some(vec!["x".to_string(), "y".to_string()]));
    assert!(observed.known);
    assert!(observed.secret);
}

#[tokio::test]
async fn apply_output_flattens_and_merges_inner_dependencies() {
    init_tracing();
    let (ctx, _monitor) = default_context().await;
    let a = thing(&ctx, "a");
    let b = thing(&ctx, "b");

    let inner = Output::from_resource(b.id(), "y".to_string()).secret();
    let outer = Output::from_resource(a.id(), "x".to_string());
    let flat = outer.apply_output(move |x| inner.apply(move |y| format!("{x}{y}")));

    // Only the outer dependency is known up front.
    assert_eq!(flat.dependencies(), ResourceSet::from([a.id()]));
    assert_eq!(
        with_timeout(flat.all_dependencies()).await,
        ResourceSet::from([a.id(), b.id()])
    );

    let observed = with_timeout(observe(&flat)).await;
    assert_eq!(observed.value, Some("xy".to_string()));
    assert!(observed.secret);
}

#[tokio::test]
async fn failing_transformation_rejects_the_cell() {
    init_tracing();

    let out = Output::known(1_i64).try_apply(|_| -> anyhow::Result<i64> { anyhow::bail!("boom") });

    match with_timeout(out.is_known()).await {
        Err(RuntimeError::Apply(msg)) => assert!(msg.contains("boom"), "unexpected: {msg}"),
        Err(e) => panic!("expected Apply error, got {e:?}"),
        Ok(_) => panic!("expected the cell to reject"),
    }
}

#[tokio::test]
async fn get_is_only_available_inside_a_callback_scope() {
    init_tracing();
    let out = Output::known(5_i64);

    match out.get().await {
        Err(RuntimeError::ValueUnavailable(_)) => {}
        other => panic!("expected ValueUnavailable, got {other:?}"),
    }

    let inside = run_in_callback_scope("test", out.get()).await;
    assert_eq!(inside, Ok(Some(5)));

    let unknown = Output::<i64>::unknown();
    let inside = run_in_callback_scope("test", unknown.get()).await;
    assert_eq!(inside, Ok(None));
}

#[tokio::test]
async fn callback_scope_is_named_and_task_local() {
    init_tracing();
    assert!(!in_callback_scope());
    assert_eq!(current_callback(), None);

    let seen = run_in_callback_scope("export rendering", async {
        (in_callback_scope(), current_callback())
    })
    .await;
    assert_eq!(seen, (true, Some("export rendering")));

    // A task spawned from inside the scope does not inherit it.
    let spawned = run_in_callback_scope("outer", async {
        tokio::spawn(async { current_callback() }).await.unwrap()
    })
    .await;
    assert_eq!(spawned, None);
    assert_eq!(current_callback(), None);
}

#[tokio::test]
async fn resolver_settles_exactly_once() {
    init_tracing();
    let tracker = PendingTracker::new();

    let (out, resolver) = Output::<i64>::pending(ResourceSet::new(), Some(&tracker), "cell");
    assert_eq!(tracker.pending_count(), 1);
    assert!(!out.is_settled());

    resolver
        .resolve(Some(3), true, false, ResourceSet::new())
        .expect("first resolution");
    assert_eq!(tracker.pending_count(), 0);

    match resolver.resolve(Some(4), true, false, ResourceSet::new()) {
        Err(RuntimeError::ProtocolViolation(msg)) => {
            assert!(msg.contains("more than once"), "unexpected: {msg}")
        }
        other => panic!("expected ProtocolViolation, got {other:?}"),
    }
    assert!(!resolver.settle_unknown_if_pending());

    let observed = with_timeout(observe(&out)).await;
    assert_eq!(observed.value, Some(3));
}

#[tokio::test]
async fn dropped_resolver_rejects_and_stays_leaked() {
    init_tracing();
    let tracker = PendingTracker::new();

    let (out, resolver) = Output::<i64>::pending(ResourceSet::new(), Some(&tracker), "orphan");
    drop(resolver);

    match with_timeout(out.is_known()).await {
        Err(RuntimeError::ProtocolViolation(msg)) => assert!(msg.contains("orphan")),
        other => panic!("expected ProtocolViolation, got {other:?}"),
    }
    assert_eq!(tracker.pending_labels(), vec!["orphan".to_string()]);
}

#[tokio::test]
async fn derived_cells_settle_without_being_awaited() {
    init_tracing();

    let (source, resolver) = Output::<i64>::pending(ResourceSet::new(), None, "source");
    let derived = source.apply(|n| n + 1);
    resolver
        .resolve(Some(1), true, false, ResourceSet::new())
        .expect("resolve");

    with_timeout(async {
        while !derived.is_settled() {
            tokio::task::yield_now().await;
        }
    })
    .await;
}

#[tokio::test]
async fn lift_awaits_nested_outputs_and_futures() {
    init_tracing();
    let (ctx, _monitor) = default_context().await;
    let a = thing(&ctx, "a");

    let mut object = InputMap::new();
    object.insert("name".into(), "web".into());
    object.insert(
        "port".into(),
        Output::from_resource(a.id(), PropertyValue::from(80_i64)).into(),
    );
    object.insert(
        "tags".into(),
        InputValue::Array(vec![
            "a".into(),
            InputValue::future(async { InputValue::from("b") }),
        ]),
    );

    let lifted = lift(InputValue::Object(object));
    assert_eq!(
        with_timeout(lifted.all_dependencies()).await,
        ResourceSet::from([a.id()])
    );

    let mut expected = PropertyMap::new();
    expected.insert("name".into(), "web".into());
    expected.insert("port".into(), 80_i64.into());
    expected.insert(
        "tags".into(),
        PropertyValue::Array(vec!["a".into(), "b".into()]),
    );

    let observed = with_timeout(observe(&lifted)).await;
    assert!(observed.known);
    assert_eq!(observed.value, Some(PropertyValue::Object(expected)));
}

#[tokio::test]
async fn lift_is_unknown_when_anything_inside_is() {
    init_tracing();

    let nested = InputValue::Array(vec![
        "known".into(),
        InputValue::Output(Output::unknown()),
    ]);
    let observed = with_timeout(observe(&lift(nested))).await;
    assert!(!observed.known);

    let plain = InputValue::Value(PropertyValue::Array(vec![PropertyValue::Unknown]));
    let observed = with_timeout(observe(&lift(plain))).await;
    assert!(!observed.known);
}

#[tokio::test]
async fn zip_and_all_map_combine_flags() {
    init_tracing();

    let zipped = Output::known(1_i64).zip(&Output::known("one".to_string()).secret());
    let observed = with_timeout(observe(&zipped)).await;
    assert_eq!(observed.value, Some((1, "one".to_string())));
    assert!(observed.secret);

    let mut map = BTreeMap::new();
    map.insert("a".to_string(), Output::known(1_i64));
    map.insert("b".to_string(), Output::known(2_i64));
    let observed = with_timeout(observe(&Output::all_map(map))).await;
    let value = observed.value.expect("known map");
    assert_eq!(value.get("a"), Some(&1));
    assert_eq!(value.get("b"), Some(&2));
    assert!(!observed.secret);
}

#[tokio::test]
async fn unsecret_clears_the_flag_only() {
    init_tracing();

    let out = Output::known("s3cr3t".to_string()).secret().unsecret();
    let observed = with_timeout(observe(&out)).await;
    assert_eq!(observed.value, Some("s3cr3t".to_string()));
    assert!(!observed.secret);
}
