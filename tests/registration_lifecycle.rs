// tests/registration_lifecycle.rs

mod common;

use std::sync::{Arc, Mutex};

use serde_json::json;
use stackflow::errors::RuntimeError;
use stackflow::props::wire::UNKNOWN_VALUE;
use stackflow::resource::{RegistrationState, ResourceKind, ResourceOptions, ResourceSet};
use stackflow::{InputMap, InputValue, Output, PropertyValue, RegisteredResource};
use stackflow_test_utils::mock_monitor::MockMonitor;

use crate::common::{context_for, default_context, init_tracing, inputs, observe, test_run_info, with_timeout};

#[tokio::test]
async fn registration_settles_urn_id_and_outputs() {
    init_tracing();
    let monitor = MockMonitor::new().with_outputs("bucket", json!({ "arn": "arn:aws:s3:::bucket" }));
    let ctx = context_for(test_run_info(), &monitor).await;

    let bucket = ctx
        .register_custom(
            "aws:s3:Bucket",
            "bucket",
            inputs([("acl", InputValue::from("private")), ("arn", InputValue::undefined())]),
            ResourceOptions::new(),
        )
        .expect("register");

    let urn = with_timeout(observe(&bucket.urn())).await;
    assert_eq!(urn.value.as_deref(), Some("urn:pulumi:dev::proj::aws:s3:Bucket::bucket"));

    let id = with_timeout(observe(&bucket.id().expect("custom resources have ids"))).await;
    assert_eq!(id.value.as_deref(), Some("bucket-id"));

    let acl = with_timeout(observe(&bucket.output("acl"))).await;
    assert_eq!(acl.value, Some("private".into()));
    assert!(acl.known);

    let arn = with_timeout(observe(&bucket.output("arn"))).await;
    assert_eq!(arn.value, Some("arn:aws:s3:::bucket".into()));

    // Properties never declared have no cell.
    assert!(!with_timeout(observe(&bucket.output("region"))).await.known);

    let summary = with_timeout(ctx.shutdown()).await.expect("shutdown");
    assert!(summary.is_success(), "{summary:?}");
    assert_eq!(summary.resolved, 1);
    assert_eq!(
        ctx.resource_state(&bucket.resource),
        Some(RegistrationState::Resolved)
    );
}

#[tokio::test]
async fn outputs_depend_on_their_resource() {
    init_tracing();
    let (ctx, _monitor) = default_context().await;

    let thing = ctx
        .register_custom("test:index:Thing", "thing", inputs([("size", 3_i64)]), ResourceOptions::new())
        .expect("register");

    let expected = ResourceSet::from([thing.resource.id()]);
    assert_eq!(thing.output("size").dependencies(), expected);
    assert_eq!(thing.urn().dependencies(), expected);
    assert_eq!(
        with_timeout(observe(&thing.output("size"))).await.value,
        Some(PropertyValue::Number(3.0))
    );
}

#[tokio::test]
async fn engine_failure_settles_every_cell_unknown() {
    init_tracing();
    let monitor = MockMonitor::new().fail_on("broken");
    let ctx = context_for(test_run_info(), &monitor).await;

    let slot: Arc<Mutex<Option<RegisteredResource>>> = Arc::new(Mutex::new(None));
    let inner = Arc::clone(&slot);
    let result = with_timeout(ctx.run(move |ctx| async move {
        let broken = ctx.register_custom(
            "test:index:Thing",
            "broken",
            inputs([("size", 3_i64)]),
            ResourceOptions::new(),
        )?;
        ctx.register_custom(
            "test:index:Thing",
            "dependent",
            inputs([("size", broken.output("size"))]),
            ResourceOptions::new(),
        )?;
        *inner.lock().unwrap() = Some(broken);
        anyhow::Ok(())
    }))
    .await;

    match result {
        Err(RuntimeError::RemoteRegistration { name, message, .. }) => {
            assert_eq!(name, "broken");
            assert!(message.contains("mock engine rejected"), "unexpected: {message}");
        }
        Err(e) => panic!("Expected RemoteRegistration error, got {e:?}"),
        Ok(summary) => panic!("Expected the run to fail, got {summary:?}"),
    }

    let broken = slot.lock().unwrap().clone().expect("program ran");
    assert!(!with_timeout(observe(&broken.urn())).await.known);
    assert!(!with_timeout(observe(&broken.id().expect("id"))).await.known);
    assert!(!with_timeout(observe(&broken.output("size"))).await.known);
    assert_eq!(
        ctx.resource_state(&broken.resource),
        Some(RegistrationState::Failed)
    );

    // The dependent still registered, with the failed value unknown.
    let dependent = monitor.registration("dependent").expect("dependent registered");
    assert_eq!(dependent.object.get("size"), Some(&json!(UNKNOWN_VALUE)));
}

#[tokio::test]
async fn registering_twice_is_a_protocol_violation() {
    init_tracing();
    let (ctx, monitor) = default_context().await;

    let resource = ctx
        .allocate(ResourceKind::Custom, "test:index:Thing", "twice", &ResourceOptions::new())
        .expect("allocate");
    assert_eq!(ctx.resource_state(&resource), Some(RegistrationState::Initialized));

    ctx.register(&resource, InputMap::new(), ResourceOptions::new())
        .expect("first registration");
    match ctx.register(&resource, InputMap::new(), ResourceOptions::new()) {
        Err(RuntimeError::ProtocolViolation(msg)) => {
            assert!(msg.contains("already been registered"), "unexpected: {msg}")
        }
        Err(e) => panic!("Expected ProtocolViolation, got {e:?}"),
        Ok(_) => panic!("Expected the second registration to fail"),
    }

    let summary = with_timeout(ctx.shutdown()).await.expect("shutdown");
    assert!(summary.is_success(), "{summary:?}");
    assert_eq!(monitor.registered_names(), vec!["twice".to_string()]);
}

#[tokio::test]
async fn construction_arguments_are_validated() {
    init_tracing();
    let (ctx, _monitor) = default_context().await;
    let opts = ResourceOptions::new();

    match ctx.allocate(ResourceKind::Custom, "", "name", &opts) {
        Err(RuntimeError::ProtocolViolation(msg)) => assert!(msg.contains("type")),
        other => panic!("Expected ProtocolViolation, got {other:?}"),
    }
    match ctx.allocate(ResourceKind::Custom, "test:index:Thing", "", &opts) {
        Err(RuntimeError::ProtocolViolation(msg)) => assert!(msg.contains("name")),
        other => panic!("Expected ProtocolViolation, got {other:?}"),
    }
    let provider = ResourceKind::Provider {
        package: "aws".to_string(),
    };
    match ctx.allocate(provider, "aws:index:Provider", "p", &opts) {
        Err(RuntimeError::InvalidArgument(msg)) => assert!(msg.contains("pulumi:providers:")),
        other => panic!("Expected InvalidArgument, got {other:?}"),
    }

    let component = ctx
        .register_component("test:index:Group", "group", ResourceOptions::new())
        .expect("component");
    assert!(component.physical_id().is_none());

    // Only custom resources can be read by id.
    let group = ctx
        .allocate(
            ResourceKind::Component { remote: false },
            "test:index:Group",
            "not-readable",
            &opts,
        )
        .expect("allocate");
    match ctx.register(&group, InputMap::new(), ResourceOptions::new().id("x".to_string())) {
        Err(RuntimeError::InvalidArgument(_)) => {}
        other => panic!("Expected InvalidArgument, got {other:?}"),
    }
}

#[tokio::test]
async fn preview_leaves_provider_assigned_values_unknown() {
    init_tracing();
    let monitor = MockMonitor::new()
        .preview()
        .with_outputs("server", json!({ "ip": "10.0.0.1" }));
    let ctx = context_for(test_run_info().with_dry_run(true), &monitor).await;

    let server = ctx
        .register_custom(
            "test:index:Server",
            "server",
            inputs([
                ("name", InputValue::from("web")),
                ("ip", InputValue::undefined()),
                ("later", InputValue::Output(Output::unknown())),
            ]),
            ResourceOptions::new(),
        )
        .expect("register");

    assert!(with_timeout(observe(&server.urn())).await.known);
    assert!(!with_timeout(observe(&server.id().expect("id"))).await.known);

    let name = with_timeout(observe(&server.output("name"))).await;
    assert_eq!(name.value, Some("web".into()));
    assert!(!with_timeout(observe(&server.output("ip"))).await.known);
    assert!(!with_timeout(observe(&server.output("later"))).await.known);

    let summary = with_timeout(ctx.shutdown()).await.expect("shutdown");
    assert!(summary.is_success(), "{summary:?}");
}

#[tokio::test]
async fn reading_a_resource_uses_its_physical_id() {
    init_tracing();
    let (ctx, monitor) = default_context().await;

    let existing = ctx
        .read_resource(
            "aws:s3:Bucket",
            "existing",
            "bucket-123".to_string(),
            inputs([("acl", "private")]),
            ResourceOptions::new(),
        )
        .expect("read");

    let id = with_timeout(observe(&existing.id().expect("id"))).await;
    assert_eq!(id.value.as_deref(), Some("bucket-123"));
    let acl = with_timeout(observe(&existing.output("acl"))).await;
    assert_eq!(acl.value, Some("private".into()));

    let reads = monitor.reads();
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0].id, "bucket-123");
    assert_eq!(reads[0].resource_type, "aws:s3:Bucket");
    assert!(monitor.registrations().is_empty());
}

#[tokio::test]
async fn preview_read_with_unknown_id_is_skipped() {
    init_tracing();
    let monitor = MockMonitor::new().preview();
    let ctx = context_for(test_run_info().with_dry_run(true), &monitor).await;

    let pending = ctx
        .read_resource(
            "aws:s3:Bucket",
            "pending",
            Output::<String>::unknown(),
            inputs([("acl", "private")]),
            ResourceOptions::new(),
        )
        .expect("read");

    assert!(!with_timeout(observe(&pending.urn())).await.known);
    assert!(!with_timeout(observe(&pending.output("acl"))).await.known);

    let summary = with_timeout(ctx.shutdown()).await.expect("shutdown");
    assert!(summary.is_success(), "{summary:?}");
    assert!(monitor.reads().is_empty());
}

#[tokio::test]
async fn read_with_unknown_id_fails_outside_preview() {
    init_tracing();
    let (ctx, monitor) = default_context().await;

    let missing = ctx
        .read_resource(
            "aws:s3:Bucket",
            "missing",
            Output::<String>::unknown(),
            InputMap::new(),
            ResourceOptions::new(),
        )
        .expect("read");
    assert!(!with_timeout(observe(&missing.urn())).await.known);

    let summary = with_timeout(ctx.shutdown()).await.expect("shutdown");
    assert_eq!(summary.failed, 1);
    match summary.errors.first() {
        Some(RuntimeError::InvalidArgument(msg)) => assert!(msg.contains("missing")),
        other => panic!("Expected InvalidArgument, got {other:?}"),
    }
    assert!(monitor.reads().is_empty());
}

#[tokio::test]
async fn registration_after_shutdown_is_rejected() {
    init_tracing();
    let (ctx, _monitor) = default_context().await;

    let summary = with_timeout(ctx.shutdown()).await.expect("shutdown");
    assert!(summary.is_success());

    let resource = ctx
        .allocate(ResourceKind::Custom, "test:index:Thing", "late", &ResourceOptions::new())
        .expect("allocate");
    match ctx.register(&resource, InputMap::new(), ResourceOptions::new()) {
        Err(RuntimeError::ProtocolViolation(msg)) => {
            assert!(msg.contains("after program completion"), "unexpected: {msg}")
        }
        Err(e) => panic!("Expected ProtocolViolation, got {e:?}"),
        Ok(_) => panic!("Expected registration to be rejected"),
    }
    // The handle's cells do not stay pending.
    assert!(!with_timeout(observe(&resource.urn())).await.known);
}
