// tests/resource_options.rs

mod common;

use std::collections::BTreeMap;

use serde_json::json;
use stackflow::errors::RuntimeError;
use stackflow::props::wire::{OUTPUT_VALUE_SIG, SIG_KEY};
use stackflow::resource::{
    Alias, CustomTimeouts, ResourceOptions, ResourceSet, Transformation, TransformationResult,
};
use stackflow::{InputMap, InputValue, Output};
use stackflow_test_utils::mock_monitor::MockMonitor;

use crate::common::{context_for, default_context, init_tracing, inputs, observe, test_run_info, with_timeout};

const THING: &str = "test:index:Thing";

fn urn_of(qualified_type: &str, name: &str) -> String {
    format!("urn:pulumi:dev::proj::{qualified_type}::{name}")
}

#[tokio::test]
async fn data_flow_and_explicit_dependencies_reach_the_request() {
    init_tracing();
    let (ctx, monitor) = default_context().await;

    let a = ctx
        .register_custom(THING, "a", inputs([("name", "alpha")]), ResourceOptions::new())
        .expect("a");
    let c = ctx
        .register_custom(THING, "c", InputMap::new(), ResourceOptions::new())
        .expect("c");
    let b = ctx
        .register_custom(
            THING,
            "b",
            inputs([("source", a.output("name"))]),
            ResourceOptions::new().depends_on(&c.resource),
        )
        .expect("b");

    let source = with_timeout(observe(&b.output("source"))).await;
    assert_eq!(source.value, Some("alpha".into()));

    let summary = with_timeout(ctx.shutdown()).await.expect("shutdown");
    assert!(summary.is_success(), "{summary:?}");

    let request = monitor.registration("b").expect("b registered");
    assert_eq!(request.dependencies, vec![urn_of(THING, "a"), urn_of(THING, "c")]);
    assert_eq!(
        request.property_dependencies.get("source"),
        Some(&vec![urn_of(THING, "a")])
    );
    assert_eq!(request.object.get("source"), Some(&json!("alpha")));
}

#[tokio::test]
async fn depending_on_a_component_waits_for_its_children() {
    init_tracing();
    let (ctx, monitor) = default_context().await;

    let group = with_timeout(ctx.build_component(
        "test:index:Group",
        "group",
        ResourceOptions::new(),
        |ctx, group| async move {
            ctx.register_custom(THING, "member", InputMap::new(), ResourceOptions::new().parent(&group))?;
            anyhow::Ok(())
        },
    ))
    .await
    .expect("component");

    ctx.register_custom(
        THING,
        "consumer",
        InputMap::new(),
        ResourceOptions::new().depends_on(&group),
    )
    .expect("consumer");

    let summary = with_timeout(ctx.shutdown()).await.expect("shutdown");
    assert!(summary.is_success(), "{summary:?}");

    let member = monitor.registration("member").expect("member registered");
    assert_eq!(member.parent, urn_of("test:index:Group", "group"));

    let consumer = monitor.registration("consumer").expect("consumer registered");
    assert_eq!(
        consumer.dependencies,
        vec![urn_of("test:index:Group$test:index:Thing", "member")]
    );
    assert_eq!(ctx.children_of(&group).len(), 1);
}

#[tokio::test]
async fn component_outputs_are_reported_once_inputs_settle() {
    init_tracing();
    let (ctx, monitor) = default_context().await;

    let group = ctx
        .register_component("test:index:Group", "group", ResourceOptions::new())
        .expect("component");
    let member = ctx
        .register_custom(THING, "member", inputs([("port", 8080_i64)]), ResourceOptions::new().parent(&group))
        .expect("member");
    ctx.register_outputs(&group, inputs([("port", member.output("port"))]))
        .expect("register outputs");

    let summary = with_timeout(ctx.shutdown()).await.expect("shutdown");
    assert!(summary.is_success(), "{summary:?}");

    let reported = monitor.registered_outputs();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].urn, urn_of("test:index:Group", "group"));
    assert_eq!(reported[0].outputs.get("port"), Some(&json!(8080.0)));
}

#[tokio::test]
async fn providers_are_referenced_by_urn_and_id() {
    init_tracing();
    let (ctx, monitor) = default_context().await;

    let provider = ctx
        .register_provider("aws", "east", inputs([("region", "us-east-1")]), ResourceOptions::new())
        .expect("provider");
    ctx.register_custom(
        "aws:s3:Bucket",
        "explicit",
        InputMap::new(),
        ResourceOptions::new().provider(&provider.resource),
    )
    .expect("explicit");

    let group = ctx
        .register_component(
            "test:index:Group",
            "group",
            ResourceOptions::new().with_provider_for_children(&provider.resource),
        )
        .expect("group");
    ctx.register_custom(
        "aws:s3:Bucket",
        "inherited",
        InputMap::new(),
        ResourceOptions::new().parent(&group),
    )
    .expect("inherited");
    ctx.register_custom(
        "gcp:storage:Bucket",
        "other-package",
        InputMap::new(),
        ResourceOptions::new().parent(&group),
    )
    .expect("other package");
    ctx.complete_component(&group);

    let summary = with_timeout(ctx.shutdown()).await.expect("shutdown");
    assert!(summary.is_success(), "{summary:?}");

    let reference = format!("{}::east-id", urn_of("pulumi:providers:aws", "east"));
    assert_eq!(monitor.registration("east").expect("east").provider, "");
    assert_eq!(monitor.registration("explicit").expect("explicit").provider, reference);
    assert_eq!(monitor.registration("inherited").expect("inherited").provider, reference);
    assert_eq!(monitor.registration("other-package").expect("other").provider, "");
}

#[tokio::test]
async fn aliases_collapse_to_urns() {
    init_tracing();
    let (ctx, monitor) = default_context().await;

    let group = ctx
        .register_component("test:index:Group", "group", ResourceOptions::new())
        .expect("group");
    ctx.register_custom(
        THING,
        "renamed",
        InputMap::new(),
        ResourceOptions::new()
            .parent(&group)
            .alias(Alias::name("old"))
            .alias(Alias::name("older").without_parent())
            .alias(Alias::urn("urn:pulumi:dev::proj::test:index:Legacy::legacy")),
    )
    .expect("renamed");
    ctx.complete_component(&group);

    let summary = with_timeout(ctx.shutdown()).await.expect("shutdown");
    assert!(summary.is_success(), "{summary:?}");

    let request = monitor.registration("renamed").expect("renamed");
    assert_eq!(
        request.aliases,
        vec![
            urn_of("test:index:Group$test:index:Thing", "old"),
            urn_of(THING, "older"),
            "urn:pulumi:dev::proj::test:index:Legacy::legacy".to_string(),
        ]
    );
}

#[tokio::test]
async fn plain_options_are_forwarded() {
    init_tracing();
    let (ctx, monitor) = default_context().await;

    let keeper = ctx
        .register_custom(THING, "keeper", InputMap::new(), ResourceOptions::new())
        .expect("keeper");
    ctx.register_custom(
        THING,
        "configured",
        InputMap::new(),
        ResourceOptions::new()
            .protect(true)
            .delete_before_replace(true)
            .retain_on_delete(true)
            .ignore_changes(["tags"])
            .replace_on_changes(["size"])
            .additional_secret_outputs(["password"])
            .import("existing-id")
            .version("1.2.3")
            .deleted_with(&keeper.resource)
            .custom_timeouts(CustomTimeouts {
                create: "5m".to_string(),
                ..Default::default()
            }),
    )
    .expect("configured");

    let summary = with_timeout(ctx.shutdown()).await.expect("shutdown");
    assert!(summary.is_success(), "{summary:?}");

    let request = monitor.registration("configured").expect("configured");
    assert!(request.protect);
    assert!(request.delete_before_replace);
    assert!(request.retain_on_delete);
    assert_eq!(request.ignore_changes, vec!["tags".to_string()]);
    assert_eq!(request.replace_on_changes, vec!["size".to_string()]);
    assert_eq!(request.additional_secret_outputs, vec!["password".to_string()]);
    assert_eq!(request.import_id, "existing-id");
    assert_eq!(request.version, "1.2.3");
    assert_eq!(request.deleted_with, urn_of(THING, "keeper"));
    assert_eq!(
        request.custom_timeouts.map(|t| t.create),
        Some("5m".to_string())
    );
}

#[tokio::test]
async fn wire_encoding_degrades_for_older_engines() {
    init_tracing();
    let monitor = MockMonitor::new().with_features(&[]);
    let ctx = context_for(test_run_info(), &monitor).await;
    assert!(!ctx.features().secrets);

    let target = ctx
        .register_custom(THING, "target", InputMap::new(), ResourceOptions::new())
        .expect("target");
    ctx.register_custom(
        THING,
        "user",
        inputs([
            ("password", InputValue::from(Output::known("pw".to_string()).secret())),
            ("target", InputValue::from(&target.resource)),
        ]),
        ResourceOptions::new(),
    )
    .expect("user");

    let summary = with_timeout(ctx.shutdown()).await.expect("shutdown");
    assert!(summary.is_success(), "{summary:?}");

    let request = monitor.registration("user").expect("user");
    assert!(!request.accept_resources);
    assert_eq!(request.object.get("password"), Some(&json!("pw")));
    assert_eq!(request.object.get("target"), Some(&json!("target-id")));
}

#[tokio::test]
async fn remote_components_receive_output_values() {
    init_tracing();
    let (ctx, monitor) = default_context().await;

    let source = ctx
        .register_custom(THING, "source", inputs([("name", "alpha")]), ResourceOptions::new())
        .expect("source");
    let remote = ctx
        .register_remote_component(
            "pkg:index:Remote",
            "remote",
            inputs([("name", source.output("name"))]),
            ResourceOptions::new(),
        )
        .expect("remote");
    assert!(remote.id().is_none());

    let summary = with_timeout(ctx.shutdown()).await.expect("shutdown");
    assert!(summary.is_success(), "{summary:?}");

    let request = monitor.registration("remote").expect("remote");
    assert!(request.remote);
    assert!(!request.custom);
    assert_eq!(
        request.object.get("name"),
        Some(&json!({ SIG_KEY: OUTPUT_VALUE_SIG, "value": "alpha" }))
    );
}

#[tokio::test]
async fn engine_reported_dependencies_become_stubs() {
    init_tracing();
    let external = "urn:pulumi:dev::proj::test:index:External::ext".to_string();
    let mut reported = BTreeMap::new();
    reported.insert("name".to_string(), vec![external.clone()]);
    let monitor = MockMonitor::new().with_property_dependencies("thing", reported);
    let ctx = context_for(test_run_info(), &monitor).await;

    let thing = ctx
        .register_custom(THING, "thing", inputs([("name", "n")]), ResourceOptions::new())
        .expect("thing");

    let deps = with_timeout(thing.output("name").all_dependencies()).await;
    let stub = ctx.dependency_stub(&external);
    assert_eq!(deps, ResourceSet::from([thing.resource.id(), stub.id()]));
    assert_eq!(stub.name(), "ext");
    assert_eq!(stub.resource_type(), "test:index:External");
    assert_eq!(
        with_timeout(observe(&stub.urn())).await.value.as_deref(),
        Some(external.as_str())
    );
}

fn resize_to(size: i64) -> Transformation {
    Transformation::new(move |args| {
        let mut props = args.props.clone();
        props.insert("size".to_string(), size.into());
        Some(TransformationResult { props, opts: args.opts.clone() })
    })
}

#[tokio::test]
async fn transformations_rewrite_inputs_before_transfer() {
    init_tracing();
    let (ctx, monitor) = default_context().await;

    let thing = ctx
        .register_custom(
            THING,
            "thing",
            inputs([("size", InputValue::from(1_i64)), ("name", InputValue::from("n"))]),
            ResourceOptions::new().transformation(resize_to(10)),
        )
        .expect("thing");

    let size = with_timeout(observe(&thing.output("size"))).await;
    assert_eq!(size.value, Some(10.0.into()));

    let summary = with_timeout(ctx.shutdown()).await.expect("shutdown");
    assert!(summary.is_success(), "{summary:?}");

    let request = monitor.registration("thing").expect("thing registered");
    assert_eq!(request.object.get("size"), Some(&json!(10.0)));
    assert_eq!(request.object.get("name"), Some(&json!("n")));
}

#[tokio::test]
async fn children_inherit_their_parents_transformations() {
    init_tracing();
    let (ctx, monitor) = default_context().await;

    let group = ctx
        .register_component(
            "test:index:Group",
            "group",
            ResourceOptions::new().transformation(resize_to(3)),
        )
        .expect("component");
    ctx.register_custom(THING, "member", inputs([("size", 1_i64)]), ResourceOptions::new().parent(&group))
        .expect("member");
    ctx.register_custom(THING, "outsider", inputs([("size", 1_i64)]), ResourceOptions::new())
        .expect("outsider");

    let summary = with_timeout(ctx.shutdown()).await.expect("shutdown");
    assert!(summary.is_success(), "{summary:?}");

    let member = monitor.registration("member").expect("member registered");
    assert_eq!(member.object.get("size"), Some(&json!(3.0)));
    let outsider = monitor.registration("outsider").expect("outsider registered");
    assert_eq!(outsider.object.get("size"), Some(&json!(1.0)));
}

#[tokio::test]
async fn stack_transformations_can_add_dependencies() {
    init_tracing();
    let (ctx, monitor) = default_context().await;

    let summary = with_timeout(ctx.run(|ctx| async move {
        let base = ctx.register_custom(THING, "base", InputMap::new(), ResourceOptions::new())?;
        let anchor = base.resource.clone();
        ctx.register_stack_transformation(Transformation::new(move |args| {
            if args.name != "dependent" {
                return None;
            }
            Some(TransformationResult {
                props: args.props.clone(),
                opts: args.opts.clone().depends_on(&anchor),
            })
        }))?;
        ctx.register_custom(THING, "dependent", InputMap::new(), ResourceOptions::new())?;
        ctx.register_custom(THING, "bystander", InputMap::new(), ResourceOptions::new())?;
        anyhow::Ok(())
    }))
    .await
    .expect("run");
    assert!(summary.is_success(), "{summary:?}");

    let dependent = monitor.registration("dependent").expect("dependent registered");
    assert!(
        dependent.dependencies.contains(&urn_of(THING, "base")),
        "{:?}",
        dependent.dependencies
    );
    let bystander = monitor.registration("bystander").expect("bystander registered");
    assert!(
        !bystander.dependencies.contains(&urn_of(THING, "base")),
        "{:?}",
        bystander.dependencies
    );
}

#[tokio::test]
async fn transformations_cannot_reparent() {
    init_tracing();
    let (ctx, _monitor) = default_context().await;

    let other = ctx
        .register_component("test:index:Group", "other", ResourceOptions::new())
        .expect("component");
    let adopt = Transformation::new(move |args| {
        Some(TransformationResult {
            props: args.props.clone(),
            opts: args.opts.clone().parent(&other),
        })
    });

    match ctx.register_custom(THING, "thing", InputMap::new(), ResourceOptions::new().transformation(adopt)) {
        Err(RuntimeError::InvalidArgument(msg)) => {
            assert!(msg.contains("parent"), "unexpected: {msg}")
        }
        Err(e) => panic!("Expected InvalidArgument, got {e:?}"),
        Ok(_) => panic!("Expected the reparenting transformation to be rejected"),
    }
}

#[tokio::test]
async fn stack_transformations_need_a_running_program() {
    init_tracing();
    let (ctx, _monitor) = default_context().await;

    match ctx.register_stack_transformation(resize_to(1)) {
        Err(RuntimeError::ProtocolViolation(_)) => {}
        other => panic!("Expected ProtocolViolation, got {other:?}"),
    }
}
