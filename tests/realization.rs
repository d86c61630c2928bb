//! End-to-end realization tests against the simulated provider

use rungate::config::Settings;
use rungate::graph::{GraphError, Inputs, ResourceGraph};
use rungate::policy::{AccessPolicy, IAP_ACCESSOR_ROLE};
use rungate::realize::{Coordinator, NodeState, SimulatedProvider};
use rungate::stack::{declare, names, SERVICE_URL_EXPORT};
use std::time::Duration;
use tokio::sync::watch;

fn provider(settings: &Settings) -> SimulatedProvider {
    SimulatedProvider::new(&settings.project_id, &settings.region)
}

fn position(order: &[String], name: &str) -> usize {
    order
        .iter()
        .position(|n| n == name)
        .unwrap_or_else(|| panic!("{name} was not realized"))
}

#[tokio::test]
async fn test_full_stack_realizes_in_dependency_order() {
    let settings = Settings::default();
    let stack = declare(&settings).unwrap();
    let provider = provider(&settings);

    let report = Coordinator::new().run(&stack.graph, &provider).await.unwrap();

    assert!(report.is_success(), "{}", report.summary());
    assert_eq!(report.realization_order.len(), 12);
    for edge in stack.graph.edges() {
        let consumer = stack.graph.node(edge.consumer).unwrap().name();
        let producer = stack.graph.node(edge.producer).unwrap().name();
        assert!(
            position(&report.realization_order, producer) < position(&report.realization_order, consumer),
            "{producer} must realize before {consumer}"
        );
    }
}

#[tokio::test]
async fn test_service_url_resolves_after_apply() {
    let settings = Settings::default();
    let stack = declare(&settings).unwrap();
    assert!(matches!(
        stack.graph.exported(SERVICE_URL_EXPORT),
        Err(GraphError::NotYetResolved(_))
    ));

    let report = Coordinator::new()
        .run(&stack.graph, &provider(&settings))
        .await
        .unwrap();

    let url = stack.graph.exported(SERVICE_URL_EXPORT).unwrap();
    assert!(url.as_str().unwrap().starts_with("https://cloud-run-service-"));
    assert_eq!(report.exports[SERVICE_URL_EXPORT], url);
}

#[tokio::test]
async fn test_iap_policy_receives_composed_document() {
    let settings = Settings {
        member: "group:ops@example.com".into(),
        ..Settings::default()
    };
    let stack = declare(&settings).unwrap();
    let report = Coordinator::new()
        .run(&stack.graph, &provider(&settings))
        .await
        .unwrap();

    let outputs = report.node(names::IAP_POLICY).unwrap().outputs.clone().unwrap();
    let body = outputs["policyData"].as_str().unwrap();
    let policy: AccessPolicy = serde_json::from_str(body).unwrap();
    assert_eq!(policy.bindings[0].members, vec!["group:ops@example.com"]);
    assert_eq!(policy.bindings[0].role, IAP_ACCESSOR_ROLE);
}

#[tokio::test]
async fn test_backend_failure_skips_load_balancing_chain() {
    let mut graph = ResourceGraph::new();
    let hc = graph.add_node("health-check", "health-check", Inputs::new()).unwrap();
    let link = graph.output(&hc, "selfLink").unwrap();
    let backend = graph
        .add_node("backend-service", "backend-service", Inputs::new().with("healthChecks", link))
        .unwrap();
    let link = graph.output(&backend, "selfLink").unwrap();
    let map = graph
        .add_node("url-map", "url-map", Inputs::new().with("defaultService", link))
        .unwrap();
    let link = graph.output(&map, "selfLink").unwrap();
    let proxy = graph
        .add_node("http-proxy", "target-http-proxy", Inputs::new().with("urlMap", link))
        .unwrap();
    let link = graph.output(&proxy, "selfLink").unwrap();
    graph
        .add_node("forwarding-rule", "forwarding-rule", Inputs::new().with("target", link))
        .unwrap();

    let provider = SimulatedProvider::new("p", "us-central1").with_failures(["backend-service"]);
    let report = Coordinator::new().run(&graph, &provider).await.unwrap();

    assert_eq!(report.state("health-check"), Some(&NodeState::Realized));
    assert!(matches!(report.state("backend-service"), Some(NodeState::Failed { .. })));
    for name in ["url-map", "target-http-proxy", "forwarding-rule"] {
        assert_eq!(
            report.state(name),
            Some(&NodeState::SkippedDueToDependencyFailure {
                failed_dependency: "backend-service".into()
            }),
            "{name}"
        );
    }
    assert_eq!(provider.calls(), vec!["health-check", "backend-service"]);
    assert!(!report.is_success());
}

#[tokio::test]
async fn test_independent_failure_does_not_block_siblings() {
    let settings = Settings::default();
    let stack = declare(&settings).unwrap();
    let provider = provider(&settings).with_failures([names::RANDOM_SUFFIX]);

    let report = Coordinator::new().run(&stack.graph, &provider).await.unwrap();

    assert_eq!(report.count("failed"), 1);
    assert_eq!(report.count("skipped"), 0);
    assert_eq!(report.count("realized"), 11);
}

#[tokio::test]
async fn test_cycle_rejected_before_any_provider_call() {
    let mut graph = ResourceGraph::new();
    let a = graph.declare("url-map", "a").unwrap();
    let b = graph.declare("http-proxy", "b").unwrap();
    let b_link = graph.output(&b, "selfLink").unwrap();
    graph.define(&a, Inputs::new().with("x", b_link)).unwrap();
    let a_link = graph.output(&a, "selfLink").unwrap();
    assert!(matches!(
        graph.define(&b, Inputs::new().with("y", a_link)),
        Err(GraphError::CyclicDependency { .. })
    ));

    let provider = SimulatedProvider::new("p", "r");
    assert!(Coordinator::new().run(&graph, &provider).await.is_err());
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_cancellation_leaves_remaining_nodes_pending() {
    let settings = Settings::default();
    let stack = declare(&settings).unwrap();
    let provider = provider(&settings).with_latency(Duration::from_millis(50));
    let (tx, rx) = watch::channel(false);

    let coordinator = Coordinator::new().with_max_parallel(1).with_cancellation(rx);
    let run = coordinator.run(&stack.graph, &provider);
    let cancel = async {
        tokio::time::sleep(Duration::from_millis(75)).await;
        tx.send(true).unwrap();
    };
    let (report, ()) = tokio::join!(run, cancel);
    let report = report.unwrap();

    assert!(report.cancelled);
    assert!(report.count("pending") > 0);
    assert!(report.count("realized") < 12);
    // Every realized node had its outputs recorded
    for name in &report.realization_order {
        assert!(stack.graph.get(name).is_some());
        assert!(report.node(name).unwrap().outputs.is_some());
    }
}

#[tokio::test]
async fn test_duplicate_name_rejected() {
    let mut graph = ResourceGraph::new();
    graph.add_node("network", "x", Inputs::new()).unwrap();
    assert_eq!(
        graph.add_node("global-address", "x", Inputs::new()).unwrap_err(),
        GraphError::DuplicateName("x".into())
    );
    assert_eq!(graph.len(), 1);
}

#[tokio::test]
async fn test_policy_composition_failure_is_isolated() {
    let settings = Settings {
        member: "robot:x".into(),
        ..Settings::default()
    };
    let stack = declare(&settings).unwrap();
    let provider = provider(&settings);

    let report = Coordinator::new().run(&stack.graph, &provider).await.unwrap();

    assert_eq!(report.summary(), "11 realized, 1 failed, 0 skipped, 0 pending");
    assert!(matches!(
        report.state(names::IAP_POLICY),
        Some(NodeState::Failed { reason }) if reason.contains("unknown member type")
    ));
    assert!(!provider.calls().iter().any(|n| n == names::IAP_POLICY));
    assert!(stack.graph.exported(SERVICE_URL_EXPORT).is_ok());
}
