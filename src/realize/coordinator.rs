//! Realization coordinator
//!
//! Walks the graph one level at a time. Nodes inside a level share no
//! edges, so their provider calls run concurrently up to `max_parallel`.
//! A level starts only after every call of the previous one has returned
//! and its outputs have been recorded in the graph.

use super::report::{NodeReport, NodeState, RunReport};
use super::{Provider, RealizeRequest};
use crate::graph::{GraphError, NodeId, ResourceGraph};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::watch;

const DEFAULT_MAX_PARALLEL: usize = 4;

/// Outcome of one provider call; `None` when cancelled before it started
type CallResult = (NodeId, Option<(Duration, anyhow::Result<Value>)>);

pub struct Coordinator {
    max_parallel: usize,
    cancel: Option<watch::Receiver<bool>>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL,
            cancel: None,
        }
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Stop launching provider calls once the channel reads `true`.
    /// Calls already in flight run to completion.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        is_set(self.cancel.as_ref())
    }

    /// Realize every node of `graph` through `provider`.
    ///
    /// Construction errors (cycles, undefined nodes) are returned before any
    /// provider call. Per-node failures never abort the run: they are
    /// recorded in the report and only the failed node's dependents are
    /// skipped.
    pub async fn run<P>(&self, graph: &ResourceGraph, provider: &P) -> Result<RunReport, GraphError>
    where
        P: Provider + ?Sized,
    {
        graph.validate()?;
        let levels = graph.levels()?;
        let started_at = Utc::now();

        let mut reports: Vec<NodeReport> = graph
            .nodes()
            .iter()
            .map(|node| NodeReport {
                name: node.name().to_string(),
                kind: node.kind().to_string(),
                state: NodeState::Pending,
                outputs: None,
                duration_ms: None,
            })
            .collect();
        let mut realization_order = Vec::new();
        let mut cancelled = false;

        tracing::info!(
            "realizing {} resources in {} levels (max {} in parallel)",
            graph.len(),
            levels.len(),
            self.max_parallel
        );

        for (depth, level) in levels.into_iter().enumerate() {
            if self.is_cancelled() {
                cancelled = true;
                break;
            }

            let mut runnable = Vec::new();
            for id in level {
                if let Some(state) = blocked_by(graph, &reports, id) {
                    tracing::warn!("skipping '{}': {:?}", reports[id.index()].name, state);
                    reports[id.index()].state = state;
                    continue;
                }
                match request_for(graph, id) {
                    Ok(request) => runnable.push((id, request)),
                    Err(e) => {
                        tracing::warn!("cannot resolve inputs of '{}': {}", reports[id.index()].name, e);
                        reports[id.index()].state = NodeState::Failed { reason: e.to_string() };
                    }
                }
            }

            tracing::debug!("level {}: {} provider calls", depth, runnable.len());

            let cancel = self.cancel.clone();
            let results: Vec<CallResult> = stream::iter(runnable)
                .map(|(id, request)| {
                    let cancel = cancel.clone();
                    async move {
                        if is_set(cancel.as_ref()) {
                            return (id, None);
                        }
                        let start = Instant::now();
                        let result = provider.realize(&request).await;
                        (id, Some((start.elapsed(), result)))
                    }
                })
                .buffer_unordered(self.max_parallel)
                .collect()
                .await;

            for (id, outcome) in results {
                let Some((elapsed, result)) = outcome else {
                    cancelled = true;
                    continue;
                };
                let report = &mut reports[id.index()];
                report.set_duration(elapsed);

                let recorded = result
                    .map_err(|e| format!("{e:#}"))
                    .and_then(|outputs| graph.resolve_id(id, outputs).map_err(|e| e.to_string()));

                match recorded {
                    Ok(()) => {
                        tracing::info!("realized '{}' ({})", report.name, report.duration_display());
                        report.state = NodeState::Realized;
                        report.outputs = graph.node(id).and_then(|n| n.outputs()).cloned();
                        realization_order.push(report.name.clone());
                    }
                    Err(reason) => {
                        tracing::warn!("failed to realize '{}': {}", report.name, reason);
                        report.state = NodeState::Failed { reason };
                    }
                }
            }

            if cancelled {
                break;
            }
        }

        if cancelled {
            tracing::warn!("realization cancelled; unrealized nodes left pending");
        }

        let exports = graph
            .exports()
            .keys()
            .filter_map(|name| graph.exported(name).ok().map(|v| (name.clone(), v)))
            .collect();

        Ok(RunReport {
            started_at,
            nodes: reports,
            realization_order,
            exports,
            cancelled,
        })
    }
}

fn is_set(cancel: Option<&watch::Receiver<bool>>) -> bool {
    cancel.map(|rx| *rx.borrow()).unwrap_or(false)
}

/// Skip state for a node whose dependencies did not all realize. Names the
/// node that actually failed, not an intermediate skipped one.
fn blocked_by(graph: &ResourceGraph, reports: &[NodeReport], id: NodeId) -> Option<NodeState> {
    let node = graph.node(id)?;
    let dep = node
        .dependencies()
        .iter()
        .find(|dep| reports[dep.index()].state != NodeState::Realized)?;

    let failed_dependency = match &reports[dep.index()].state {
        NodeState::SkippedDueToDependencyFailure { failed_dependency } => failed_dependency.clone(),
        _ => reports[dep.index()].name.clone(),
    };
    Some(NodeState::SkippedDueToDependencyFailure { failed_dependency })
}

fn request_for(graph: &ResourceGraph, id: NodeId) -> Result<RealizeRequest, GraphError> {
    let node = graph
        .node(id)
        .ok_or_else(|| GraphError::UnknownNode(id.to_string()))?;
    let inputs = node
        .inputs()
        .ok_or_else(|| GraphError::Undefined(node.name().to_string()))?;

    Ok(RealizeRequest {
        kind: node.kind().to_string(),
        name: node.name().to_string(),
        inputs: inputs.resolve()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Inputs;
    use anyhow::bail;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Echoes a fixed output set and records call order
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail: Vec<&'static str>,
    }

    impl Recorder {
        fn new(fail: Vec<&'static str>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl Provider for Recorder {
        async fn realize(&self, request: &RealizeRequest) -> anyhow::Result<Value> {
            self.calls.lock().unwrap().push(request.name.clone());
            if self.fail.contains(&request.name.as_str()) {
                bail!("quota exceeded");
            }
            Ok(json!({
                "id": format!("id-{}", request.name),
                "selfLink": format!("link/{}", request.name),
            }))
        }
    }

    fn chain() -> ResourceGraph {
        let mut graph = ResourceGraph::new();
        let hc = graph.add_node("health-check", "hc", Inputs::new()).unwrap();
        let link = graph.output(&hc, "selfLink").unwrap();
        let backend = graph
            .add_node("backend-service", "backend", Inputs::new().with("healthChecks", link))
            .unwrap();
        let link = graph.output(&backend, "selfLink").unwrap();
        graph
            .add_node("url-map", "map", Inputs::new().with("defaultService", link))
            .unwrap();
        graph
    }

    #[tokio::test]
    async fn test_producers_before_consumers() {
        let graph = chain();
        let provider = Recorder::new(vec![]);
        let report = Coordinator::new().run(&graph, &provider).await.unwrap();

        assert!(report.is_success());
        assert_eq!(*provider.calls.lock().unwrap(), vec!["hc", "backend", "map"]);
        assert_eq!(report.realization_order, vec!["hc", "backend", "map"]);
    }

    #[tokio::test]
    async fn test_failure_skips_dependents() {
        let graph = chain();
        let provider = Recorder::new(vec!["hc"]);
        let report = Coordinator::new().run(&graph, &provider).await.unwrap();

        assert!(matches!(report.state("hc"), Some(NodeState::Failed { reason }) if reason.contains("quota")));
        for name in ["backend", "map"] {
            assert_eq!(
                report.state(name),
                Some(&NodeState::SkippedDueToDependencyFailure {
                    failed_dependency: "hc".to_string()
                })
            );
        }
        assert_eq!(*provider.calls.lock().unwrap(), vec!["hc"]);
    }

    #[tokio::test]
    async fn test_missing_output_fails_consumer() {
        let mut graph = ResourceGraph::new();
        let hc = graph.add_node("health-check", "hc", Inputs::new()).unwrap();
        let missing = graph.output(&hc, "selfLink").unwrap();
        graph
            .add_node("backend-service", "backend", Inputs::new().with("healthChecks", missing))
            .unwrap();

        struct Bare;
        #[async_trait]
        impl Provider for Bare {
            async fn realize(&self, _request: &RealizeRequest) -> anyhow::Result<Value> {
                Ok(json!({"id": "x"}))
            }
        }

        let report = Coordinator::new().run(&graph, &Bare).await.unwrap();
        assert_eq!(report.state("hc"), Some(&NodeState::Realized));
        assert!(matches!(
            report.state("backend"),
            Some(NodeState::Failed { reason }) if reason.contains("selfLink")
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_leaves_all_pending() {
        let graph = chain();
        let provider = Recorder::new(vec![]);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let report = Coordinator::new()
            .with_cancellation(rx)
            .run(&graph, &provider)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.count("pending"), 3);
        assert!(provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_undefined_node_rejected_before_any_call() {
        let mut graph = chain();
        graph.declare("http-proxy", "proxy").unwrap();
        let provider = Recorder::new(vec![]);

        let err = Coordinator::new().run(&graph, &provider).await.unwrap_err();
        assert_eq!(err, GraphError::Undefined("proxy".to_string()));
        assert!(provider.calls.lock().unwrap().is_empty());
    }
}
