//! Realization
//!
//! Drives a validated graph through a [`Provider`], node by node, in
//! dependency order. Real provisioning is the job of an external engine;
//! this module only fixes the contract: producers before consumers, failures
//! isolated per node, and dependents of a failed node skipped.
//!
//! # Module Structure
//!
//! - [`coordinator`] - Level-by-level scheduling with bounded parallelism
//! - [`report`] - Per-node states and the aggregated run report
//! - [`simulated`] - Deterministic in-process provider

pub mod coordinator;
pub mod report;
pub mod simulated;

pub use coordinator::Coordinator;
pub use report::{NodeReport, NodeState, RunReport};
pub use simulated::SimulatedProvider;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// A node with all inputs resolved, ready to hand to a provider
#[derive(Debug, Clone, Serialize)]
pub struct RealizeRequest {
    pub kind: String,
    pub name: String,
    pub inputs: Value,
}

/// Something that can turn a resolved node into a remote resource and
/// report its outputs
#[async_trait]
pub trait Provider: Send + Sync {
    async fn realize(&self, request: &RealizeRequest) -> Result<Value>;
}
