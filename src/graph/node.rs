//! Resource nodes and the edges between them

use super::input::Inputs;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;
use uuid::Uuid;

/// Index of a node in its graph's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle to a declared node, returned by the graph builder
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    pub(crate) graph: Uuid,
    pub(crate) id: NodeId,
    name: String,
    kind: String,
}

impl NodeRef {
    pub(crate) fn new(graph: Uuid, id: NodeId, name: &str, kind: &str) -> Self {
        Self {
            graph,
            id,
            name: name.to_string(),
            kind: kind.to_string(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}

/// Dependency edge: `consumer` reads an output of `producer`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub consumer: NodeId,
    pub producer: NodeId,
}

/// One declared infrastructure object
#[derive(Debug)]
pub struct ResourceNode {
    pub(crate) id: NodeId,
    pub(crate) kind: String,
    pub(crate) name: String,
    /// `None` until the node is defined
    pub(crate) inputs: Option<Inputs>,
    pub(crate) dependencies: BTreeSet<NodeId>,
    /// Realized outputs, written once
    pub(crate) outputs: OnceLock<Value>,
}

impl ResourceNode {
    pub(crate) fn declared(id: NodeId, kind: &str, name: &str) -> Self {
        Self {
            id,
            kind: kind.to_string(),
            name: name.to_string(),
            inputs: None,
            dependencies: BTreeSet::new(),
            outputs: OnceLock::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> Option<&Inputs> {
        self.inputs.as_ref()
    }

    pub fn is_defined(&self) -> bool {
        self.inputs.is_some()
    }

    pub fn dependencies(&self) -> &BTreeSet<NodeId> {
        &self.dependencies
    }

    /// Realized outputs, once the node has been resolved
    pub fn outputs(&self) -> Option<&Value> {
        self.outputs.get()
    }
}
