//! Resource Graph
//!
//! Arena of nodes plus an explicit edge list. Nodes are added single-writer
//! through `&mut self`; once built the graph is shared immutably and only the
//! write-once output cells change as nodes are realized.

use super::deferred::Deferred;
use super::error::GraphError;
use super::input::Inputs;
use super::node::{Edge, NodeId, NodeRef, ResourceNode};
use super::path::OutputPath;
use crate::resource::get_kind;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// Static DAG of resource declarations
pub struct ResourceGraph {
    id: Uuid,
    nodes: Vec<ResourceNode>,
    names: HashMap<String, NodeId>,
    edges: Vec<Edge>,
    /// Field deferreds waiting on each node
    slots: Mutex<HashMap<NodeId, Vec<Deferred<Value>>>>,
    exports: BTreeMap<String, Deferred<Value>>,
}

impl Default for ResourceGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            nodes: Vec::new(),
            names: HashMap::new(),
            edges: Vec::new(),
            slots: Mutex::new(HashMap::new()),
            exports: BTreeMap::new(),
        }
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Declare and define a node in one step
    pub fn add_node(&mut self, kind: &str, name: &str, inputs: Inputs) -> Result<NodeRef, GraphError> {
        let node = self.declare(kind, name)?;
        if let Err(e) = self.define(&node, inputs) {
            // Nothing can reference a node that was never handed out
            self.nodes.pop();
            self.names.remove(name);
            return Err(e);
        }
        Ok(node)
    }

    /// Reserve a name so the node's outputs can be referenced before its
    /// inputs are known
    pub fn declare(&mut self, kind: &str, name: &str) -> Result<NodeRef, GraphError> {
        if get_kind(kind).is_none() {
            return Err(GraphError::UnknownKind {
                kind: kind.to_string(),
                name: name.to_string(),
            });
        }
        if self.names.contains_key(name) {
            return Err(GraphError::DuplicateName(name.to_string()));
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(ResourceNode::declared(id, kind, name));
        self.names.insert(name.to_string(), id);
        tracing::debug!("declared {} '{}' as {}", kind, name, id);

        Ok(NodeRef::new(self.id, id, name, kind))
    }

    /// Fix a declared node's inputs. Every deferred leaf adds an edge from
    /// this node to the leaf's source; an edge that closes a cycle is
    /// rejected and the definition rolled back.
    pub fn define(&mut self, node: &NodeRef, inputs: Inputs) -> Result<(), GraphError> {
        let id = self.check_ref(node)?;
        if self.nodes[id.0].is_defined() {
            return Err(GraphError::AlreadyDefined(node.name().to_string()));
        }

        let mut producers = BTreeSet::new();
        for source in inputs.sources() {
            producers.insert(self.check_ref(&source)?);
        }

        for &producer in &producers {
            if let Some(path) = self.find_path(producer, id) {
                let cycle: Vec<String> = std::iter::once(id)
                    .chain(path)
                    .map(|n| self.nodes[n.0].name.clone())
                    .collect();
                tracing::warn!("rejected definition of '{}': cycle {:?}", node.name(), cycle);
                return Err(GraphError::CyclicDependency { cycle });
            }
        }

        for &producer in &producers {
            self.edges.push(Edge {
                consumer: id,
                producer,
            });
        }

        let slot = &mut self.nodes[id.0];
        slot.dependencies = producers;
        slot.inputs = Some(inputs);
        Ok(())
    }

    /// Expose a deferred value to the caller under a name
    pub fn export(&mut self, name: &str, value: Deferred<Value>) -> Result<(), GraphError> {
        if self.exports.contains_key(name) {
            return Err(GraphError::DuplicateName(name.to_string()));
        }
        self.exports.insert(name.to_string(), value);
        Ok(())
    }

    // =========================================================================
    // References and resolution
    // =========================================================================

    /// Deferred handle to one of `node`'s outputs, e.g. `selfLink` or
    /// `statuses[0].url`. Returns immediately whether or not the node has
    /// been realized.
    pub fn output(&self, node: &NodeRef, field: &str) -> Result<Deferred<Value>, GraphError> {
        let id = self.check_ref(node)?;
        let path = OutputPath::parse(field)?;

        if let (Some(def), Some(root)) = (get_kind(node.kind()), path.root()) {
            if !def.has_output(root) {
                tracing::warn!("{} does not document output '{}'", node.kind(), root);
            }
        }

        let deferred = Deferred::field(node.clone(), path);
        let resolved = &self.nodes[id.0].outputs;
        if let Some(outputs) = resolved.get() {
            deferred.fill(outputs);
            return Ok(deferred);
        }

        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(id).or_default().push(deferred.clone());
        // The node may have resolved between the check and taking the lock
        if let Some(outputs) = resolved.get() {
            deferred.fill(outputs);
        }

        Ok(deferred)
    }

    /// Record a realized node's outputs and fill every deferred value
    /// sourced from it. Outputs are write-once.
    pub fn resolve(&self, node: &NodeRef, outputs: Value) -> Result<(), GraphError> {
        let id = self.check_ref(node)?;
        self.resolve_id(id, outputs)
    }

    pub(crate) fn resolve_id(&self, id: NodeId, outputs: Value) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get(id.0)
            .ok_or_else(|| GraphError::UnknownNode(id.to_string()))?;

        if node.outputs.set(outputs).is_err() {
            return Err(GraphError::AlreadyResolved(node.name.clone()));
        }
        let outputs = node
            .outputs
            .get()
            .ok_or_else(|| GraphError::NotYetResolved(node.name.clone()))?;

        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let filled = slots
            .get(&id)
            .map(|waiting| waiting.iter().filter(|d| d.fill(outputs)).count())
            .unwrap_or(0);
        tracing::debug!("resolved '{}', filled {} deferred values", node.name, filled);

        Ok(())
    }

    /// Read an export; fails with `NotYetResolved` until its source realizes
    pub fn exported(&self, name: &str) -> Result<Value, GraphError> {
        let value = self
            .exports
            .get(name)
            .ok_or_else(|| GraphError::UnknownExport(name.to_string()))?;
        value.get().cloned()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&ResourceNode> {
        self.nodes.get(id.0)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn exports(&self) -> &BTreeMap<String, Deferred<Value>> {
        &self.exports
    }

    /// Look a node up by name
    pub fn get(&self, name: &str) -> Option<NodeRef> {
        let id = *self.names.get(name)?;
        self.node_ref(id)
    }

    pub fn node_ref(&self, id: NodeId) -> Option<NodeRef> {
        let node = self.nodes.get(id.0)?;
        Some(NodeRef::new(self.id, id, &node.name, &node.kind))
    }

    /// Nodes that read an output of `id`
    pub fn dependents(&self, id: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|e| e.producer == id)
            .map(|e| e.consumer)
            .collect()
    }

    // =========================================================================
    // Validation and ordering
    // =========================================================================

    /// Static checks run before any realization: every declared node is
    /// defined and the edge relation is acyclic
    pub fn validate(&self) -> Result<(), GraphError> {
        if let Some(node) = self.nodes.iter().find(|n| !n.is_defined()) {
            return Err(GraphError::Undefined(node.name.clone()));
        }
        self.topological_order().map(|_| ())
    }

    /// Producers before consumers; ties broken by declaration order
    pub fn topological_order(&self) -> Result<Vec<NodeId>, GraphError> {
        let mut in_degree: Vec<usize> = self.nodes.iter().map(|n| n.dependencies.len()).collect();
        let mut ready: BTreeSet<NodeId> = self
            .nodes
            .iter()
            .filter(|n| n.dependencies.is_empty())
            .map(|n| n.id)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_first() {
            order.push(id);
            for dependent in self.dependents(id) {
                in_degree[dependent.0] -= 1;
                if in_degree[dependent.0] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() == self.nodes.len() {
            Ok(order)
        } else {
            Err(GraphError::CyclicDependency {
                cycle: self.find_cycle(&in_degree),
            })
        }
    }

    /// Group nodes into waves; every node's dependencies sit in earlier
    /// waves, so nodes inside one wave are mutually independent
    pub fn levels(&self) -> Result<Vec<Vec<NodeId>>, GraphError> {
        let order = self.topological_order()?;
        let mut depth = vec![0usize; self.nodes.len()];
        let mut levels: Vec<Vec<NodeId>> = Vec::new();

        for id in order {
            let level = self.nodes[id.0]
                .dependencies
                .iter()
                .map(|dep| depth[dep.0] + 1)
                .max()
                .unwrap_or(0);
            depth[id.0] = level;
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(id);
        }

        for level in &mut levels {
            level.sort();
        }
        Ok(levels)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn check_ref(&self, node: &NodeRef) -> Result<NodeId, GraphError> {
        if node.graph != self.id {
            return Err(GraphError::ForeignNode(node.name().to_string()));
        }
        if node.id.0 >= self.nodes.len() {
            return Err(GraphError::UnknownNode(node.name().to_string()));
        }
        Ok(node.id)
    }

    /// Dependency path `from -> ... -> to`, following consumer->producer edges
    fn find_path(&self, from: NodeId, to: NodeId) -> Option<Vec<NodeId>> {
        let mut stack = vec![vec![from]];
        let mut visited = BTreeSet::new();

        while let Some(path) = stack.pop() {
            let current = *path.last()?;
            if current == to {
                return Some(path);
            }
            if !visited.insert(current) {
                continue;
            }
            for &dep in &self.nodes[current.0].dependencies {
                let mut next = path.clone();
                next.push(dep);
                stack.push(next);
            }
        }
        None
    }

    /// Walk dependencies among nodes Kahn's algorithm could not place until
    /// a node repeats
    fn find_cycle(&self, in_degree: &[usize]) -> Vec<String> {
        let Some(start) = in_degree.iter().position(|&d| d > 0) else {
            return Vec::new();
        };

        let mut seen: Vec<NodeId> = Vec::new();
        let mut current = NodeId(start);
        loop {
            if let Some(pos) = seen.iter().position(|&n| n == current) {
                let mut cycle: Vec<String> = seen[pos..]
                    .iter()
                    .map(|n| self.nodes[n.0].name.clone())
                    .collect();
                cycle.push(self.nodes[current.0].name.clone());
                return cycle;
            }
            seen.push(current);
            match self.nodes[current.0]
                .dependencies
                .iter()
                .find(|dep| in_degree[dep.0] > 0)
            {
                Some(&next) => current = next,
                None => return Vec::new(),
            }
        }
    }
}
