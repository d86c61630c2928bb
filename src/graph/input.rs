//! Node inputs
//!
//! Inputs are a JSON-like tree whose leaves are either literals or deferred
//! values. Every deferred leaf contributes a dependency edge from the node
//! holding it to the node producing it.

use super::deferred::{Deferred, Pending};
use super::error::GraphError;
use super::node::NodeRef;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// One input value
#[derive(Clone)]
pub enum Input {
    Literal(Value),
    Deferred(Arc<dyn Pending>),
    List(Vec<Input>),
    Map(Inputs),
}

impl Input {
    fn collect_sources(&self, out: &mut BTreeSet<NodeRef>) {
        match self {
            Input::Literal(_) => {}
            Input::Deferred(d) => out.extend(d.sources().iter().cloned()),
            Input::List(items) => items.iter().for_each(|i| i.collect_sources(out)),
            Input::Map(map) => map.0.values().for_each(|i| i.collect_sources(out)),
        }
    }

    /// Fully resolve this input; fails if any deferred leaf is unavailable
    pub fn resolve(&self) -> Result<Value, GraphError> {
        match self {
            Input::Literal(v) => Ok(v.clone()),
            Input::Deferred(d) => d.resolved_value(),
            Input::List(items) => items
                .iter()
                .map(Input::resolve)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Input::Map(map) => map.resolve(),
        }
    }

    /// Render for the desired-state document: resolved leaves inline,
    /// unresolved ones as `{"$deferred": label}` markers
    pub fn render(&self) -> Value {
        match self {
            Input::Literal(v) => v.clone(),
            Input::Deferred(d) => match d.resolved_value() {
                Ok(v) => v,
                Err(GraphError::NotYetResolved(_)) => json!({ "$deferred": d.label() }),
                Err(e) => json!({ "$deferred": d.label(), "error": e.to_string() }),
            },
            Input::List(items) => Value::Array(items.iter().map(Input::render).collect()),
            Input::Map(map) => map.render(),
        }
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Literal(v) => write!(f, "{v}"),
            Input::Deferred(d) => write!(f, "${{{}}}", d.label()),
            Input::List(items) => f.debug_list().entries(items).finish(),
            Input::Map(map) => fmt::Debug::fmt(map, f),
        }
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Input::Literal(value)
    }
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Input::Literal(Value::String(value.to_string()))
    }
}

impl From<String> for Input {
    fn from(value: String) -> Self {
        Input::Literal(Value::String(value))
    }
}

impl From<bool> for Input {
    fn from(value: bool) -> Self {
        Input::Literal(Value::Bool(value))
    }
}

impl From<u32> for Input {
    fn from(value: u32) -> Self {
        Input::Literal(Value::from(value))
    }
}

impl From<i64> for Input {
    fn from(value: i64) -> Self {
        Input::Literal(Value::from(value))
    }
}

impl From<Inputs> for Input {
    fn from(value: Inputs) -> Self {
        Input::Map(value)
    }
}

impl From<Vec<Input>> for Input {
    fn from(value: Vec<Input>) -> Self {
        Input::List(value)
    }
}

impl From<Arc<dyn Pending>> for Input {
    fn from(value: Arc<dyn Pending>) -> Self {
        Input::Deferred(value)
    }
}

impl<T: Serialize + Send + Sync + 'static> From<&Deferred<T>> for Input {
    fn from(value: &Deferred<T>) -> Self {
        Input::Deferred(value.erased())
    }
}

impl<T: Serialize + Send + Sync + 'static> From<Deferred<T>> for Input {
    fn from(value: Deferred<T>) -> Self {
        Input::Deferred(Arc::new(value))
    }
}

/// Keyed inputs of a node (or of a nested block)
#[derive(Clone, Default)]
pub struct Inputs(BTreeMap<String, Input>);

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: impl Into<Input>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Insert only when the value is set; unset optional properties are
    /// left out of the document entirely
    pub fn with_opt<V: Into<Input>>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with(key, v),
            None => self,
        }
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Input>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Input> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Input)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every node some leaf of these inputs waits on
    pub fn sources(&self) -> BTreeSet<NodeRef> {
        let mut out = BTreeSet::new();
        for input in self.0.values() {
            input.collect_sources(&mut out);
        }
        out
    }

    pub fn resolve(&self) -> Result<Value, GraphError> {
        let mut map = Map::new();
        for (key, input) in &self.0 {
            map.insert(key.clone(), input.resolve()?);
        }
        Ok(Value::Object(map))
    }

    pub fn render(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.render()))
                .collect(),
        )
    }
}

impl fmt::Debug for Inputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}
