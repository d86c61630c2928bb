//! Deferred values
//!
//! A [`Deferred`] is a handle to a value that only becomes known once the
//! node producing it has been realized. Field deferreds are filled by the
//! graph when their node resolves; combined deferreds are computed on first
//! read after every input has resolved, and their transform runs at most
//! once.

use super::error::GraphError;
use super::node::NodeRef;
use super::path::OutputPath;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

type Transform<T> = Box<dyn FnOnce(&[Value]) -> Result<T, GraphError> + Send>;

/// Type-erased view of a deferred value, used for graph inputs
pub trait Pending: Send + Sync {
    /// Human-readable name, e.g. `backend-service.selfLink`
    fn label(&self) -> &str;

    /// Nodes whose realization this value waits on
    fn sources(&self) -> &BTreeSet<NodeRef>;

    /// Whether a read would succeed or fail for a reason other than waiting
    fn is_settled(&self) -> bool;

    /// Read the value as JSON
    fn resolved_value(&self) -> Result<Value, GraphError>;
}

enum Source<T> {
    /// Filled by the graph when `node` resolves
    Field { node: NodeRef, path: OutputPath },
    Combined {
        deps: Vec<Arc<dyn Pending>>,
        transform: Mutex<Option<Transform<T>>>,
    },
}

struct Inner<T> {
    label: String,
    sources: BTreeSet<NodeRef>,
    cell: OnceLock<Result<T, GraphError>>,
    source: Source<T>,
}

/// A value known only after its producing node is realized
pub struct Deferred<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("label", &self.inner.label)
            .field("resolved", &self.inner.cell.get().is_some())
            .finish()
    }
}

impl Deferred<Value> {
    pub(crate) fn field(node: NodeRef, path: OutputPath) -> Self {
        let label = format!("{}.{}", node.name(), path);
        let sources = BTreeSet::from([node.clone()]);
        Self {
            inner: Arc::new(Inner {
                label,
                sources,
                cell: OnceLock::new(),
                source: Source::Field { node, path },
            }),
        }
    }

    /// Fill a field deferred from its node's outputs. Returns false if it
    /// was already filled.
    pub(crate) fn fill(&self, outputs: &Value) -> bool {
        let Source::Field { node, path } = &self.inner.source else {
            return false;
        };

        let result = path
            .lookup(outputs)
            .cloned()
            .ok_or_else(|| GraphError::MissingOutput {
                node: node.name().to_string(),
                path: path.to_string(),
            });

        self.inner.cell.set(result).is_ok()
    }
}

impl<T: Send + Sync + 'static> Deferred<T> {
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn sources(&self) -> &BTreeSet<NodeRef> {
        &self.inner.sources
    }

    /// Read the value, failing with `NotYetResolved` until every source
    /// node has been realized
    pub fn get(&self) -> Result<&T, GraphError> {
        if let Some(result) = self.inner.cell.get() {
            return result.as_ref().map_err(Clone::clone);
        }

        let Source::Combined { deps, transform } = &self.inner.source else {
            return Err(GraphError::NotYetResolved(self.inner.label.clone()));
        };

        let mut values = Vec::with_capacity(deps.len());
        for dep in deps {
            match dep.resolved_value() {
                Ok(value) => values.push(value),
                Err(GraphError::NotYetResolved(_)) => {
                    return Err(GraphError::NotYetResolved(self.inner.label.clone()));
                }
                Err(e) => return Err(e),
            }
        }

        let result = self.inner.cell.get_or_init(|| {
            let taken = transform.lock().ok().and_then(|mut slot| slot.take());
            match taken {
                Some(f) => f(&values),
                None => Err(GraphError::AlreadyResolved(self.inner.label.clone())),
            }
        });
        result.as_ref().map_err(Clone::clone)
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.cell.get().is_some()
    }

    /// Derive a new deferred value from this one
    pub fn map<U, F>(&self, label: impl Into<String>, f: F) -> Deferred<U>
    where
        T: Serialize,
        U: Send + Sync + 'static,
        F: FnOnce(&Value) -> Result<U, GraphError> + Send + 'static,
    {
        combine(label, vec![self.erased()], move |values| f(&values[0]))
    }

    /// Type-erased handle for use as a graph input
    pub fn erased(&self) -> Arc<dyn Pending>
    where
        T: Serialize,
    {
        Arc::new(self.clone())
    }
}

impl<T: Serialize + Send + Sync + 'static> Pending for Deferred<T> {
    fn label(&self) -> &str {
        &self.inner.label
    }

    fn sources(&self) -> &BTreeSet<NodeRef> {
        &self.inner.sources
    }

    fn is_settled(&self) -> bool {
        match &self.inner.source {
            Source::Field { .. } => self.inner.cell.get().is_some(),
            Source::Combined { deps, .. } => {
                self.inner.cell.get().is_some() || deps.iter().all(|d| d.is_settled())
            }
        }
    }

    fn resolved_value(&self) -> Result<Value, GraphError> {
        let value = self.get()?;
        serde_json::to_value(value).map_err(|e| GraphError::Transform {
            label: self.inner.label.clone(),
            reason: e.to_string(),
        })
    }
}

/// Join several deferred values into one.
///
/// The returned value resolves only once every input has resolved; the
/// transform then runs exactly once with the inputs' JSON values, in the
/// order given, and its result is cached.
pub fn combine<T, F>(label: impl Into<String>, deps: Vec<Arc<dyn Pending>>, transform: F) -> Deferred<T>
where
    T: Send + Sync + 'static,
    F: FnOnce(&[Value]) -> Result<T, GraphError> + Send + 'static,
{
    let sources = deps
        .iter()
        .flat_map(|d| d.sources().iter().cloned())
        .collect();

    Deferred {
        inner: Arc::new(Inner {
            label: label.into(),
            sources,
            cell: OnceLock::new(),
            source: Source::Combined {
                deps,
                transform: Mutex::new(Some(Box::new(transform))),
            },
        }),
    }
}
