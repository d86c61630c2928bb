//! Graph construction and resolution errors

use thiserror::Error;

/// Errors raised while building, validating or resolving a resource graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Duplicate resource name: {0}")]
    DuplicateName(String),

    #[error("Unknown resource kind '{kind}' for '{name}'")]
    UnknownKind { kind: String, name: String },

    #[error("Unknown resource: {0}")]
    UnknownNode(String),

    #[error("Resource '{0}' belongs to a different graph")]
    ForeignNode(String),

    #[error("Resource '{0}' already has inputs defined")]
    AlreadyDefined(String),

    #[error("Resource '{0}' was declared but never defined")]
    Undefined(String),

    #[error("Cyclic dependency: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Value '{0}' is not resolved yet")]
    NotYetResolved(String),

    #[error("Outputs of '{0}' were already resolved")]
    AlreadyResolved(String),

    #[error("Resource '{node}' reported no output at '{path}'")]
    MissingOutput { node: String, path: String },

    #[error("Invalid output path '{0}'")]
    InvalidPath(String),

    #[error("Transform for '{label}' failed: {reason}")]
    Transform { label: String, reason: String },

    #[error("Unknown export: {0}")]
    UnknownExport(String),

    #[error("Policy composition failed for '{label}': {reason}")]
    PolicyComposition { label: String, reason: String },
}
