//! Resource graph
//!
//! Declarations form a static DAG: each node is one cloud resource, and
//! every deferred value embedded in a node's inputs adds an edge from that
//! node to the node producing the value.
//!
//! # Module Structure
//!
//! - [`builder`] - Node arena, edge list, cycle detection and ordering
//! - [`deferred`] - Write-once deferred values and the `combine` join
//! - [`input`] - Input trees mixing literals and deferred leaves
//! - [`node`] - Node ids, handles and edges
//! - [`path`] - Output selectors like `statuses[0].url`
//!
//! # Example
//!
//! ```
//! use rungate::graph::{Inputs, ResourceGraph};
//!
//! let mut graph = ResourceGraph::new();
//! let network = graph.add_node("network", "network", Inputs::new()).unwrap();
//! let link = graph.output(&network, "selfLink").unwrap();
//! graph
//!     .add_node("vpc-connector", "connector", Inputs::new().with("network", &link))
//!     .unwrap();
//!
//! assert!(link.get().is_err());
//! assert_eq!(graph.edges().len(), 1);
//! ```

pub mod builder;
pub mod deferred;
mod error;
pub mod input;
pub mod node;
pub mod path;

pub use builder::ResourceGraph;
pub use deferred::{combine, Deferred, Pending};
pub use error::GraphError;
pub use input::{Input, Inputs};
pub use node::{Edge, NodeId, NodeRef, ResourceNode};
pub use path::OutputPath;
