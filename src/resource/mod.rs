//! Resource kinds
//!
//! Kind definitions are loaded from embedded JSON, so a new kind is a data
//! change rather than a code change. The graph builder rejects nodes whose
//! kind is not registered here.
//!
//! # Architecture
//!
//! - [`registry`] - Loads and caches kind definitions from embedded JSON
//! - [`links`] - Builds ids and self links the way the cloud APIs report them
//!
//! # Kind Definitions
//!
//! Kinds live in `src/resources/kinds.json`. Each entry names the owning
//! service, the provider type, its scope and the outputs it reports.
//!
//! # Example
//!
//! ```
//! use rungate::resource::{get_kind, ResourceLinks};
//!
//! let def = get_kind("url-map").unwrap();
//! let links = ResourceLinks::new("demo-project", "us-central1");
//! assert!(links.self_link(def, "url-map").unwrap().ends_with("/global/urlMaps/url-map"));
//! ```

pub mod links;
pub mod registry;

pub use links::ResourceLinks;
pub use registry::*;
