//! rungate
//!
//! Declares a Cloud Run service reachable only through a VPC connector,
//! fronted by a global HTTP load balancer and guarded by an identity-aware
//! access policy. The declaration is a resource graph whose edges come from
//! deferred output references; it can be rendered as a desired-state
//! document or realized in dependency order through a [`realize::Provider`].

pub mod config;
pub mod document;
pub mod graph;
pub mod policy;
pub mod realize;
pub mod resource;
pub mod stack;

/// Version injected at compile time via RUNGATE_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("RUNGATE_VERSION") {
    Some(v) => v,
    None => "dev",
};
