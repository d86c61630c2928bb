//! Resource Registry - Load resource kind definitions from JSON
//!
//! This module loads the provider resource taxonomy from an embedded JSON
//! file and provides lookup functions for the graph builder, the document
//! renderer and the simulated provider.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Embedded resource kind files (compiled into the binary)
const KIND_FILES: &[&str] = &[include_str!("../resources/kinds.json")];

/// Where a resource lives in the provider hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Project-wide resource (`projects/{p}/global/...`)
    Global,
    /// Region-scoped resource (`projects/{p}/locations/{r}/...`)
    Regional,
    /// Computed by the engine itself, never sent to the cloud API
    Local,
}

/// Kind definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct KindDef {
    pub display_name: String,
    /// API service the kind belongs to (`compute`, `run`, `vpcaccess`, ...)
    pub service: String,
    /// Type token the reconciliation engine uses for this kind
    pub provider_type: String,
    /// REST collection name, if the resource is addressable by URL
    #[serde(default)]
    pub collection: Option<String>,
    pub scope: Scope,
    /// Output attributes the provider reports after realization
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl KindDef {
    /// Check whether the provider documents the given top-level output
    pub fn has_output(&self, field: &str) -> bool {
        self.outputs.iter().any(|o| o == field)
    }
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize)]
pub struct KindConfig {
    #[serde(default)]
    pub kinds: BTreeMap<String, KindDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<KindConfig> = OnceLock::new();

/// Get the kind registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static KindConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = KindConfig {
            kinds: BTreeMap::new(),
        };

        for content in KIND_FILES {
            let partial: KindConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded kind JSON: {}", e));
            final_config.kinds.extend(partial.kinds);
        }

        final_config
    })
}

/// Get a kind definition by key
pub fn get_kind(key: &str) -> Option<&'static KindDef> {
    get_registry().kinds.get(key)
}

/// Get all kind keys, sorted
pub fn get_all_kind_keys() -> Vec<&'static str> {
    get_registry().kinds.keys().map(|s| s.as_str()).collect()
}
