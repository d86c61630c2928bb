//! Desired-state document
//!
//! The form handed to an external reconciliation engine: every resource with
//! its provider type, explicit dependencies and inputs. Values already
//! resolved are inlined; the rest appear as `{"$deferred": "<label>"}`.

use crate::graph::ResourceGraph;
use crate::resource::get_kind;
use crate::stack::Stack;
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEntry {
    pub kind: String,
    pub name: String,
    /// Provider type token, e.g. `gcp:compute/urlMap:URLMap`
    #[serde(rename = "type")]
    pub provider_type: String,
    pub depends_on: Vec<String>,
    pub inputs: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct DesiredState {
    pub region: String,
    pub project: String,
    pub resources: Vec<ResourceEntry>,
    pub exports: BTreeMap<String, Value>,
}

impl DesiredState {
    /// Render a declared stack
    pub fn from_stack(stack: &Stack) -> Self {
        Self::render(&stack.graph, &stack.settings.project_id, &stack.settings.region)
    }

    /// Render any graph; resources appear in declaration order
    pub fn render(graph: &ResourceGraph, project: &str, region: &str) -> Self {
        let resources = graph
            .nodes()
            .iter()
            .map(|node| ResourceEntry {
                kind: node.kind().to_string(),
                name: node.name().to_string(),
                provider_type: get_kind(node.kind())
                    .map(|def| def.provider_type.clone())
                    .unwrap_or_default(),
                depends_on: node
                    .dependencies()
                    .iter()
                    .filter_map(|dep| graph.node(*dep))
                    .map(|dep| dep.name().to_string())
                    .collect(),
                inputs: node.inputs().map(|i| i.render()).unwrap_or(Value::Null),
            })
            .collect();

        let exports = graph
            .exports()
            .iter()
            .map(|(name, value)| {
                let rendered = match value.get() {
                    Ok(v) => v.clone(),
                    Err(_) => serde_json::json!({ "$deferred": value.label() }),
                };
                (name.clone(), rendered)
            })
            .collect();

        Self {
            region: region.to_string(),
            project: project.to_string(),
            resources,
            exports,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize desired state as JSON")
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize desired state as YAML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::stack::{declare, names, SERVICE_URL_EXPORT};

    fn entry<'a>(doc: &'a DesiredState, name: &str) -> &'a ResourceEntry {
        doc.resources.iter().find(|r| r.name == name).unwrap()
    }

    #[test]
    fn test_unresolved_values_render_as_markers() {
        let stack = declare(&Settings::default()).unwrap();
        let doc = DesiredState::from_stack(&stack);

        assert_eq!(doc.resources.len(), 12);
        let proxy = entry(&doc, names::HTTP_PROXY);
        assert_eq!(proxy.depends_on, vec![names::URL_MAP]);
        assert_eq!(proxy.inputs["urlMap"]["$deferred"], "url-map.selfLink");
        assert_eq!(
            doc.exports[SERVICE_URL_EXPORT]["$deferred"],
            "cloud-run-service.statuses[0].url"
        );
    }

    #[test]
    fn test_literals_and_types() {
        let stack = declare(&Settings::default()).unwrap();
        let doc = DesiredState::from_stack(&stack);

        let rule = entry(&doc, names::FORWARDING_RULE);
        assert_eq!(rule.provider_type, "gcp:compute/globalForwardingRule:GlobalForwardingRule");
        assert_eq!(rule.inputs["portRange"], "80");
        assert_eq!(doc.region, "us-central1");
    }

    #[test]
    fn test_resolved_values_inlined() {
        let stack = declare(&Settings::default()).unwrap();
        let graph = &stack.graph;
        let map = graph.get(names::URL_MAP).unwrap();
        graph
            .resolve(&map, serde_json::json!({"selfLink": "https://example/urlMaps/url-map"}))
            .unwrap();

        let doc = DesiredState::from_stack(&stack);
        assert_eq!(
            entry(&doc, names::HTTP_PROXY).inputs["urlMap"],
            "https://example/urlMaps/url-map"
        );
    }

    #[test]
    fn test_yaml_output() {
        let stack = declare(&Settings::default()).unwrap();
        let yaml = DesiredState::from_stack(&stack).to_yaml().unwrap();
        assert!(yaml.contains("dependsOn:"));
        assert!(yaml.contains("gcp:compute/network:Network"));
    }
}
