//! Access Policy Composer
//!
//! Builds the IAP policy document attached to the backend service. The
//! document is serialized with a fixed key order so identical inputs always
//! produce identical bytes, which keeps the reconciler from seeing a change
//! where there is none.

use crate::graph::{combine, Deferred, GraphError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role granting access to resources behind IAP
pub const IAP_ACCESSOR_ROLE: &str = "roles/iap.httpsResourceAccessor";

/// Principals that need no `type:` prefix
const SPECIAL_MEMBERS: &[&str] = &["allUsers", "allAuthenticatedUsers"];

const MEMBER_TYPES: &[&str] = &["user", "serviceAccount", "group", "domain", "principal", "principalSet"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub members: Vec<String>,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    pub bindings: Vec<Binding>,
}

impl AccessPolicy {
    /// Policy granting the IAP accessor role to a single principal
    pub fn for_member(member: &str) -> Result<Self, String> {
        validate_member(member)?;
        Ok(Self {
            bindings: vec![Binding {
                members: vec![member.to_string()],
                role: IAP_ACCESSOR_ROLE.to_string(),
            }],
        })
    }

    /// Compact JSON with stable key order
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        // Field order is fixed by the struct definitions
        serde_json::to_string(self)
    }
}

fn validate_member(member: &str) -> Result<(), String> {
    if SPECIAL_MEMBERS.contains(&member) {
        return Ok(());
    }
    let Some((kind, id)) = member.split_once(':') else {
        return Err(format!("member '{member}' has no type prefix"));
    };
    if !MEMBER_TYPES.contains(&kind) {
        return Err(format!("unknown member type '{kind}'"));
    }
    if id.trim().is_empty() {
        return Err(format!("member '{member}' has an empty identity"));
    }
    Ok(())
}

fn as_identity<'a>(value: &'a Value, what: &str) -> Result<&'a str, String> {
    match value.as_str() {
        Some(s) if !s.trim().is_empty() => Ok(s),
        Some(_) => Err(format!("{what} is empty")),
        None => Err(format!("{what} is not a string: {value}")),
    }
}

/// Join a backend service id and an IAM member into the serialized policy
/// body. The policy only embeds the member; the backend id is joined so the
/// document is never produced before the backend service exists.
pub fn compose_policy(backend_service_id: &Deferred<Value>, member: &Deferred<Value>) -> Deferred<String> {
    let label = format!("policy({}, {})", backend_service_id.label(), member.label());
    let error_label = label.clone();

    combine(
        label,
        vec![backend_service_id.erased(), member.erased()],
        move |values| {
            let composed = as_identity(&values[0], "backend service id")
                .and_then(|_| as_identity(&values[1], "member"))
                .and_then(AccessPolicy::for_member)
                .and_then(|policy| policy.to_canonical_json().map_err(|e| e.to_string()));

            match composed {
                Ok(body) => {
                    tracing::debug!("composed access policy ({} bytes)", body.len());
                    Ok(body)
                }
                Err(reason) => Err(GraphError::PolicyComposition {
                    label: error_label,
                    reason,
                }),
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Inputs, ResourceGraph};
    use serde_json::json;

    #[test]
    fn test_canonical_document() {
        let policy = AccessPolicy::for_member("allAuthenticatedUsers").unwrap();
        assert_eq!(
            policy.to_canonical_json().unwrap(),
            r#"{"bindings":[{"members":["allAuthenticatedUsers"],"role":"roles/iap.httpsResourceAccessor"}]}"#
        );
    }

    #[test]
    fn test_canonical_json_parses_back() {
        let policy = AccessPolicy::for_member("domain:example.com").unwrap();
        let body = policy.to_canonical_json().expect("policy serializes");
        assert!(!body.is_empty());
        assert_eq!(serde_json::from_str::<AccessPolicy>(&body).unwrap(), policy);
    }

    #[test]
    fn test_member_validation() {
        assert!(AccessPolicy::for_member("user:alice@example.com").is_ok());
        assert!(AccessPolicy::for_member("serviceAccount:ci@p.iam.gserviceaccount.com").is_ok());
        assert!(AccessPolicy::for_member("alice@example.com").is_err());
        assert!(AccessPolicy::for_member("robot:x").is_err());
        assert!(AccessPolicy::for_member("user: ").is_err());
    }

    fn policy_graph() -> (ResourceGraph, Deferred<String>) {
        let mut graph = ResourceGraph::new();
        let backend = graph.add_node("backend-service", "backend-service", Inputs::new()).unwrap();
        let binding = graph.add_node("iam-binding", "service-rle", Inputs::new()).unwrap();
        let id = graph.output(&backend, "id").unwrap();
        let member = graph.output(&binding, "member").unwrap();
        let policy = compose_policy(&id, &member);
        (graph, policy)
    }

    #[test]
    fn test_compose_after_both_resolve() {
        let (graph, policy) = policy_graph();
        let backend = graph.get("backend-service").unwrap();
        let binding = graph.get("service-rle").unwrap();

        graph.resolve(&binding, json!({"member": "allAuthenticatedUsers"})).unwrap();
        assert!(matches!(policy.get(), Err(GraphError::NotYetResolved(_))));

        graph.resolve(&backend, json!({"id": "projects/p/global/backendServices/b"})).unwrap();
        let body = policy.get().unwrap();
        let parsed: AccessPolicy = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.bindings[0].members, vec!["allAuthenticatedUsers"]);
        assert_eq!(parsed.bindings[0].role, IAP_ACCESSOR_ROLE);
    }

    #[test]
    fn test_malformed_member_fails_composition() {
        let (graph, policy) = policy_graph();
        graph
            .resolve(&graph.get("backend-service").unwrap(), json!({"id": "b"}))
            .unwrap();
        graph
            .resolve(&graph.get("service-rle").unwrap(), json!({"member": 42}))
            .unwrap();

        match policy.get() {
            Err(GraphError::PolicyComposition { reason, .. }) => {
                assert!(reason.contains("not a string"))
            }
            other => panic!("expected composition failure, got {other:?}"),
        }
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let first = policy_graph();
        let second = policy_graph();
        for (graph, _) in [&first, &second] {
            graph.resolve(&graph.get("backend-service").unwrap(), json!({"id": "b"})).unwrap();
            graph
                .resolve(&graph.get("service-rle").unwrap(), json!({"member": "group:ops@example.com"}))
                .unwrap();
        }
        assert_eq!(first.1.get().unwrap(), second.1.get().unwrap());
    }
}
