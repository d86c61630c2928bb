//! Stack declaration
//!
//! The concrete topology: a private network, a Cloud Run service that
//! reaches it through a VPC connector, and a global HTTP load-balancing
//! chain guarded by an IAP policy.

use crate::config::Settings;
use crate::graph::{GraphError, Input, Inputs, ResourceGraph};
use crate::policy::compose_policy;

/// Name of the single value exported to the caller
pub const SERVICE_URL_EXPORT: &str = "serviceUrl";

/// Resource names used in the declaration
pub mod names {
    pub const NETWORK: &str = "network";
    pub const CONNECTOR: &str = "connector";
    pub const SERVICE: &str = "cloud-run-service";
    pub const HEALTH_CHECK: &str = "health-check";
    pub const BACKEND_SERVICE: &str = "backend-service";
    pub const SERVICE_INVOKER: &str = "service-rle";
    pub const RANDOM_SUFFIX: &str = "random-suffix";
    pub const URL_MAP: &str = "url-map";
    pub const HTTP_PROXY: &str = "target-http-proxy";
    pub const IP_ADDRESS: &str = "ip-address";
    pub const FORWARDING_RULE: &str = "forwarding-rule";
    pub const IAP_POLICY: &str = "iap-policy";
}

const CONNECTOR_CIDR: &str = "10.8.0.0/28";
const VPC_CONNECTOR_ANNOTATION: &str = "run.googleapis.com/vpc-access-connector";
const INVOKER_ROLE: &str = "roles/run.invoker";

/// A declared stack: the graph plus the settings it was built from
pub struct Stack {
    pub graph: ResourceGraph,
    pub settings: Settings,
}

/// Build the resource graph for the given settings
pub fn declare(settings: &Settings) -> Result<Stack, GraphError> {
    let mut graph = ResourceGraph::new();
    let options = &settings.options;

    // Network and serverless service

    let network = graph.add_node("network", names::NETWORK, Inputs::new())?;

    let network_link = graph.output(&network, "selfLink")?;
    let connector = graph.add_node(
        "vpc-connector",
        names::CONNECTOR,
        Inputs::new()
            .with("region", settings.region.as_str())
            .with("ipCidrRange", CONNECTOR_CIDR)
            .with("network", network_link),
    )?;

    let container = Inputs::new().with("image", settings.image.as_str());
    let connector_link = graph.output(&connector, "selfLink")?;
    let service = graph.add_node(
        "serverless-service",
        names::SERVICE,
        Inputs::new().with("location", settings.region.as_str()).with(
            "template",
            Inputs::new()
                .with("spec", Inputs::new().with("containers", vec![Input::from(container)]))
                .with(
                    "metadata",
                    Inputs::new().with(
                        "annotations",
                        Inputs::new().with(VPC_CONNECTOR_ANNOTATION, connector_link),
                    ),
                ),
        ),
    )?;

    // Load-balancing chain

    let health_check = graph.add_node(
        "health-check",
        names::HEALTH_CHECK,
        Inputs::new()
            .with("checkIntervalSec", 1u32)
            .with("timeoutSec", 1u32)
            .with("healthyThreshold", 3u32)
            .with("unhealthyThreshold", 4u32)
            .with("httpHealthCheck", Inputs::new().with("port", 80u32)),
    )?;

    let headers = (!options.custom_request_headers.is_empty()).then(|| {
        options
            .custom_request_headers
            .iter()
            .map(|h| Input::from(h.as_str()))
            .collect::<Vec<_>>()
    });
    let health_check_link = graph.output(&health_check, "selfLink")?;
    let backend = graph.add_node(
        "backend-service",
        names::BACKEND_SERVICE,
        Inputs::new()
            .with("healthChecks", health_check_link)
            .with("timeoutSec", 60u32)
            .with_opt("protocol", options.backend_protocol.as_deref())
            .with_opt("region", options.backend_region.as_deref())
            .with_opt("customRequestHeaders", headers),
    )?;

    let invoker_inputs = Inputs::new()
        .with("location", graph.output(&service, "location")?)
        .with("project", graph.output(&service, "project")?)
        .with("service", graph.output(&service, "name")?);
    let invoker = graph.add_node(
        "iam-binding",
        names::SERVICE_INVOKER,
        invoker_inputs
            .with("role", INVOKER_ROLE)
            .with("member", settings.member.as_str()),
    )?;

    graph.add_node(
        "random-string",
        names::RANDOM_SUFFIX,
        Inputs::new()
            .with("length", 4u32)
            .with("special", false)
            .with("upper", false)
            .with("number", true),
    )?;

    let backend_link = graph.output(&backend, "selfLink")?;
    let url_map = graph.add_node(
        "url-map",
        names::URL_MAP,
        Inputs::new().with("defaultService", backend_link),
    )?;

    let url_map_link = graph.output(&url_map, "selfLink")?;
    let proxy = graph.add_node(
        "http-proxy",
        names::HTTP_PROXY,
        Inputs::new().with("urlMap", url_map_link),
    )?;

    let address = graph.add_node(
        "global-address",
        names::IP_ADDRESS,
        Inputs::new().with_opt("region", options.address_region.as_deref()),
    )?;

    let forwarding_inputs = Inputs::new()
        .with("ipAddress", graph.output(&address, "address")?)
        .with("target", graph.output(&proxy, "selfLink")?)
        .with("portRange", "80");
    graph.add_node("forwarding-rule", names::FORWARDING_RULE, forwarding_inputs)?;

    // Identity-aware access

    let backend_id = graph.output(&backend, "id")?;
    let member = graph.output(&invoker, "member")?;
    graph.add_node(
        "access-policy",
        names::IAP_POLICY,
        Inputs::new()
            .with("webBackendService", &backend_id)
            .with("policyData", compose_policy(&backend_id, &member)),
    )?;

    let url = graph.output(&service, "statuses[0].url")?;
    graph.export(SERVICE_URL_EXPORT, url)?;

    tracing::info!(
        "declared {} resources in {} ({})",
        graph.len(),
        settings.project_id,
        settings.region
    );

    Ok(Stack {
        graph,
        settings: settings.clone(),
    })
}
