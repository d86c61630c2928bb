//! Resource Links
//!
//! Builds resource ids and self links the way the cloud APIs report them,
//! so simulated outputs look like the real thing.

use super::registry::{KindDef, Scope};

/// Project and region pair used to build resource URLs
#[derive(Debug, Clone)]
pub struct ResourceLinks {
    pub project_id: String,
    pub region: String,
}

impl ResourceLinks {
    pub fn new(project_id: &str, region: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            region: region.to_string(),
        }
    }

    // =========================================================================
    // Compute Engine API helpers
    // =========================================================================

    /// Build Compute Engine API URL
    pub fn compute_url(&self, path: &str) -> String {
        format!(
            "https://www.googleapis.com/compute/v1/projects/{}/{}",
            self.project_id, path
        )
    }

    /// Build global Compute Engine API URL
    pub fn compute_global_url(&self, resource: &str) -> String {
        self.compute_url(&format!("global/{}", resource))
    }

    /// Build regional Compute Engine API URL
    pub fn compute_regional_url(&self, resource: &str) -> String {
        self.compute_url(&format!("regions/{}/{}", self.region, resource))
    }

    // =========================================================================
    // Location-based APIs (Cloud Run, VPC Access)
    // =========================================================================

    /// Relative name of a location-scoped resource
    pub fn location_name(&self, collection: &str, name: &str) -> String {
        format!(
            "projects/{}/locations/{}/{}/{}",
            self.project_id, self.region, collection, name
        )
    }

    /// Build a location-scoped API URL for a service
    pub fn location_url(&self, service: &str, collection: &str, name: &str) -> String {
        format!(
            "https://{}.googleapis.com/v1/{}",
            service,
            self.location_name(collection, name)
        )
    }

    // =========================================================================
    // Per-kind helpers
    // =========================================================================

    /// Provider id for a resource of the given kind
    pub fn resource_id(&self, def: &KindDef, name: &str) -> String {
        match (def.scope, def.collection.as_deref()) {
            (Scope::Global, Some(collection)) if def.service == "compute" => {
                format!("projects/{}/global/{}/{}", self.project_id, collection, name)
            }
            (Scope::Regional, Some(collection)) if def.service == "compute" => format!(
                "projects/{}/regions/{}/{}/{}",
                self.project_id, self.region, collection, name
            ),
            (Scope::Regional, Some(collection)) => self.location_name(collection, name),
            _ => name.to_string(),
        }
    }

    /// Self link for a resource of the given kind, if it is addressable
    pub fn self_link(&self, def: &KindDef, name: &str) -> Option<String> {
        let collection = def.collection.as_deref()?;
        let link = match def.scope {
            Scope::Global if def.service == "compute" => {
                self.compute_global_url(&format!("{}/{}", collection, name))
            }
            Scope::Regional if def.service == "compute" => {
                self.compute_regional_url(&format!("{}/{}", collection, name))
            }
            Scope::Regional => self.location_url(&def.service, collection, name),
            Scope::Global | Scope::Local => return None,
        };
        Some(link)
    }

    /// Same project, another region
    pub fn in_region(&self, region: &str) -> Self {
        Self::new(&self.project_id, region)
    }

    /// Id and self link of a compute resource placed in this region rather
    /// than globally, e.g. a regional backend service
    pub fn compute_regional(&self, def: &KindDef, name: &str) -> Option<(String, String)> {
        let collection = def.collection.as_deref().filter(|_| def.service == "compute")?;
        let id = format!(
            "projects/{}/regions/{}/{}/{}",
            self.project_id, self.region, collection, name
        );
        let link = self.compute_regional_url(&format!("{}/{}", collection, name));
        Some((id, link))
    }

    /// Public URL a Cloud Run service is served at
    pub fn run_service_url(&self, name: &str) -> String {
        format!(
            "https://{}-{}.{}.run.app",
            name,
            short_hash(&self.project_id),
            region_code(&self.region)
        )
    }
}

/// Short region code used in run.app hostnames (us-central1 -> uc)
fn region_code(region: &str) -> String {
    let mut parts = region.split('-');
    let area = parts.next().unwrap_or(region);
    let direction = parts.next().unwrap_or("");
    let mut code = String::new();
    code.extend(area.chars().next());
    code.extend(direction.chars().next());
    if code.is_empty() {
        region.to_string()
    } else {
        code
    }
}

/// FNV-1a; stable across runs and platforms
pub(crate) fn fnv1a(input: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in input.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

/// Stable 10-character hash of a string, lowercase base36
pub(crate) fn short_hash(input: &str) -> String {
    let mut hash = fnv1a(input);

    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = String::with_capacity(10);
    for _ in 0..10 {
        out.push(ALPHABET[(hash % 36) as usize] as char);
        hash /= 36;
    }
    out
}
