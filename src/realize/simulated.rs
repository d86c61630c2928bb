//! Simulated provider
//!
//! Fabricates the outputs a real engine would report, without touching any
//! cloud API. Used by the CLI `apply` command and by tests. Failures can be
//! injected per resource name.

use super::{Provider, RealizeRequest};
use crate::resource::links::{fnv1a, short_hash};
use crate::resource::{get_kind, ResourceLinks};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

const DEFAULT_RANDOM_LENGTH: usize = 8;

pub struct SimulatedProvider {
    links: ResourceLinks,
    failures: HashSet<String>,
    latency: Duration,
    next_address: AtomicU32,
    calls: Mutex<Vec<String>>,
}

impl SimulatedProvider {
    pub fn new(project_id: &str, region: &str) -> Self {
        Self {
            links: ResourceLinks::new(project_id, region),
            failures: HashSet::new(),
            latency: Duration::ZERO,
            next_address: AtomicU32::new(1),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail every call for the named resources
    pub fn with_failures<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failures.extend(names.into_iter().map(Into::into));
        self
    }

    /// Sleep before answering each call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Names of resources realized so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn outputs(&self, request: &RealizeRequest) -> Result<Value> {
        let def = get_kind(&request.kind)
            .with_context(|| format!("no provider for kind '{}'", request.kind))?;
        let name = request.name.as_str();
        let inputs = request.inputs.as_object().cloned().unwrap_or_default();

        // Engines report inputs back alongside computed outputs
        let mut out: Map<String, Value> = inputs.clone();
        // A `region` input moves a compute resource out of the global scope
        let (id, link) = match str_input(&inputs, "region")
            .and_then(|region| self.links.in_region(region).compute_regional(def, name))
        {
            Some((id, link)) => (id, Some(link)),
            None => (self.links.resource_id(def, name), self.links.self_link(def, name)),
        };
        out.insert("id".into(), json!(id));
        out.insert("name".into(), json!(name));
        if let Some(link) = link {
            out.insert("selfLink".into(), json!(link));
        }

        match request.kind.as_str() {
            "network" => {
                out.insert("gatewayIpv4".into(), json!("10.128.0.1"));
            }
            "vpc-connector" => {
                out.insert("state".into(), json!("READY"));
            }
            "serverless-service" => {
                let location = str_input(&inputs, "location").unwrap_or(&self.links.region);
                out.insert("location".into(), json!(location));
                out.insert("project".into(), json!(self.links.project_id));
                out.insert(
                    "statuses".into(),
                    json!([{
                        "url": self.links.run_service_url(name),
                        "latestReadyRevisionName": format!("{}-00001", name),
                    }]),
                );
            }
            "health-check" => {
                out.insert("type".into(), json!("HTTP"));
            }
            "backend-service" | "url-map" => {
                out.insert("fingerprint".into(), json!(short_hash(&format!("{}/{}", request.kind, name))));
            }
            "iam-binding" => {
                let service = str_input(&inputs, "service").context("iam-binding needs a service")?;
                let role = str_input(&inputs, "role").context("iam-binding needs a role")?;
                let member = str_input(&inputs, "member").context("iam-binding needs a member")?;
                let id = format!(
                    "v1/{}/{} {}",
                    self.links.location_name("services", service),
                    role,
                    member
                );
                out.insert("etag".into(), json!(etag(&id)));
                out.insert("id".into(), json!(id));
            }
            "random-string" => {
                let length = inputs
                    .get("length")
                    .and_then(Value::as_u64)
                    .map(|l| l as usize)
                    .unwrap_or(DEFAULT_RANDOM_LENGTH);
                let charset = RandomCharset {
                    upper: bool_input(&inputs, "upper"),
                    number: bool_input(&inputs, "number"),
                    special: bool_input(&inputs, "special"),
                };
                let result = random_suffix(name, length, charset);
                out.insert("id".into(), json!(result));
                out.insert("result".into(), json!(result));
            }
            "global-address" => {
                let n = self.next_address.fetch_add(1, Ordering::Relaxed);
                out.insert("address".into(), json!(format!("34.120.{}.{}", n / 256, n % 256)));
            }
            "access-policy" => {
                let backend = str_input(&inputs, "webBackendService")
                    .context("access-policy needs a webBackendService")?;
                let policy = str_input(&inputs, "policyData").unwrap_or_default();
                out.insert("id".into(), json!(backend));
                out.insert("etag".into(), json!(etag(policy)));
            }
            _ => {}
        }

        Ok(Value::Object(out))
    }
}

#[async_trait]
impl Provider for SimulatedProvider {
    async fn realize(&self, request: &RealizeRequest) -> Result<Value> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.name.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.failures.contains(&request.name) {
            bail!("simulated failure creating {} '{}'", request.kind, request.name);
        }

        let outputs = self.outputs(request)?;
        tracing::debug!("simulated {} '{}'", request.kind, request.name);
        Ok(outputs)
    }
}

fn str_input<'a>(inputs: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    inputs.get(key).and_then(Value::as_str)
}

fn etag(seed: &str) -> String {
    format!("BwY{}", short_hash(seed))
}

/// Character classes of a simulated random string; lowercase is always in
struct RandomCharset {
    upper: bool,
    number: bool,
    special: bool,
}

const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const SPECIAL: &str = "!@#$%&*()-_=+[]{}<>:?";

/// Boolean input; the random provider enables every class unless told not to
fn bool_input(inputs: &Map<String, Value>, key: &str) -> bool {
    inputs.get(key).and_then(Value::as_bool).unwrap_or(true)
}

/// Deterministic stand-in for a random string: the same resource name
/// always yields the same result
fn random_suffix(name: &str, length: usize, charset: RandomCharset) -> String {
    let mut alphabet = String::from(LOWER);
    if charset.upper {
        alphabet.push_str(UPPER);
    }
    if charset.number {
        alphabet.push_str(DIGITS);
    }
    if charset.special {
        alphabet.push_str(SPECIAL);
    }
    let alphabet = alphabet.as_bytes();

    (0..length)
        .map(|i| {
            let pick = fnv1a(&format!("{}:{}", name, i)) % alphabet.len() as u64;
            alphabet[pick as usize] as char
        })
        .collect()
}
