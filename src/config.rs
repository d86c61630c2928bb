//! Configuration Management
//!
//! Persistent configuration for rungate plus the precedence rules that turn
//! CLI flags, environment variables and the config file into the explicit
//! settings passed to stack construction.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_REGION: &str = "us-central1";
pub const DEFAULT_PROJECT: &str = "demo-project";

/// Environment variables consulted for the region, in order
const REGION_ENV_VARS: &[&str] = &["RUNGATE_REGION", "GOOGLE_CLOUD_REGION", "CLOUDSDK_COMPUTE_REGION"];

/// Environment variables consulted for the project, in order
const PROJECT_ENV_VARS: &[&str] = &["RUNGATE_PROJECT", "GOOGLE_CLOUD_PROJECT", "CLOUDSDK_CORE_PROJECT"];

/// Optional resource properties that are left unset unless configured
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct StackOptions {
    /// Backend service protocol, e.g. `HTTP2`
    #[serde(default)]
    pub backend_protocol: Option<String>,
    /// Region for a regional backend service
    #[serde(default)]
    pub backend_region: Option<String>,
    /// Extra request headers the backend service adds
    #[serde(default)]
    pub custom_request_headers: Vec<String>,
    /// Region for a regional address
    #[serde(default)]
    pub address_region: Option<String>,
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Project the stack is declared in
    #[serde(default)]
    pub project_id: Option<String>,
    /// Region for regional resources
    #[serde(default)]
    pub region: Option<String>,
    /// Container image served by Cloud Run
    #[serde(default)]
    pub image: Option<String>,
    /// Principal allowed through IAP
    #[serde(default)]
    pub member: Option<String>,
    #[serde(default)]
    pub stack: StackOptions,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("rungate").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load configuration from a specific file, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;

        Ok(())
    }

    /// Get effective region (CLI > environment > config > default)
    pub fn effective_region(&self, cli: Option<&str>) -> String {
        self.region_with_env(cli, first_env)
    }

    /// Get effective project (CLI > environment > config > default)
    pub fn effective_project(&self, cli: Option<&str>) -> String {
        self.project_with_env(cli, first_env)
    }

    fn region_with_env(&self, cli: Option<&str>, env: impl Fn(&[&str]) -> Option<String>) -> String {
        pick(cli, env(REGION_ENV_VARS), self.region.as_deref(), DEFAULT_REGION)
    }

    fn project_with_env(&self, cli: Option<&str>, env: impl Fn(&[&str]) -> Option<String>) -> String {
        pick(cli, env(PROJECT_ENV_VARS), self.project_id.as_deref(), DEFAULT_PROJECT)
    }
}

/// First non-blank value among CLI flag, environment, config file
fn pick(cli: Option<&str>, env: Option<String>, file: Option<&str>, default: &str) -> String {
    let non_blank = |v: &&str| !v.trim().is_empty();
    cli.filter(non_blank)
        .map(str::to_string)
        .or_else(|| env.filter(|v| !v.trim().is_empty()))
        .or_else(|| file.filter(non_blank).map(str::to_string))
        .unwrap_or_else(|| default.to_string())
}

/// First non-blank value among the given process environment variables
fn first_env(vars: &[&str]) -> Option<String> {
    vars.iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|v| !v.trim().is_empty())
}

/// Resolved settings threaded into stack construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub project_id: String,
    pub region: String,
    pub image: String,
    pub member: String,
    pub options: StackOptions,
}

impl Settings {
    pub const DEFAULT_IMAGE: &'static str = "gcr.io/cloudrun/hello";
    pub const DEFAULT_MEMBER: &'static str = "allAuthenticatedUsers";

    pub fn from_config(config: &Config, project: Option<&str>, region: Option<&str>) -> Self {
        Self {
            project_id: config.effective_project(project),
            region: config.effective_region(region),
            image: config
                .image
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_IMAGE.to_string()),
            member: config
                .member
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_MEMBER.to_string()),
            options: config.stack.clone(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_id: DEFAULT_PROJECT.to_string(),
            region: DEFAULT_REGION.to_string(),
            image: Self::DEFAULT_IMAGE.to_string(),
            member: Self::DEFAULT_MEMBER.to_string(),
            options: StackOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Environment lookup over a fixed map, honoring variable order
    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&[&str]) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |vars: &[&str]| {
            vars.iter()
                .filter_map(|var| map.get(*var).cloned())
                .find(|v| !v.trim().is_empty())
        }
    }

    fn file_config() -> Config {
        Config {
            project_id: Some("file-project".into()),
            region: Some("europe-west1".into()),
            ..Config::default()
        }
    }

    #[test]
    fn test_cli_beats_environment() {
        let env = env_from(&[("RUNGATE_REGION", "asia-east1")]);
        assert_eq!(file_config().region_with_env(Some("us-east1"), env), "us-east1");
    }

    #[test]
    fn test_environment_beats_file() {
        let env = env_from(&[("RUNGATE_REGION", "asia-east1"), ("GOOGLE_CLOUD_PROJECT", "env-project")]);
        assert_eq!(file_config().region_with_env(None, &env), "asia-east1");
        assert_eq!(file_config().project_with_env(None, &env), "env-project");
    }

    #[test]
    fn test_environment_variable_order() {
        let env = env_from(&[
            ("CLOUDSDK_COMPUTE_REGION", "us-west1"),
            ("GOOGLE_CLOUD_REGION", "us-east4"),
            ("RUNGATE_REGION", " "),
        ]);
        assert_eq!(Config::default().region_with_env(None, env), "us-east4");
    }

    #[test]
    fn test_file_beats_default() {
        let env = env_from(&[]);
        assert_eq!(file_config().region_with_env(None, &env), "europe-west1");
        assert_eq!(file_config().project_with_env(Some(""), &env), "file-project");
    }

    #[test]
    fn test_blank_values_fall_through_to_default() {
        let config = Config {
            project_id: Some("  ".into()),
            region: Some("".into()),
            ..Config::default()
        };
        let env = env_from(&[("RUNGATE_PROJECT", "")]);
        assert_eq!(config.project_with_env(Some("  "), &env), DEFAULT_PROJECT);
        assert_eq!(config.region_with_env(None, &env), DEFAULT_REGION);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config {
            project_id: Some("my-project".into()),
            region: Some("europe-west4".into()),
            stack: StackOptions {
                backend_protocol: Some("HTTP2".into()),
                ..StackOptions::default()
            },
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path);
        assert_eq!(loaded.project_id.as_deref(), Some("my-project"));
        assert_eq!(loaded.stack.backend_protocol.as_deref(), Some("HTTP2"));
        assert!(loaded.stack.custom_request_headers.is_empty());
    }

    #[test]
    fn test_malformed_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let loaded = Config::load_from(&path);
        assert!(loaded.region.is_none());
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.region, "us-central1");
        assert_eq!(settings.member, "allAuthenticatedUsers");
        assert_eq!(settings.image, "gcr.io/cloudrun/hello");
    }
}
