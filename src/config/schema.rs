//! Configuration schema for resfetch
//!
//! Configuration is stored at `~/.config/resfetch/config.toml`

use crate::atc::{Tags, TeamId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Local worker settings
    pub worker: WorkerConfig,

    /// Metadata store settings
    pub store: StoreConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Podman worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker name, also used to name its state file
    pub name: String,

    /// Podman binary to invoke
    pub podman: String,

    /// Restrict the worker to one team
    pub team_id: Option<TeamId>,

    /// Tags steps must request to run here
    pub tags: Tags,

    /// Host CA certificates mounted into resource containers
    pub certs_dir: Option<PathBuf>,

    /// Base resource type to image reference
    pub resource_types: BTreeMap<String, String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let resource_types = ["git", "time", "registry-image", "s3"]
            .into_iter()
            .map(|name| {
                (
                    name.to_string(),
                    format!("docker.io/concourse/{}-resource", name),
                )
            })
            .collect();

        Self {
            name: "local".to_string(),
            podman: "podman".to_string(),
            team_id: None,
            tags: vec![],
            certs_dir: Some(PathBuf::from("/etc/ssl/certs")),
            resource_types,
        }
    }
}

/// Metadata store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store file; defaults to `caches.json` in the state directory
    pub path: Option<PathBuf>,
}
