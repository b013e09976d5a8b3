//! Container and process specifications

use crate::atc::{Tags, TeamId};
use std::collections::BTreeMap;

/// Where certificates are mounted inside every resource container
pub const CERTS_MOUNT_PATH: &str = "/etc/ssl/certs";

/// Image a container runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSpec {
    /// Resource type whose image to use (base or custom)
    pub resource_type: Option<String>,
    /// Explicit image reference
    pub image_url: Option<String>,
    pub privileged: bool,
}

impl ImageSpec {
    pub fn for_resource_type(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: Some(resource_type.into()),
            ..Default::default()
        }
    }

    pub fn for_image(image_url: impl Into<String>) -> Self {
        Self {
            image_url: Some(image_url.into()),
            ..Default::default()
        }
    }
}

/// A host path bind-mounted into a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindMountSource {
    /// The worker's CA certificates, read-only at [`CERTS_MOUNT_PATH`]
    Certs,
    Host {
        host_path: String,
        container_path: String,
        readonly: bool,
    },
}

/// Everything a worker needs to create a container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub team_id: TeamId,
    pub tags: Tags,
    pub image_spec: ImageSpec,
    pub bind_mounts: Vec<BindMountSource>,
    /// Output name to mount path; each gets a fresh volume
    pub outputs: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
    pub dir: Option<String>,
    pub user: Option<String>,
}

/// A process to run inside a container
///
/// The id is chosen by the caller and must be deterministic for the logical
/// operation, so a retry can attach to the process a previous attempt started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSpec {
    pub id: String,
    pub path: String,
    pub args: Vec<String>,
    pub dir: Option<String>,
    pub env: BTreeMap<String, String>,
    pub user: Option<String>,
}
