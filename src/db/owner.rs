//! Container ownership and labelling
//!
//! An owner is the logical operation a container was created for. Its key is
//! a pure function of the owner fields, so a retried step finds the container
//! its previous attempt created instead of starting a second one.

use crate::atc::{PlanId, TeamId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Prefix of every container name derived from an owner
pub const OWNER_KEY_PREFIX: &str = "resfetch";

/// The logical operation a container belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContainerOwner {
    /// A step of a build plan
    BuildStep {
        build_id: i64,
        plan_id: PlanId,
        team_id: TeamId,
    },
    /// A periodic version check for a resource config
    Check {
        resource_config_id: i64,
        team_id: TeamId,
    },
}

impl ContainerOwner {
    pub fn build_step(build_id: i64, plan_id: PlanId, team_id: TeamId) -> Self {
        Self::BuildStep {
            build_id,
            plan_id,
            team_id,
        }
    }

    pub fn check(resource_config_id: i64, team_id: TeamId) -> Self {
        Self::Check {
            resource_config_id,
            team_id,
        }
    }

    pub fn team_id(&self) -> TeamId {
        match self {
            Self::BuildStep { team_id, .. } | Self::Check { team_id, .. } => *team_id,
        }
    }

    /// Stable key identifying this owner's container on any worker
    pub fn key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_string().as_bytes());
        let digest = hasher.finalize();
        format!("{}-{}", OWNER_KEY_PREFIX, hex::encode(&digest[..12]))
    }
}

impl fmt::Display for ContainerOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuildStep {
                build_id,
                plan_id,
                team_id,
            } => write!(f, "build:{}:plan:{}:team:{}", build_id, plan_id, team_id),
            Self::Check {
                resource_config_id,
                team_id,
            } => write!(f, "check:{}:team:{}", resource_config_id, team_id),
        }
    }
}

/// What a container is being used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerType {
    Check,
    Get,
    Put,
    Task,
}

impl ContainerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::Get => "get",
            Self::Put => "put",
            Self::Task => "task",
        }
    }
}

/// Descriptive labels attached to a container, for display only
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerMetadata {
    #[serde(rename = "type")]
    pub type_: Option<ContainerType>,
    pub step_name: String,
    pub pipeline_name: String,
    pub job_name: String,
    pub build_id: Option<i64>,
    pub build_name: String,
    pub working_directory: String,
    pub user: String,
}

impl ContainerMetadata {
    /// Non-empty fields as label pairs
    pub fn labels(&self) -> Vec<(&'static str, String)> {
        let mut labels = Vec::new();
        if let Some(type_) = self.type_ {
            labels.push(("type", type_.as_str().to_string()));
        }
        for (name, value) in [
            ("step", &self.step_name),
            ("pipeline", &self.pipeline_name),
            ("job", &self.job_name),
            ("build_name", &self.build_name),
        ] {
            if !value.is_empty() {
                labels.push((name, value.clone()));
            }
        }
        if let Some(build_id) = self.build_id {
            labels.push(("build_id", build_id.to_string()));
        }
        labels
    }
}
