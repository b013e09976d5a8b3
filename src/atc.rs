//! Shared value types for pipelines, resources and tasks
//!
//! These mirror the pipeline configuration vocabulary: sources, versions,
//! params, custom resource types and task configs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A resource version, e.g. `{"ref": "abc123"}`
///
/// Ordered so its JSON form is canonical.
pub type Version = BTreeMap<String, String>;

/// Resource source configuration
pub type Source = BTreeMap<String, serde_json::Value>;

/// Resource get/put params
pub type Params = BTreeMap<String, serde_json::Value>;

/// Team that owns a build or resource
pub type TeamId = i64;

/// Worker tags a step is constrained to
pub type Tags = Vec<String>;

/// Identifier of a step within a build plan
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(pub String);

impl PlanId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A name/value pair emitted by a resource script
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetadataField {
    pub name: String,
    pub value: String,
}

impl MetadataField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A custom resource type declared by a pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceTypeConfig {
    /// Name resources refer to in their `type` field
    pub name: String,

    /// Type of the resource providing this type's image
    #[serde(rename = "type")]
    pub type_: String,

    /// Source of the image resource
    pub source: Source,

    /// Run containers of this type privileged
    pub privileged: bool,

    /// Worker tags for the image fetch
    pub tags: Tags,
}

/// A custom resource type pinned to the version of its image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionedResourceType {
    #[serde(flatten)]
    pub resource_type: ResourceTypeConfig,

    #[serde(default)]
    pub version: Version,
}

/// The set of custom resource types visible to a step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionedResourceTypes(Vec<VersionedResourceType>);

impl VersionedResourceTypes {
    pub fn new(types: Vec<VersionedResourceType>) -> Self {
        Self(types)
    }

    /// Find a custom type by name
    pub fn lookup(&self, name: &str) -> Option<&VersionedResourceType> {
        self.0.iter().find(|t| t.resource_type.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VersionedResourceType> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// What a task runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskRunConfig {
    pub path: String,
    pub args: Vec<String>,
    pub dir: Option<String>,
    pub user: Option<String>,
}

/// An input directory a task expects
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskInputConfig {
    pub name: String,
    pub path: Option<String>,
    pub optional: bool,
}

/// An output directory a task produces
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskOutputConfig {
    pub name: String,
    pub path: Option<String>,
}

impl TaskOutputConfig {
    /// Path relative to the task's working directory
    pub fn resolved_path(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.name)
    }
}

/// A build task definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub platform: String,

    /// Image reference to run the task in
    pub image: Option<String>,

    pub run: TaskRunConfig,

    /// Environment for the task process
    pub params: BTreeMap<String, String>,

    pub inputs: Vec<TaskInputConfig>,

    pub outputs: Vec<TaskOutputConfig>,
}
