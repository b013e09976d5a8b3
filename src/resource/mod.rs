//! Resource fetching
//!
//! - `instance`: the identity of a resource at a version and its cache row
//! - `fetch_source`: find a cached volume or fetch into a new one
//! - `container_resource`: the check/in/out scripts run in a container
//! - `versioned_source`: the result of a get or put

mod container_resource;
mod fetch_source;
mod instance;
mod metadata;
pub mod script;
mod versioned_source;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use container_resource::ContainerResource;
pub use fetch_source::{
    fetch, CachedFetchSource, FetchSession, FetchSource, FetchSourceFactory, FetchSources,
    ResourceInstanceFetchSource, RESOURCE_OUTPUT,
};
pub use instance::{ResourceInstance, StoreResourceInstance};
pub use metadata::ResourceMetadata;
pub use script::VersionResult;
pub use versioned_source::{SourceStorage, VersionedSource};

/// Name of a resource type, base (`git`) or custom
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceType(String);

impl ResourceType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Directory under which scripts read and write resource contents
pub fn resources_dir(suffix: &str) -> String {
    format!("/tmp/build/{}", suffix)
}
