//! Result of a successful get or put

use crate::atc::{MetadataField, Version};
use crate::worker::{Container, Volume};
use std::fmt;
use std::sync::Arc;

/// Where the fetched bits live
#[derive(Clone)]
pub enum SourceStorage {
    /// A worker volume, for gets
    Volume(Arc<dyn Volume>),
    /// A path inside a container, for puts and inspection-only results
    Container {
        container: Arc<dyn Container>,
        path: String,
    },
}

impl fmt::Debug for SourceStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Volume(volume) => f.debug_tuple("Volume").field(&volume.handle()).finish(),
            Self::Container { container, path } => f
                .debug_struct("Container")
                .field("container", &container.handle())
                .field("path", path)
                .finish(),
        }
    }
}

impl PartialEq for SourceStorage {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Volume(a), Self::Volume(b)) => a.handle() == b.handle(),
            (
                Self::Container {
                    container: a,
                    path: pa,
                },
                Self::Container {
                    container: b,
                    path: pb,
                },
            ) => a.handle() == b.handle() && pa == pb,
            _ => false,
        }
    }
}

/// Immutable version, metadata and storage of a fetched resource
///
/// The storage is only referenced; the worker keeps owning it.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedSource {
    version: Version,
    metadata: Vec<MetadataField>,
    storage: SourceStorage,
}

impl VersionedSource {
    pub fn get(version: Version, metadata: Vec<MetadataField>, volume: Arc<dyn Volume>) -> Self {
        Self {
            version,
            metadata,
            storage: SourceStorage::Volume(volume),
        }
    }

    pub fn put(
        version: Version,
        metadata: Vec<MetadataField>,
        container: Arc<dyn Container>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            version,
            metadata,
            storage: SourceStorage::Container {
                container,
                path: path.into(),
            },
        }
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn metadata(&self) -> &[MetadataField] {
        &self.metadata
    }

    pub fn storage(&self) -> &SourceStorage {
        &self.storage
    }

    /// The backing volume, for get results
    pub fn volume(&self) -> Option<&Arc<dyn Volume>> {
        match &self.storage {
            SourceStorage::Volume(volume) => Some(volume),
            SourceStorage::Container { .. } => None,
        }
    }

    /// Handle of the backing volume or container
    pub fn handle(&self) -> &str {
        match &self.storage {
            SourceStorage::Volume(volume) => volume.handle(),
            SourceStorage::Container { container, .. } => container.handle(),
        }
    }
}
