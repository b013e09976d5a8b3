//! Concrete, fully parameterized resource occurrences

use crate::atc::{Params, Source, Version, VersionedResourceTypes};
use crate::db::{ContainerOwner, ResourceCacheDescriptor, ResourceCacheFactory, UsedResourceCache};
use crate::error::ResfetchResult;
use crate::resource::ResourceType;
use crate::worker::{Volume, Worker};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// A resource at a version, as one step needs it
///
/// Instances only locate or create the cache record; they never own a
/// container or a volume.
#[async_trait]
pub trait ResourceInstance: Send + Sync {
    fn resource_type(&self) -> &ResourceType;

    fn version(&self) -> &Version;

    fn source(&self) -> &Source;

    fn params(&self) -> &Params;

    fn resource_types(&self) -> &VersionedResourceTypes;

    /// Owner of any container created on this instance's behalf
    fn container_owner(&self) -> &ContainerOwner;

    /// The persisted cache identity
    ///
    /// Repeated calls on one instance yield the same value.
    async fn resource_cache(&self) -> ResfetchResult<UsedResourceCache>;

    /// The worker's volume initialized for this instance's cache, if any
    async fn find_on(&self, worker: &dyn Worker) -> ResfetchResult<Option<Arc<dyn Volume>>>;
}

/// Instance backed by a [`ResourceCacheFactory`]
pub struct StoreResourceInstance {
    resource_type: ResourceType,
    version: Version,
    source: Source,
    params: Params,
    resource_types: VersionedResourceTypes,
    owner: ContainerOwner,
    caches: Arc<dyn ResourceCacheFactory>,
    cache: OnceCell<UsedResourceCache>,
}

impl StoreResourceInstance {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resource_type: ResourceType,
        version: Version,
        source: Source,
        params: Params,
        owner: ContainerOwner,
        resource_types: VersionedResourceTypes,
        caches: Arc<dyn ResourceCacheFactory>,
    ) -> Self {
        Self {
            resource_type,
            version,
            source,
            params,
            resource_types,
            owner,
            caches,
            cache: OnceCell::new(),
        }
    }

    fn descriptor(&self) -> ResourceCacheDescriptor {
        ResourceCacheDescriptor {
            resource_type: self.resource_type.to_string(),
            source: self.source.clone(),
            params: self.params.clone(),
            version: self.version.clone(),
            resource_types: self.resource_types.clone(),
        }
    }
}

#[async_trait]
impl ResourceInstance for StoreResourceInstance {
    fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    fn version(&self) -> &Version {
        &self.version
    }

    fn source(&self) -> &Source {
        &self.source
    }

    fn params(&self) -> &Params {
        &self.params
    }

    fn resource_types(&self) -> &VersionedResourceTypes {
        &self.resource_types
    }

    fn container_owner(&self) -> &ContainerOwner {
        &self.owner
    }

    async fn resource_cache(&self) -> ResfetchResult<UsedResourceCache> {
        let cache = self
            .cache
            .get_or_try_init(|| async {
                let descriptor = self.descriptor();
                self.caches.find_or_create_resource_cache(&descriptor).await
            })
            .await?;
        Ok(cache.clone())
    }

    async fn find_on(&self, worker: &dyn Worker) -> ResfetchResult<Option<Arc<dyn Volume>>> {
        let cache = self.resource_cache().await?;
        worker.find_volume_for_resource_cache(&cache).await
    }
}
