//! Deciding between a cached volume and a fresh fetch
//!
//! A fetch source answers two questions for one resource instance on one
//! worker: is the resource already there (`find`), and if not, produce it
//! (`create`). `create` always re-checks the cache first, so calling it again
//! after a successful fetch does not run the `in` script twice.

use crate::atc::{Tags, TeamId};
use crate::db::{ContainerMetadata, ResourceCacheFactory};
use crate::error::{ResfetchError, ResfetchResult};
use crate::resource::container_resource::ContainerResource;
use crate::resource::instance::ResourceInstance;
use crate::resource::metadata::ResourceMetadata;
use crate::resource::{resources_dir, VersionedSource};
use crate::runtime::{IoConfig, Resource};
use crate::worker::{BindMountSource, ContainerSpec, ImageFetchingDelegate, ImageSpec, Worker};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Name of the output mount a get writes into
pub const RESOURCE_OUTPUT: &str = "resource";

#[async_trait]
pub trait FetchSource: Send + Sync {
    /// The already initialized result on this worker, if any
    ///
    /// Never creates containers.
    async fn find(&self) -> ResfetchResult<Option<VersionedSource>>;

    /// Produce the result, reusing a cached one when present
    async fn create(&self, ctx: &CancellationToken) -> ResfetchResult<VersionedSource>;
}

/// Step-level context shared by every fetch of a build step
#[derive(Debug, Clone, Default)]
pub struct FetchSession {
    pub team_id: TeamId,
    pub tags: Tags,
    pub container_metadata: ContainerMetadata,
    pub resource_metadata: ResourceMetadata,
}

async fn find_initialized(
    instance: &dyn ResourceInstance,
    worker: &dyn Worker,
    caches: &dyn ResourceCacheFactory,
) -> ResfetchResult<Option<VersionedSource>> {
    let Some(volume) = instance.find_on(worker).await? else {
        return Ok(None);
    };

    let cache = instance.resource_cache().await?;
    let metadata = caches.resource_cache_metadata(&cache).await?;
    Ok(Some(VersionedSource::get(
        instance.version().clone(),
        metadata,
        volume,
    )))
}

/// Fetches by running the resource's `in` script on the worker
pub struct ResourceInstanceFetchSource {
    instance: Arc<dyn ResourceInstance>,
    worker: Arc<dyn Worker>,
    session: FetchSession,
    delegate: Arc<dyn ImageFetchingDelegate>,
    caches: Arc<dyn ResourceCacheFactory>,
}

impl ResourceInstanceFetchSource {
    pub fn new(
        instance: Arc<dyn ResourceInstance>,
        worker: Arc<dyn Worker>,
        session: FetchSession,
        delegate: Arc<dyn ImageFetchingDelegate>,
        caches: Arc<dyn ResourceCacheFactory>,
    ) -> Self {
        Self {
            instance,
            worker,
            session,
            delegate,
            caches,
        }
    }

    fn container_spec(&self) -> ContainerSpec {
        ContainerSpec {
            team_id: self.session.team_id,
            tags: self.session.tags.clone(),
            image_spec: ImageSpec::for_resource_type(self.instance.resource_type().as_str()),
            bind_mounts: vec![BindMountSource::Certs],
            outputs: BTreeMap::from([(RESOURCE_OUTPUT.to_string(), resources_dir("get"))]),
            ..Default::default()
        }
    }
}

#[async_trait]
impl FetchSource for ResourceInstanceFetchSource {
    async fn find(&self) -> ResfetchResult<Option<VersionedSource>> {
        find_initialized(
            self.instance.as_ref(),
            self.worker.as_ref(),
            self.caches.as_ref(),
        )
        .await
    }

    async fn create(&self, ctx: &CancellationToken) -> ResfetchResult<VersionedSource> {
        if let Some(source) = self.find().await? {
            debug!(worker = self.worker.name(), "Found initialized volume");
            return Ok(source);
        }

        if ctx.is_cancelled() {
            return Err(ResfetchError::Cancelled);
        }

        let owner = self.instance.container_owner();
        let container = self
            .worker
            .find_or_create_container(
                ctx,
                Arc::clone(&self.delegate),
                owner,
                &self.session.container_metadata,
                &self.container_spec(),
                self.instance.resource_types(),
            )
            .await?;

        // Mounts exist as soon as the container does; resolve before running.
        let get_dir = resources_dir("get");
        let volume = container
            .volume_mounts()
            .into_iter()
            .find(|mount| mount.mount_path == get_dir)
            .map(|mount| mount.volume)
            .ok_or_else(|| ResfetchError::MissingOutputVolume(get_dir.clone()))?;

        let resource = ContainerResource::new(
            Arc::clone(&container),
            self.session.resource_metadata.env(),
        );
        let fetched = resource
            .get(
                ctx,
                Arc::clone(&volume),
                &IoConfig {
                    stdout: self.delegate.stdout(),
                    stderr: self.delegate.stderr(),
                },
                self.instance.source(),
                self.instance.params(),
                self.instance.version(),
            )
            .await?;

        let cache = self.instance.resource_cache().await?;
        volume.initialize_resource_cache(&cache).await?;
        self.caches
            .update_resource_cache_metadata(&cache, fetched.metadata())
            .await?;

        info!(
            worker = self.worker.name(),
            cache_id = cache.id,
            volume = volume.handle(),
            "Initialized resource cache"
        );
        Ok(VersionedSource::get(
            self.instance.version().clone(),
            fetched.metadata().to_vec(),
            volume,
        ))
    }
}

/// Only serves what the worker already has cached
///
/// Used when the worker cannot run the resource type.
pub struct CachedFetchSource {
    instance: Arc<dyn ResourceInstance>,
    worker: Arc<dyn Worker>,
    caches: Arc<dyn ResourceCacheFactory>,
}

impl CachedFetchSource {
    pub fn new(
        instance: Arc<dyn ResourceInstance>,
        worker: Arc<dyn Worker>,
        caches: Arc<dyn ResourceCacheFactory>,
    ) -> Self {
        Self {
            instance,
            worker,
            caches,
        }
    }
}

#[async_trait]
impl FetchSource for CachedFetchSource {
    async fn find(&self) -> ResfetchResult<Option<VersionedSource>> {
        find_initialized(
            self.instance.as_ref(),
            self.worker.as_ref(),
            self.caches.as_ref(),
        )
        .await
    }

    async fn create(&self, _ctx: &CancellationToken) -> ResfetchResult<VersionedSource> {
        self.find()
            .await?
            .ok_or_else(|| ResfetchError::ResourceTypeUnsupported {
                worker: self.worker.name().to_string(),
                resource_type: self.instance.resource_type().to_string(),
            })
    }
}

/// The fetch strategies a worker can offer
pub enum FetchSources {
    Container(ResourceInstanceFetchSource),
    CacheOnly(CachedFetchSource),
}

#[async_trait]
impl FetchSource for FetchSources {
    async fn find(&self) -> ResfetchResult<Option<VersionedSource>> {
        match self {
            Self::Container(source) => source.find().await,
            Self::CacheOnly(source) => source.find().await,
        }
    }

    async fn create(&self, ctx: &CancellationToken) -> ResfetchResult<VersionedSource> {
        match self {
            Self::Container(source) => source.create(ctx).await,
            Self::CacheOnly(source) => source.create(ctx).await,
        }
    }
}

/// Picks a fetch strategy for a resource instance on a worker
pub struct FetchSourceFactory {
    caches: Arc<dyn ResourceCacheFactory>,
}

impl FetchSourceFactory {
    pub fn new(caches: Arc<dyn ResourceCacheFactory>) -> Self {
        Self { caches }
    }

    pub fn new_fetch_source(
        &self,
        instance: Arc<dyn ResourceInstance>,
        worker: Arc<dyn Worker>,
        session: FetchSession,
        delegate: Arc<dyn ImageFetchingDelegate>,
    ) -> FetchSources {
        let supported = worker.supports_resource_type(
            instance.resource_type().as_str(),
            instance.resource_types(),
        );

        if supported {
            FetchSources::Container(ResourceInstanceFetchSource::new(
                instance,
                worker,
                session,
                delegate,
                Arc::clone(&self.caches),
            ))
        } else {
            debug!(
                worker = worker.name(),
                resource_type = %instance.resource_type(),
                "Worker cannot run resource type, serving from cache only"
            );
            FetchSources::CacheOnly(CachedFetchSource::new(
                instance,
                worker,
                Arc::clone(&self.caches),
            ))
        }
    }
}

/// Return the cached result or fetch it
pub async fn fetch<S: FetchSource + ?Sized>(
    ctx: &CancellationToken,
    source: &S,
) -> ResfetchResult<VersionedSource> {
    if let Some(found) = source.find().await? {
        info!(handle = found.handle(), "Resource cache hit");
        return Ok(found);
    }

    info!("Resource cache miss, fetching");
    source.create(ctx).await
}
