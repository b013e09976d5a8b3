//! Worker, container and volume abstraction
//!
//! The fetch and task paths only talk to these traits. The Podman backend
//! implements them for a single local worker; tests use in-memory fakes.

use crate::atc::VersionedResourceTypes;
use crate::db::{ContainerMetadata, ContainerOwner, UsedResourceCache};
use crate::error::{ResfetchError, ResfetchResult};
use crate::worker::io::{OutputSink, ProcessIo};
use crate::worker::spec::{ContainerSpec, ProcessSpec};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Callbacks fired while a container's image is being prepared
pub trait ImageFetchingDelegate: Send + Sync {
    /// Where image fetch output goes
    fn stdout(&self) -> Option<Arc<dyn OutputSink>> {
        None
    }

    fn stderr(&self) -> Option<Arc<dyn OutputSink>> {
        None
    }

    /// The image reference the container will run
    fn image_version_determined(&self, _image: &str) -> ResfetchResult<()> {
        Ok(())
    }
}

/// Delegate that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingImageFetchingDelegate;

impl ImageFetchingDelegate for LoggingImageFetchingDelegate {
    fn image_version_determined(&self, image: &str) -> ResfetchResult<()> {
        info!("Using image {}", image);
        Ok(())
    }
}

/// Worker-local storage
#[async_trait]
pub trait Volume: Send + Sync + fmt::Debug {
    fn handle(&self) -> &str;

    /// Commit this volume as the worker's copy of a resource cache
    ///
    /// Repeating the call with the same cache is a no-op. A volume already
    /// committed to a different cache must be rejected.
    async fn initialize_resource_cache(&self, cache: &UsedResourceCache) -> ResfetchResult<()>;
}

/// A volume and where it is mounted in a container
#[derive(Clone)]
pub struct VolumeMount {
    pub volume: Arc<dyn Volume>,
    pub mount_path: String,
}

impl fmt::Debug for VolumeMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeMount")
            .field("volume", &self.volume.handle())
            .field("mount_path", &self.mount_path)
            .finish()
    }
}

impl PartialEq for VolumeMount {
    fn eq(&self, other: &Self) -> bool {
        self.volume.handle() == other.volume.handle() && self.mount_path == other.mount_path
    }
}

/// A running or finished process in a container
#[async_trait]
pub trait Process: Send {
    fn id(&self) -> &str;

    /// Wait for the exit status
    async fn wait(&mut self) -> ResfetchResult<i32>;

    /// Terminate the process
    async fn kill(&mut self) -> ResfetchResult<()>;
}

/// A container on a worker
#[async_trait]
pub trait Container: Send + Sync {
    fn handle(&self) -> &str;

    /// Start a process
    async fn run(&self, spec: ProcessSpec, io: ProcessIo) -> ResfetchResult<Box<dyn Process>>;

    /// Reconnect to a process started earlier with the same id
    ///
    /// Fails with [`crate::error::ResfetchError::ProcessNotFound`] when no
    /// such process exists.
    async fn attach(&self, process_id: &str, io: ProcessIo) -> ResfetchResult<Box<dyn Process>>;

    /// Volumes mounted into the container, available as soon as it exists
    fn volume_mounts(&self) -> Vec<VolumeMount>;

    async fn property(&self, name: &str) -> ResfetchResult<Option<String>>;

    async fn set_property(&self, name: &str, value: &str) -> ResfetchResult<()>;
}

/// A machine that runs containers
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this worker can produce an image for the resource type
    fn supports_resource_type(
        &self,
        resource_type: &str,
        resource_types: &VersionedResourceTypes,
    ) -> bool;

    /// Return the owner's container, creating it only if none exists
    ///
    /// Calls sharing an owner must converge on one container.
    #[allow(clippy::too_many_arguments)]
    async fn find_or_create_container(
        &self,
        ctx: &CancellationToken,
        delegate: Arc<dyn ImageFetchingDelegate>,
        owner: &ContainerOwner,
        metadata: &ContainerMetadata,
        spec: &ContainerSpec,
        resource_types: &VersionedResourceTypes,
    ) -> ResfetchResult<Arc<dyn Container>>;

    /// This worker's volume committed to the cache, if any
    async fn find_volume_for_resource_cache(
        &self,
        cache: &UsedResourceCache,
    ) -> ResfetchResult<Option<Arc<dyn Volume>>>;
}

/// Wait for a process to exit, killing it if `ctx` is cancelled first
pub async fn wait_or_cancel(
    ctx: &CancellationToken,
    process: &mut dyn Process,
) -> ResfetchResult<i32> {
    let waited = tokio::select! {
        status = process.wait() => Some(status),
        _ = ctx.cancelled() => None,
    };

    match waited {
        Some(status) => status,
        None => {
            if let Err(e) = process.kill().await {
                warn!(process_id = process.id(), "Failed to kill cancelled process: {}", e);
            }
            Err(ResfetchError::Cancelled)
        }
    }
}
