//! Execution contracts shared by resource steps and task steps

use crate::atc::{Params, Source, TaskConfig, Version, VersionedResourceTypes};
use crate::db::{ContainerMetadata, ContainerOwner};
use crate::error::{ResfetchError, ResfetchResult};
use crate::resource::VersionedSource;
use crate::worker::{ContainerSpec, ImageFetchingDelegate, OutputSink, Volume, VolumeMount};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Where a step's process output goes
///
/// Tasks stream both channels. Resource scripts answer on stdout, so for
/// them only `stderr` is streamed and `stdout` is ignored.
#[derive(Clone, Default)]
pub struct IoConfig {
    pub stdout: Option<Arc<dyn OutputSink>>,
    pub stderr: Option<Arc<dyn OutputSink>>,
}

impl fmt::Debug for IoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoConfig")
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .finish()
    }
}

/// Exit code of a finished process; zero means success
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExitStatus(pub i32);

impl ExitStatus {
    pub fn success(&self) -> bool {
        self.0 == 0
    }

    pub fn code(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome delivered once per task run
pub type TaskResult = Result<ExitStatus, ResfetchError>;

/// A started task
///
/// The mounts are usable for staging as soon as this is returned; their
/// contents are only complete once `result` resolves. `result` yields exactly
/// one value, or `RecvError` if the run was torn down without one.
#[derive(Debug)]
pub struct TaskHandle {
    pub result: oneshot::Receiver<TaskResult>,
    pub volume_mounts: Vec<VolumeMount>,
}

/// A versioned external artifact reachable through its scripts
#[async_trait]
pub trait Resource: Send + Sync {
    /// Materialize `version` into `volume`
    async fn get(
        &self,
        ctx: &CancellationToken,
        volume: Arc<dyn Volume>,
        io: &IoConfig,
        source: &Source,
        params: &Params,
        version: &Version,
    ) -> ResfetchResult<VersionedSource>;

    /// Publish and return the resulting version
    async fn put(
        &self,
        ctx: &CancellationToken,
        io: &IoConfig,
        source: &Source,
        params: &Params,
    ) -> ResfetchResult<VersionedSource>;

    /// Versions at or after `version`, oldest first
    async fn check(
        &self,
        ctx: &CancellationToken,
        source: &Source,
        version: &Version,
    ) -> ResfetchResult<Vec<Version>>;
}

/// A build task bound to its container
#[async_trait]
pub trait Task: Send + Sync {
    async fn run(
        &self,
        ctx: &CancellationToken,
        io: IoConfig,
        config: &TaskConfig,
    ) -> ResfetchResult<TaskHandle>;
}

/// Lifecycle callbacks for a task step
pub trait TaskExecutionDelegate: ImageFetchingDelegate {
    fn initializing(&self, config: &TaskConfig);
    fn starting(&self, config: &TaskConfig);
    fn finished(&self, status: ExitStatus);
}

/// Runs tasks in containers
#[async_trait]
pub trait Orchestrator: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn run_task(
        &self,
        ctx: &CancellationToken,
        delegate: Arc<dyn TaskExecutionDelegate>,
        owner: &ContainerOwner,
        metadata: &ContainerMetadata,
        spec: &ContainerSpec,
        resource_types: &VersionedResourceTypes,
        io: IoConfig,
        config: &TaskConfig,
    ) -> ResfetchResult<TaskHandle>;
}
