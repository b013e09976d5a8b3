//! Container-backed task execution

use crate::atc::{TaskConfig, Tags, TeamId, VersionedResourceTypes};
use crate::db::{ContainerMetadata, ContainerOwner};
use crate::error::{ResfetchError, ResfetchResult};
use crate::runtime::contracts::{
    ExitStatus, IoConfig, Orchestrator, Task, TaskExecutionDelegate, TaskHandle,
};
use crate::worker::{
    wait_or_cancel, ContainerSpec, ImageFetchingDelegate, ImageSpec, ProcessIo, ProcessSpec,
    Worker,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Process id of a task's main process
pub const TASK_PROCESS_ID: &str = "task";

/// Container property recording a finished task's exit status
pub const EXIT_STATUS_PROPERTY: &str = "exit-status";

/// Default working directory of task containers
pub const TASK_WORKING_DIR: &str = "/tmp/build/task";

fn join_path(base: &str, path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), path)
    }
}

/// Container spec for running `config` under `working_dir`
///
/// Each declared output gets its own volume at `<working_dir>/<path>`.
pub fn task_container_spec(
    team_id: TeamId,
    tags: Tags,
    config: &TaskConfig,
    working_dir: &str,
) -> ContainerSpec {
    let image_spec = match &config.image {
        Some(image) => ImageSpec::for_image(image.clone()),
        None => ImageSpec::default(),
    };

    let outputs = config
        .outputs
        .iter()
        .map(|output| {
            (
                output.name.clone(),
                join_path(working_dir, output.resolved_path()),
            )
        })
        .collect::<BTreeMap<_, _>>();

    ContainerSpec {
        team_id,
        tags,
        image_spec,
        outputs,
        env: config.params.clone(),
        dir: Some(working_dir.to_string()),
        ..Default::default()
    }
}

fn task_process_spec(spec: &ContainerSpec, config: &TaskConfig) -> ProcessSpec {
    let dir = match (&spec.dir, &config.run.dir) {
        (Some(base), Some(dir)) => Some(join_path(base, dir)),
        (None, Some(dir)) => Some(dir.clone()),
        (base, None) => base.clone(),
    };

    ProcessSpec {
        id: TASK_PROCESS_ID.to_string(),
        path: config.run.path.clone(),
        args: config.run.args.clone(),
        dir,
        env: config.params.clone(),
        user: config.run.user.clone(),
    }
}

/// Runs tasks in containers on a single worker
pub struct WorkerOrchestrator {
    worker: Arc<dyn Worker>,
}

impl WorkerOrchestrator {
    pub fn new(worker: Arc<dyn Worker>) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl Orchestrator for WorkerOrchestrator {
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
    ) -> ResfetchResult<TaskHandle> {
        delegate.initializing(config);

        let image_delegate: Arc<dyn ImageFetchingDelegate> = delegate.clone();
        let container = self
            .worker
            .find_or_create_container(ctx, image_delegate, owner, metadata, spec, resource_types)
            .await?;
        let volume_mounts = container.volume_mounts();
        let (tx, rx) = oneshot::channel();

        // A previous attempt already ran this task to completion.
        if let Some(recorded) = container.property(EXIT_STATUS_PROPERTY).await? {
            let code = recorded.parse::<i32>().map_err(|e| {
                ResfetchError::Internal(format!("invalid recorded exit status {:?}: {}", recorded, e))
            })?;
            info!(handle = container.handle(), code, "Task already finished");
            delegate.finished(ExitStatus(code));
            let _ = tx.send(Ok(ExitStatus(code)));
            return Ok(TaskHandle {
                result: rx,
                volume_mounts,
            });
        }

        let process_io = ProcessIo {
            stdin: None,
            stdout: io.stdout.clone(),
            stderr: io.stderr.clone(),
        };
        let mut process = match container.attach(TASK_PROCESS_ID, process_io.clone()).await {
            Ok(process) => {
                debug!(handle = container.handle(), "Attached to running task");
                process
            }
            Err(ResfetchError::ProcessNotFound(_)) => {
                let process = container
                    .run(task_process_spec(spec, config), process_io)
                    .await?;
                delegate.starting(config);
                process
            }
            Err(e) => return Err(e),
        };

        let ctx = ctx.clone();
        tokio::spawn(async move {
            let result = match wait_or_cancel(&ctx, process.as_mut()).await {
                Ok(code) => {
                    let status = ExitStatus(code);
                    if let Err(e) = container
                        .set_property(EXIT_STATUS_PROPERTY, &status.to_string())
                        .await
                    {
                        warn!(handle = container.handle(), "Failed to record exit status: {}", e);
                    }
                    delegate.finished(status);
                    Ok(status)
                }
                Err(e) => Err(e),
            };
            let _ = tx.send(result);
        });

        Ok(TaskHandle {
            result: rx,
            volume_mounts,
        })
    }
}

/// A task step bound to an orchestrator and a fixed container identity
pub struct ContainerTask {
    orchestrator: Arc<dyn Orchestrator>,
    delegate: Arc<dyn TaskExecutionDelegate>,
    owner: ContainerOwner,
    metadata: ContainerMetadata,
    spec: ContainerSpec,
    resource_types: VersionedResourceTypes,
}

impl ContainerTask {
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        delegate: Arc<dyn TaskExecutionDelegate>,
        owner: ContainerOwner,
        metadata: ContainerMetadata,
        spec: ContainerSpec,
        resource_types: VersionedResourceTypes,
    ) -> Self {
        Self {
            orchestrator,
            delegate,
            owner,
            metadata,
            spec,
            resource_types,
        }
    }
}

#[async_trait]
impl Task for ContainerTask {
    async fn run(
        &self,
        ctx: &CancellationToken,
        io: IoConfig,
        config: &TaskConfig,
    ) -> ResfetchResult<TaskHandle> {
        self.orchestrator
            .run_task(
                ctx,
                Arc::clone(&self.delegate),
                &self.owner,
                &self.metadata,
                &self.spec,
                &self.resource_types,
                io,
                config,
            )
            .await
    }
}
