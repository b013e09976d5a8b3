//! Task command - run a build task in a container

use crate::atc::TaskConfig;
use crate::cli::args::TaskArgs;
use crate::cli::commands::common::{
    build_step_owner, cancel_on_interrupt, container_metadata, open_worker, step_team,
};
use crate::cli::delegate::ConsoleDelegate;
use crate::config::Config;
use crate::db::ContainerType;
use crate::error::{ResfetchError, ResfetchResult};
use crate::runtime::{
    task_container_spec, ContainerTask, IoConfig, Task, WorkerOrchestrator, TASK_WORKING_DIR,
};
use crate::worker::{StderrSink, StdoutSink};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::info;

/// Load a task config; `.json` files are JSON, anything else TOML
pub async fn load_task_config(path: &Path) -> ResfetchResult<TaskConfig> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| ResfetchError::io(format!("reading task config {}", path.display()), e))?;

    let parsed = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&content).map_err(|e| e.to_string())
    } else {
        toml::from_str(&content).map_err(|e| e.to_string())
    };

    let config: TaskConfig = parsed.map_err(|reason| ResfetchError::ConfigInvalid {
        path: path.to_path_buf(),
        reason,
    })?;

    if config.run.path.is_empty() {
        return Err(ResfetchError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: "run.path is required".to_string(),
        });
    }
    Ok(config)
}

/// Execute the task command
///
/// Returns the task's exit code.
pub async fn execute(args: TaskArgs, config: &Config) -> ResfetchResult<i32> {
    let task_config = load_task_config(&args.file).await?;
    let ctx = cancel_on_interrupt();
    let worker = open_worker(config).await?;
    let team_id = step_team(&worker, args.team_id)?;

    let spec = task_container_spec(
        team_id,
        worker.tags().clone(),
        &task_config,
        TASK_WORKING_DIR,
    );
    let task = ContainerTask::new(
        Arc::new(WorkerOrchestrator::new(worker)),
        Arc::new(ConsoleDelegate),
        build_step_owner(&args.step, None, team_id),
        container_metadata(ContainerType::Task, Some(&args.step)),
        spec,
        Default::default(),
    );

    let io = IoConfig {
        stdout: Some(Arc::new(StdoutSink)),
        stderr: Some(Arc::new(StderrSink)),
    };
    let handle = task.run(&ctx, io, &task_config).await?;
    for mount in &handle.volume_mounts {
        info!(volume = mount.volume.handle(), path = %mount.mount_path, "Output mounted");
    }

    let status = handle
        .result
        .await
        .map_err(|_| ResfetchError::Internal("task ended without a result".to_string()))??;
    Ok(status.code())
}
