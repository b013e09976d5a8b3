//! Step execution: resource and task contracts and the container-backed orchestrator

mod contracts;
mod orchestrator;

pub use contracts::{
    ExitStatus, IoConfig, Orchestrator, Resource, Task, TaskExecutionDelegate, TaskHandle,
    TaskResult,
};
pub use orchestrator::{
    task_container_spec, ContainerTask, WorkerOrchestrator, EXIT_STATUS_PROPERTY,
    TASK_PROCESS_ID, TASK_WORKING_DIR,
};
