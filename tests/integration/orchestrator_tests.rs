//! Task orchestration against in-memory workers

use crate::fakes::{FakeContainer, FakeWorker, RecordingDelegate};
use resfetch::atc::{PlanId, TaskConfig, TaskRunConfig, VersionedResourceTypes};
use resfetch::db::{ContainerMetadata, ContainerOwner, ContainerType};
use resfetch::runtime::{
    task_container_spec, ContainerTask, ExitStatus, IoConfig, Orchestrator, Task,
    WorkerOrchestrator, EXIT_STATUS_PROPERTY, TASK_PROCESS_ID, TASK_WORKING_DIR,
};
use resfetch::worker::OutputBuffer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn config() -> TaskConfig {
    TaskConfig {
        platform: "linux".to_string(),
        image: Some("alpine:3.20".to_string()),
        run: TaskRunConfig {
            path: "echo".to_string(),
            args: vec!["hello".to_string()],
            ..Default::default()
        },
        ..Default::default()
    }
}

fn owner() -> ContainerOwner {
    ContainerOwner::build_step(7, PlanId::new("task-plan"), 1)
}

struct Fixture {
    container: Arc<FakeContainer>,
    worker: Arc<FakeWorker>,
    delegate: Arc<RecordingDelegate>,
}

impl Fixture {
    fn new() -> Self {
        let container = FakeContainer::new();
        Self {
            worker: FakeWorker::new(container.clone()),
            container,
            delegate: Arc::new(RecordingDelegate::default()),
        }
    }

    fn task(&self) -> ContainerTask {
        let config = config();
        ContainerTask::new(
            Arc::new(WorkerOrchestrator::new(self.worker.clone())),
            self.delegate.clone(),
            owner(),
            ContainerMetadata {
                type_: Some(ContainerType::Task),
                ..Default::default()
            },
            task_container_spec(1, vec![], &config, TASK_WORKING_DIR),
            VersionedResourceTypes::default(),
        )
    }
}

#[tokio::test]
async fn task_result_is_delivered_once() {
    let fixture = Fixture::new();
    let stdout = OutputBuffer::new();
    fixture.container.set_stdout(b"hello\n");
    let io = IoConfig {
        stdout: Some(Arc::new(stdout.clone())),
        stderr: None,
    };

    let handle = fixture
        .task()
        .run(&CancellationToken::new(), io, &config())
        .await
        .unwrap();

    let result = handle.result.await.unwrap().unwrap();
    assert_eq!(result, ExitStatus(0));
    assert_eq!(stdout.to_string_lossy(), "hello\n");
    assert_eq!(
        fixture.delegate.events(),
        vec!["initializing", "starting", "finished:0"]
    );
}

#[tokio::test]
async fn task_runs_in_owner_container() {
    let fixture = Fixture::new();

    let handle = fixture
        .task()
        .run(&CancellationToken::new(), IoConfig::default(), &config())
        .await
        .unwrap();
    handle.result.await.unwrap().unwrap();

    let calls = fixture.worker.create_calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].owner, owner());
    assert_eq!(calls[0].spec.dir.as_deref(), Some(TASK_WORKING_DIR));

    let runs = fixture.container.run_calls.lock().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, TASK_PROCESS_ID);
    assert_eq!(runs[0].path, "echo");
    assert_eq!(runs[0].args, vec!["hello"]);
}

#[tokio::test]
async fn mounts_are_available_before_completion() {
    let fixture = Fixture::new();
    fixture.container.hang.store(true, Ordering::SeqCst);
    let ctx = CancellationToken::new();

    let handle = fixture
        .task()
        .run(&ctx, IoConfig::default(), &config())
        .await
        .unwrap();

    assert_eq!(handle.volume_mounts.len(), 1);
    assert_eq!(handle.volume_mounts[0].volume.handle(), "fake-output-volume");
    ctx.cancel();
}

#[tokio::test]
async fn exit_status_is_recorded() {
    let fixture = Fixture::new();
    *fixture.container.exit_status.lock().unwrap() = 3;

    let handle = fixture
        .task()
        .run(&CancellationToken::new(), IoConfig::default(), &config())
        .await
        .unwrap();

    assert_eq!(handle.result.await.unwrap().unwrap(), ExitStatus(3));
    let properties = fixture.container.properties.lock().unwrap();
    assert_eq!(
        properties.get(EXIT_STATUS_PROPERTY).map(String::as_str),
        Some("3")
    );
}

#[tokio::test]
async fn recorded_exit_status_skips_the_run() {
    let fixture = Fixture::new();
    fixture
        .container
        .properties
        .lock()
        .unwrap()
        .insert(EXIT_STATUS_PROPERTY.to_string(), "2".to_string());

    let handle = fixture
        .task()
        .run(&CancellationToken::new(), IoConfig::default(), &config())
        .await
        .unwrap();

    assert_eq!(handle.result.await.unwrap().unwrap(), ExitStatus(2));
    assert_eq!(fixture.container.run_count(), 0);
    assert_eq!(
        fixture.delegate.events(),
        vec!["initializing", "finished:2"]
    );
}

#[tokio::test]
async fn running_task_is_attached() {
    let fixture = Fixture::new();
    fixture.container.attachable.store(true, Ordering::SeqCst);

    let handle = fixture
        .task()
        .run(&CancellationToken::new(), IoConfig::default(), &config())
        .await
        .unwrap();

    assert_eq!(handle.result.await.unwrap().unwrap(), ExitStatus(0));
    assert_eq!(fixture.container.attach_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.container.run_count(), 0);
    assert_eq!(
        fixture.delegate.events(),
        vec!["initializing", "finished:0"]
    );
}

#[tokio::test]
async fn run_error_fails_the_step() {
    let fixture = Fixture::new();
    *fixture.container.run_error.lock().unwrap() = Some("no such binary".to_string());

    let err = fixture
        .task()
        .run(&CancellationToken::new(), IoConfig::default(), &config())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("no such binary"));
    assert_eq!(fixture.delegate.events(), vec!["initializing"]);
}

#[tokio::test]
async fn cancellation_delivers_cancelled() {
    let fixture = Fixture::new();
    fixture.container.hang.store(true, Ordering::SeqCst);
    let ctx = CancellationToken::new();

    let handle = fixture
        .task()
        .run(&ctx, IoConfig::default(), &config())
        .await
        .unwrap();
    ctx.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), handle.result)
        .await
        .expect("task did not observe cancellation")
        .unwrap();

    assert!(matches!(result, Err(ref e) if e.is_cancelled()));
    assert!(fixture.container.killed.load(Ordering::SeqCst));
    assert!(!fixture
        .container
        .properties
        .lock()
        .unwrap()
        .contains_key(EXIT_STATUS_PROPERTY));
    assert_eq!(
        fixture.delegate.events(),
        vec!["initializing", "starting"]
    );
}

#[tokio::test]
async fn orchestrator_passes_delegate_to_worker() {
    let fixture = Fixture::new();
    let orchestrator = WorkerOrchestrator::new(fixture.worker.clone());
    let config = config();

    let handle = orchestrator
        .run_task(
            &CancellationToken::new(),
            fixture.delegate.clone(),
            &owner(),
            &ContainerMetadata::default(),
            &task_container_spec(1, vec![], &config, TASK_WORKING_DIR),
            &VersionedResourceTypes::default(),
            IoConfig::default(),
            &config,
        )
        .await
        .unwrap();
    handle.result.await.unwrap().unwrap();

    let calls = fixture.worker.create_calls.lock().unwrap();
    assert!(crate::fakes::same_object(&calls[0].delegate, &fixture.delegate));
}
