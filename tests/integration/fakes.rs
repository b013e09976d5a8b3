//! In-memory worker, container and store doubles that count their calls

use async_trait::async_trait;
use resfetch::atc::{MetadataField, Params, Source, TaskConfig, Version, VersionedResourceTypes};
use resfetch::db::{
    ContainerMetadata, ContainerOwner, ResourceCacheDescriptor, ResourceCacheFactory,
    UsedResourceCache,
};
use resfetch::resource::{resources_dir, ResourceInstance, ResourceType};
use resfetch::runtime::{ExitStatus, TaskExecutionDelegate};
use resfetch::worker::{
    Container, ContainerSpec, ImageFetchingDelegate, Process, ProcessIo, ProcessSpec, Volume,
    VolumeMount, Worker,
};
use resfetch::{ResfetchError, ResfetchResult};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct FakeVolume {
    handle: String,
    pub init_calls: Mutex<Vec<UsedResourceCache>>,
    pub init_error: Mutex<Option<String>>,
}

impl FakeVolume {
    pub fn new(handle: &str) -> Arc<Self> {
        Arc::new(Self {
            handle: handle.to_string(),
            init_calls: Mutex::new(Vec::new()),
            init_error: Mutex::new(None),
        })
    }

    pub fn init_count(&self) -> usize {
        self.init_calls.lock().unwrap().len()
    }

    fn initialized_for(&self, cache_id: i64) -> bool {
        self.init_calls
            .lock()
            .unwrap()
            .iter()
            .any(|cache| cache.id == cache_id)
    }
}

#[async_trait]
impl Volume for FakeVolume {
    fn handle(&self) -> &str {
        &self.handle
    }

    async fn initialize_resource_cache(&self, cache: &UsedResourceCache) -> ResfetchResult<()> {
        if let Some(reason) = self.init_error.lock().unwrap().clone() {
            return Err(ResfetchError::Store(reason));
        }
        self.init_calls.lock().unwrap().push(cache.clone());
        Ok(())
    }
}

pub struct FakeProcess {
    id: String,
    exit_status: i32,
    hang: bool,
    killed: Arc<AtomicBool>,
}

#[async_trait]
impl Process for FakeProcess {
    fn id(&self) -> &str {
        &self.id
    }

    async fn wait(&mut self) -> ResfetchResult<i32> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        Ok(self.exit_status)
    }

    async fn kill(&mut self) -> ResfetchResult<()> {
        self.killed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeContainer {
    handle: String,
    pub output: Arc<FakeVolume>,
    pub stdout: Mutex<Vec<u8>>,
    pub exit_status: Mutex<i32>,
    pub run_error: Mutex<Option<String>>,
    pub hang: AtomicBool,
    pub attachable: AtomicBool,
    pub killed: Arc<AtomicBool>,
    pub run_calls: Mutex<Vec<ProcessSpec>>,
    pub stdin: Mutex<Vec<Vec<u8>>>,
    pub attach_calls: AtomicUsize,
    pub properties: Mutex<BTreeMap<String, String>>,
}

impl FakeContainer {
    /// A container whose output volume is mounted at the get directory
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handle: "fake-container".to_string(),
            output: FakeVolume::new("fake-output-volume"),
            stdout: Mutex::new(b"{}".to_vec()),
            exit_status: Mutex::new(0),
            run_error: Mutex::new(None),
            hang: AtomicBool::new(false),
            attachable: AtomicBool::new(false),
            killed: Arc::new(AtomicBool::new(false)),
            run_calls: Mutex::new(Vec::new()),
            stdin: Mutex::new(Vec::new()),
            attach_calls: AtomicUsize::new(0),
            properties: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn set_stdout(&self, stdout: &[u8]) {
        *self.stdout.lock().unwrap() = stdout.to_vec();
    }

    pub fn run_count(&self) -> usize {
        self.run_calls.lock().unwrap().len()
    }

    fn process(&self, id: &str) -> Box<dyn Process> {
        Box::new(FakeProcess {
            id: id.to_string(),
            exit_status: *self.exit_status.lock().unwrap(),
            hang: self.hang.load(Ordering::SeqCst),
            killed: Arc::clone(&self.killed),
        })
    }
}

#[async_trait]
impl Container for FakeContainer {
    fn handle(&self) -> &str {
        &self.handle
    }

    async fn run(&self, spec: ProcessSpec, io: ProcessIo) -> ResfetchResult<Box<dyn Process>> {
        let id = spec.id.clone();
        self.run_calls.lock().unwrap().push(spec);
        if let Some(reason) = self.run_error.lock().unwrap().clone() {
            return Err(ResfetchError::ProcessRun {
                process_id: id,
                reason,
            });
        }

        if let Some(stdin) = &io.stdin {
            self.stdin.lock().unwrap().push(stdin.clone());
        }
        io.write_stdout(&self.stdout.lock().unwrap());
        Ok(self.process(&id))
    }

    async fn attach(&self, process_id: &str, io: ProcessIo) -> ResfetchResult<Box<dyn Process>> {
        self.attach_calls.fetch_add(1, Ordering::SeqCst);
        if !self.attachable.load(Ordering::SeqCst) {
            return Err(ResfetchError::ProcessNotFound(process_id.to_string()));
        }
        io.write_stdout(&self.stdout.lock().unwrap());
        Ok(self.process(process_id))
    }

    fn volume_mounts(&self) -> Vec<VolumeMount> {
        vec![VolumeMount {
            volume: self.output.clone(),
            mount_path: resources_dir("get"),
        }]
    }

    async fn property(&self, name: &str) -> ResfetchResult<Option<String>> {
        Ok(self.properties.lock().unwrap().get(name).cloned())
    }

    async fn set_property(&self, name: &str, value: &str) -> ResfetchResult<()> {
        self.properties
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }
}

pub struct CreateCall {
    pub delegate: Arc<dyn ImageFetchingDelegate>,
    pub owner: ContainerOwner,
    pub metadata: ContainerMetadata,
    pub spec: ContainerSpec,
    pub resource_types: VersionedResourceTypes,
}

pub struct FakeWorker {
    pub container: Arc<FakeContainer>,
    pub supports: AtomicBool,
    /// Volume reported as already cached, regardless of the container
    pub cached: Mutex<Option<Arc<FakeVolume>>>,
    pub lookup_error: Mutex<Option<String>>,
    pub create_calls: Mutex<Vec<CreateCall>>,
}

impl FakeWorker {
    pub fn new(container: Arc<FakeContainer>) -> Arc<Self> {
        Arc::new(Self {
            container,
            supports: AtomicBool::new(true),
            cached: Mutex::new(None),
            lookup_error: Mutex::new(None),
            create_calls: Mutex::new(Vec::new()),
        })
    }

    pub fn create_count(&self) -> usize {
        self.create_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Worker for FakeWorker {
    fn name(&self) -> &str {
        "fake-worker"
    }

    fn supports_resource_type(&self, _: &str, _: &VersionedResourceTypes) -> bool {
        self.supports.load(Ordering::SeqCst)
    }

    async fn find_or_create_container(
        &self,
        ctx: &CancellationToken,
        delegate: Arc<dyn ImageFetchingDelegate>,
        owner: &ContainerOwner,
        metadata: &ContainerMetadata,
        spec: &ContainerSpec,
        resource_types: &VersionedResourceTypes,
    ) -> ResfetchResult<Arc<dyn Container>> {
        if ctx.is_cancelled() {
            return Err(ResfetchError::Cancelled);
        }
        self.create_calls.lock().unwrap().push(CreateCall {
            delegate,
            owner: owner.clone(),
            metadata: metadata.clone(),
            spec: spec.clone(),
            resource_types: resource_types.clone(),
        });
        Ok(self.container.clone())
    }

    async fn find_volume_for_resource_cache(
        &self,
        cache: &UsedResourceCache,
    ) -> ResfetchResult<Option<Arc<dyn Volume>>> {
        if let Some(reason) = self.lookup_error.lock().unwrap().clone() {
            return Err(ResfetchError::Store(reason));
        }
        if let Some(volume) = self.cached.lock().unwrap().clone() {
            return Ok(Some(volume as Arc<dyn Volume>));
        }
        if self.container.output.initialized_for(cache.id) {
            return Ok(Some(self.container.output.clone() as Arc<dyn Volume>));
        }
        Ok(None)
    }
}

pub struct FakeInstance {
    pub resource_type: ResourceType,
    pub version: Version,
    pub source: Source,
    pub params: Params,
    pub resource_types: VersionedResourceTypes,
    pub owner: ContainerOwner,
    pub cache: UsedResourceCache,
    pub cache_calls: AtomicUsize,
}

#[async_trait]
impl ResourceInstance for FakeInstance {
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
        self.cache_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.cache.clone())
    }

    async fn find_on(&self, worker: &dyn Worker) -> ResfetchResult<Option<Arc<dyn Volume>>> {
        worker.find_volume_for_resource_cache(&self.cache).await
    }
}

#[derive(Default)]
pub struct FakeCacheFactory {
    pub metadata: Mutex<Vec<MetadataField>>,
    pub update_calls: Mutex<Vec<(UsedResourceCache, Vec<MetadataField>)>>,
}

impl FakeCacheFactory {
    pub fn with_metadata(metadata: Vec<MetadataField>) -> Arc<Self> {
        Arc::new(Self {
            metadata: Mutex::new(metadata),
            ..Default::default()
        })
    }

    pub fn update_count(&self) -> usize {
        self.update_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ResourceCacheFactory for FakeCacheFactory {
    async fn find_or_create_resource_cache(
        &self,
        descriptor: &ResourceCacheDescriptor,
    ) -> ResfetchResult<UsedResourceCache> {
        Ok(UsedResourceCache {
            id: 1,
            key: descriptor.key()?,
            resource_type: descriptor.resource_type.clone(),
            version: descriptor.version.clone(),
        })
    }

    async fn update_resource_cache_metadata(
        &self,
        cache: &UsedResourceCache,
        metadata: &[MetadataField],
    ) -> ResfetchResult<()> {
        self.update_calls
            .lock()
            .unwrap()
            .push((cache.clone(), metadata.to_vec()));
        Ok(())
    }

    async fn resource_cache_metadata(
        &self,
        _cache: &UsedResourceCache,
    ) -> ResfetchResult<Vec<MetadataField>> {
        Ok(self.metadata.lock().unwrap().clone())
    }
}

/// Image delegate that does nothing
pub struct QuietDelegate;

impl ImageFetchingDelegate for QuietDelegate {}

/// Task delegate that records lifecycle events
#[derive(Default)]
pub struct RecordingDelegate {
    pub events: Mutex<Vec<String>>,
}

impl RecordingDelegate {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl ImageFetchingDelegate for RecordingDelegate {}

impl TaskExecutionDelegate for RecordingDelegate {
    fn initializing(&self, _config: &TaskConfig) {
        self.events.lock().unwrap().push("initializing".to_string());
    }

    fn starting(&self, _config: &TaskConfig) {
        self.events.lock().unwrap().push("starting".to_string());
    }

    fn finished(&self, status: ExitStatus) {
        self.events
            .lock()
            .unwrap()
            .push(format!("finished:{}", status));
    }
}

/// Compare two trait objects by address
pub fn same_object<T: ?Sized, U: ?Sized>(a: &Arc<T>, b: &Arc<U>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
