//! Podman worker backend
//!
//! Runs resource and task containers with rootless Podman on the local host.
//! Containers are named after their owner key and idle on `sleep infinity`;
//! scripts run in them through `podman exec`.

use crate::atc::{Tags, TeamId, VersionedResourceType, VersionedResourceTypes};
use crate::config::schema::WorkerConfig;
use crate::db::{ContainerMetadata, ContainerOwner, UsedResourceCache};
use crate::error::{ResfetchError, ResfetchResult};
use crate::worker::io::ProcessIo;
use crate::worker::ledger::{ContainerRecord, Ledger, MountRecord};
use crate::worker::runtime::{
    Container, ImageFetchingDelegate, Process, Volume, VolumeMount, Worker,
};
use crate::worker::spec::{BindMountSource, ContainerSpec, ImageSpec, ProcessSpec, CERTS_MOUNT_PATH};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Label keys applied to containers and volumes
pub mod labels {
    pub const OWNER: &str = "io.resfetch.owner";
    pub const TEAM: &str = "io.resfetch.team";
    pub const TAGS: &str = "io.resfetch.tags";
    pub const WORKER: &str = "io.resfetch.worker";
    /// Prefix for container metadata labels
    pub const METADATA_PREFIX: &str = "io.resfetch.meta.";
}

/// Resource types whose images are plain registry references
const REGISTRY_IMAGE_TYPES: &[&str] = &["registry-image", "docker-image"];

/// Exit state published by a process supervisor
type ExitState = Option<Result<i32, String>>;

/// Invokes the podman binary
#[derive(Debug, Clone)]
struct Podman {
    binary: String,
}

impl Podman {
    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, args: &[&str], e: std::io::Error) -> ResfetchError {
        if e.kind() == std::io::ErrorKind::NotFound {
            ResfetchError::PodmanNotFound
        } else {
            ResfetchError::command_failed(format!("{} {:?}", self.binary, args), e)
        }
    }

    /// Execute a Podman command and return the output
    async fn exec(&self, args: &[&str]) -> ResfetchResult<Output> {
        debug!("Executing: {} {:?}", self.binary, args);

        self.command(args)
            .output()
            .await
            .map_err(|e| self.spawn_error(args, e))
    }

    /// Execute a Podman command, abandoning it if `ctx` is cancelled
    async fn exec_cancellable(
        &self,
        ctx: &CancellationToken,
        args: &[&str],
    ) -> ResfetchResult<Output> {
        debug!("Executing: {} {:?}", self.binary, args);

        let mut cmd = self.command(args);
        tokio::select! {
            output = cmd.output() => output.map_err(|e| self.spawn_error(args, e)),
            _ = ctx.cancelled() => Err(ResfetchError::Cancelled),
        }
    }
}

/// Key of a registered process: (container handle, process id)
type ProcessKey = (String, String);

/// Exit watch and kill switch of a registered process
type ProcessEntry = (watch::Receiver<ExitState>, CancellationToken);

/// Processes started through this worker that have not exited yet
#[derive(Default)]
struct ProcessRegistry {
    processes: Mutex<HashMap<ProcessKey, ProcessEntry>>,
}

impl ProcessRegistry {
    async fn register(&self, key: ProcessKey, entry: ProcessEntry) {
        self.processes.lock().await.insert(key, entry);
    }

    /// A still running process; exited ones cannot be attached to
    async fn running(&self, key: &ProcessKey) -> Option<ProcessEntry> {
        let mut processes = self.processes.lock().await;
        let exited = processes.get(key)?.0.borrow().is_some();
        if exited {
            processes.remove(key);
            return None;
        }
        processes.get(key).cloned()
    }

    /// Drop the entry for `key` if it still belongs to the `exit` channel
    async fn forget(&self, key: &ProcessKey, exit: &watch::Receiver<ExitState>) {
        let mut processes = self.processes.lock().await;
        if processes.get(key).is_some_and(|(rx, _)| rx.same_channel(exit)) {
            processes.remove(key);
        }
    }
}

/// Map a custom resource type to the image reference its source names
pub fn image_for_custom_type(custom: &VersionedResourceType) -> ResfetchResult<String> {
    let config = &custom.resource_type;
    let unresolvable = |reason: String| ResfetchError::ImageResolve {
        resource_type: config.name.clone(),
        reason,
    };

    if !REGISTRY_IMAGE_TYPES.contains(&config.type_.as_str()) {
        return Err(unresolvable(format!(
            "provided by a {} resource; only registry images can be resolved",
            config.type_
        )));
    }

    let repository = config
        .source
        .get("repository")
        .and_then(|v| v.as_str())
        .ok_or_else(|| unresolvable("source has no repository".to_string()))?;

    if let Some(digest) = custom.version.get("digest") {
        return Ok(format!("{}@{}", repository, digest));
    }

    let tag = config
        .source
        .get("tag")
        .and_then(|v| v.as_str())
        .unwrap_or("latest");
    Ok(format!("{}:{}", repository, tag))
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// Worker backed by the local rootless Podman
pub struct PodmanWorker {
    name: String,
    podman: Podman,
    team_id: Option<TeamId>,
    tags: Tags,
    certs_dir: Option<PathBuf>,
    /// Base resource type to image reference
    resource_types: BTreeMap<String, String>,
    ledger: Arc<Ledger>,
    processes: Arc<ProcessRegistry>,
}

impl PodmanWorker {
    /// Open the worker, loading its ledger from `state_dir`
    pub async fn open(config: &WorkerConfig, state_dir: &Path) -> ResfetchResult<Self> {
        let ledger_path = state_dir.join(format!("worker-{}.json", sanitize_name(&config.name)));
        let ledger = Ledger::open(ledger_path).await?;

        Ok(Self {
            name: config.name.clone(),
            podman: Podman {
                binary: config.podman.clone(),
            },
            team_id: config.team_id,
            tags: config.tags.clone(),
            certs_dir: config.certs_dir.clone(),
            resource_types: config.resource_types.clone(),
            ledger: Arc::new(ledger),
            processes: Arc::new(ProcessRegistry::default()),
        })
    }

    /// Team this worker is restricted to, if any
    pub fn team_id(&self) -> Option<TeamId> {
        self.team_id
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    fn resolve_image(
        &self,
        spec: &ImageSpec,
        resource_types: &VersionedResourceTypes,
    ) -> ResfetchResult<String> {
        if let Some(url) = &spec.image_url {
            return Ok(url.trim_start_matches("docker:///").to_string());
        }

        let resource_type = spec.resource_type.as_deref().ok_or_else(|| {
            ResfetchError::ImageResolve {
                resource_type: String::new(),
                reason: "image spec names neither a resource type nor an image".to_string(),
            }
        })?;

        if let Some(custom) = resource_types.lookup(resource_type) {
            return image_for_custom_type(custom);
        }

        self.resource_types
            .get(resource_type)
            .cloned()
            .ok_or_else(|| ResfetchError::ResourceTypeUnsupported {
                worker: self.name.clone(),
                resource_type: resource_type.to_string(),
            })
    }

    /// Pull the image unless it is already present
    async fn ensure_image(
        &self,
        ctx: &CancellationToken,
        image: &str,
        delegate: &dyn ImageFetchingDelegate,
    ) -> ResfetchResult<()> {
        let exists = self
            .podman
            .exec_cancellable(ctx, &["image", "exists", image])
            .await?;
        if exists.status.success() {
            return Ok(());
        }

        info!("Pulling image: {}", image);
        let output = self.podman.exec_cancellable(ctx, &["pull", image]).await?;
        if let Some(sink) = delegate.stderr() {
            sink.write(&output.stderr);
        }

        if output.status.success() {
            Ok(())
        } else {
            Err(ResfetchError::ImageResolve {
                resource_type: image.to_string(),
                reason: stderr_of(&output),
            })
        }
    }

    /// The owner's container if it is recorded and still exists
    async fn find_container(
        &self,
        ctx: &CancellationToken,
        handle: &str,
    ) -> ResfetchResult<Option<PodmanContainer>> {
        let record = self
            .ledger
            .read(|state| state.containers.get(handle).cloned())
            .await;

        let exists = self
            .podman
            .exec_cancellable(ctx, &["container", "exists", handle])
            .await?
            .status
            .success();

        match (record, exists) {
            (Some(record), true) => {
                let started = self.podman.exec_cancellable(ctx, &["start", handle]).await?;
                if !started.status.success() {
                    return Err(ResfetchError::ContainerCreate {
                        owner: record.owner,
                        reason: stderr_of(&started),
                    });
                }
                Ok(Some(self.container_from(handle, &record.mounts)))
            }
            (None, true) => {
                // Mounts of an unrecorded container are unknown; replace it.
                warn!(handle, "Removing container missing from the worker ledger");
                self.podman.exec_cancellable(ctx, &["rm", "-f", handle]).await?;
                Ok(None)
            }
            (_, false) => Ok(None),
        }
    }

    fn container_from(&self, handle: &str, mounts: &[MountRecord]) -> PodmanContainer {
        PodmanContainer {
            handle: handle.to_string(),
            podman: self.podman.clone(),
            mounts: mounts
                .iter()
                .map(|m| VolumeMount {
                    volume: Arc::new(PodmanVolume {
                        handle: m.volume.clone(),
                        ledger: Arc::clone(&self.ledger),
                    }),
                    mount_path: m.path.clone(),
                })
                .collect(),
            ledger: Arc::clone(&self.ledger),
            processes: Arc::clone(&self.processes),
        }
    }

    async fn create_volume(
        &self,
        ctx: &CancellationToken,
        volume: &str,
        owner_key: &str,
    ) -> ResfetchResult<()> {
        let owner_label = format!("{}={}", labels::OWNER, owner_key);
        let output = self
            .podman
            .exec_cancellable(
                ctx,
                &["volume", "create", "--ignore", "--label", &owner_label, volume],
            )
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(ResfetchError::ContainerCreate {
                owner: owner_key.to_string(),
                reason: format!("creating volume {}: {}", volume, stderr_of(&output)),
            })
        }
    }

    fn create_args(
        &self,
        handle: &str,
        owner: &ContainerOwner,
        metadata: &ContainerMetadata,
        spec: &ContainerSpec,
        image: &str,
        mounts: &[MountRecord],
    ) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            handle.to_string(),
        ];

        let mut container_labels = vec![
            (labels::OWNER.to_string(), owner.to_string()),
            (labels::TEAM.to_string(), spec.team_id.to_string()),
            (labels::WORKER.to_string(), self.name.clone()),
        ];
        if !spec.tags.is_empty() {
            container_labels.push((labels::TAGS.to_string(), spec.tags.join(",")));
        }
        for (name, value) in metadata.labels() {
            container_labels.push((format!("{}{}", labels::METADATA_PREFIX, name), value));
        }
        for (key, value) in container_labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", key, value));
        }

        for mount in mounts {
            args.push("-v".to_string());
            args.push(format!("{}:{}", mount.volume, mount.path));
        }

        for bind in &spec.bind_mounts {
            match bind {
                BindMountSource::Certs => match &self.certs_dir {
                    Some(dir) if dir.exists() => {
                        args.push("-v".to_string());
                        args.push(format!("{}:{}:ro", dir.display(), CERTS_MOUNT_PATH));
                    }
                    _ => debug!("No certs directory on this worker, skipping certs mount"),
                },
                BindMountSource::Host {
                    host_path,
                    container_path,
                    readonly,
                } => {
                    let ro = if *readonly { ":ro" } else { "" };
                    args.push("-v".to_string());
                    args.push(format!("{}:{}{}", host_path, container_path, ro));
                }
            }
        }

        if spec.image_spec.privileged {
            args.push("--privileged".to_string());
        }

        if let Some(dir) = &spec.dir {
            args.push("-w".to_string());
            args.push(dir.clone());
        }

        if let Some(user) = &spec.user {
            args.push("-u".to_string());
            args.push(user.clone());
        }

        for (k, v) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", k, v));
        }

        args.push("--entrypoint".to_string());
        args.push("sleep".to_string());
        args.push(image.to_string());
        args.push("infinity".to_string());

        args
    }
}

#[async_trait]
impl Worker for PodmanWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_resource_type(
        &self,
        resource_type: &str,
        resource_types: &VersionedResourceTypes,
    ) -> bool {
        resource_types.lookup(resource_type).is_some()
            || self.resource_types.contains_key(resource_type)
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

        let handle = owner.key();
        if let Some(container) = self.find_container(ctx, &handle).await? {
            debug!(handle, owner = %owner, "Reusing container");
            return Ok(Arc::new(container));
        }

        let image = self.resolve_image(&spec.image_spec, resource_types)?;
        delegate.image_version_determined(&image)?;
        self.ensure_image(ctx, &image, delegate.as_ref()).await?;

        let mut mounts = Vec::with_capacity(spec.outputs.len());
        for (name, path) in &spec.outputs {
            let volume = format!("{}-{}", handle, sanitize_name(name));
            self.create_volume(ctx, &volume, &handle).await?;
            mounts.push(MountRecord {
                volume,
                path: path.clone(),
            });
        }

        let args = self.create_args(&handle, owner, metadata, spec, &image, &mounts);
        let args_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.podman.exec_cancellable(ctx, &args_refs).await?;
        if !output.status.success() {
            // A concurrent caller for the same owner won the name. Volume
            // names derive from the handle, so its mounts match ours.
            let adopted = self
                .podman
                .exec_cancellable(ctx, &["container", "exists", &handle])
                .await?
                .status
                .success();
            if !adopted {
                return Err(ResfetchError::ContainerCreate {
                    owner: owner.to_string(),
                    reason: stderr_of(&output),
                });
            }
            debug!(handle, owner = %owner, "Adopting concurrently created container");
        }

        let record = ContainerRecord {
            owner: owner.to_string(),
            mounts: mounts.clone(),
            properties: BTreeMap::new(),
            created_at: Utc::now(),
        };
        self.ledger
            .update(|state| {
                state.containers.insert(handle.clone(), record);
                for mount in &mounts {
                    state.volumes.entry(mount.volume.clone()).or_default();
                }
                Ok(())
            })
            .await?;

        info!(handle, owner = %owner, image, "Container created");
        Ok(Arc::new(self.container_from(&handle, &mounts)))
    }

    async fn find_volume_for_resource_cache(
        &self,
        cache: &UsedResourceCache,
    ) -> ResfetchResult<Option<Arc<dyn Volume>>> {
        let handle = self
            .ledger
            .read(|state| state.volume_for_cache(cache.id).map(str::to_string))
            .await;

        let Some(handle) = handle else {
            return Ok(None);
        };

        let exists = self.podman.exec(&["volume", "exists", &handle]).await?;
        if !exists.status.success() {
            debug!(handle, cache_id = cache.id, "Cached volume no longer exists");
            return Ok(None);
        }

        Ok(Some(Arc::new(PodmanVolume {
            handle,
            ledger: Arc::clone(&self.ledger),
        })))
    }
}

/// A named Podman volume
pub struct PodmanVolume {
    handle: String,
    ledger: Arc<Ledger>,
}

impl fmt::Debug for PodmanVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PodmanVolume")
            .field("handle", &self.handle)
            .finish()
    }
}

#[async_trait]
impl Volume for PodmanVolume {
    fn handle(&self) -> &str {
        &self.handle
    }

    async fn initialize_resource_cache(&self, cache: &UsedResourceCache) -> ResfetchResult<()> {
        self.ledger
            .update(|state| {
                let record = state.volumes.entry(self.handle.clone()).or_default();
                match record.resource_cache_id {
                    Some(existing) if existing == cache.id => Ok(()),
                    Some(existing) => Err(ResfetchError::VolumeAlreadyInitialized {
                        handle: self.handle.clone(),
                        existing,
                        requested: cache.id,
                    }),
                    None => {
                        record.resource_cache_id = Some(cache.id);
                        Ok(())
                    }
                }
            })
            .await?;

        debug!(handle = %self.handle, cache_id = cache.id, "Volume initialized as resource cache");
        Ok(())
    }
}

/// A container managed by [`PodmanWorker`]
pub struct PodmanContainer {
    handle: String,
    podman: Podman,
    mounts: Vec<VolumeMount>,
    ledger: Arc<Ledger>,
    processes: Arc<ProcessRegistry>,
}

impl PodmanContainer {
    fn exec_args(&self, spec: &ProcessSpec) -> Vec<String> {
        let mut args = vec!["exec".to_string(), "-i".to_string()];

        if let Some(dir) = &spec.dir {
            args.push("-w".to_string());
            args.push(dir.clone());
        }

        if let Some(user) = &spec.user {
            args.push("-u".to_string());
            args.push(user.clone());
        }

        for (k, v) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", k, v));
        }

        args.push(self.handle.clone());
        args.push(spec.path.clone());
        args.extend(spec.args.iter().cloned());
        args
    }
}

#[async_trait]
impl Container for PodmanContainer {
    fn handle(&self) -> &str {
        &self.handle
    }

    async fn run(&self, spec: ProcessSpec, io: ProcessIo) -> ResfetchResult<Box<dyn Process>> {
        let args = self.exec_args(&spec);
        debug!(handle = %self.handle, process_id = %spec.id, "Running: podman {:?}", args);

        let stdin = if io.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        };

        let child = Command::new(&self.podman.binary)
            .args(&args)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ResfetchError::ProcessRun {
                process_id: spec.id.clone(),
                reason: e.to_string(),
            })?;

        let (tx, rx) = watch::channel(None);
        let kill = CancellationToken::new();
        let key = (self.handle.clone(), spec.id.clone());
        self.processes
            .register(key.clone(), (rx.clone(), kill.clone()))
            .await;

        let registry = Arc::clone(&self.processes);
        let supervisor_kill = kill.clone();
        let registered = rx.clone();
        tokio::spawn(async move {
            let result = supervise(child, io, supervisor_kill).await;
            let _ = tx.send(Some(result));
            registry.forget(&key, &registered).await;
        });

        Ok(Box::new(PodmanProcess {
            id: spec.id,
            exit: rx,
            kill,
        }))
    }

    /// Reconnects to a process started through this worker instance
    ///
    /// Only running processes can be attached to; a finished one is
    /// `ProcessNotFound` so the caller runs it again. Output already
    /// produced is not replayed to `_io`.
    async fn attach(&self, process_id: &str, _io: ProcessIo) -> ResfetchResult<Box<dyn Process>> {
        let (exit, kill) = self
            .processes
            .running(&(self.handle.clone(), process_id.to_string()))
            .await
            .ok_or_else(|| ResfetchError::ProcessNotFound(process_id.to_string()))?;

        debug!(handle = %self.handle, process_id, "Attached to process");
        Ok(Box::new(PodmanProcess {
            id: process_id.to_string(),
            exit,
            kill,
        }))
    }

    fn volume_mounts(&self) -> Vec<VolumeMount> {
        self.mounts.clone()
    }

    async fn property(&self, name: &str) -> ResfetchResult<Option<String>> {
        Ok(self
            .ledger
            .read(|state| {
                state
                    .containers
                    .get(&self.handle)
                    .and_then(|c| c.properties.get(name).cloned())
            })
            .await)
    }

    async fn set_property(&self, name: &str, value: &str) -> ResfetchResult<()> {
        self.ledger
            .update(|state| {
                let record = state
                    .containers
                    .get_mut(&self.handle)
                    .ok_or_else(|| ResfetchError::ContainerNotFound(self.handle.clone()))?;
                record.properties.insert(name.to_string(), value.to_string());
                Ok(())
            })
            .await
    }
}

/// Handle on a process supervised by a background task
pub struct PodmanProcess {
    id: String,
    exit: watch::Receiver<ExitState>,
    kill: CancellationToken,
}

#[async_trait]
impl Process for PodmanProcess {
    fn id(&self) -> &str {
        &self.id
    }

    async fn wait(&mut self) -> ResfetchResult<i32> {
        let state = self
            .exit
            .wait_for(|state| state.is_some())
            .await
            .map_err(|_| ResfetchError::Internal(format!("supervisor of {} vanished", self.id)))?;

        match &*state {
            Some(Ok(code)) => Ok(*code),
            Some(Err(reason)) => Err(ResfetchError::ProcessRun {
                process_id: self.id.clone(),
                reason: reason.clone(),
            }),
            None => Err(ResfetchError::Internal(format!(
                "process {} reported no exit state",
                self.id
            ))),
        }
    }

    async fn kill(&mut self) -> ResfetchResult<()> {
        self.kill.cancel();
        Ok(())
    }
}

/// Feed stdin, pump output into the sinks and wait for exit or kill
async fn supervise(mut child: Child, io: ProcessIo, kill: CancellationToken) -> Result<i32, String> {
    if let (Some(input), Some(mut stdin)) = (io.stdin.clone(), child.stdin.take()) {
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(&input).await {
                debug!("Writing process stdin failed: {}", e);
            }
        });
    }

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let waited = tokio::select! {
        status = async {
            let (status, ()) = tokio::join!(child.wait(), pump_output(stdout, stderr, &io));
            status
        } => Some(status),
        _ = kill.cancelled() => None,
    };

    match waited {
        Some(Ok(status)) => Ok(status.code().unwrap_or(-1)),
        Some(Err(e)) => Err(e.to_string()),
        None => {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill process: {}", e);
            }
            Err("process killed".to_string())
        }
    }
}

async fn read_chunk<R: AsyncRead + Unpin>(
    reader: &mut Option<R>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    match reader {
        Some(r) => r.read(buf).await,
        None => Ok(0),
    }
}

/// Stream stdout and stderr chunks into the process io sinks until both close
async fn pump_output<O, E>(mut stdout: Option<O>, mut stderr: Option<E>, io: &ProcessIo)
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut out_buf = vec![0u8; 8192];
    let mut err_buf = vec![0u8; 8192];
    let mut stdout_done = stdout.is_none();
    let mut stderr_done = stderr.is_none();

    while !stdout_done || !stderr_done {
        tokio::select! {
            read = read_chunk(&mut stdout, &mut out_buf), if !stdout_done => {
                match read {
                    Ok(0) | Err(_) => stdout_done = true,
                    Ok(n) => io.write_stdout(&out_buf[..n]),
                }
            }
            read = read_chunk(&mut stderr, &mut err_buf), if !stderr_done => {
                match read {
                    Ok(0) | Err(_) => stderr_done = true,
                    Ok(n) => io.write_stderr(&err_buf[..n]),
                }
            }
        }
    }
}
