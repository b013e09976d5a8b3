//! Wiring shared by the resource and task commands

use crate::atc::{PlanId, Source, Tags, TeamId, VersionedResourceTypes};
use crate::cli::args::{ResourceArgs, StepArgs};
use crate::config::{Config, ConfigManager};
use crate::db::{ContainerMetadata, ContainerOwner, ContainerType, FileResourceCacheStore};
use crate::error::{ResfetchError, ResfetchResult};
use crate::resource::{ContainerResource, ResourceMetadata, ResourceType};
use crate::worker::{
    BindMountSource, ContainerSpec, ImageFetchingDelegate, ImageSpec, PodmanWorker, Worker,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Token cancelled on Ctrl-C
pub(crate) fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            cancel.cancel();
        }
    });
    token
}

pub(crate) async fn open_worker(config: &Config) -> ResfetchResult<Arc<PodmanWorker>> {
    let state_dir = ConfigManager::ensure_state_dir().await?;
    let worker = PodmanWorker::open(&config.worker, &state_dir).await?;
    debug!("Opened worker {}", worker.name());
    Ok(Arc::new(worker))
}

pub(crate) async fn open_store(config: &Config) -> ResfetchResult<Arc<FileResourceCacheStore>> {
    ConfigManager::ensure_state_dir().await?;
    let store = FileResourceCacheStore::open(ConfigManager::store_path(config)).await?;
    Ok(Arc::new(store))
}

/// Team a step runs for, checked against the worker's restriction
pub(crate) fn step_team(worker: &PodmanWorker, team_id: TeamId) -> ResfetchResult<TeamId> {
    match worker.team_id() {
        Some(restricted) if restricted != team_id => Err(ResfetchError::User(format!(
            "worker {} only runs steps for team {}",
            worker.name(),
            restricted
        ))),
        _ => Ok(team_id),
    }
}

pub(crate) fn build_step_owner(
    step: &StepArgs,
    suffix: Option<&str>,
    team_id: TeamId,
) -> ContainerOwner {
    let plan_id = match suffix {
        Some(suffix) => format!("{}/{}", step.plan_id, suffix),
        None => step.plan_id.clone(),
    };
    ContainerOwner::build_step(step.build_id, PlanId::new(plan_id), team_id)
}

pub(crate) fn container_metadata(
    type_: ContainerType,
    step: Option<&StepArgs>,
) -> ContainerMetadata {
    ContainerMetadata {
        type_: Some(type_),
        step_name: step.map(|s| s.plan_id.clone()).unwrap_or_default(),
        build_id: step.map(|s| s.build_id),
        ..Default::default()
    }
}

pub(crate) fn resource_metadata(step: &StepArgs) -> ResourceMetadata {
    ResourceMetadata {
        build_id: Some(step.build_id),
        build_name: step.build_id.to_string(),
        ..Default::default()
    }
}

/// A resource as addressed on the command line
pub(crate) struct ResourceTarget {
    pub resource_type: ResourceType,
    pub source: Source,
    pub resource_types: VersionedResourceTypes,
    pub team_id: TeamId,
    pub tags: Tags,
}

impl ResourceTarget {
    pub fn new(args: ResourceArgs, worker: &PodmanWorker) -> ResfetchResult<Self> {
        Ok(Self {
            team_id: step_team(worker, args.team_id)?,
            resource_type: ResourceType::new(args.resource_type),
            source: args.source,
            resource_types: args.resource_types.unwrap_or_default(),
            tags: worker.tags().clone(),
        })
    }

    /// Container spec for running the type's check or out script
    pub fn container_spec(&self) -> ContainerSpec {
        ContainerSpec {
            team_id: self.team_id,
            tags: self.tags.clone(),
            image_spec: ImageSpec::for_resource_type(self.resource_type.as_str()),
            bind_mounts: vec![BindMountSource::Certs],
            ..Default::default()
        }
    }

    /// The resource's scripts in the owner's container
    pub async fn resource(
        &self,
        ctx: &CancellationToken,
        worker: &dyn Worker,
        delegate: Arc<dyn ImageFetchingDelegate>,
        owner: &ContainerOwner,
        metadata: &ContainerMetadata,
        env: ResourceMetadata,
    ) -> ResfetchResult<ContainerResource> {
        if !worker.supports_resource_type(self.resource_type.as_str(), &self.resource_types) {
            return Err(ResfetchError::ResourceTypeUnsupported {
                worker: worker.name().to_string(),
                resource_type: self.resource_type.to_string(),
            });
        }

        let container = worker
            .find_or_create_container(
                ctx,
                delegate,
                owner,
                metadata,
                &self.container_spec(),
                &self.resource_types,
            )
            .await?;
        Ok(ContainerResource::new(container, env.env()))
    }
}
