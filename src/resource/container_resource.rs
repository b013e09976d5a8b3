//! [`Resource`] implemented by running the type's scripts in a container

use crate::atc::{Params, Source, Version};
use crate::error::ResfetchResult;
use crate::resource::resources_dir;
use crate::resource::script::{
    parse_response, run_script, CheckRequest, InRequest, OutRequest, ScriptRun, VersionResult,
    CHECK_PROCESS_ID, CHECK_SCRIPT, GET_PROCESS_ID, IN_SCRIPT, OUT_SCRIPT, PUT_PROCESS_ID,
};
use crate::resource::VersionedSource;
use crate::runtime::{IoConfig, Resource};
use crate::worker::{Container, TracingSink, Volume};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A resource whose scripts run in one container
pub struct ContainerResource {
    container: Arc<dyn Container>,
    env: BTreeMap<String, String>,
}

impl ContainerResource {
    /// `env` is passed to every script, typically the build's `BUILD_*` variables
    pub fn new(container: Arc<dyn Container>, env: BTreeMap<String, String>) -> Self {
        Self { container, env }
    }

    pub fn container(&self) -> &Arc<dyn Container> {
        &self.container
    }
}

#[async_trait]
impl Resource for ContainerResource {
    async fn get(
        &self,
        ctx: &CancellationToken,
        volume: Arc<dyn Volume>,
        io: &IoConfig,
        source: &Source,
        params: &Params,
        version: &Version,
    ) -> ResfetchResult<VersionedSource> {
        let request = serde_json::to_vec(&InRequest {
            source,
            params,
            version,
        })?;
        let script = ScriptRun {
            process_id: GET_PROCESS_ID,
            path: IN_SCRIPT,
            args: vec![resources_dir("get")],
            request,
            env: self.env.clone(),
            recoverable: true,
        };

        let stdout = run_script(ctx, self.container.as_ref(), script, io).await?;
        let result: VersionResult = parse_response(IN_SCRIPT, &stdout)?;

        info!(handle = self.container.handle(), version = ?result.version, "Fetched resource");
        Ok(VersionedSource::get(result.version, result.metadata, volume))
    }

    async fn put(
        &self,
        ctx: &CancellationToken,
        io: &IoConfig,
        source: &Source,
        params: &Params,
    ) -> ResfetchResult<VersionedSource> {
        let request = serde_json::to_vec(&OutRequest { source, params })?;
        let script = ScriptRun {
            process_id: PUT_PROCESS_ID,
            path: OUT_SCRIPT,
            args: vec![resources_dir("put")],
            request,
            env: self.env.clone(),
            recoverable: true,
        };

        let stdout = run_script(ctx, self.container.as_ref(), script, io).await?;
        let result: VersionResult = parse_response(OUT_SCRIPT, &stdout)?;

        info!(handle = self.container.handle(), version = ?result.version, "Put resource");
        Ok(VersionedSource::put(
            result.version,
            result.metadata,
            Arc::clone(&self.container),
            resources_dir("put"),
        ))
    }

    async fn check(
        &self,
        ctx: &CancellationToken,
        source: &Source,
        version: &Version,
    ) -> ResfetchResult<Vec<Version>> {
        let request = serde_json::to_vec(&CheckRequest {
            source,
            version: (!version.is_empty()).then_some(version),
        })?;
        let script = ScriptRun {
            process_id: CHECK_PROCESS_ID,
            path: CHECK_SCRIPT,
            args: Vec::new(),
            request,
            env: self.env.clone(),
            recoverable: false,
        };

        let io = IoConfig {
            stdout: None,
            stderr: Some(Arc::new(TracingSink::new("check"))),
        };
        let stdout = run_script(ctx, self.container.as_ref(), script, &io).await?;
        parse_response(CHECK_SCRIPT, &stdout)
    }
}
