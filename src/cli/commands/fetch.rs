//! Fetch command - materialize a resource version into a cached volume

use crate::atc::{MetadataField, Version};
use crate::cli::args::FetchArgs;
use crate::cli::commands::common::{
    build_step_owner, cancel_on_interrupt, container_metadata, open_store, open_worker,
    resource_metadata, ResourceTarget,
};
use crate::cli::delegate::ConsoleDelegate;
use crate::config::Config;
use crate::db::ContainerType;
use crate::error::{ResfetchError, ResfetchResult};
use crate::resource::{fetch, FetchSession, FetchSourceFactory, StoreResourceInstance};
use crate::runtime::Resource;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Serialize)]
struct FetchOutput<'a> {
    version: &'a Version,
    metadata: &'a [MetadataField],
    volume: &'a str,
}

/// Execute the fetch command
pub async fn execute(args: FetchArgs, config: &Config) -> ResfetchResult<()> {
    let ctx = cancel_on_interrupt();
    let worker = open_worker(config).await?;
    let store = open_store(config).await?;
    let target = ResourceTarget::new(args.resource, &worker)?;
    let delegate = Arc::new(ConsoleDelegate);

    let version = match args.version {
        Some(version) => version,
        None => {
            let owner = build_step_owner(&args.step, Some("check"), target.team_id);
            let metadata = container_metadata(ContainerType::Check, Some(&args.step));
            let resource = target
                .resource(
                    &ctx,
                    worker.as_ref(),
                    delegate.clone(),
                    &owner,
                    &metadata,
                    resource_metadata(&args.step),
                )
                .await?;
            let versions = resource
                .check(&ctx, &target.source, &Version::new())
                .await?;
            let latest = versions.into_iter().last().ok_or_else(|| {
                ResfetchError::User(format!("no versions of {} found", target.resource_type))
            })?;
            info!(version = ?latest, "Resolved latest version");
            latest
        }
    };

    let session = FetchSession {
        team_id: target.team_id,
        tags: target.tags.clone(),
        container_metadata: container_metadata(ContainerType::Get, Some(&args.step)),
        resource_metadata: resource_metadata(&args.step),
    };
    let instance = Arc::new(StoreResourceInstance::new(
        target.resource_type,
        version,
        target.source,
        args.params.unwrap_or_default(),
        build_step_owner(&args.step, None, target.team_id),
        target.resource_types,
        store.clone(),
    ));

    let factory = FetchSourceFactory::new(store);
    let source = factory.new_fetch_source(instance, worker, session, delegate);
    let fetched = fetch(&ctx, &source).await?;

    let output = FetchOutput {
        version: fetched.version(),
        metadata: fetched.metadata(),
        volume: fetched.handle(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
