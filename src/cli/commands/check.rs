//! Check command - list versions of a resource

use crate::cli::args::CheckArgs;
use crate::cli::commands::common::{
    cancel_on_interrupt, container_metadata, open_worker, ResourceTarget,
};
use crate::cli::delegate::ConsoleDelegate;
use crate::config::Config;
use crate::db::{ContainerOwner, ContainerType};
use crate::error::ResfetchResult;
use crate::resource::ResourceMetadata;
use crate::runtime::Resource;
use std::sync::Arc;

/// Execute the check command
pub async fn execute(args: CheckArgs, config: &Config) -> ResfetchResult<()> {
    let ctx = cancel_on_interrupt();
    let worker = open_worker(config).await?;
    let target = ResourceTarget::new(args.resource, &worker)?;

    let owner = ContainerOwner::check(args.resource_config_id, target.team_id);
    let resource = target
        .resource(
            &ctx,
            worker.as_ref(),
            Arc::new(ConsoleDelegate),
            &owner,
            &container_metadata(ContainerType::Check, None),
            ResourceMetadata::default(),
        )
        .await?;

    let versions = resource
        .check(&ctx, &target.source, &args.version.unwrap_or_default())
        .await?;
    println!("{}", serde_json::to_string_pretty(&versions)?);
    Ok(())
}
