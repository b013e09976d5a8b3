//! Put command - publish a resource through its out script

use crate::cli::args::PutArgs;
use crate::cli::commands::common::{
    build_step_owner, cancel_on_interrupt, container_metadata, open_worker, resource_metadata,
    ResourceTarget,
};
use crate::cli::delegate::ConsoleDelegate;
use crate::config::Config;
use crate::db::ContainerType;
use crate::error::ResfetchResult;
use crate::runtime::{IoConfig, Resource};
use crate::worker::{ImageFetchingDelegate, StderrSink};
use std::sync::Arc;

/// Execute the put command
pub async fn execute(args: PutArgs, config: &Config) -> ResfetchResult<()> {
    let ctx = cancel_on_interrupt();
    let worker = open_worker(config).await?;
    let target = ResourceTarget::new(args.resource, &worker)?;
    let delegate: Arc<dyn ImageFetchingDelegate> = Arc::new(ConsoleDelegate);

    let owner = build_step_owner(&args.step, None, target.team_id);
    let metadata = container_metadata(ContainerType::Put, Some(&args.step));
    let resource = target
        .resource(
            &ctx,
            worker.as_ref(),
            delegate,
            &owner,
            &metadata,
            resource_metadata(&args.step),
        )
        .await?;

    let io = IoConfig {
        stdout: None,
        stderr: Some(Arc::new(StderrSink)),
    };
    let result = resource
        .put(&ctx, &io, &target.source, &args.params.unwrap_or_default())
        .await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "version": result.version(),
            "metadata": result.metadata(),
        }))?
    );
    Ok(())
}
