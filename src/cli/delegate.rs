//! Terminal reporting of step progress

use crate::atc::TaskConfig;
use crate::error::ResfetchResult;
use crate::runtime::{ExitStatus, TaskExecutionDelegate};
use crate::worker::{ImageFetchingDelegate, OutputSink, StderrSink};
use console::style;
use std::sync::Arc;

/// Prints step progress to stderr, keeping stdout for results
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleDelegate;

impl ImageFetchingDelegate for ConsoleDelegate {
    fn stdout(&self) -> Option<Arc<dyn OutputSink>> {
        Some(Arc::new(StderrSink))
    }

    fn stderr(&self) -> Option<Arc<dyn OutputSink>> {
        Some(Arc::new(StderrSink))
    }

    fn image_version_determined(&self, image: &str) -> ResfetchResult<()> {
        eprintln!("{} {}", style("image").dim(), image);
        Ok(())
    }
}

impl TaskExecutionDelegate for ConsoleDelegate {
    fn initializing(&self, _config: &TaskConfig) {
        eprintln!("{}", style("initializing").cyan());
    }

    fn starting(&self, config: &TaskConfig) {
        eprintln!(
            "{} {} {}",
            style("running").cyan(),
            config.run.path,
            config.run.args.join(" ")
        );
    }

    fn finished(&self, status: ExitStatus) {
        if status.success() {
            eprintln!("{}", style("succeeded").green().bold());
        } else {
            eprintln!("{} (exit {})", style("failed").red().bold(), status);
        }
    }
}
