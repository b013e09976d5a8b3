//! Container/volume collaborator
//!
//! Traits the fetch and task paths consume, plus a Podman backend:
//! - `runtime`: `Worker`, `Container`, `Process`, `Volume`
//! - `spec`: container and process specifications
//! - `io`: stdio sinks
//! - `podman`: local rootless Podman worker

pub mod io;
mod ledger;
pub mod podman;
mod runtime;
pub mod spec;

pub use io::{
    OutputBuffer, OutputSink, ProcessIo, StderrSink, StdoutSink, TeeSink, TracingSink,
};
pub use podman::PodmanWorker;
pub use runtime::{
    wait_or_cancel, Container, ImageFetchingDelegate, LoggingImageFetchingDelegate, Process,
    Volume, VolumeMount, Worker,
};
pub use spec::{BindMountSource, ContainerSpec, ImageSpec, ProcessSpec, CERTS_MOUNT_PATH};
