//! Error types for resfetch
//!
//! All modules use `ResfetchResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for resfetch operations
pub type ResfetchResult<T> = Result<T, ResfetchError>;

/// All errors that can occur in resfetch
#[derive(Error, Debug)]
pub enum ResfetchError {
    // Environment errors
    #[error("Podman not found. Install podman or set worker.podman in the config")]
    PodmanNotFound,

    #[error("Unsupported resource type on worker {worker}: {resource_type}")]
    ResourceTypeUnsupported {
        worker: String,
        resource_type: String,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // Metadata store errors
    #[error("Metadata store error: {0}")]
    Store(String),

    #[error("Resource cache not found: {0}")]
    ResourceCacheNotFound(i64),

    // Container errors
    #[error("Failed to create container for {owner}: {reason}")]
    ContainerCreate { owner: String, reason: String },

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Failed to run process {process_id}: {reason}")]
    ProcessRun { process_id: String, reason: String },

    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Image resolution failed for {resource_type}: {reason}")]
    ImageResolve {
        resource_type: String,
        reason: String,
    },

    // Resource script errors
    #[error("Resource script {script} exited with status {exit_status}: {stderr}")]
    ScriptFailed {
        script: String,
        exit_status: i32,
        stderr: String,
    },

    #[error("Malformed output from {script}: {reason}")]
    MalformedOutput { script: String, reason: String },

    // Volume errors
    #[error("No volume mounted at {0}")]
    MissingOutputVolume(String),

    #[error("Volume {handle} already initialized for resource cache {existing}, refusing {requested}")]
    VolumeAlreadyInitialized {
        handle: String,
        existing: i64,
        requested: i64,
    },

    // Cancellation
    #[error("Operation cancelled")]
    Cancelled,

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl ResfetchError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a malformed output error
    pub fn malformed(script: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedOutput {
            script: script.into(),
            reason: reason.into(),
        }
    }

    /// Whether the operation was aborted rather than failed
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if error is retryable by the calling step
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Store(_)
                | Self::ContainerCreate { .. }
                | Self::ProcessRun { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::PodmanNotFound => Some("Install podman: https://podman.io/docs/installation"),
            Self::ResourceTypeUnsupported { .. } => {
                Some("Add the type to [worker.resource_types] or declare it as a custom resource type")
            }
            Self::MalformedOutput { .. } => {
                Some("Resource scripts must print a JSON response on stdout; log to stderr")
            }
            _ => None,
        }
    }
}
