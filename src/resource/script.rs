//! Resource script protocol
//!
//! Each resource image provides `check`, `in` and `out` under
//! `/opt/resource`. A script reads its JSON request on stdin and prints a
//! JSON response on stdout; anything meant for humans goes to stderr.

use crate::atc::{MetadataField, Params, Source, Version};
use crate::error::{ResfetchError, ResfetchResult};
use crate::runtime::IoConfig;
use crate::worker::{
    wait_or_cancel, Container, OutputBuffer, OutputSink, ProcessIo, ProcessSpec, TeeSink,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const CHECK_SCRIPT: &str = "/opt/resource/check";
pub const IN_SCRIPT: &str = "/opt/resource/in";
pub const OUT_SCRIPT: &str = "/opt/resource/out";

pub const GET_PROCESS_ID: &str = "resource-get";
pub const PUT_PROCESS_ID: &str = "resource-put";
pub const CHECK_PROCESS_ID: &str = "resource-check";

/// Container property holding the raw response of a finished get or put
pub const RESOURCE_RESULT_PROPERTY: &str = "resource-result";

#[derive(Debug, Serialize)]
pub(crate) struct InRequest<'a> {
    pub source: &'a Source,
    pub params: &'a Params,
    pub version: &'a Version,
}

#[derive(Debug, Serialize)]
pub(crate) struct OutRequest<'a> {
    pub source: &'a Source,
    pub params: &'a Params,
}

#[derive(Debug, Serialize)]
pub(crate) struct CheckRequest<'a> {
    pub source: &'a Source,
    /// `null` on the first check of a resource
    pub version: Option<&'a Version>,
}

/// Response of `in` and `out`
///
/// Both fields may be omitted; `{}` is a valid, empty response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VersionResult {
    #[serde(default)]
    pub version: Version,
    #[serde(default)]
    pub metadata: Vec<MetadataField>,
}

/// Decode a script's stdout
///
/// Stdout is read as a sequence of JSON values and the last one that parses
/// is the response. Bytes after it are ignored. Output without any leading
/// JSON value is malformed.
pub fn parse_response<T: DeserializeOwned>(script: &str, stdout: &[u8]) -> ResfetchResult<T> {
    let mut last = None;
    for value in serde_json::Deserializer::from_slice(stdout).into_iter::<serde_json::Value>() {
        match value {
            Ok(value) => last = Some(value),
            Err(e) if last.is_none() => return Err(ResfetchError::malformed(script, e.to_string())),
            Err(e) => {
                debug!(script, "Ignoring trailing script output: {}", e);
                break;
            }
        }
    }

    let value = last.ok_or_else(|| ResfetchError::malformed(script, "no JSON response on stdout"))?;
    serde_json::from_value(value).map_err(|e| ResfetchError::malformed(script, e.to_string()))
}

/// One invocation of a resource script
pub(crate) struct ScriptRun<'a> {
    pub process_id: &'a str,
    pub path: &'a str,
    pub args: Vec<String>,
    pub request: Vec<u8>,
    pub env: BTreeMap<String, String>,
    /// Memoise the response on the container so a retry skips the script
    pub recoverable: bool,
}

fn recorded_response(value: Option<String>) -> Option<Vec<u8>> {
    value.filter(|v| !v.is_empty()).map(String::into_bytes)
}

/// Run a script to completion and return its raw stdout
///
/// Stdout carries the JSON response and is never forwarded to `io.stdout`;
/// only stderr is teed to `io.stderr`. A process left by an earlier attempt
/// under the same id is attached to instead of starting a second one.
pub(crate) async fn run_script(
    ctx: &CancellationToken,
    container: &dyn Container,
    script: ScriptRun<'_>,
    io: &IoConfig,
) -> ResfetchResult<Vec<u8>> {
    if script.recoverable {
        let recorded = container.property(RESOURCE_RESULT_PROPERTY).await?;
        if let Some(response) = recorded_response(recorded) {
            debug!(handle = container.handle(), script = script.path, "Reusing recorded response");
            return Ok(response);
        }
    }

    let stdout = OutputBuffer::new();
    let stderr = OutputBuffer::new();
    let mut stderr_sinks: Vec<Arc<dyn OutputSink>> = vec![Arc::new(stderr.clone())];
    if let Some(sink) = &io.stderr {
        stderr_sinks.push(Arc::clone(sink));
    }
    let process_io = ProcessIo {
        stdin: Some(script.request),
        stdout: Some(Arc::new(stdout.clone())),
        stderr: Some(Arc::new(TeeSink::new(stderr_sinks))),
    };

    let mut process = match container.attach(script.process_id, process_io.clone()).await {
        Ok(process) => process,
        Err(ResfetchError::ProcessNotFound(_)) => {
            let spec = ProcessSpec {
                id: script.process_id.to_string(),
                path: script.path.to_string(),
                args: script.args,
                env: script.env,
                ..Default::default()
            };
            container.run(spec, process_io).await?
        }
        Err(e) => return Err(e),
    };

    let exit_status = wait_or_cancel(ctx, process.as_mut()).await?;
    if exit_status != 0 {
        return Err(ResfetchError::ScriptFailed {
            script: script.path.to_string(),
            exit_status,
            stderr: stderr.to_string_lossy().trim().to_string(),
        });
    }

    let response = stdout.contents();
    if script.recoverable {
        // An attached process does not replay output the first run consumed.
        if response.is_empty() {
            let recorded = container.property(RESOURCE_RESULT_PROPERTY).await?;
            if let Some(recorded) = recorded_response(recorded) {
                return Ok(recorded);
            }
        }
        if let Ok(text) = std::str::from_utf8(&response) {
            if let Err(e) = container.set_property(RESOURCE_RESULT_PROPERTY, text).await {
                warn!(handle = container.handle(), "Failed to record script response: {}", e);
            }
        }
    }

    Ok(response)
}
