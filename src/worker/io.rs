//! Process stdio plumbing
//!
//! Output is pushed chunk by chunk into sinks. Callers compose sinks to
//! capture a script's stdout for parsing while also streaming it to a user.

use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Destination for a stream of process output
pub trait OutputSink: Send + Sync {
    fn write(&self, chunk: &[u8]);
}

/// In-memory sink; clones share the same buffer
#[derive(Clone, Default)]
pub struct OutputBuffer(Arc<Mutex<Vec<u8>>>);

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far
    pub fn contents(&self) -> Vec<u8> {
        match self.0.lock() {
            Ok(buf) => buf.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl fmt::Debug for OutputBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OutputBuffer")
            .field(&self.contents().len())
            .finish()
    }
}

impl OutputSink for OutputBuffer {
    fn write(&self, chunk: &[u8]) {
        match self.0.lock() {
            Ok(mut buf) => buf.extend_from_slice(chunk),
            Err(poisoned) => poisoned.into_inner().extend_from_slice(chunk),
        }
    }
}

/// Fans each chunk out to several sinks
pub struct TeeSink(Vec<Arc<dyn OutputSink>>);

impl TeeSink {
    pub fn new(sinks: impl IntoIterator<Item = Arc<dyn OutputSink>>) -> Self {
        Self(sinks.into_iter().collect())
    }
}

impl OutputSink for TeeSink {
    fn write(&self, chunk: &[u8]) {
        for sink in &self.0 {
            sink.write(chunk);
        }
    }
}

/// Forwards output to this process's stdout
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write(&self, chunk: &[u8]) {
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = stdout.write_all(chunk).and_then(|()| stdout.flush()) {
            debug!("Writing to stdout failed: {}", e);
        }
    }
}

/// Forwards output to this process's stderr
pub struct StderrSink;

impl OutputSink for StderrSink {
    fn write(&self, chunk: &[u8]) {
        let mut stderr = std::io::stderr().lock();
        if let Err(e) = stderr.write_all(chunk).and_then(|()| stderr.flush()) {
            debug!("Writing to stderr failed: {}", e);
        }
    }
}

/// Logs output at debug level under a label
pub struct TracingSink {
    label: &'static str,
}

impl TracingSink {
    pub fn new(label: &'static str) -> Self {
        Self { label }
    }
}

impl OutputSink for TracingSink {
    fn write(&self, chunk: &[u8]) {
        for line in String::from_utf8_lossy(chunk).lines() {
            debug!(stream = self.label, "{}", line);
        }
    }
}

/// Stdio wiring for a container process
#[derive(Clone, Default)]
pub struct ProcessIo {
    /// Bytes written to stdin before it is closed
    pub stdin: Option<Vec<u8>>,
    pub stdout: Option<Arc<dyn OutputSink>>,
    pub stderr: Option<Arc<dyn OutputSink>>,
}

impl ProcessIo {
    pub fn write_stdout(&self, chunk: &[u8]) {
        if let Some(sink) = &self.stdout {
            sink.write(chunk);
        }
    }

    pub fn write_stderr(&self, chunk: &[u8]) {
        if let Some(sink) = &self.stderr {
            sink.write(chunk);
        }
    }
}
