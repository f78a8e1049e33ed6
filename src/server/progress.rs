//! Progress tracking for long-running tool operations.
//!
//! Builds, test runs, installs, and log captures report their state here.
//! Updates are mirrored to a side-channel stream (stderr by default) so the
//! stdout protocol channel stays clean, and to `tracing`. Reporting is
//! advisory: a failed delivery never aborts the operation that reported it.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use schemars::JsonSchema;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

/// Status carried by a single progress update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Running,
    Completed,
    Failed,
}

impl OperationStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Running => "running",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
        }
    }

    const fn as_uppercase_str(&self) -> &'static str {
        match self {
            OperationStatus::Running => "RUNNING",
            OperationStatus::Completed => "COMPLETED",
            OperationStatus::Failed => "FAILED",
        }
    }
}

/// One progress report from an in-flight operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub operation_id: String,
    pub status: OperationStatus,
    pub message: String,
    /// Percentage; rendered as 0 when absent.
    pub progress: Option<u8>,
}

impl ProgressUpdate {
    pub fn running(operation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            status: OperationStatus::Running,
            message: message.into(),
            progress: None,
        }
    }

    pub fn completed(operation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            status: OperationStatus::Completed,
            message: message.into(),
            progress: Some(100),
        }
    }

    pub fn failed(operation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            status: OperationStatus::Failed,
            message: message.into(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Stored state of an operation whose last reported status was `running`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct ProgressRecord {
    pub operation_id: String,
    pub message: String,
    pub progress: u8,
}

/// Advisory outcome of a report. Never escalates to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    Delivered,
    Advisory(ReportFault),
}

impl ReportOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ReportOutcome::Delivered)
    }
}

/// Reasons a report degraded to a no-op or partial delivery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportFault {
    #[error("progress side channel is not bound yet")]
    ChannelUnbound,
    #[error("failed to write progress line: {0}")]
    ChannelWrite(String),
}

/// Destination for side-channel progress lines.
pub trait ProgressSink: Send {
    fn write_line(&mut self, line: &str) -> std::io::Result<()>;
}

/// Default sink writing to the process stderr stream.
pub struct StderrSink;

impl ProgressSink for StderrSink {
    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        use std::io::Write;
        let stderr = std::io::stderr();
        let mut handle = stderr.lock();
        writeln!(handle, "{line}")
    }
}

/// Sink collecting lines in memory. Used by tests and diagnostics fixtures.
#[derive(Clone, Default)]
pub struct BufferSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }
}

impl ProgressSink for BufferSink {
    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.lines
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(line.to_string());
        Ok(())
    }
}

/// Registry of in-flight operations, keyed by operation id.
///
/// Explicitly constructed and cloned into the server; there is no global
/// instance. An entry exists iff the most recent report for its id was
/// `running`; terminal reports remove the entry and keep no history.
///
/// The lock is a plain mutex: every critical section is a map touch plus a
/// line write, and nothing is held across an await point.
#[derive(Clone)]
pub struct ProgressRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

struct RegistryInner {
    sink: Option<Box<dyn ProgressSink>>,
    records: HashMap<String, ProgressRecord>,
}

impl Default for ProgressRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressRegistry {
    /// Create an unbound registry. Reports degrade to advisory no-ops until
    /// `bind` attaches a side channel.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                sink: None,
                records: HashMap::new(),
            })),
        }
    }

    /// Bind the side-channel sink. Called once during server construction;
    /// a second bind replaces the sink.
    pub fn bind(&self, sink: Box<dyn ProgressSink>) {
        let mut inner = self.lock_inner();
        if inner.sink.is_some() {
            warn!(
                target: "xcbridge::progress",
                "Progress side channel was already bound; replacing sink"
            );
        }
        inner.sink = Some(sink);
    }

    /// Accept one progress update.
    ///
    /// `running` inserts or overwrites the record for the id (last write
    /// wins); any terminal status removes the record, silently if absent.
    /// The formatted trace line and structured log entry are emitted for
    /// every accepted update. Failures stay local to this call.
    pub fn report(&self, update: ProgressUpdate) -> ReportOutcome {
        let mut inner = self.lock_inner();
        let RegistryInner { sink, records } = &mut *inner;

        let Some(sink) = sink.as_mut() else {
            warn!(
                target: "xcbridge::progress",
                operation_id = %update.operation_id,
                message = %update.message,
                "Dropping progress update reported before the side channel was bound"
            );
            return ReportOutcome::Advisory(ReportFault::ChannelUnbound);
        };

        let progress = update.progress.unwrap_or(0);
        match update.status {
            OperationStatus::Running => {
                records.insert(
                    update.operation_id.clone(),
                    ProgressRecord {
                        operation_id: update.operation_id.clone(),
                        message: update.message.clone(),
                        progress,
                    },
                );
            }
            OperationStatus::Completed | OperationStatus::Failed => {
                records.remove(&update.operation_id);
            }
        }

        if update.status == OperationStatus::Failed {
            error!(
                target: "xcbridge::progress",
                operation_id = %update.operation_id,
                "Progress update [{}]: {} ({}%)",
                update.operation_id,
                update.message,
                progress
            );
        } else {
            info!(
                target: "xcbridge::progress",
                operation_id = %update.operation_id,
                "Progress update [{}]: {} ({}%)",
                update.operation_id,
                update.message,
                progress
            );
        }

        let line = format!(
            "Operation [{}]: {} - {} ({}%)",
            update.operation_id,
            update.status.as_uppercase_str(),
            update.message,
            progress
        );
        if let Err(err) = sink.write_line(&line) {
            error!(
                target: "xcbridge::progress",
                operation_id = %update.operation_id,
                error = %err,
                "Failed to deliver progress line to the side channel"
            );
            return ReportOutcome::Advisory(ReportFault::ChannelWrite(err.to_string()));
        }

        ReportOutcome::Delivered
    }

    /// Write one raw line to the side channel (readiness notices).
    pub fn announce(&self, line: &str) -> ReportOutcome {
        let mut inner = self.lock_inner();
        let Some(sink) = inner.sink.as_mut() else {
            warn!(
                target: "xcbridge::progress",
                line = %line,
                "Dropping announcement before the side channel was bound"
            );
            return ReportOutcome::Advisory(ReportFault::ChannelUnbound);
        };
        if let Err(err) = sink.write_line(line) {
            error!(
                target: "xcbridge::progress",
                error = %err,
                "Failed to deliver announcement to the side channel"
            );
            return ReportOutcome::Advisory(ReportFault::ChannelWrite(err.to_string()));
        }
        ReportOutcome::Delivered
    }

    /// Wrap this registry for one named operation; messages are prefixed
    /// with the operation name. Introduces no new state.
    pub fn reporter(&self, operation_name: impl Into<String>) -> OperationReporter {
        OperationReporter {
            registry: self.clone(),
            operation_name: operation_name.into(),
        }
    }

    /// Current records in unspecified order. Introspection only.
    pub fn snapshot(&self) -> Vec<ProgressRecord> {
        self.lock_inner().records.values().cloned().collect()
    }

    /// Number of in-flight operations (used for startup telemetry).
    pub fn pending_operations(&self) -> usize {
        self.lock_inner().records.len()
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        // A poisoned lock means a reporter panicked; progress delivery is
        // advisory, so carry on with the inner state as-is.
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }
}

/// Per-operation handle returned by [`ProgressRegistry::reporter`].
#[derive(Clone)]
pub struct OperationReporter {
    registry: ProgressRegistry,
    operation_name: String,
}

impl OperationReporter {
    pub fn send(&self, update: ProgressUpdate) -> ReportOutcome {
        let prefixed = ProgressUpdate {
            message: format!("{}: {}", self.operation_name, update.message),
            ..update
        };
        self.registry.report(prefixed)
    }
}
