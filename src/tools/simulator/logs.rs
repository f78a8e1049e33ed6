//! Duration-bounded log capture via `simctl spawn <udid> log stream`.

use std::{path::Path, process::Stdio, time::Duration};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::{io::AsyncReadExt, time};
use tracing::info;
use uuid::Uuid;

use crate::{
    lib::{errors::SimctlError, output as output_helpers, simctl},
    server::config::SimulatorConfig,
};

const LOG_EXCERPT_LIMIT: usize = 4_000;
const MAX_PREDICATE_LEN: usize = 256;

/// Input for `capture_logs`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CaptureLogsRequest {
    /// Device UDID or the literal `booted`.
    pub udid: String,
    /// Capture window; defaults to the configured maximum.
    #[serde(default)]
    pub duration_secs: Option<u32>,
    /// Optional `log stream` predicate, e.g. `subsystem == "com.example.app"`.
    #[serde(default)]
    pub predicate: Option<String>,
}

/// Response from `capture_logs`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CaptureLogsResponse {
    pub udid: String,
    pub log_path: String,
    pub excerpt: String,
    pub duration_secs: u32,
    pub bytes_captured: usize,
}

/// Stream unified logs from a simulator for a bounded window and persist
/// the captured text under the capture directory.
pub async fn capture_logs(
    request: &CaptureLogsRequest,
    config: &SimulatorConfig,
    capture_dir: &Path,
) -> Result<CaptureLogsResponse, SimctlError> {
    if !simctl::is_valid_udid(&request.udid) {
        return Err(SimctlError::InvalidUdid {
            udid: request.udid.clone(),
        });
    }
    let duration_secs = resolve_duration(request.duration_secs, config.max_log_capture_secs)?;
    if let Some(predicate) = &request.predicate {
        if predicate.trim().is_empty() || predicate.len() > MAX_PREDICATE_LEN {
            return Err(SimctlError::InvalidRequest {
                message: format!(
                    "predicate must be 1-{MAX_PREDICATE_LEN} characters when provided"
                ),
            });
        }
    }

    let mut args = vec![
        request.udid.as_str(),
        "log",
        "stream",
        "--style",
        "syslog",
    ];
    if let Some(predicate) = &request.predicate {
        args.push("--predicate");
        args.push(predicate.as_str());
    }
    let mut command = simctl::build_simctl_command(&config.xcrun_path, "spawn", &args);
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    info!(
        target: "xcbridge::simulator",
        udid = %request.udid,
        duration_secs = duration_secs,
        "Starting simulator log capture"
    );

    let mut child = command.spawn().map_err(|err| SimctlError::CommandFailed {
        exit_code: None,
        message: err.to_string(),
    })?;
    let mut stdout = child.stdout.take().ok_or_else(|| SimctlError::CommandFailed {
        exit_code: None,
        message: "log stream stdout was not captured".into(),
    })?;

    let deadline = time::Instant::now() + Duration::from_secs(duration_secs as u64);
    let mut captured = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let remaining = deadline.saturating_duration_since(time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match time::timeout(remaining, stdout.read(&mut chunk)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(read)) => captured.extend_from_slice(&chunk[..read]),
            Ok(Err(err)) => {
                return Err(SimctlError::CommandFailed {
                    exit_code: None,
                    message: err.to_string(),
                })
            }
            Err(_) => break,
        }
    }

    // An immediate exit with no output means simctl rejected the request.
    if captured.is_empty() {
        if let Ok(Some(status)) = child.try_wait() {
            if !status.success() {
                let mut stderr_buf = Vec::new();
                if let Some(mut stderr) = child.stderr.take() {
                    let _ = stderr.read_to_end(&mut stderr_buf).await;
                }
                return Err(SimctlError::CommandFailed {
                    exit_code: status.code(),
                    message: String::from_utf8_lossy(&stderr_buf).to_string(),
                });
            }
        }
    }

    let _ = child.start_kill();
    let _ = child.wait().await;

    let log_path = capture_dir.join(format!("log-capture-{}.log", Uuid::new_v4()));
    std::fs::create_dir_all(capture_dir).map_err(|err| SimctlError::CaptureFailure {
        message: format!("failed to create capture directory: {err}"),
    })?;
    std::fs::write(&log_path, &captured).map_err(|err| SimctlError::CaptureFailure {
        message: format!("failed to write {}: {err}", log_path.display()),
    })?;

    Ok(CaptureLogsResponse {
        udid: request.udid.clone(),
        log_path: log_path.to_string_lossy().to_string(),
        excerpt: output_helpers::collect_log_excerpt(&captured, &[], LOG_EXCERPT_LIMIT),
        duration_secs,
        bytes_captured: captured.len(),
    })
}

fn resolve_duration(requested: Option<u32>, max_secs: u32) -> Result<u32, SimctlError> {
    match requested {
        None => Ok(max_secs),
        Some(0) => Err(SimctlError::InvalidRequest {
            message: "duration_secs must be at least 1".into(),
        }),
        Some(secs) if secs > max_secs => Err(SimctlError::InvalidRequest {
            message: format!(
                "duration_secs exceeds simulator.max_log_capture_secs ({secs} > {max_secs})"
            ),
        }),
        Some(secs) => Ok(secs),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::tempdir;

    use crate::server::config::SimulatorConfig;

    use super::*;

    fn sample_config() -> SimulatorConfig {
        SimulatorConfig {
            xcrun_path: PathBuf::from("/usr/bin/xcrun"),
            max_log_capture_secs: 30,
        }
    }

    #[test]
    fn duration_defaults_to_configured_maximum() {
        assert_eq!(resolve_duration(None, 30).expect("default"), 30);
    }

    #[test]
    fn duration_above_maximum_is_rejected() {
        let error = resolve_duration(Some(31), 30).expect_err("over limit must fail");
        assert!(matches!(error, SimctlError::InvalidRequest { .. }));
    }

    #[test]
    fn zero_duration_is_rejected() {
        let error = resolve_duration(Some(0), 30).expect_err("zero must fail");
        assert!(matches!(error, SimctlError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn invalid_udid_is_rejected_before_spawn() {
        let temp = tempdir().expect("temp directory");
        let request = CaptureLogsRequest {
            udid: "../etc".into(),
            duration_secs: Some(1),
            predicate: None,
        };
        let error = capture_logs(&request, &sample_config(), temp.path())
            .await
            .expect_err("invalid udid must fail");
        assert!(matches!(error, SimctlError::InvalidUdid { .. }));
    }

    #[tokio::test]
    async fn oversized_predicate_is_rejected() {
        let temp = tempdir().expect("temp directory");
        let request = CaptureLogsRequest {
            udid: "booted".into(),
            duration_secs: Some(1),
            predicate: Some("x".repeat(300)),
        };
        let error = capture_logs(&request, &sample_config(), temp.path())
            .await
            .expect_err("oversized predicate must fail");
        assert!(matches!(error, SimctlError::InvalidRequest { .. }));
    }
}
