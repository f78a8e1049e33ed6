//! Environment diagnostics: probe the host toolchain and report in-flight
//! operations. Registered only when the debug toggle is set.
mod probe;

use std::{env, path::PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::server::{
    config::{SimulatorConfig, XcodeConfig},
    progress::ProgressRecord,
};

pub use probe::{DiagnosticsProbe, EnvDiagnosticsProbe, SystemDiagnosticsProbe};

/// Minimum free space expected for build jobs.
const MIN_DISK_BYTES: u64 = 10 * 1024 * 1024 * 1024; // 10GB

/// Environment variable that switches the diagnostics probe to env mode.
pub const DIAG_PROBE_ENV: &str = "XCBRIDGE_DIAG_PROBE";

/// Input for `collect_diagnostics`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CollectDiagnosticsRequest {
    /// Override for the configured Developer directory.
    #[serde(default)]
    pub developer_dir: Option<PathBuf>,
}

/// Overall status of the collection.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticsStatus {
    Ok,
    Degraded,
}

/// Result of an individual check.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticsCheckResult {
    Pass,
    Fail,
}

/// Details for a single check.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DiagnosticsCheck {
    pub name: String,
    pub result: DiagnosticsCheckResult,
    pub details: String,
}

/// Response from `collect_diagnostics`.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct CollectDiagnosticsResponse {
    pub status: DiagnosticsStatus,
    pub checks: Vec<DiagnosticsCheck>,
    /// Progress registry snapshot: operations still reporting `running`.
    pub in_flight: Vec<ProgressRecord>,
}

/// Collect diagnostics with the probe selected via environment.
pub async fn collect_diagnostics(
    request: CollectDiagnosticsRequest,
    xcode: &XcodeConfig,
    simulator: &SimulatorConfig,
    in_flight: Vec<ProgressRecord>,
) -> CollectDiagnosticsResponse {
    match env::var(DIAG_PROBE_ENV).ok().as_deref() {
        Some("env") | Some("mock") => {
            let probe = EnvDiagnosticsProbe;
            collect_diagnostics_with_probe(request, xcode, simulator, in_flight, &probe)
        }
        _ => {
            let probe = SystemDiagnosticsProbe;
            collect_diagnostics_with_probe(request, xcode, simulator, in_flight, &probe)
        }
    }
}

/// Version that allows injecting a test double.
pub fn collect_diagnostics_with_probe<P: DiagnosticsProbe>(
    request: CollectDiagnosticsRequest,
    xcode: &XcodeConfig,
    simulator: &SimulatorConfig,
    in_flight: Vec<ProgressRecord>,
    probe: &P,
) -> CollectDiagnosticsResponse {
    let mut checks = Vec::new();
    let developer_dir = request
        .developer_dir
        .unwrap_or_else(|| xcode.developer_dir.clone());

    if probe.requires_developer_dir() && !developer_dir.exists() {
        checks.push(DiagnosticsCheck {
            name: "developer_dir".into(),
            result: DiagnosticsCheckResult::Fail,
            details: format!("{} not found", developer_dir.display()),
        });
    } else {
        checks.push(DiagnosticsCheck {
            name: "developer_dir".into(),
            result: DiagnosticsCheckResult::Pass,
            details: developer_dir.display().to_string(),
        });
    }

    match probe.xcodebuild_version(&developer_dir) {
        Ok(version) => checks.push(DiagnosticsCheck {
            name: "xcodebuild_version".into(),
            result: DiagnosticsCheckResult::Pass,
            details: version,
        }),
        Err(err) => checks.push(DiagnosticsCheck {
            name: "xcodebuild_version".into(),
            result: DiagnosticsCheckResult::Fail,
            details: err.to_string(),
        }),
    }

    match probe.list_sdks(&developer_dir) {
        Ok(sdks) if sdks.is_empty() => checks.push(DiagnosticsCheck {
            name: "sdk".into(),
            result: DiagnosticsCheckResult::Fail,
            details: "no SDKs detected".into(),
        }),
        Ok(sdks) => checks.push(DiagnosticsCheck {
            name: "sdk".into(),
            result: DiagnosticsCheckResult::Pass,
            details: format!("SDK: {}", sdks.join(", ")),
        }),
        Err(err) => checks.push(DiagnosticsCheck {
            name: "sdk".into(),
            result: DiagnosticsCheckResult::Fail,
            details: err.to_string(),
        }),
    }

    match probe.simctl_available(&simulator.xcrun_path) {
        Ok(true) => checks.push(DiagnosticsCheck {
            name: "simctl".into(),
            result: DiagnosticsCheckResult::Pass,
            details: "simctl responds".into(),
        }),
        Ok(false) => checks.push(DiagnosticsCheck {
            name: "simctl".into(),
            result: DiagnosticsCheckResult::Fail,
            details: "simctl did not respond successfully".into(),
        }),
        Err(err) => checks.push(DiagnosticsCheck {
            name: "simctl".into(),
            result: DiagnosticsCheckResult::Fail,
            details: err.to_string(),
        }),
    }

    let disk_root = xcode
        .allowed_paths
        .first()
        .cloned()
        .unwrap_or_else(|| PathBuf::from("/"));
    match probe.disk_free_bytes(&disk_root) {
        Ok(free_bytes) if free_bytes < MIN_DISK_BYTES => checks.push(DiagnosticsCheck {
            name: "disk_space".into(),
            result: DiagnosticsCheckResult::Fail,
            details: format!("{free_bytes} bytes free (minimum {MIN_DISK_BYTES})"),
        }),
        Ok(free_bytes) => checks.push(DiagnosticsCheck {
            name: "disk_space".into(),
            result: DiagnosticsCheckResult::Pass,
            details: format!("{free_bytes} bytes free"),
        }),
        Err(err) => checks.push(DiagnosticsCheck {
            name: "disk_space".into(),
            result: DiagnosticsCheckResult::Fail,
            details: err.to_string(),
        }),
    }

    let status = if checks
        .iter()
        .any(|check| check.result == DiagnosticsCheckResult::Fail)
    {
        DiagnosticsStatus::Degraded
    } else {
        DiagnosticsStatus::Ok
    };

    CollectDiagnosticsResponse {
        status,
        checks,
        in_flight,
    }
}
