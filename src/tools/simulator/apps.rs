//! App lifecycle on a simulator: install, uninstall, launch, terminate.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    lib::{errors::SimctlError, output as output_helpers, paths, simctl},
    server::config::{SimulatorConfig, XcodeConfig},
};

const LOG_EXCERPT_LIMIT: usize = 2_000;
const MAX_BUNDLE_ID_LEN: usize = 156;
const MAX_LAUNCH_ARGS: usize = 8;
const MAX_LAUNCH_ARG_LEN: usize = 128;

/// Input for `install_app`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InstallAppRequest {
    /// Device UDID or the literal `booted`.
    pub udid: String,
    /// Absolute path to a built `.app` bundle.
    pub app_path: PathBuf,
}

/// Input for `uninstall_app`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UninstallAppRequest {
    pub udid: String,
    pub bundle_id: String,
}

/// Input for `launch_app`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LaunchAppRequest {
    pub udid: String,
    pub bundle_id: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Input for `terminate_app`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TerminateAppRequest {
    pub udid: String,
    pub bundle_id: String,
}

/// Response shared by the app lifecycle tools.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct AppLifecycleResponse {
    pub udid: String,
    pub status: &'static str,
    pub detail: String,
}

/// Install a built app bundle onto a simulator.
///
/// The bundle path goes through the same allowlist as project paths so the
/// server cannot be pointed at arbitrary filesystem locations.
pub async fn install_app(
    request: &InstallAppRequest,
    config: &SimulatorConfig,
    policy: &XcodeConfig,
) -> Result<AppLifecycleResponse, SimctlError> {
    validate_udid(&request.udid)?;
    if !paths::is_nonempty_absolute(&request.app_path) {
        return Err(SimctlError::InvalidRequest {
            message: format!(
                "app_path must be absolute: {}",
                request.app_path.display()
            ),
        });
    }
    if !policy.allowed_paths.is_empty()
        && !paths::is_allowed_path(&request.app_path, &policy.allowed_paths)
    {
        return Err(SimctlError::PathNotAllowed {
            path: request.app_path.clone(),
        });
    }

    let app_path = request.app_path.to_string_lossy().to_string();
    let command = simctl::build_simctl_command(
        &config.xcrun_path,
        "install",
        &[request.udid.as_str(), app_path.as_str()],
    );
    run_and_summarize(command, &request.udid, "installed").await
}

/// Remove an installed app from a simulator.
pub async fn uninstall_app(
    request: &UninstallAppRequest,
    config: &SimulatorConfig,
) -> Result<AppLifecycleResponse, SimctlError> {
    validate_udid(&request.udid)?;
    validate_bundle_id(&request.bundle_id)?;

    let command = simctl::build_simctl_command(
        &config.xcrun_path,
        "uninstall",
        &[request.udid.as_str(), request.bundle_id.as_str()],
    );
    run_and_summarize(command, &request.udid, "uninstalled").await
}

/// Launch an installed app; stdout carries the spawned pid.
pub async fn launch_app(
    request: &LaunchAppRequest,
    config: &SimulatorConfig,
) -> Result<AppLifecycleResponse, SimctlError> {
    validate_udid(&request.udid)?;
    validate_bundle_id(&request.bundle_id)?;
    validate_launch_args(&request.args)?;

    let mut args = vec![request.udid.as_str(), request.bundle_id.as_str()];
    args.extend(request.args.iter().map(String::as_str));
    let command = simctl::build_simctl_command(&config.xcrun_path, "launch", &args);
    run_and_summarize(command, &request.udid, "launched").await
}

/// Terminate a running app.
pub async fn terminate_app(
    request: &TerminateAppRequest,
    config: &SimulatorConfig,
) -> Result<AppLifecycleResponse, SimctlError> {
    validate_udid(&request.udid)?;
    validate_bundle_id(&request.bundle_id)?;

    let command = simctl::build_simctl_command(
        &config.xcrun_path,
        "terminate",
        &[request.udid.as_str(), request.bundle_id.as_str()],
    );
    run_and_summarize(command, &request.udid, "terminated").await
}

async fn run_and_summarize(
    command: tokio::process::Command,
    udid: &str,
    status: &'static str,
) -> Result<AppLifecycleResponse, SimctlError> {
    let output = super::run_simctl(command).await?;
    if !output.status.success() {
        return Err(SimctlError::CommandFailed {
            exit_code: output.status.code(),
            message: output_helpers::collect_log_excerpt(
                &output.stdout,
                &output.stderr,
                LOG_EXCERPT_LIMIT,
            ),
        });
    }
    Ok(AppLifecycleResponse {
        udid: udid.to_string(),
        status,
        detail: output_helpers::collect_log_excerpt(&output.stdout, &[], LOG_EXCERPT_LIMIT)
            .trim()
            .to_string(),
    })
}

fn validate_udid(udid: &str) -> Result<(), SimctlError> {
    if simctl::is_valid_udid(udid) {
        Ok(())
    } else {
        Err(SimctlError::InvalidUdid { udid: udid.into() })
    }
}

fn validate_bundle_id(bundle_id: &str) -> Result<(), SimctlError> {
    let well_formed = !bundle_id.is_empty()
        && bundle_id.len() <= MAX_BUNDLE_ID_LEN
        && bundle_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if well_formed {
        Ok(())
    } else {
        Err(SimctlError::InvalidBundleId {
            bundle_id: bundle_id.into(),
        })
    }
}

fn validate_launch_args(args: &[String]) -> Result<(), SimctlError> {
    if args.len() > MAX_LAUNCH_ARGS {
        return Err(SimctlError::InvalidRequest {
            message: format!("too many launch args (count={})", args.len()),
        });
    }
    for arg in args {
        if arg.len() > MAX_LAUNCH_ARG_LEN {
            return Err(SimctlError::InvalidRequest {
                message: format!("launch arg too long ({} characters)", arg.len()),
            });
        }
    }
    Ok(())
}
