//! MCP tools wrapping `xcrun simctl`.

pub mod apps;
pub mod control;
pub mod list;
pub mod logs;
pub mod screenshot;

use rmcp::model::ErrorData;
use serde_json::json;
use tokio::process::Command;

use crate::lib::errors::{PolicyState, SimctlError, ToolErrorDescriptor};

pub use apps::{
    install_app, launch_app, terminate_app, uninstall_app, AppLifecycleResponse,
    InstallAppRequest, LaunchAppRequest, TerminateAppRequest, UninstallAppRequest,
};
pub use control::{
    boot_simulator, shutdown_simulator, SimulatorControlRequest, SimulatorControlResponse,
};
pub use list::{list_simulators, ListSimulatorsRequest, ListSimulatorsResponse, SimulatorDevice};
pub use logs::{capture_logs, CaptureLogsRequest, CaptureLogsResponse};
pub use screenshot::{capture_screenshot, CaptureScreenshotRequest, CaptureScreenshotResponse};

const INVALID_UDID_ERROR: ToolErrorDescriptor = ToolErrorDescriptor::new(
    "invalid_udid",
    "Simulator identifier is not valid",
    "Pass `booted` or a UDID from list_simulators.",
);
const INVALID_BUNDLE_ID_ERROR: ToolErrorDescriptor = ToolErrorDescriptor::new(
    "invalid_bundle_id",
    "Bundle identifier is not valid",
    "Pass a reverse-DNS bundle identifier such as com.example.App.",
);
const PATH_NOT_ALLOWED_ERROR: ToolErrorDescriptor = ToolErrorDescriptor::new(
    "path_not_allowed",
    "app_path is outside the allowlist",
    "Update xcode.allowed_paths in config.toml and restart the MCP server.",
);
const INVALID_REQUEST_ERROR: ToolErrorDescriptor = ToolErrorDescriptor::new(
    "invalid_request",
    "The simulator request format is invalid",
    "Check the constraints for app_path, launch args, and capture duration.",
);
const SIMCTL_FAILED_ERROR: ToolErrorDescriptor = ToolErrorDescriptor::new(
    "simctl_failed",
    "simctl exited with an error",
    "Check that the simulator exists and is in a usable state, then retry.",
);
const SIMCTL_UNPARSEABLE_ERROR: ToolErrorDescriptor = ToolErrorDescriptor::new(
    "simctl_unparseable",
    "simctl produced unexpected output",
    "Update Xcode or file an issue with the captured output attached.",
);
const CAPTURE_FAILED_ERROR: ToolErrorDescriptor = ToolErrorDescriptor::new(
    "capture_failed",
    "Captured output could not be stored",
    "Check free disk space under the artifact directory and retry.",
);

/// Spawn a prepared simctl command and surface failures as `SimctlError`.
pub(crate) async fn run_simctl(mut command: Command) -> Result<std::process::Output, SimctlError> {
    let output = command
        .output()
        .await
        .map_err(|err| SimctlError::CommandFailed {
            exit_code: None,
            message: err.to_string(),
        })?;
    Ok(output)
}

/// Convert simctl errors into MCP error data.
pub fn simctl_error_to_error_data(err: SimctlError) -> ErrorData {
    let (descriptor, policy_state, retryable) = match &err {
        SimctlError::InvalidUdid { .. } => {
            (&INVALID_UDID_ERROR, PolicyState::NotApplicable, false)
        }
        SimctlError::InvalidBundleId { .. } => {
            (&INVALID_BUNDLE_ID_ERROR, PolicyState::NotApplicable, false)
        }
        SimctlError::PathNotAllowed { .. } => {
            (&PATH_NOT_ALLOWED_ERROR, PolicyState::Violation, false)
        }
        SimctlError::InvalidRequest { .. } => {
            (&INVALID_REQUEST_ERROR, PolicyState::Compliant, false)
        }
        SimctlError::CommandFailed { .. } => (&SIMCTL_FAILED_ERROR, PolicyState::Compliant, true),
        SimctlError::MalformedOutput { .. } => {
            (&SIMCTL_UNPARSEABLE_ERROR, PolicyState::Compliant, false)
        }
        SimctlError::CaptureFailure { .. } => {
            (&CAPTURE_FAILED_ERROR, PolicyState::Compliant, true)
        }
    };
    descriptor
        .builder()
        .policy_state(policy_state)
        .retryable(retryable)
        .details(json!({ "details": err.to_string() }))
        .build()
        .expect("descriptor is valid")
}
