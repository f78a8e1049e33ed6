//! Screenshot capture via `simctl io <udid> screenshot`.

use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    lib::{errors::SimctlError, output as output_helpers, simctl},
    server::config::SimulatorConfig,
};

const LOG_EXCERPT_LIMIT: usize = 1_000;

/// Input for `capture_screenshot`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CaptureScreenshotRequest {
    /// Device UDID or the literal `booted`.
    pub udid: String,
}

/// Response from `capture_screenshot`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CaptureScreenshotResponse {
    pub udid: String,
    pub screenshot_path: String,
}

/// Capture one PNG screenshot into the capture directory.
pub async fn capture_screenshot(
    request: &CaptureScreenshotRequest,
    config: &SimulatorConfig,
    capture_dir: &Path,
) -> Result<CaptureScreenshotResponse, SimctlError> {
    if !simctl::is_valid_udid(&request.udid) {
        return Err(SimctlError::InvalidUdid {
            udid: request.udid.clone(),
        });
    }

    std::fs::create_dir_all(capture_dir).map_err(|err| SimctlError::CaptureFailure {
        message: format!("failed to create capture directory: {err}"),
    })?;
    let screenshot_path = capture_dir.join(format!("screenshot-{}.png", Uuid::new_v4()));
    let path_arg = screenshot_path.to_string_lossy().to_string();

    let command = simctl::build_simctl_command(
        &config.xcrun_path,
        "io",
        &[request.udid.as_str(), "screenshot", path_arg.as_str()],
    );
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

    Ok(CaptureScreenshotResponse {
        udid: request.udid.clone(),
        screenshot_path: path_arg,
    })
}
