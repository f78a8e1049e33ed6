//! Simulator lifecycle: boot and shutdown.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    lib::{errors::SimctlError, output as output_helpers, simctl},
    server::config::SimulatorConfig,
};

const LOG_EXCERPT_LIMIT: usize = 1_000;

/// Input for `boot_simulator` / `shutdown_simulator`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SimulatorControlRequest {
    /// Device UDID or the literal `booted`.
    pub udid: String,
}

/// Response from the lifecycle tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SimulatorControlResponse {
    pub udid: String,
    pub status: String,
}

/// Boot a simulator. Booting an already-booted device is not an error.
pub async fn boot_simulator(
    request: &SimulatorControlRequest,
    config: &SimulatorConfig,
) -> Result<SimulatorControlResponse, SimctlError> {
    run_lifecycle(request, config, "boot", "booted", "Booted").await
}

/// Shut a simulator down. Shutting down a stopped device is not an error.
pub async fn shutdown_simulator(
    request: &SimulatorControlRequest,
    config: &SimulatorConfig,
) -> Result<SimulatorControlResponse, SimctlError> {
    run_lifecycle(request, config, "shutdown", "shutdown", "Shutdown").await
}

async fn run_lifecycle(
    request: &SimulatorControlRequest,
    config: &SimulatorConfig,
    subcommand: &str,
    success_status: &str,
    benign_state: &str,
) -> Result<SimulatorControlResponse, SimctlError> {
    if !simctl::is_valid_udid(&request.udid) {
        return Err(SimctlError::InvalidUdid {
            udid: request.udid.clone(),
        });
    }

    let command =
        simctl::build_simctl_command(&config.xcrun_path, subcommand, &[request.udid.as_str()]);
    let output = super::run_simctl(command).await?;

    if output.status.success() {
        return Ok(SimulatorControlResponse {
            udid: request.udid.clone(),
            status: success_status.to_string(),
        });
    }

    // simctl exits non-zero when the device is already in the target state;
    // that outcome is reported as a distinct status, not an error.
    let stderr = output_helpers::collect_log_excerpt(&[], &output.stderr, LOG_EXCERPT_LIMIT);
    if stderr.contains(&format!("current state: {benign_state}")) {
        return Ok(SimulatorControlResponse {
            udid: request.udid.clone(),
            status: format!("already_{success_status}"),
        });
    }

    Err(SimctlError::CommandFailed {
        exit_code: output.status.code(),
        message: stderr,
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::server::config::SimulatorConfig;

    use super::*;

    fn sample_config() -> SimulatorConfig {
        SimulatorConfig {
            xcrun_path: PathBuf::from("/usr/bin/xcrun"),
            max_log_capture_secs: 30,
        }
    }

    #[tokio::test]
    async fn invalid_udid_is_rejected_before_spawn() {
        let request = SimulatorControlRequest {
            udid: "booted; rm -rf /".into(),
        };
        let error = boot_simulator(&request, &sample_config())
            .await
            .expect_err("invalid udid must fail");
        assert!(matches!(error, SimctlError::InvalidUdid { .. }));
    }
}
