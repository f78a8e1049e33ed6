//! Simulator discovery via `simctl list devices --json`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    lib::{errors::SimctlError, simctl},
    server::config::SimulatorConfig,
};

/// Input for `list_simulators`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ListSimulatorsRequest {
    /// Substring filter on the runtime identifier (e.g. `iOS-18`).
    #[serde(default)]
    pub runtime: Option<String>,
    /// Only return devices whose state is `Booted`.
    #[serde(default)]
    pub booted_only: bool,
}

/// One simulator device entry.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct SimulatorDevice {
    pub udid: String,
    pub name: String,
    pub state: String,
    pub runtime: String,
    pub is_available: bool,
}

/// Response from `list_simulators`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListSimulatorsResponse {
    pub devices: Vec<SimulatorDevice>,
}

/// Execute simulator discovery.
pub async fn list_simulators(
    request: &ListSimulatorsRequest,
    config: &SimulatorConfig,
) -> Result<ListSimulatorsResponse, SimctlError> {
    let command = simctl::build_simctl_command(
        &config.xcrun_path,
        "list",
        &["devices", "--json"],
    );
    let output = super::run_simctl(command).await?;
    if !output.status.success() {
        return Err(SimctlError::CommandFailed {
            exit_code: output.status.code(),
            message: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    parse_device_list(&output.stdout, request)
}

/// Parse the `devices` map keyed by runtime identifier.
fn parse_device_list(
    stdout: &[u8],
    request: &ListSimulatorsRequest,
) -> Result<ListSimulatorsResponse, SimctlError> {
    let value: serde_json::Value =
        serde_json::from_slice(stdout).map_err(|err| SimctlError::MalformedOutput {
            message: err.to_string(),
        })?;
    let runtimes = value
        .get("devices")
        .and_then(|v| v.as_object())
        .ok_or_else(|| SimctlError::MalformedOutput {
            message: "`devices` key missing or not an object".into(),
        })?;

    let mut devices = Vec::new();
    for (runtime, entries) in runtimes {
        if let Some(filter) = &request.runtime {
            if !runtime.contains(filter.as_str()) {
                continue;
            }
        }
        let Some(entries) = entries.as_array() else {
            continue;
        };
        for entry in entries {
            let state = entry
                .get("state")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            if request.booted_only && state != "Booted" {
                continue;
            }
            devices.push(SimulatorDevice {
                udid: entry
                    .get("udid")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                name: entry
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                state,
                runtime: runtime.clone(),
                is_available: entry
                    .get("isAvailable")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
            });
        }
    }

    Ok(ListSimulatorsResponse { devices })
}
