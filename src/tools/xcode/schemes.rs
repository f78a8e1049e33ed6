//! Scheme discovery via `xcodebuild -list -json`.

use std::{path::PathBuf, time::Duration};

use rmcp::model::ErrorData;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::time;

use crate::{
    lib::{
        errors::{PolicyState, ToolErrorDescriptor},
        paths, xcodebuild,
    },
    server::config::XcodeConfig,
};

const LIST_TIMEOUT_SECS: u64 = 60;

const PATH_NOT_ALLOWED_ERROR: ToolErrorDescriptor = ToolErrorDescriptor::new(
    "path_not_allowed",
    "project_path is outside the allowlist",
    "Update xcode.allowed_paths in config.toml and restart the MCP server.",
);
const LIST_FAILED_ERROR: ToolErrorDescriptor = ToolErrorDescriptor::new(
    "scheme_listing_failed",
    "xcodebuild -list exited with an error",
    "Confirm the project opens in Xcode and that the path points at a project or workspace.",
);
const LIST_UNPARSEABLE_ERROR: ToolErrorDescriptor = ToolErrorDescriptor::new(
    "scheme_listing_unparseable",
    "xcodebuild -list produced unexpected output",
    "Update Xcode or file an issue with the captured output attached.",
);

/// Input for `list_schemes`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListSchemesRequest {
    pub project_path: PathBuf,
    #[serde(default)]
    pub workspace: Option<PathBuf>,
}

/// Response from `list_schemes`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListSchemesResponse {
    pub name: String,
    pub schemes: Vec<String>,
    pub configurations: Vec<String>,
}

/// Error types for `list_schemes`.
#[derive(Debug, Error)]
pub enum ListSchemesError {
    #[error("project_path `{path}` is outside the allowlist")]
    PathNotAllowed { path: PathBuf },
    #[error("xcodebuild -list failed (exit={exit_code:?}): {message}")]
    CommandFailed {
        exit_code: Option<i32>,
        message: String,
    },
    #[error("xcodebuild -list timed out after {duration_secs} seconds")]
    Timeout { duration_secs: u64 },
    #[error("xcodebuild -list output could not be parsed: {message}")]
    Unparseable { message: String },
}

/// Execute scheme discovery for a project or workspace.
pub async fn list_schemes(
    request: &ListSchemesRequest,
    config: &XcodeConfig,
) -> Result<ListSchemesResponse, ListSchemesError> {
    if !paths::is_nonempty_absolute(&request.project_path) {
        return Err(ListSchemesError::PathNotAllowed {
            path: request.project_path.clone(),
        });
    }
    if !config.allowed_paths.is_empty()
        && !paths::is_allowed_path(&request.project_path, &config.allowed_paths)
    {
        return Err(ListSchemesError::PathNotAllowed {
            path: request.project_path.clone(),
        });
    }

    let mut command = xcodebuild::build_list_command(
        &config.xcodebuild_path,
        &config.developer_dir,
        &request.project_path,
        request.workspace.as_deref(),
    );

    let output = time::timeout(Duration::from_secs(LIST_TIMEOUT_SECS), command.output())
        .await
        .map_err(|_| ListSchemesError::Timeout {
            duration_secs: LIST_TIMEOUT_SECS,
        })?
        .map_err(|err| ListSchemesError::CommandFailed {
            exit_code: None,
            message: err.to_string(),
        })?;

    if !output.status.success() {
        return Err(ListSchemesError::CommandFailed {
            exit_code: output.status.code(),
            message: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    parse_list_output(&output.stdout)
}

/// Parse `xcodebuild -list -json` output for either a project or workspace.
fn parse_list_output(stdout: &[u8]) -> Result<ListSchemesResponse, ListSchemesError> {
    let value: serde_json::Value =
        serde_json::from_slice(stdout).map_err(|err| ListSchemesError::Unparseable {
            message: err.to_string(),
        })?;

    let container = value
        .get("project")
        .or_else(|| value.get("workspace"))
        .ok_or_else(|| ListSchemesError::Unparseable {
            message: "neither `project` nor `workspace` key present".into(),
        })?;

    let name = container
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let schemes = string_array(container, "schemes");
    let configurations = string_array(container, "configurations");

    Ok(ListSchemesResponse {
        name,
        schemes,
        configurations,
    })
}

fn string_array(container: &serde_json::Value, key: &str) -> Vec<String> {
    container
        .get(key)
        .and_then(|v| v.as_array())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Convert listing errors into MCP error data.
pub fn schemes_error_to_error_data(err: ListSchemesError) -> ErrorData {
    let (descriptor, policy_state, retryable) = match &err {
        ListSchemesError::PathNotAllowed { .. } => {
            (&PATH_NOT_ALLOWED_ERROR, PolicyState::Violation, false)
        }
        ListSchemesError::CommandFailed { .. } | ListSchemesError::Timeout { .. } => {
            (&LIST_FAILED_ERROR, PolicyState::Compliant, true)
        }
        ListSchemesError::Unparseable { .. } => {
            (&LIST_UNPARSEABLE_ERROR, PolicyState::Compliant, false)
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
