use std::{
    env, fs,
    path::Path,
    time::{Duration, Instant},
};

use rmcp::model::ErrorData;
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time;
use tracing::info;
use uuid::Uuid;

use crate::{
    lib::{
        errors::{PolicyState, ToolErrorDescriptor, XcodeCommandError},
        fs as artifact_fs, output as output_helpers,
        telemetry::JobSpan,
        xcodebuild::{self, XcodeAction},
    },
    server::config::XcodeConfig,
};

use super::{BuildRequestValidationError, XcodeBuildRequest};

const LOG_EXCERPT_LIMIT: usize = 5_000;

const PATH_NOT_ALLOWED_ERROR: ToolErrorDescriptor = ToolErrorDescriptor::new(
    "path_not_allowed",
    "project_path is outside the allowlist",
    "Update xcode.allowed_paths in config.toml and restart the MCP server.",
);
const INVALID_INPUT_ERROR: ToolErrorDescriptor = ToolErrorDescriptor::new(
    "invalid_request",
    "The xcodebuild request format is invalid",
    "Check the constraints for destination, extra_args, and workspace.",
);
const SCHEME_NOT_ALLOWED_ERROR: ToolErrorDescriptor = ToolErrorDescriptor::new(
    "scheme_not_allowed",
    "scheme is not in the allowlist",
    "Update xcode.allowed_schemes in config.toml or use an allowed scheme.",
);
const TIMEOUT_ERROR: ToolErrorDescriptor = ToolErrorDescriptor::new(
    "timeout",
    "Job was aborted after exceeding max_build_minutes",
    "Shorten the build time or increase max_build_minutes.",
);
const JOB_FAILED_ERROR: ToolErrorDescriptor = ToolErrorDescriptor::new(
    "xcodebuild_failed",
    "xcodebuild exited with an error",
    "Review the log excerpt and fix the failing targets.",
);

/// Response from `build_project`.
#[derive(Debug, Serialize, JsonSchema)]
pub struct BuildProjectResponse {
    pub job_id: String,
    pub status: &'static str,
    pub artifact_path: String,
    pub artifact_sha256: String,
    pub log_excerpt: String,
    pub duration_ms: u128,
}

/// Response from `run_tests`.
#[derive(Debug, Serialize, JsonSchema)]
pub struct RunTestsResponse {
    pub job_id: String,
    pub status: &'static str,
    pub log_excerpt: String,
    pub duration_ms: u128,
}

/// Response from `clean_project`.
#[derive(Debug, Serialize, JsonSchema)]
pub struct CleanProjectResponse {
    pub job_id: String,
    pub status: &'static str,
    pub log_excerpt: String,
    pub duration_ms: u128,
}

/// Raw result of one xcodebuild job before a tool-specific response is built.
#[derive(Debug)]
pub struct XcodeJobOutput {
    pub log_excerpt: String,
    pub duration_ms: u128,
    /// Zipped build products, present for `build` jobs only.
    pub artifact: Option<JobArtifact>,
}

#[derive(Debug)]
pub struct JobArtifact {
    pub zip_path: String,
    pub sha256: String,
}

/// Execute one xcodebuild job (build, test, or clean).
pub async fn run_xcode_job(
    action: XcodeAction,
    request: &XcodeBuildRequest,
    config: &XcodeConfig,
    job_id: Uuid,
    artifact_root: &Path,
) -> Result<XcodeJobOutput, XcodeCommandError> {
    let job_dir = artifact_fs::ensure_job_dir(artifact_root, &job_id)?;
    let staging_dir = job_dir.join("staging");
    fs::create_dir_all(&staging_dir).map_err(|err| XcodeCommandError::ArtifactFailure {
        message: format!("Failed to create artifact staging directory: {err}"),
    })?;

    let time_scale = env::var("XCBRIDGE_TEST_TIME_SCALE")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|scale| *scale > 0)
        .unwrap_or(60);
    let timeout_duration = Duration::from_secs(config.max_build_minutes as u64 * time_scale);
    let start = Instant::now();
    let span = JobSpan::start(job_id, action.as_str());
    let output = match time::timeout(
        timeout_duration,
        spawn_xcodebuild(action, request, config, &staging_dir),
    )
    .await
    {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            span.finish("spawn_failed", None);
            return Err(XcodeCommandError::CommandFailed {
                exit_code: None,
                message: err.to_string(),
            });
        }
        Err(_) => {
            span.finish("timeout", None);
            return Err(XcodeCommandError::Timeout {
                duration_secs: timeout_duration.as_secs(),
            });
        }
    };

    let log_excerpt =
        output_helpers::collect_log_excerpt(&output.stdout, &output.stderr, LOG_EXCERPT_LIMIT);
    if !output.status.success() {
        span.finish("failed", output.status.code());
        return Err(XcodeCommandError::CommandFailed {
            exit_code: output.status.code(),
            message: log_excerpt,
        });
    }
    span.finish("succeeded", output.status.code());

    let artifact = if action == XcodeAction::Build {
        let artifact_zip = job_dir.join("artifact.zip");
        artifact_fs::zip_directory(&staging_dir, &artifact_zip)?;
        let sha256 = artifact_fs::compute_sha256(&artifact_zip)?;
        Some(JobArtifact {
            zip_path: artifact_zip.to_string_lossy().to_string(),
            sha256,
        })
    } else {
        None
    };

    Ok(XcodeJobOutput {
        log_excerpt,
        duration_ms: start.elapsed().as_millis(),
        artifact,
    })
}

async fn spawn_xcodebuild(
    action: XcodeAction,
    request: &XcodeBuildRequest,
    config: &XcodeConfig,
    staging_dir: &Path,
) -> std::io::Result<std::process::Output> {
    let destination = request.resolved_destination(config);
    let mut command = xcodebuild::build_xcodebuild_command(
        xcodebuild::XcodebuildCommandConfig {
            xcodebuild_path: &config.xcodebuild_path,
            developer_dir: &config.developer_dir,
            staging_dir,
        },
        xcodebuild::XcodebuildInvocation {
            action,
            project_path: &request.project_path,
            workspace: request.workspace.as_deref(),
            scheme: &request.scheme,
            configuration: request.configuration.as_str(),
            destination: &destination,
            extra_args: &request.extra_args,
            env_overrides: &request.env_overrides,
        },
    );

    info!(
        target: "xcbridge::xcode",
        action = action.as_str(),
        scheme = %request.scheme,
        destination = %destination,
        "Starting xcodebuild job"
    );

    command.output().await
}

pub fn validation_error_to_error_data(err: BuildRequestValidationError) -> ErrorData {
    match err {
        BuildRequestValidationError::ProjectPathNotAllowed { path }
        | BuildRequestValidationError::WorkspaceNotAllowed { path } => build_error_data(
            &PATH_NOT_ALLOWED_ERROR,
            json!({ "path": path.to_string_lossy() }),
            PolicyState::Violation,
            false,
        ),
        BuildRequestValidationError::SchemeNotAllowed { scheme } => build_error_data(
            &SCHEME_NOT_ALLOWED_ERROR,
            json!({ "scheme": scheme }),
            PolicyState::Violation,
            false,
        ),
        _ => build_error_data(
            &INVALID_INPUT_ERROR,
            json!({ "details": err.to_string() }),
            PolicyState::Compliant,
            false,
        ),
    }
}

pub fn runtime_error_to_error_data(err: XcodeCommandError, job_id: Uuid) -> ErrorData {
    match err {
        XcodeCommandError::PathNotAllowed { path } => build_error_data_with_job(
            &PATH_NOT_ALLOWED_ERROR,
            json!({ "path": path.to_string_lossy() }),
            PolicyState::Violation,
            false,
            job_id,
        ),
        XcodeCommandError::Timeout { duration_secs } => build_error_data_with_job(
            &TIMEOUT_ERROR,
            json!({ "duration_secs": duration_secs }),
            PolicyState::Compliant,
            true,
            job_id,
        ),
        _ => build_error_data_with_job(
            &JOB_FAILED_ERROR,
            json!({ "details": err.to_string() }),
            PolicyState::Compliant,
            true,
            job_id,
        ),
    }
}

fn build_error_data(
    desc: &'static ToolErrorDescriptor,
    details: Value,
    policy_state: PolicyState,
    retryable: bool,
) -> ErrorData {
    desc.builder()
        .details(details)
        .policy_state(policy_state)
        .retryable(retryable)
        .build()
        .expect("descriptor is valid")
}

fn build_error_data_with_job(
    desc: &'static ToolErrorDescriptor,
    details: Value,
    policy_state: PolicyState,
    retryable: bool,
    job_id: Uuid,
) -> ErrorData {
    desc.builder()
        .details(details)
        .policy_state(policy_state)
        .retryable(retryable)
        .with_context_field("job_id", json!(job_id.to_string()))
        .build()
        .expect("descriptor is valid")
}

#[cfg(test)]
mod tests {
    use rmcp::model::ErrorData;
    use serde_json::{Map, Value};

    use super::*;

    #[test]
    fn validation_error_maps_to_structured_error_fields() {
        let err = BuildRequestValidationError::SchemeNotAllowed {
            scheme: "Nope".into(),
        };
        let data = extract_data(&validation_error_to_error_data(err));
        assert_eq!(
            data.get("code").and_then(Value::as_str),
            Some("scheme_not_allowed")
        );
        assert_eq!(
            data.get("policy_state").and_then(Value::as_str),
            Some("violation")
        );
        assert_eq!(data.get("retryable").and_then(Value::as_bool), Some(false));
    }

    #[test]
    fn runtime_timeout_maps_to_retryable_error_with_job_id() {
        let job_id = Uuid::new_v4();
        let expected_job_id = job_id.to_string();
        let err = XcodeCommandError::Timeout { duration_secs: 123 };
        let data = extract_data(&runtime_error_to_error_data(err, job_id));
        assert_eq!(data.get("code").and_then(Value::as_str), Some("timeout"));
        assert_eq!(
            data.get("policy_state").and_then(Value::as_str),
            Some("compliant")
        );
        assert_eq!(data.get("retryable").and_then(Value::as_bool), Some(true));
        assert_eq!(
            data.get("job_id").and_then(Value::as_str),
            Some(expected_job_id.as_str())
        );
    }

    #[test]
    fn runtime_job_failure_maps_to_retryable_error() {
        let job_id = Uuid::new_v4();
        let err = XcodeCommandError::CommandFailed {
            exit_code: Some(1),
            message: "fail".into(),
        };
        let data = extract_data(&runtime_error_to_error_data(err, job_id));
        assert_eq!(
            data.get("code").and_then(Value::as_str),
            Some("xcodebuild_failed")
        );
        assert_eq!(
            data.get("policy_state").and_then(Value::as_str),
            Some("compliant")
        );
        assert_eq!(data.get("retryable").and_then(Value::as_bool), Some(true));
    }

    #[test]
    fn validation_invalid_request_maps_to_compliant_non_retryable_error() {
        let err = BuildRequestValidationError::DestinationMissingPlatform;
        let data = extract_data(&validation_error_to_error_data(err));
        assert_eq!(
            data.get("code").and_then(Value::as_str),
            Some("invalid_request")
        );
        assert_eq!(
            data.get("policy_state").and_then(Value::as_str),
            Some("compliant")
        );
        assert_eq!(data.get("retryable").and_then(Value::as_bool), Some(false));
    }

    fn extract_data(error: &ErrorData) -> Map<String, Value> {
        error
            .data
            .as_ref()
            .and_then(|value| value.as_object())
            .cloned()
            .expect("error data should be an object")
    }
}
