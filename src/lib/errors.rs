use std::{io, path::PathBuf};

use config::ConfigError as ConfigLoaderError;
use rmcp::model::ErrorData;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use thiserror::Error;
use zip::result::ZipError;

/// Errors that can occur while loading or validating configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to build (read) the configuration file.
    #[error("Failed to read configuration file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: ConfigLoaderError,
    },
    /// Failed to deserialize TOML into a struct.
    #[error("Failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ConfigLoaderError,
    },
    /// Required field is missing.
    #[error("Configuration file {path} is missing `{field}`")]
    MissingField { path: PathBuf, field: &'static str },
    /// Field failed validation.
    #[error("Configuration file {path} has invalid `{field}`: {message}")]
    InvalidField {
        path: PathBuf,
        field: &'static str,
        message: String,
    },
}

impl ConfigError {
    /// Helper to wrap `config::ConfigError` as a read failure.
    pub fn from_read_error(path: PathBuf, source: ConfigLoaderError) -> Self {
        Self::FileRead { path, source }
    }

    /// Helper to wrap `config::ConfigError` as a parse failure.
    pub fn from_parse_error(path: PathBuf, source: ConfigLoaderError) -> Self {
        Self::Parse { path, source }
    }
}

/// High-level failure types returned while running an xcodebuild job.
#[derive(Debug, Error)]
pub enum XcodeCommandError {
    #[error("Path outside the allowed directories was provided: {path}")]
    PathNotAllowed { path: PathBuf },
    #[error("xcodebuild exited abnormally (exit={exit_code:?}): {message}")]
    CommandFailed {
        exit_code: Option<i32>,
        message: String,
    },
    #[error("xcodebuild job timed out after {duration_secs} seconds")]
    Timeout { duration_secs: u64 },
    #[error("Failed to process build artifacts: {message}")]
    ArtifactFailure { message: String },
}

/// Failure types for `xcrun simctl` invocations.
#[derive(Debug, Error)]
pub enum SimctlError {
    #[error("Simulator identifier `{udid}` is not valid")]
    InvalidUdid { udid: String },
    #[error("Bundle identifier `{bundle_id}` is not valid")]
    InvalidBundleId { bundle_id: String },
    #[error("Path outside the allowed directories was provided: {path}")]
    PathNotAllowed { path: PathBuf },
    #[error("Request is invalid: {message}")]
    InvalidRequest { message: String },
    #[error("simctl exited abnormally (exit={exit_code:?}): {message}")]
    CommandFailed {
        exit_code: Option<i32>,
        message: String,
    },
    #[error("simctl output could not be parsed: {message}")]
    MalformedOutput { message: String },
    #[error("Failed to store captured output: {message}")]
    CaptureFailure { message: String },
}

/// Failure reasons for the diagnostics collector.
#[derive(Debug, Error)]
pub enum DiagnosticsError {
    #[error("xcodebuild could not be probed: {message}")]
    XcodebuildUnavailable { message: String },
    #[error("simctl could not be probed: {message}")]
    SimctlUnavailable { message: String },
    #[error("Insufficient free space for build jobs (available={available_bytes} bytes)")]
    DiskInsufficient { available_bytes: u64 },
    #[error("Internal diagnostics error: {message}")]
    Internal { message: String },
}

/// Errors occurring while operating on artifact directories.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("I/O failed for file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to delete artifact {path}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to create zip ({path}): {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: ZipError,
    },
    #[error("Artifact source {path} is not a directory")]
    InvalidSource { path: PathBuf },
}

impl From<ArtifactError> for XcodeCommandError {
    fn from(value: ArtifactError) -> Self {
        XcodeCommandError::ArtifactFailure {
            message: value.to_string(),
        }
    }
}

/// Structured error metadata returned by MCP tools.
#[derive(Debug, Clone, Serialize)]
pub struct ToolErrorDescriptor {
    /// Error code.
    pub code: &'static str,
    /// User-facing message.
    pub message: &'static str,
    /// Recommended remediation.
    pub remediation: &'static str,
}

impl ToolErrorDescriptor {
    /// Simple constructor.
    pub const fn new(code: &'static str, message: &'static str, remediation: &'static str) -> Self {
        Self {
            code,
            message,
            remediation,
        }
    }

    /// Create a builder.
    pub fn builder(&self) -> ToolErrorDescriptorBuilder<'_> {
        ToolErrorDescriptorBuilder::new(self)
    }
}

/// Whether the failing request violated the configured access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyState {
    NotApplicable,
    Compliant,
    Violation,
}

impl PolicyState {
    fn as_str(&self) -> &'static str {
        match self {
            PolicyState::NotApplicable => "not_applicable",
            PolicyState::Compliant => "compliant",
            PolicyState::Violation => "violation",
        }
    }
}

/// Builder for error data that fails if required fields are missing.
pub struct ToolErrorDescriptorBuilder<'a> {
    descriptor: &'a ToolErrorDescriptor,
    retryable: Option<bool>,
    policy_state: Option<PolicyState>,
    details: Option<Value>,
    extra_fields: Map<String, Value>,
}

impl<'a> ToolErrorDescriptorBuilder<'a> {
    pub fn new(descriptor: &'a ToolErrorDescriptor) -> Self {
        Self {
            descriptor,
            retryable: None,
            policy_state: None,
            details: None,
            extra_fields: Map::new(),
        }
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    pub fn policy_state(mut self, state: PolicyState) -> Self {
        self.policy_state = Some(state);
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_context_field(mut self, key: &str, value: Value) -> Self {
        self.extra_fields.insert(key.to_string(), value);
        self
    }

    pub fn with_exit_code_value(mut self, exit_code: u8) -> Self {
        let numeric = Number::from(exit_code);
        self.extra_fields
            .insert("exit_code".into(), Value::Number(numeric));
        self
    }

    pub fn build(self) -> Result<ErrorData, ToolErrorBuilderError> {
        if self.descriptor.remediation.trim().is_empty() {
            return Err(ToolErrorBuilderError::MissingRemediation {
                code: self.descriptor.code,
            });
        }
        let retryable = self
            .retryable
            .ok_or(ToolErrorBuilderError::MissingRetryable {
                code: self.descriptor.code,
            })?;
        let policy_state = self
            .policy_state
            .ok_or(ToolErrorBuilderError::MissingPolicyState {
                code: self.descriptor.code,
            })?;

        let mut data = Map::new();
        data.insert("code".into(), Value::String(self.descriptor.code.into()));
        data.insert(
            "remediation".into(),
            Value::String(self.descriptor.remediation.into()),
        );
        data.insert("retryable".into(), Value::Bool(retryable));
        data.insert(
            "policy_state".into(),
            Value::String(policy_state.as_str().into()),
        );
        if let Some(details) = self.details {
            data.insert("details".into(), details);
        }
        for (key, value) in self.extra_fields {
            data.insert(key, value);
        }

        Ok(ErrorData::invalid_params(
            self.descriptor.message,
            Some(Value::Object(data)),
        ))
    }
}

/// Errors when required builder fields are missing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolErrorBuilderError {
    #[error("retryable is missing (code={code})")]
    MissingRetryable { code: &'static str },
    #[error("policy_state is missing (code={code})")]
    MissingPolicyState { code: &'static str },
    #[error("remediation is empty (code={code})")]
    MissingRemediation { code: &'static str },
}

/// Standard error for authentication mismatches.
pub const AUTH_TOKEN_MISMATCH_ERROR: ToolErrorDescriptor = ToolErrorDescriptor::new(
    "AUTH_TOKEN_MISMATCH",
    "MCP_SHARED_TOKEN does not match config.toml [auth].token",
    "Set the same token in both the MCP client and config.toml before retrying.",
);

/// Standard error when no token is provided.
pub const MCP_TOKEN_REQUIRED_ERROR: ToolErrorDescriptor = ToolErrorDescriptor::new(
    "MCP_TOKEN_REQUIRED",
    "MCP_SHARED_TOKEN is unset or shorter than 16 characters",
    "Set MCP_SHARED_TOKEN to a random string at least 16 characters long that matches config.toml.",
);

/// Standard error when executed without an MCP client.
pub const MCP_CLIENT_REQUIRED_ERROR: ToolErrorDescriptor = ToolErrorDescriptor::new(
    "MCP_CLIENT_REQUIRED",
    "This binary can only be executed via an MCP client",
    "Launch through an MCP client such as `npx @modelcontextprotocol/inspector target/release/xcbridge-mcp`.",
);
