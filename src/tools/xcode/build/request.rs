use std::{collections::BTreeMap, path::PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::server::config::XcodeConfig;

const MAX_PROJECT_PATH_LEN: usize = 512;
const MAX_SCHEME_LEN: usize = 128;
const MAX_DESTINATION_LEN: usize = 256;
const MAX_EXTRA_ARGS: usize = 5;
const MAX_EXTRA_ARG_LEN: usize = 64;

/// `xcodebuild` flags allowed in `extra_args`.
pub const ALLOWED_EXTRA_ARGS: &[&str] = &[
    "-quiet",
    "-UseModernBuildSystem=YES",
    "-skipPackagePluginValidation",
    "-allowProvisioningUpdates",
    "-parallelizeTargets",
];

/// Environment variables allowed in `env_overrides`.
pub const ALLOWED_ENV_OVERRIDES: &[&str] = &[
    "DEVELOPER_DIR",
    "NSUnbufferedIO",
    "CI",
    "MOCK_XCODEBUILD_BEHAVIOR",
];

/// Build configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildConfiguration {
    #[default]
    Debug,
    Release,
}

impl BuildConfiguration {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildConfiguration::Debug => "Debug",
            BuildConfiguration::Release => "Release",
        }
    }
}

/// Input shared by `build_project`, `run_tests`, and `clean_project`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct XcodeBuildRequest {
    pub project_path: PathBuf,
    #[serde(default)]
    pub workspace: Option<PathBuf>,
    pub scheme: String,
    #[serde(default)]
    pub configuration: BuildConfiguration,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default)]
    pub env_overrides: BTreeMap<String, String>,
}

impl XcodeBuildRequest {
    /// Validate the input and ensure it complies with the configured policy.
    pub fn validate(&self, policy: &XcodeConfig) -> Result<(), BuildRequestValidationError> {
        if self.project_path.as_os_str().is_empty() {
            return Err(BuildRequestValidationError::MissingProjectPath);
        }
        if !crate::lib::paths::is_nonempty_absolute(&self.project_path) {
            return Err(BuildRequestValidationError::ProjectPathNotAbsolute);
        }
        if self.project_path.to_string_lossy().len() > MAX_PROJECT_PATH_LEN {
            return Err(BuildRequestValidationError::ProjectPathTooLong);
        }
        if !policy.allowed_paths.is_empty()
            && !crate::lib::paths::is_allowed_path(&self.project_path, &policy.allowed_paths)
        {
            return Err(BuildRequestValidationError::ProjectPathNotAllowed {
                path: self.project_path.clone(),
            });
        }

        if let Some(workspace) = &self.workspace {
            if !crate::lib::paths::is_nonempty_absolute(workspace) {
                return Err(BuildRequestValidationError::WorkspaceNotAllowed {
                    path: workspace.clone(),
                });
            }
            if !policy.allowed_paths.is_empty()
                && !crate::lib::paths::is_allowed_path(workspace, &policy.allowed_paths)
            {
                return Err(BuildRequestValidationError::WorkspaceNotAllowed {
                    path: workspace.clone(),
                });
            }
        }

        if self.scheme.trim().is_empty() {
            return Err(BuildRequestValidationError::MissingScheme);
        }
        if self.scheme.chars().count() > MAX_SCHEME_LEN {
            return Err(BuildRequestValidationError::SchemeTooLong {
                length: self.scheme.chars().count(),
            });
        }
        if !policy.allowed_schemes.is_empty()
            && !policy
                .allowed_schemes
                .iter()
                .any(|allowed| allowed == &self.scheme)
        {
            return Err(BuildRequestValidationError::SchemeNotAllowed {
                scheme: self.scheme.clone(),
            });
        }

        let destination = self.resolved_destination(policy);
        let destination = destination.trim();
        if destination.is_empty() {
            return Err(BuildRequestValidationError::DestinationEmpty);
        }
        if destination.len() > MAX_DESTINATION_LEN {
            return Err(BuildRequestValidationError::DestinationTooLong {
                length: destination.len(),
            });
        }
        if !destination.contains("platform=") {
            return Err(BuildRequestValidationError::DestinationMissingPlatform);
        }

        if self.extra_args.len() > MAX_EXTRA_ARGS {
            return Err(BuildRequestValidationError::TooManyExtraArgs {
                count: self.extra_args.len(),
            });
        }
        for arg in &self.extra_args {
            if arg.len() > MAX_EXTRA_ARG_LEN {
                return Err(BuildRequestValidationError::ExtraArgTooLong {
                    arg: arg.clone(),
                    length: arg.len(),
                });
            }
            if !ALLOWED_EXTRA_ARGS.contains(&arg.as_str()) {
                return Err(BuildRequestValidationError::ExtraArgNotAllowed { arg: arg.clone() });
            }
        }

        for key in self.env_overrides.keys() {
            if !ALLOWED_ENV_OVERRIDES.contains(&key.as_str()) {
                return Err(BuildRequestValidationError::EnvOverrideNotAllowed {
                    key: key.clone(),
                });
            }
        }

        Ok(())
    }

    /// Destination from the request, falling back to the configured default.
    pub fn resolved_destination(&self, policy: &XcodeConfig) -> String {
        self.destination
            .clone()
            .unwrap_or_else(|| policy.default_destination.clone())
    }
}

/// Input validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildRequestValidationError {
    #[error("project_path is required")]
    MissingProjectPath,
    #[error("project_path must be absolute")]
    ProjectPathNotAbsolute,
    #[error("project_path is too long (max {MAX_PROJECT_PATH_LEN} characters)")]
    ProjectPathTooLong,
    #[error("project_path `{path}` is outside the allowlist")]
    ProjectPathNotAllowed { path: PathBuf },
    #[error("workspace `{path}` is outside the allowlist")]
    WorkspaceNotAllowed { path: PathBuf },
    #[error("scheme is required")]
    MissingScheme,
    #[error("scheme is too long ({length} characters)")]
    SchemeTooLong { length: usize },
    #[error("scheme `{scheme}` is not included in the config allowlist")]
    SchemeNotAllowed { scheme: String },
    #[error("destination is required")]
    DestinationEmpty,
    #[error("destination is too long ({length} characters)")]
    DestinationTooLong { length: usize },
    #[error("destination must include `platform=`")]
    DestinationMissingPlatform,
    #[error("extra_args contains a disallowed value `{arg}`")]
    ExtraArgNotAllowed { arg: String },
    #[error("extra_args exceeds the allowed count (count={count})")]
    TooManyExtraArgs { count: usize },
    #[error("extra_args `{arg}` is too long ({length} characters)")]
    ExtraArgTooLong { arg: String, length: usize },
    #[error("env_overrides `{key}` is not permitted")]
    EnvOverrideNotAllowed { key: String },
}
