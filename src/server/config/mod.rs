//! Load and validate server configuration.
use std::{env, path::PathBuf};

use serde::Deserialize;
use tracing::{error, info};

use crate::lib::errors::ConfigError;

pub mod auth;
pub mod server;
pub mod simulator;
pub mod telemetry;
pub mod xcode;

pub use auth::{parse_auth_section, AuthSection, RawAuthSection};
pub use server::{parse_server_section, RawServerSection, ServerSection, DEFAULT_HOST, DEFAULT_PORT};
pub use simulator::{
    parse_simulator_section, RawSimulatorConfig, SimulatorConfig, DEFAULT_MAX_LOG_CAPTURE_SECS,
    DEFAULT_XCRUN_PATH,
};
pub use xcode::{
    parse_xcode_section, RawXcodeConfig, XcodeConfig, DEFAULT_ARTIFACT_TTL_SECS,
    DEFAULT_CLEANUP_SCHEDULE_SECS, DEFAULT_DESTINATION, DEFAULT_MAX_BUILD_MINUTES,
    DEFAULT_XCODEBUILD_PATH,
};

const CONFIG_ENV_KEY: &str = "MCP_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level configuration container.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub auth: AuthSection,
    pub xcode: XcodeConfig,
    pub simulator: SimulatorConfig,
    pub source_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RawServerConfig {
    server: Option<RawServerSection>,
    auth: Option<RawAuthSection>,
    xcode: Option<RawXcodeConfig>,
    simulator: Option<RawSimulatorConfig>,
}

impl ServerConfig {
    /// Prefer `MCP_CONFIG_PATH` if set; otherwise read `config.toml`.
    pub fn load_from_env_or_default() -> Result<Self, ConfigError> {
        let (path, from_env) = match env::var(CONFIG_ENV_KEY) {
            Ok(value) if !value.trim().is_empty() => (PathBuf::from(value), true),
            _ => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        telemetry::log_env_source(&path, from_env);
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        info!(
            target: "xcbridge::config",
            path = %path.display(),
            "Starting configuration load"
        );

        let builder = config::Config::builder().add_source(config::File::from(path.clone()));
        let document = builder.build().map_err(|err| {
            let error = ConfigError::from_read_error(path.clone(), err);
            error!(
                target: "xcbridge::config",
                path = %path.display(),
                reason = %error,
                "Failed to read configuration file"
            );
            error
        })?;

        let raw: RawServerConfig = document.try_deserialize().map_err(|err| {
            let error = ConfigError::from_parse_error(path.clone(), err);
            error!(
                target: "xcbridge::config",
                path = %path.display(),
                reason = %error,
                "Failed to parse configuration file"
            );
            error
        })?;

        let config = Self::from_raw(raw, path.clone()).map_err(|err| {
            error!(
                target: "xcbridge::config",
                path = %path.display(),
                reason = %err,
                "Failed to validate configuration file"
            );
            err
        })?;

        telemetry::log_loaded(&config);
        Ok(config)
    }

    fn from_raw(raw: RawServerConfig, path: PathBuf) -> Result<Self, ConfigError> {
        let server = parse_server_section(raw.server, &path)?;
        let auth = parse_auth_section(raw.auth, &path)?;
        let xcode = parse_xcode_section(path.clone(), raw.xcode)?;
        let simulator = parse_simulator_section(&path, raw.simulator)?;

        Ok(Self {
            server,
            auth,
            xcode,
            simulator,
            source_path: path,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        env,
        path::{Path, PathBuf},
    };

    use crate::lib::errors::ConfigError;

    use super::ServerConfig;

    fn fixture_path(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    fn with_config_env<T>(path: &Path, test: impl FnOnce() -> T) -> T {
        let original = env::var(super::CONFIG_ENV_KEY).ok();
        env::set_var(super::CONFIG_ENV_KEY, path);
        let result = test();
        match original {
            Some(value) => env::set_var(super::CONFIG_ENV_KEY, value),
            None => env::remove_var(super::CONFIG_ENV_KEY),
        }
        result
    }

    #[test]
    fn load_valid_config() {
        let config = ServerConfig::load_from_path(fixture_path("config_valid.toml"))
            .expect("config_valid.toml should load");

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.auth.token, "valid-token-123456");
        assert_eq!(
            config.xcode.allowed_paths,
            vec![PathBuf::from("/Users/example/workspaces")]
        );
        assert_eq!(
            config.xcode.allowed_schemes,
            vec![String::from("SampleApp"), String::from("SampleToolbox")]
        );
        assert_eq!(
            config.xcode.default_destination,
            "platform=iOS Simulator,name=iPhone 16"
        );
        assert_eq!(
            config.xcode.developer_dir,
            PathBuf::from("/Applications/Xcode.app/Contents/Developer")
        );
        assert_eq!(
            config.xcode.xcodebuild_path,
            PathBuf::from("/usr/bin/xcodebuild")
        );
        assert_eq!(config.xcode.max_build_minutes, 20);
        assert_eq!(config.xcode.artifact_ttl_secs, 600);
        assert_eq!(config.xcode.cleanup_schedule_secs, 60);
        assert_eq!(config.simulator.xcrun_path, PathBuf::from("/usr/bin/xcrun"));
        assert_eq!(config.simulator.max_log_capture_secs, 30);
    }

    #[test]
    fn missing_token_returns_error() {
        let error = ServerConfig::load_from_path(fixture_path("config_missing_token.toml"))
            .expect_err("should error when token is missing");

        match error {
            ConfigError::MissingField { field, .. } => assert_eq!(field, "auth.token"),
            other => panic!("Unexpected error: {other:?}", other = other),
        }
    }

    #[test]
    fn invalid_port_returns_error() {
        let error = ServerConfig::load_from_path(fixture_path("config_invalid_port.toml"))
            .expect_err("should error for an invalid port");

        match error {
            ConfigError::InvalidField { field, .. } => assert_eq!(field, "server.port"),
            other => panic!("Unexpected error: {other:?}", other = other),
        }
    }

    #[test]
    fn load_config_from_env_override() {
        let path = fixture_path("config_valid.toml");
        let config = with_config_env(&path, || {
            ServerConfig::load_from_env_or_default().expect("should load via environment variable")
        });

        assert_eq!(config.source_path, path);
        assert_eq!(config.auth.token, "valid-token-123456");
        assert_eq!(
            config.xcode.xcodebuild_path,
            PathBuf::from("/usr/bin/xcodebuild")
        );
        assert!(config
            .xcode
            .allowed_schemes
            .iter()
            .any(|s| s == "SampleApp"));
    }

    #[test]
    fn missing_xcode_section_returns_error() {
        let error = ServerConfig::load_from_path(fixture_path("config_missing_xcode.toml"))
            .expect_err("should error when xcode section is missing");

        match error {
            ConfigError::MissingField { field, .. } => assert_eq!(field, "xcode"),
            other => panic!("Unexpected error: {other:?}", other = other),
        }
    }

    #[test]
    fn xcode_allowed_paths_must_be_absolute() {
        let error = ServerConfig::load_from_path(fixture_path("config_relative_allowed_path.toml"))
            .expect_err("should error on relative path");

        match error {
            ConfigError::InvalidField { field, .. } => assert_eq!(field, "xcode.allowed_paths"),
            other => panic!("Unexpected error: {other:?}", other = other),
        }
    }

    #[test]
    fn empty_allowed_paths_is_accepted() {
        let config = ServerConfig::load_from_path(fixture_path("config_empty_allowed_paths.toml"))
            .expect("should accept empty allowed_paths to disable allowlist checks");

        assert!(config.xcode.allowed_paths.is_empty());
        assert!(!config.xcode.allowed_schemes.is_empty());
    }

    #[test]
    fn simulator_section_is_optional() {
        let config = ServerConfig::load_from_path(fixture_path("config_empty_allowed_paths.toml"))
            .expect("config without [simulator] should load");

        assert_eq!(config.simulator.xcrun_path, PathBuf::from("/usr/bin/xcrun"));
        assert_eq!(
            config.simulator.max_log_capture_secs,
            super::DEFAULT_MAX_LOG_CAPTURE_SECS
        );
    }

    #[test]
    fn invalid_log_capture_limit_returns_error() {
        let error = ServerConfig::load_from_path(fixture_path("config_invalid_capture.toml"))
            .expect_err("should error for out-of-range capture limit");

        match error {
            ConfigError::InvalidField { field, .. } => {
                assert_eq!(field, "simulator.max_log_capture_secs")
            }
            other => panic!("Unexpected error: {other:?}", other = other),
        }
    }
}
