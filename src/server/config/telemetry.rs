use tracing::{debug, info};

use super::{ServerConfig, CONFIG_ENV_KEY, DEFAULT_CONFIG_PATH};

pub fn log_env_source(path: &std::path::Path, from_env: bool) {
    if from_env {
        info!(
            target: "xcbridge::config",
            path = %path.display(),
            "Loading configuration using MCP_CONFIG_PATH environment variable"
        );
    } else {
        debug!(
            target: "xcbridge::config",
            path = %path.display(),
            env = CONFIG_ENV_KEY,
            default = DEFAULT_CONFIG_PATH,
            "MCP_CONFIG_PATH not set; using default config.toml"
        );
    }
}

pub fn log_loaded(config: &ServerConfig) {
    info!(
        target: "xcbridge::config",
        path = %config.source_path.display(),
        host = %config.server.host,
        port = config.server.port,
        xcode_allowed_paths = %config.xcode.allowed_paths.len(),
        xcode_allowed_schemes = %config.xcode.allowed_schemes.len(),
        max_build_minutes = config.xcode.max_build_minutes,
        artifact_ttl_secs = config.xcode.artifact_ttl_secs,
        max_log_capture_secs = config.simulator.max_log_capture_secs,
        "Configuration file loaded successfully"
    );
}
