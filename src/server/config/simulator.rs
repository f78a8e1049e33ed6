use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::lib::errors::ConfigError;

pub const DEFAULT_XCRUN_PATH: &str = "/usr/bin/xcrun";
pub const DEFAULT_MAX_LOG_CAPTURE_SECS: u32 = 30;

/// Simulator tool paths and capture limits.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub xcrun_path: PathBuf,
    pub max_log_capture_secs: u32,
}

#[derive(Debug, Deserialize, Default)]
pub struct RawSimulatorConfig {
    pub xcrun_path: Option<PathBuf>,
    pub max_log_capture_secs: Option<u32>,
}

pub fn parse_simulator_section(
    path: &Path,
    raw: Option<RawSimulatorConfig>,
) -> Result<SimulatorConfig, ConfigError> {
    let simulator_raw = raw.unwrap_or_default();

    let xcrun_path = simulator_raw
        .xcrun_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_XCRUN_PATH));
    validate_xcrun_path(path, &xcrun_path)?;

    let max_log_capture_secs = simulator_raw
        .max_log_capture_secs
        .unwrap_or(DEFAULT_MAX_LOG_CAPTURE_SECS);
    validate_capture_secs(path, max_log_capture_secs)?;

    Ok(SimulatorConfig {
        xcrun_path,
        max_log_capture_secs,
    })
}

fn validate_xcrun_path(path: &Path, xcrun_path: &Path) -> Result<(), ConfigError> {
    if xcrun_path.as_os_str().is_empty() || !xcrun_path.is_absolute() {
        return Err(ConfigError::InvalidField {
            path: path.to_path_buf(),
            field: "simulator.xcrun_path",
            message: "Provide an absolute path to the xcrun executable".into(),
        });
    }
    Ok(())
}

fn validate_capture_secs(path: &Path, secs: u32) -> Result<(), ConfigError> {
    if !(5..=600).contains(&secs) {
        return Err(ConfigError::InvalidField {
            path: path.to_path_buf(),
            field: "simulator.max_log_capture_secs",
            message: "Specify a value between 5 and 600 seconds".into(),
        });
    }
    Ok(())
}
