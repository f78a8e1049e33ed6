use std::{ffi::CString, os::unix::ffi::OsStrExt, path::Path, path::PathBuf, process::Command};

use crate::lib::errors::DiagnosticsError;

use super::MIN_DISK_BYTES;

/// Abstraction for environment access during diagnostics collection.
pub trait DiagnosticsProbe {
    fn requires_developer_dir(&self) -> bool {
        true
    }
    fn xcodebuild_version(&self, developer_dir: &Path) -> Result<String, DiagnosticsError>;
    fn list_sdks(&self, developer_dir: &Path) -> Result<Vec<String>, DiagnosticsError>;
    fn simctl_available(&self, xcrun_path: &Path) -> Result<bool, DiagnosticsError>;
    fn disk_free_bytes(&self, path: &Path) -> Result<u64, DiagnosticsError>;
}

/// Probe that operates against the real environment.
pub struct SystemDiagnosticsProbe;

impl DiagnosticsProbe for SystemDiagnosticsProbe {
    fn xcodebuild_version(&self, developer_dir: &Path) -> Result<String, DiagnosticsError> {
        let mut command = Command::new("xcodebuild");
        command.arg("-version");
        if !developer_dir.as_os_str().is_empty() {
            command.env("DEVELOPER_DIR", developer_dir);
        }
        let output = command
            .output()
            .map_err(|err| DiagnosticsError::XcodebuildUnavailable {
                message: format!("Failed to run xcodebuild: {err}"),
            })?;
        if !output.status.success() {
            return Err(DiagnosticsError::XcodebuildUnavailable {
                message: format!(
                    "xcodebuild -version failed: {}",
                    String::from_utf8_lossy(&output.stderr)
                ),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().take(2).collect::<Vec<_>>().join(" "))
    }

    fn list_sdks(&self, developer_dir: &Path) -> Result<Vec<String>, DiagnosticsError> {
        let mut command = Command::new("xcodebuild");
        command.arg("-showsdks");
        if !developer_dir.as_os_str().is_empty() {
            command.env("DEVELOPER_DIR", developer_dir);
        }
        let output = command
            .output()
            .map_err(|err| DiagnosticsError::XcodebuildUnavailable {
                message: format!("Failed to run xcodebuild: {err}"),
            })?;
        if !output.status.success() {
            return Err(DiagnosticsError::XcodebuildUnavailable {
                message: format!(
                    "xcodebuild -showsdks failed: {}",
                    String::from_utf8_lossy(&output.stderr)
                ),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .filter_map(|line| {
                line.split_whitespace()
                    .find(|token| token.starts_with("-sdk"))
                    .map(|token| token.trim_start_matches("-sdk").trim().to_string())
            })
            .filter(|entry| !entry.is_empty())
            .collect())
    }

    fn simctl_available(&self, xcrun_path: &Path) -> Result<bool, DiagnosticsError> {
        let output = Command::new(xcrun_path)
            .args(["simctl", "help"])
            .output()
            .map_err(|err| DiagnosticsError::SimctlUnavailable {
                message: format!("Failed to run xcrun simctl: {err}"),
            })?;
        Ok(output.status.success())
    }

    fn disk_free_bytes(&self, path: &Path) -> Result<u64, DiagnosticsError> {
        let target = if path.exists() {
            path.to_path_buf()
        } else {
            PathBuf::from("/")
        };
        let c_path = CString::new(target.as_os_str().as_bytes()).map_err(|err| {
            DiagnosticsError::Internal {
                message: format!("Failed to parse disk path: {err}"),
            }
        })?;
        let mut stats = std::mem::MaybeUninit::<libc::statfs>::uninit();
        let result = unsafe { libc::statfs(c_path.as_ptr(), stats.as_mut_ptr()) };
        if result != 0 {
            return Err(DiagnosticsError::Internal {
                message: "statfs call failed".into(),
            });
        }
        let stats = unsafe { stats.assume_init() };

        #[cfg(target_os = "linux")]
        let available_blocks = stats.f_bavail;
        #[cfg(target_os = "macos")]
        let available_blocks = stats.f_bavail;
        #[cfg(all(not(target_os = "linux"), not(target_os = "macos")))]
        let available_blocks = stats.f_bavail as u64;

        #[cfg(target_os = "linux")]
        let block_size = u64::try_from(stats.f_bsize).map_err(|_| DiagnosticsError::Internal {
            message: format!("statfs returned negative block size: {}", stats.f_bsize),
        })?;
        #[cfg(target_os = "macos")]
        let block_size = u64::from(stats.f_bsize);
        #[cfg(all(not(target_os = "linux"), not(target_os = "macos")))]
        let block_size = stats.f_bsize as u64;

        available_blocks
            .checked_mul(block_size)
            .ok_or_else(|| DiagnosticsError::Internal {
                message: "statfs overflow when computing free bytes".into(),
            })
    }
}

/// Probe driven entirely by environment variables, for tests and CI hosts
/// without Xcode installed.
pub struct EnvDiagnosticsProbe;

impl DiagnosticsProbe for EnvDiagnosticsProbe {
    fn requires_developer_dir(&self) -> bool {
        false
    }

    fn xcodebuild_version(&self, _developer_dir: &Path) -> Result<String, DiagnosticsError> {
        Ok(std::env::var("XCBRIDGE_DIAG_VERSION").unwrap_or_else(|_| "Xcode 16.0".into()))
    }

    fn list_sdks(&self, _developer_dir: &Path) -> Result<Vec<String>, DiagnosticsError> {
        let sdks = std::env::var("XCBRIDGE_DIAG_SDKS").unwrap_or_default();
        Ok(sdks
            .split(',')
            .filter_map(|entry| {
                let trimmed = entry.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
            .collect())
    }

    fn simctl_available(&self, _xcrun_path: &Path) -> Result<bool, DiagnosticsError> {
        Ok(matches!(
            std::env::var("XCBRIDGE_DIAG_SIMCTL")
                .unwrap_or_else(|_| "available".into())
                .to_lowercase()
                .as_str(),
            "available" | "true" | "1"
        ))
    }

    fn disk_free_bytes(&self, _path: &Path) -> Result<u64, DiagnosticsError> {
        let bytes = std::env::var("XCBRIDGE_DIAG_DISK_BYTES")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(u64::MAX / 2);

        if bytes < MIN_DISK_BYTES {
            return Err(DiagnosticsError::DiskInsufficient {
                available_bytes: bytes,
            });
        }

        Ok(bytes)
    }
}
