//! Shared helpers for building `xcodebuild` commands.

use std::{collections::BTreeMap, path::Path};

use tokio::process::Command;

/// xcodebuild action selected by the calling tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XcodeAction {
    Build,
    Test,
    Clean,
}

impl XcodeAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            XcodeAction::Build => "build",
            XcodeAction::Test => "test",
            XcodeAction::Clean => "clean",
        }
    }
}

pub struct XcodebuildCommandConfig<'a> {
    pub xcodebuild_path: &'a Path,
    pub developer_dir: &'a Path,
    pub staging_dir: &'a Path,
}

pub struct XcodebuildInvocation<'a> {
    pub action: XcodeAction,
    pub project_path: &'a Path,
    pub workspace: Option<&'a Path>,
    pub scheme: &'a str,
    pub configuration: &'a str,
    pub destination: &'a str,
    pub extra_args: &'a [String],
    pub env_overrides: &'a BTreeMap<String, String>,
}

/// Build an `xcodebuild` command for a build, test, or clean job.
pub fn build_xcodebuild_command(
    config: XcodebuildCommandConfig<'_>,
    invocation: XcodebuildInvocation<'_>,
) -> Command {
    let mut command = Command::new(config.xcodebuild_path);
    command.kill_on_drop(true);
    command.current_dir(invocation.project_path);
    command.env_clear();
    command.env("NSUnbufferedIO", "YES");
    command.env("DEVELOPER_DIR", config.developer_dir);
    command.env("XCBRIDGE_ARTIFACT_DIR", config.staging_dir);
    for (key, value) in invocation.env_overrides {
        command.env(key, value);
    }

    if let Some(workspace) = invocation.workspace {
        command.arg("-workspace").arg(workspace);
    } else if invocation
        .project_path
        .extension()
        .and_then(|ext| ext.to_str())
        == Some("xcodeproj")
    {
        command.arg("-project").arg(invocation.project_path);
    }

    command.arg("-scheme").arg(invocation.scheme);
    command.arg("-configuration").arg(invocation.configuration);
    command.arg("-destination").arg(invocation.destination);

    command.arg(invocation.action.as_str());

    for arg in invocation.extra_args {
        command.arg(arg);
    }

    command
}

/// Build an `xcodebuild -list -json` command for scheme discovery.
pub fn build_list_command(
    xcodebuild_path: &Path,
    developer_dir: &Path,
    project_path: &Path,
    workspace: Option<&Path>,
) -> Command {
    let mut command = Command::new(xcodebuild_path);
    command.kill_on_drop(true);
    command.current_dir(project_path);
    command.env_clear();
    command.env("DEVELOPER_DIR", developer_dir);

    if let Some(workspace) = workspace {
        command.arg("-workspace").arg(workspace);
    } else if project_path.extension().and_then(|ext| ext.to_str()) == Some("xcodeproj") {
        command.arg("-project").arg(project_path);
    }

    command.arg("-list").arg("-json");
    command
}
