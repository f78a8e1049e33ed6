//! Shared helpers for building `xcrun simctl` commands.

use std::path::Path;

use tokio::process::Command;

/// Maximum accepted length of a simulator identifier.
const MAX_UDID_LEN: usize = 64;

/// Returns true for a plausible simulator identifier.
///
/// Accepts the literal `booted` alias plus UUID-style identifiers. simctl
/// itself resolves names, but free-form input is rejected before spawning.
pub fn is_valid_udid(udid: &str) -> bool {
    if udid == "booted" {
        return true;
    }
    !udid.is_empty()
        && udid.len() <= MAX_UDID_LEN
        && udid.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Build an `xcrun simctl <subcommand> ...` command.
pub fn build_simctl_command(xcrun_path: &Path, subcommand: &str, args: &[&str]) -> Command {
    let mut command = Command::new(xcrun_path);
    command.kill_on_drop(true);
    command.arg("simctl").arg(subcommand);
    for arg in args {
        command.arg(arg);
    }
    command
}
