//! Preflight checks run before any work starts.
//!
//! Unpacking a root filesystem and entering a chroot need root, and the
//! repository database is maintained by pacman's `repo-add`. Checking up front
//! turns a failure halfway through a long mirror run into an immediate one.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreflightError {
    #[error("This program must run as root (effective uid {euid})")]
    NotRoot { euid: u32 },

    #[error("Missing required host tools:\n{0}")]
    MissingTools(String),
}

/// Host tools the pipeline shells out to, as (command, package) pairs.
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[("repo-add", "pacman"), ("bash", "bash")];

/// Effective user id of this process.
#[allow(unsafe_code)]
pub fn effective_uid() -> u32 {
    // SAFETY: geteuid(2) takes no arguments, cannot fail and has no side effects.
    unsafe { libc::geteuid() }
}

/// Fail unless running with an effective uid of 0.
pub fn ensure_root() -> Result<(), PreflightError> {
    match effective_uid() {
        0 => Ok(()),
        euid => Err(PreflightError::NotRoot { euid }),
    }
}

/// Check if a command exists on the host system.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Check that specific tools are available.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<(), PreflightError> {
    let missing: Vec<String> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .map(|(tool, package)| format!("  {tool} (install: {package})"))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PreflightError::MissingTools(missing.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_exists() {
        assert!(command_exists("sh"));
        assert!(!command_exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn test_check_required_tools_failure_lists_package() {
        let err = check_required_tools(&[("sh", "dash"), ("nonexistent_command_xyz", "fake-package")])
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("nonexistent_command_xyz (install: fake-package)"));
        assert!(!msg.contains("dash"));
    }

    #[test]
    fn test_ensure_root_matches_uid() {
        assert_eq!(ensure_root().is_ok(), effective_uid() == 0);
    }
}
