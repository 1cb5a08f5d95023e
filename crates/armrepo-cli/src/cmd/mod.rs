//! Command handlers

pub mod build;
pub mod config;
pub mod mirror;
pub mod run;

use anyhow::Result;
use armrepo_core::preflight::{self, REQUIRED_TOOLS};

/// Privilege and host tool checks shared by every command that touches the
/// repository tree.
pub fn preflight(skip_root_check: bool) -> Result<()> {
    if skip_root_check {
        tracing::debug!("Skipping root check");
    } else {
        preflight::ensure_root()?;
    }
    preflight::check_required_tools(REQUIRED_TOOLS)?;
    Ok(())
}
