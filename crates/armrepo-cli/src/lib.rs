//! armrepo - ARM Linux package repository builder
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Mirrors an allow-listed subset of upstream pacman channels into a local
//! repository tree, builds the remaining packages inside a chroot'ed root
//! filesystem and keeps every repository database current.
//!
//! # Directory Layout
//!
//! ```text
//! ./
//! ├── repo/
//! │   ├── plasma-mobile/aarch64/   # mirrored artifacts + plasma-mobile.db.tar.xz
//! │   └── beryllium/aarch64/       # built artifacts + beryllium.db.tar.xz
//! ├── cache/                       # index archives, rootfs tarball
//! └── rootfs/                      # build chroot
//! ```

pub mod cmd;
pub mod context;
pub mod ui;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use armrepo_schema::RunConfig;
use clap::{Parser, Subcommand};

pub use context::Context;

#[derive(Debug, Parser)]
#[command(name = "armrepo")]
#[command(author, version, about = "armrepo - ARM Linux package repository builder")]
pub struct Cli {
    /// Configuration file (defaults to the built-in plasma-mobile preset)
    #[arg(long, short, global = true, env = "ARMREPO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Do not require root (mirroring only needs write access)
    #[arg(long, global = true)]
    pub skip_root_check: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Mirror every group, then run the build pipeline (default)
    Run,
    /// Mirror upstream channels only
    Mirror {
        /// Only mirror the group for this repository
        #[arg(long, short)]
        repository: Option<String>,
    },
    /// Run the build pipeline only
    Build,
    /// Print the effective configuration as TOML
    Config,
}

/// Load the configuration from `path`, or the built-in preset.
pub fn load_config(path: Option<&Path>) -> Result<RunConfig> {
    match path {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display())),
        None => RunConfig::preset().context("Built-in preset is invalid"),
    }
}
