//! Run configuration.
//!
//! A single TOML document describes every mirror group and the optional build
//! pipeline, so one executable serves any package set:
//!
//! ```toml
//! [repo]
//! root = "repo"
//! arch = "aarch64"
//!
//! [[mirror]]
//! repository = "plasma-mobile"
//! base_url = "https://mirror.example/manjaro/arm-unstable/{channel}/aarch64"
//! channels = ["core", "extra", "community"]
//! packages = ["kio-git", "kwin-git"]
//!
//! [build]
//! repository = "beryllium"
//! rootfs_url = "http://mirror.example/os/ArchLinuxARM-aarch64-latest.tar.gz"
//! packages = ["qrtr-git"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::types::{AllowList, MirrorTarget, RepoLayout};

/// Placeholder substituted with the channel name inside `base_url`.
pub const CHANNEL_PLACEHOLDER: &str = "{channel}";

const PRESET: &str = include_str!("../presets/plasma-mobile.toml");

/// Errors raised while loading or validating a [`RunConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// File that was being read
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The document is not valid TOML or does not match the schema.
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be rendered back to TOML.
    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),

    /// A semantic check failed.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Local repository tree layout
    #[serde(default)]
    pub repo: RepoLayout,

    /// Mirror groups, processed in order
    #[serde(default)]
    pub mirror: Vec<MirrorConfig>,

    /// Source-build pipeline, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildConfig>,
}

/// A set of upstream channels mirrored into one local repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Local repository name (e.g., "plasma-mobile")
    pub repository: String,

    /// Upstream base URL; may contain `{channel}`
    pub base_url: String,

    /// Upstream channels, mirrored in this order
    pub channels: Vec<String>,

    /// Package names to retain
    #[serde(default)]
    pub packages: AllowList,
}

impl MirrorConfig {
    /// The allow-list shared by every channel of this group.
    pub fn allow_list(&self) -> &AllowList {
        &self.packages
    }

    /// Expand into one [`MirrorTarget`] per channel, in configured order.
    pub fn targets(&self, layout: &RepoLayout) -> Vec<MirrorTarget> {
        let local_dir = layout.repo_dir(&self.repository);
        self.channels
            .iter()
            .map(|channel| MirrorTarget {
                source_label: channel.clone(),
                base_url: self
                    .base_url
                    .replace(CHANNEL_PLACEHOLDER, channel)
                    .trim_end_matches('/')
                    .to_string(),
                local_dir: local_dir.clone(),
                repository: self.repository.clone(),
            })
            .collect()
    }
}

/// Packages built from source inside a downloaded root filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Local repository receiving the built packages
    pub repository: String,

    /// Root filesystem tarball
    pub rootfs_url: String,

    /// Extraction directory for the root filesystem
    #[serde(default = "default_rootfs_dir")]
    pub rootfs_dir: PathBuf,

    /// Host path of the one-time setup script (file or directory)
    #[serde(default = "default_setup_script")]
    pub setup_script: PathBuf,

    /// Host path of the build script (file or directory)
    #[serde(default = "default_build_script")]
    pub build_script: PathBuf,

    /// Contents written to `etc/pacman.d/mirrorlist` inside the rootfs
    #[serde(default = "default_mirrorlist")]
    pub mirrorlist: String,

    /// Helper that enters the chroot and runs a command
    #[serde(default = "default_chroot_helper")]
    pub chroot_helper: String,

    /// Packages whose artifacts are collected after the build, in order
    #[serde(default)]
    pub packages: Vec<String>,
}

fn default_rootfs_dir() -> PathBuf {
    PathBuf::from("rootfs")
}

fn default_setup_script() -> PathBuf {
    PathBuf::from("initial_setup")
}

fn default_build_script() -> PathBuf {
    PathBuf::from("build")
}

fn default_mirrorlist() -> String {
    "Server = http://localhost:8080/$repo/$arch".to_string()
}

fn default_chroot_helper() -> String {
    "./do_chroot".to_string()
}

impl BuildConfig {
    /// File name of the rootfs tarball (last URL path segment).
    pub fn rootfs_archive_name(&self) -> &str {
        self.rootfs_url.rsplit('/').next().unwrap_or_default()
    }
}

impl RunConfig {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read,
    /// [`ConfigError::Parse`] on malformed TOML, and [`ConfigError::Invalid`]
    /// if a semantic check fails.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate a configuration document.
    ///
    /// # Errors
    ///
    /// See [`RunConfig::load`].
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// The built-in plasma-mobile / beryllium configuration.
    ///
    /// # Errors
    ///
    /// Only fails if the embedded preset itself is invalid.
    pub fn preset() -> Result<Self, ConfigError> {
        Self::from_toml_str(PRESET)
    }

    /// Render back to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Render`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Find a mirror group by repository name.
    pub fn mirror_group(&self, repository: &str) -> Option<&MirrorConfig> {
        self.mirror.iter().find(|m| m.repository == repository)
    }

    /// Semantic checks serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repo.arch.is_empty() {
            return Err(ConfigError::Invalid("repo.arch is empty".to_string()));
        }

        for group in &self.mirror {
            if group.repository.is_empty() {
                return Err(ConfigError::Invalid(
                    "mirror.repository is empty".to_string(),
                ));
            }
            if !group.base_url.starts_with("http") {
                return Err(ConfigError::Invalid(format!(
                    "mirror '{}': base_url must start with http(s), got '{}'",
                    group.repository, group.base_url
                )));
            }
            if group.channels.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "mirror '{}': no channels configured",
                    group.repository
                )));
            }
            if group.channels.iter().any(String::is_empty) {
                return Err(ConfigError::Invalid(format!(
                    "mirror '{}': empty channel name",
                    group.repository
                )));
            }
        }

        if let Some(build) = &self.build {
            if build.repository.is_empty() {
                return Err(ConfigError::Invalid("build.repository is empty".to_string()));
            }
            if !build.rootfs_url.starts_with("http") || build.rootfs_archive_name().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "build.rootfs_url is not a file URL: '{}'",
                    build.rootfs_url
                )));
            }
        }

        Ok(())
    }
}
