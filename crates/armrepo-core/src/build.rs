//! Source-build orchestration.
//!
//! Packages that upstream does not provide are built inside a chroot of a
//! downloaded root filesystem. Compiling is the job of the build script run in
//! the chroot; this module prepares the rootfs, runs the scripts and collects
//! the resulting artifacts into the local repository.
//!
//! The rootfs is prepared (extracted, mirrorlist written, setup script run)
//! only when its tarball had to be downloaded. A cached tarball means a
//! prepared rootfs is already in place.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Instant;

use armrepo_schema::{BuildConfig, PACKAGE_SUFFIX, RepoLayout};
use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::Reporter;
use crate::indexer::{IndexError, LocalIndexer};
use crate::io::download::{DownloadError, Downloader};
use crate::io::extract::{ExtractError, extract_rootfs};

/// Where the rootfs package manager reads its mirror list.
pub const MIRRORLIST_PATH: &str = "etc/pacman.d/mirrorlist";

/// Build output directory inside the rootfs: `pkgs/<package>/`.
pub const PACKAGES_DIR: &str = "pkgs";

const SCRIPT_MODE: u32 = 0o755;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("Failed to unpack root filesystem: {0}")]
    Extract(#[from] ExtractError),

    #[error("Failed to copy {path}: {message}")]
    Copy { path: PathBuf, message: String },

    #[error("Failed to start chroot command '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("Chroot command '{command}' failed: {status}")]
    Chroot { command: String, status: ExitStatus },

    #[error("No {suffix} artifact for {package} under {}", .dir.display())]
    ArtifactMissing {
        package: String,
        dir: PathBuf,
        suffix: &'static str,
    },

    #[error("{path} has no file name")]
    NoFileName { path: PathBuf },

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("Rootfs extraction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl BuildError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Runs a command inside the build chroot.
#[async_trait]
pub trait ChrootExecutor: Send + Sync {
    /// Run `command` (a path inside the rootfs such as `/build`) to completion.
    async fn run(&self, command: &str) -> Result<(), BuildError>;
}

/// [`ChrootExecutor`] delegating to a helper script: `bash -c "<helper> <command>"`.
///
/// The helper is responsible for bind mounts and `chroot(8)`. Its output goes
/// straight to the terminal.
#[derive(Debug, Clone)]
pub struct ChrootHelper {
    helper: String,
}

impl ChrootHelper {
    pub fn new(helper: impl Into<String>) -> Self {
        Self {
            helper: helper.into(),
        }
    }

    fn command(&self, command: &str) -> Command {
        let mut cmd = Command::new("bash");
        cmd.arg("-c")
            .arg(format!("{} {command}", self.helper))
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        cmd
    }
}

#[async_trait]
impl ChrootExecutor for ChrootHelper {
    async fn run(&self, command: &str) -> Result<(), BuildError> {
        tracing::info!("Running {command} in chroot");
        let status = self
            .command(command)
            .status()
            .await
            .map_err(|source| BuildError::Spawn {
                command: command.to_string(),
                source,
            })?;

        if !status.success() {
            return Err(BuildError::Chroot {
                command: command.to_string(),
                status,
            });
        }
        Ok(())
    }
}

/// Prepares the build rootfs, runs the build and publishes its artifacts.
#[derive(Clone)]
pub struct BuildPipeline {
    config: BuildConfig,
    layout: RepoLayout,
    downloader: Arc<dyn Downloader>,
    executor: Arc<dyn ChrootExecutor>,
    indexer: LocalIndexer,
    reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for BuildPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildPipeline")
            .field("config", &self.config)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl BuildPipeline {
    pub fn new(
        config: BuildConfig,
        downloader: Arc<dyn Downloader>,
        executor: Arc<dyn ChrootExecutor>,
        indexer: LocalIndexer,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let layout = indexer.layout().clone();
        Self {
            config,
            layout,
            downloader,
            executor,
            indexer,
            reporter,
        }
    }

    /// Run the whole pipeline. Returns the file names registered, in
    /// configured package order.
    pub async fn run(&self) -> Result<Vec<String>, BuildError> {
        let start = Instant::now();
        let repo_dir = self.layout.repo_dir(&self.config.repository);
        tokio::fs::create_dir_all(&repo_dir)
            .await
            .map_err(|e| BuildError::io(&repo_dir, e))?;

        self.reporter.section("Preparing root filesystem");
        self.prepare_rootfs().await?;

        self.reporter.section("Building packages");
        let build_cmd = install_script(&self.config.build_script, &self.config.rootfs_dir)?;
        self.executor.run(&build_cmd).await?;

        self.reporter
            .section(&format!("Publishing to {}", self.config.repository));
        let mut registered = Vec::with_capacity(self.config.packages.len());
        for package in &self.config.packages {
            let filename = self.publish(package, &repo_dir).await?;
            registered.push(filename);
        }

        self.reporter.summary(
            registered.len(),
            "built",
            start.elapsed().as_secs_f64(),
        );
        Ok(registered)
    }

    /// Download the rootfs tarball and, if it was not cached, unpack and
    /// initialize a fresh rootfs from it.
    pub async fn prepare_rootfs(&self) -> Result<(), BuildError> {
        let cache_dir = &self.layout.cache_dir;
        tokio::fs::create_dir_all(cache_dir)
            .await
            .map_err(|e| BuildError::io(cache_dir, e))?;

        let archive = cache_dir.join(self.config.rootfs_archive_name());
        let outcome = self
            .downloader
            .fetch(&archive, &self.config.rootfs_url)
            .await?;
        if !outcome.was_fetched() {
            tracing::info!(
                "Using cached {}; keeping existing rootfs",
                archive.display()
            );
            return Ok(());
        }

        let rootfs = self.config.rootfs_dir.clone();
        match tokio::fs::remove_dir_all(&rootfs).await {
            Ok(()) => tracing::debug!("Removed stale {}", rootfs.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(BuildError::io(&rootfs, e)),
        }

        self.reporter
            .info(&format!("Extracting {}", archive.display()));
        tokio::task::spawn_blocking({
            let rootfs = rootfs.clone();
            move || extract_rootfs(&archive, &rootfs)
        })
        .await??;

        let mirrorlist = rootfs.join(MIRRORLIST_PATH);
        if let Some(parent) = mirrorlist.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BuildError::io(parent, e))?;
        }
        tokio::fs::write(&mirrorlist, format!("{}\n", self.config.mirrorlist))
            .await
            .map_err(|e| BuildError::io(&mirrorlist, e))?;

        let setup_cmd = install_script(&self.config.setup_script, &rootfs)?;
        self.executor.run(&setup_cmd).await
    }

    /// Move the built artifact of `package` into `repo_dir` and register it.
    async fn publish(&self, package: &str, repo_dir: &Path) -> Result<String, BuildError> {
        let pkg_dir = self.config.rootfs_dir.join(PACKAGES_DIR).join(package);
        let artifact = find_artifact(&pkg_dir).ok_or_else(|| BuildError::ArtifactMissing {
            package: package.to_string(),
            dir: pkg_dir.clone(),
            suffix: PACKAGE_SUFFIX,
        })?;

        let dest = move_artifact(&artifact, repo_dir)?;
        let filename = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::debug!("{} -> {}", artifact.display(), dest.display());

        self.indexer
            .register(&self.config.repository, &filename)
            .await?;
        Ok(filename)
    }
}

/// Copy a script (file or directory) to the rootfs root and make it
/// executable. Returns the path to invoke inside the chroot.
fn install_script(script: &Path, rootfs: &Path) -> Result<String, BuildError> {
    let name = script.file_name().ok_or_else(|| BuildError::NoFileName {
        path: script.to_path_buf(),
    })?;
    let dest = rootfs.join(name);

    if script.is_dir() {
        fs_extra::dir::copy(
            script,
            rootfs,
            &fs_extra::dir::CopyOptions::new().overwrite(true),
        )
        .map_err(|e| BuildError::Copy {
            path: script.to_path_buf(),
            message: e.to_string(),
        })?;
    } else {
        std::fs::copy(script, &dest).map_err(|e| BuildError::io(script, e))?;
    }

    std::fs::set_permissions(&dest, std::fs::Permissions::from_mode(SCRIPT_MODE))
        .map_err(|e| BuildError::io(&dest, e))?;

    Ok(format!("/{}", name.to_string_lossy()))
}

/// Last `*.pkg.tar.xz` under `dir` in file name order.
pub fn find_artifact(dir: &Path) -> Option<PathBuf> {
    walkdir::WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_string_lossy().ends_with(PACKAGE_SUFFIX))
        .last()
        .map(walkdir::DirEntry::into_path)
}

/// Move `src` into `dest_dir`, copying when a rename crosses filesystems.
pub fn move_artifact(src: &Path, dest_dir: &Path) -> Result<PathBuf, BuildError> {
    let name = src.file_name().ok_or_else(|| BuildError::NoFileName {
        path: src.to_path_buf(),
    })?;
    let dest = dest_dir.join(name);

    if std::fs::rename(src, &dest).is_err() {
        std::fs::copy(src, &dest).map_err(|e| BuildError::io(src, e))?;
        std::fs::remove_file(src).map_err(|e| BuildError::io(src, e))?;
    }
    Ok(dest)
}
