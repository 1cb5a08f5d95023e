//! Selective mirroring of upstream channels.
//!
//! For each channel: fetch its index archive, decode it, and download every
//! allow-listed artifact that is not already present locally. Only artifacts
//! actually transferred during this run are registered with the local
//! database; re-runs over an unchanged upstream register nothing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use armrepo_schema::{AllowList, MirrorConfig, MirrorTarget, RepoLayout};
use thiserror::Error;

use crate::index::{self, DecodeError, DecodedIndex};
use crate::indexer::{IndexError, LocalIndexer};
use crate::io::download::{DownloadError, Downloader, FetchOutcome};
use crate::{Reporter, select};

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("Index decoding task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl MirrorError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What one channel sync did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries in the upstream index
    pub indexed: usize,
    /// Entries whose name is on the allow-list
    pub wanted: usize,
    /// Artifacts transferred and registered during this sync
    pub fetched: Vec<String>,
    /// Wanted artifacts already present locally
    pub skipped: usize,
    /// Names seen in this channel's index
    pub seen: HashSet<String>,
}

impl SyncReport {
    fn merge(&mut self, other: SyncReport) {
        self.indexed += other.indexed;
        self.wanted += other.wanted;
        self.fetched.extend(other.fetched);
        self.skipped += other.skipped;
        self.seen.extend(other.seen);
    }
}

/// Replicates allow-listed artifacts from upstream channels.
#[derive(Clone)]
pub struct MirrorSync {
    downloader: Arc<dyn Downloader>,
    indexer: LocalIndexer,
    cache_dir: PathBuf,
    reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for MirrorSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorSync")
            .field("indexer", &self.indexer)
            .field("cache_dir", &self.cache_dir)
            .finish_non_exhaustive()
    }
}

impl MirrorSync {
    pub fn new(
        downloader: Arc<dyn Downloader>,
        indexer: LocalIndexer,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let cache_dir = indexer.layout().cache_dir.clone();
        Self {
            downloader,
            indexer,
            cache_dir,
            reporter,
        }
    }

    /// Where a channel's index archive is downloaded to.
    pub fn index_cache_path(&self, target: &MirrorTarget) -> PathBuf {
        self.cache_dir
            .join(format!("{}-{}.db", target.repository, target.source_label))
    }

    /// Mirror one channel.
    ///
    /// The index is always fetched fresh. Artifacts are fetched one at a time
    /// in index order and each newly fetched one is registered before the next
    /// download starts. The first failure aborts the sync.
    pub async fn sync(
        &self,
        target: &MirrorTarget,
        allow: &AllowList,
    ) -> Result<SyncReport, MirrorError> {
        tokio::fs::create_dir_all(&target.local_dir)
            .await
            .map_err(|e| MirrorError::io(&target.local_dir, e))?;
        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| MirrorError::io(&self.cache_dir, e))?;

        // A stale copy would be skipped by the downloader.
        let index_path = self.index_cache_path(target);
        match tokio::fs::remove_file(&index_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(MirrorError::io(&index_path, e)),
        }

        self.reporter.info(&format!("Fetching {} index", target.source_label));
        self.downloader
            .fetch(&index_path, &target.index_url())
            .await?;

        let decoded = tokio::task::spawn_blocking({
            let path = index_path.clone();
            move || index::decode(&path)
        })
        .await??;

        let mut report = SyncReport {
            indexed: decoded.len(),
            seen: decoded.iter().map(|d| d.name.clone()).collect(),
            ..SyncReport::default()
        };

        // One entry per name; a duplicate would be dropped by repo-add -R.
        for descriptor in select::select(decoded.unique(), allow) {
            report.wanted += 1;
            let dest = target.artifact_path(&descriptor.filename);

            // Presence alone decides; an existing file is never re-validated.
            if tokio::fs::try_exists(&dest)
                .await
                .map_err(|e| MirrorError::io(&dest, e))?
            {
                tracing::debug!("{} already mirrored", descriptor.filename);
                report.skipped += 1;
                continue;
            }

            let outcome = self
                .downloader
                .fetch(&dest, &target.artifact_url(&descriptor.filename))
                .await?;

            if let FetchOutcome::Fetched(artifact) = outcome {
                self.indexer
                    .register_in(&target.local_dir, &target.repository, &artifact.filename)
                    .await?;
                report.fetched.push(artifact.filename);
            }
        }

        close_index(decoded)?;

        tracing::info!(
            "{}: {} indexed, {} wanted, {} fetched, {} already present",
            target.source_label,
            report.indexed,
            report.wanted,
            report.fetched.len(),
            report.skipped
        );
        Ok(report)
    }

    /// Mirror every channel of a group, in configured order.
    ///
    /// Allow-list names that no channel's index carries are reported as
    /// warnings once all channels are done.
    pub async fn sync_group(
        &self,
        group: &MirrorConfig,
        layout: &RepoLayout,
    ) -> Result<SyncReport, MirrorError> {
        let start = Instant::now();
        let allow = group.allow_list();
        let mut total = SyncReport::default();

        for target in group.targets(layout) {
            self.reporter.section(&format!(
                "Mirroring {} into {}",
                target.source_label, target.repository
            ));
            let report = self.sync(&target, allow).await?;
            total.merge(report);
        }

        let seen: HashSet<&str> = total.seen.iter().map(String::as_str).collect();
        for name in select::unmatched(allow, &seen) {
            self.reporter
                .warning(&format!("{name} not found in any {} channel", group.repository));
        }

        self.reporter.summary(
            total.fetched.len(),
            "mirrored",
            start.elapsed().as_secs_f64(),
        );
        Ok(total)
    }
}

/// Remove the scratch directory of a decoded index.
fn close_index(decoded: DecodedIndex) -> Result<(), MirrorError> {
    let scratch = decoded.scratch_path().to_path_buf();
    decoded.close().map_err(|e| MirrorError::io(&scratch, e))
}
