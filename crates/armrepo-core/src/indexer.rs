//! Local repository database maintenance.
//!
//! Every artifact that lands in a repository directory during a run is added to
//! that repository's `<name>.db.tar.xz` through pacman's `repo-add`. Additions
//! are strictly sequential: the tool rewrites the database in place.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use armrepo_schema::RepoLayout;
use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::Reporter;

/// Default database maintenance tool.
pub const REPO_ADD: &str = "repo-add";

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },

    #[error("{tool} failed for {filename}: {status}")]
    Tool {
        tool: String,
        filename: String,
        status: ExitStatus,
    },
}

/// Adds one artifact to a repository database.
#[async_trait]
pub trait IndexWriter: Send + Sync {
    /// Register `filename` (relative to `repo_dir`) with the database `db_name`
    /// in the same directory.
    async fn add(&self, repo_dir: &Path, db_name: &str, filename: &str) -> Result<(), IndexError>;
}

/// [`IndexWriter`] that shells out to `repo-add`.
///
/// Runs `repo-add -R -n -p <db> <file>` from inside the repository directory:
/// `-R` drops superseded package files, `-n` skips entries already present and
/// `-p` prevents an older version from replacing a newer one.
#[derive(Debug, Clone)]
pub struct RepoAdd {
    program: String,
}

impl Default for RepoAdd {
    fn default() -> Self {
        Self::new(REPO_ADD)
    }
}

impl RepoAdd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, repo_dir: &Path, db_name: &str, filename: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-R", "-n", "-p", db_name, filename])
            .current_dir(repo_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        cmd
    }
}

#[async_trait]
impl IndexWriter for RepoAdd {
    async fn add(&self, repo_dir: &Path, db_name: &str, filename: &str) -> Result<(), IndexError> {
        tracing::debug!(
            "{} -R -n -p {db_name} {filename} (in {})",
            self.program,
            repo_dir.display()
        );
        let status = self
            .command(repo_dir, db_name, filename)
            .status()
            .await
            .map_err(|source| IndexError::Spawn {
                tool: self.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(IndexError::Tool {
                tool: self.program.clone(),
                filename: filename.to_string(),
                status,
            });
        }
        Ok(())
    }
}

/// Registers artifacts with the repository they were placed in.
#[derive(Clone)]
pub struct LocalIndexer {
    layout: RepoLayout,
    writer: Arc<dyn IndexWriter>,
    reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for LocalIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalIndexer")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl LocalIndexer {
    pub fn new(layout: RepoLayout, writer: Arc<dyn IndexWriter>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            layout,
            writer,
            reporter,
        }
    }

    pub fn layout(&self) -> &RepoLayout {
        &self.layout
    }

    /// Add `filename`, already present in the repository directory, to the
    /// database of `repository`.
    ///
    /// Registering a file that is already indexed is harmless.
    pub async fn register(&self, repository: &str, filename: &str) -> Result<(), IndexError> {
        let repo_dir = self.layout.repo_dir(repository);
        self.register_in(&repo_dir, repository, filename).await
    }

    /// Like [`Self::register`], for a repository kept outside the layout.
    pub async fn register_in(
        &self,
        repo_dir: &Path,
        repository: &str,
        filename: &str,
    ) -> Result<(), IndexError> {
        tokio::fs::create_dir_all(repo_dir)
            .await
            .map_err(|source| IndexError::Io {
                path: repo_dir.to_path_buf(),
                source,
            })?;

        let db_name = RepoLayout::db_name(repository);
        self.writer.add(repo_dir, &db_name, filename).await?;

        tracing::debug!("Registered {filename} in {repository}");
        self.reporter.registered(repository, filename);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::NullReporter;
    use std::sync::Mutex;

    /// Records every call instead of touching a database.
    #[derive(Default)]
    pub(crate) struct RecordingWriter {
        pub(crate) calls: Mutex<Vec<(PathBuf, String, String)>>,
    }

    impl RecordingWriter {
        pub(crate) fn filenames(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(_, _, f)| f.clone())
                .collect()
        }
    }

    #[async_trait]
    impl IndexWriter for RecordingWriter {
        async fn add(
            &self,
            repo_dir: &Path,
            db_name: &str,
            filename: &str,
        ) -> Result<(), IndexError> {
            self.calls.lock().unwrap().push((
                repo_dir.to_path_buf(),
                db_name.to_string(),
                filename.to_string(),
            ));
            Ok(())
        }
    }

    #[test]
    fn test_repo_add_arguments() {
        let cmd = RepoAdd::default().command(
            Path::new("repo/plasma-mobile/aarch64"),
            "plasma-mobile.db.tar.xz",
            "kio-git-5.1-1-aarch64.pkg.tar.xz",
        );
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "repo-add");
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(
            args,
            [
                "-R",
                "-n",
                "-p",
                "plasma-mobile.db.tar.xz",
                "kio-git-5.1-1-aarch64.pkg.tar.xz"
            ]
        );
        assert_eq!(
            std_cmd.get_current_dir(),
            Some(Path::new("repo/plasma-mobile/aarch64"))
        );
    }

    #[tokio::test]
    async fn test_repo_add_failure_status() {
        let dir = tempfile::tempdir().unwrap();
        let err = RepoAdd::new("false")
            .add(dir.path(), "x.db.tar.xz", "a.pkg.tar.xz")
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Tool { .. }));
    }

    #[tokio::test]
    async fn test_repo_add_missing_tool() {
        let dir = tempfile::tempdir().unwrap();
        let err = RepoAdd::new("definitely_not_a_real_command_12345")
            .add(dir.path(), "x.db.tar.xz", "a.pkg.tar.xz")
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_register_creates_dir_and_delegates() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepoLayout {
            root: dir.path().join("repo"),
            ..RepoLayout::default()
        };
        let writer = Arc::new(RecordingWriter::default());
        let indexer = LocalIndexer::new(layout.clone(), writer.clone(), Arc::new(NullReporter));

        indexer
            .register("beryllium", "qrtr-git-1-1-aarch64.pkg.tar.xz")
            .await
            .unwrap();

        let repo_dir = layout.repo_dir("beryllium");
        assert!(repo_dir.is_dir());
        let calls = writer.calls.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            [(
                repo_dir,
                "beryllium.db.tar.xz".to_string(),
                "qrtr-git-1-1-aarch64.pkg.tar.xz".to_string()
            )]
        );
    }

    #[derive(Default)]
    struct RegistrationLog(Mutex<Vec<(String, String)>>);

    impl Reporter for RegistrationLog {
        fn section(&self, _: &str) {}
        fn fetching(&self, _: &str) {}
        fn downloading(&self, _: &str, _: u64, _: u64) {}
        fn downloaded(&self, _: &str, _: u64, _: std::time::Duration) {}
        fn registered(&self, repository: &str, filename: &str) {
            self.0
                .lock()
                .unwrap()
                .push((repository.to_string(), filename.to_string()));
        }
        fn info(&self, _: &str) {}
        fn success(&self, _: &str) {}
        fn warning(&self, _: &str) {}
        fn error(&self, _: &str) {}
        fn summary(&self, _: usize, _: &str, _: f64) {}
    }

    #[tokio::test]
    async fn test_register_in_uses_given_dir_and_reports_once() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepoLayout {
            root: dir.path().join("repo"),
            ..RepoLayout::default()
        };
        let writer = Arc::new(RecordingWriter::default());
        let log = Arc::new(RegistrationLog::default());
        let indexer = LocalIndexer::new(layout.clone(), writer.clone(), log.clone());
        let outside = dir.path().join("outside");

        indexer
            .register_in(&outside, "beryllium", "qrtr-git-1-1-aarch64.pkg.tar.xz")
            .await
            .unwrap();

        assert!(outside.is_dir());
        assert!(!layout.repo_dir("beryllium").exists());
        assert_eq!(writer.calls.lock().unwrap()[0].0, outside);
        assert_eq!(
            log.0.lock().unwrap().as_slice(),
            [(
                "beryllium".to_string(),
                "qrtr-git-1-1-aarch64.pkg.tar.xz".to_string()
            )]
        );
    }
}
