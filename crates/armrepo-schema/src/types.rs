//! Core data types shared by the mirror and build pipelines.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One package version as described by an upstream repository index.
///
/// Produced by decoding a single `desc` file; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Package name (e.g., "kio-git")
    pub name: String,

    /// Artifact file name (e.g., "kio-git-5.1-1-aarch64.pkg.tar.xz")
    pub filename: String,
}

impl PackageDescriptor {
    /// Create a descriptor from a name and an artifact file name.
    pub fn new(name: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filename: filename.into(),
        }
    }
}

impl std::fmt::Display for PackageDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.filename)
    }
}

/// The fixed set of package names retained from an upstream source.
///
/// Insertion order is preserved and duplicates are collapsed. Membership is
/// exact string equality: no globbing, no version constraints.
///
/// # Example
///
/// ```
/// use armrepo_schema::AllowList;
///
/// let list = AllowList::new(["kio-git", "kwin-git", "kio-git"]);
/// assert_eq!(list.len(), 2);
/// assert!(list.contains("kwin-git"));
/// assert!(!list.contains("kwin"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct AllowList(Vec<String>);

impl AllowList {
    /// Build an allow-list, keeping the first occurrence of each name.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if !out.contains(&name) {
                out.push(name);
            }
        }
        Self(out)
    }

    /// Exact-match membership test.
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    /// Iterate names in configured order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list holds no names.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for AllowList {
    fn from(names: Vec<String>) -> Self {
        Self::new(names)
    }
}

impl From<AllowList> for Vec<String> {
    fn from(list: AllowList) -> Self {
        list.0
    }
}

/// One upstream channel to mirror into a local repository directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorTarget {
    /// Upstream channel label (e.g., "core"); also names the index file (`core.db`).
    pub source_label: String,

    /// Base URL of the channel, without trailing slash.
    pub base_url: String,

    /// Directory receiving the mirrored artifacts.
    pub local_dir: PathBuf,

    /// Local repository the artifacts are registered into.
    pub repository: String,
}

impl MirrorTarget {
    /// URL of the channel's repository index archive: `<base_url>/<label>.db`.
    pub fn index_url(&self) -> String {
        format!("{}/{}.db", self.base_url, self.source_label)
    }

    /// URL of a single artifact: `<base_url>/<filename>`.
    pub fn artifact_url(&self, filename: &str) -> String {
        format!("{}/{filename}", self.base_url)
    }

    /// Destination of a single artifact: `<local_dir>/<filename>`.
    pub fn artifact_path(&self, filename: &str) -> PathBuf {
        self.local_dir.join(filename)
    }
}

/// An artifact that finished downloading during this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArtifact {
    /// Bare file name
    pub filename: String,
    /// Where the artifact now lives
    pub local_path: PathBuf,
    /// Bytes written
    pub size_bytes: u64,
}

impl FetchedArtifact {
    /// Describe a completed download at `local_path`.
    pub fn new(local_path: &Path, size_bytes: u64) -> Self {
        let filename = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            filename,
            local_path: local_path.to_path_buf(),
            size_bytes,
        }
    }
}

/// On-disk layout of the local repository tree.
///
/// Artifacts for repository `name` live in `<root>/<name>/<arch>/`, next to the
/// generated `<name>.db.tar.xz` database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoLayout {
    /// Repository tree root
    pub root: PathBuf,
    /// Target architecture directory name
    pub arch: String,
    /// Where downloaded index archives and rootfs tarballs are kept
    pub cache_dir: PathBuf,
}

impl Default for RepoLayout {
    fn default() -> Self {
        Self {
            root: PathBuf::from("repo"),
            arch: "aarch64".to_string(),
            cache_dir: PathBuf::from("cache"),
        }
    }
}

impl RepoLayout {
    /// Artifact directory for a repository.
    pub fn repo_dir(&self, repository: &str) -> PathBuf {
        self.root.join(repository).join(&self.arch)
    }

    /// File name of a repository's package database.
    pub fn db_name(repository: &str) -> String {
        format!("{repository}.db.tar.xz")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list_exact_match() {
        let list = AllowList::new(["kio-git", "qt5-base"]);
        assert!(list.contains("kio-git"));
        assert!(!list.contains("kio"));
        assert!(!list.contains("kio-git "));
        assert!(!list.contains("KIO-GIT"));
    }

    #[test]
    fn test_allow_list_preserves_order() {
        let list = AllowList::new(["b", "a", "b", "c"]);
        let names: Vec<&str> = list.iter().collect();
        assert_eq!(names, ["b", "a", "c"]);
    }

    #[test]
    fn test_mirror_target_urls() {
        let target = MirrorTarget {
            source_label: "extra".to_string(),
            base_url: "https://mirror.example/arm-unstable/extra/aarch64".to_string(),
            local_dir: PathBuf::from("repo/plasma-mobile/aarch64"),
            repository: "plasma-mobile".to_string(),
        };
        assert_eq!(
            target.index_url(),
            "https://mirror.example/arm-unstable/extra/aarch64/extra.db"
        );
        assert_eq!(
            target.artifact_url("kio-git-5.1-1-aarch64.pkg.tar.xz"),
            "https://mirror.example/arm-unstable/extra/aarch64/kio-git-5.1-1-aarch64.pkg.tar.xz"
        );
        assert_eq!(
            target.artifact_path("x.pkg.tar.xz"),
            PathBuf::from("repo/plasma-mobile/aarch64/x.pkg.tar.xz")
        );
    }

    #[test]
    fn test_repo_layout_paths() {
        let layout = RepoLayout::default();
        assert_eq!(
            layout.repo_dir("beryllium"),
            PathBuf::from("repo/beryllium/aarch64")
        );
        assert_eq!(RepoLayout::db_name("beryllium"), "beryllium.db.tar.xz");
    }

    #[test]
    fn test_fetched_artifact_filename() {
        let art = FetchedArtifact::new(Path::new("repo/x/aarch64/a.pkg.tar.xz"), 42);
        assert_eq!(art.filename, "a.pkg.tar.xz");
        assert_eq!(art.size_bytes, 42);
    }
}
