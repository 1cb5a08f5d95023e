//! Upstream repository index decoding.
//!
//! A pacman sync database is a tar archive holding one directory per package
//! version (`kio-git-5.1-1/`), each with a `desc` file of marker/value line
//! pairs:
//!
//! ```text
//! %FILENAME%
//! kio-git-5.1-1-aarch64.pkg.tar.xz
//!
//! %NAME%
//! kio-git
//! ```
//!
//! Only `%NAME%` and `%FILENAME%` are read. Scanning stops once both are
//! found; the first non-empty value of each marker wins.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use armrepo_schema::PackageDescriptor;
use tempfile::TempDir;
use thiserror::Error;

use crate::io::extract::{ExtractError, extract_archive};

pub const NAME_MARKER: &str = "%NAME%";
pub const FILENAME_MARKER: &str = "%FILENAME%";
pub const DESC_FILE: &str = "desc";

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to unpack index: {0}")]
    Archive(#[from] ExtractError),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    MissingDescriptor {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path}: no value for {marker}")]
    MissingField { path: PathBuf, marker: &'static str },

    #[error("{path}: refusing artifact file name '{filename}'")]
    InvalidFilename { path: PathBuf, filename: String },
}

/// Descriptors decoded from one index archive, plus the scratch directory they
/// were unpacked into.
///
/// The scratch directory is removed when this value is dropped or
/// [`closed`](DecodedIndex::close).
#[derive(Debug)]
pub struct DecodedIndex {
    scratch: TempDir,
    descriptors: Vec<PackageDescriptor>,
}

impl DecodedIndex {
    /// Descriptors in decode order (package directory name order).
    pub fn descriptors(&self) -> &[PackageDescriptor] {
        &self.descriptors
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PackageDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Where the archive was unpacked.
    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    /// Look up descriptors by package name.
    ///
    /// Upstream indexes should carry one entry per name. If one does not, the
    /// entry decoded last wins and a warning is logged.
    pub fn by_name(&self) -> HashMap<&str, &PackageDescriptor> {
        let mut map = HashMap::with_capacity(self.descriptors.len());
        for desc in &self.descriptors {
            if let Some(prev) = map.insert(desc.name.as_str(), desc) {
                tracing::warn!(
                    "Duplicate index entry for {}: {} replaced by {}",
                    desc.name,
                    prev.filename,
                    desc.filename
                );
            }
        }
        map
    }

    /// One descriptor per name, in decode order, resolved like [`Self::by_name`].
    pub fn unique(&self) -> Vec<&PackageDescriptor> {
        let winners = self.by_name();
        self.descriptors
            .iter()
            .filter(|d| {
                winners
                    .get(d.name.as_str())
                    .is_some_and(|w| std::ptr::eq(*w, *d))
            })
            .collect()
    }

    /// Remove the scratch directory, surfacing any error.
    pub fn close(self) -> std::io::Result<()> {
        self.scratch.close()
    }
}

impl<'a> IntoIterator for &'a DecodedIndex {
    type Item = &'a PackageDescriptor;
    type IntoIter = std::slice::Iter<'a, PackageDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.iter()
    }
}

/// Unpack an index archive into a fresh scratch directory and decode every
/// package entry.
///
/// Any unreadable or incomplete `desc` fails the whole decode.
pub fn decode(archive_path: &Path) -> Result<DecodedIndex, DecodeError> {
    let scratch = tempfile::Builder::new()
        .prefix("armrepo-index-")
        .tempdir()
        .map_err(|source| DecodeError::Io {
            path: std::env::temp_dir(),
            source,
        })?;

    extract_archive(archive_path, scratch.path())?;
    let descriptors = read_descriptors(scratch.path())?;
    tracing::debug!(
        "Decoded {} entries from {}",
        descriptors.len(),
        archive_path.display()
    );

    Ok(DecodedIndex {
        scratch,
        descriptors,
    })
}

/// Decode the `desc` file of every immediate subdirectory of `root`.
pub fn read_descriptors(root: &Path) -> Result<Vec<PackageDescriptor>, DecodeError> {
    let io_err = |source| DecodeError::Io {
        path: root.to_path_buf(),
        source,
    };

    let mut dirs = Vec::new();
    for entry in fs::read_dir(root).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if entry.file_type().map_err(io_err)?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();

    dirs.iter()
        .map(|dir| read_descriptor(&dir.join(DESC_FILE)))
        .collect()
}

/// Read and parse a single `desc` file.
pub fn read_descriptor(path: &Path) -> Result<PackageDescriptor, DecodeError> {
    let text = fs::read_to_string(path).map_err(|source| DecodeError::MissingDescriptor {
        path: path.to_path_buf(),
        source,
    })?;
    parse_desc(&text, path)
}

/// Extract name and file name from `desc` contents.
pub fn parse_desc(text: &str, path: &Path) -> Result<PackageDescriptor, DecodeError> {
    let lines: Vec<&str> = text.lines().collect();
    let mut name: Option<&str> = None;
    let mut filename: Option<&str> = None;

    for (i, line) in lines.iter().enumerate() {
        let value = || lines.get(i + 1).copied().filter(|v| !v.is_empty());
        match *line {
            NAME_MARKER if name.is_none() => name = value(),
            FILENAME_MARKER if filename.is_none() => filename = value(),
            _ => {}
        }
        if name.is_some() && filename.is_some() {
            break;
        }
    }

    let name = name.ok_or_else(|| DecodeError::MissingField {
        path: path.to_path_buf(),
        marker: NAME_MARKER,
    })?;
    let filename = filename.ok_or_else(|| DecodeError::MissingField {
        path: path.to_path_buf(),
        marker: FILENAME_MARKER,
    })?;

    // The file name becomes a path under the local repository directory.
    if filename.contains('/') || filename == "." || filename == ".." {
        return Err(DecodeError::InvalidFilename {
            path: path.to_path_buf(),
            filename: filename.to_string(),
        });
    }

    Ok(PackageDescriptor::new(name, filename))
}
