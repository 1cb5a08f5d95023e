//! Archive extraction module
//!
//! Handles tar.gz, tar.zst and plain tar archives. The format is sniffed from
//! the leading bytes rather than the file name: upstream indexes are served as
//! `<repo>.db` regardless of their compression.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use armrepo_schema::{GZIP_MAGIC, ZSTD_MAGIC};
use thiserror::Error;
use zstd::stream::Decoder as ZstdDecoder;

/// Offset and value of the POSIX tar magic.
const USTAR_OFFSET: usize = 257;
const USTAR_MAGIC: &[u8] = b"ustar";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("Unsupported archive format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Archive error: {0}")]
    Archive(String),
}

impl ExtractError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Compression wrapped around a tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    TarZst,
    Tar,
}

/// Sniff the archive format from its first bytes.
pub fn detect_format(archive_path: &Path) -> Result<ArchiveFormat, ExtractError> {
    let mut header = Vec::with_capacity(USTAR_OFFSET + USTAR_MAGIC.len());
    File::open(archive_path)
        .and_then(|f| {
            f.take((USTAR_OFFSET + USTAR_MAGIC.len()) as u64)
                .read_to_end(&mut header)
        })
        .map_err(|e| ExtractError::io(archive_path, e))?;

    if header.starts_with(&GZIP_MAGIC) {
        Ok(ArchiveFormat::TarGz)
    } else if header.starts_with(&ZSTD_MAGIC) {
        Ok(ArchiveFormat::TarZst)
    } else if header.get(USTAR_OFFSET..) == Some(USTAR_MAGIC) {
        Ok(ArchiveFormat::Tar)
    } else {
        Err(ExtractError::UnsupportedFormat(archive_path.to_path_buf()))
    }
}

/// Extract an archive into `dest_dir`, returning the files written.
///
/// Entries that would land outside `dest_dir` are rejected.
pub fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let format = detect_format(archive_path)?;
    let reader = open_decoded(archive_path, format)?;
    extract_tar(reader, archive_path, dest_dir)
}

/// Unpack a root filesystem tarball, keeping modes and ownership.
pub fn extract_rootfs(archive_path: &Path, dest_dir: &Path) -> Result<(), ExtractError> {
    let format = detect_format(archive_path)?;
    let reader = open_decoded(archive_path, format)?;

    fs::create_dir_all(dest_dir).map_err(|e| ExtractError::io(dest_dir, e))?;

    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    // chown needs root; unprivileged unpacking keeps the caller's ids.
    archive.set_preserve_ownerships(crate::preflight::effective_uid() == 0);
    archive.set_preserve_mtime(true);
    archive
        .unpack(dest_dir)
        .map_err(|e| ExtractError::Archive(format!("{}: {e}", archive_path.display())))
}

fn open_decoded(archive_path: &Path, format: ArchiveFormat) -> Result<Box<dyn Read>, ExtractError> {
    let file = File::open(archive_path).map_err(|e| ExtractError::io(archive_path, e))?;
    let reader = BufReader::new(file);

    Ok(match format {
        ArchiveFormat::TarGz => Box::new(flate2::read::GzDecoder::new(reader)),
        ArchiveFormat::TarZst => {
            Box::new(ZstdDecoder::new(reader).map_err(|e| ExtractError::io(archive_path, e))?)
        }
        ArchiveFormat::Tar => Box::new(reader),
    })
}

/// Extract a tar archive from a reader
fn extract_tar<R: Read>(
    reader: R,
    archive_path: &Path,
    dest_dir: &Path,
) -> Result<Vec<PathBuf>, ExtractError> {
    fs::create_dir_all(dest_dir).map_err(|e| ExtractError::io(dest_dir, e))?;

    let archive_err = |e: io::Error| ExtractError::Archive(format!("{}: {e}", archive_path.display()));
    let mut archive = tar::Archive::new(reader);
    let mut extracted = Vec::new();

    for entry in archive.entries().map_err(archive_err)? {
        let mut entry = entry.map_err(archive_err)?;
        let relative_path: PathBuf = entry.path().map_err(archive_err)?.into_owned();

        // Sanitize path to prevent Zip Slip
        if relative_path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(ExtractError::Archive(format!(
                "Invalid path in archive: {}",
                relative_path.display()
            )));
        }

        let is_dir = entry.header().entry_type().is_dir();
        if !entry.unpack_in(dest_dir).map_err(archive_err)? {
            return Err(ExtractError::Archive(format!(
                "Refused to unpack: {}",
                relative_path.display()
            )));
        }

        if !is_dir {
            extracted.push(dest_dir.join(relative_path));
        }
    }

    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_detect_and_extract_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("core.db");
        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(&tar_bytes(&[("pkg-1/desc", b"%NAME%\npkg\n")]))
            .unwrap();
        std::fs::write(&archive, gz.finish().unwrap()).unwrap();

        assert_eq!(detect_format(&archive).unwrap(), ArchiveFormat::TarGz);

        let out = dir.path().join("out");
        let files = extract_archive(&archive, &out).unwrap();
        assert_eq!(files, [out.join("pkg-1/desc")]);
        assert_eq!(
            std::fs::read_to_string(out.join("pkg-1/desc")).unwrap(),
            "%NAME%\npkg\n"
        );
    }

    #[test]
    fn test_detect_and_extract_zstd() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("extra.db");
        let compressed = zstd::encode_all(&tar_bytes(&[("a-1/desc", b"x")])[..], 3).unwrap();
        std::fs::write(&archive, compressed).unwrap();

        assert_eq!(detect_format(&archive).unwrap(), ArchiveFormat::TarZst);
        let files = extract_archive(&archive, &dir.path().join("out")).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_detect_plain_tar() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("plain.db");
        std::fs::write(&archive, tar_bytes(&[("a-1/desc", b"x")])).unwrap();
        assert_eq!(detect_format(&archive).unwrap(), ArchiveFormat::Tar);
    }

    #[test]
    fn test_rejects_unknown_format() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("junk.db");
        std::fs::write(&archive, b"<html>not an archive</html>").unwrap();
        assert!(matches!(
            detect_format(&archive),
            Err(ExtractError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_extract_rootfs_preserves_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("rootfs.tar.gz");

        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(2);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, "usr/bin/tool", &b"#!"[..])
            .unwrap();
        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
        gz.write_all(&builder.into_inner().unwrap()).unwrap();
        std::fs::write(&archive, gz.finish().unwrap()).unwrap();

        let rootfs = dir.path().join("rootfs");
        extract_rootfs(&archive, &rootfs).unwrap();
        let mode = std::fs::metadata(rootfs.join("usr/bin/tool"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
