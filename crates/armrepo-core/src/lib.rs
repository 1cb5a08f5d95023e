//! Core library for armrepo.
//!
//! Assembles a local package repository for an ARM Linux distribution:
//!
//! - [`mirror`] selectively replicates upstream channels, driven by an allow-list
//! - [`build`] collects packages built inside a chroot'ed root filesystem
//! - [`indexer`] registers every new artifact with the repository database
//!
//! ```text
//! MirrorSync ──► index::decode ──► select::is_wanted ──► Downloader ──► LocalIndexer
//! BuildPipeline ─► Downloader (rootfs) ─► ChrootExecutor ─► LocalIndexer
//! ```

pub mod build;
pub mod index;
pub mod indexer;
pub mod io;
pub mod mirror;
pub mod preflight;
pub mod reporter;
pub mod select;

pub use build::{BuildPipeline, ChrootExecutor, ChrootHelper};
pub use index::{DecodedIndex, decode};
pub use indexer::{IndexWriter, LocalIndexer, RepoAdd};
pub use io::download::{Downloader, FetchOutcome, HttpDownloader};
pub use mirror::MirrorSync;
pub use reporter::{NullReporter, Reporter};
pub use select::is_wanted;

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("armrepo/", env!("CARGO_PKG_VERSION"));
