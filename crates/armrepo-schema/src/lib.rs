//! Shared types and configuration format for armrepo.
//!
//! Everything here is plain data: descriptors decoded from upstream indexes,
//! allow-lists, mirror targets and the TOML run configuration. The pipeline
//! itself lives in `armrepo-core`.

pub mod config;
pub mod types;

// Re-exports
pub use config::{BuildConfig, ConfigError, MirrorConfig, RunConfig};
pub use types::*;

/// Magic bytes for gzip compression
pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// Magic bytes for ZSTD compression (Little Endian: 0xFD2FB528 -> 28 B5 2F FD)
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Suffix of the package artifacts produced by the build pipeline.
pub const PACKAGE_SUFFIX: &str = ".pkg.tar.xz";
