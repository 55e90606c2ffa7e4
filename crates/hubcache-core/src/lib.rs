//! # hubcache-core
//!
//! Local disk management for Hugging Face Hub style download caches.
//!
//! A hub cache keeps one directory per repo, with content-addressed blobs
//! shared between the revisions that reference them:
//!
//! ```text
//! ~/.cache/huggingface/hub/
//! └── models--bigscience--bloom/
//!     ├── refs/
//!     │   └── main              # text file holding a commit hash
//!     ├── blobs/
//!     │   └── b5b9d1...         # content-addressed payload
//!     └── snapshots/
//!         └── 6c4e1c.../        # one directory per cached revision
//!             └── config.json   # symlink into blobs/ (or a plain copy)
//! ```
//!
//! [`scan_cache_dir`] rebuilds the logical model (repos → revisions → refs →
//! files → shared blobs) from that layout and computes deduplicated disk
//! usage. [`CacheReport::delete_revisions`] turns a set of revision hashes
//! into a [`DeletePlan`] that frees exactly the blobs no retained revision
//! still needs, and [`DeletePlan::execute`] applies it best-effort.
//!
//! Reports are snapshots in time: they never observe later disk changes, and
//! a plan computed from a stale report degrades to per-path warnings on
//! execution rather than failing.

mod layout;
mod plan;
mod scan;

pub use layout::{parse_repo_dir_name, resolve_blob_path, RepoNameError, RepoType};
pub use plan::DeletePlan;
pub use scan::{
    scan_cache_dir, CacheReport, CachedFile, CachedRepo, CachedRevision, CorruptedRepo,
};

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a whole cache operation.
///
/// Per-repo problems never show up here; they degrade to
/// [`CacheReport::warnings`] entries instead.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache directory not found: {0}")]
    NotFound(PathBuf),

    #[error("cache path exists but is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Resolve the default hub cache directory.
///
/// Resolution order mirrors the hub downloader:
/// 1. `HF_HUB_CACHE` is used verbatim,
/// 2. `HF_HOME` puts the cache at `$HF_HOME/hub`,
/// 3. otherwise `~/.cache/huggingface/hub`.
pub fn default_cache_dir() -> PathBuf {
    if let Ok(path) = std::env::var("HF_HUB_CACHE") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    if let Ok(home) = std::env::var("HF_HOME") {
        if !home.is_empty() {
            return PathBuf::from(home).join("hub");
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cache")
        .join("huggingface")
        .join("hub")
}
