//! Shared fixture builder: lays out real cache trees (refs/blobs/snapshots
//! with relative symlinks) the same way the hub downloader does.

use std::fs;
use std::os::unix::fs::symlink;
use std::path::PathBuf;

pub struct CacheFixture {
    pub root: PathBuf,
    _tmp: tempfile::TempDir,
}

impl CacheFixture {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        // Canonicalize up front so resolved blob paths compare equal to
        // paths built from `root` (macOS tempdirs live behind /var symlinks).
        let root = tmp.path().canonicalize().unwrap();
        Self { root, _tmp: tmp }
    }

    /// Create an empty repo skeleton (`refs/`, `blobs/`, `snapshots/`).
    pub fn repo(&self, dir_name: &str) -> RepoFixture {
        let path = self.root.join(dir_name);
        for sub in ["refs", "blobs", "snapshots"] {
            fs::create_dir_all(path.join(sub)).unwrap();
        }
        RepoFixture { path }
    }
}

pub struct RepoFixture {
    pub path: PathBuf,
}

impl RepoFixture {
    /// Write a blob of `size` bytes and return its path.
    pub fn blob(&self, name: &str, size: usize) -> PathBuf {
        let path = self.path.join("blobs").join(name);
        fs::write(&path, vec![b'x'; size]).unwrap();
        path
    }

    /// Create a snapshot directory with symlinked entries.
    ///
    /// `files` maps a path relative to the snapshot root to a blob name; the
    /// links are relative (`../../blobs/<name>`), matching the downloader.
    pub fn snapshot(&self, commit_hash: &str, files: &[(&str, &str)]) -> PathBuf {
        let snapshot = self.path.join("snapshots").join(commit_hash);
        fs::create_dir_all(&snapshot).unwrap();
        for (rel, blob_name) in files {
            let dst = snapshot.join(rel);
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            let ups = "../".repeat(rel.matches('/').count() + 2);
            symlink(format!("{ups}blobs/{blob_name}"), &dst).unwrap();
        }
        snapshot
    }

    /// Write a ref file; `name` may be nested (`pr/1`).
    pub fn ref_file(&self, name: &str, commit_hash: &str) {
        let path = self.path.join("refs").join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, format!("{commit_hash}\n")).unwrap();
    }
}

/// 40-hex commit hashes for fixtures.
pub fn hash(fill: char) -> String {
    std::iter::repeat(fill).take(40).collect()
}
