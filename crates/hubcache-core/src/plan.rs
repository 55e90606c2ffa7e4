//! Deletion planning and best-effort execution.
//!
//! [`CacheReport::delete_revisions`] is a pure set computation over an
//! existing report: it never touches disk. [`DeletePlan::execute`] applies
//! the plan path by path, logging failures instead of aborting, so a plan
//! computed against a snapshot that has since changed degrades gracefully.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

use crate::scan::{CacheReport, CachedRevision};

/// A precomputed, side-effect-free deletion plan.
///
/// Invariant: a blob path appears in `blobs` iff no retained revision of the
/// same repo still references it. When every revision of a repo is targeted,
/// the whole repo directory lands in `repos` instead of per-blob and
/// per-snapshot entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletePlan {
    /// Bytes that will actually be reclaimed. Blobs still referenced by a
    /// retained revision are not counted.
    pub expected_freed_size: u64,
    pub blobs: BTreeSet<PathBuf>,
    pub refs: BTreeSet<PathBuf>,
    pub repos: BTreeSet<PathBuf>,
    pub snapshots: BTreeSet<PathBuf>,
}

impl CacheReport {
    /// Plan the removal of the given revisions, identified by their full
    /// commit hashes.
    ///
    /// Hashes matching no scanned revision are logged at warn level and
    /// skipped; the remaining hashes are still planned. The plan is computed
    /// entirely from this in-memory report, not from a fresh scan.
    pub fn delete_revisions<S: AsRef<str>>(&self, revisions: &[S]) -> DeletePlan {
        let requested: HashSet<&str> = revisions.iter().map(AsRef::as_ref).collect();
        let mut found: HashSet<&str> = HashSet::new();
        let mut plan = DeletePlan::default();

        for repo in &self.repos {
            let (targeted, retained): (Vec<&CachedRevision>, Vec<&CachedRevision>) = repo
                .revisions
                .iter()
                .partition(|rev| requested.contains(rev.commit_hash.as_str()));
            if targeted.is_empty() {
                continue;
            }
            for rev in &targeted {
                found.insert(rev.commit_hash.as_str());
            }

            if retained.is_empty() {
                // Nothing survives: remove the whole repo directory rather
                // than leaving an empty refs/blobs/snapshots skeleton.
                plan.repos.insert(repo.repo_path.clone());
                plan.expected_freed_size += repo.size_on_disk;
                continue;
            }

            let still_needed: HashSet<&Path> = retained
                .iter()
                .flat_map(|rev| rev.files.iter().map(|f| f.blob_path.as_path()))
                .collect();

            for rev in &targeted {
                plan.snapshots.insert(rev.snapshot_path.clone());
                for ref_name in &rev.refs {
                    plan.refs.insert(repo.repo_path.join("refs").join(ref_name));
                }
                for file in &rev.files {
                    if still_needed.contains(file.blob_path.as_path()) {
                        continue;
                    }
                    if plan.blobs.insert(file.blob_path.clone()) {
                        plan.expected_freed_size += file.size_on_disk;
                    }
                }
            }
        }

        for hash in requested {
            if !found.contains(hash) {
                warn!(revision = hash, "revision not found in cache, skipping");
            }
        }

        plan
    }
}

impl DeletePlan {
    /// True when the plan removes nothing.
    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
            && self.snapshots.is_empty()
            && self.blobs.is_empty()
            && self.refs.is_empty()
    }

    /// Apply the plan to disk, best-effort.
    ///
    /// Every path is deleted independently: a missing path or an OS error on
    /// one path is logged and the remaining paths are still processed. Never
    /// returns an error and never rolls back. Running a stale plan a second
    /// time only produces "already gone" warnings.
    pub fn execute(&self) {
        let mut failures: Vec<(PathBuf, io::Error)> = Vec::new();

        for path in &self.repos {
            remove_path(path, |p| fs::remove_dir_all(p), &mut failures);
        }
        for path in &self.snapshots {
            remove_path(path, |p| fs::remove_dir_all(p), &mut failures);
        }
        for path in &self.blobs {
            remove_path(path, |p| fs::remove_file(p), &mut failures);
        }
        for path in &self.refs {
            remove_path(path, |p| fs::remove_file(p), &mut failures);
        }

        for (path, error) in &failures {
            warn!(path = %path.display(), error = %error, "could not delete path");
        }
        if !failures.is_empty() {
            warn!(
                failed = failures.len(),
                "cache deletion finished with failures"
            );
        }
    }
}

fn remove_path<F>(path: &Path, remove: F, failures: &mut Vec<(PathBuf, io::Error)>)
where
    F: Fn(&Path) -> io::Result<()>,
{
    // symlink_metadata so a dangling symlink still counts as present
    if fs::symlink_metadata(path).is_err() {
        warn!(path = %path.display(), "path already gone, skipping");
        return;
    }
    if let Err(error) = remove(path) {
        failures.push((path.to_path_buf(), error));
    }
}
