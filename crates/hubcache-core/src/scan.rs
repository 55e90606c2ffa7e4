//! Cache scanning and deduplicated disk-usage accounting.
//!
//! [`scan_cache_dir`] walks every repo directory under the cache root in
//! parallel and produces an immutable [`CacheReport`]. One corrupted repo
//! never aborts the scan: it becomes a [`CorruptedRepo`] warning and the
//! sibling repos still appear in the report.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rayon::prelude::*;
use tracing::debug;
use walkdir::WalkDir;

use crate::layout::{collect_refs, parse_repo_dir_name, resolve_blob_path, RepoNameError, RepoType};
use crate::{default_cache_dir, CacheError, Result};

/// One physical file inside a revision's snapshot directory.
///
/// `file_path` is the entry as it appears under `snapshots/<hash>/` (possibly
/// a symlink); `blob_path` is the resolved storage location. Size and
/// timestamps come from the blob, not the symlink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub file_name: String,
    pub file_path: PathBuf,
    pub blob_path: PathBuf,
    pub size_on_disk: u64,
    pub blob_last_accessed: SystemTime,
    pub blob_last_modified: SystemTime,
}

/// One immutable revision of a repo as materialized on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRevision {
    /// Full hex commit hash, taken from the snapshot directory name.
    pub commit_hash: String,
    pub snapshot_path: PathBuf,
    /// Sum of distinct blob sizes within this revision. A blob referenced
    /// twice by one revision counts once.
    pub size_on_disk: u64,
    /// Count of distinct blobs referenced by this revision.
    pub nb_files: usize,
    pub files: Vec<CachedFile>,
    /// Ref names pointing at this revision. Empty means detached.
    pub refs: BTreeSet<String>,
    /// Max of the file blobs' mtimes, or the snapshot directory's own mtime
    /// when the revision is empty.
    pub last_modified: SystemTime,
}

/// One repo cache folder (`models--...`, `datasets--...`, `spaces--...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRepo {
    pub repo_id: String,
    pub repo_type: RepoType,
    pub repo_path: PathBuf,
    /// Sum of distinct blob sizes across all revisions. A blob shared by two
    /// revisions counts once here even though each revision counts it.
    pub size_on_disk: u64,
    /// Distinct blob count across all revisions.
    pub nb_files: usize,
    pub revisions: Vec<CachedRevision>,
    /// Ref name to commit hash. Every target is guaranteed to be one of
    /// `revisions` (a dangling ref fails the whole repo scan).
    pub refs: BTreeMap<String, String>,
    pub last_accessed: SystemTime,
    pub last_modified: SystemTime,
}

impl CachedRepo {
    /// Look up a revision by its commit hash.
    pub fn revision(&self, commit_hash: &str) -> Option<&CachedRevision> {
        self.revisions.iter().find(|r| r.commit_hash == commit_hash)
    }
}

/// Immutable result of one cache scan.
///
/// A report never observes disk changes made after the scan; re-scan to
/// refresh.
#[derive(Debug)]
pub struct CacheReport {
    pub cache_dir: PathBuf,
    /// Sum of the repos' deduplicated sizes.
    pub size_on_disk: u64,
    pub repos: Vec<CachedRepo>,
    /// Non-fatal per-repo failures. Each entry corresponds to one entry of
    /// the cache root that is absent from `repos`.
    pub warnings: Vec<CorruptedRepo>,
}

/// A repo directory that could not be scanned.
///
/// Collected as [`CacheReport::warnings`]; never aborts the scan of sibling
/// repos.
#[derive(Debug, thiserror::Error)]
pub enum CorruptedRepo {
    #[error("not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("invalid repo directory name '{name}' ({path}): {source}")]
    InvalidName {
        name: String,
        path: PathBuf,
        source: RepoNameError,
    },

    #[error("refs entry is a file, expected a directory: {path}")]
    RefsNotADirectory { path: PathBuf },

    #[error("missing snapshots directory: {path}")]
    MissingSnapshots { path: PathBuf },

    #[error("snapshots directory contains a file: {path}")]
    FileInSnapshots { path: PathBuf },

    #[error("ref(s) {refs:?} point to missing revision(s) {hashes:?} in {path}")]
    DanglingRefs {
        refs: Vec<String>,
        hashes: Vec<String>,
        path: PathBuf,
    },

    #[error("I/O error while scanning {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

/// Scan a hub cache directory and build a [`CacheReport`].
///
/// With `cache_dir == None` the default location is used (see
/// [`default_cache_dir`]). Fails with [`CacheError::NotFound`] when the
/// directory does not exist and [`CacheError::NotADirectory`] when it exists
/// but is a file; everything else degrades to per-repo warnings.
pub fn scan_cache_dir(cache_dir: Option<&Path>) -> Result<CacheReport> {
    let cache_dir = match cache_dir {
        Some(p) => p.to_path_buf(),
        None => default_cache_dir(),
    };

    if !cache_dir.exists() {
        return Err(CacheError::NotFound(cache_dir));
    }
    if !cache_dir.is_dir() {
        return Err(CacheError::NotADirectory(cache_dir));
    }

    let entries: Vec<PathBuf> = fs::read_dir(&cache_dir)?
        .collect::<io::Result<Vec<_>>>()?
        .into_iter()
        .map(|e| e.path())
        // .locks holds download lock files, not a repo
        .filter(|p| !p.file_name().is_some_and(|n| n == ".locks"))
        .collect();

    // Repos share no state, so each one scans independently.
    let outcomes: Vec<std::result::Result<CachedRepo, CorruptedRepo>> =
        entries.par_iter().map(|path| scan_repo_dir(path)).collect();

    let mut repos = Vec::new();
    let mut warnings = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(repo) => repos.push(repo),
            Err(warning) => warnings.push(warning),
        }
    }
    // The parallel walk yields in nondeterministic order; sort so reports
    // are reproducible run-to-run.
    repos.sort_by(|a, b| a.repo_path.cmp(&b.repo_path));
    warnings.sort_by_key(|w| w.to_string());

    let size_on_disk = repos.iter().map(|r| r.size_on_disk).sum();
    debug!(
        cache_dir = %cache_dir.display(),
        repos = repos.len(),
        warnings = warnings.len(),
        size_on_disk,
        "cache scan complete"
    );

    Ok(CacheReport {
        cache_dir,
        size_on_disk,
        repos,
        warnings,
    })
}

/// Size and timestamps of one blob, keyed by resolved blob path.
struct BlobStat {
    size: u64,
    accessed: SystemTime,
    modified: SystemTime,
}

fn io_corruption(path: &Path) -> impl FnOnce(io::Error) -> CorruptedRepo + '_ {
    move |source| CorruptedRepo::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Scan one `{type}s--{namespace}--{name}` directory.
fn scan_repo_dir(repo_path: &Path) -> std::result::Result<CachedRepo, CorruptedRepo> {
    if !repo_path.is_dir() {
        return Err(CorruptedRepo::NotADirectory {
            path: repo_path.to_path_buf(),
        });
    }

    let name = repo_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (repo_type, repo_id) =
        parse_repo_dir_name(&name).map_err(|source| CorruptedRepo::InvalidName {
            name: name.clone(),
            path: repo_path.to_path_buf(),
            source,
        })?;

    let refs_path = repo_path.join("refs");
    if refs_path.is_file() {
        return Err(CorruptedRepo::RefsNotADirectory { path: refs_path });
    }
    let refs = if refs_path.is_dir() {
        collect_refs(&refs_path).map_err(io_corruption(&refs_path))?
    } else {
        BTreeMap::new()
    };

    let snapshots_path = repo_path.join("snapshots");
    if !snapshots_path.is_dir() {
        return Err(CorruptedRepo::MissingSnapshots {
            path: snapshots_path,
        });
    }

    let mut blob_stats: HashMap<PathBuf, BlobStat> = HashMap::new();
    let mut revisions = Vec::new();
    for entry in fs::read_dir(&snapshots_path).map_err(io_corruption(&snapshots_path))? {
        let entry = entry.map_err(io_corruption(&snapshots_path))?;
        let snapshot_path = entry.path();
        if !snapshot_path.is_dir() {
            return Err(CorruptedRepo::FileInSnapshots {
                path: snapshot_path,
            });
        }
        revisions.push(scan_revision(&snapshot_path, &mut blob_stats)?);
    }
    revisions.sort_by(|a, b| a.commit_hash.cmp(&b.commit_hash));

    attach_refs(&mut revisions, &refs, repo_path)?;

    let repo_meta = fs::metadata(repo_path).map_err(io_corruption(repo_path))?;
    let last_accessed = blob_stats
        .values()
        .map(|s| s.accessed)
        .max()
        .unwrap_or_else(|| repo_meta.accessed().unwrap_or(SystemTime::UNIX_EPOCH));
    let last_modified = revisions
        .iter()
        .map(|r| r.last_modified)
        .max()
        .unwrap_or_else(|| repo_meta.modified().unwrap_or(SystemTime::UNIX_EPOCH));

    Ok(CachedRepo {
        repo_id,
        repo_type,
        repo_path: repo_path.to_path_buf(),
        size_on_disk: blob_stats.values().map(|s| s.size).sum(),
        nb_files: blob_stats.len(),
        revisions,
        refs,
        last_accessed,
        last_modified,
    })
}

/// Scan one `snapshots/<commit_hash>` directory, recording every resolved
/// blob in `blob_stats` for the repo-level aggregation.
fn scan_revision(
    snapshot_path: &Path,
    blob_stats: &mut HashMap<PathBuf, BlobStat>,
) -> std::result::Result<CachedRevision, CorruptedRepo> {
    let mut files = Vec::new();
    for entry in WalkDir::new(snapshot_path) {
        let entry = entry.map_err(|e| CorruptedRepo::Io {
            path: snapshot_path.to_path_buf(),
            source: io::Error::other(e),
        })?;
        // is_dir follows symlinks, so a symlinked directory is skipped too
        if entry.path().is_dir() {
            continue;
        }

        let file_path = entry.path();
        let blob_path = resolve_blob_path(file_path).map_err(io_corruption(file_path))?;
        let meta = fs::metadata(&blob_path).map_err(io_corruption(&blob_path))?;
        let accessed = meta.accessed().unwrap_or(SystemTime::UNIX_EPOCH);
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        blob_stats.entry(blob_path.clone()).or_insert(BlobStat {
            size: meta.len(),
            accessed,
            modified,
        });

        files.push(CachedFile {
            file_name: entry.file_name().to_string_lossy().into_owned(),
            file_path: file_path.to_path_buf(),
            blob_path,
            size_on_disk: meta.len(),
            blob_last_accessed: accessed,
            blob_last_modified: modified,
        });
    }
    files.sort_by(|a, b| a.file_path.cmp(&b.file_path));

    // Revision-level accounting deduplicates on blob path: two snapshot
    // entries backed by the same blob count once.
    let mut unique_blobs: HashMap<&Path, u64> = HashMap::new();
    for file in &files {
        unique_blobs.insert(&file.blob_path, file.size_on_disk);
    }

    let last_modified = files
        .iter()
        .map(|f| f.blob_last_modified)
        .max()
        .unwrap_or_else(|| {
            fs::metadata(snapshot_path)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH)
        });

    Ok(CachedRevision {
        commit_hash: snapshot_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        snapshot_path: snapshot_path.to_path_buf(),
        size_on_disk: unique_blobs.values().sum(),
        nb_files: unique_blobs.len(),
        files,
        refs: BTreeSet::new(),
        last_modified,
    })
}

/// Distribute ref names onto the revisions they point at.
///
/// A ref whose target hash matches no scanned revision fails the repo: the
/// refs directory and the snapshots directory disagree and neither can be
/// trusted.
fn attach_refs(
    revisions: &mut [CachedRevision],
    refs: &BTreeMap<String, String>,
    repo_path: &Path,
) -> std::result::Result<(), CorruptedRepo> {
    let known: HashSet<&str> = revisions.iter().map(|r| r.commit_hash.as_str()).collect();
    let dangling: Vec<(&String, &String)> = refs
        .iter()
        .filter(|(_, hash)| !known.contains(hash.as_str()))
        .collect();
    if !dangling.is_empty() {
        return Err(CorruptedRepo::DanglingRefs {
            refs: dangling.iter().map(|(name, _)| (*name).clone()).collect(),
            hashes: dangling.iter().map(|(_, hash)| (*hash).clone()).collect(),
            path: repo_path.to_path_buf(),
        });
    }

    for revision in revisions.iter_mut() {
        revision.refs = refs
            .iter()
            .filter(|(_, hash)| **hash == revision.commit_hash)
            .map(|(name, _)| name.clone())
            .collect();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_missing_dir_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("no-such-cache");
        match scan_cache_dir(Some(&missing)) {
            Err(CacheError::NotFound(path)) => assert_eq!(path, missing),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_scan_file_as_cache_dir_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("cache");
        fs::write(&file, b"not a dir").unwrap();
        assert!(matches!(
            scan_cache_dir(Some(&file)),
            Err(CacheError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_scan_empty_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let report = scan_cache_dir(Some(tmp.path())).unwrap();
        assert_eq!(report.size_on_disk, 0);
        assert!(report.repos.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_locks_dir_is_skipped_silently() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join(".locks")).unwrap();
        let report = scan_cache_dir(Some(tmp.path())).unwrap();
        assert!(report.repos.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_stray_file_in_cache_root_warns() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("version.txt"), b"1").unwrap();
        let report = scan_cache_dir(Some(tmp.path())).unwrap();
        assert!(report.repos.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert!(matches!(
            report.warnings[0],
            CorruptedRepo::NotADirectory { .. }
        ));
    }

    #[test]
    fn test_repo_without_snapshots_dir_warns() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("models--org--name")).unwrap();
        let report = scan_cache_dir(Some(tmp.path())).unwrap();
        assert!(report.repos.is_empty());
        assert!(matches!(
            report.warnings[0],
            CorruptedRepo::MissingSnapshots { .. }
        ));
    }

    #[test]
    fn test_empty_snapshots_dir_is_not_a_warning() {
        // A repo created without ever downloading a file still appears,
        // with zero size and timestamps from the repo folder itself.
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("models--org--empty");
        fs::create_dir_all(repo.join("snapshots")).unwrap();
        let report = scan_cache_dir(Some(tmp.path())).unwrap();
        assert!(report.warnings.is_empty());
        assert_eq!(report.repos.len(), 1);
        let repo = &report.repos[0];
        assert_eq!(repo.size_on_disk, 0);
        assert_eq!(repo.nb_files, 0);
        assert!(repo.revisions.is_empty());
    }
}
