//! On-disk layout of a hub cache.
//!
//! Pure helpers over the naming convention: repo directories are named
//! `{repo_type}s--{namespace}--{name}`, refs are plain-text files holding a
//! commit hash, and snapshot entries are symlinks into `blobs/` (or plain
//! copies on filesystems without symlink support).

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

/// Kind of repo a cache directory holds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RepoType {
    Model,
    Dataset,
    Space,
}

impl RepoType {
    /// Parse the plural directory prefix (`models`, `datasets`, `spaces`).
    pub fn from_plural(s: &str) -> Option<Self> {
        match s {
            "models" => Some(RepoType::Model),
            "datasets" => Some(RepoType::Dataset),
            "spaces" => Some(RepoType::Space),
            _ => None,
        }
    }

    /// Singular form, as used in repo listings.
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoType::Model => "model",
            RepoType::Dataset => "dataset",
            RepoType::Space => "space",
        }
    }
}

impl fmt::Display for RepoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a top-level directory name could not be parsed as a cached repo.
#[derive(Error, Debug)]
pub enum RepoNameError {
    #[error("missing '--' separator")]
    MissingSeparator,

    #[error("unknown repo type prefix '{0}'")]
    UnknownRepoType(String),
}

/// Split a top-level cache directory name into repo type and repo id.
///
/// `models--bigscience--bloom` becomes `(Model, "bigscience/bloom")` and
/// `datasets--glue` becomes `(Dataset, "glue")`. Hub repo ids never contain
/// `--`, so every separator after the type prefix is a namespace boundary.
pub fn parse_repo_dir_name(name: &str) -> Result<(RepoType, String), RepoNameError> {
    let (prefix, rest) = name
        .split_once("--")
        .ok_or(RepoNameError::MissingSeparator)?;
    let repo_type = RepoType::from_plural(prefix)
        .ok_or_else(|| RepoNameError::UnknownRepoType(prefix.to_string()))?;
    Ok((repo_type, rest.replace("--", "/")))
}

/// Resolve a snapshot entry to the physical blob backing it.
///
/// Symlinked entries resolve to the blob they point at; a plain file (a cache
/// materialized by copy instead of symlink) resolves to itself. The resolved
/// path is what disk-usage accounting and deletion planning deduplicate on.
pub fn resolve_blob_path(file_path: &Path) -> io::Result<PathBuf> {
    fs::canonicalize(file_path)
}

/// Read every ref file under `refs/`, mapping ref name to commit hash.
///
/// Ref names may contain path separators (`pr/1`), so the walk is recursive
/// and the name is the `/`-joined path relative to `refs/`.
pub fn collect_refs(refs_dir: &Path) -> io::Result<BTreeMap<String, String>> {
    let mut refs = BTreeMap::new();
    for entry in WalkDir::new(refs_dir) {
        let entry = entry.map_err(io::Error::other)?;
        if entry.file_type().is_dir() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(refs_dir)
            .expect("walkdir entry is under its root");
        let ref_name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let commit_hash = fs::read_to_string(entry.path())?.trim().to_string();
        refs.insert(ref_name, commit_hash);
    }
    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_with_namespace() {
        let (repo_type, repo_id) = parse_repo_dir_name("models--bigscience--bloom").unwrap();
        assert_eq!(repo_type, RepoType::Model);
        assert_eq!(repo_id, "bigscience/bloom");
    }

    #[test]
    fn test_parse_without_namespace() {
        let (repo_type, repo_id) = parse_repo_dir_name("datasets--glue").unwrap();
        assert_eq!(repo_type, RepoType::Dataset);
        assert_eq!(repo_id, "glue");
    }

    #[test]
    fn test_parse_space() {
        let (repo_type, repo_id) = parse_repo_dir_name("spaces--org--demo").unwrap();
        assert_eq!(repo_type, RepoType::Space);
        assert_eq!(repo_id, "org/demo");
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        assert!(matches!(
            parse_repo_dir_name("weights--org--name"),
            Err(RepoNameError::UnknownRepoType(t)) if t == "weights"
        ));
    }

    #[test]
    fn test_parse_rejects_missing_separator() {
        assert!(matches!(
            parse_repo_dir_name("version.txt"),
            Err(RepoNameError::MissingSeparator)
        ));
    }

    #[test]
    fn test_repo_type_display() {
        assert_eq!(RepoType::Model.to_string(), "model");
        assert_eq!(RepoType::Dataset.to_string(), "dataset");
        assert_eq!(RepoType::Space.to_string(), "space");
    }

    #[test]
    fn test_collect_refs_nested() {
        let tmp = tempfile::tempdir().unwrap();
        let refs_dir = tmp.path().join("refs");
        fs::create_dir_all(refs_dir.join("pr")).unwrap();
        fs::write(refs_dir.join("main"), "aaaa\n").unwrap();
        fs::write(refs_dir.join("pr").join("1"), "bbbb").unwrap();

        let refs = collect_refs(&refs_dir).unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs["main"], "aaaa");
        assert_eq!(refs["pr/1"], "bbbb");
    }
}
