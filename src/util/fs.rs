//! Filesystem helpers for segment discovery and run directories.
//!
//! A relation larger than 1 GiB continues in numbered files: `24576`,
//! `24576.1`, `24576.2`, ... [`segment_paths`] enumerates the existing
//! ones in order. Run directories under `restore/` are recreated from
//! scratch at the start of every drop-scan.

use std::path::{Path, PathBuf};

use crate::PguError;

/// Enumerate the base segment file and its numeric continuations.
///
/// Stops at the first missing suffix; segments past a hole can never be
/// addressed by block number.
pub fn segment_paths(base: &Path) -> Result<Vec<PathBuf>, PguError> {
    if !base.is_file() {
        return Err(PguError::Io(format!(
            "Cannot open {}: no such file",
            base.display()
        )));
    }
    let mut paths = vec![base.to_path_buf()];
    for n in 1u32.. {
        let next = PathBuf::from(format!("{}.{}", base.display(), n));
        if !next.is_file() {
            break;
        }
        paths.push(next);
    }
    Ok(paths)
}

/// Remove and recreate a directory (fresh run semantics).
pub fn clean_dir(path: &Path) -> Result<(), PguError> {
    if path.exists() {
        std::fs::remove_dir_all(path)
            .map_err(|e| PguError::Io(format!("Cannot clear {}: {}", path.display(), e)))?;
    }
    std::fs::create_dir_all(path)
        .map_err(|e| PguError::Io(format!("Cannot create {}: {}", path.display(), e)))
}

/// Create a directory if it does not exist yet.
pub fn ensure_dir(path: &Path) -> Result<(), PguError> {
    std::fs::create_dir_all(path)
        .map_err(|e| PguError::Io(format!("Cannot create {}: {}", path.display(), e)))
}

/// Follow a symlink to its target, as tablespace directories are linked
/// from `pg_tblspc/`. Plain paths come back unchanged.
pub fn resolve_symlink(path: &Path) -> PathBuf {
    if path.is_symlink() {
        // canonicalize handles relative link targets correctly
        std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_segment_paths_single() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("24576");
        fs::write(&base, b"x").unwrap();
        let paths = segment_paths(&base).unwrap();
        assert_eq!(paths.len(), 1);
    }

    #[test]
    fn test_segment_paths_continuations() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("24576");
        fs::write(&base, b"x").unwrap();
        fs::write(dir.path().join("24576.1"), b"x").unwrap();
        fs::write(dir.path().join("24576.2"), b"x").unwrap();
        // A hole: .4 exists but .3 does not, so enumeration stops at .2
        fs::write(dir.path().join("24576.4"), b"x").unwrap();

        let paths = segment_paths(&base).unwrap();
        assert_eq!(paths.len(), 3);
        assert!(paths[2].ends_with("24576.2"));
    }

    #[test]
    fn test_segment_paths_missing_base() {
        let dir = TempDir::new().unwrap();
        assert!(segment_paths(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_clean_dir() {
        let dir = TempDir::new().unwrap();
        let run = dir.path().join("restore");
        fs::create_dir_all(run.join("old")).unwrap();
        fs::write(run.join("old/file"), b"stale").unwrap();

        clean_dir(&run).unwrap();
        assert!(run.exists());
        assert!(!run.join("old").exists());
    }

    #[test]
    #[cfg(unix)]
    fn test_resolve_symlink() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("tblspc_real");
        fs::create_dir(&target).unwrap();
        let link = dir.path().join("16400");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert_eq!(resolve_symlink(&link), target.canonicalize().unwrap());
        assert_eq!(resolve_symlink(&target), target);
    }
}
