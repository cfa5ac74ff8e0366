//! Preparation of the scratch directory used for preprocessed files.
//!
//! The directory is not published through the process environment; callers
//! pass [`GlobalOptions::tempdir`](super::GlobalOptions::tempdir) on to the
//! command runner explicitly.

use crate::errors::{CmbsError, CmbsResult};
use std::fs;
use std::path::Path;
use tracing::info;
use walkdir::WalkDir;

/// Create `dir`, or remove the `*.nc` files in it when `clean` is set.
///
/// Returns the number of files removed. Removal is not transactional.
pub fn prepare_temp_dir(dir: &Path, clean: bool) -> CmbsResult<usize> {
    if !dir.exists() {
        info!(dir = %dir.display(), "Creating temporary output directory");
        fs::create_dir_all(dir)?;
        return Ok(0);
    }

    if !clean {
        info!(dir = %dir.display(), "Temporary output directory already existing");
        return Ok(0);
    }

    info!(dir = %dir.display(), "Cleaning output directory");
    let mut removed = 0;
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| CmbsError::Resource {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|e| e == "nc") {
            fs::remove_file(path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_missing_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("a").join("b");
        assert_eq!(prepare_temp_dir(&dir, true).unwrap(), 0);
        assert!(dir.is_dir());
    }

    #[test]
    fn cleans_only_netcdf_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.nc"), b"").unwrap();
        fs::write(dir.path().join("b.nc"), b"").unwrap();
        fs::write(dir.path().join("keep.txt"), b"").unwrap();
        fs::write(dir.path().join("keep.nc4"), b"").unwrap();

        assert_eq!(prepare_temp_dir(dir.path(), true).unwrap(), 2);
        assert!(!dir.path().join("a.nc").exists());
        assert!(dir.path().join("keep.txt").exists());
        assert!(dir.path().join("keep.nc4").exists());
    }

    #[test]
    fn subdirectories_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("nested.nc"), b"").unwrap();
        fs::create_dir(dir.path().join("dir.nc")).unwrap();
        fs::write(dir.path().join("top.nc"), b"").unwrap();

        assert_eq!(prepare_temp_dir(dir.path(), true).unwrap(), 1);
        assert!(dir.path().join("sub").join("nested.nc").exists());
        assert!(dir.path().join("dir.nc").is_dir());
    }

    #[test]
    fn keeps_files_without_clean_flag() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.nc"), b"").unwrap();
        assert_eq!(prepare_temp_dir(dir.path(), false).unwrap(), 0);
        assert!(dir.path().join("a.nc").exists());
    }
}
