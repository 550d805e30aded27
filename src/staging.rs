//! Staging-directory plumbing shared by every stage.
//!
//! Stages hand files to each other through directories, so the only
//! primitives needed are "copy into", "move into", "write new file into",
//! "reset" and "list". None of them ever overwrites an existing file:
//! collisions get a numeric suffix instead.

use crate::error::SiftError;
use std::ffi::OsStr;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Copy `src` into `dst_dir`, keeping its name when free.
///
/// Collisions become `stem (1).ext`, `stem (2).ext`, …
pub fn safe_copy(src: &Path, dst_dir: &Path) -> Result<PathBuf, SiftError> {
    fs::create_dir_all(dst_dir).map_err(|e| SiftError::io(dst_dir, e))?;
    let dst = free_name(dst_dir, file_name(src)?, |stem, n| format!("{stem} ({n})"));
    fs::copy(src, &dst).map_err(|e| SiftError::io(src, e))?;
    debug!("Copied {} → {}", src.display(), dst.display());
    Ok(dst)
}

/// Move `src` into `dst_dir`, keeping its name when free.
///
/// Collisions become `stem_1.ext`, `stem_2.ext`, … A rename that fails
/// (typically across filesystems) falls back to copy + remove.
pub fn safe_move(src: &Path, dst_dir: &Path) -> Result<PathBuf, SiftError> {
    fs::create_dir_all(dst_dir).map_err(|e| SiftError::io(dst_dir, e))?;
    let dst = free_name(dst_dir, file_name(src)?, |stem, n| format!("{stem}_{n}"));
    if let Err(rename_err) = fs::rename(src, &dst) {
        if rename_err.kind() == ErrorKind::NotFound {
            return Err(SiftError::io(src, rename_err));
        }
        debug!(
            "rename {} failed ({}), falling back to copy",
            src.display(),
            rename_err
        );
        fs::copy(src, &dst).map_err(|e| SiftError::io(src, e))?;
        fs::remove_file(src).map_err(|e| SiftError::io(src, e))?;
    }
    debug!("Moved {} → {}", src.display(), dst.display());
    Ok(dst)
}

/// Write `contents` to a new file named `file_name` in `dir`, never
/// overwriting an existing one.
pub fn write_unique(dir: &Path, file_name: &str, contents: &str) -> Result<PathBuf, SiftError> {
    fs::create_dir_all(dir).map_err(|e| SiftError::io(dir, e))?;
    let dst = free_name(dir, OsStr::new(file_name), |stem, n| format!("{stem}_{n}"));
    fs::write(&dst, contents).map_err(|e| SiftError::io(&dst, e))?;
    Ok(dst)
}

/// Remove `dir` recursively if present, then recreate it empty.
pub fn reset_dir(dir: &Path) -> Result<(), SiftError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(SiftError::io(dir, e)),
    }
    fs::create_dir_all(dir).map_err(|e| SiftError::io(dir, e))
}

/// Regular files directly inside `dir`, sorted by path.
///
/// A missing directory is treated as empty.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>, SiftError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(SiftError::io(dir, e)),
    };
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| SiftError::io(dir, e))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Like [`list_files`], restricted to one extension (case-insensitive, no dot).
pub fn list_files_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, SiftError> {
    Ok(list_files(dir)?
        .into_iter()
        .filter(|p| lowercase_extension(p).as_deref() == Some(ext))
        .collect())
}

/// Lower-cased extension of `path`, without the dot.
pub fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Remove every directory in `dirs`, logging (not failing) on errors.
///
/// Returns the number of directories actually removed.
pub fn cleanup(dirs: &[PathBuf]) -> usize {
    let mut removed = 0;
    for dir in dirs {
        match fs::remove_dir_all(dir) {
            Ok(()) => {
                debug!("Removed {}", dir.display());
                removed += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", dir.display(), e),
        }
    }
    removed
}

fn file_name(path: &Path) -> Result<&OsStr, SiftError> {
    path.file_name().ok_or_else(|| {
        SiftError::io(
            path,
            std::io::Error::new(ErrorKind::InvalidInput, "path has no file name"),
        )
    })
}

/// First non-existing path in `dir` for `name`, suffixing the stem via `suffix`.
fn free_name(dir: &Path, name: &OsStr, suffix: impl Fn(&str, usize) -> String) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let as_path = Path::new(name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (1..)
        .map(|n| dir.join(format!("{}{}", suffix(&stem, n), ext)))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, body: &str) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, body).unwrap();
        p
    }

    #[test]
    fn copy_keeps_original_and_suffixes_collisions() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let src = touch(src_dir.path(), "scan.png", "a");

        let first = safe_copy(&src, dst_dir.path()).unwrap();
        let second = safe_copy(&src, dst_dir.path()).unwrap();
        let third = safe_copy(&src, dst_dir.path()).unwrap();

        assert!(src.exists(), "copy must not remove the source");
        assert_eq!(first.file_name().unwrap(), "scan.png");
        assert_eq!(second.file_name().unwrap(), "scan (1).png");
        assert_eq!(third.file_name().unwrap(), "scan (2).png");
    }

    #[test]
    fn move_transfers_and_suffixes_collisions() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        touch(dst_dir.path(), "page.png", "existing");
        let src = touch(src_dir.path(), "page.png", "new");

        let moved = safe_move(&src, dst_dir.path()).unwrap();

        assert!(!src.exists());
        assert_eq!(moved.file_name().unwrap(), "page_1.png");
        assert_eq!(fs::read_to_string(&moved).unwrap(), "new");
        assert_eq!(
            fs::read_to_string(dst_dir.path().join("page.png")).unwrap(),
            "existing"
        );
    }

    #[test]
    fn move_missing_source_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(safe_move(&dir.path().join("ghost.png"), &dir.path().join("out")).is_err());
    }

    #[test]
    fn write_unique_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let a = write_unique(dir.path(), "snippet.txt", "one").unwrap();
        let b = write_unique(dir.path(), "snippet.txt", "two").unwrap();
        assert_ne!(a, b);
        assert_eq!(fs::read_to_string(a).unwrap(), "one");
        assert_eq!(fs::read_to_string(b).unwrap(), "two");
    }

    #[test]
    fn reset_dir_empties_existing_content() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("in");
        fs::create_dir_all(target.join("nested")).unwrap();
        touch(&target, "old.png", "x");

        reset_dir(&target).unwrap();

        assert!(target.is_dir());
        assert!(list_files(&target).unwrap().is_empty());
        assert!(!target.join("nested").exists());
    }

    #[test]
    fn list_files_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "b.TXT", "");
        touch(dir.path(), "a.txt", "");
        touch(dir.path(), "c.png", "");
        fs::create_dir(dir.path().join("sub.txt")).unwrap();

        let all = list_files(dir.path()).unwrap();
        assert_eq!(all.len(), 3);

        let txt = list_files_with_extension(dir.path(), "txt").unwrap();
        let names: Vec<_> = txt.iter().map(|p| p.file_name().unwrap()).collect();
        assert_eq!(names, vec!["a.txt", "b.TXT"]);
    }

    #[test]
    fn list_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(list_files(&dir.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn cleanup_counts_removed_dirs() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        fs::create_dir(&a).unwrap();
        let removed = cleanup(&[a.clone(), dir.path().join("missing")]);
        assert_eq!(removed, 1);
        assert!(!a.exists());
    }
}
