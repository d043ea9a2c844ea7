//! module::walk
//!
//! Sorted, symlink-free directory traversal shared by discovery and archiving.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Version control metadata directories, never descended into.
pub const VCS_DIRS: [&str; 4] = [".git", ".hg", ".svn", ".bzr"];

/// A regular file found by [`walk_files`].
#[derive(Debug, Clone)]
pub struct WalkEntry {
    /// Absolute path
    pub path: PathBuf,
    /// Path relative to the walk's base directory
    pub relative: PathBuf,
}

/// Visit every regular file below `base` in sorted order.
///
/// VCS metadata directories and any directory for which `skip_dir` returns
/// true are pruned. Symlinks are skipped, files and directories alike.
///
/// Errors carry the path they occurred on.
pub fn walk_files(
    base: &Path,
    skip_dir: &dyn Fn(&Path) -> bool,
    visit: &mut dyn FnMut(&WalkEntry) -> io::Result<()>,
) -> Result<(), (PathBuf, io::Error)> {
    walk_dir(base, base, skip_dir, visit)
}

fn walk_dir(
    base: &Path,
    dir: &Path,
    skip_dir: &dyn Fn(&Path) -> bool,
    visit: &mut dyn FnMut(&WalkEntry) -> io::Result<()>,
) -> Result<(), (PathBuf, io::Error)> {
    let with_path = |path: &Path| {
        let path = path.to_path_buf();
        move |e: io::Error| (path, e)
    };

    let mut entries = fs::read_dir(dir)
        .map_err(with_path(dir))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(with_path(dir))?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type().map_err(with_path(&path))?;

        if file_type.is_symlink() {
            continue;
        }

        if file_type.is_dir() {
            let name = entry.file_name();
            if VCS_DIRS.iter().any(|vcs| name == *vcs) || skip_dir(&path) {
                continue;
            }
            walk_dir(base, &path, skip_dir, visit)?;
        } else if file_type.is_file() {
            let relative = path.strip_prefix(base).unwrap_or(&path).to_path_buf();
            let walk_entry = WalkEntry {
                path: path.clone(),
                relative,
            };
            visit(&walk_entry).map_err(with_path(&path))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn visit_all(base: &Path, skip: &dyn Fn(&Path) -> bool) -> Vec<String> {
        let mut seen = Vec::new();
        walk_files(base, skip, &mut |entry: &WalkEntry| {
            seen.push(entry.relative.to_string_lossy().replace('\\', "/"));
            Ok(())
        })
        .unwrap();
        seen
    }

    #[test]
    fn visits_in_sorted_order() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("c.txt"), "c").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("b/inner.txt"), "i").unwrap();

        assert_eq!(
            visit_all(dir.path(), &|_: &Path| false),
            vec!["a.txt", "b/inner.txt", "c.txt"]
        );
    }

    #[test]
    fn prunes_vcs_and_skipped_dirs() {
        let dir = TempDir::new().unwrap();
        for sub in [".git", ".svn", "skip", "keep"] {
            fs::create_dir_all(dir.path().join(sub)).unwrap();
            fs::write(dir.path().join(sub).join("f"), "x").unwrap();
        }

        let skipped = dir.path().join("skip");
        assert_eq!(
            visit_all(dir.path(), &|p: &Path| p == skipped.as_path()),
            vec!["keep/f"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn skips_symlinks() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("real"), "x").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();

        assert_eq!(visit_all(dir.path(), &|_: &Path| false), vec!["real"]);
    }
}
