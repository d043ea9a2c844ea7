//! module::archive
//!
//! Module archives and descriptors at a tagged version.
//!
//! # Layout
//!
//! An archive for `example.com/r/sub` at `sub/v1.0.0` holds every file of the
//! module's directory under the prefix `example.com/r/sub@sub/v1.0.0/`, with
//! `/` separators and deflate compression.
//!
//! # Exclusion
//!
//! Files inside the directory of any other module nested below the target
//! belong to that module and are left out, as are VCS metadata directories
//! and symlinks. Nested modules are taken from the tree discovered on the
//! default branch and from the tree at the requested tag.
//!
//! # LICENSE inheritance
//!
//! A module without its own `LICENSE` inherits the nearest one from an
//! ancestor directory, up to and including the repository root.
//!
//! # Invariants
//!
//! - The working copy is checked out at the requested tag for the whole
//!   build; callers hold the root's lock through [`WorkingCopy`]
//! - Commit references are rejected before anything touches the tree

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::tree::{Module, ModuleTree, TreeError};
use super::walk::{walk_files, WalkEntry};
use crate::cache::WorkingCopy;
use crate::core::version;
use crate::git::GitError;

/// Name of the license file inherited from ancestors.
pub const LICENSE_FILE: &str = "LICENSE";

/// Errors from archive and descriptor retrieval.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Module or version does not exist.
    #[error("{module}@{version} not found")]
    NotFound { module: String, version: String },

    /// Version names a commit rather than a tag.
    #[error("{module}@{version}: commit references are not supported")]
    Unsupported { module: String, version: String },

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Find the module and check `version` is one of its tags.
pub fn locate<'a>(
    tree: &'a ModuleTree,
    module_path: &str,
    version: &str,
) -> Result<&'a Module, ArchiveError> {
    let not_found = || ArchiveError::NotFound {
        module: module_path.to_string(),
        version: version.to_string(),
    };

    let module = tree.module(module_path).ok_or_else(not_found)?;
    if module.version(version).is_some() {
        return Ok(module);
    }

    if version::is_commit_reference(version) {
        return Err(ArchiveError::Unsupported {
            module: module_path.to_string(),
            version: version.to_string(),
        });
    }

    Err(not_found())
}

/// Raw `go.mod` contents of a module at a tag.
pub fn read_descriptor(
    working_copy: &WorkingCopy,
    tree: &ModuleTree,
    module_path: &str,
    version: &str,
) -> Result<Vec<u8>, ArchiveError> {
    let module = locate(tree, module_path, version)?;
    working_copy.checkout_tag(version)?;

    match fs::read(&module.descriptor) {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ArchiveError::NotFound {
            module: module_path.to_string(),
            version: version.to_string(),
        }),
        Err(e) => Err(ArchiveError::Io {
            path: module.descriptor.clone(),
            source: e,
        }),
    }
}

/// Zip archive of a module at a tag.
pub fn build_archive(
    working_copy: &WorkingCopy,
    tree: &ModuleTree,
    module_path: &str,
    version: &str,
) -> Result<Vec<u8>, ArchiveError> {
    let module = locate(tree, module_path, version)?;
    working_copy.checkout_tag(version)?;

    if !module.dir.is_dir() {
        return Err(ArchiveError::NotFound {
            module: module_path.to_string(),
            version: version.to_string(),
        });
    }

    let tagged = ModuleTree::discover(tree.root(), tree.dir())?;
    let excluded: BTreeSet<PathBuf> = tree
        .modules()
        .iter()
        .chain(tagged.modules())
        .map(|other| other.dir.clone())
        .filter(|dir| dir != &module.dir && dir.starts_with(&module.dir))
        .collect();

    let prefix = format!("{}@{}", module_path, version);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let mut has_license = false;
    let mut files = 0usize;

    let skip = |dir: &Path| excluded.contains(dir);
    walk_files(&module.dir, &skip, &mut |entry: &WalkEntry| {
        let relative = slash_path(&entry.relative);
        if relative == LICENSE_FILE {
            has_license = true;
        }

        zip.start_file(format!("{}/{}", prefix, relative), options)
            .map_err(io::Error::other)?;
        let mut file = File::open(&entry.path)?;
        io::copy(&mut file, &mut zip)?;
        files += 1;
        Ok(())
    })
    .map_err(|(path, source)| ArchiveError::Io { path, source })?;

    if !has_license {
        if let Some(license) = inherited_license(&module.dir, tree.dir()) {
            tracing::debug!(module = module_path, license = %license.display(), "inheriting license");
            zip.start_file(format!("{}/{}", prefix, LICENSE_FILE), options)?;
            let mut file = File::open(&license).map_err(|e| ArchiveError::Io {
                path: license.clone(),
                source: e,
            })?;
            io::copy(&mut file, &mut zip).map_err(|e| ArchiveError::Io {
                path: license.clone(),
                source: e,
            })?;
        }
    }

    let bytes = zip.finish()?.into_inner();
    tracing::debug!(
        module = module_path,
        version,
        files,
        excluded = excluded.len(),
        size = bytes.len(),
        "built archive"
    );
    Ok(bytes)
}

/// Nearest `LICENSE` above `module_dir`, stopping at `repo_dir`.
fn inherited_license(module_dir: &Path, repo_dir: &Path) -> Option<PathBuf> {
    if !module_dir.starts_with(repo_dir) {
        return None;
    }

    module_dir
        .ancestors()
        .skip(1)
        .take_while(|dir| dir.starts_with(repo_dir))
        .map(|dir| dir.join(LICENSE_FILE))
        .find(|candidate| {
            fs::symlink_metadata(candidate)
                .map(|meta| meta.is_file())
                .unwrap_or(false)
        })
}

/// Render a relative path with `/` separators.
fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
