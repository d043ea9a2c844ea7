//! module::tree
//!
//! Module discovery and version resolution for one working copy.
//!
//! # Discovery
//!
//! Every `go.mod` under the working copy defines a module. The walk is sorted
//! so the result is deterministic, skips VCS metadata directories and never
//! follows symlinks. Descriptors that do not name exactly one module path are
//! skipped with a warning, and when two descriptors name the same path the
//! first in walk order wins.
//!
//! # Version resolution
//!
//! A module's versions are the tags in its namespace: the module
//! `example.com/r/pkg/api` in the repository rooted at `example.com/r` owns the
//! tags `pkg/api/<version>`. When a module has no namespaced tags it falls
//! back to every valid un-namespaced version tag in the repository.
//!
//! In a monorepo whose nested modules are tagged without namespaces, each of
//! those modules therefore reports the root's bare tags as its own.
//!
//! # Example
//!
//! ```ignore
//! use modgate::module::ModuleTree;
//!
//! let tree = ModuleTree::load(&working_copy)?;
//! for module in tree.modules() {
//!     println!("{}: {} versions", module.path, module.versions.len());
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::descriptor::{parse_module_path, DESCRIPTOR_FILE};
use super::walk::{walk_files, WalkEntry};
use crate::cache::WorkingCopy;
use crate::core::types::relative_import_path;
use crate::core::version;
use crate::git::{Git, GitError};

/// Errors from module discovery.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("failed to scan {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Git(#[from] GitError),
}

/// A version tag and when it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleVersion {
    /// Raw tag name, including any namespace
    pub version: String,
    /// Tagger time for annotated tags, author time otherwise; `None` if
    /// unknown
    pub time: Option<DateTime<Utc>>,
}

impl ModuleVersion {
    pub fn new(version: impl Into<String>, time: Option<DateTime<Utc>>) -> Self {
        Self {
            version: version.into(),
            time,
        }
    }
}

/// A module found in a working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// Import path declared by the descriptor
    pub path: String,
    /// Path of the `go.mod` file
    pub descriptor: PathBuf,
    /// Directory holding the descriptor
    pub dir: PathBuf,
    /// Versions in ascending order
    pub versions: Vec<ModuleVersion>,
}

impl Module {
    /// Look up a version by its exact tag.
    pub fn version(&self, version: &str) -> Option<&ModuleVersion> {
        self.versions.iter().find(|v| v.version == version)
    }

    /// Highest version, if the module has any.
    pub fn latest(&self) -> Option<&ModuleVersion> {
        self.versions.last()
    }
}

/// Every module in one repository.
#[derive(Debug, Clone)]
pub struct ModuleTree {
    root: String,
    dir: PathBuf,
    modules: Vec<Module>,
}

impl ModuleTree {
    /// Scan a working copy and resolve every module's versions.
    pub fn load(working_copy: &WorkingCopy) -> Result<Self, TreeError> {
        let mut tree = Self::discover(working_copy.root(), working_copy.dir())?;
        let tags = collect_tags(working_copy.git())?;
        tree.resolve_versions(&tags);
        Ok(tree)
    }

    /// Find every module under `dir`, the working copy of `root`.
    ///
    /// Versions are left empty; see [`ModuleTree::resolve_versions`].
    pub fn discover(root: &str, dir: &Path) -> Result<Self, TreeError> {
        let mut modules: Vec<Module> = Vec::new();

        walk_files(dir, &|_: &Path| false, &mut |entry: &WalkEntry| {
            if entry.path.file_name().and_then(|n| n.to_str()) != Some(DESCRIPTOR_FILE) {
                return Ok(());
            }

            let bytes = fs::read(&entry.path)?;
            let Ok(contents) = String::from_utf8(bytes) else {
                tracing::warn!(descriptor = %entry.path.display(), "skipping descriptor that is not UTF-8");
                return Ok(());
            };
            let path = match parse_module_path(&contents) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(descriptor = %entry.path.display(), error = %e, "skipping descriptor");
                    return Ok(());
                }
            };

            if modules.iter().any(|m| m.path == path) {
                tracing::warn!(
                    module = %path,
                    descriptor = %entry.path.display(),
                    "duplicate module path, keeping the first"
                );
                return Ok(());
            }

            let module_dir = entry.path.parent().unwrap_or(dir).to_path_buf();
            modules.push(Module {
                path,
                descriptor: entry.path.clone(),
                dir: module_dir,
                versions: Vec::new(),
            });
            Ok(())
        })
        .map_err(|(path, source)| TreeError::Io { path, source })?;

        tracing::debug!(root, modules = modules.len(), "discovered modules");

        Ok(Self {
            root: root.to_string(),
            dir: dir.to_path_buf(),
            modules,
        })
    }

    /// Assign `tags` to modules by namespace and sort each module's versions.
    pub fn resolve_versions(&mut self, tags: &[ModuleVersion]) {
        for module in &mut self.modules {
            let suffix = relative_import_path(&module.path, &self.root).unwrap_or("");

            let mut owned: Vec<ModuleVersion> = if suffix.is_empty() {
                Vec::new()
            } else {
                tags.iter()
                    .filter(|tag| match version::split_namespace(&tag.version) {
                        (Some(namespace), v) => namespace == suffix && version::is_valid(v),
                        (None, _) => false,
                    })
                    .cloned()
                    .collect()
            };

            if owned.is_empty() {
                owned = tags
                    .iter()
                    .filter(|tag| version::is_valid(&tag.version))
                    .cloned()
                    .collect();
            }

            owned.sort_by(|a, b| version::compare(&a.version, &b.version));
            module.versions = owned;
        }
    }

    /// Import path of the repository root.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Working copy directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Modules in discovery order.
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Look up a module by exact import path.
    pub fn module(&self, path: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.path == path)
    }

    /// Directories of the other modules nested below `module`.
    pub fn nested_module_dirs(&self, module: &Module) -> Vec<&Path> {
        self.modules
            .iter()
            .filter(|other| other.path != module.path)
            .filter(|other| other.dir != module.dir && other.dir.starts_with(&module.dir))
            .map(|other| other.dir.as_path())
            .collect()
    }
}

/// Every version tag in the repository with its timestamp.
///
/// A tag whose timestamp cannot be read is kept with an unknown time.
pub fn collect_tags(git: &Git) -> Result<Vec<ModuleVersion>, GitError> {
    let tags = git
        .tag_names()?
        .into_iter()
        .filter(|tag| version::is_version_tag(tag))
        .map(|tag| {
            let time = match git.tag_time(&tag) {
                Ok(time) => Some(time),
                Err(e) => {
                    tracing::warn!(tag = %tag, error = %e, "failed to read tag time");
                    None
                }
            };
            ModuleVersion::new(tag, time)
        })
        .collect();

    Ok(tags)
}
