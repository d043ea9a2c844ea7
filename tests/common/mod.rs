//! Shared fixtures for integration tests.
//!
//! Source repositories are built with the `git` CLI in temp directories and
//! served to the proxy through a repository pin pointing at their local path.

#![allow(dead_code)]

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use regex::Regex;
use tempfile::TempDir;

use modgate::cache::resolver::StaticResolver;
use modgate::cache::RepositoryCache;
use modgate::core::config::RepositoryPin;
use modgate::core::paths::CachePaths;
use modgate::git::FetchSettings;
use modgate::proxy::ModuleProxy;

/// Root import path of the fixture repositories.
pub const ROOT: &str = "example.com/r";

/// Nested module of [`monorepo`].
pub const SUB: &str = "example.com/r/sub";

/// Tag date of `v1.0.0` in [`monorepo`].
pub const V1_DATE: &str = "2024-01-02T15:04:05Z";

/// Tag date of `sub/v2.0.0` in [`monorepo`].
pub const SUB_V2_DATE: &str = "2024-02-03T10:00:00Z";

/// A git repository the proxy clones from.
pub struct SourceRepo {
    dir: TempDir,
}

impl SourceRepo {
    /// Create an empty repository on `main`.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");

        run_git(dir.path(), &["init"], None);
        run_git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/main"], None);
        run_git(dir.path(), &["config", "user.email", "test@example.com"], None);
        run_git(dir.path(), &["config", "user.name", "Test User"], None);
        run_git(dir.path(), &["config", "commit.gpgsign", "false"], None);
        run_git(dir.path(), &["config", "tag.gpgsign", "false"], None);

        Self { dir }
    }

    /// Path of the repository.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// URL the proxy clones from.
    pub fn url(&self) -> String {
        self.path().display().to_string()
    }

    /// Write a file, creating parent directories.
    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    /// Remove a tracked file.
    pub fn remove(&self, relative: &str) {
        run_git(self.path(), &["rm", "-q", relative], None);
    }

    /// Stage everything and commit.
    pub fn commit(&self, message: &str) {
        run_git(self.path(), &["add", "-A"], None);
        run_git(self.path(), &["commit", "-q", "-m", message], None);
    }

    /// Create an annotated tag dated `date`.
    pub fn tag(&self, name: &str, date: &str) {
        run_git(self.path(), &["tag", "-a", name, "-m", name], Some(date));
    }

    /// Full hash of HEAD.
    pub fn head(&self) -> String {
        git_stdout(self.path(), &["rev-parse", "HEAD"])
    }

    /// Store `contents` as a loose blob, returning its hash.
    pub fn blob(&self, contents: &str) -> String {
        let file = self.path().join(".git/blob-source");
        std::fs::write(&file, contents).unwrap();
        git_stdout(self.path(), &["hash-object", "-w", &file.display().to_string()])
    }
}

/// A repository holding two modules:
///
/// ```text
/// go.mod        module example.com/r        (v1.0.0)
/// LICENSE
/// main.go
/// lib/util.go
/// sub/go.mod    module example.com/r/sub    (sub/v2.0.0)
/// sub/sub.go
/// ```
pub fn monorepo() -> SourceRepo {
    let repo = SourceRepo::new();
    repo.write("go.mod", "module example.com/r\n\ngo 1.21\n");
    repo.write("LICENSE", "root license\n");
    repo.write("main.go", "package r\n");
    repo.write("lib/util.go", "package lib\n");
    repo.write("sub/go.mod", "module example.com/r/sub\n\ngo 1.21\n");
    repo.write("sub/sub.go", "package sub\n");
    repo.commit("initial");
    repo.tag("v1.0.0", V1_DATE);
    repo.tag("sub/v2.0.0", SUB_V2_DATE);
    repo
}

/// Pin serving [`ROOT`] from `repo`.
pub fn pin(repo: &SourceRepo) -> RepositoryPin {
    RepositoryPin {
        prefix: ROOT.to_string(),
        url: repo.url(),
    }
}

/// Proxy serving `example.com/...` from `repo`, caching under `cache`.
pub fn proxy_for(repo: &SourceRepo, cache: &Path) -> ModuleProxy {
    let resolver = StaticResolver::new(vec![pin(repo)]);
    let cache = RepositoryCache::new(
        CachePaths::new(cache),
        Arc::new(resolver),
        FetchSettings::default(),
    );
    let patterns = vec![Regex::new(r"^example\.com/").unwrap()];
    ModuleProxy::new(cache, patterns)
}

/// Paths of every entry in a zip archive, sorted.
pub fn zip_entries(bytes: &[u8]) -> Vec<String> {
    let archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).expect("valid zip");
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    names
}

/// Contents of one archive entry.
pub fn zip_entry(bytes: &[u8], name: &str) -> String {
    use std::io::Read;

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).expect("valid zip");
    let mut file = archive.by_name(name).expect("entry present");
    let mut contents = String::new();
    file.read_to_string(&mut contents).unwrap();
    contents
}

/// Run a git command, with committer and author dates pinned when given.
pub fn run_git(dir: &Path, args: &[&str], date: Option<&str>) {
    let mut command = Command::new("git");
    command.args(args).current_dir(dir);
    if let Some(date) = date {
        command
            .env("GIT_COMMITTER_DATE", date)
            .env("GIT_AUTHOR_DATE", date);
    }

    let output = command.output().expect("git command failed");
    if !output.status.success() {
        panic!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

/// Run a git command and return its trimmed stdout.
pub fn git_stdout(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git command failed");
    assert!(output.status.success(), "git {:?} failed", args);
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}
