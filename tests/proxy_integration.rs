//! Integration tests for the module proxy operations.
//!
//! Every test clones a fixture repository built with the git CLI, so these
//! exercise resolution, fetching, module discovery and archive building end
//! to end.

mod common;

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use common::{monorepo, proxy_for, zip_entries, zip_entry, SourceRepo, ROOT, SUB, SUB_V2_DATE, V1_DATE};
use modgate::proxy::{ErrorKind, Info, ZERO_TIME};

fn time(rfc3339: &str) -> Option<DateTime<Utc>> {
    Some(
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc),
    )
}

// =============================================================================
// Versions
// =============================================================================

#[tokio::test]
async fn monorepo_versions_are_namespaced() {
    let repo = monorepo();
    let cache = TempDir::new().unwrap();
    let proxy = proxy_for(&repo, cache.path());

    assert_eq!(proxy.versions(ROOT).await.unwrap(), vec!["v1.0.0"]);
    assert_eq!(proxy.versions(SUB).await.unwrap(), vec!["sub/v2.0.0"]);
}

#[tokio::test]
async fn versions_are_idempotent() {
    let repo = monorepo();
    let cache = TempDir::new().unwrap();
    let proxy = proxy_for(&repo, cache.path());

    let first = proxy.versions(ROOT).await.unwrap();
    let second = proxy.versions(ROOT).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn versions_are_sorted_by_precedence() {
    let repo = SourceRepo::new();
    repo.write("go.mod", "module example.com/r\n");
    repo.commit("initial");
    for tag in ["v1.10.0", "v1.2.0", "v1.2.0-pre", "not-a-version"] {
        repo.tag(tag, V1_DATE);
    }

    let cache = TempDir::new().unwrap();
    let proxy = proxy_for(&repo, cache.path());

    assert_eq!(
        proxy.versions(ROOT).await.unwrap(),
        vec!["v1.2.0-pre", "v1.2.0", "v1.10.0"]
    );
}

#[tokio::test]
async fn new_tags_are_seen_on_next_request() {
    let repo = monorepo();
    let cache = TempDir::new().unwrap();
    let proxy = proxy_for(&repo, cache.path());

    assert_eq!(proxy.versions(ROOT).await.unwrap(), vec!["v1.0.0"]);

    repo.write("main.go", "package r\n\nconst X = 1\n");
    repo.commit("second");
    repo.tag("v1.1.0", "2024-03-01T00:00:00Z");

    assert_eq!(proxy.versions(ROOT).await.unwrap(), vec!["v1.0.0", "v1.1.0"]);
    let latest = proxy.get_latest_version(ROOT).await.unwrap();
    assert_eq!(latest.version, "v1.1.0");
}

#[tokio::test]
async fn unknown_module_in_known_repo_is_not_found() {
    let repo = monorepo();
    let cache = TempDir::new().unwrap();
    let proxy = proxy_for(&repo, cache.path());

    let err = proxy.versions("example.com/r/nope").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// =============================================================================
// Info
// =============================================================================

#[tokio::test]
async fn info_round_trips() {
    let repo = monorepo();
    let cache = TempDir::new().unwrap();
    let proxy = proxy_for(&repo, cache.path());

    let info = proxy.get_info(ROOT, "v1.0.0").await.unwrap();
    assert_eq!(
        info,
        Info {
            version: "v1.0.0".to_string(),
            time: time(V1_DATE),
        }
    );

    let json = serde_json::to_string(&info).unwrap();
    let parsed: Info = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, info);
}

#[tokio::test]
async fn latest_is_highest_version() {
    let repo = monorepo();
    let cache = TempDir::new().unwrap();
    let proxy = proxy_for(&repo, cache.path());

    let latest = proxy.get_latest_version(SUB).await.unwrap();
    assert_eq!(latest.version, "sub/v2.0.0");
    assert_eq!(latest.time, time(SUB_V2_DATE));
}

#[tokio::test]
async fn latest_without_tags_is_not_found() {
    let repo = SourceRepo::new();
    repo.write("go.mod", "module example.com/r\n");
    repo.commit("initial");

    let cache = TempDir::new().unwrap();
    let proxy = proxy_for(&repo, cache.path());

    assert!(proxy.versions(ROOT).await.unwrap().is_empty());
    let err = proxy.get_latest_version(ROOT).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn lightweight_tags_use_commit_time() {
    let repo = SourceRepo::new();
    repo.write("go.mod", "module example.com/r\n");
    common::run_git(repo.path(), &["add", "-A"], None);
    common::run_git(
        repo.path(),
        &["commit", "-q", "-m", "initial"],
        Some("2023-06-07T08:09:10Z"),
    );
    common::run_git(repo.path(), &["tag", "v0.1.0"], None);

    let cache = TempDir::new().unwrap();
    let proxy = proxy_for(&repo, cache.path());

    let info = proxy.get_info(ROOT, "v0.1.0").await.unwrap();
    assert_eq!(info.time, time("2023-06-07T08:09:10Z"));
}

#[tokio::test]
async fn unreadable_tag_time_is_unknown() {
    let repo = SourceRepo::new();
    repo.write("go.mod", "module example.com/r\n");
    repo.commit("initial");
    repo.tag("v1.0.0", V1_DATE);
    let blob = repo.blob("not a commit\n");
    common::run_git(repo.path(), &["tag", "v1.1.0", &blob], None);

    let cache = TempDir::new().unwrap();
    let proxy = proxy_for(&repo, cache.path());

    assert_eq!(proxy.versions(ROOT).await.unwrap(), vec!["v1.0.0", "v1.1.0"]);

    let good = proxy.get_info(ROOT, "v1.0.0").await.unwrap();
    assert_eq!(good.time, time(V1_DATE));

    let bad = proxy.get_info(ROOT, "v1.1.0").await.unwrap();
    assert_eq!(bad.time, None);
    let json: serde_json::Value = serde_json::to_value(&bad).unwrap();
    assert_eq!(json["Time"], ZERO_TIME);
}

#[tokio::test]
async fn descriptors_that_are_not_utf8_are_skipped() {
    let repo = SourceRepo::new();
    repo.write("go.mod", "module example.com/r\n");
    let bad = repo.path().join("testdata/bad");
    std::fs::create_dir_all(&bad).unwrap();
    std::fs::write(bad.join("go.mod"), b"module \xff\xfe\n").unwrap();
    repo.commit("initial");
    repo.tag("v1.0.0", V1_DATE);

    let cache = TempDir::new().unwrap();
    let proxy = proxy_for(&repo, cache.path());

    assert_eq!(proxy.versions(ROOT).await.unwrap(), vec!["v1.0.0"]);
}

#[tokio::test]
async fn commit_references_are_unsupported() {
    let repo = monorepo();
    let cache = TempDir::new().unwrap();
    let proxy = proxy_for(&repo, cache.path());

    let hash = repo.head();
    let err = proxy.get_info(ROOT, &hash).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedVersion);

    let err = proxy.get_archive(ROOT, &hash[..12]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedVersion);

    let err = proxy
        .get_descriptor(ROOT, "v0.0.0-20240102150405-abcdefabcdef")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedVersion);
}

#[tokio::test]
async fn unknown_version_is_not_found() {
    let repo = monorepo();
    let cache = TempDir::new().unwrap();
    let proxy = proxy_for(&repo, cache.path());

    let err = proxy.get_info(ROOT, "v9.9.9").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // A version owned by another module of the same repository.
    let err = proxy.get_archive(ROOT, "sub/v2.0.0").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// =============================================================================
// Descriptor
// =============================================================================

#[tokio::test]
async fn descriptor_is_returned_as_tagged() {
    let repo = monorepo();
    let cache = TempDir::new().unwrap();
    let proxy = proxy_for(&repo, cache.path());

    repo.write("go.mod", "module example.com/r\n\ngo 1.22\n");
    repo.commit("bump go");

    let descriptor = proxy.get_descriptor(ROOT, "v1.0.0").await.unwrap();
    assert_eq!(descriptor, b"module example.com/r\n\ngo 1.21\n");

    let descriptor = proxy.get_descriptor(SUB, "sub/v2.0.0").await.unwrap();
    assert_eq!(descriptor, b"module example.com/r/sub\n\ngo 1.21\n");
}

// =============================================================================
// Archives
// =============================================================================

#[tokio::test]
async fn archive_excludes_nested_modules() {
    let repo = monorepo();
    let cache = TempDir::new().unwrap();
    let proxy = proxy_for(&repo, cache.path());

    let bytes = proxy.get_archive(ROOT, "v1.0.0").await.unwrap();
    assert_eq!(
        zip_entries(&bytes),
        vec![
            "example.com/r@v1.0.0/LICENSE",
            "example.com/r@v1.0.0/go.mod",
            "example.com/r@v1.0.0/lib/util.go",
            "example.com/r@v1.0.0/main.go",
        ]
    );
}

#[tokio::test]
async fn nested_archive_inherits_license() {
    let repo = monorepo();
    let cache = TempDir::new().unwrap();
    let proxy = proxy_for(&repo, cache.path());

    let bytes = proxy.get_archive(SUB, "sub/v2.0.0").await.unwrap();
    assert_eq!(
        zip_entries(&bytes),
        vec![
            "example.com/r/sub@sub/v2.0.0/LICENSE",
            "example.com/r/sub@sub/v2.0.0/go.mod",
            "example.com/r/sub@sub/v2.0.0/sub.go",
        ]
    );
    assert_eq!(
        zip_entry(&bytes, "example.com/r/sub@sub/v2.0.0/LICENSE"),
        "root license\n"
    );
}

#[tokio::test]
async fn own_license_wins() {
    let repo = SourceRepo::new();
    repo.write("go.mod", "module example.com/r\n");
    repo.write("LICENSE", "root license\n");
    repo.write("sub/go.mod", "module example.com/r/sub\n");
    repo.write("sub/LICENSE", "sub license\n");
    repo.commit("initial");
    repo.tag("sub/v1.0.0", V1_DATE);

    let cache = TempDir::new().unwrap();
    let proxy = proxy_for(&repo, cache.path());

    let bytes = proxy.get_archive(common::SUB, "sub/v1.0.0").await.unwrap();
    assert_eq!(
        zip_entry(&bytes, "example.com/r/sub@sub/v1.0.0/LICENSE"),
        "sub license\n"
    );
}

#[tokio::test]
async fn archive_reflects_the_tag_not_the_branch() {
    let repo = monorepo();
    let cache = TempDir::new().unwrap();
    let proxy = proxy_for(&repo, cache.path());

    repo.write("extra.go", "package r\n");
    repo.remove("lib/util.go");
    repo.commit("after release");

    let bytes = proxy.get_archive(ROOT, "v1.0.0").await.unwrap();
    let entries = zip_entries(&bytes);
    assert!(entries.contains(&"example.com/r@v1.0.0/lib/util.go".to_string()));
    assert!(!entries.contains(&"example.com/r@v1.0.0/extra.go".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_archives_do_not_mix() {
    let repo = monorepo();
    let cache = TempDir::new().unwrap();
    let proxy = proxy_for(&repo, cache.path());

    let expected_root = zip_entries(&proxy.get_archive(ROOT, "v1.0.0").await.unwrap());
    let expected_sub = zip_entries(&proxy.get_archive(SUB, "sub/v2.0.0").await.unwrap());

    let (a, b, c, d) = tokio::join!(
        proxy.get_archive(ROOT, "v1.0.0"),
        proxy.get_archive(SUB, "sub/v2.0.0"),
        proxy.get_archive(ROOT, "v1.0.0"),
        proxy.get_archive(SUB, "sub/v2.0.0"),
    );

    assert_eq!(zip_entries(&a.unwrap()), expected_root);
    assert_eq!(zip_entries(&b.unwrap()), expected_sub);
    assert_eq!(zip_entries(&c.unwrap()), expected_root);
    assert_eq!(zip_entries(&d.unwrap()), expected_sub);
}

// =============================================================================
// Cache
// =============================================================================

#[tokio::test]
async fn working_copy_lives_under_suffixed_root() {
    let repo = monorepo();
    let cache = TempDir::new().unwrap();
    let proxy = proxy_for(&repo, cache.path());

    proxy.versions(ROOT).await.unwrap();
    assert!(cache.path().join("example.com/r@git/.git").is_dir());
    assert!(cache.path().join(".locks").is_dir());
}

#[tokio::test]
async fn unreachable_remote_is_fetch_error() {
    let repo = monorepo();
    let cache = TempDir::new().unwrap();
    let proxy = proxy_for(&repo, cache.path());

    let missing = repo.path().to_path_buf();
    drop(repo);
    assert!(!missing.exists());

    let err = proxy.versions(ROOT).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Fetch);
}
