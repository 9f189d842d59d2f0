mod support;

use site_sync::mirror::cursor::{CursorStore, CURSOR_FILE};
use site_sync::mirror::SourceMirror;
use site_sync::utils::Limiter;
use site_sync::SyncError;
use std::fs;
use std::sync::Arc;
use support::{deleted, file, folder, ScriptedSource};
use tempfile::TempDir;

fn mirror(source: &Arc<ScriptedSource>) -> SourceMirror {
    SourceMirror::new(source.clone(), "/site", Limiter::new(4))
}

fn scripted_site() -> Arc<ScriptedSource> {
    let source = ScriptedSource::new();
    source.page(
        None,
        vec![
            folder("/site"),
            file("/site/index.html"),
            folder("/Site/css"),
            file("/site/css/main.css"),
            folder("/site/images"),
        ],
        "c1",
        false,
    );
    source.page(Some("c1"), vec![], "c1", false);
    source.file("/site/index.html", "<h1>home</h1>");
    source.file("/site/css/main.css", "body { color: red }");
    source
}

#[tokio::test]
async fn full_listing_builds_tree_and_commits_cursor() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("staging");
    let source = scripted_site();

    let cursor = mirror(&source).sync(&dest).await.unwrap();

    assert_eq!(cursor, "c1");
    assert_eq!(fs::read_to_string(dest.join("index.html")).unwrap(), "<h1>home</h1>");
    assert_eq!(fs::read_to_string(dest.join("css/main.css")).unwrap(), "body { color: red }");
    assert!(dest.join("images").is_dir());
    assert_eq!(CursorStore::read(&dest).await.as_deref(), Some("c1"));
}

#[tokio::test]
async fn full_listing_discards_stale_local_files() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("staging");
    fs::create_dir_all(&dest).unwrap();
    fs::write(dest.join("leftover.html"), "old").unwrap();

    mirror(&scripted_site()).sync(&dest).await.unwrap();

    assert!(!dest.join("leftover.html").exists());
    assert!(dest.join("index.html").exists());
}

#[tokio::test]
async fn sync_without_changes_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("staging");
    let source = scripted_site();
    let mirror = mirror(&source);

    mirror.sync(&dest).await.unwrap();
    let fetches = source.fetch_calls().len();
    mirror.sync(&dest).await.unwrap();

    assert_eq!(source.list_calls(), vec![None, Some("c1".to_string())]);
    assert_eq!(source.fetch_calls().len(), fetches);
    assert_eq!(fs::read_to_string(dest.join("index.html")).unwrap(), "<h1>home</h1>");
    assert_eq!(CursorStore::read(&dest).await.as_deref(), Some("c1"));
}

#[tokio::test]
async fn delta_applies_deletes_and_new_files() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("staging");
    let source = scripted_site();
    let mirror = mirror(&source);
    mirror.sync(&dest).await.unwrap();

    source.page(
        Some("c1"),
        vec![
            deleted("/site/css"),
            file("/site/about.html"),
            file("/site/index.html"),
        ],
        "c2",
        false,
    );
    source.file("/site/about.html", "about");
    source.file("/site/index.html", "<h1>new home</h1>");

    let cursor = mirror.sync(&dest).await.unwrap();

    assert_eq!(cursor, "c2");
    assert!(!dest.join("css").exists());
    assert_eq!(fs::read_to_string(dest.join("about.html")).unwrap(), "about");
    assert_eq!(fs::read_to_string(dest.join("index.html")).unwrap(), "<h1>new home</h1>");
}

#[tokio::test]
async fn follows_pages_until_has_more_is_false() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("staging");
    let source = ScriptedSource::new();
    source.page(None, vec![file("/site/a.txt")], "p1", true);
    source.page(Some("p1"), vec![file("/site/b.txt")], "p2", true);
    source.page(Some("p2"), vec![deleted("/site/a.txt")], "p3", false);
    source.file("/site/a.txt", "a");
    source.file("/site/b.txt", "b");

    let cursor = mirror(&source).sync(&dest).await.unwrap();

    assert_eq!(cursor, "p3");
    assert_eq!(source.list_calls().len(), 3);
    assert!(!dest.join("a.txt").exists());
    assert_eq!(fs::read_to_string(dest.join("b.txt")).unwrap(), "b");
}

#[tokio::test]
async fn stale_cursor_retries_once_from_scratch() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("staging");
    CursorStore::write(&dest, "expired").await.unwrap();
    fs::write(dest.join("leftover.html"), "old").unwrap();

    let source = scripted_site();
    source.stale("expired");

    let cursor = mirror(&source).sync(&dest).await.unwrap();

    assert_eq!(cursor, "c1");
    assert_eq!(source.list_calls(), vec![Some("expired".to_string()), None]);
    assert!(!dest.join("leftover.html").exists());
    assert!(dest.join("index.html").exists());
}

#[tokio::test]
async fn second_failure_propagates_and_removes_cursor() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("staging");
    CursorStore::write(&dest, "expired").await.unwrap();

    let source = ScriptedSource::new();
    source.stale("expired");

    let result = mirror(&source).sync(&dest).await;

    assert!(matches!(result, Err(SyncError::RemoteApplication(_))));
    assert_eq!(source.list_calls().len(), 2);
    assert!(!dest.join(CURSOR_FILE).exists());
}

#[tokio::test]
async fn failed_download_removes_cursor() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("staging");
    let source = scripted_site();
    let mirror = mirror(&source);
    mirror.sync(&dest).await.unwrap();

    source.page(Some("c1"), vec![file("/site/missing.html")], "c2", false);

    assert!(mirror.sync(&dest).await.is_err());
    assert_eq!(CursorStore::read(&dest).await, None);

    // The next run starts from a full listing.
    mirror.sync(&dest).await.unwrap();
    assert_eq!(source.list_calls().last(), Some(&None));
}

#[tokio::test]
async fn delete_of_a_folder_cancels_earlier_entries_below_it() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("staging");
    let source = ScriptedSource::new();
    source.page(None, vec![folder("/site/a"), file("/site/a/x.md")], "p1", true);
    source.page(Some("p1"), vec![deleted("/site/a")], "p2", false);
    source.file("/site/a/x.md", "x");

    let cursor = mirror(&source).sync(&dest).await.unwrap();

    assert_eq!(cursor, "p2");
    assert!(!dest.join("a").exists());
    assert!(source.fetch_calls().is_empty());
}

#[tokio::test]
async fn folder_entry_in_delta_resets_existing_subtree() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("staging");
    let source = scripted_site();
    let mirror = mirror(&source);
    mirror.sync(&dest).await.unwrap();
    assert!(dest.join("css/main.css").exists());

    source.page(Some("c1"), vec![folder("/site/css")], "c2", false);

    let cursor = mirror.sync(&dest).await.unwrap();

    assert_eq!(cursor, "c2");
    assert!(dest.join("css").is_dir());
    assert_eq!(fs::read_dir(dest.join("css")).unwrap().count(), 0);
    assert!(dest.join("index.html").exists());
}

#[tokio::test]
async fn failure_on_a_later_page_retries_once_from_scratch() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("staging");
    CursorStore::write(&dest, "c0").await.unwrap();
    fs::write(dest.join("leftover.html"), "old").unwrap();

    let source = scripted_site();
    source.page(Some("c0"), vec![file("/site/partial.html")], "c0b", true);
    source.stale("c0b");

    let cursor = mirror(&source).sync(&dest).await.unwrap();

    assert_eq!(cursor, "c1");
    assert_eq!(
        source.list_calls(),
        vec![Some("c0".to_string()), Some("c0b".to_string()), None]
    );
    assert!(!dest.join("leftover.html").exists());
    assert!(!dest.join("partial.html").exists());
    assert!(dest.join("index.html").exists());
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn delta_matches_local_paths_without_regard_to_case() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("staging");
    let source = ScriptedSource::new();
    source.page(
        None,
        vec![
            file("/site/About.html"),
            folder("/site/Docs"),
            file("/site/Docs/guide.md"),
            folder("/site/Assets"),
            file("/site/Assets/logo.svg"),
        ],
        "c1",
        false,
    );
    source.file("/site/About.html", "about");
    source.file("/site/Docs/guide.md", "guide");
    source.file("/site/Assets/logo.svg", "<svg/>");
    let mirror = mirror(&source);
    mirror.sync(&dest).await.unwrap();

    source.page(
        Some("c1"),
        vec![
            deleted("/site/about.html"),
            file("/site/docs/GUIDE.md"),
            deleted("/site/ASSETS"),
        ],
        "c2",
        false,
    );
    source.file("/site/docs/GUIDE.md", "guide v2");

    mirror.sync(&dest).await.unwrap();

    let mut names: Vec<String> = fs::read_dir(&dest)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, vec![CURSOR_FILE.to_string(), "Docs".to_string()]);
    assert_eq!(fs::read_to_string(dest.join("Docs/guide.md")).unwrap(), "guide v2");
}
