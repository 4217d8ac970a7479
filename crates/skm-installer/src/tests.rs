use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, Result};

use crate::{run_update, ReleaseFetcher, UpdateContext, UpdateStep};

static TEST_DIR_SEQ: AtomicU64 = AtomicU64::new(0);

fn test_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "skm-installer-{label}-{}-{}",
        std::process::id(),
        TEST_DIR_SEQ.fetch_add(1, Ordering::SeqCst)
    ));
    fs::create_dir_all(&dir).expect("must create test dir");
    dir
}

/// Writes the file tree a fresh release would unpack, without any network.
struct FakeReleaseFetcher;

impl ReleaseFetcher for FakeReleaseFetcher {
    fn fetch_release(&self, _version: &str, dest: &Path) -> Result<()> {
        write_file(&dest.join("sitekit"), "new-binary");
        write_file(&dest.join(".env"), "RELEASE_DEFAULT=1\n");
        write_file(&dest.join("content/docs/readme.md"), "new docs");
        write_file(&dest.join("content/admin/index.html"), "new admin");
        write_file(&dest.join("content/templates/base.html"), "new template");
        write_file(&dest.join("content/themes/default/theme.css"), "new default");
        Ok(())
    }
}

struct FailingFetcher;

impl ReleaseFetcher for FailingFetcher {
    fn fetch_release(&self, _version: &str, _dest: &Path) -> Result<()> {
        Err(anyhow!("connection refused"))
    }
}

/// Succeeds at fetching but sabotages the staging tree so the merge step
/// fails: `content/themes` arrives as a plain file.
struct BrokenThemesFetcher;

impl ReleaseFetcher for BrokenThemesFetcher {
    fn fetch_release(&self, _version: &str, dest: &Path) -> Result<()> {
        write_file(&dest.join("sitekit"), "new-binary");
        write_file(&dest.join("content/themes"), "not a directory");
        Ok(())
    }
}

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("must create parent");
    }
    fs::write(path, contents).expect("must write file");
}

fn seed_installation(root: &Path) {
    write_file(&root.join("sitekit"), "old-binary");
    write_file(&root.join(".env"), "DB_NAME=prod\n");
    write_file(&root.join("content/docs/old.md"), "old docs");
    write_file(&root.join("content/plugins/blog/blog"), "plugin binary");
    write_file(&root.join("content/plugins/blog/manifest.json"), "{}");
    write_file(&root.join("content/themes/default/theme.css"), "old default");
    write_file(&root.join("content/themes/custom/style.css"), "custom theme");
}

/// Relative path -> file contents for every file under `root`, ignoring
/// timestamps. Transient update directories must never appear in it.
fn tree_snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut snapshot = BTreeMap::new();
    collect_files(root, root, &mut snapshot);
    snapshot
}

fn collect_files(root: &Path, current: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
    for entry in fs::read_dir(current).expect("must read dir") {
        let entry = entry.expect("must read entry");
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out);
        } else {
            let rel = path.strip_prefix(root).expect("must relativize").to_path_buf();
            out.insert(rel, fs::read(&path).expect("must read file"));
        }
    }
}

#[test]
fn successful_update_preserves_state_and_cleans_up() {
    let root = test_dir("success");
    seed_installation(&root);

    let ctx = UpdateContext::new(&root, false);
    run_update(&ctx, "current", &FakeReleaseFetcher).expect("update must succeed");

    // Transient directories are gone.
    assert!(!root.join(".bk").exists());
    assert!(!root.join(".staging").exists());

    // Binary and default theme come from the new release.
    assert_eq!(fs::read_to_string(root.join("sitekit")).unwrap(), "new-binary");
    assert_eq!(
        fs::read_to_string(root.join("content/themes/default/theme.css")).unwrap(),
        "new default"
    );

    // Configuration, plugins, and non-default themes survive.
    assert_eq!(fs::read_to_string(root.join(".env")).unwrap(), "DB_NAME=prod\n");
    assert_eq!(
        fs::read_to_string(root.join("content/plugins/blog/blog")).unwrap(),
        "plugin binary"
    );
    assert_eq!(
        fs::read_to_string(root.join("content/themes/custom/style.css")).unwrap(),
        "custom theme"
    );

    // Promotion does not pre-delete, so unrelated files survive too.
    assert!(root.join("content/docs/old.md").exists());
    assert!(root.join("content/docs/readme.md").exists());
    assert!(root.join("content/admin/index.html").exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn failed_fetch_leaves_installation_untouched() {
    let root = test_dir("fetch-fail");
    seed_installation(&root);
    let before = tree_snapshot(&root);

    let ctx = UpdateContext::new(&root, false);
    let err = run_update(&ctx, "current", &FailingFetcher).expect_err("update must fail");
    assert!(err.to_string().contains(UpdateStep::Installing.as_str()));

    assert!(!root.join(".bk").exists());
    assert!(!root.join(".staging").exists());
    assert_eq!(tree_snapshot(&root), before);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn failed_merge_rolls_back() {
    let root = test_dir("merge-fail");
    seed_installation(&root);
    let before = tree_snapshot(&root);

    let ctx = UpdateContext::new(&root, false);
    let err = run_update(&ctx, "current", &BrokenThemesFetcher).expect_err("update must fail");
    assert!(err.to_string().contains(UpdateStep::Merging.as_str()));

    assert!(!root.join(".bk").exists());
    assert!(!root.join(".staging").exists());
    assert_eq!(tree_snapshot(&root), before);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn update_requires_an_installation() {
    let root = test_dir("not-install");

    let ctx = UpdateContext::new(&root, false);
    let err = run_update(&ctx, "current", &FakeReleaseFetcher)
        .expect_err("bare directory must be rejected");
    assert!(err.to_string().contains("active installation"));
    assert!(!root.join(".bk").exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn update_rejects_leftover_transient_dirs() {
    let root = test_dir("leftover");
    seed_installation(&root);
    fs::create_dir_all(root.join(".bk")).expect("must create leftover backup");

    let ctx = UpdateContext::new(&root, false);
    let err = run_update(&ctx, "current", &FakeReleaseFetcher)
        .expect_err("leftover backup dir must be rejected");
    assert!(err.to_string().contains("previous update"));

    let _ = fs::remove_dir_all(&root);
}
