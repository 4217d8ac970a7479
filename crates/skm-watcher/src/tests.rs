use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use notify::event::{CreateKind, DataChange, MetadataKind, ModifyKind, RemoveKind, RenameMode};
use notify::EventKind;

use skm_core::{compile_ignore_patterns, CancelToken};

use crate::{classify, EventClass, EventFilter, WatchContext, WatchPolicy};

static TEST_DIR_SEQ: AtomicU64 = AtomicU64::new(0);

fn test_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "skm-watcher-{label}-{}-{}",
        std::process::id(),
        TEST_DIR_SEQ.fetch_add(1, Ordering::SeqCst)
    ));
    fs::create_dir_all(&dir).expect("must create test dir");
    dir
}

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("must create parent");
    }
    fs::write(path, contents).expect("must write file");
}

fn filter(root: &Path, patterns: &[&str], window: Duration) -> EventFilter {
    let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
    let ignore = compile_ignore_patterns(&patterns).expect("patterns must compile");
    EventFilter::new(root, ignore, window)
}

#[test]
fn filter_drops_events_on_the_root_itself() {
    let root = PathBuf::from("/srv/site/src");
    let mut filter = filter(&root, &[], Duration::from_secs(2));
    let now = Instant::now();

    assert!(!filter.accept(&root, now));
    assert!(!filter.accept(&root.join("sub/.."), now));
    assert!(filter.accept(&root.join("main.go"), now));
}

#[test]
fn filter_applies_ignore_patterns_to_cleaned_paths() {
    let root = PathBuf::from("/srv/site/src");
    let mut filter = filter(&root, &["vendor", r"___\w*"], Duration::from_secs(2));
    let now = Instant::now();

    assert!(!filter.accept(&root.join("vendor/pkg/mod.go"), now));
    assert!(!filter.accept(&root.join("sub/./vendor/pkg/mod.go"), now));
    assert!(!filter.accept(&root.join("___jb_backup___"), now));
    assert!(filter.accept(&root.join("content/page.html"), now));
}

#[test]
fn filter_debounces_per_path() {
    let root = PathBuf::from("/srv/site/src");
    let mut filter = filter(&root, &[], Duration::from_secs(2));
    let start = Instant::now();

    let noisy = root.join("main.go");
    assert!(filter.accept(&noisy, start));
    assert!(!filter.accept(&noisy, start + Duration::from_millis(500)));
    assert!(!filter.accept(&noisy, start + Duration::from_millis(1999)));
    assert!(filter.accept(&noisy, start + Duration::from_secs(2)));

    // A different path has its own window.
    assert!(filter.accept(&root.join("other.go"), start + Duration::from_millis(10)));
}

#[test]
fn rejected_events_do_not_reset_the_window() {
    let root = PathBuf::from("/srv/site/src");
    let mut filter = filter(&root, &[], Duration::from_secs(2));
    let start = Instant::now();

    let path = root.join("main.go");
    assert!(filter.accept(&path, start));
    assert!(!filter.accept(&path, start + Duration::from_secs(1)));
    // Measured from the first acceptance, not the rejected attempt.
    assert!(filter.accept(&path, start + Duration::from_millis(2100)));
}

#[test]
fn classify_maps_notify_kinds() {
    assert_eq!(
        classify(&EventKind::Create(CreateKind::File)),
        Some(EventClass::Create)
    );
    assert_eq!(
        classify(&EventKind::Remove(RemoveKind::Any)),
        Some(EventClass::Remove)
    );
    assert_eq!(
        classify(&EventKind::Modify(ModifyKind::Name(RenameMode::Any))),
        Some(EventClass::Rename)
    );
    assert_eq!(
        classify(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions))),
        Some(EventClass::Chmod)
    );
    assert_eq!(
        classify(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
        Some(EventClass::Write)
    );
    assert_eq!(classify(&EventKind::Access(notify::event::AccessKind::Any)), None);
}

#[test]
fn carbon_copy_mirrors_writes_into_the_destination() {
    let src = test_dir("cc-write-src");
    let dst = test_dir("cc-write-dst");
    write_file(&src.join("content/page.html"), "hello");

    let mut ctx = WatchContext::new(
        &src,
        &[],
        WatchPolicy::CarbonCopy {
            destination: dst.clone(),
        },
        CancelToken::default(),
    )
    .expect("context must build");

    ctx.dispatch(EventClass::Write, &src.join("content/page.html"));
    assert_eq!(
        fs::read_to_string(dst.join("content/page.html")).unwrap(),
        "hello"
    );

    let _ = fs::remove_dir_all(&src);
    let _ = fs::remove_dir_all(&dst);
}

#[test]
fn carbon_copy_deletes_the_mirrored_path_on_remove() {
    let src = test_dir("cc-remove-src");
    let dst = test_dir("cc-remove-dst");
    write_file(&dst.join("content/page.html"), "stale");

    let mut ctx = WatchContext::new(
        &src,
        &[],
        WatchPolicy::CarbonCopy {
            destination: dst.clone(),
        },
        CancelToken::default(),
    )
    .expect("context must build");

    ctx.dispatch(EventClass::Remove, &src.join("content/page.html"));
    assert!(!dst.join("content/page.html").exists());

    // Removing an already-absent mirror path is not an error.
    ctx.dispatch(EventClass::Remove, &src.join("content/gone.html"));

    let _ = fs::remove_dir_all(&src);
    let _ = fs::remove_dir_all(&dst);
}

#[test]
fn carbon_copy_ignores_permission_changes() {
    let src = test_dir("cc-chmod-src");
    let dst = test_dir("cc-chmod-dst");
    write_file(&src.join("page.html"), "hello");

    let mut ctx = WatchContext::new(
        &src,
        &[],
        WatchPolicy::CarbonCopy {
            destination: dst.clone(),
        },
        CancelToken::default(),
    )
    .expect("context must build");

    ctx.dispatch(EventClass::Chmod, &src.join("page.html"));
    assert!(!dst.join("page.html").exists());

    let _ = fs::remove_dir_all(&src);
    let _ = fs::remove_dir_all(&dst);
}

#[test]
fn rebuild_hook_runs_for_every_class_except_chmod() {
    let src = test_dir("rebuild-src");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let mut ctx = WatchContext::new(
        &src,
        &[],
        WatchPolicy::Rebuild(Box::new(move |path| {
            sink.lock().unwrap().push(path.to_path_buf());
        })),
        CancelToken::default(),
    )
    .expect("context must build");

    let changed = src.join("main.go");
    ctx.dispatch(EventClass::Write, &changed);
    ctx.dispatch(EventClass::Create, &changed);
    ctx.dispatch(EventClass::Remove, &changed);
    ctx.dispatch(EventClass::Rename, &changed);
    ctx.dispatch(EventClass::Chmod, &changed);

    assert_eq!(seen.lock().unwrap().len(), 4);

    let _ = fs::remove_dir_all(&src);
}

#[test]
fn watch_picks_up_directories_created_after_start() {
    let src = test_dir("dynamic");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let cancel = CancelToken::default();

    let ctx = WatchContext::new(
        &src,
        &["skipped".to_string()],
        WatchPolicy::Rebuild(Box::new(move |path| {
            sink.lock().unwrap().push(path.to_path_buf());
        })),
        cancel.clone(),
    )
    .expect("context must build")
    .with_debounce_window(Duration::from_millis(10));

    let watch_thread = std::thread::spawn(move || ctx.watch());

    // Let the initial registration walk finish before mutating the tree.
    std::thread::sleep(Duration::from_millis(300));
    fs::create_dir(src.join("newdir")).expect("must create dir");
    fs::create_dir(src.join("skipped")).expect("must create ignored dir");
    std::thread::sleep(Duration::from_millis(300));
    write_file(&src.join("newdir/inner.txt"), "hello");
    write_file(&src.join("skipped/hidden.txt"), "nope");
    std::thread::sleep(Duration::from_millis(500));

    cancel.cancel();
    watch_thread
        .join()
        .expect("watch thread must not panic")
        .expect("watch must exit cleanly");

    let seen = seen.lock().unwrap();
    assert!(
        seen.iter().any(|path| path.ends_with("newdir/inner.txt")),
        "expected an event for the file inside the new directory, got {seen:?}"
    );
    assert!(
        !seen
            .iter()
            .any(|path| path.to_string_lossy().contains("hidden.txt")),
        "ignored directories must stay silent, got {seen:?}"
    );

    let _ = fs::remove_dir_all(&src);
}

#[test]
fn cancelled_watch_returns_promptly() {
    let src = test_dir("cancel");
    let cancel = CancelToken::default();
    cancel.cancel();

    let ctx = WatchContext::new(
        &src,
        &[],
        WatchPolicy::CarbonCopy {
            destination: src.join("mirror"),
        },
        cancel,
    )
    .expect("context must build")
    .with_debounce_window(Duration::from_millis(10));

    ctx.watch().expect("watch must exit cleanly");

    let _ = fs::remove_dir_all(&src);
}
