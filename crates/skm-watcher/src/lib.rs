use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use regex::Regex;

use skm_core::{clean_path, compile_ignore_patterns, copy_path, CancelToken};

/// Default minimum gap between two accepted events for the same path.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_secs(2);

/// Wider window for rebuild-triggering watches, where a single save can
/// fan out into several raw events and a rebuild takes a while anyway.
pub const REBUILD_DEBOUNCE_WINDOW: Duration = Duration::from_secs(5);

/// How often the dispatch loop wakes to poll the cancellation token.
const RECV_TICK: Duration = Duration::from_millis(200);

/// The five event classes the detector dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    Write,
    Create,
    Remove,
    Rename,
    Chmod,
}

/// Closed set of handler policies, selected when the watch context is
/// built.
pub enum WatchPolicy {
    /// Mirror every change verbatim into a destination tree: writes and
    /// creates copy the changed path, removes and renames delete the
    /// mirrored path, permission changes are ignored.
    CarbonCopy { destination: PathBuf },
    /// Invoke the rebuild hook for every class except permission changes.
    Rebuild(Box<dyn FnMut(&Path) + Send>),
}

/// Pre-dispatch filter: drops events on the watch root itself, events on
/// ignored paths, and events inside the per-path debounce window.
///
/// Only the single dispatch loop mutates the debounce map; if dispatch is
/// ever parallelized this map must become synchronized.
pub struct EventFilter {
    root: PathBuf,
    ignore: Vec<Regex>,
    window: Duration,
    last_accepted: HashMap<PathBuf, Instant>,
}

impl EventFilter {
    pub fn new(root: &Path, ignore: Vec<Regex>, window: Duration) -> Self {
        Self {
            root: clean_path(root),
            ignore,
            window,
            last_accepted: HashMap::new(),
        }
    }

    /// Returns true when a handler should run for `path`. Updates the
    /// debounce map only on acceptance.
    pub fn accept(&mut self, path: &Path, now: Instant) -> bool {
        let cleaned = clean_path(path);
        if cleaned == self.root {
            return false;
        }
        if self.is_ignored(&cleaned) {
            return false;
        }

        if let Some(last) = self.last_accepted.get(&cleaned) {
            if now.duration_since(*last) < self.window {
                return false;
            }
        }
        self.last_accepted.insert(cleaned, now);
        true
    }

    fn is_ignored(&self, path: &Path) -> bool {
        let haystack = clean_path(path).to_string_lossy().into_owned();
        self.ignore.iter().any(|regex| regex.is_match(&haystack))
    }
}

/// One watch session over a source tree. Created per session; consumed by
/// [`WatchContext::watch`], which blocks until the cancellation token
/// fires.
pub struct WatchContext {
    root: PathBuf,
    filter: EventFilter,
    policy: WatchPolicy,
    cancel: CancelToken,
    verbose: bool,
}

impl WatchContext {
    pub fn new(
        root: &Path,
        ignore_patterns: &[String],
        policy: WatchPolicy,
        cancel: CancelToken,
    ) -> Result<Self> {
        let ignore = compile_ignore_patterns(ignore_patterns)?;
        Ok(Self {
            root: clean_path(root),
            filter: EventFilter::new(root, ignore, DEFAULT_DEBOUNCE_WINDOW),
            policy,
            cancel,
            verbose: false,
        })
    }

    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.filter.window = window;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Watches the source tree and dispatches accepted events to the
    /// selected policy, one at a time, until cancelled. Directories
    /// created after watch-start are registered as their create events
    /// arrive.
    pub fn watch(mut self) -> Result<()> {
        let (tx, rx) = mpsc::channel();
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            })
            .context("failed to create filesystem watcher")?;

        register_tree(&mut watcher, &self.root, &self.filter.ignore)?;

        loop {
            match rx.recv_timeout(RECV_TICK) {
                Ok(Ok(event)) => {
                    let Some(class) = classify(&event.kind) else {
                        continue;
                    };
                    for path in &event.paths {
                        if class == EventClass::Create
                            && path.is_dir()
                            && !self.filter.is_ignored(path)
                        {
                            // New subdirectories are picked up dynamically.
                            let _ = watcher.watch(path, RecursiveMode::NonRecursive);
                        }
                        if self.filter.accept(path, Instant::now()) {
                            self.dispatch(class, path);
                        }
                    }
                }
                Ok(Err(err)) => eprintln!("watch error: {err}"),
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
            if self.cancel.is_cancelled() {
                break;
            }
        }

        println!("Stopping file watch");
        Ok(())
    }

    fn dispatch(&mut self, class: EventClass, path: &Path) {
        match &mut self.policy {
            WatchPolicy::CarbonCopy { destination } => match class {
                EventClass::Write | EventClass::Create => {
                    mirror_copy(&self.root, destination, path, self.verbose);
                }
                EventClass::Remove | EventClass::Rename => {
                    mirror_delete(&self.root, destination, path);
                }
                EventClass::Chmod => {}
            },
            WatchPolicy::Rebuild(hook) => {
                if class != EventClass::Chmod {
                    hook(path);
                }
            }
        }
    }
}

/// Maps raw notify kinds onto the dispatch classes. Events outside the
/// five classes (access notifications and the like) are dropped.
pub fn classify(kind: &EventKind) -> Option<EventClass> {
    match kind {
        EventKind::Create(_) => Some(EventClass::Create),
        EventKind::Remove(_) => Some(EventClass::Remove),
        EventKind::Modify(ModifyKind::Name(_)) => Some(EventClass::Rename),
        EventKind::Modify(ModifyKind::Metadata(_)) => Some(EventClass::Chmod),
        EventKind::Modify(_) => Some(EventClass::Write),
        _ => None,
    }
}

fn register_tree(
    watcher: &mut RecommendedWatcher,
    dir: &Path,
    ignore: &[Regex],
) -> Result<()> {
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", dir.display()))?;

    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let path = clean_path(&entry.path());
        let haystack = path.to_string_lossy();
        if ignore.iter().any(|regex| regex.is_match(&haystack)) {
            continue;
        }
        register_tree(watcher, &path, ignore)?;
    }
    Ok(())
}

fn mirror_copy(root: &Path, destination: &Path, path: &Path, verbose: bool) {
    let dest = match mirrored_path(root, destination, path) {
        Some(dest) => dest,
        None => return,
    };
    match copy_path(path, &dest, true, &[]) {
        Ok(()) => {
            if verbose {
                println!("Copied {} to {}", path.display(), dest.display());
            }
        }
        Err(err) => eprintln!("error copying {}: {err:#}", path.display()),
    }
}

fn mirror_delete(root: &Path, destination: &Path, path: &Path) {
    let dest = match mirrored_path(root, destination, path) {
        Some(dest) => dest,
        None => return,
    };
    let removed = if dest.is_dir() {
        fs::remove_dir_all(&dest)
    } else {
        fs::remove_file(&dest)
    };
    match removed {
        Ok(()) => println!("Removed {}", dest.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => eprintln!("error deleting {}: {err}", dest.display()),
    }
}

fn mirrored_path(root: &Path, destination: &Path, path: &Path) -> Option<PathBuf> {
    match clean_path(path).strip_prefix(root) {
        Ok(rel) => Some(destination.join(rel)),
        Err(_) => {
            eprintln!(
                "event path {} is outside the watched tree {}",
                path.display(),
                root.display()
            );
            None
        }
    }
}

#[cfg(test)]
mod tests;
