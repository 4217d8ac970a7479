use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use skm_core::{copy_path, remove_dir_if_exists, InstallLayout};

mod fetch;

pub use fetch::{download_file, extract_zip, HttpReleaseFetcher, ReleaseFetcher};

use skm_core::layout::DEFAULT_THEME_DIR;

/// One staged update of a single installation. At most one context may be
/// active per installation at a time; a leftover backup or staging
/// directory from a previous run is a fail-fast input error.
#[derive(Debug, Clone)]
pub struct UpdateContext {
    layout: InstallLayout,
    verbose: bool,
}

/// Steps of the staged update, in execution order. A failure in any step
/// rolls the installation back to its pre-update state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStep {
    BackingUp,
    Installing,
    Merging,
    Promoting,
}

impl UpdateStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BackingUp => "backing up the current installation",
            Self::Installing => "installing the new release into staging",
            Self::Merging => "merging preserved state into staging",
            Self::Promoting => "promoting staging into the installation",
        }
    }
}

impl UpdateContext {
    pub fn new(install_dir: impl Into<std::path::PathBuf>, verbose: bool) -> Self {
        Self {
            layout: InstallLayout::new(install_dir),
            verbose,
        }
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }
}

/// Downloads and unpacks a fresh release into `dest`. Used by the install
/// command and by the update engine's staging step.
pub fn run_install(dest: &Path, version: &str, fetcher: &dyn ReleaseFetcher) -> Result<()> {
    fs::create_dir_all(dest).with_context(|| format!("failed to create {}", dest.display()))?;
    fetcher.fetch_release(version, dest)
}

/// Runs the staged update: backup, install into staging, merge preserved
/// state, promote. Any failure rolls back to the pre-update state and
/// removes the transient directories; rollback problems are logged but
/// never mask the original failure.
pub fn run_update(ctx: &UpdateContext, version: &str, fetcher: &dyn ReleaseFetcher) -> Result<()> {
    let layout = &ctx.layout;

    // Input validation happens before any filesystem mutation.
    if !layout.is_installation() {
        return Err(anyhow!(
            "{} does not appear to be an active installation (no {} binary)",
            layout.root().display(),
            skm_core::layout::SERVER_BINARY
        ));
    }
    if layout.backup_dir().exists() || layout.staging_dir().exists() {
        return Err(anyhow!(
            "found leftover {} or {} in {}; a previous update did not finish cleanly",
            skm_core::layout::BACKUP_DIR,
            skm_core::layout::STAGING_DIR,
            layout.root().display()
        ));
    }

    match apply_update(ctx, version, fetcher) {
        Ok(()) => {
            cleanup_transient_dirs(layout)?;
            Ok(())
        }
        Err(err) => {
            roll_back(layout);
            Err(err)
        }
    }
}

fn apply_update(ctx: &UpdateContext, version: &str, fetcher: &dyn ReleaseFetcher) -> Result<()> {
    let layout = &ctx.layout;

    println!("Backing up current installation...");
    snapshot_installation(layout)
        .with_context(|| format!("update failed while {}", UpdateStep::BackingUp.as_str()))?;

    println!("Installing new release into staging...");
    run_install(&layout.staging_dir(), version, fetcher)
        .with_context(|| format!("update failed while {}", UpdateStep::Installing.as_str()))?;

    println!("Merging preserved configuration, plugins, and themes...");
    merge_preserved_state(ctx)
        .with_context(|| format!("update failed while {}", UpdateStep::Merging.as_str()))?;

    println!("Applying update...");
    copy_path(&layout.staging_dir(), layout.root(), false, &[])
        .with_context(|| format!("update failed while {}", UpdateStep::Promoting.as_str()))?;

    Ok(())
}

/// Copies the whole installation into the backup directory, excluding the
/// transient directories themselves so the walk cannot recurse into its
/// own output.
fn snapshot_installation(layout: &InstallLayout) -> Result<()> {
    let backup = layout.backup_dir();
    fs::create_dir_all(&backup)
        .with_context(|| format!("failed to create {}", backup.display()))?;

    let root = layout.root();
    for entry in
        fs::read_dir(root).with_context(|| format!("failed to read {}", root.display()))?
    {
        let entry = entry?;
        let name = entry.file_name();
        if name == skm_core::layout::BACKUP_DIR || name == skm_core::layout::STAGING_DIR {
            continue;
        }
        copy_path(&entry.path(), &backup.join(&name), false, &[])?;
    }
    Ok(())
}

/// Moves the state that must survive the upgrade from the backup copy
/// into staging, overwriting whatever the fresh release placed there. The
/// bundled default theme always comes from the new release.
fn merge_preserved_state(ctx: &UpdateContext) -> Result<()> {
    let layout = &ctx.layout;
    let backup = InstallLayout::new(layout.backup_dir());
    let staging = InstallLayout::new(layout.staging_dir());

    if backup.env_file_path().exists() {
        force_move(&backup.env_file_path(), &staging.env_file_path())?;
    } else if ctx.verbose {
        println!("no {} file to preserve", skm_core::layout::ENV_FILE);
    }

    if backup.plugins_dir().exists() {
        fs::create_dir_all(staging.content_dir())
            .with_context(|| format!("failed to create {}", staging.content_dir().display()))?;
        force_move(&backup.plugins_dir(), &staging.plugins_dir())?;
    }

    if backup.themes_dir().exists() {
        fs::create_dir_all(staging.themes_dir())
            .with_context(|| format!("failed to create {}", staging.themes_dir().display()))?;
        for entry in fs::read_dir(backup.themes_dir())
            .with_context(|| format!("failed to read {}", backup.themes_dir().display()))?
        {
            let entry = entry?;
            let name = entry.file_name();
            if name == DEFAULT_THEME_DIR {
                continue;
            }
            if ctx.verbose {
                println!("preserving theme {}", name.to_string_lossy());
            }
            force_move(&entry.path(), &staging.themes_dir().join(&name))?;
        }
    }

    Ok(())
}

/// Removes the destination and renames the source over it, falling back
/// to copy-and-delete when rename fails (cross-device moves).
fn force_move(src: &Path, dst: &Path) -> Result<()> {
    if dst.is_dir() {
        fs::remove_dir_all(dst)
            .with_context(|| format!("failed to remove {}", dst.display()))?;
    } else if dst.exists() {
        fs::remove_file(dst).with_context(|| format!("failed to remove {}", dst.display()))?;
    }

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            copy_path(src, dst, false, &[])?;
            if src.is_dir() {
                fs::remove_dir_all(src)
                    .with_context(|| format!("failed to remove {}", src.display()))?;
            } else {
                fs::remove_file(src)
                    .with_context(|| format!("failed to remove {}", src.display()))?;
            }
            Ok(())
        }
    }
}

fn cleanup_transient_dirs(layout: &InstallLayout) -> Result<()> {
    remove_dir_if_exists(&layout.backup_dir())?;
    remove_dir_if_exists(&layout.staging_dir())?;
    Ok(())
}

/// Best-effort rollback: the backup is copied back over the installation
/// and the transient directories are removed regardless of whether the
/// copy fully succeeds.
fn roll_back(layout: &InstallLayout) {
    eprintln!("Rolling back changes...");
    if layout.backup_dir().exists() {
        if let Err(err) = copy_path(&layout.backup_dir(), layout.root(), false, &[]) {
            eprintln!("rollback copy failed: {err:#}");
        }
    }
    if let Err(err) = cleanup_transient_dirs(layout) {
        eprintln!("failed to remove transient update directories: {err:#}");
    }
}

#[cfg(test)]
mod tests;
