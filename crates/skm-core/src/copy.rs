use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use regex::Regex;

use crate::fileset::FileSet;
use crate::paths::clean_path;

/// Compiles ignore patterns up front so a bad pattern fails fast, before
/// any filesystem mutation.
pub fn compile_ignore_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).with_context(|| format!("invalid ignore pattern: {pattern}"))
        })
        .collect()
}

fn is_ignored(path: &Path, ignore: &[Regex]) -> bool {
    let cleaned = clean_path(path);
    let haystack = cleaned.to_string_lossy();
    ignore.iter().any(|regex| regex.is_match(&haystack))
}

/// Copies a file or directory tree from `source` to `dest`.
///
/// Directories are walked and mirrored; paths matching an ignore pattern
/// are skipped, and matching directories are pruned from the walk
/// entirely. With `hard_copy` the destination subtree is removed first,
/// giving full-replace semantics. File copies carry the source permission
/// bits. The copy is not atomic.
pub fn copy_path(source: &Path, dest: &Path, hard_copy: bool, ignore: &[Regex]) -> Result<()> {
    let source = clean_path(source);
    let dest = clean_path(dest);

    let metadata = fs::symlink_metadata(&source)
        .with_context(|| format!("missing copy source: {}", source.display()))?;

    if metadata.is_dir() {
        if hard_copy {
            remove_dir_if_exists(&dest)?;
        }
        return copy_dir_recursive(&source, &dest, ignore);
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    copy_file(&source, &dest)
}

/// Copies every entry of a deployment file set into `destination_root`,
/// computing each destination by stripping the `source_root` prefix.
/// A missing entry aborts the remaining set.
pub fn materialize(
    set: &FileSet,
    source_root: &Path,
    destination_root: &Path,
    hard_copy: bool,
    ignore: &[Regex],
) -> Result<()> {
    let source_root = clean_path(source_root);
    for entry in set {
        let entry = clean_path(entry);
        if !entry.exists() {
            return Err(anyhow!(
                "declared file or directory does not exist: {}",
                entry.display()
            ));
        }

        let relative = match entry.strip_prefix(&source_root) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => entry
                .file_name()
                .map(Into::into)
                .ok_or_else(|| anyhow!("cannot deploy path without a name: {}", entry.display()))?,
        };

        let dest = destination_root.join(relative);
        copy_path(&entry, &dest, hard_copy, ignore)
            .with_context(|| format!("failed to deploy {}", entry.display()))?;
    }
    Ok(())
}

pub fn remove_dir_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .with_context(|| format!("failed to remove {}", path.display()))?;
    }
    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path, ignore: &[Regex]) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("failed to create {}", dst.display()))?;
    for entry in fs::read_dir(src).with_context(|| format!("failed to read {}", src.display()))? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if is_ignored(&src_path, ignore) {
            continue;
        }

        let metadata = fs::symlink_metadata(&src_path)
            .with_context(|| format!("failed to stat {}", src_path.display()))?;
        if metadata.is_dir() {
            copy_dir_recursive(&src_path, &dst_path, ignore)?;
            continue;
        }

        #[cfg(unix)]
        if metadata.file_type().is_symlink() {
            let target = fs::read_link(&src_path)
                .with_context(|| format!("failed to read symlink {}", src_path.display()))?;
            let _ = fs::remove_file(&dst_path);
            std::os::unix::fs::symlink(&target, &dst_path).with_context(|| {
                format!(
                    "failed to create symlink {} -> {}",
                    dst_path.display(),
                    target.display()
                )
            })?;
            continue;
        }

        copy_file(&src_path, &dst_path)?;
    }
    Ok(())
}

fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    // fs::copy carries the permission bits to the destination.
    fs::copy(src, dst)
        .with_context(|| format!("failed to copy {} to {}", src.display(), dst.display()))?;
    Ok(())
}
