use std::path::{Component, Path, PathBuf};

/// Lexically normalizes a path: resolves `.` and `..` components without
/// touching the filesystem. Ignore patterns are matched against the
/// cleaned form so that `./src/x` and `src/x` compare equal.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
