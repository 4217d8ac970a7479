use std::path::{Path, PathBuf};

use url::Url;

use crate::layout::CONTENT_DIR;
use crate::manifest::PluginManifest;

/// Ordered list of files and directories slated for deployment. Insertion
/// order is preserved so copy logging stays deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    entries: Vec<PathBuf>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<PathBuf>) {
        self.entries.push(path.into());
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<'a> IntoIterator for &'a FileSet {
    type Item = &'a PathBuf;
    type IntoIter = std::slice::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// True when an interface asset declaration points at an externally hosted
/// URL rather than a file in the source tree. Relative paths fail absolute
/// URL parsing, which is exactly the split we need.
pub fn is_external_url(asset: &str) -> bool {
    Url::parse(asset).is_ok()
}

/// Builds the deployment file set for a plugin: the manifest itself, the
/// declared docs path, caller-supplied extra paths, and every locally
/// hosted interface asset resolved under the source tree's content
/// directory. Externally hosted assets are excluded.
pub fn plugin_file_set(src_dir: &Path, manifest: &PluginManifest, extras: &[PathBuf]) -> FileSet {
    let mut set = FileSet::new();
    set.push(src_dir.join("manifest.json"));

    if !manifest.services.docs.is_empty() {
        set.push(src_dir.join(&manifest.services.docs));
    }

    for extra in extras {
        set.push(extra.clone());
    }

    for asset in manifest.interface.declared_assets() {
        if is_external_url(asset) {
            continue;
        }
        set.push(src_dir.join(CONTENT_DIR).join(asset));
    }

    set
}
