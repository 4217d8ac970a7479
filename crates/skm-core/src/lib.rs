mod cancel;
mod copy;
mod fileset;
pub mod layout;
mod manifest;
mod paths;

pub use cancel::CancelToken;
pub use copy::{compile_ignore_patterns, copy_path, materialize, remove_dir_if_exists};
pub use fileset::{is_external_url, plugin_file_set, FileSet};
pub use layout::{release_url, versions_url, InstallLayout};
pub use manifest::{PluginInterface, PluginManifest, PluginRoute, PluginServices};
pub use paths::clean_path;
