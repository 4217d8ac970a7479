use std::path::{Path, PathBuf};

pub const SERVER_BINARY: &str = if cfg!(windows) { "sitekit.exe" } else { "sitekit" };
pub const ARCHIVE_NAME: &str = "sitekit.zip";

pub const ENV_FILE: &str = ".env";
pub const CONTENT_DIR: &str = "content";
pub const PLUGINS_DIR: &str = "plugins";
pub const THEMES_DIR: &str = "themes";
pub const DEFAULT_THEME_DIR: &str = "default";
pub const TEMPLATES_DIR: &str = "templates";
pub const DOCS_DIR: &str = "docs";
pub const ADMIN_DIR: &str = "admin";

// Transient update directories. Guaranteed absent outside a running update.
pub const BACKUP_DIR: &str = ".bk";
pub const STAGING_DIR: &str = ".staging";

pub const RELEASE_PROTOCOL: &str = "https";
pub const RELEASE_HOST: &str = "release";
pub const RELEASE_DOMAIN: &str = "sitekit.dev";
pub const RELEASE_CHANNEL: &str = "stable-release";
pub const DEFAULT_RELEASE_VERSION: &str = "current";

/// Wraps an installation root and derives every reserved path under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn server_binary_path(&self) -> PathBuf {
        self.root.join(SERVER_BINARY)
    }

    pub fn env_file_path(&self) -> PathBuf {
        self.root.join(ENV_FILE)
    }

    pub fn content_dir(&self) -> PathBuf {
        self.root.join(CONTENT_DIR)
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.content_dir().join(PLUGINS_DIR)
    }

    pub fn plugin_dir(&self, plugin_id: &str) -> PathBuf {
        self.plugins_dir().join(plugin_id)
    }

    pub fn themes_dir(&self) -> PathBuf {
        self.content_dir().join(THEMES_DIR)
    }

    pub fn theme_dir(&self, name: &str) -> PathBuf {
        self.themes_dir().join(name)
    }

    pub fn default_theme_dir(&self) -> PathBuf {
        self.theme_dir(DEFAULT_THEME_DIR)
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.content_dir().join(TEMPLATES_DIR)
    }

    pub fn docs_dir(&self) -> PathBuf {
        self.content_dir().join(DOCS_DIR)
    }

    pub fn admin_dir(&self) -> PathBuf {
        self.content_dir().join(ADMIN_DIR)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.root.join(BACKUP_DIR)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// True when the root looks like an active installation, i.e. the
    /// server binary is present.
    pub fn is_installation(&self) -> bool {
        self.server_binary_path().exists()
    }
}

/// Platform segment of the release URL path.
pub fn release_os_path() -> &'static str {
    if cfg!(all(target_os = "linux", target_arch = "x86_64")) {
        "linux_amd64"
    } else if cfg!(all(target_os = "linux", target_arch = "aarch64")) {
        "linux_arm64"
    } else if cfg!(all(target_os = "macos", target_arch = "x86_64")) {
        "darwin_amd64"
    } else if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
        "darwin_arm64"
    } else if cfg!(windows) {
        "windows_amd64"
    } else {
        "linux_amd64"
    }
}

/// Builds the release archive URL:
/// `<protocol>://<host>.<domain>/<channel>/<version>/<os-path>/<archive>`.
pub fn release_url(version: &str) -> String {
    format!(
        "{}://{}.{}/{}/{}/{}/{}",
        RELEASE_PROTOCOL,
        RELEASE_HOST,
        RELEASE_DOMAIN,
        RELEASE_CHANNEL,
        version,
        release_os_path(),
        ARCHIVE_NAME
    )
}

/// URL of the published version listing for the release channel.
pub fn versions_url() -> String {
    format!(
        "{}://{}.{}/{}/versions.txt",
        RELEASE_PROTOCOL, RELEASE_HOST, RELEASE_DOMAIN, RELEASE_CHANNEL
    )
}
