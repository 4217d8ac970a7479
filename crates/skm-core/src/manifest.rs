use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// Declarative description of a plugin, read from `manifest.json` at the
/// root of the plugin source tree. Consumed read-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub build: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub author_url: String,
    #[serde(default)]
    pub author_email: String,
    #[serde(default)]
    pub services: PluginServices,
    #[serde(default)]
    pub interface: PluginInterface,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PluginServices {
    #[serde(default)]
    pub routes: Vec<PluginRoute>,
    #[serde(default)]
    pub bin: String,
    #[serde(default)]
    pub docs: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PluginRoute {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub route: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub url: String,
}

/// Public/admin interface assets. Each entry is either a path relative to
/// the source tree's content directory or an absolute URL for externally
/// hosted assets.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PluginInterface {
    #[serde(default)]
    pub public: String,
    #[serde(default)]
    pub public_vendor: String,
    #[serde(default)]
    pub public_style: String,
    #[serde(default)]
    pub admin: String,
    #[serde(default)]
    pub admin_vendor: String,
    #[serde(default)]
    pub admin_style: String,
}

impl PluginManifest {
    pub fn from_json_str(input: &str) -> Result<Self> {
        let manifest: Self =
            serde_json::from_str(input).context("failed to parse plugin manifest")?;
        if manifest.id.trim().is_empty() {
            return Err(anyhow!("plugin manifest is missing a plugin id"));
        }
        if manifest.services.bin.trim().is_empty() {
            return Err(anyhow!(
                "plugin manifest '{}' does not declare a services.bin output name",
                manifest.id
            ));
        }
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read plugin manifest: {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("failed parsing plugin manifest: {}", path.display()))
    }
}

impl PluginInterface {
    /// Declared assets in a fixed order, skipping empty slots.
    pub fn declared_assets(&self) -> Vec<&str> {
        [
            self.public.as_str(),
            self.public_vendor.as_str(),
            self.public_style.as_str(),
            self.admin.as_str(),
            self.admin_vendor.as_str(),
            self.admin_style.as_str(),
        ]
        .into_iter()
        .filter(|asset| !asset.is_empty())
        .collect()
    }
}
