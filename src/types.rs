use crate::error::UpdateError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;

/// One managed application, exactly as it is stored in the config file.
///
/// Fields the updater does not know about are kept in `extra` so that a
/// write-back never drops anything the user put there.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppEntry {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_match_type: Option<String>,
    #[serde(default)]
    pub install_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_path_match_type: Option<String>,
    #[serde(default)]
    pub use_prerelease: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_download_hook: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_download_hook_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub find_assets_hook: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub find_assets_hook_args: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_app_name() -> String {
    "Unknown".to_string()
}

/// How release assets are selected for an app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetMatch {
    Fixed(String),
    Regex(String),
    TagTemplate(String),
    All,
}

impl AssetMatch {
    pub fn from_entry(match_type: Option<&str>, pattern: Option<&str>) -> Result<Self, UpdateError> {
        let match_type = match_type.unwrap_or("fixed");
        if match_type == "all" {
            return Ok(AssetMatch::All);
        }

        let pattern = pattern
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                UpdateError::Config(format!(
                    "asset_match_type '{}' requires an asset_pattern",
                    match_type
                ))
            })?
            .to_string();

        match match_type {
            "fixed" => Ok(AssetMatch::Fixed(pattern)),
            "regex" => Ok(AssetMatch::Regex(pattern)),
            "tag" => Ok(AssetMatch::TagTemplate(pattern)),
            other => Err(UpdateError::Config(format!(
                "unknown asset_match_type '{}' (expected fixed, regex, tag or all)",
                other
            ))),
        }
    }
}

impl fmt::Display for AssetMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetMatch::Fixed(p) => write!(f, "fixed '{}'", p),
            AssetMatch::Regex(p) => write!(f, "regex '{}'", p),
            AssetMatch::TagTemplate(p) => write!(f, "tag '{}'", p),
            AssetMatch::All => write!(f, "all"),
        }
    }
}

/// How `install_path` is turned into a destination for each asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallPathMatch {
    #[default]
    Fixed,
    /// `{tag}` in the install path is replaced with the release tag.
    TagTemplate,
    /// The install path is a directory and the asset name is the file name.
    AssetName,
}

impl InstallPathMatch {
    pub fn from_entry(value: Option<&str>) -> Result<Self, UpdateError> {
        match value.unwrap_or("fixed") {
            "fixed" => Ok(InstallPathMatch::Fixed),
            "tag" => Ok(InstallPathMatch::TagTemplate),
            "asset_name" => Ok(InstallPathMatch::AssetName),
            other => Err(UpdateError::Config(format!(
                "unknown install_path_match_type '{}' (expected fixed, tag or asset_name)",
                other
            ))),
        }
    }
}

/// An external program plus the extra arguments the operator configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookSpec {
    pub program: String,
    pub args: Vec<String>,
}

/// A validated app entry, ready for the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSpec {
    pub name: String,
    pub repo: String,
    pub tag: String,
    pub asset_match: AssetMatch,
    pub install_path: String,
    pub install_path_match: InstallPathMatch,
    pub use_prerelease: bool,
    pub post_download_hook: Option<HookSpec>,
    pub find_assets_hook: Option<HookSpec>,
}

impl AppSpec {
    /// True when `install_path` names a directory rather than a file.
    pub fn is_directory_mode(&self) -> bool {
        self.asset_match == AssetMatch::All || self.install_path_match == InstallPathMatch::AssetName
    }
}

impl TryFrom<&AppEntry> for AppSpec {
    type Error = UpdateError;

    fn try_from(entry: &AppEntry) -> Result<Self, Self::Error> {
        let repo = entry
            .repo
            .clone()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| UpdateError::Config("missing required field 'repo'".to_string()))?;
        if repo.split('/').count() != 2 || repo.split('/').any(str::is_empty) {
            return Err(UpdateError::Config(format!(
                "repo '{}' is not in owner/name form",
                repo
            )));
        }

        let install_path = entry
            .install_path
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                UpdateError::Config("missing required field 'install_path'".to_string())
            })?;

        let hook = |program: &Option<String>, args: &[String]| {
            program
                .as_ref()
                .filter(|p| !p.is_empty())
                .map(|p| HookSpec {
                    program: p.clone(),
                    args: args.to_vec(),
                })
        };

        let find_assets_hook = hook(&entry.find_assets_hook, &entry.find_assets_hook_args);

        // An entry that leaves selection entirely to its find-assets hook
        // installs whatever the hook picks into `install_path` as a directory.
        let pattern_given = entry.asset_pattern.as_deref().is_some_and(|p| !p.is_empty());
        let asset_match = if find_assets_hook.is_some()
            && entry.asset_match_type.is_none()
            && !pattern_given
        {
            AssetMatch::All
        } else {
            AssetMatch::from_entry(
                entry.asset_match_type.as_deref(),
                entry.asset_pattern.as_deref(),
            )?
        };

        Ok(AppSpec {
            name: entry.name.clone(),
            repo,
            tag: entry.tag.clone(),
            asset_match,
            install_path,
            install_path_match: InstallPathMatch::from_entry(
                entry.install_path_match_type.as_deref(),
            )?,
            use_prerelease: entry.use_prerelease,
            post_download_hook: hook(&entry.post_download_hook, &entry.post_download_hook_args),
            find_assets_hook,
        })
    }
}

/// The `trash_config` section as written by the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrashSettings {
    #[serde(default = "default_trash_path")]
    pub trash_path: String,
    #[serde(default = "default_append_tag")]
    pub append_tag: bool,
    #[serde(default)]
    pub append_date: bool,
}

fn default_trash_path() -> String {
    "./.trash".to_string()
}
fn default_append_tag() -> bool {
    true
}

impl Default for TrashSettings {
    fn default() -> Self {
        Self {
            trash_path: default_trash_path(),
            append_tag: default_append_tag(),
            append_date: false,
        }
    }
}

/// Process-wide trash settings with the directory already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrashConfig {
    pub trash_dir: PathBuf,
    pub append_tag: bool,
    pub append_date: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UpdaterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trash_config: Option<TrashSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
    pub apps: Vec<AppEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetInfo {
    pub name: String,
    pub download_url: String,
}

impl From<&GitHubAsset> for AssetInfo {
    fn from(asset: &GitHubAsset) -> Self {
        AssetInfo {
            name: asset.name.clone(),
            download_url: asset.browser_download_url.clone(),
        }
    }
}

/// Matched assets paired with the absolute path each one installs to.
pub type MatchResult = Vec<(AssetInfo, PathBuf)>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

impl GitHubRelease {
    pub fn asset_names(&self) -> Vec<String> {
        self.assets.iter().map(|a| a.name.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitHubAsset {
    pub name: String,
    #[serde(default)]
    pub browser_download_url: String,
}
