use crate::paths::resolve_relative;
use crate::types::*;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "gh-updater";
pub const CONFIG_FILE_NAME: &str = "updater_config.json";
pub const CONFIG_ENV_VAR: &str = "GH_UPDATER_CONFIG";
/// Config path that means "read from stdin, write to stdout".
pub const STDIN_CONFIG: &str = "-";

const CONFIG_EXAMPLE: &str = r#"{
  "trash_config": {
    "trash_path": ".trash",
    "append_tag": true,
    "append_date": false
  },
  "github_token": "ghp_xxxxxxxxxxxx",
  "apps": [
    {
      "name": "App Name",
      "repo": "owner/repo",
      "tag": "",
      "asset_pattern": "app-{tag}-linux.zip",
      "asset_match_type": "tag",
      "install_path": "./apps/app.zip",
      "use_prerelease": false,
      "post_download_hook": "hooks/unpack.sh",
      "post_download_hook_args": ["--quiet"]
    }
  ]
}"#;

/// Where the config comes from and goes back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Stdin,
}

impl ConfigSource {
    pub fn is_stdin(&self) -> bool {
        matches!(self, ConfigSource::Stdin)
    }
}

/// A loaded config together with the directory relative paths hang off.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub source: ConfigSource,
    pub config_dir: PathBuf,
    pub config: UpdaterConfig,
}

/// Pick the config location: explicit flag, then `$GH_UPDATER_CONFIG`, then
/// `./updater_config.json` if it exists, then the per-user config directory.
pub fn get_config_source(flag: Option<&str>) -> Result<ConfigSource> {
    let explicit = flag
        .map(str::to_string)
        .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().filter(|v| !v.is_empty()));
    if let Some(path) = explicit {
        if path == STDIN_CONFIG {
            return Ok(ConfigSource::Stdin);
        }
        return Ok(ConfigSource::File(PathBuf::from(path)));
    }

    let local = std::env::current_dir()?.join(CONFIG_FILE_NAME);
    if local.exists() {
        return Ok(ConfigSource::File(local));
    }

    let path = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?
        .join(APP_NAME)
        .join(CONFIG_FILE_NAME);
    tracing::debug!("Config file path: {}", path.display());
    Ok(ConfigSource::File(path))
}

pub fn parse_config(content: &str) -> Result<UpdaterConfig> {
    let value: serde_json::Value =
        serde_json::from_str(content).with_context(|| "Could not parse config file as JSON")?;
    if value.get("apps").map_or(true, |apps| !apps.is_array()) {
        return Err(anyhow!("Config file must contain an 'apps' array"));
    }
    serde_json::from_value(value).with_context(|| "Config file has an invalid structure")
}

pub fn load_config(source: &ConfigSource) -> Result<LoadedConfig> {
    let (content, config_dir) = match source {
        ConfigSource::Stdin => {
            let mut content = String::new();
            io::stdin()
                .read_to_string(&mut content)
                .context("Could not read config from stdin")?;
            (content, std::env::current_dir()?)
        }
        ConfigSource::File(path) => {
            if !path.exists() {
                return Err(anyhow!(
                    "Missing config file: {}\n\nExpected format:\n{}",
                    path.display(),
                    CONFIG_EXAMPLE
                ));
            }
            let path = fs::canonicalize(path)
                .with_context(|| format!("Could not resolve {}", path.display()))?;
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Could not read config file at {}", path.display()))?;
            let dir = path
                .parent()
                .ok_or_else(|| anyhow!("Invalid config path"))?
                .to_path_buf();
            (content, dir)
        }
    };

    let config = parse_config(&content)?;
    tracing::debug!("Config directory: {}", config_dir.display());
    Ok(LoadedConfig {
        source: source.clone(),
        config_dir,
        config,
    })
}

pub fn render_config(config: &UpdaterConfig) -> Result<String> {
    let mut content = serde_json::to_string_pretty(config)?;
    content.push('\n');
    Ok(content)
}

/// Write the (possibly updated) config back where it came from.
pub fn save_config(loaded: &LoadedConfig) -> Result<()> {
    let content = render_config(&loaded.config)?;
    match &loaded.source {
        ConfigSource::Stdin => {
            print!("{}", content);
            Ok(())
        }
        ConfigSource::File(path) => {
            fs::write(path, content)
                .with_context(|| format!("Could not write config file {}", path.display()))?;
            tracing::debug!("Saved config to {}", path.display());
            Ok(())
        }
    }
}

/// Resolve the process-wide trash settings, creating the directory unless
/// `create_dir` is false (dry runs).
pub fn trash_config(
    settings: Option<&TrashSettings>,
    config_dir: &Path,
    create_dir: bool,
) -> Result<TrashConfig> {
    let default = TrashSettings::default();
    let settings = settings.unwrap_or(&default);
    let trash_dir = resolve_relative(&settings.trash_path, config_dir);
    if create_dir {
        fs::create_dir_all(&trash_dir).with_context(|| {
            format!("Could not create trash directory {}", trash_dir.display())
        })?;
    }
    tracing::info!("Trash directory: {}", trash_dir.display());
    Ok(TrashConfig {
        trash_dir,
        append_tag: settings.append_tag,
        append_date: settings.append_date,
    })
}
