//! Destination path resolution.
//!
//! Relative paths are always anchored at the directory holding the config
//! file, never at the process working directory.

use crate::error::UpdateError;
use crate::matcher::TAG_PLACEHOLDER;
use crate::types::InstallPathMatch;
use std::path::{Component, Path, PathBuf};

/// Anchor `path` at `base_dir` unless it is already absolute.
pub fn resolve_relative(path: impl AsRef<Path>, base_dir: &Path) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Resolve the configured install path for a release tag.
///
/// For [`InstallPathMatch::TagTemplate`] every `{tag}` is replaced with the
/// literal tag. In directory mode the result is the directory itself.
pub fn resolve_install_path(
    install_path: &str,
    install_path_match: InstallPathMatch,
    tag: &str,
    config_dir: &Path,
) -> PathBuf {
    let raw = match install_path_match {
        InstallPathMatch::TagTemplate => install_path.replace(TAG_PLACEHOLDER, tag),
        InstallPathMatch::Fixed | InstallPathMatch::AssetName => install_path.to_string(),
    };
    resolve_relative(raw, config_dir)
}

/// Where the currently installed version lives when the install path is a
/// tag template and differs from the new destination.
pub fn previous_install_path(
    install_path: &str,
    install_path_match: InstallPathMatch,
    recorded_tag: &str,
    new_tag: &str,
    config_dir: &Path,
) -> Option<PathBuf> {
    if install_path_match != InstallPathMatch::TagTemplate
        || recorded_tag.is_empty()
        || recorded_tag == new_tag
    {
        return None;
    }
    Some(resolve_install_path(
        install_path,
        install_path_match,
        recorded_tag,
        config_dir,
    ))
}

/// Join an asset name onto an install directory.
///
/// Asset names come from the network, so anything that could escape the
/// directory is refused.
pub fn asset_destination(install_dir: &Path, asset_name: &str) -> Result<PathBuf, UpdateError> {
    let candidate = Path::new(asset_name);
    let mut components = candidate.components();
    let single_normal = matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none();
    if !single_normal || asset_name.contains(['/', '\\']) {
        return Err(UpdateError::io(
            "refusing unsafe asset name for",
            install_dir.join(asset_name),
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("asset name '{}' is not a plain file name", asset_name),
            ),
        ));
    }
    Ok(install_dir.join(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_use_config_dir() {
        let base = Path::new("/etc/updater");
        assert_eq!(
            resolve_install_path("apps/app.zip", InstallPathMatch::Fixed, "v1", base),
            PathBuf::from("/etc/updater/apps/app.zip")
        );
        assert_eq!(
            resolve_install_path("/opt/app.zip", InstallPathMatch::Fixed, "v1", base),
            PathBuf::from("/opt/app.zip")
        );
    }

    #[test]
    fn test_tag_substitution_uses_literal_tag() {
        let base = Path::new("/base");
        assert_eq!(
            resolve_install_path("app-{tag}/app-{tag}.zip", InstallPathMatch::TagTemplate, "v2.0", base),
            PathBuf::from("/base/app-v2.0/app-v2.0.zip")
        );
        // Placeholders are left alone unless the path is a template.
        assert_eq!(
            resolve_install_path("app-{tag}.zip", InstallPathMatch::Fixed, "v2.0", base),
            PathBuf::from("/base/app-{tag}.zip")
        );
    }

    #[test]
    fn test_previous_install_path() {
        let base = Path::new("/base");
        assert_eq!(
            previous_install_path("app-{tag}.zip", InstallPathMatch::TagTemplate, "v1", "v2", base),
            Some(PathBuf::from("/base/app-v1.zip"))
        );
        assert_eq!(
            previous_install_path("app-{tag}.zip", InstallPathMatch::TagTemplate, "", "v2", base),
            None
        );
        assert_eq!(
            previous_install_path("app.zip", InstallPathMatch::Fixed, "v1", "v2", base),
            None
        );
    }

    #[test]
    fn test_asset_destination() {
        let dir = Path::new("/downloads");
        assert_eq!(
            asset_destination(dir, "tool-linux.tar.gz").unwrap(),
            PathBuf::from("/downloads/tool-linux.tar.gz")
        );
        assert!(asset_destination(dir, "../evil").is_err());
        assert!(asset_destination(dir, "sub/evil").is_err());
        assert!(asset_destination(dir, "..").is_err());
        assert!(asset_destination(dir, "").is_err());
    }
}
