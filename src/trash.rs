//! Moves displaced installs into the trash directory before they are
//! overwritten.

use crate::error::UpdateError;
use crate::types::TrashConfig;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};

const COMPOUND_EXTENSIONS: &[&str] = &[".tar.gz", ".tar.xz", ".tar.bz2", ".tar.zst"];

/// Split a file name into stem and extension, keeping `.tar.*` together.
fn split_extension(file_name: &str) -> (&str, &str) {
    for ext in COMPOUND_EXTENSIONS {
        if file_name.len() > ext.len() {
            let at = file_name.len() - ext.len();
            if file_name.is_char_boundary(at) && file_name[at..].eq_ignore_ascii_case(ext) {
                return file_name.split_at(at);
            }
        }
    }
    match file_name.rfind('.') {
        Some(at) if at > 0 => file_name.split_at(at),
        _ => (file_name, ""),
    }
}

/// Name of the archived copy of `file_name`.
///
/// `-{tag}` and `-{timestamp}` are inserted before the extension when the
/// matching flags are set.
pub fn trash_file_name(file_name: &str, trash: &TrashConfig, tag: &str, timestamp: &str) -> String {
    let (stem, ext) = split_extension(file_name);
    let mut name = stem.to_string();
    if trash.append_tag && !tag.is_empty() {
        name.push('-');
        name.push_str(&tag.replace(['/', '\\'], "_"));
    }
    if trash.append_date {
        name.push('-');
        name.push_str(timestamp);
    }
    name.push_str(ext);
    name
}

/// Pick the final archive path. Without tag or date suffixes an older
/// archive is simply replaced; otherwise a `-N` counter avoids clobbering.
fn unique_trash_path(trash_dir: &Path, name: &str, trash: &TrashConfig) -> PathBuf {
    let path = trash_dir.join(name);
    if !(trash.append_tag || trash.append_date) || !path.exists() {
        return path;
    }
    let (stem, ext) = split_extension(name);
    (1..)
        .map(|n| trash_dir.join(format!("{}-{}{}", stem, n, ext)))
        .find(|p| !p.exists())
        .unwrap_or(path)
}

/// Move `existing` into the trash directory.
///
/// Returns the archived path, or `None` when there was nothing to move.
pub fn archive(
    existing: &Path,
    trash: &TrashConfig,
    tag: &str,
) -> Result<Option<PathBuf>, UpdateError> {
    if !existing.exists() {
        return Ok(None);
    }

    fs::create_dir_all(&trash.trash_dir)
        .map_err(|e| UpdateError::io("creating trash directory", &trash.trash_dir, e))?;

    let file_name = existing
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "unnamed".to_string());
    let timestamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
    let name = trash_file_name(&file_name, trash, tag, &timestamp);
    let target = unique_trash_path(&trash.trash_dir, &name, trash);

    tracing::info!("Moving old version to trash: {}", target.display());
    move_file(existing, &target)?;
    Ok(Some(target))
}

fn move_file(from: &Path, to: &Path) -> Result<(), UpdateError> {
    if to.is_file() {
        fs::remove_file(to).map_err(|e| UpdateError::io("replacing", to, e))?;
    }
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    // Trash may live on another filesystem.
    tracing::debug!("Rename failed, copying {} instead", from.display());
    fs::copy(from, to).map_err(|e| UpdateError::io("copying to trash", to, e))?;
    fs::remove_file(from).map_err(|e| UpdateError::io("removing", from, e))?;
    Ok(())
}
