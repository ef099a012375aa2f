use crate::error::UpdateError;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::Write;
use std::path::Path;

fn progress_bar(total_size: u64, filename: &str) -> ProgressBar {
    let pb = ProgressBar::new(total_size);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(format!("Downloading {}", filename));
    pb
}

/// Stream `url` into `local_path`.
///
/// The body is written to a temporary file in the destination directory and
/// only renamed over `local_path` once the transfer finished and its size
/// matches `Content-Length`. On failure nothing is left at `local_path`.
/// Returns the number of bytes written.
pub async fn download_file(
    client: &reqwest::Client,
    url: &str,
    local_path: &Path,
) -> Result<u64, UpdateError> {
    let filename = local_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| url.to_string());
    tracing::info!("Downloading {} from {}...", filename, url);

    let failed = |reason: String| UpdateError::Download {
        url: url.to_string(),
        reason,
    };

    let response = client
        .get(url)
        .header("User-Agent", concat!("gh-updater/", env!("CARGO_PKG_VERSION")))
        .send()
        .await
        .map_err(|e| failed(e.to_string()))?;
    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }
    let expected = response.content_length();

    let dir = local_path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| UpdateError::io("creating directory", dir, e))?;
    let mut staged = tempfile::Builder::new()
        .prefix(&format!(".{}.", filename))
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|e| UpdateError::io("creating temporary file in", dir, e))?;

    let pb = progress_bar(expected.unwrap_or(0), &filename);
    let mut downloaded = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            pb.abandon();
            failed(e.to_string())
        })?;
        staged
            .write_all(&chunk)
            .map_err(|e| UpdateError::io("writing", staged.path(), e))?;
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }
    staged
        .flush()
        .map_err(|e| UpdateError::io("writing", staged.path(), e))?;

    if let Some(expected) = expected {
        if expected != downloaded {
            pb.abandon();
            return Err(failed(format!(
                "expected {} bytes, received {}",
                expected, downloaded
            )));
        }
    }

    staged
        .persist(local_path)
        .map_err(|e| UpdateError::io("installing", local_path, e.error))?;
    pb.finish_with_message("Download complete");

    tracing::info!("Downloaded to {}", local_path.display());
    Ok(downloaded)
}
