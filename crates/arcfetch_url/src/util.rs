use std::{io::ErrorKind, path::Path};

use fs_err::tokio as async_fs;
use url::Url;

/// Attempts to derive a filename from the URL's last path segment.
pub fn url_file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.to_string())
        .unwrap_or_else(|| "download".to_string())
}

/// Removes everything inside `dir`, keeping the directory itself. A missing
/// directory is created.
pub async fn clear_directory(dir: &Path) -> std::io::Result<()> {
    let mut entries = match async_fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return async_fs::create_dir_all(dir).await;
        }
        Err(err) => return Err(err),
    };
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            async_fs::remove_dir_all(entry.path()).await?;
        } else {
            async_fs::remove_file(entry.path()).await?;
        }
    }
    Ok(())
}
