//! Streams a remote body to disk, resuming or restarting interrupted
//! transfers.
use std::{io::SeekFrom, path::Path, time::SystemTime};

use fs_err::tokio as async_fs;
use futures::StreamExt;
use indicatif::ProgressBar;
use reqwest::{StatusCode, header::RANGE};
use reqwest_middleware::ClientWithMiddleware;
use retry_policies::{RetryDecision, RetryPolicy, policies::ExponentialBackoff};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use url::Url;

use crate::{
    credentials::{Credentials, authenticate},
    error::UrlError,
    progress::ProgressHandler,
};

/// Downloads `url` into `target`.
///
/// A transfer that fails with a transient error is retried according to
/// `policy`. The retry asks for the remaining bytes with a `Range` header; if
/// the server ignores it the file is truncated and the body is read again from
/// the start.
pub(crate) async fn download(
    client: &ClientWithMiddleware,
    url: &Url,
    credentials: Option<&Credentials>,
    target: &Path,
    policy: &ExponentialBackoff,
    progress: &dyn ProgressHandler,
) -> Result<(), UrlError> {
    if url.scheme() == "file" {
        let source = url
            .to_file_path()
            .map_err(|_| UrlError::InvalidFileUrl(url.clone()))?;
        async_fs::copy(&source, target).await?;
        return Ok(());
    }

    let bar = ProgressBar::new(1).with_style(progress.default_bytes_style());
    bar.set_prefix("Downloading");
    let bar = progress.add_progress_bar(bar);

    let mut file = tokio::fs::File::create(target).await?;
    let mut written = 0u64;
    let start = SystemTime::now();
    let mut past_retries = 0;

    loop {
        match transfer(client, url, credentials, &mut file, &mut written, &bar).await {
            Ok(()) => break,
            Err(err) if err.is_transient() => match policy.should_retry(start, past_retries) {
                RetryDecision::Retry { execute_after } => {
                    let delay = execute_after
                        .duration_since(SystemTime::now())
                        .unwrap_or_default();
                    tracing::warn!(
                        "download of {url} interrupted after {written} bytes, retrying in {delay:?}: {err}"
                    );
                    tokio::time::sleep(delay).await;
                    past_retries += 1;
                }
                RetryDecision::DoNotRetry => return Err(err),
            },
            Err(err) => return Err(err),
        }
    }

    file.flush().await?;
    bar.finish_with_message("Downloaded");
    Ok(())
}

async fn transfer(
    client: &ClientWithMiddleware,
    url: &Url,
    credentials: Option<&Credentials>,
    file: &mut tokio::fs::File,
    written: &mut u64,
    bar: &ProgressBar,
) -> Result<(), UrlError> {
    let mut request = authenticate(client.get(url.clone()), credentials);
    if *written > 0 {
        request = request.header(RANGE, format!("bytes={written}-"));
    }
    let response = request.send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(UrlError::HttpStatus {
            url: url.clone(),
            status,
        });
    }
    if *written > 0 && status != StatusCode::PARTIAL_CONTENT {
        tracing::debug!("server does not support ranges, restarting the download");
        file.set_len(0).await?;
        file.seek(SeekFrom::Start(0)).await?;
        *written = 0;
        bar.set_position(0);
    }
    if let Some(remaining) = response.content_length() {
        bar.set_length(*written + remaining);
    }

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        *written += chunk.len() as u64;
        bar.inc(chunk.len() as u64);
    }
    Ok(())
}
