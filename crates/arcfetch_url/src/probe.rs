use chrono::{DateTime, Utc};
use fs_err::tokio as async_fs;
use reqwest::{
    Method, StatusCode,
    header::{CACHE_CONTROL, HeaderMap, LAST_MODIFIED},
};
use reqwest_middleware::ClientWithMiddleware;
use tracing::instrument;
use url::Url;

use crate::{
    credentials::{Credentials, authenticate},
    error::UrlError,
    freshness::LastModified,
};

/// Reads the modification time of the resource behind `url` without
/// downloading it.
///
/// HTTP resources are asked with a `HEAD` request, falling back to `GET` when
/// the server does not allow `HEAD`. A missing or unparsable `Last-Modified`
/// header yields [`LastModified::UNKNOWN`]. For `file://` urls the file's own
/// modification time is used.
#[instrument(skip(client, credentials), fields(url = %url))]
pub async fn probe_last_modified(
    client: &ClientWithMiddleware,
    url: &Url,
    credentials: Option<&Credentials>,
) -> Result<LastModified, UrlError> {
    match url.scheme() {
        "file" => {
            let path = url
                .to_file_path()
                .map_err(|_| UrlError::InvalidFileUrl(url.clone()))?;
            let metadata = async_fs::metadata(&path).await?;
            Ok(LastModified::from_system_time(metadata.modified()?))
        }
        "http" | "https" => {
            let mut response = send(client, Method::HEAD, url, credentials).await?;
            if response.status() == StatusCode::METHOD_NOT_ALLOWED {
                tracing::debug!("HEAD is not allowed, probing with GET");
                response = send(client, Method::GET, url, credentials).await?;
            }
            if !response.status().is_success() {
                return Err(UrlError::HttpStatus {
                    url: url.clone(),
                    status: response.status(),
                });
            }
            let last_modified = parse_last_modified(response.headers());
            tracing::debug!("remote last modified: {last_modified}");
            Ok(last_modified)
        }
        other => Err(UrlError::UnsupportedScheme(other.to_string())),
    }
}

async fn send(
    client: &ClientWithMiddleware,
    method: Method,
    url: &Url,
    credentials: Option<&Credentials>,
) -> Result<reqwest::Response, UrlError> {
    let request = client
        .request(method, url.clone())
        .header(CACHE_CONTROL, "no-cache");
    Ok(authenticate(request, credentials).send().await?)
}

fn parse_last_modified(headers: &HeaderMap) -> LastModified {
    headers
        .get(LAST_MODIFIED)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
        .map(|datetime| LastModified::from_datetime(datetime.with_timezone(&Utc)))
        .unwrap_or(LastModified::UNKNOWN)
}
