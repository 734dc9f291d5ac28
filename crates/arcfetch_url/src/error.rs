use std::sync::Arc;

use reqwest::StatusCode;
use reqwest_middleware::Error as ReqwestMiddlewareError;
use thiserror::Error;
use url::Url;

/// Errors that can occur while fetching and unpacking a source.
#[derive(Debug, Clone, Error)]
pub enum UrlError {
    #[error(transparent)]
    Io(Arc<std::io::Error>),

    #[error("failed to download {url}: {status}")]
    HttpStatus { url: Url, status: StatusCode },

    #[error(transparent)]
    Reqwest(Arc<reqwest::Error>),

    #[error(transparent)]
    ReqwestMiddleware(Arc<ReqwestMiddlewareError>),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("'{0}' does not point to a local file")]
    InvalidFileUrl(Url),

    #[error("unsupported url scheme '{0}'")]
    UnsupportedScheme(String),

    #[error(transparent)]
    Join(Arc<tokio::task::JoinError>),
}

impl UrlError {
    /// Whether retrying the failed transfer may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            UrlError::Reqwest(err) => {
                err.is_timeout() || err.is_connect() || err.is_body() || err.is_request()
            }
            UrlError::ReqwestMiddleware(err) => match err.as_ref() {
                ReqwestMiddlewareError::Reqwest(err) => {
                    err.is_timeout() || err.is_connect() || err.is_body() || err.is_request()
                }
                ReqwestMiddlewareError::Middleware(_) => false,
            },
            UrlError::HttpStatus { status, .. } => {
                status.is_server_error()
                    || *status == StatusCode::REQUEST_TIMEOUT
                    || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

impl From<std::io::Error> for UrlError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for UrlError {
    fn from(err: reqwest::Error) -> Self {
        Self::Reqwest(Arc::new(err))
    }
}

impl From<ReqwestMiddlewareError> for UrlError {
    fn from(err: ReqwestMiddlewareError) -> Self {
        Self::ReqwestMiddleware(Arc::new(err))
    }
}

impl From<tokio::task::JoinError> for UrlError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Join(Arc::new(err))
    }
}

/// Errors emitted while unpacking an archive.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Io(Arc<std::io::Error>),

    #[error("failed to extract tar archive: {0}")]
    TarExtractionError(String),

    #[error("failed to extract zip archive: {0}")]
    ZipExtractionError(String),

    #[error("invalid zip archive: {0}")]
    InvalidZip(String),

    #[error("archive entry '{entry}' would be written outside of the destination")]
    PathEscape { entry: String },
}

impl From<std::io::Error> for ExtractError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

/// Why a search query against the artifact index failed.
#[derive(Debug, Clone, Error)]
pub enum QueryFailure {
    #[error(transparent)]
    Request(Arc<ReqwestMiddlewareError>),

    #[error(transparent)]
    Body(Arc<reqwest::Error>),

    #[error("the server responded with {0}")]
    Status(StatusCode),

    #[error("the response is not a valid search result: {0}")]
    Json(Arc<serde_json::Error>),
}

/// Errors of the latest-artifact lookup.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("artifact search at {url} failed")]
    QueryTransport {
        url: Url,
        #[source]
        source: QueryFailure,
    },

    #[error("no artifact in repository '{repository}' matches '{pattern}'")]
    NoMatch { repository: String, pattern: String },

    #[error("artifact name '{name}' does not end with a numeric build identifier")]
    MalformedName { name: String },

    #[error("'{0}' is not a valid artifact url")]
    InvalidArtifactUrl(String),
}

/// Misconfigured sources. These are detected when a source is constructed and
/// abort the run.
#[derive(Debug, Clone, Error)]
pub enum ConfigurationError {
    #[error(
        "'{url}' is not an Artifactory folder url, expected <host>/<organization>/<repository>/<folder>"
    )]
    RepositoryUrlShape { url: String },

    #[error("invalid url '{url}'")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}
