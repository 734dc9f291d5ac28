//! Finds the newest artifact of an Artifactory folder.
//!
//! Artifacts are expected to be named `<folder>-<build number>.zip`. Without a
//! version selector the server sorts by modification time and the first hit
//! wins. With a selector `s`, every `<folder>-<s>*.zip` is fetched and the one
//! with the highest build number wins.
use std::{
    fmt::{Display, Formatter},
    sync::Arc,
};

use arcfetch_consts::consts;
use reqwest::header::CONTENT_TYPE;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;

use crate::{
    credentials::{Credentials, authenticate},
    error::{ConfigurationError, QueryFailure, ResolveError},
};

/// Where the artifacts of one folder live.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactoryCoordinates {
    pub scheme: String,
    pub host: String,
    pub organization: String,
    pub repository: String,
    pub folder: String,
}

impl ArtifactoryCoordinates {
    /// Parses `<scheme>://<host>/<organization>/<repository>/<folder>`. The
    /// scheme defaults to `https` when omitted.
    pub fn parse(base_url: &str) -> Result<Self, ConfigurationError> {
        let shape_error = || ConfigurationError::RepositoryUrlShape {
            url: base_url.to_string(),
        };

        let trimmed = base_url.trim();
        let (scheme, rest) = match trimmed.split_once("://") {
            Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
            None => ("https".to_string(), trimmed),
        };
        if scheme != "http" && scheme != "https" {
            return Err(shape_error());
        }

        let segments: Vec<&str> = rest.trim_end_matches('/').split('/').collect();
        let [host, organization, repository, folder] = segments.as_slice() else {
            return Err(shape_error());
        };
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(shape_error());
        }

        Url::parse(&format!("{scheme}://{host}/")).map_err(|source| {
            ConfigurationError::InvalidUrl {
                url: base_url.to_string(),
                source,
            }
        })?;

        Ok(Self {
            scheme,
            host: host.to_string(),
            organization: organization.to_string(),
            repository: repository.to_string(),
            folder: folder.to_string(),
        })
    }

    pub fn search_endpoint(&self) -> Result<Url, ResolveError> {
        let endpoint = format!(
            "{}://{}/{}/{}",
            self.scheme,
            self.host,
            self.organization,
            consts::AQL_SEARCH_PATH
        );
        Url::parse(&endpoint).map_err(|_| ResolveError::InvalidArtifactUrl(endpoint))
    }

    /// The file name pattern artifacts are matched against.
    pub fn name_pattern(&self, version_selector: Option<&str>) -> String {
        format!("{}-{}*.zip", self.folder, version_selector.unwrap_or_default())
    }

    /// The AQL search expression for this folder.
    pub fn query(&self, version_selector: Option<&str>) -> String {
        let find = format!(
            r#"items.find( {{ "repo":"{}", "name":{{"$match" : "{}" }} }})"#,
            self.repository,
            self.name_pattern(version_selector)
        );
        match version_selector {
            Some(_) => find,
            None => format!(r#"{find}.sort({{"$desc":["modified"]}}).limit(1)"#),
        }
    }

    pub fn artifact_url(&self, result: &SearchResult) -> Result<Url, ResolveError> {
        let url = format!(
            "{}://{}/{}/{}/{}/{}",
            self.scheme, self.host, self.organization, result.repo, result.path, result.name
        );
        Url::parse(&url).map_err(|_| ResolveError::InvalidArtifactUrl(url))
    }
}

impl Display for ArtifactoryCoordinates {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}://{}/{}/{}/{}",
            self.scheme, self.host, self.organization, self.repository, self.folder
        )
    }
}

/// A single hit of a search query.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchResult {
    pub repo: String,
    pub path: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

/// Extracts the build number from `<anything>-<number>.zip`.
pub fn build_number(name: &str) -> Result<u64, ResolveError> {
    let stem = name.strip_suffix(".zip").unwrap_or(name);
    stem.rsplit_once('-')
        .and_then(|(_, number)| number.parse().ok())
        .ok_or_else(|| ResolveError::MalformedName {
            name: name.to_string(),
        })
}

/// Picks the newest result. Without a selector the server already sorted the
/// results, otherwise the highest build number wins.
pub fn select_latest(
    results: Vec<SearchResult>,
    version_selector: Option<&str>,
) -> Result<Option<SearchResult>, ResolveError> {
    if version_selector.is_none() {
        return Ok(results.into_iter().next());
    }

    let mut numbered = results
        .into_iter()
        .map(|result| build_number(&result.name).map(|number| (number, result)))
        .collect::<Result<Vec<_>, _>>()?;
    numbered.sort_by_key(|(number, _)| *number);
    Ok(numbered.pop().map(|(_, result)| result))
}

/// Resolves Artifactory folders to the url of their latest artifact.
#[derive(Clone)]
pub struct ArtifactResolver {
    client: ClientWithMiddleware,
}

impl ArtifactResolver {
    pub fn new(client: ClientWithMiddleware) -> Self {
        Self { client }
    }

    #[instrument(skip(self, coordinates, credentials), fields(repository = %coordinates))]
    pub async fn resolve(
        &self,
        coordinates: &ArtifactoryCoordinates,
        version_selector: Option<&str>,
        credentials: Option<&Credentials>,
    ) -> Result<Url, ResolveError> {
        let version_selector = version_selector.filter(|selector| !selector.is_empty());
        let endpoint = coordinates.search_endpoint()?;
        let query = coordinates.query(version_selector);
        tracing::debug!("searching with {query}");

        let results = self.search(&endpoint, query, credentials).await?;
        tracing::debug!("search returned {} result(s)", results.len());

        let Some(latest) = select_latest(results, version_selector)? else {
            return Err(ResolveError::NoMatch {
                repository: coordinates.repository.clone(),
                pattern: coordinates.name_pattern(version_selector),
            });
        };

        let url = coordinates.artifact_url(&latest)?;
        tracing::info!("resolved latest artifact {url}");
        Ok(url)
    }

    async fn search(
        &self,
        endpoint: &Url,
        query: String,
        credentials: Option<&Credentials>,
    ) -> Result<Vec<SearchResult>, ResolveError> {
        let failed = |source| ResolveError::QueryTransport {
            url: endpoint.clone(),
            source,
        };

        let request = self
            .client
            .post(endpoint.clone())
            .header(CONTENT_TYPE, "text/plain")
            .body(query);
        let response = authenticate(request, credentials)
            .send()
            .await
            .map_err(|err| failed(QueryFailure::Request(Arc::new(err))))?;

        if !response.status().is_success() {
            return Err(failed(QueryFailure::Status(response.status())));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| failed(QueryFailure::Body(Arc::new(err))))?;
        let response: SearchResponse = serde_json::from_slice(&body)
            .map_err(|err| failed(QueryFailure::Json(Arc::new(err))))?;
        Ok(response.results)
    }
}
