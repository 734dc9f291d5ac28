use url::Url;

use crate::{
    credentials::Credentials,
    error::{ConfigurationError, UrlError},
    resolver::{ArtifactResolver, ArtifactoryCoordinates},
};

/// Where the artifact of a [`Source`] comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    /// A fixed url.
    Direct { url: Url },
    /// The latest artifact of an Artifactory folder, resolved on every run.
    Artifactory {
        coordinates: ArtifactoryCoordinates,
        version_selector: Option<String>,
    },
}

/// A single configured artifact.
///
/// The identity is the url the source was configured with and keys the
/// source's entry in a run's freshness record.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    identity: String,
    kind: SourceKind,
    credentials: Option<Credentials>,
}

impl Source {
    pub fn direct(url: &str) -> Result<Self, ConfigurationError> {
        let parsed = Url::parse(url).map_err(|source| ConfigurationError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        Ok(Self {
            identity: url.to_string(),
            kind: SourceKind::Direct { url: parsed },
            credentials: None,
        })
    }

    /// An Artifactory folder given as
    /// `<scheme>://<host>/<organization>/<repository>/<folder>`.
    pub fn artifactory(
        base_url: &str,
        version_selector: Option<String>,
    ) -> Result<Self, ConfigurationError> {
        let coordinates = ArtifactoryCoordinates::parse(base_url)?;
        Ok(Self {
            identity: base_url.to_string(),
            ..Self::from_coordinates(coordinates, version_selector)
        })
    }

    pub fn from_coordinates(
        coordinates: ArtifactoryCoordinates,
        version_selector: Option<String>,
    ) -> Self {
        Self {
            identity: coordinates.to_string(),
            kind: SourceKind::Artifactory {
                coordinates,
                version_selector: version_selector.filter(|selector| !selector.is_empty()),
            },
            credentials: None,
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn kind(&self) -> &SourceKind {
        &self.kind
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn is_artifactory(&self) -> bool {
        matches!(self.kind, SourceKind::Artifactory { .. })
    }

    /// The concrete url to fetch in this run.
    pub async fn resolve(&self, resolver: &ArtifactResolver) -> Result<Url, UrlError> {
        match &self.kind {
            SourceKind::Direct { url } => Ok(url.clone()),
            SourceKind::Artifactory {
                coordinates,
                version_selector,
            } => Ok(resolver
                .resolve(coordinates, version_selector.as_deref(), self.credentials())
                .await?),
        }
    }
}
