//! The conditional fetch and extract loop.
//!
//! Every source goes through the same steps:
//!
//!   - resolve the concrete url (Artifactory folders are searched on every run),
//!   - probe the remote modification time,
//!   - skip the source if the destination's freshness marker matches it,
//!   - otherwise download into a staging directory inside the destination and
//!     unpack there,
//!   - promote the payload into the destination, stripping a single root dir,
//!   - record the freshness marker and attach the time to the run.
//!
//! A failing source is reported and the loop carries on with the next one.
use std::{
    fmt::{Display, Formatter},
    path::{Path, PathBuf},
    sync::Arc,
};

use arcfetch_consts::consts;
use reqwest_middleware::ClientWithMiddleware;
use retry_policies::policies::ExponentialBackoff;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use crate::{
    download,
    error::UrlError,
    extract::{self, ArchiveKind},
    freshness::{FreshnessStore, LastModified},
    probe::probe_last_modified,
    progress::{NoProgressHandler, ProgressHandler},
    resolver::ArtifactResolver,
    run::Run,
    source::Source,
    util::{clear_directory, url_file_name},
};

/// The step a source was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    Probing,
    Extracting,
    Normalizing,
    Recording,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Resolving => write!(f, "resolving"),
            Stage::Probing => write!(f, "probing"),
            Stage::Extracting => write!(f, "extracting"),
            Stage::Normalizing => write!(f, "normalizing"),
            Stage::Recording => write!(f, "recording"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SourceOutcome {
    /// The artifact was downloaded and extracted.
    Updated {
        url: Url,
        last_modified: LastModified,
        kind: ArchiveKind,
    },
    /// The destination already holds the artifact.
    UpToDate {
        url: Url,
        last_modified: LastModified,
    },
    Failed {
        stage: Stage,
        error: UrlError,
    },
}

impl SourceOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, SourceOutcome::Failed { .. })
    }
}

/// The outcome of every source of a run, in the order they were processed.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    outcomes: Vec<(String, SourceOutcome)>,
}

impl FetchReport {
    pub fn push(&mut self, identity: impl Into<String>, outcome: SourceOutcome) {
        self.outcomes.push((identity.into(), outcome));
    }

    pub fn outcomes(&self) -> impl Iterator<Item = (&str, &SourceOutcome)> {
        self.outcomes
            .iter()
            .map(|(identity, outcome)| (identity.as_str(), outcome))
    }

    pub fn get(&self, identity: &str) -> Option<&SourceOutcome> {
        self.outcomes()
            .find(|(id, _)| *id == identity)
            .map(|(_, outcome)| outcome)
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|(_, outcome)| outcome.is_failed())
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to prepare destination '{}'", .0.display())]
    Destination(PathBuf, #[source] std::io::Error),
}

#[derive(Debug)]
struct SourceFailure {
    stage: Stage,
    error: UrlError,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, SourceFailure>;
}

impl<T, E: Into<UrlError>> AtStage<T> for Result<T, E> {
    fn at(self, stage: Stage) -> Result<T, SourceFailure> {
        self.map_err(|err| SourceFailure {
            stage,
            error: err.into(),
        })
    }
}

pub struct FetchExtractEngine {
    client: ClientWithMiddleware,
    resolver: ArtifactResolver,
    destination: PathBuf,
    retry_policy: ExponentialBackoff,
    clear_workspace: bool,
    progress: Arc<dyn ProgressHandler>,
}

impl FetchExtractEngine {
    pub fn new(client: ClientWithMiddleware, destination: impl Into<PathBuf>) -> Self {
        Self {
            resolver: ArtifactResolver::new(client.clone()),
            client,
            destination: destination.into(),
            retry_policy: ExponentialBackoff::builder()
                .build_with_max_retries(consts::DEFAULT_MAX_RETRIES),
            clear_workspace: false,
            progress: Arc::new(NoProgressHandler),
        }
    }

    /// Set the policy used to retry interrupted downloads.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: ExponentialBackoff) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Empty the destination once before any source is processed.
    #[must_use]
    pub fn with_clear_workspace(mut self, clear_workspace: bool) -> Self {
        self.clear_workspace = clear_workspace;
        self
    }

    /// Set the [`ProgressHandler`] to use for downloads and extraction.
    #[must_use]
    pub fn with_progress_handler(mut self, handler: Arc<dyn ProgressHandler>) -> Self {
        self.progress = handler;
        self
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn freshness_store(&self) -> FreshnessStore {
        FreshnessStore::new(&self.destination)
    }

    /// Processes all `sources` in order, attaching the observed remote times
    /// to `run`.
    pub async fn run(&self, sources: &[Source], run: &mut Run) -> Result<FetchReport, EngineError> {
        let prepared = if self.clear_workspace {
            tracing::info!("clearing {}", self.destination.display());
            clear_directory(&self.destination).await
        } else {
            fs_err::tokio::create_dir_all(&self.destination).await
        };
        prepared.map_err(|err| EngineError::Destination(self.destination.clone(), err))?;

        let mut report = FetchReport::default();
        for source in sources {
            let outcome = match self.fetch_source(source, run).await {
                Ok(outcome) => outcome,
                Err(SourceFailure { stage, error }) => {
                    tracing::error!(
                        source = source.identity(),
                        %stage,
                        "failed to fetch source: {error}"
                    );
                    SourceOutcome::Failed { stage, error }
                }
            };
            report.push(source.identity(), outcome);
        }
        Ok(report)
    }

    #[instrument(skip_all, fields(source = %source.identity()))]
    async fn fetch_source(
        &self,
        source: &Source,
        run: &mut Run,
    ) -> Result<SourceOutcome, SourceFailure> {
        let url = source.resolve(&self.resolver).await.at(Stage::Resolving)?;
        let file_name = url_file_name(&url);

        let remote = probe_last_modified(&self.client, &url, source.credentials())
            .await
            .at(Stage::Probing)?;

        let store = self.freshness_store();
        if store.is_current(&file_name, remote) {
            tracing::info!("{file_name} is up to date ({remote})");
            run.attach_last_modified(source.identity(), remote);
            return Ok(SourceOutcome::UpToDate {
                url,
                last_modified: remote,
            });
        }

        match store.load(&file_name) {
            Some(local) => tracing::info!("{file_name} changed ({local} -> {remote})"),
            None => tracing::info!("{file_name} has not been extracted before"),
        }

        if source.is_artifactory() {
            clear_directory(&self.destination)
                .await
                .at(Stage::Extracting)?;
        }

        let kind = ArchiveKind::classify(url.path());
        let staging = tempfile::Builder::new()
            .prefix(consts::STAGING_PREFIX)
            .tempdir_in(&self.destination)
            .at(Stage::Extracting)?;
        let archive = staging.path().join(&file_name);
        let payload = staging.path().join("payload");

        download::download(
            &self.client,
            &url,
            source.credentials(),
            &archive,
            &self.retry_policy,
            self.progress.as_ref(),
        )
        .await
        .at(Stage::Extracting)?;

        tracing::debug!("unpacking {file_name} as {kind}");
        let handler = self.progress.clone();
        let unpack_into = payload.clone();
        let fallback_name = file_name.clone();
        tokio::task::spawn_blocking(move || {
            extract::unpack(kind, &archive, &unpack_into, &fallback_name, handler.as_ref())
        })
        .await
        .at(Stage::Extracting)?
        .at(Stage::Extracting)?;

        let destination = self.destination.clone();
        tokio::task::spawn_blocking(move || extract::promote(&payload, &destination))
            .await
            .at(Stage::Normalizing)?
            .at(Stage::Normalizing)?;
        staging.close().at(Stage::Normalizing)?;

        store.record(&file_name, remote).at(Stage::Recording)?;
        run.attach_last_modified(source.identity(), remote);
        tracing::info!("extracted {file_name} ({remote})");

        Ok(SourceOutcome::Updated {
            url,
            last_modified: remote,
            kind,
        })
    }
}
