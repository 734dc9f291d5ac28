use std::{
    fmt::{Display, Formatter},
    path::Path,
};

use reqwest_middleware::ClientWithMiddleware;

use crate::{probe::probe_last_modified, resolver::ArtifactResolver, run::Run, source::Source};

/// Whether a new run is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingResult {
    /// There is nothing to compare against.
    TriggerBuild,
    NoChanges,
    SignificantChange,
}

impl Display for PollingResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PollingResult::TriggerBuild => write!(f, "trigger-build"),
            PollingResult::NoChanges => write!(f, "no-changes"),
            PollingResult::SignificantChange => write!(f, "significant-change"),
        }
    }
}

/// Compares the remote modification times against those recorded by the
/// previous run, without downloading anything.
pub struct ChangeDetector {
    client: ClientWithMiddleware,
    resolver: ArtifactResolver,
}

impl ChangeDetector {
    pub fn new(client: ClientWithMiddleware) -> Self {
        Self {
            resolver: ArtifactResolver::new(client.clone()),
            client,
        }
    }

    pub async fn compare_remote(
        &self,
        sources: &[Source],
        previous: Option<&Run>,
        destination: Option<&Path>,
    ) -> PollingResult {
        let Some(previous) = previous else {
            tracing::info!("no previous run, a run is required");
            return PollingResult::TriggerBuild;
        };

        if let Some(destination) = destination {
            if !destination.exists() {
                tracing::info!(
                    "destination {} does not exist, a run is required",
                    destination.display()
                );
                return PollingResult::TriggerBuild;
            }
        }

        let Some(record) = previous.freshness() else {
            tracing::info!("run {} did not record any sources", previous.number);
            return PollingResult::SignificantChange;
        };

        for source in sources {
            let identity = source.identity();
            let url = match source.resolve(&self.resolver).await {
                Ok(url) => url,
                Err(err) => {
                    tracing::warn!(source = identity, "failed to resolve source: {err}");
                    continue;
                }
            };
            let remote = match probe_last_modified(&self.client, &url, source.credentials()).await
            {
                Ok(remote) => remote,
                Err(err) => {
                    tracing::warn!(source = identity, "failed to probe {url}: {err}");
                    continue;
                }
            };

            match record.get(identity) {
                Some(recorded) if recorded == remote && !remote.is_unknown() => {
                    tracing::debug!(source = identity, "unchanged since {remote}");
                }
                recorded => {
                    tracing::info!(
                        source = identity,
                        "changed: recorded {}, remote {remote}",
                        recorded.map_or_else(|| "nothing".to_string(), |r| r.to_string())
                    );
                    return PollingResult::SignificantChange;
                }
            }
        }

        PollingResult::NoChanges
    }
}
