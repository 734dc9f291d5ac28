//! Persisted runs.
//!
//! Every `arcfetch fetch` invocation is a [`Run`]. Completed runs carry the
//! remote times observed for each source, which is what the change detector
//! compares against on the next poll.
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use arcfetch_consts::consts;
use chrono::{DateTime, Utc};
use fs_err::tokio as async_fs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::freshness::{FreshnessRecord, LastModified};

#[derive(Debug, Error)]
pub enum RunLedgerError {
    #[error("failed to access the run ledger")]
    Io(#[from] std::io::Error),

    #[error("run record '{}' is corrupt", .0.display())]
    Corrupt(PathBuf, #[source] serde_json::Error),

    #[error("failed to serialize run {0}")]
    Serialize(u64, #[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Run {
    pub number: u64,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freshness: Option<FreshnessRecord>,
}

impl Run {
    pub fn new(number: u64) -> Self {
        Self {
            number,
            started_at: Utc::now(),
            finished_at: None,
            freshness: None,
        }
    }

    /// Remembers the remote time observed for `identity` in this run.
    pub fn attach_last_modified(&mut self, identity: impl Into<String>, value: LastModified) {
        self.freshness
            .get_or_insert_with(FreshnessRecord::default)
            .insert(identity, value);
    }

    pub fn last_modified(&self, identity: &str) -> Option<LastModified> {
        self.freshness.as_ref()?.get(identity)
    }

    pub fn freshness(&self) -> Option<&FreshnessRecord> {
        self.freshness.as_ref()
    }

    pub fn is_completed(&self) -> bool {
        self.finished_at.is_some()
    }
}

/// Stores runs as `<state dir>/runs/<number>.json`.
#[derive(Debug, Clone)]
pub struct RunLedger {
    root: PathBuf,
}

impl RunLedger {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            root: state_dir.as_ref().join(consts::RUNS_DIR),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_path(&self, number: u64) -> PathBuf {
        self.root.join(format!("{number}.json"))
    }

    /// All run numbers in the ledger, ascending.
    async fn numbers(&self) -> Result<Vec<u64>, RunLedgerError> {
        let mut entries = match async_fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut numbers = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(number) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<u64>().ok())
            {
                numbers.push(number);
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }

    async fn write(&self, run: &Run) -> Result<(), RunLedgerError> {
        let contents = serde_json::to_string_pretty(run)
            .map_err(|err| RunLedgerError::Serialize(run.number, err))?;
        arcfetch_utils::atomic_write(&self.run_path(run.number), contents).await?;
        Ok(())
    }

    pub async fn load(&self, number: u64) -> Result<Run, RunLedgerError> {
        let path = self.run_path(number);
        let contents = async_fs::read_to_string(&path).await?;
        serde_json::from_str(&contents).map_err(|err| RunLedgerError::Corrupt(path, err))
    }

    /// Starts the next run and persists it as in progress.
    pub async fn begin(&self) -> Result<Run, RunLedgerError> {
        let number = self.numbers().await?.last().map_or(1, |last| last + 1);
        let run = Run::new(number);
        self.write(&run).await?;
        tracing::debug!("started run {number}");
        Ok(run)
    }

    /// Marks `run` as finished and persists it.
    pub async fn complete(&self, run: &mut Run) -> Result<(), RunLedgerError> {
        run.finished_at = Some(Utc::now());
        self.write(run).await?;
        tracing::debug!("completed run {}", run.number);
        Ok(())
    }

    /// The most recent run that finished. Runs that were interrupted are
    /// skipped.
    pub async fn last_completed(&self) -> Result<Option<Run>, RunLedgerError> {
        for number in self.numbers().await?.into_iter().rev() {
            let run = self.load(number).await?;
            if run.is_completed() {
                return Ok(Some(run));
            }
        }
        Ok(None)
    }
}
