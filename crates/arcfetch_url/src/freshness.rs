//! Tracks the remote modification time an extracted artifact was taken from.
//!
//! For every artifact a hidden marker file `.<file name>-timestamp` lives in
//! the destination. The marker's content is irrelevant, its modification time
//! is the remote `Last-Modified` value the destination was last populated
//! from.
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use arcfetch_consts::consts;
use chrono::{DateTime, Utc};
use filetime::FileTime;
use fs_err as fs;
use serde::{Deserialize, Serialize};

/// A remote modification time in milliseconds since the unix epoch.
///
/// `0` means the remote did not report a time. An unknown time never matches
/// anything, so the artifact is always considered stale.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LastModified(i64);

impl LastModified {
    pub const UNKNOWN: LastModified = LastModified(0);

    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn as_millis(self) -> i64 {
        self.0
    }

    pub fn is_unknown(self) -> bool {
        self.0 == 0
    }

    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime.timestamp_millis())
    }

    pub fn from_system_time(time: SystemTime) -> Self {
        let millis = match time.duration_since(UNIX_EPOCH) {
            Ok(after) => after.as_millis() as i64,
            Err(before) => -(before.duration().as_millis() as i64),
        };
        Self(millis)
    }

    fn from_file_time(time: FileTime) -> Self {
        Self(time.unix_seconds() * 1000 + i64::from(time.nanoseconds() / 1_000_000))
    }

    fn to_file_time(self) -> FileTime {
        let seconds = self.0.div_euclid(1000);
        let nanos = (self.0.rem_euclid(1000) * 1_000_000) as u32;
        FileTime::from_unix_time(seconds, nanos)
    }
}

impl Display for LastModified {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_unknown() {
            return write!(f, "unknown");
        }
        match DateTime::<Utc>::from_timestamp_millis(self.0) {
            Some(datetime) => write!(f, "{}", datetime.to_rfc3339()),
            None => write!(f, "{}ms", self.0),
        }
    }
}

/// The marker files of one destination directory.
#[derive(Debug, Clone)]
pub struct FreshnessStore {
    destination: PathBuf,
}

impl FreshnessStore {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// The marker that belongs to the artifact named `artifact`.
    pub fn marker_path(&self, artifact: &str) -> PathBuf {
        self.destination.join(format!(
            "{}{artifact}{}",
            consts::MARKER_PREFIX,
            consts::MARKER_SUFFIX
        ))
    }

    /// Returns the recorded time, or `None` if there is no marker.
    pub fn load(&self, artifact: &str) -> Option<LastModified> {
        let path = self.marker_path(artifact);
        match fs::metadata(&path) {
            Ok(metadata) => Some(LastModified::from_file_time(
                FileTime::from_last_modification_time(&metadata),
            )),
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    tracing::warn!("failed to read freshness marker: {err}");
                }
                None
            }
        }
    }

    /// True if the destination was populated from exactly `remote`.
    pub fn is_current(&self, artifact: &str, remote: LastModified) -> bool {
        !remote.is_unknown() && self.load(artifact) == Some(remote)
    }

    /// Creates or touches the marker and sets its modification time to
    /// `remote`.
    pub fn record(&self, artifact: &str, remote: LastModified) -> std::io::Result<()> {
        fs::create_dir_all(&self.destination)?;
        let path = self.marker_path(artifact);
        fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        filetime::set_file_mtime(&path, remote.to_file_time())
    }
}

/// The remote times observed during a run, keyed by source identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FreshnessRecord(BTreeMap<String, LastModified>);

impl FreshnessRecord {
    pub fn insert(&mut self, identity: impl Into<String>, last_modified: LastModified) {
        self.0.insert(identity.into(), last_modified);
    }

    pub fn get(&self, identity: &str) -> Option<LastModified> {
        self.0.get(identity).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, LastModified)> {
        self.0.iter().map(|(identity, value)| (identity.as_str(), *value))
    }
}
