//! Conditionally download and unpack archives from arbitrary URLs.
//!
//! A [`Source`] is fetched by the [`FetchExtractEngine`] only when the remote
//! reports a modification time that differs from the one recorded by the
//! previous successful extraction. The [`ChangeDetector`] answers the same
//! question without downloading anything, and the [`ArtifactResolver`] finds
//! the newest artifact of an Artifactory folder.

mod credentials;
mod download;
pub mod engine;
mod error;
pub mod extract;
pub mod freshness;
pub mod poll;
mod probe;
pub mod progress;
pub mod resolver;
pub mod run;
mod source;
mod util;

pub use credentials::Credentials;
pub use engine::{EngineError, FetchExtractEngine, FetchReport, SourceOutcome, Stage};
pub use error::{ConfigurationError, ExtractError, QueryFailure, ResolveError, UrlError};
pub use extract::ArchiveKind;
pub use freshness::{FreshnessRecord, FreshnessStore, LastModified};
pub use poll::{ChangeDetector, PollingResult};
pub use probe::probe_last_modified;
pub use progress::{MultiProgressHandler, NoProgressHandler, ProgressHandler};
pub use resolver::{ArtifactResolver, ArtifactoryCoordinates, SearchResult};
pub use run::{Run, RunLedger, RunLedgerError};
pub use source::{Source, SourceKind};
