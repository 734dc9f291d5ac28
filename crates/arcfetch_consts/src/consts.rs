use std::{
    fmt::{Display, Formatter},
    sync::LazyLock,
};

use console::Style;

pub const ARCFETCH_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const CONFIG_FILE: &str = "arcfetch.toml";
pub const DEFAULT_DESTINATION: &str = "workspace";
pub const DEFAULT_STATE_DIR: &str = ".arcfetch";
pub const RUNS_DIR: &str = "runs";

/// Freshness markers are named `.<file name>-timestamp`.
pub const MARKER_PREFIX: &str = ".";
pub const MARKER_SUFFIX: &str = "-timestamp";

/// Prefix of the hidden directories archives are unpacked into before they are
/// promoted into the destination.
pub const STAGING_PREFIX: &str = ".arcfetch-staging-";

/// Path of the Artifactory search endpoint, relative to `<host>/<organization>`.
pub const AQL_SEARCH_PATH: &str = "api/search/aql";

/// Default number of retries for requests and interrupted downloads.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default read timeout for network operations, in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 5 * 60;

pub const CLAP_GLOBAL_OPTIONS: &str = "Global Options";
pub const CLAP_CONFIG_OPTIONS: &str = "Config Options";

pub static SOURCE_STYLE: LazyLock<Style> = LazyLock::new(|| Style::new().cyan());
pub static STAGE_STYLE: LazyLock<Style> = LazyLock::new(|| Style::new().magenta());
pub static TIMESTAMP_STYLE: LazyLock<Style> = LazyLock::new(|| Style::new().yellow());

pub struct UpdatedEmoji;

impl Display for UpdatedEmoji {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if console::Term::stderr().features().colors_supported() {
            write!(f, "{}", console::style("✔").bold().green())
        } else {
            write!(f, "(updated)")
        }
    }
}

pub struct FailedEmoji;

impl Display for FailedEmoji {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if console::Term::stderr().features().colors_supported() {
            write!(f, "{}", console::style("✘").bold().red())
        } else {
            write!(f, "(failed)")
        }
    }
}
