use std::{
    collections::{BTreeMap, BTreeSet as Set},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use arcfetch_consts::consts;
use miette::{IntoDiagnostic, miette};
use serde::{Deserialize, Serialize};
use url::Url;

/// Network related settings.
#[derive(Default, Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkConfig {
    /// How many times a request or an interrupted download is retried.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    /// Read timeout in seconds.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_timeout: Option<u64>,

    /// Skip TLS certificate verification. Only meant for testing or internal
    /// networks.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_no_verify: Option<bool>,
}

/// A named set of credentials that sources can refer to.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct CredentialConfig {
    pub username: String,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Name of an environment variable holding the password.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

impl CredentialConfig {
    /// Returns the password, reading it from the environment when configured
    /// through `password-env`.
    pub fn password(&self) -> miette::Result<Option<String>> {
        match (&self.password, &self.password_env) {
            (Some(password), _) => Ok(Some(password.clone())),
            (None, Some(var)) => std::env::var(var)
                .map(Some)
                .map_err(|_| miette!("environment variable '{var}' is not set")),
            (None, None) => Ok(None),
        }
    }
}

/// How the URL of a source is turned into the artifact to download.
#[derive(Default, Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// The configured URL points at the artifact itself.
    #[default]
    Direct,
    /// The configured URL points at an Artifactory folder, the newest artifact
    /// in it is looked up with a search query.
    Artifactory,
}

/// Explicit Artifactory coordinates, an alternative to an Artifactory folder
/// URL.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct RepositoryConfig {
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    pub host: String,
    pub organization: String,
    pub repository: String,
    pub folder: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryConfig>,

    /// Restricts Artifactory lookups to artifacts named
    /// `<folder>-<selector>*.zip`.
    #[serde(default, alias = "latest-version-tag")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_selector: Option<String>,

    /// Name of an entry in the `[credentials]` table.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
}

impl SourceConfig {
    /// The string identifying this source in freshness records.
    pub fn identity(&self) -> String {
        match (&self.url, &self.repository) {
            (Some(url), _) => url.clone(),
            (None, Some(repo)) => format!(
                "{}://{}/{}/{}/{}",
                repo.scheme.as_deref().unwrap_or("https"),
                repo.host,
                repo.organization,
                repo.repository,
                repo.folder
            ),
            (None, None) => String::new(),
        }
    }

    /// The version selector, with an empty selector treated as absent.
    pub fn version_selector(&self) -> Option<&str> {
        self.version_selector.as_deref().filter(|s| !s.is_empty())
    }

    fn validate(
        &self,
        index: usize,
        credentials: &BTreeMap<String, CredentialConfig>,
    ) -> miette::Result<()> {
        match self.kind {
            SourceKind::Direct => {
                let Some(url) = &self.url else {
                    return Err(miette!("source #{index} has no `url`"));
                };
                Url::parse(url)
                    .map_err(|e| miette!("source #{index} has an invalid url '{url}': {e}"))?;
                if self.repository.is_some() {
                    return Err(miette!(
                        "source #{index}: `repository` is only supported for `kind = \"artifactory\"`"
                    ));
                }
                if self.version_selector().is_some() {
                    return Err(miette!(
                        "source #{index}: `version-selector` is only supported for `kind = \"artifactory\"`"
                    ));
                }
            }
            SourceKind::Artifactory => match (&self.url, &self.repository) {
                (Some(_), Some(_)) => {
                    return Err(miette!(
                        "source #{index} sets both `url` and `repository`, use only one of them"
                    ));
                }
                (None, None) => {
                    return Err(miette!("source #{index} needs either `url` or `repository`"));
                }
                _ => {}
            },
        }

        if let Some(name) = &self.credentials {
            if !credentials.contains_key(name) {
                return Err(miette!(
                    "source #{index} refers to unknown credentials '{name}'"
                ));
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no file was found at {0}")]
    FileNotFound(PathBuf),
    #[error("failed to read config from '{0}'")]
    ReadError(std::io::Error),
    #[error("failed to parse config of {1}: {0}")]
    ParseError(miette::Report, PathBuf),
    #[error("validation error of {1}: {0}")]
    ValidationError(miette::Report, PathBuf),
}

#[derive(Default, Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Directory the artifacts are extracted into.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,

    /// Directory holding the run ledger.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    /// Empty the destination before any source is processed.
    #[serde(default)]
    pub clear_workspace: bool,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub credentials: BTreeMap<String, CredentialConfig>,

    #[serde(default, rename = "source")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceConfig>,

    /// The files this config was loaded from.
    #[serde(skip)]
    pub loaded_from: Vec<PathBuf>,
}

impl Config {
    /// Parse the given toml string and return a Config instance.
    ///
    /// # Returns
    ///
    /// The parsed config, and the unused keys
    ///
    /// # Errors
    ///
    /// Parsing errors
    #[inline]
    pub fn from_toml(toml: &str) -> miette::Result<(Config, Set<String>)> {
        let de = toml_edit::de::Deserializer::from_str(toml).into_diagnostic()?;

        let mut unused_keys = Set::new();
        let config: Config = serde_ignored::deserialize(de, |path| {
            unused_keys.insert(path.to_string());
        })
        .into_diagnostic()?;

        Ok((config, unused_keys))
    }

    /// Load the config from the given path.
    ///
    /// # Errors
    ///
    /// I/O errors, parsing errors or validation errors
    pub fn from_path(path: &Path) -> Result<Config, ConfigError> {
        tracing::debug!("Loading config from {}", path.display());
        let s = match fs_err::read_to_string(path) {
            Ok(content) => content,
            Err(e)
                if e.kind() == std::io::ErrorKind::NotFound
                    || e.kind() == std::io::ErrorKind::NotADirectory =>
            {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(ConfigError::ReadError(e)),
        };

        let (mut config, unused_keys) =
            Config::from_toml(&s).map_err(|e| ConfigError::ParseError(e, path.to_path_buf()))?;

        if !unused_keys.is_empty() {
            tracing::warn!(
                "Ignoring '{}' in {}",
                console::style(
                    unused_keys
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
                .yellow(),
                path.display()
            );
        }

        config.loaded_from.push(path.to_path_buf());

        config
            .validate()
            .map_err(|e| ConfigError::ValidationError(e, path.to_path_buf()))?;

        tracing::debug!("Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Validate the config.
    pub fn validate(&self) -> miette::Result<()> {
        for (name, credential) in &self.credentials {
            if credential.password.is_some() && credential.password_env.is_some() {
                return Err(miette!(
                    "credentials '{name}' set both `password` and `password-env`"
                ));
            }
        }

        for (index, source) in self.sources.iter().enumerate() {
            source.validate(index + 1, &self.credentials)?;
        }

        Ok(())
    }

    /// Directory that relative paths in this config are resolved against.
    fn base_dir(&self) -> PathBuf {
        self.loaded_from
            .last()
            .and_then(|path| path.parent())
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// The directory artifacts are extracted into.
    pub fn destination(&self) -> PathBuf {
        self.base_dir().join(
            self.destination
                .clone()
                .unwrap_or_else(|| PathBuf::from(consts::DEFAULT_DESTINATION)),
        )
    }

    /// The directory holding the run ledger.
    pub fn state_dir(&self) -> PathBuf {
        self.base_dir().join(
            self.state_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(consts::DEFAULT_STATE_DIR)),
        )
    }

    pub fn max_retries(&self) -> u32 {
        self.network
            .max_retries
            .unwrap_or(consts::DEFAULT_MAX_RETRIES)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(
            self.network
                .read_timeout
                .unwrap_or(consts::DEFAULT_READ_TIMEOUT_SECS),
        )
    }

    pub fn tls_no_verify(&self) -> bool {
        self.network.tls_no_verify.unwrap_or(false)
    }

    /// Look up the credentials a source refers to.
    pub fn credentials_for(&self, source: &SourceConfig) -> Option<&CredentialConfig> {
        source
            .credentials
            .as_ref()
            .and_then(|name| self.credentials.get(name))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_config_parse() {
        let toml = r#"
destination = "out"
clear-workspace = true
UNUSED = "unused"

[network]
max-retries = 5
read-timeout = 10

[credentials.bot]
username = "bot"
password = "hunter2"

[[source]]
url = "https://example.com/dist/app.tar.gz"
credentials = "bot"

[[source]]
kind = "artifactory"
url = "https://repo.example.com/artifactory/libs-release/app"
latest-version-tag = "rel"
"#;
        let (config, unused) = Config::from_toml(toml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.destination(), PathBuf::from("out"));
        assert_eq!(config.state_dir(), PathBuf::from(consts::DEFAULT_STATE_DIR));
        assert!(config.clear_workspace);
        assert_eq!(config.max_retries(), 5);
        assert_eq!(config.read_timeout(), Duration::from_secs(10));
        assert!(!config.tls_no_verify());
        assert!(unused.contains("UNUSED"));

        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].kind, SourceKind::Direct);
        assert_eq!(
            config.credentials_for(&config.sources[0]).unwrap().username,
            "bot"
        );
        assert_eq!(config.sources[1].kind, SourceKind::Artifactory);
        assert_eq!(config.sources[1].version_selector(), Some("rel"));
    }

    #[test]
    fn test_empty_version_selector_is_legacy() {
        let toml = r#"
[[source]]
kind = "artifactory"
url = "https://repo.example.com/artifactory/libs-release/app"
version-selector = ""
"#;
        let (config, _) = Config::from_toml(toml).unwrap();
        assert_eq!(config.sources[0].version_selector(), None);
    }

    #[test]
    fn test_structured_repository_identity() {
        let toml = r#"
[[source]]
kind = "artifactory"
repository = { host = "repo.example.com", organization = "artifactory", repository = "libs-release", folder = "app" }
"#;
        let (config, _) = Config::from_toml(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(
            config.sources[0].identity(),
            "https://repo.example.com/artifactory/libs-release/app"
        );
    }

    #[rstest]
    #[case::missing_url("[[source]]\ncredentials = \"x\"\n", "has no `url`")]
    #[case::invalid_url("[[source]]\nurl = \"not a url\"\n", "invalid url")]
    #[case::unknown_credentials(
        "[[source]]\nurl = \"https://example.com/a.zip\"\ncredentials = \"nope\"\n",
        "unknown credentials 'nope'"
    )]
    #[case::selector_on_direct(
        "[[source]]\nurl = \"https://example.com/a.zip\"\nversion-selector = \"rel\"\n",
        "only supported for `kind = \"artifactory\"`"
    )]
    #[case::artifactory_without_location("[[source]]\nkind = \"artifactory\"\n", "needs either")]
    #[case::double_password(
        "[credentials.bot]\nusername = \"bot\"\npassword = \"a\"\npassword-env = \"B\"\n",
        "both `password` and `password-env`"
    )]
    fn test_config_validation(#[case] toml: &str, #[case] expected: &str) {
        let (config, _) = Config::from_toml(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(
            err.to_string().contains(expected),
            "'{err}' does not contain '{expected}'"
        );
    }

    #[test]
    fn test_password_from_env() {
        let credential = CredentialConfig {
            username: "bot".to_string(),
            password: None,
            password_env: Some("ARCFETCH_TEST_PASSWORD".to_string()),
        };
        temp_env::with_var("ARCFETCH_TEST_PASSWORD", Some("s3cret"), || {
            assert_eq!(credential.password().unwrap().as_deref(), Some("s3cret"));
        });
        temp_env::with_var_unset("ARCFETCH_TEST_PASSWORD", || {
            assert!(credential.password().is_err());
        });
    }

    #[test]
    fn test_from_path_resolves_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(consts::CONFIG_FILE);
        fs_err::write(&path, "destination = \"ws\"\n").unwrap();

        let config = Config::from_path(&path).unwrap();
        assert_eq!(config.destination(), dir.path().join("ws"));
        assert_eq!(config.state_dir(), dir.path().join(consts::DEFAULT_STATE_DIR));
        assert_eq!(config.loaded_from, vec![path]);
    }

    #[test]
    fn test_from_path_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_path(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
