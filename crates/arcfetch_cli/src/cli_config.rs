use std::path::PathBuf;

use arcfetch_config::{Config, ConfigError, CredentialConfig, SourceConfig, SourceKind};
use arcfetch_consts::consts;
use arcfetch_url::{ArtifactoryCoordinates, Credentials, Source};
use clap::Parser;
use miette::{IntoDiagnostic, miette};

/// Where to read the configuration from.
#[derive(Parser, Debug, Clone)]
pub struct ConfigArgs {
    /// The configuration file
    #[arg(
        long,
        short,
        env = "ARCFETCH_CONFIG",
        default_value = consts::CONFIG_FILE,
        help_heading = consts::CLAP_CONFIG_OPTIONS
    )]
    pub config: PathBuf,
}

impl ConfigArgs {
    /// Loads and validates the configuration file.
    pub fn load(&self) -> miette::Result<Config> {
        Config::from_path(&self.config).into_diagnostic()
    }

    /// Like [`Self::load`], but falls back to the default configuration when
    /// the file does not exist.
    pub fn load_or_default(&self) -> miette::Result<Config> {
        match Config::from_path(&self.config) {
            Ok(config) => Ok(config),
            Err(ConfigError::FileNotFound(path)) => {
                tracing::debug!("{} not found, using defaults", path.display());
                Ok(Config::default())
            }
            Err(err) => Err(err).into_diagnostic(),
        }
    }
}

/// Reads the password of `credential` and builds request credentials from it.
pub(crate) fn to_credentials(credential: &CredentialConfig) -> miette::Result<Credentials> {
    Ok(Credentials::new(
        credential.username.clone(),
        credential.password()?,
    ))
}

fn credentials(config: &Config, source: &SourceConfig) -> miette::Result<Option<Credentials>> {
    config
        .credentials_for(source)
        .map(to_credentials)
        .transpose()
}

/// Turns the configured sources into [`Source`]s. Fails on the first source
/// that is misconfigured.
pub fn sources(config: &Config) -> miette::Result<Vec<Source>> {
    config
        .sources
        .iter()
        .map(|source_config| {
            let selector = source_config.version_selector().map(str::to_string);
            let source = match (
                source_config.kind,
                &source_config.url,
                &source_config.repository,
            ) {
                (SourceKind::Direct, Some(url), _) => Source::direct(url).into_diagnostic()?,
                (SourceKind::Artifactory, Some(url), _) => {
                    Source::artifactory(url, selector).into_diagnostic()?
                }
                (SourceKind::Artifactory, None, Some(repository)) => Source::from_coordinates(
                    ArtifactoryCoordinates {
                        scheme: repository
                            .scheme
                            .clone()
                            .unwrap_or_else(|| "https".to_string()),
                        host: repository.host.clone(),
                        organization: repository.organization.clone(),
                        repository: repository.repository.clone(),
                        folder: repository.folder.clone(),
                    },
                    selector,
                ),
                _ => return Err(miette!("source '{}' has no url", source_config.identity())),
            };
            Ok(source.with_credentials(credentials(config, source_config)?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use arcfetch_url::SourceKind as UrlSourceKind;

    use super::*;

    const CONFIG: &str = r#"
        [credentials.bot]
        username = "bot"
        password-env = "ARCFETCH_TEST_BOT_TOKEN"

        [[source]]
        url = "https://example.com/dist/app.tar.gz"
        credentials = "bot"

        [[source]]
        kind = "artifactory"
        url = "https://repo.example.com/artifactory/libs-release/app"
        version-selector = "rel"

        [[source]]
        kind = "artifactory"
        repository = { scheme = "http", host = "localhost:8081", organization = "artifactory", repository = "libs", folder = "tool" }
    "#;

    #[test]
    fn test_sources_from_config() {
        let (config, _) = Config::from_toml(CONFIG).unwrap();
        let sources = temp_env::with_var("ARCFETCH_TEST_BOT_TOKEN", Some("secret"), || {
            sources(&config).unwrap()
        });

        assert_eq!(sources.len(), 3);
        assert_eq!(sources[0].identity(), "https://example.com/dist/app.tar.gz");
        let credentials = sources[0].credentials().unwrap();
        assert_eq!(credentials.username(), "bot");
        assert_eq!(credentials.password(), Some("secret"));

        assert!(matches!(
            sources[1].kind(),
            UrlSourceKind::Artifactory { version_selector: Some(selector), .. } if selector == "rel"
        ));
        assert_eq!(sources[1].credentials(), None);

        assert_eq!(
            sources[2].identity(),
            "http://localhost:8081/artifactory/libs/tool"
        );
        assert_eq!(sources[2].identity(), config.sources[2].identity());
    }

    #[test]
    fn test_missing_password_env() {
        let (config, _) = Config::from_toml(CONFIG).unwrap();
        let result = temp_env::with_var_unset("ARCFETCH_TEST_BOT_TOKEN", || sources(&config));
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_artifactory_url() {
        let (config, _) = Config::from_toml(
            r#"
            [[source]]
            kind = "artifactory"
            url = "https://repo.example.com/libs-release"
            "#,
        )
        .unwrap();
        let err = sources(&config).unwrap_err();
        assert!(err.to_string().contains("not an Artifactory folder url"));
    }
}
