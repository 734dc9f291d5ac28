use arcfetch_url::{ArtifactResolver, ArtifactoryCoordinates};
use arcfetch_utils::reqwest::build_reqwest_client;
use clap::Parser;
use miette::{IntoDiagnostic, miette};

use crate::cli_config::{self, ConfigArgs};

/// Print the url of the newest artifact in an Artifactory folder.
#[derive(Parser, Debug)]
#[clap(arg_required_else_help = true)]
pub struct Args {
    /// The folder, as `<host>/<organization>/<repository>/<folder>`
    pub url: String,

    /// Only consider artifacts named `<folder>-<selector>*.zip` and pick the
    /// highest build number among them
    #[arg(long, alias = "latest-version-tag")]
    pub version_selector: Option<String>,

    /// Name of the credentials in the configuration file to authenticate with
    #[arg(long)]
    pub credentials: Option<String>,

    #[clap(flatten)]
    pub config: ConfigArgs,
}

pub async fn execute(args: Args) -> miette::Result<()> {
    let config = args.config.load_or_default()?;
    let coordinates = ArtifactoryCoordinates::parse(&args.url).into_diagnostic()?;

    let credentials = match &args.credentials {
        Some(name) => {
            let credential = config
                .credentials
                .get(name)
                .ok_or_else(|| miette!("unknown credentials '{name}'"))?;
            Some(cli_config::to_credentials(credential)?)
        }
        None => None,
    };

    let client = build_reqwest_client(&config).into_diagnostic()?;
    let url = ArtifactResolver::new(client)
        .resolve(
            &coordinates,
            args.version_selector.as_deref(),
            credentials.as_ref(),
        )
        .await
        .into_diagnostic()?;

    println!("{url}");
    Ok(())
}
