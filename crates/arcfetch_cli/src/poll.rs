use arcfetch_url::{ChangeDetector, RunLedger};
use arcfetch_utils::reqwest::build_reqwest_client;
use clap::Parser;
use miette::IntoDiagnostic;

use crate::cli_config::{self, ConfigArgs};

/// Check whether any source changed since the last completed fetch, without
/// downloading anything.
///
/// Prints `trigger-build` if there is no previous run or the destination is
/// gone, `significant-change` if a remote changed and `no-changes` otherwise.
#[derive(Parser, Debug)]
pub struct Args {
    #[clap(flatten)]
    pub config: ConfigArgs,
}

pub async fn execute(args: Args) -> miette::Result<()> {
    let config = args.config.load()?;
    let sources = cli_config::sources(&config)?;

    let ledger = RunLedger::new(config.state_dir());
    let previous = ledger.last_completed().await.into_diagnostic()?;

    let client = build_reqwest_client(&config).into_diagnostic()?;
    let destination = config.destination();
    let result = ChangeDetector::new(client)
        .compare_remote(&sources, previous.as_ref(), Some(&destination))
        .await;

    println!("{result}");
    Ok(())
}
