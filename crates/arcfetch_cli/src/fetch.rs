use std::sync::Arc;

use arcfetch_consts::consts;
use arcfetch_url::{FetchExtractEngine, MultiProgressHandler, RunLedger, SourceOutcome};
use arcfetch_utils::{indicatif::global_multi_progress, reqwest::build_reqwest_client};
use clap::Parser;
use miette::{IntoDiagnostic, miette};

use crate::cli_config::{self, ConfigArgs};

/// Download and extract every source whose remote changed since it was last
/// extracted.
///
/// The observed modification times are recorded as a new run, which `poll`
/// compares against.
#[derive(Parser, Debug)]
pub struct Args {
    #[clap(flatten)]
    pub config: ConfigArgs,
}

pub async fn execute(args: Args) -> miette::Result<()> {
    let config = args.config.load()?;
    let sources = cli_config::sources(&config)?;
    if sources.is_empty() {
        tracing::warn!("no sources configured in {}", args.config.config.display());
    }

    let client = build_reqwest_client(&config).into_diagnostic()?;
    let engine = FetchExtractEngine::new(client, config.destination())
        .with_retry_policy(arcfetch_utils::reqwest::retry_policy(&config))
        .with_clear_workspace(config.clear_workspace)
        .with_progress_handler(Arc::new(MultiProgressHandler::new(
            global_multi_progress(),
        )));

    let ledger = RunLedger::new(config.state_dir());
    let mut run = ledger.begin().await.into_diagnostic()?;
    let report = engine.run(&sources, &mut run).await.into_diagnostic()?;
    ledger.complete(&mut run).await.into_diagnostic()?;

    let mut failed = 0;
    for (identity, outcome) in report.outcomes() {
        let identity = consts::SOURCE_STYLE.apply_to(identity);
        match outcome {
            SourceOutcome::Updated {
                last_modified,
                kind,
                ..
            } => eprintln!(
                "{} {identity}: extracted {kind} ({})",
                consts::UpdatedEmoji,
                consts::TIMESTAMP_STYLE.apply_to(last_modified)
            ),
            SourceOutcome::UpToDate { last_modified, .. } => eprintln!(
                "  {identity}: up to date ({})",
                consts::TIMESTAMP_STYLE.apply_to(last_modified)
            ),
            SourceOutcome::Failed { stage, error } => {
                failed += 1;
                eprintln!(
                    "{} {identity}: failed while {}: {error}",
                    consts::FailedEmoji,
                    consts::STAGE_STYLE.apply_to(stage)
                );
            }
        }
    }

    if failed > 0 {
        return Err(miette!(
            "{failed} of {} source(s) failed in run {}",
            report.len(),
            run.number
        ));
    }
    Ok(())
}
