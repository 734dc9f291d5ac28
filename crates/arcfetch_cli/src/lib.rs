//! # arcfetch CLI
//!
//! - The [`Command`] enum defines the top-level commands available.
//! - The [`execute_command`] function matches on [`Command`] and calls the corresponding logic.
#![deny(clippy::dbg_macro, clippy::unwrap_used)]

use std::{env, io::IsTerminal};

use arcfetch_consts::consts;
use arcfetch_utils::indicatif::global_multi_progress;
use clap::Parser;
use clap::builder::styling::{AnsiColor, Color, Style};
use indicatif::ProgressDrawTarget;
use miette::IntoDiagnostic;
use tracing::level_filters::LevelFilter;

pub mod cli_config;
pub mod fetch;
pub mod poll;
pub mod resolve;

#[derive(Parser, Debug)]
#[command(
    name = "arcfetch",
    version(consts::ARCFETCH_VERSION),
    about = format!("
arcfetch [version {}] - Fetch and extract remote archives when they change.

Every source in arcfetch.toml is probed for its last modification time. Only
sources that changed since the previous extraction are downloaded again.

Basic Usage:
    Fetch everything that changed:
    $ arcfetch fetch

    Check whether a fetch is needed:
    $ arcfetch poll
", consts::ARCFETCH_VERSION),
)]
#[clap(arg_required_else_help = true, styles = get_styles(), disable_help_flag = true)]
pub struct Args {
    #[command(subcommand)]
    command: Command,

    #[clap(flatten)]
    global_options: GlobalOptions,
}

#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Display help information
    #[clap(
        long,
        short,
        global = true,
        action = clap::ArgAction::Help,
        help_heading = consts::CLAP_GLOBAL_OPTIONS
    )]
    help: Option<bool>,

    /// Increase logging verbosity (-v for warnings, -vv for info, -vvv for debug, -vvvv for trace)
    #[clap(short, long, action = clap::ArgAction::Count, global = true, help_heading = consts::CLAP_GLOBAL_OPTIONS)]
    verbose: u8,

    /// Decrease logging verbosity (quiet mode)
    #[clap(short, long, action = clap::ArgAction::Count, global = true, help_heading = consts::CLAP_GLOBAL_OPTIONS)]
    quiet: u8,

    /// Whether the log needs to be colored.
    #[clap(long, default_value = "auto", global = true, env = "ARCFETCH_COLOR", help_heading = consts::CLAP_GLOBAL_OPTIONS)]
    color: ColorOutput,

    /// Hide all progress bars, always turned on if stderr is not a terminal.
    #[clap(long, default_value = "false", global = true, env = "ARCFETCH_NO_PROGRESS", help_heading = consts::CLAP_GLOBAL_OPTIONS)]
    no_progress: bool,
}

impl Args {
    /// Whether to show progress bars or not, based on the terminal and the user's preference.
    fn no_progress(&self) -> bool {
        if !std::io::stderr().is_terminal() {
            true
        } else {
            self.global_options.no_progress
        }
    }

    /// Determine the log level filter based on verbose and quiet counts.
    fn log_level_filter(&self) -> LevelFilter {
        match (self.global_options.quiet, self.global_options.verbose) {
            // Quiet mode overrides verbose
            (q, _) if q > 0 => LevelFilter::OFF,
            (_, 0) => LevelFilter::ERROR,
            (_, 1) => LevelFilter::WARN,
            (_, 2) => LevelFilter::INFO,
            (_, 3) => LevelFilter::DEBUG,
            (_, _) => LevelFilter::TRACE,
        }
    }
}

#[derive(Parser, Debug)]
pub enum Command {
    /// Download and extract every source that changed since the last run.
    Fetch(fetch::Args),
    /// Report whether any source changed since the last completed run.
    Poll(poll::Args),
    /// Print the url of the latest artifact in an Artifactory folder.
    Resolve(resolve::Args),
}

pub async fn execute() -> miette::Result<()> {
    let args = Args::parse();
    let no_progress = args.no_progress();

    set_console_colors(&args);

    let use_colors = console::colors_enabled_stderr();
    let in_ci = matches!(env::var("CI").as_deref(), Ok("1" | "true"));
    miette::set_hook(Box::new(move |_| {
        Box::new(
            miette::MietteHandlerOpts::default()
                .color(use_colors)
                .wrap_lines(!in_ci)
                .build(),
        )
    }))?;

    if no_progress {
        global_multi_progress().set_draw_target(ProgressDrawTarget::hidden());
    }

    setup_logging(&args, use_colors)?;

    execute_command(args.command).await
}

/// Maps command enum variants to their actual function handlers.
pub async fn execute_command(command: Command) -> miette::Result<()> {
    match command {
        Command::Fetch(cmd) => fetch::execute(cmd).await,
        Command::Poll(cmd) => poll::execute(cmd).await,
        Command::Resolve(cmd) => resolve::execute(cmd).await,
    }
}

fn setup_logging(args: &Args, use_colors: bool) -> miette::Result<()> {
    use arcfetch_utils::indicatif::IndicatifWriter;
    use tracing_subscriber::{
        EnvFilter, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
    };

    let (level_filter, arcfetch_level) = match args.log_level_filter() {
        LevelFilter::OFF => (LevelFilter::OFF, LevelFilter::OFF),
        LevelFilter::ERROR => (LevelFilter::ERROR, LevelFilter::WARN),
        LevelFilter::WARN => (LevelFilter::WARN, LevelFilter::INFO),
        LevelFilter::INFO => (LevelFilter::INFO, LevelFilter::DEBUG),
        LevelFilter::DEBUG => (LevelFilter::DEBUG, LevelFilter::TRACE),
        LevelFilter::TRACE => (LevelFilter::TRACE, LevelFilter::TRACE),
    };

    let directives = format!(
        "arcfetch={arcfetch_level},arcfetch_cli={arcfetch_level},arcfetch_url={arcfetch_level}"
    );

    // `-v`/`-q` take precedence, otherwise RUST_LOG is appended to the defaults.
    let cli_verbosity_set = args.global_options.verbose > 0 || args.global_options.quiet > 0;
    let env_directives = env::var("RUST_LOG").unwrap_or_default();
    let final_directives = if cli_verbosity_set || env_directives.is_empty() {
        directives
    } else {
        format!("{directives},{env_directives}")
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .parse(&final_directives)
        .into_diagnostic()?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(use_colors)
        .with_target(arcfetch_level >= LevelFilter::DEBUG)
        .with_writer(IndicatifWriter::new(global_multi_progress()))
        .without_time();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
    Ok(())
}

/// Whether to use colored log format.
/// Option `Auto` enables color output only if the logging is done to a terminal
/// and `NO_COLOR` environment variable is not set.
#[derive(clap::ValueEnum, Debug, Clone, Default)]
pub enum ColorOutput {
    Always,
    Never,

    #[default]
    Auto,
}

fn set_console_colors(args: &Args) {
    // FORCE_COLOR and NO_COLOR take precedence over the flag and ARCFETCH_COLOR.
    let color = match env::var("FORCE_COLOR") {
        Ok(_) => &ColorOutput::Always,
        Err(_) => match env::var("NO_COLOR") {
            Ok(_) => &ColorOutput::Never,
            Err(_) => &args.global_options.color,
        },
    };

    match color {
        ColorOutput::Always => {
            console::set_colors_enabled(true);
            console::set_colors_enabled_stderr(true);
        }
        ColorOutput::Never => {
            console::set_colors_enabled(false);
            console::set_colors_enabled_stderr(false);
        }
        ColorOutput::Auto => {}
    };
}

pub fn get_styles() -> clap::builder::Styles {
    clap::builder::Styles::styled()
        .usage(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::BrightGreen))),
        )
        .header(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::BrightGreen))),
        )
        .literal(Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightCyan))))
        .invalid(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .error(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .valid(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Green))),
        )
        .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightCyan))))
}
