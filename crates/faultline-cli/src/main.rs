#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::Workspace;
use output::{OutputMode, resolve_output_mode};
use std::env;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "faultline: error-notice intake and deduplicated tracking records",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    /// Config file to use instead of discovering `.faultline/config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Create .faultline/ with a starter config and store",
        after_help = "EXAMPLES:\n    # Initialize in the current directory\n    fl init --api-key s3cret --project shop"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Show the resolved configuration"
    )]
    Config(cmd::config::ConfigArgs),

    #[command(
        next_help_heading = "Intake",
        about = "Ingest one error notice",
        long_about = "Decode a notice body, check its api key and reconcile it into a tracking record.\nPrints the endpoint response; exits non-zero unless the status is 200.",
        after_help = "EXAMPLES:\n    # v2 XML from a file\n    fl ingest --file notice.xml\n\n    # Legacy YAML from stdin\n    cat notice.yml | fl ingest --legacy"
    )]
    Ingest(cmd::ingest::IngestArgs),

    #[command(next_help_heading = "Records", about = "List tracking records")]
    List(cmd::list::ListArgs),

    #[command(next_help_heading = "Records", about = "Show one tracking record")]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Records",
        about = "Close tracking records",
        after_help = "EXAMPLES:\n    fl close 12\n    fl close 12 13 --status Rejected"
    )]
    Close(cmd::close::CloseArgs),

    #[command(next_help_heading = "Records", about = "List pending outbound notifications")]
    Outbox(cmd::outbox::OutboxArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("FAULTLINE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "faultline_core=debug,fl=debug,info"
        } else {
            "faultline_core=info,warn"
        })
    });

    let format = env::var("FAULTLINE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cwd = env::current_dir()?;
    let output = cli.output_mode();
    debug!(?output, command = ?cli.command, "starting");

    let workspace = || Workspace::load(cli.config.as_deref(), &cwd);
    match &cli.command {
        Commands::Init(args) => cmd::init::run_init(args, output, &cwd),
        Commands::Config(args) => cmd::config::run_config(args, output, &workspace()?),
        Commands::Ingest(args) => cmd::ingest::run_ingest(args, output, &workspace()?),
        Commands::List(args) => cmd::list::run_list(args, output, &workspace()?),
        Commands::Show(args) => cmd::show::run_show(args, output, &workspace()?),
        Commands::Close(args) => cmd::close::run_close(args, output, &workspace()?),
        Commands::Outbox(args) => cmd::outbox::run_outbox(args, output, &workspace()?),
    }
}
