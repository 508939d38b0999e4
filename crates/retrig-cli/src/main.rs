//! Retrig CLI entrypoint.

use clap::Parser;
use console::style;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod handlers;

use commands::{Commands, ConfigCommands};
use config::CliConfig;
use handlers::Context;

#[derive(Parser)]
#[command(name = "retrig")]
#[command(author, version, about = "Trigger CI jobs on the revisions that need them", long_about = None)]
struct Cli {
    /// CI world snapshot to run against (overrides the configured one)
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    /// More logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = if verbose == 0 {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
    } else {
        EnvFilter::new(default)
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = CliConfig::load().unwrap_or_default();

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("✗").red(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: CliConfig) -> Result<(), Box<dyn std::error::Error>> {
    let connect = || Context::connect(&config, cli.snapshot.clone());

    match cli.command {
        Commands::Trigger {
            builder,
            revision,
            times,
            files,
            no_build,
            dry_run,
        } => handlers::trigger(&connect()?, builder, revision, times, files, no_build, dry_run).await?,
        Commands::Range {
            builder,
            from,
            to,
            times,
            dry_run,
        } => handlers::range(&connect()?, builder, from, to, times, dry_run).await?,
        Commands::Backfill {
            builder,
            revision,
            max_revisions,
            auto,
            dry_run,
        } => {
            handlers::backfill(&mut connect()?, builder, revision, max_revisions, auto, dry_run)
                .await?
        }
        Commands::Missing {
            repo,
            revision,
            dry_run,
        } => handlers::missing(&connect()?, repo, revision, dry_run).await?,
        Commands::Suite {
            repo,
            revision,
            suite,
            times,
            dry_run,
        } => handlers::suite(&connect()?, repo, revision, suite, times, dry_run).await?,
        Commands::Cancel { repo, request_id } => {
            handlers::cancel(&connect()?, repo, request_id).await?
        }
        Commands::Builders { filter } => handlers::list_builders(&connect()?, filter).await?,
        Commands::Revisions { repo, from, to } => {
            handlers::revisions(&connect()?, repo, from, to).await?
        }
        Commands::Schema => handlers::schema()?,
        Commands::Config { command } => match command {
            ConfigCommands::Show => handlers::show_config(&config)?,
            ConfigCommands::Set { key, value } => handlers::set_config(&key, &value)?,
        },
    }

    Ok(())
}
