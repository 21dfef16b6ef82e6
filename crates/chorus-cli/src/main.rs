//! `chorus` -- CLI for running prompts through an orchestrated provider pool.
//!
//! Provides the following subcommands:
//!
//! - `chorus run` -- Send a prompt through a pool and stream the result.
//! - `chorus providers` -- List a pool's providers and their eligibility.
//! - `chorus config` -- Show the resolved orchestration policy.

use clap::{Parser, Subcommand};

mod commands;

/// chorus provider orchestration CLI.
#[derive(Parser)]
#[command(name = "chorus", about = "chorus provider orchestration CLI", version)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Send a prompt through a provider pool.
    Run(commands::run::RunArgs),

    /// List the providers in a pool file.
    Providers(commands::providers::ProvidersArgs),

    /// Show the resolved orchestration policy.
    Config(commands::config_cmd::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    match cli.command {
        Commands::Run(args) => commands::run::run(args).await?,
        Commands::Providers(args) => commands::providers::run(args)?,
        Commands::Config(args) => commands::config_cmd::run(args)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "chorus",
            "-v",
            "run",
            "--pool",
            "pool.json",
            "--no-shuffle",
            "--ignore",
            "a",
            "--ignore",
            "b",
            "hello",
            "world",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.prompt, vec!["hello", "world"]);
                assert_eq!(args.ignore, vec!["a", "b"]);
                assert!(args.no_shuffle);
            }
            _ => panic!("expected run"),
        }
    }
}
