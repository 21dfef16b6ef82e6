//! `chorus providers` -- list a pool's providers and whether they are eligible.
//!
//! # Example
//!
//! ```text
//! chorus providers --pool pool.json
//! chorus providers --pool pool.json --stream --ignore flaky
//! ```

use std::path::PathBuf;

use clap::Args;

use chorus_llm::selection::{SelectionInput, is_eligible};
use chorus_llm::{Provider, ProviderDescriptor};

use super::load_pool;

/// Arguments for the `chorus providers` subcommand.
#[derive(Args)]
pub struct ProvidersArgs {
    /// Pool file describing the providers.
    #[arg(long)]
    pub pool: PathBuf,

    /// Evaluate eligibility for a streaming call.
    #[arg(long)]
    pub stream: bool,

    /// Provider to treat as ignored (repeatable).
    #[arg(long)]
    pub ignore: Vec<String>,
}

/// One table row per provider.
pub fn describe(descriptor: &ProviderDescriptor, input: &SelectionInput) -> String {
    format!(
        "{:<20} {:<24} stream={:<5} working={:<5} auth={:<5} eligible={}",
        descriptor.name,
        descriptor.default_model,
        descriptor.supports_stream,
        descriptor.working,
        descriptor.needs_auth,
        is_eligible(descriptor, input),
    )
}

/// Run the command.
pub fn run(args: ProvidersArgs) -> anyhow::Result<()> {
    let pool = load_pool(&args.pool)?;
    let input = SelectionInput {
        stream: args.stream,
        ignored: args.ignore.into_iter().collect(),
        ..SelectionInput::default()
    };

    for provider in &pool {
        println!("{}", describe(provider.descriptor(), &input));
    }
    Ok(())
}
