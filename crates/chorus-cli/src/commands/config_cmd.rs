//! `chorus config` -- display the resolved orchestration policy.
//!
//! # Example
//!
//! ```text
//! chorus config
//! chorus config --config ./policy.json
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use chorus_llm::RetryPolicy;
use chorus_llm::config::discover_config_path;

use super::load_policy;

/// Arguments for the `chorus config` subcommand.
#[derive(Args)]
pub struct ConfigArgs {
    /// Policy file (overrides auto-discovery).
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Render a policy as pretty JSON.
pub fn render(policy: &RetryPolicy) -> anyhow::Result<String> {
    serde_json::to_string_pretty(policy).context("failed to serialize policy")
}

/// Run the command.
pub fn run(args: ConfigArgs) -> anyhow::Result<()> {
    let source = args.config.clone().or_else(discover_config_path);
    match &source {
        Some(path) => eprintln!("Config: {}", path.display()),
        None => eprintln!("Config: not found, using defaults"),
    }

    let policy = load_policy(args.config.as_deref())?;
    println!("{}", render(&policy)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_default_policy() {
        let json = render(&RetryPolicy::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["shuffle"], true);
        assert_eq!(value["max_retries"], 3);
        assert_eq!(value["runtime"], "auto");
    }
}
