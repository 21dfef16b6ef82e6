//! `chorus run` -- send a prompt through a provider pool.
//!
//! Text is written to stdout as it arrives. Provider announcements, finish
//! reasons, usage, images, and error markers go to stderr as bracketed
//! lines. A terminal error makes the command fail.
//!
//! # Example
//!
//! ```text
//! chorus run --pool pool.json "Write a haiku"
//! chorus run --pool pool.json --single-provider-retry --max-retries 5 hi
//! chorus run --pool pool.json --sync --no-stream --ignore flaky hi
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use futures_util::StreamExt;
use tracing::info;

use chorus_llm::{CompletionRequest, ListProvider, Message, RetryPolicy, StreamChunk};

use super::{as_dyn, load_policy, load_pool};

/// Arguments for the `chorus run` subcommand.
#[derive(Args)]
pub struct RunArgs {
    /// Pool file describing the providers.
    #[arg(long)]
    pub pool: PathBuf,

    /// Policy file (overrides auto-discovery).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Model to request; providers fall back to their defaults.
    #[arg(short, long)]
    pub model: Option<String>,

    /// Optional system message.
    #[arg(long)]
    pub system: Option<String>,

    /// Ask for one consolidated answer instead of incremental chunks.
    #[arg(long)]
    pub no_stream: bool,

    /// Use the blocking path instead of the async one.
    #[arg(long)]
    pub sync: bool,

    /// Keep registration order.
    #[arg(long)]
    pub no_shuffle: bool,

    /// Fixed shuffle seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Pin one provider and retry it.
    #[arg(long)]
    pub single_provider_retry: bool,

    /// Attempts in single-provider retry mode.
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Provider to skip (repeatable).
    #[arg(long)]
    pub ignore: Vec<String>,

    /// Per-invocation timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Show swallowed provider failures as markers.
    #[arg(long)]
    pub show_errors: bool,

    /// Prompt text.
    #[arg(required = true)]
    pub prompt: Vec<String>,
}

impl RunArgs {
    /// Apply command-line overrides on top of the loaded policy.
    fn apply(&self, mut policy: RetryPolicy) -> anyhow::Result<RetryPolicy> {
        if self.no_shuffle {
            policy.shuffle = false;
        }
        if self.seed.is_some() {
            policy.seed = self.seed;
        }
        if self.single_provider_retry {
            policy.single_provider_retry = true;
        }
        if let Some(n) = self.max_retries {
            policy.max_retries = n;
        }
        if self.timeout.is_some() {
            policy.timeout_secs = self.timeout;
        }
        if self.show_errors {
            policy.emit_error_chunks = true;
        }
        policy.ignored_providers.extend(self.ignore.iter().cloned());
        policy.validate().context("invalid policy")?;
        Ok(policy)
    }

    fn request(&self) -> CompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system {
            messages.push(Message::system(system.clone()));
        }
        messages.push(Message::user(self.prompt.join(" ")));

        let mut request = CompletionRequest::new(messages).with_stream(!self.no_stream);
        request.model = self.model.clone();
        if let Some(secs) = self.timeout {
            request = request.with_timeout(Duration::from_secs(secs));
        }
        request
    }
}

/// Write one chunk to the appropriate sink.
pub fn render(chunk: &StreamChunk, out: &mut dyn Write, err: &mut dyn Write) -> std::io::Result<()> {
    match chunk {
        StreamChunk::Text(text) => {
            write!(out, "{text}")?;
            out.flush()
        }
        StreamChunk::Image(image) => {
            writeln!(err, "[image: {}]", image.urls.join(", "))
        }
        StreamChunk::Provider(info) => {
            writeln!(err, "[provider: {} ({})]", info.name, info.model)
        }
        StreamChunk::Finish(reason) => writeln!(err, "[finish: {}]", reason.as_str()),
        StreamChunk::Usage(usage) => writeln!(
            err,
            "[usage: prompt={} completion={} total={}]",
            usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
        ),
        StreamChunk::Error(marker) => writeln!(
            err,
            "[error: {}: {}: {}]",
            marker.provider.as_deref().unwrap_or("?"),
            marker.kind,
            marker.message
        ),
    }
}

/// Run the command.
pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let policy = args.apply(load_policy(args.config.as_deref())?)?;
    let pool = load_pool(&args.pool)?;
    let list = ListProvider::new(as_dyn(&pool), policy);
    let request = args.request();

    info!(
        providers = list.len(),
        stream = request.stream,
        sync = args.sync,
        "running prompt"
    );

    let mut out = std::io::stdout().lock();
    let mut err = std::io::stderr().lock();

    if args.sync {
        for item in list.iter(request) {
            let chunk = item.context("orchestration failed")?;
            render(&chunk, &mut out, &mut err)?;
        }
    } else {
        let mut chunks = list.stream(request);
        while let Some(item) = chunks.next().await {
            let chunk = item.context("orchestration failed")?;
            render(&chunk, &mut out, &mut err)?;
        }
    }
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_llm::{ErrorChunk, FinishReason, ProviderDescriptor};
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: RunArgs,
    }

    fn parse(argv: &[&str]) -> RunArgs {
        let mut full = vec!["run"];
        full.extend_from_slice(argv);
        Harness::try_parse_from(full).unwrap().args
    }

    #[test]
    fn overrides_apply_on_top_of_policy() {
        let args = parse(&[
            "--pool",
            "p.json",
            "--no-shuffle",
            "--single-provider-retry",
            "--max-retries",
            "5",
            "--ignore",
            "x",
            "--timeout",
            "9",
            "hi",
        ]);
        let policy = args.apply(RetryPolicy::default()).unwrap();
        assert!(!policy.shuffle);
        assert!(policy.single_provider_retry);
        assert_eq!(policy.max_retries, 5);
        assert!(policy.ignored_providers.contains("x"));
        assert_eq!(policy.timeout_secs, Some(9));
    }

    #[test]
    fn request_includes_system_and_prompt() {
        let args = parse(&[
            "--pool",
            "p.json",
            "--system",
            "be brief",
            "--model",
            "m1",
            "--no-stream",
            "two",
            "words",
        ]);
        let request = args.request();
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[1].content.to_text(), "two words");
        assert_eq!(request.model.as_deref(), Some("m1"));
        assert!(!request.stream);
    }

    #[test]
    fn render_splits_text_and_markers() {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let info = ProviderDescriptor::new("alpha", "a-1").info(None);
        for chunk in [
            StreamChunk::Provider(info),
            StreamChunk::text("Hi"),
            StreamChunk::text(" there"),
            StreamChunk::Finish(FinishReason::Stop),
            StreamChunk::Error(ErrorChunk {
                provider: Some("beta".into()),
                kind: "Timeout".into(),
                message: "timeout".into(),
            }),
        ] {
            render(&chunk, &mut out, &mut err).unwrap();
        }
        assert_eq!(String::from_utf8(out).unwrap(), "Hi there");
        let err = String::from_utf8(err).unwrap();
        assert!(err.contains("[provider: alpha (a-1)]"));
        assert!(err.contains("[finish: stop]"));
        assert!(err.contains("[error: beta: Timeout: timeout]"));
    }
}
