//! Provider orchestration and stream normalization for chorus.
//!
//! This crate puts one chat/completion interface in front of a pool of
//! independent, unreliable providers. It picks which providers to try and
//! in what order, falls back or retries when they fail, and normalizes sync
//! and async response styles into a single chunk vocabulary.
//!
//! # Architecture
//!
//! - [`Provider`] is the capability every adapter implements (async
//!   generator, blocking completion, static [`ProviderDescriptor`])
//! - [`StreamChunk`] is the only vocabulary between providers, the
//!   orchestrator, and callers
//! - [`SyncBridge`] and [`iter_to_stream`] convert between blocking and
//!   async streams under an explicit [`RuntimeStrategy`]
//! - [`select_providers`] filters and orders candidates
//! - [`ListProvider`] runs a call across the pool under a [`RetryPolicy`]
//! - [`ExceptionLedger`] collects per-provider failures into one terminal
//!   error
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use chorus_llm::{CompletionRequest, ListProvider, Message, RetryPolicy};
//!
//! let pool = ListProvider::new(providers, RetryPolicy::load(None)?);
//! let completion = pool
//!     .complete(CompletionRequest::new(vec![Message::user("What is Rust?")]))
//!     .await?;
//! println!("{} (via {:?})", completion.text, completion.provider);
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod provider;
pub mod retry;
pub mod scripted;
pub mod selection;
pub mod types;

pub use bridge::{BlockingStream, RuntimeStrategy, SyncBridge, collect_chunks, iter_to_stream};
pub use config::{BackoffConfig, RetryPolicy, RuntimeMode};
pub use error::{ProviderError, Result};
pub use ledger::{ExceptionLedger, LedgerEntry};
pub use orchestrator::{CompletionIter, ListProvider};
pub use provider::{
    AsyncResponse, BlockingProvider, ChunkIter, ChunkStream, Provider, SyncProvider,
};
pub use scripted::{ScriptStep, ScriptedFailure, ScriptedProvider};
pub use selection::{SelectionInput, select_providers};
pub use types::{
    Completion, CompletionRequest, ErrorChunk, FinishReason, ImageResponse, Message,
    MessageContent, ProviderDescriptor, ProviderInfo, RequestOptions, Role, StreamChunk, Usage,
};
