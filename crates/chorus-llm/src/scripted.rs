//! Deterministic in-process provider driven by a script.
//!
//! [`ScriptedProvider`] replays a list of [`ScriptStep`]s for each call. It can
//! play a different script on each attempt, which makes fallback and retry
//! behavior reproducible without any network. The CLI builds pools of these
//! from JSON.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, Result};
use crate::provider::{AsyncResponse, ChunkStream, Provider};
use crate::types::{
    CompletionRequest, ErrorChunk, FinishReason, ImageResponse, ProviderDescriptor, StreamChunk,
    Usage,
};

/// A failure a script can raise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptedFailure {
    RequestFailed {
        #[serde(default)]
        message: String,
    },
    AuthFailed {
        #[serde(default)]
        message: String,
    },
    RateLimited {
        #[serde(default)]
        retry_after_ms: u64,
    },
    ModelNotFound {
        #[serde(default)]
        message: String,
    },
    InvalidResponse {
        #[serde(default)]
        message: String,
    },
    Timeout,
}

impl ScriptedFailure {
    pub fn request_failed(message: impl Into<String>) -> Self {
        Self::RequestFailed {
            message: message.into(),
        }
    }

    pub fn into_error(self) -> ProviderError {
        match self {
            Self::RequestFailed { message } => ProviderError::RequestFailed(message),
            Self::AuthFailed { message } => ProviderError::AuthFailed(message),
            Self::RateLimited { retry_after_ms } => ProviderError::RateLimited { retry_after_ms },
            Self::ModelNotFound { message } => ProviderError::ModelNotFound(message),
            Self::InvalidResponse { message } => ProviderError::InvalidResponse(message),
            Self::Timeout => ProviderError::Timeout,
        }
    }
}

/// One scripted action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Emit a text fragment.
    Text { text: String },
    /// Emit an image result.
    Image {
        urls: Vec<String>,
        #[serde(default)]
        alt: String,
    },
    /// Emit a finish reason.
    Finish { reason: FinishReason },
    /// Emit token usage.
    Usage(Usage),
    /// Emit an in-band error marker.
    Marker { kind: String, message: String },
    /// Fail the stream at this point.
    Fail { error: ScriptedFailure },
    /// Refuse the invocation outright. Only meaningful as the first step;
    /// anywhere else it behaves like [`ScriptStep::Fail`].
    Reject { error: ScriptedFailure },
    /// Wait before the next step.
    Delay { ms: u64 },
}

impl ScriptStep {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn fail(error: ScriptedFailure) -> Self {
        Self::Fail { error }
    }

    pub fn reject(error: ScriptedFailure) -> Self {
        Self::Reject { error }
    }

    pub fn delay(ms: u64) -> Self {
        Self::Delay { ms }
    }

    pub fn finish(reason: FinishReason) -> Self {
        Self::Finish { reason }
    }
}

/// The steps played for one call.
pub type Script = Vec<ScriptStep>;

/// A provider that plays back scripts.
///
/// Call `n` (0-based) plays `scripts[n]`; once the list runs out the last
/// script repeats. An empty list behaves as an empty script.
#[derive(Debug)]
pub struct ScriptedProvider {
    descriptor: ProviderDescriptor,
    scripts: Vec<Script>,
    calls: AtomicU32,
}

impl ScriptedProvider {
    /// A provider that plays the same script on every call.
    pub fn new(descriptor: ProviderDescriptor, script: Script) -> Self {
        Self::with_attempts(descriptor, vec![script])
    }

    /// A provider that plays a different script per call.
    pub fn with_attempts(descriptor: ProviderDescriptor, scripts: Vec<Script>) -> Self {
        Self {
            descriptor,
            scripts,
            calls: AtomicU32::new(0),
        }
    }

    /// Number of invocations so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_script(&self) -> Script {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        self.scripts
            .get(call)
            .or_else(|| self.scripts.last())
            .cloned()
            .unwrap_or_default()
    }
}

fn step_chunk(step: ScriptStep) -> Option<Result<StreamChunk>> {
    match step {
        ScriptStep::Text { text } => Some(Ok(StreamChunk::Text(text))),
        ScriptStep::Image { urls, alt } => Some(Ok(StreamChunk::Image(ImageResponse { urls, alt }))),
        ScriptStep::Finish { reason } => Some(Ok(StreamChunk::Finish(reason))),
        ScriptStep::Usage(usage) => Some(Ok(StreamChunk::Usage(usage))),
        ScriptStep::Marker { kind, message } => Some(Ok(StreamChunk::Error(ErrorChunk {
            provider: None,
            kind,
            message,
        }))),
        ScriptStep::Fail { error } | ScriptStep::Reject { error } => Some(Err(error.into_error())),
        ScriptStep::Delay { .. } => None,
    }
}

fn play(script: Script) -> ChunkStream {
    Box::pin(async_stream::stream! {
        for step in script {
            if let ScriptStep::Delay { ms } = step {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                continue;
            }
            match step_chunk(step) {
                Some(Ok(chunk)) => yield Ok(chunk),
                Some(Err(err)) => {
                    yield Err(err);
                    return;
                }
                None => {}
            }
        }
    })
}

/// Run the whole script up front and fold it into one result.
async fn consolidate(script: Script) -> Result<AsyncResponse> {
    let mut text = String::new();
    let mut others = Vec::new();
    for step in script {
        if let ScriptStep::Delay { ms } = step {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            continue;
        }
        match step_chunk(step) {
            Some(Ok(StreamChunk::Text(t))) => text.push_str(&t),
            Some(Ok(chunk)) => others.push(chunk),
            Some(Err(err)) => return Err(err),
            None => {}
        }
    }

    if others.is_empty() {
        return Ok(AsyncResponse::Single(StreamChunk::Text(text)));
    }
    let mut chunks: Vec<Result<StreamChunk>> = Vec::with_capacity(others.len() + 1);
    if !text.is_empty() {
        chunks.push(Ok(StreamChunk::Text(text)));
    }
    chunks.extend(others.into_iter().map(Ok));
    Ok(AsyncResponse::Stream(Box::pin(futures_util::stream::iter(chunks))))
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn create_async_generator(&self, request: CompletionRequest) -> Result<AsyncResponse> {
        let script = self.next_script();
        if let Some(ScriptStep::Reject { error }) = script.first() {
            return Err(error.clone().into_error());
        }
        if !request.stream {
            return consolidate(script).await;
        }
        Ok(AsyncResponse::Stream(play(script)))
    }
}

/// A scripted provider as written in a pool file.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptedProviderSpec {
    #[serde(flatten)]
    pub descriptor: ProviderDescriptor,

    /// Played on every call unless `attempts` is given.
    #[serde(default)]
    pub script: Script,

    /// One script per call.
    #[serde(default)]
    pub attempts: Vec<Script>,
}

impl ScriptedProviderSpec {
    pub fn into_provider(self) -> ScriptedProvider {
        if self.attempts.is_empty() {
            ScriptedProvider::new(self.descriptor, self.script)
        } else {
            ScriptedProvider::with_attempts(self.descriptor, self.attempts)
        }
    }
}

/// A pool file: `{ "providers": [ ... ] }`.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptedPool {
    pub providers: Vec<ScriptedProviderSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;
    use futures_util::StreamExt;

    fn streaming(name: &str) -> ProviderDescriptor {
        ProviderDescriptor::new(name, "m").with_stream(true)
    }

    fn request(stream: bool) -> CompletionRequest {
        CompletionRequest::new(vec![Message::user("hi")]).with_stream(stream)
    }

    async fn drain(provider: &ScriptedProvider, stream: bool) -> Vec<Result<StreamChunk>> {
        match provider.create_async_generator(request(stream)).await {
            Ok(resp) => resp.into_stream().collect().await,
            Err(err) => vec![Err(err)],
        }
    }

    #[tokio::test]
    async fn plays_steps_in_order() {
        let provider = ScriptedProvider::new(
            streaming("s"),
            vec![
                ScriptStep::text("Hi"),
                ScriptStep::delay(1),
                ScriptStep::text(" there"),
                ScriptStep::finish(FinishReason::Stop),
            ],
        );
        let items: Vec<StreamChunk> = drain(&provider, true)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(
            items,
            vec![
                StreamChunk::text("Hi"),
                StreamChunk::text(" there"),
                StreamChunk::Finish(FinishReason::Stop),
            ]
        );
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn fail_ends_the_stream() {
        let provider = ScriptedProvider::new(
            streaming("s"),
            vec![
                ScriptStep::text("partial"),
                ScriptStep::fail(ScriptedFailure::Timeout),
                ScriptStep::text("never"),
            ],
        );
        let items = drain(&provider, true).await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(ProviderError::Timeout)));
    }

    #[tokio::test]
    async fn reject_fails_the_invocation() {
        let provider = ScriptedProvider::new(
            streaming("s"),
            vec![ScriptStep::reject(ScriptedFailure::AuthFailed {
                message: "no key".into(),
            })],
        );
        let err = provider
            .create_async_generator(request(true))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::AuthFailed(_)));
    }

    #[tokio::test]
    async fn attempts_advance_then_repeat_last() {
        let provider = ScriptedProvider::with_attempts(
            streaming("s"),
            vec![
                vec![ScriptStep::fail(ScriptedFailure::request_failed("1"))],
                vec![ScriptStep::text("ok")],
            ],
        );
        assert!(drain(&provider, true).await[0].is_err());
        assert!(drain(&provider, true).await[0].is_ok());
        assert!(drain(&provider, true).await[0].is_ok());
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn non_streaming_request_is_consolidated() {
        let provider = ScriptedProvider::new(
            streaming("s"),
            vec![ScriptStep::text("a"), ScriptStep::text("b")],
        );
        match provider.create_async_generator(request(false)).await.unwrap() {
            AsyncResponse::Single(chunk) => assert_eq!(chunk, StreamChunk::text("ab")),
            AsyncResponse::Stream(_) => panic!("expected a single value"),
        }
    }

    #[tokio::test]
    async fn non_streaming_failure_fails_invocation() {
        let provider = ScriptedProvider::new(
            streaming("s"),
            vec![
                ScriptStep::text("a"),
                ScriptStep::fail(ScriptedFailure::Timeout),
            ],
        );
        assert!(provider.create_async_generator(request(false)).await.is_err());
    }

    #[test]
    fn pool_file_parses() {
        let json = r#"{
            "providers": [
                {
                    "name": "alpha",
                    "supportsStream": true,
                    "default_model": "a-1",
                    "script": [
                        {"type": "reject", "error": {"kind": "rate_limited", "retry_after_ms": 10}}
                    ]
                },
                {
                    "name": "beta",
                    "attempts": [
                        [{"type": "fail", "error": {"kind": "timeout"}}],
                        [{"type": "text", "text": "hello"}, {"type": "finish", "reason": "stop"}]
                    ]
                }
            ]
        }"#;
        let pool: ScriptedPool = serde_json::from_str(json).unwrap();
        assert_eq!(pool.providers.len(), 2);
        assert!(pool.providers[0].descriptor.supports_stream);
        assert_eq!(pool.providers[0].descriptor.default_model, "a-1");
        assert_eq!(pool.providers[1].attempts.len(), 2);

        let beta = pool.providers[1].clone().into_provider();
        assert_eq!(beta.name(), "beta");
    }
}
