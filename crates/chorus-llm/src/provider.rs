//! The core [`Provider`] trait every adapter implements.
//!
//! A provider exposes a blocking entry point ([`Provider::create_completion`])
//! and an async one ([`Provider::create_async_generator`]), plus static
//! metadata in a [`ProviderDescriptor`]. Async-native adapters implement only
//! the async side and inherit the blocking one through the
//! [`SyncBridge`]. Blocking adapters implement [`SyncProvider`] and are wrapped
//! in [`BlockingProvider`].

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::Stream;
use futures_util::stream;
use tokio::time::Instant;

use crate::bridge::{RuntimeStrategy, SyncBridge, iter_to_stream};
use crate::error::{ProviderError, Result};
use crate::types::{CompletionRequest, ProviderDescriptor, StreamChunk};

/// An async sequence of chunks. Dropping it cancels the underlying call.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// A blocking sequence of chunks.
pub type ChunkIter = Box<dyn Iterator<Item = Result<StreamChunk>> + Send>;

/// What an async invocation hands back.
pub enum AsyncResponse {
    /// Incremental chunks.
    Stream(ChunkStream),
    /// A single consolidated value.
    Single(StreamChunk),
}

impl AsyncResponse {
    /// View either shape as a stream. A single value becomes a one-item stream.
    pub fn into_stream(self) -> ChunkStream {
        match self {
            Self::Stream(stream) => stream,
            Self::Single(chunk) => {
                Box::pin(stream::once(async move { Ok::<_, ProviderError>(chunk) }))
            }
        }
    }
}

impl std::fmt::Debug for AsyncResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("AsyncResponse::Stream(..)"),
            Self::Single(chunk) => f.debug_tuple("AsyncResponse::Single").field(chunk).finish(),
        }
    }
}

/// A completion backend.
///
/// Chunks must be produced in generation order. A failure is reported as a
/// single `Err` item (or an `Err` from the invocation itself); nothing is
/// read from a stream after its first error.
///
/// # Example
///
/// ```rust,ignore
/// use chorus_llm::{Provider, CompletionRequest, Message};
///
/// async fn first_chunk(provider: &dyn Provider) -> chorus_llm::Result<()> {
///     let request = CompletionRequest::new(vec![Message::user("What is 2+2?")])
///         .with_stream(true);
///     let mut stream = provider.create_async_generator(request).await?.into_stream();
///     while let Some(chunk) = stream.next().await {
///         println!("{:?}", chunk?);
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Static metadata for this adapter.
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Returns the provider name.
    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Start a completion and return its chunks asynchronously.
    ///
    /// When `request.stream` is false the adapter should answer with one
    /// consolidated result rather than incremental chunks.
    async fn create_async_generator(&self, request: CompletionRequest) -> Result<AsyncResponse>;

    /// Start a completion and return its chunks as a blocking iterator.
    ///
    /// The default drives [`create_async_generator`](Self::create_async_generator)
    /// through a [`SyncBridge`] acquired with `runtime`. When the request
    /// carries a timeout, the invocation and every pull share one deadline
    /// measured from this call.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NestedRuntime`] when called from a runtime
    /// the bridge cannot re-enter, [`ProviderError::Timeout`] when the
    /// invocation outlives the request timeout, or whatever the adapter's
    /// invocation fails with.
    fn create_completion(
        &self,
        request: CompletionRequest,
        runtime: &RuntimeStrategy,
    ) -> Result<ChunkIter> {
        let deadline = request
            .options
            .timeout
            .map(|t| Instant::from_std(std::time::Instant::now() + t));
        let bridge = SyncBridge::acquire(runtime)?;
        let response = bridge.block_on_until(deadline, self.create_async_generator(request))??;
        Ok(Box::new(bridge.into_iter_until(response.into_stream(), deadline)))
    }
}

/// An adapter whose natural shape is blocking.
pub trait SyncProvider: Send + Sync + 'static {
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Start a completion. May block on I/O.
    fn create_completion(&self, request: CompletionRequest) -> Result<ChunkIter>;
}

/// Lifts a [`SyncProvider`] into a [`Provider`].
///
/// The blocking path calls the adapter directly. The async path runs the
/// invocation and every pull on the blocking thread pool.
pub struct BlockingProvider<P> {
    inner: Arc<P>,
}

impl<P: SyncProvider> BlockingProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: SyncProvider> Provider for BlockingProvider<P> {
    fn descriptor(&self) -> &ProviderDescriptor {
        self.inner.descriptor()
    }

    async fn create_async_generator(&self, request: CompletionRequest) -> Result<AsyncResponse> {
        let inner = Arc::clone(&self.inner);
        let iter = tokio::task::spawn_blocking(move || inner.create_completion(request))
            .await
            .map_err(|e| ProviderError::Runtime(format!("blocking provider panicked: {e}")))??;
        Ok(AsyncResponse::Stream(iter_to_stream(iter)))
    }

    fn create_completion(
        &self,
        request: CompletionRequest,
        _runtime: &RuntimeStrategy,
    ) -> Result<ChunkIter> {
        self.inner.create_completion(request)
    }
}

impl<P> std::fmt::Debug for BlockingProvider<P>
where
    P: SyncProvider,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingProvider")
            .field("name", &self.inner.descriptor().name)
            .finish()
    }
}
