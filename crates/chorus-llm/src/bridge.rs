//! Sync/async bridge.
//!
//! [`SyncBridge`] lets blocking callers consume async chunk streams, and
//! [`iter_to_stream`] goes the other way for blocking adapters. How a
//! runtime is found is an explicit [`RuntimeStrategy`] instead of ambient
//! global state:
//!
//! - No runtime running on this thread: build a private current-thread
//!   runtime (or use the injected handle) and drop it when the stream ends.
//! - Inside a multi-thread runtime: re-enter via `block_in_place`.
//! - Inside a current-thread runtime: fail with
//!   [`ProviderError::NestedRuntime`]. Blocking there would deadlock.

use std::future::Future;

use futures_util::{StreamExt, TryStreamExt};
use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::{ProviderError, Result};
use crate::provider::{ChunkIter, ChunkStream};
use crate::types::StreamChunk;

/// Buffer between a blocking producer thread and its async consumer.
const BRIDGE_BUFFER: usize = 16;

/// How a blocking caller obtains a runtime to drive async work.
#[derive(Debug, Clone, Default)]
pub enum RuntimeStrategy {
    /// Private runtime when none is running; re-enter a multi-thread
    /// runtime when one is.
    #[default]
    Auto,
    /// Drive futures on this runtime. The handle should belong to a
    /// multi-thread runtime, since a current-thread runtime only drives its
    /// timers and I/O from its own `block_on`.
    Handle(Handle),
    /// Never re-enter a running runtime.
    FailIfNested,
}

/// A runtime acquired for blocking on async work.
#[derive(Debug)]
pub struct SyncBridge {
    runtime: Option<Runtime>,
    handle: Handle,
    reentrant: bool,
}

impl SyncBridge {
    /// Acquire a runtime according to `strategy`.
    pub fn acquire(strategy: &RuntimeStrategy) -> Result<Self> {
        if let Ok(current) = Handle::try_current() {
            let multi_thread = matches!(current.runtime_flavor(), RuntimeFlavor::MultiThread);
            return match strategy {
                RuntimeStrategy::FailIfNested => Err(ProviderError::NestedRuntime),
                _ if !multi_thread => Err(ProviderError::NestedRuntime),
                RuntimeStrategy::Handle(handle) => Ok(Self {
                    runtime: None,
                    handle: handle.clone(),
                    reentrant: true,
                }),
                RuntimeStrategy::Auto => Ok(Self {
                    runtime: None,
                    handle: current,
                    reentrant: true,
                }),
            };
        }

        match strategy {
            RuntimeStrategy::Handle(handle) => Ok(Self {
                runtime: None,
                handle: handle.clone(),
                reentrant: false,
            }),
            RuntimeStrategy::Auto | RuntimeStrategy::FailIfNested => {
                let runtime = Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| ProviderError::Runtime(e.to_string()))?;
                let handle = runtime.handle().clone();
                Ok(Self {
                    runtime: Some(runtime),
                    handle,
                    reentrant: false,
                })
            }
        }
    }

    /// Whether this bridge created (and will dispose of) its own runtime.
    pub fn owns_runtime(&self) -> bool {
        self.runtime.is_some()
    }

    /// Run a future to completion on the acquired runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        if self.reentrant {
            tokio::task::block_in_place(|| self.handle.block_on(future))
        } else if let Some(runtime) = &self.runtime {
            runtime.block_on(future)
        } else {
            self.handle.block_on(future)
        }
    }

    /// Run a future on the acquired runtime, giving up at `deadline`.
    pub fn block_on_until<F: Future>(
        &self,
        deadline: Option<Instant>,
        future: F,
    ) -> Result<F::Output> {
        self.block_on(within(deadline, future))
    }

    /// Turn an async stream into a blocking iterator that owns this bridge.
    pub fn into_iter(self, stream: ChunkStream) -> BlockingStream {
        self.into_iter_until(stream, None)
    }

    /// Like [`into_iter`](Self::into_iter), but every pull shares one
    /// deadline. A pull still pending at the deadline is abandoned and the
    /// iterator yields [`ProviderError::Timeout`].
    pub fn into_iter_until(self, stream: ChunkStream, deadline: Option<Instant>) -> BlockingStream {
        BlockingStream {
            bridge: Some(self),
            stream: Some(stream),
            deadline,
        }
    }

    /// Drain an async stream into an ordered list, stopping at the first error.
    pub fn collect(&self, stream: ChunkStream) -> Result<Vec<StreamChunk>> {
        self.block_on(collect_chunks(stream))
    }
}

impl Drop for SyncBridge {
    fn drop(&mut self) {
        // `shutdown_background` does not panic if the bridge happens to be
        // dropped from async context.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// A blocking view over an async chunk stream.
///
/// Each `next()` drives the stream until exactly one item is ready. After
/// the stream ends or yields an error, both the stream and the bridge are
/// released and the iterator is fused.
pub struct BlockingStream {
    bridge: Option<SyncBridge>,
    stream: Option<ChunkStream>,
    deadline: Option<Instant>,
}

impl BlockingStream {
    /// Whether the underlying stream and runtime have been released.
    pub fn is_released(&self) -> bool {
        self.bridge.is_none() && self.stream.is_none()
    }

    fn release(&mut self) {
        // Stream first: it may hold tasks or timers tied to the runtime.
        self.stream = None;
        self.bridge = None;
    }
}

impl Iterator for BlockingStream {
    type Item = Result<StreamChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        let (Some(bridge), Some(stream)) = (self.bridge.as_ref(), self.stream.as_mut()) else {
            return None;
        };
        let item = bridge.block_on_until(self.deadline, stream.next());
        match item {
            Ok(Some(Ok(chunk))) => Some(Ok(chunk)),
            Ok(Some(Err(err))) | Err(err) => {
                self.release();
                Some(Err(err))
            }
            Ok(None) => {
                self.release();
                None
            }
        }
    }
}

impl std::fmt::Debug for BlockingStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingStream")
            .field("released", &self.is_released())
            .finish()
    }
}

/// Await `fut`, failing with [`ProviderError::Timeout`] past `deadline`.
///
/// The timer is created on first poll, so this can be built outside a
/// runtime and handed to [`SyncBridge::block_on`].
pub(crate) async fn within<F: Future>(deadline: Option<Instant>, fut: F) -> Result<F::Output> {
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut)
            .await
            .map_err(|_| ProviderError::Timeout),
        None => Ok(fut.await),
    }
}

/// Drain an async stream into an ordered list.
pub async fn collect_chunks(stream: ChunkStream) -> Result<Vec<StreamChunk>> {
    stream.try_collect().await
}

/// Expose a blocking iterator as an async stream.
///
/// The iterator is pumped on a blocking worker thread. Nothing is spawned
/// until the stream is first polled. When the consumer drops the stream,
/// the worker stops at its next send.
pub fn iter_to_stream(iter: ChunkIter) -> ChunkStream {
    Box::pin(async_stream::stream! {
        let (tx, mut rx) = mpsc::channel::<Result<StreamChunk>>(BRIDGE_BUFFER);
        let worker = tokio::task::spawn_blocking(move || {
            for item in iter {
                let failed = item.is_err();
                if tx.blocking_send(item).is_err() || failed {
                    break;
                }
            }
        });

        while let Some(item) = rx.recv().await {
            yield item;
        }

        if let Err(join_err) = worker.await {
            yield Err(ProviderError::Runtime(format!("blocking producer failed: {join_err}")));
        }
    })
}
