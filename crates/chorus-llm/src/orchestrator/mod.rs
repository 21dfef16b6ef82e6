//! Provider orchestration: ordered fallback and single-provider retry.
//!
//! [`ListProvider`] walks a pool of providers for each call. Candidates are
//! tried strictly one at a time, and the first one to produce content wins.
//! Whether a failure can fall back depends on whether any content has
//! reached the caller yet:
//!
//! - Before content: the failure is recorded and the next attempt runs.
//! - After content: the call ends with
//!   [`ProviderError::MidStream`](crate::ProviderError::MidStream). Moving
//!   to another provider would splice two different answers together.
//!
//! When every attempt fails, the call ends with a single
//! [`AllProvidersFailed`](crate::ProviderError::AllProvidersFailed) carrying
//! the ledger, or [`NoEligibleProvider`](crate::ProviderError::NoEligibleProvider)
//! if nothing was eligible at all.
//!
//! Both the async path ([`ListProvider::stream`]) and the blocking path
//! ([`ListProvider::iter`]) follow the same rules.

mod iter;
mod state;
mod stream;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::debug;

use crate::bridge::RuntimeStrategy;
use crate::config::RetryPolicy;
use crate::error::Result;
use crate::provider::{AsyncResponse, ChunkIter, ChunkStream, Provider};
use crate::types::{Completion, CompletionRequest, ProviderDescriptor};

pub use iter::CompletionIter;
use state::{Attempt, CallState, plan_attempts};

/// Name reported by a [`ListProvider`]'s own descriptor.
pub const LIST_PROVIDER_NAME: &str = "ListProvider";

/// Orchestrates a pool of providers under a [`RetryPolicy`].
///
/// `ListProvider` is itself a [`Provider`], so pools can be nested.
///
/// # Example
///
/// ```rust,ignore
/// use chorus_llm::{ListProvider, RetryPolicy, CompletionRequest, Message};
///
/// let pool = ListProvider::new(vec![primary, fallback], RetryPolicy::default());
/// let request = CompletionRequest::new(vec![Message::user("Hello")]).with_stream(true);
/// let mut chunks = pool.stream(request);
/// while let Some(chunk) = chunks.next().await {
///     println!("{:?}", chunk?);
/// }
/// ```
pub struct ListProvider {
    providers: Vec<Arc<dyn Provider>>,
    policy: RetryPolicy,
    runtime: RuntimeStrategy,
    descriptor: ProviderDescriptor,
}

impl ListProvider {
    /// Create an orchestrator over `providers`, in registration order.
    pub fn new(providers: Vec<Arc<dyn Provider>>, policy: RetryPolicy) -> Self {
        let descriptor = ProviderDescriptor::new(LIST_PROVIDER_NAME, "")
            .with_stream(providers.iter().any(|p| p.descriptor().supports_stream))
            .with_system_message(
                providers
                    .iter()
                    .any(|p| p.descriptor().supports_system_message),
            )
            .with_message_history(
                providers
                    .iter()
                    .any(|p| p.descriptor().supports_message_history),
            );
        let runtime = policy.runtime.into();
        Self {
            providers,
            policy,
            runtime,
            descriptor,
        }
    }

    /// Override how the blocking path obtains a runtime.
    pub fn with_runtime(mut self, runtime: RuntimeStrategy) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Names of all registered providers, in registration order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    fn rng(&self) -> StdRng {
        match self.policy.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    fn begin(&self, request: &CompletionRequest) -> (Vec<Attempt>, CallState) {
        let state = CallState::new(self.policy.emit_error_chunks);
        let plan = plan_attempts(&self.providers, &self.policy, request, &mut self.rng());
        debug!(
            call_id = %state.call_id,
            stream = request.stream,
            single_provider_retry = self.policy.single_provider_retry,
            attempts = plan.len(),
            "orchestration started"
        );
        (plan, state)
    }

    /// Run a call on the async path.
    ///
    /// The stream ends normally after a successful provider, or with exactly
    /// one `Err` item.
    pub fn stream(&self, request: CompletionRequest) -> ChunkStream {
        let (plan, state) = self.begin(&request);
        let timeout = request.options.timeout.or(self.policy.timeout());
        stream::run(plan, request, timeout, state)
    }

    /// Run a call on the blocking path.
    pub fn iter(&self, request: CompletionRequest) -> CompletionIter {
        self.iter_with(request, self.runtime.clone())
    }

    fn iter_with(&self, request: CompletionRequest, runtime: RuntimeStrategy) -> CompletionIter {
        let (plan, state) = self.begin(&request);
        let timeout = request.options.timeout.or(self.policy.timeout());
        CompletionIter::new(plan, request, timeout, runtime, state)
    }

    /// Run a non-streaming call and aggregate the result.
    pub async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let mut chunks = self.stream(request.with_stream(false));
        let mut completion = Completion::default();
        while let Some(chunk) = chunks.next().await {
            completion.push(chunk?);
        }
        Ok(completion)
    }

    /// Blocking counterpart of [`complete`](Self::complete).
    pub fn complete_blocking(&self, request: CompletionRequest) -> Result<Completion> {
        let mut completion = Completion::default();
        for chunk in self.iter(request.with_stream(false)) {
            completion.push(chunk?);
        }
        Ok(completion)
    }
}

#[async_trait]
impl Provider for ListProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn create_async_generator(&self, request: CompletionRequest) -> Result<AsyncResponse> {
        Ok(AsyncResponse::Stream(self.stream(request)))
    }

    fn create_completion(
        &self,
        request: CompletionRequest,
        runtime: &RuntimeStrategy,
    ) -> Result<ChunkIter> {
        Ok(Box::new(self.iter_with(request, runtime.clone())))
    }
}

impl std::fmt::Debug for ListProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListProvider")
            .field("providers", &self.provider_names())
            .field("policy", &self.policy)
            .finish()
    }
}

impl From<ListProvider> for Arc<dyn Provider> {
    fn from(list: ListProvider) -> Self {
        Arc::new(list)
    }
}
