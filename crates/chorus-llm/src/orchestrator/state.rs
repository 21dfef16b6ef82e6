//! Per-call orchestration state.
//!
//! Each top-level call owns one [`CallState`]: the started flag and the
//! failure ledger. Nothing here is shared across calls.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::RetryPolicy;
use crate::error::ProviderError;
use crate::ledger::ExceptionLedger;
use crate::provider::Provider;
use crate::retry::compute_delay;
use crate::selection::{SelectionInput, select_providers};
use crate::types::{CompletionRequest, ErrorChunk, ProviderInfo, StreamChunk};

/// One planned provider invocation.
#[derive(Clone)]
pub(crate) struct Attempt {
    pub provider: Arc<dyn Provider>,
    /// 1-based position in the plan.
    pub number: u32,
    /// Wait before starting this attempt.
    pub delay: Duration,
}

impl Attempt {
    /// The "provider selected" payload and the request the adapter receives.
    pub fn prepare(
        &self,
        request: &CompletionRequest,
        timeout: Option<Duration>,
    ) -> (ProviderInfo, CompletionRequest) {
        let info = self.provider.descriptor().info(request.model.as_deref());
        let mut prepared = request.clone();
        prepared.model = Some(info.model.clone());
        prepared.options.timeout = timeout;
        (info, prepared)
    }
}

/// Build the ordered attempt list for a call.
///
/// List mode yields each selected candidate once. Single-provider mode pins
/// the first eligible candidate in registration order and repeats it
/// `policy.attempts()` times, with backoff before every retry.
pub(crate) fn plan_attempts<R: Rng + ?Sized>(
    providers: &[Arc<dyn Provider>],
    policy: &RetryPolicy,
    request: &CompletionRequest,
    rng: &mut R,
) -> Vec<Attempt> {
    let mut input = SelectionInput::new(policy, request);

    if policy.single_provider_retry {
        input.shuffle = false;
        let Some(pinned) = select_providers(providers, &input, rng).into_iter().next() else {
            return Vec::new();
        };
        return (0..policy.attempts())
            .map(|n| Attempt {
                provider: Arc::clone(&pinned),
                number: n + 1,
                delay: if n == 0 {
                    Duration::ZERO
                } else {
                    compute_delay(&policy.backoff, n - 1, rng)
                },
            })
            .collect();
    }

    select_providers(providers, &input, rng)
        .into_iter()
        .zip(1u32..)
        .map(|(provider, number)| Attempt {
            provider,
            number,
            delay: Duration::ZERO,
        })
        .collect()
}

/// What to do after a provider fails.
pub(crate) enum Failure {
    /// Nothing reached the caller yet; try the next attempt. Carries an
    /// optional in-band marker to forward first.
    Fallback(Option<StreamChunk>),
    /// Output already started; end the call with this error.
    Raise(ProviderError),
}

/// Started flag and failure ledger for one call.
pub(crate) struct CallState {
    pub call_id: Uuid,
    started: bool,
    ledger: ExceptionLedger,
    emit_error_chunks: bool,
}

impl CallState {
    pub fn new(emit_error_chunks: bool) -> Self {
        Self {
            call_id: Uuid::new_v4(),
            started: false,
            ledger: ExceptionLedger::new(),
            emit_error_chunks,
        }
    }

    pub fn started(&self) -> bool {
        self.started
    }

    /// Note a chunk on its way to the caller.
    pub fn observe(&mut self, chunk: &StreamChunk) {
        if chunk.is_content() {
            self.started = true;
        }
    }

    pub fn selected(&self, info: &ProviderInfo, attempt: u32) {
        debug!(
            call_id = %self.call_id,
            provider = %info.name,
            model = %info.model,
            attempt,
            "provider selected"
        );
    }

    /// Decide how a provider failure affects the call.
    pub fn fail(&mut self, provider: &str, attempt: u32, err: ProviderError) -> Failure {
        if self.started {
            error!(
                call_id = %self.call_id,
                provider,
                attempt,
                error = %err,
                "provider failed after output started"
            );
            return Failure::Raise(ProviderError::MidStream {
                provider: provider.to_owned(),
                source: Box::new(err),
            });
        }

        warn!(
            call_id = %self.call_id,
            provider,
            attempt,
            kind = err.kind(),
            transient = err.is_transient(),
            error = %err,
            "provider failed before output, falling back"
        );
        let marker = self
            .emit_error_chunks
            .then(|| StreamChunk::Error(ErrorChunk::from_error(Some(provider), &err)));
        self.ledger.record(provider, attempt, err);
        Failure::Fallback(marker)
    }

    /// A provider's stream ended normally. Returns `true` when the call is
    /// complete; a stream that produced no content counts as a failure.
    pub fn finished(&mut self, provider: &str, attempt: u32) -> bool {
        if self.started {
            debug!(call_id = %self.call_id, provider, attempt, "provider completed");
            return true;
        }
        warn!(
            call_id = %self.call_id,
            provider,
            attempt,
            "provider completed without content, falling back"
        );
        self.ledger
            .record(provider, attempt, ProviderError::EmptyResponse);
        false
    }

    /// Every attempt is spent: build the terminal error.
    pub fn exhausted(&mut self) -> ProviderError {
        let ledger = std::mem::take(&mut self.ledger);
        error!(
            call_id = %self.call_id,
            failures = ledger.len(),
            "no provider produced output"
        );
        ledger.into_error()
    }
}
