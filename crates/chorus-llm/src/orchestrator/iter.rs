//! Blocking orchestration path.
//!
//! [`CompletionIter`] is a pull-driven state machine. Each `next()` does at
//! most one unit of work: announce the next provider, invoke it, or pull one
//! chunk from it.
//!
//! The deadline is checked before every pull and again when the invocation
//! or a pull returns, so anything that arrives late is dropped as a
//! [`ProviderError::Timeout`] and never reaches the caller. Providers on the
//! default bridge are interrupted at the deadline. Blocking adapters are not,
//! but their late output is still discarded.

use std::time::{Duration, Instant};

use super::state::{Attempt, CallState, Failure};
use crate::bridge::RuntimeStrategy;
use crate::error::{ProviderError, Result};
use crate::provider::ChunkIter;
use crate::types::{CompletionRequest, StreamChunk};

enum Phase {
    /// Announce the next planned attempt.
    Select,
    /// The provider was announced; invoke it on the next pull.
    Invoke {
        attempt: Attempt,
        request: CompletionRequest,
    },
    /// Pulling chunks from an invoked provider.
    Running {
        attempt: Attempt,
        inner: ChunkIter,
        deadline: Option<Instant>,
    },
    Done,
}

/// Blocking chunk sequence for one orchestration call.
pub struct CompletionIter {
    attempts: std::vec::IntoIter<Attempt>,
    request: CompletionRequest,
    timeout: Option<Duration>,
    runtime: RuntimeStrategy,
    state: CallState,
    phase: Phase,
}

impl CompletionIter {
    pub(crate) fn new(
        plan: Vec<Attempt>,
        request: CompletionRequest,
        timeout: Option<Duration>,
        runtime: RuntimeStrategy,
        state: CallState,
    ) -> Self {
        Self {
            attempts: plan.into_iter(),
            request,
            timeout,
            runtime,
            state,
            phase: Phase::Select,
        }
    }

    /// Whether content has reached the caller.
    pub fn started(&self) -> bool {
        self.state.started()
    }

    fn expired(deadline: Option<Instant>) -> bool {
        deadline.is_some_and(|at| Instant::now() >= at)
    }

    fn fail(&mut self, attempt: &Attempt, err: ProviderError) -> Option<Result<StreamChunk>> {
        match self.state.fail(attempt.provider.name(), attempt.number, err) {
            Failure::Fallback(marker) => {
                self.phase = Phase::Select;
                marker.map(Ok)
            }
            Failure::Raise(err) => {
                self.phase = Phase::Done;
                Some(Err(err))
            }
        }
    }
}

impl Iterator for CompletionIter {
    type Item = Result<StreamChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match std::mem::replace(&mut self.phase, Phase::Done) {
                Phase::Done => return None,

                Phase::Select => {
                    let Some(attempt) = self.attempts.next() else {
                        return Some(Err(self.state.exhausted()));
                    };
                    if !attempt.delay.is_zero() {
                        std::thread::sleep(attempt.delay);
                    }
                    let (info, request) = attempt.prepare(&self.request, self.timeout);
                    self.state.selected(&info, attempt.number);
                    self.phase = Phase::Invoke { attempt, request };
                    return Some(Ok(StreamChunk::Provider(info)));
                }

                Phase::Invoke { attempt, request } => {
                    let deadline = self.timeout.map(|t| Instant::now() + t);
                    let invoked = match attempt.provider.create_completion(request, &self.runtime) {
                        Ok(_) if Self::expired(deadline) => Err(ProviderError::Timeout),
                        other => other,
                    };
                    match invoked {
                        Ok(inner) => {
                            self.phase = Phase::Running {
                                attempt,
                                inner,
                                deadline,
                            };
                        }
                        Err(err) => {
                            if let Some(item) = self.fail(&attempt, err) {
                                return Some(item);
                            }
                        }
                    }
                }

                Phase::Running {
                    attempt,
                    mut inner,
                    deadline,
                } => {
                    let pulled = if Self::expired(deadline) {
                        Some(Err(ProviderError::Timeout))
                    } else {
                        let item = inner.next();
                        if Self::expired(deadline) {
                            Some(Err(ProviderError::Timeout))
                        } else {
                            item
                        }
                    };
                    match pulled {
                        Some(Ok(chunk)) => {
                            self.phase = Phase::Running {
                                attempt,
                                inner,
                                deadline,
                            };
                            if chunk.is_empty_text() {
                                continue;
                            }
                            self.state.observe(&chunk);
                            return Some(Ok(chunk));
                        }
                        Some(Err(err)) => {
                            drop(inner);
                            if let Some(item) = self.fail(&attempt, err) {
                                return Some(item);
                            }
                        }
                        None => {
                            if self.state.finished(attempt.provider.name(), attempt.number) {
                                return None;
                            }
                            self.phase = Phase::Select;
                        }
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for CompletionIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionIter")
            .field("call_id", &self.state.call_id)
            .field("started", &self.state.started())
            .field("remaining_attempts", &self.attempts.len())
            .finish()
    }
}
