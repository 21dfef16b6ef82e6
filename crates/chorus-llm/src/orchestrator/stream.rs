//! Async orchestration path.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::Instant;

use super::state::{Attempt, CallState, Failure};
use crate::bridge::within;
use crate::provider::ChunkStream;
use crate::types::CompletionRequest;

/// Drive `plan` as a single chunk stream.
///
/// Dropping the returned stream drops whichever provider stream is active,
/// which cancels that provider's in-flight work.
pub(crate) fn run(
    plan: Vec<Attempt>,
    request: CompletionRequest,
    timeout: Option<Duration>,
    mut state: CallState,
) -> ChunkStream {
    Box::pin(async_stream::stream! {
        'attempts: for attempt in plan {
            if !attempt.delay.is_zero() {
                tokio::time::sleep(attempt.delay).await;
            }
            let name = attempt.provider.name().to_owned();
            let (info, prepared) = attempt.prepare(&request, timeout);
            state.selected(&info, attempt.number);
            yield Ok(crate::types::StreamChunk::Provider(info));

            let deadline = timeout.map(|t| Instant::now() + t);
            let invoked = within(deadline, attempt.provider.create_async_generator(prepared))
                .await
                .and_then(|r| r);
            let mut inner = match invoked {
                Ok(response) => response.into_stream(),
                Err(err) => match state.fail(&name, attempt.number, err) {
                    Failure::Fallback(marker) => {
                        if let Some(marker) = marker {
                            yield Ok(marker);
                        }
                        continue 'attempts;
                    }
                    Failure::Raise(err) => {
                        yield Err(err);
                        return;
                    }
                },
            };

            loop {
                let next = match within(deadline, inner.next()).await {
                    Ok(item) => item,
                    Err(timed_out) => Some(Err(timed_out)),
                };
                match next {
                    Some(Ok(chunk)) => {
                        if chunk.is_empty_text() {
                            continue;
                        }
                        state.observe(&chunk);
                        yield Ok(chunk);
                    }
                    Some(Err(err)) => {
                        drop(inner);
                        match state.fail(&name, attempt.number, err) {
                            Failure::Fallback(marker) => {
                                if let Some(marker) = marker {
                                    yield Ok(marker);
                                }
                                continue 'attempts;
                            }
                            Failure::Raise(err) => {
                                yield Err(err);
                                return;
                            }
                        }
                    }
                    None => {
                        if state.finished(&name, attempt.number) {
                            return;
                        }
                        continue 'attempts;
                    }
                }
            }
        }

        yield Err(state.exhausted());
    })
}
