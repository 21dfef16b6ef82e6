//! Candidate filtering and ordering.
//!
//! A candidate is eligible when it can serve the requested mode (streaming
//! support, unless `ignore_stream` is set), is not on either ignore list,
//! and is marked as working. Eligible candidates keep registration order
//! unless shuffling is enabled, in which case the caller-supplied RNG
//! decides the permutation.

use std::collections::BTreeSet;
use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::config::RetryPolicy;
use crate::provider::Provider;
use crate::types::{CompletionRequest, ProviderDescriptor};

/// Inputs to [`select_providers`] for one call.
#[derive(Debug, Clone, Default)]
pub struct SelectionInput {
    pub stream: bool,
    pub ignore_stream: bool,
    pub ignored: BTreeSet<String>,
    pub shuffle: bool,
}

impl SelectionInput {
    /// Merge the policy's settings with the call's own options.
    pub fn new(policy: &RetryPolicy, request: &CompletionRequest) -> Self {
        let ignored = policy
            .ignored_providers
            .union(&request.options.ignored)
            .cloned()
            .collect();
        Self {
            stream: request.stream,
            ignore_stream: request.options.ignore_stream,
            ignored,
            shuffle: policy.shuffle,
        }
    }
}

/// Whether a single descriptor passes the filter.
pub fn is_eligible(descriptor: &ProviderDescriptor, input: &SelectionInput) -> bool {
    let stream_ok = descriptor.supports_stream || !input.stream || input.ignore_stream;
    stream_ok && descriptor.working && !input.ignored.contains(&descriptor.name)
}

/// Filter and order the candidate pool.
pub fn select_providers<R: Rng + ?Sized>(
    candidates: &[Arc<dyn Provider>],
    input: &SelectionInput,
    rng: &mut R,
) -> Vec<Arc<dyn Provider>> {
    let mut selected: Vec<Arc<dyn Provider>> = candidates
        .iter()
        .filter(|p| is_eligible(p.descriptor(), input))
        .cloned()
        .collect();
    if input.shuffle {
        selected.shuffle(rng);
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedProvider;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn pool() -> Vec<Arc<dyn Provider>> {
        let descriptors = [
            ProviderDescriptor::new("a", "m").with_stream(true),
            ProviderDescriptor::new("b", "m"),
            ProviderDescriptor::new("c", "m").with_stream(true),
            ProviderDescriptor::new("d", "m").with_stream(true),
            ProviderDescriptor::new("e", "m").with_stream(true),
        ];
        descriptors
            .into_iter()
            .map(|d| Arc::new(ScriptedProvider::new(d, vec![])) as Arc<dyn Provider>)
            .collect()
    }

    fn names(selected: &[Arc<dyn Provider>]) -> Vec<String> {
        selected.iter().map(|p| p.name().to_owned()).collect()
    }

    #[test]
    fn unshuffled_keeps_registration_order() {
        let mut rng = StdRng::seed_from_u64(0);
        let selected = select_providers(&pool(), &SelectionInput::default(), &mut rng);
        assert_eq!(names(&selected), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn streaming_filters_non_streaming_candidates() {
        let mut rng = StdRng::seed_from_u64(0);
        let input = SelectionInput {
            stream: true,
            ..SelectionInput::default()
        };
        let selected = select_providers(&pool(), &input, &mut rng);
        assert_eq!(names(&selected), vec!["a", "c", "d", "e"]);
    }

    #[test]
    fn ignore_stream_disables_capability_filter() {
        let mut rng = StdRng::seed_from_u64(0);
        let input = SelectionInput {
            stream: true,
            ignore_stream: true,
            ..SelectionInput::default()
        };
        assert_eq!(select_providers(&pool(), &input, &mut rng).len(), 5);
    }

    #[test]
    fn ignored_names_are_excluded() {
        let mut rng = StdRng::seed_from_u64(0);
        let input = SelectionInput {
            ignored: ["a".to_owned(), "d".to_owned()].into_iter().collect(),
            ..SelectionInput::default()
        };
        let selected = select_providers(&pool(), &input, &mut rng);
        assert_eq!(names(&selected), vec!["b", "c", "e"]);
    }

    #[test]
    fn not_working_is_never_eligible() {
        let desc = ProviderDescriptor::new("down", "m")
            .with_stream(true)
            .with_working(false);
        assert!(!is_eligible(&desc, &SelectionInput::default()));
    }

    #[test]
    fn shuffle_is_reproducible_with_seeded_rng() {
        let input = SelectionInput {
            shuffle: true,
            ..SelectionInput::default()
        };
        let first = names(&select_providers(
            &pool(),
            &input,
            &mut StdRng::seed_from_u64(99),
        ));
        let second = names(&select_providers(
            &pool(),
            &input,
            &mut StdRng::seed_from_u64(99),
        ));
        assert_eq!(first, second);

        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn shuffle_eventually_reorders() {
        let input = SelectionInput {
            shuffle: true,
            ..SelectionInput::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let reordered = (0..32).any(|_| {
            names(&select_providers(&pool(), &input, &mut rng)) != vec!["a", "b", "c", "d", "e"]
        });
        assert!(reordered);
    }

    #[test]
    fn input_merges_policy_and_request_ignores() {
        let policy = RetryPolicy {
            ignored_providers: ["x".to_owned()].into_iter().collect(),
            shuffle: false,
            ..RetryPolicy::default()
        };
        let request = CompletionRequest::new(vec![]).ignoring("y").with_stream(true);
        let input = SelectionInput::new(&policy, &request);
        assert!(input.ignored.contains("x"));
        assert!(input.ignored.contains("y"));
        assert!(input.stream);
        assert!(!input.shuffle);
    }
}
