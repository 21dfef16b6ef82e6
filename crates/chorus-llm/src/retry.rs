//! Exponential backoff between single-provider retry attempts.

use std::time::Duration;

use rand::Rng;

use crate::config::BackoffConfig;

/// Calculate the delay after failed attempt `n` (0-indexed).
///
/// The delay is `min(base_delay * 2^n, max_delay)` plus a random jitter of
/// `0..=jitter_fraction * delay`.
pub fn compute_delay<R: Rng + ?Sized>(config: &BackoffConfig, attempt: u32, rng: &mut R) -> Duration {
    let exp = 2u64.saturating_pow(attempt);
    let raw_ms = config.base_delay_ms.saturating_mul(exp);
    let capped_ms = raw_ms.min(config.max_delay_ms);

    let jitter_max_ms = (capped_ms as f64 * config.jitter_fraction) as u64;
    let jitter_ms = if jitter_max_ms > 0 {
        rng.gen_range(0..=jitter_max_ms)
    } else {
        0
    };

    Duration::from_millis(capped_ms.saturating_add(jitter_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn backoff(base: u64, max: u64, jitter: f64) -> BackoffConfig {
        BackoffConfig {
            base_delay_ms: base,
            max_delay_ms: max,
            jitter_fraction: jitter,
        }
    }

    #[test]
    fn compute_delay_exponential() {
        let config = backoff(100, 10_000, 0.0);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(compute_delay(&config, 0, &mut rng), Duration::from_millis(100));
        assert_eq!(compute_delay(&config, 1, &mut rng), Duration::from_millis(200));
        assert_eq!(compute_delay(&config, 3, &mut rng), Duration::from_millis(800));
    }

    #[test]
    fn compute_delay_capped() {
        let config = backoff(1_000, 5_000, 0.0);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(compute_delay(&config, 10, &mut rng), Duration::from_millis(5_000));
        assert_eq!(compute_delay(&config, 63, &mut rng), Duration::from_millis(5_000));
    }

    #[test]
    fn compute_delay_jitter_bounded() {
        let config = backoff(1_000, 30_000, 0.25);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let delay = compute_delay(&config, 0, &mut rng);
            assert!(delay >= Duration::from_millis(1_000));
            assert!(delay <= Duration::from_millis(1_250));
        }
    }

    #[test]
    fn compute_delay_saturates_at_extreme_caps() {
        let config = backoff(u64::MAX, u64::MAX, 1.0);
        let mut rng = StdRng::seed_from_u64(3);
        for attempt in [0, 1, 63] {
            let delay = compute_delay(&config, attempt, &mut rng);
            assert_eq!(delay, Duration::from_millis(u64::MAX));
        }
    }

    #[test]
    fn zero_base_is_immediate() {
        let mut rng = StdRng::seed_from_u64(7);
        let delay = compute_delay(&BackoffConfig::default(), 2, &mut rng);
        assert_eq!(delay, Duration::ZERO);
    }
}
