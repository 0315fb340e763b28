//! Backoff arithmetic with jitter.
//!
//! One delay shape for the whole layer: the retry executor and the
//! connection monitor's reconnect sequence both compute their waits here.

use keel_types::RetryPolicy;
use std::time::Duration;

/// Hard cap on any single computed delay.
///
/// Backoff past 30 seconds stops helping a recovering resource and starts
/// looking like a hang to the user.
pub const MAX_DELAY: Duration = Duration::from_secs(30);

/// Delay to wait after the `attempt`-th failure (1-based).
///
/// `base * multiplier^(attempt-1)`, capped at [`MAX_DELAY`], then spread
/// uniformly over ±50% when the policy enables jitter. The jittered value is
/// re-capped so the cap is absolute.
pub fn retry_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let multiplier = policy.backoff_multiplier.max(1.0);
    let base_ms = policy.base_delay.as_millis().min(u128::from(u32::MAX)) as f64;
    let raw_ms = base_ms * multiplier.powi(exp as i32);
    let capped_ms = raw_ms.min(MAX_DELAY.as_millis() as f64) as u64;

    if !policy.jitter || capped_ms == 0 {
        return Duration::from_millis(capped_ms);
    }

    // Uniform in [0.5 * d, 1.5 * d].
    let jittered = capped_ms / 2 + random_below(capped_ms + 1);
    Duration::from_millis(jittered.min(MAX_DELAY.as_millis() as u64))
}

/// Uniform random value in `0..bound`.
fn random_below(bound: u64) -> u64 {
    let mut bytes = [0u8; 8];
    // Infallible on every supported platform; a zero fill on failure only
    // flattens the jitter, it never breaks the delay bound.
    let _ = getrandom::getrandom(&mut bytes);
    u64::from_le_bytes(bytes) % bound.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_ms(base: u64, multiplier: f64) -> RetryPolicy {
        RetryPolicy::default()
            .with_base_delay(Duration::from_millis(base))
            .with_backoff_multiplier(multiplier)
            .with_jitter(false)
    }

    #[test]
    fn grows_exponentially_without_jitter() {
        let policy = policy_ms(100, 2.0);
        assert_eq!(retry_delay(&policy, 1), Duration::from_millis(100));
        assert_eq!(retry_delay(&policy, 2), Duration::from_millis(200));
        assert_eq!(retry_delay(&policy, 3), Duration::from_millis(400));
    }

    #[test]
    fn capped_at_max_delay() {
        let policy = policy_ms(1_000, 10.0);
        assert_eq!(retry_delay(&policy, 10), MAX_DELAY);
    }

    #[test]
    fn jitter_stays_within_half_delay() {
        let policy = policy_ms(1_000, 1.0).with_jitter(true);
        for _ in 0..50 {
            let d = retry_delay(&policy, 1);
            assert!(d >= Duration::from_millis(500), "too short: {:?}", d);
            assert!(d <= Duration::from_millis(1_500), "too long: {:?}", d);
        }
    }

    #[test]
    fn jitter_creates_variance() {
        let policy = policy_ms(10_000, 1.0).with_jitter(true);
        let delays: Vec<Duration> = (0..20).map(|_| retry_delay(&policy, 1)).collect();
        let min = delays.iter().min().unwrap();
        let max = delays.iter().max().unwrap();
        // 20 samples over a 10-second spread colliding within 100ms is
        // vanishingly unlikely.
        assert!(max.as_millis() - min.as_millis() >= 100);
    }

    #[test]
    fn sub_unity_multiplier_treated_as_flat() {
        let policy = policy_ms(100, 0.5);
        assert_eq!(retry_delay(&policy, 5), Duration::from_millis(100));
    }

    #[test]
    fn huge_attempt_does_not_overflow() {
        let policy = policy_ms(100, 2.0);
        assert_eq!(retry_delay(&policy, u32::MAX), MAX_DELAY);
    }

    #[test]
    fn zero_base_delay_is_zero() {
        let policy = policy_ms(0, 2.0).with_jitter(true);
        assert_eq!(retry_delay(&policy, 3), Duration::ZERO);
    }
}
