//! Exponential backoff for queue job retries (§4.7) and webhook delivery
//! (§4.10).

use std::cmp::min;
use std::time::Duration;

/// Returns an iterator of [`Duration`]s suitable for e.g. [`tokio::time::sleep`]
/// to observe exponential backoff starting at `base` and capped at `max`.
///
/// ```
/// # use gateway_common::backoff::get_backoff_iter;
/// # use std::time::Duration;
/// let mut it = get_backoff_iter(Duration::from_secs(30), Duration::from_secs(600));
/// assert_eq!(it.next(), Some(Duration::from_secs(30)));
/// assert_eq!(it.next(), Some(Duration::from_secs(60)));
/// ```
pub fn get_backoff_iter(
    base: Duration,
    max: Duration,
) -> impl Iterator<Item = Duration> {
    let base_ms = base.as_millis().max(1) as u64;
    let max_ms = max.as_millis() as u64;
    (0u32..).map(move |index| {
        let factor = 2u64.saturating_pow(index);
        let wait_ms = base_ms.saturating_mul(factor);
        Duration::from_millis(min(wait_ms, max_ms))
    })
}

/// The fixed minute-offset retry schedule for webhook delivery (§4.10):
/// 0, 1, 5, 15, 60, 240, 1440 minutes, 7 attempts total.
pub fn webhook_schedule_minutes() -> &'static [u64] {
    &[0, 1, 5, 15, 60, 240, 1440]
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn no_integer_overflow() {
        let mut it = get_backoff_iter(
            Duration::from_secs(30),
            Duration::from_secs(600),
        );
        for _ in 0..200 {
            it.next();
        }
    }

    #[test]
    fn caps_at_max() {
        let mut it = get_backoff_iter(
            Duration::from_millis(100),
            Duration::from_millis(500),
        );
        let durations: Vec<_> = (0..10).map(|_| it.next().unwrap()).collect();
        assert!(durations.iter().all(|d| *d <= Duration::from_millis(500)));
        assert_eq!(durations.last(), Some(&Duration::from_millis(500)));
    }

    #[test]
    fn webhook_schedule_has_seven_steps() {
        assert_eq!(webhook_schedule_minutes().len(), 7);
    }
}
