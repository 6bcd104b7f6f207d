use std::time::Duration;

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Reconnect delay for `attempt`: exponential from `base`, capped at `max`,
/// plus jitter up to the capped value (never exceeding `max`).
pub fn delay_for(attempt: u32, base: Duration, max: Duration) -> Duration {
    let pow = attempt.min(16); // prevent overflow
    let base_ms = base.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    let capped = base_ms.saturating_mul(1u64 << pow).min(max_ms);
    let jitter = if capped == 0 {
        0
    } else {
        rand::random::<u64>() % capped
    };
    Duration::from_millis(capped.saturating_add(jitter).min(max_ms))
}
