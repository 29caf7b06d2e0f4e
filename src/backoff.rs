use std::time::Duration;

use rand::Rng;

/// Maximum jitter added to every retry delay.
pub const JITTER_MS: u64 = 1000;

/// Capped exponential retry delay: `min(2^retries, cap)` seconds plus up to
/// one second of uniform jitter so synchronized failures do not retry in
/// lockstep.
pub fn retry_delay(retries: i32, cap: Duration) -> Duration {
    let exp = retries.clamp(0, 30) as u32;
    let base = Duration::from_secs(1u64 << exp).min(cap);
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..JITTER_MS));
    base + jitter
}
