use std::time::Duration;

use foreman::backoff::{retry_delay, JITTER_MS};

const CAP: Duration = Duration::from_secs(60);

#[test]
fn test_delay_within_bounds_for_each_retry_count() {
    for retries in 0..=8 {
        let base = Duration::from_secs((1u64 << retries).min(CAP.as_secs()));
        for _ in 0..50 {
            let delay = retry_delay(retries, CAP);
            assert!(
                delay >= base,
                "retries={}: delay {:?} below base {:?}",
                retries,
                delay,
                base
            );
            assert!(
                delay < base + Duration::from_millis(JITTER_MS),
                "retries={}: delay {:?} exceeds jitter bound",
                retries,
                delay
            );
        }
    }
}

#[test]
fn test_delay_capped_for_large_retry_counts() {
    for retries in [6, 10, 100, i32::MAX] {
        let delay = retry_delay(retries, CAP);
        assert!(delay >= CAP);
        assert!(delay < CAP + Duration::from_millis(JITTER_MS));
    }
}

#[test]
fn test_negative_retry_count_treated_as_zero() {
    let delay = retry_delay(-1, CAP);
    assert!(delay >= Duration::from_secs(1));
    assert!(delay < Duration::from_secs(1) + Duration::from_millis(JITTER_MS));
}

#[test]
fn test_jitter_varies_between_calls() {
    let samples: Vec<Duration> = (0..100).map(|_| retry_delay(0, CAP)).collect();
    let first = samples[0];
    assert!(
        samples.iter().any(|d| *d != first),
        "100 samples produced identical delays, jitter is not applied"
    );
}
