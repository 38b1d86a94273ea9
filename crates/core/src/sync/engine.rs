//! Retry/backoff helpers and scheduler constants for sync orchestration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default incremental sync cadence in seconds.
pub const SYNC_FOREGROUND_INTERVAL_SECS: u64 = 45;

/// Maximum jitter (seconds) added to periodic cycle intervals.
pub const SYNC_INTERVAL_JITTER_SECS: u64 = 5;

/// Cadence of the periodic full resync that self-heals records dropped by
/// validation or deferred conflicts on earlier incremental runs.
pub const FULL_RESYNC_INTERVAL_SECS: u64 = 60 * 60 * 24;

/// Consecutive exhausted page failures that count as total connectivity
/// loss and stop a run early.
pub const CONSECUTIVE_PAGE_FAILURE_LIMIT: u32 = 3;

/// Device/gateway clock skew above this is a diagnostic warning.
pub const CLOCK_SKEW_WARN_SECS: i64 = 60;

/// Device/gateway clock skew above this is a diagnostic failure.
pub const CLOCK_SKEW_FAIL_SECS: i64 = 300;

/// Cap applied to exponential page-retry backoff.
pub const RETRY_BACKOFF_CAP_MS: u64 = 30_000;

/// Retry policy classification for gateway failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

/// Classify HTTP status into retry behavior.
pub fn classify_http_status(status: u16) -> SyncRetryClass {
    match status {
        401 | 403 => SyncRetryClass::ReauthRequired,
        408 | 409 | 423 | 425 | 429 => SyncRetryClass::Retryable,
        500..=599 => SyncRetryClass::Retryable,
        _ => SyncRetryClass::Permanent,
    }
}

/// Exponential backoff for page/batch retries: `base * 2^attempt`, capped.
pub fn backoff_delay(attempt: u32, base_delay_ms: u64, cap_ms: u64) -> Duration {
    const MAX_EXPONENT: u32 = 8;
    let exp = attempt.min(MAX_EXPONENT);
    let delay = base_delay_ms.saturating_mul(1_u64 << exp).min(cap_ms);
    Duration::from_millis(delay)
}

/// Backoff with up to 20% jitter on top, to keep a fleet of workers from
/// hammering the gateway in lockstep.
pub fn backoff_with_jitter(attempt: u32, base_delay_ms: u64, cap_ms: u64) -> Duration {
    use rand::Rng;
    let base = backoff_delay(attempt, base_delay_ms, cap_ms);
    let jitter_bound = (base.as_millis() as u64 / 5).max(1);
    let jitter = rand::thread_rng().gen_range(0..=jitter_bound);
    base + Duration::from_millis(jitter)
}

/// Classify measured clock skew against the diagnostic thresholds.
pub fn classify_clock_skew(skew_secs: i64) -> SkewSeverity {
    let magnitude = skew_secs.abs();
    if magnitude <= CLOCK_SKEW_WARN_SECS {
        SkewSeverity::Acceptable
    } else if magnitude <= CLOCK_SKEW_FAIL_SECS {
        SkewSeverity::Elevated
    } else {
        SkewSeverity::Excessive
    }
}

/// Severity of device/gateway clock skew.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkewSeverity {
    Acceptable,
    Elevated,
    Excessive,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_http_status_for_retry_policy() {
        assert_eq!(classify_http_status(500), SyncRetryClass::Retryable);
        assert_eq!(classify_http_status(429), SyncRetryClass::Retryable);
        assert_eq!(classify_http_status(401), SyncRetryClass::ReauthRequired);
        assert_eq!(classify_http_status(400), SyncRetryClass::Permanent);
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        assert_eq!(backoff_delay(0, 1_000, 30_000), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(1, 1_000, 30_000), Duration::from_millis(2_000));
        assert_eq!(backoff_delay(2, 1_000, 30_000), Duration::from_millis(4_000));
        assert_eq!(backoff_delay(9, 1_000, 30_000), backoff_delay(8, 1_000, 30_000));
        assert_eq!(backoff_delay(6, 1_000, 30_000), Duration::from_millis(30_000));
    }

    #[test]
    fn jittered_backoff_stays_within_bound() {
        for attempt in 0..4 {
            let base = backoff_delay(attempt, 1_000, 30_000);
            let jittered = backoff_with_jitter(attempt, 1_000, 30_000);
            assert!(jittered >= base);
            assert!(jittered <= base + Duration::from_millis(base.as_millis() as u64 / 5 + 1));
        }
    }

    #[test]
    fn clock_skew_thresholds() {
        assert_eq!(classify_clock_skew(10), SkewSeverity::Acceptable);
        assert_eq!(classify_clock_skew(-10), SkewSeverity::Acceptable);
        assert_eq!(classify_clock_skew(120), SkewSeverity::Elevated);
        assert_eq!(classify_clock_skew(-301), SkewSeverity::Excessive);
    }
}
