use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub const BASE_BACKOFF_MS: u64 = 200;

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);
static JITTER_COUNTER: AtomicU64 = AtomicU64::new(1);

pub fn should_retry_status(status: u16) -> bool {
    status == 408 || status == 425 || status == 429 || status >= 500
}

pub fn next_backoff_ms(attempt: usize) -> u64 {
    let shift = attempt.min(5);
    BASE_BACKOFF_MS.saturating_mul(1_u64 << shift)
}

pub fn next_backoff_ms_with_jitter(attempt: usize, jitter_enabled: bool) -> u64 {
    let base = next_backoff_ms(attempt);
    if !jitter_enabled || base <= 1 {
        return base;
    }

    // Jitter stays within [50%, 100%] of the deterministic backoff.
    let low = base / 2;
    let width = base.saturating_sub(low);
    let seed = JITTER_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mixed = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_left(17) ^ 0xA24B_AED4_963E_E407;
    low.saturating_add(mixed % width.saturating_add(1))
}

pub fn parse_retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let raw = headers.get("retry-after")?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(seconds.saturating_mul(1000));
    }

    let retry_at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    let delay_ms = retry_at.signed_duration_since(Utc::now()).num_milliseconds();
    if delay_ms <= 0 {
        return Some(0);
    }
    u64::try_from(delay_ms).ok()
}

pub fn provider_retry_delay_ms(
    attempt: usize,
    jitter_enabled: bool,
    retry_after_ms: Option<u64>,
) -> u64 {
    let backoff_ms = next_backoff_ms_with_jitter(attempt, jitter_enabled);
    retry_after_ms.map_or(backoff_ms, |retry_after_ms| backoff_ms.max(retry_after_ms))
}

/// A zero budget means unbounded.
pub fn retry_budget_allows_delay(elapsed_ms: u64, delay_ms: u64, retry_budget_ms: u64) -> bool {
    retry_budget_ms == 0 || elapsed_ms.saturating_add(delay_ms) <= retry_budget_ms
}

pub fn is_retryable_http_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

pub fn new_request_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let count = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("spirit-{millis}-{count}")
}

#[cfg(test)]
mod tests {
    use reqwest::header::{HeaderMap, HeaderValue};

    use super::{
        new_request_id, next_backoff_ms, next_backoff_ms_with_jitter, parse_retry_after_ms,
        provider_retry_delay_ms, retry_budget_allows_delay, should_retry_status,
    };

    #[test]
    fn retryable_statuses_cover_throttling_and_server_errors() {
        assert!(should_retry_status(429));
        assert!(should_retry_status(503));
        assert!(!should_retry_status(400));
        assert!(!should_retry_status(403));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(next_backoff_ms(0), 200);
        assert_eq!(next_backoff_ms(2), 800);
        assert_eq!(next_backoff_ms(40), next_backoff_ms(5));
    }

    #[test]
    fn jittered_backoff_stays_within_half_to_full_window() {
        let base = next_backoff_ms(3);
        for _ in 0..32 {
            let value = next_backoff_ms_with_jitter(3, true);
            assert!(value >= base / 2 && value <= base, "{value} outside window");
        }
        assert_eq!(next_backoff_ms_with_jitter(3, false), base);
    }

    #[test]
    fn retry_after_seconds_override_shorter_backoff() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("2"));
        let retry_after = parse_retry_after_ms(&headers);
        assert_eq!(retry_after, Some(2_000));
        assert_eq!(provider_retry_delay_ms(0, false, retry_after), 2_000);

        headers.insert("retry-after", HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after_ms(&headers), None);
    }

    #[test]
    fn retry_budget_is_respected() {
        assert!(retry_budget_allows_delay(500, 400, 0));
        assert!(retry_budget_allows_delay(500, 400, 1_000));
        assert!(!retry_budget_allows_delay(700, 400, 1_000));
    }

    #[test]
    fn request_ids_are_unique() {
        let first = new_request_id();
        let second = new_request_id();
        assert!(first.starts_with("spirit-"));
        assert_ne!(first, second);
    }
}
