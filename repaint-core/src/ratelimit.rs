//! Per-worker cooldown tracking.
//!
//! Every write response carries some combination of rate-limit headers.
//! [`RateLimitSignals`] normalises them; [`RateLimitTracker`] turns them
//! into a "not before" instant for the worker that received them.
//!
//! Precedence when several signals arrive together is fixed:
//! upstream throttle > cooldown violation > remaining counter.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use tokio::time::Instant;
use tracing::debug;

// ── HeaderNames ──────────────────────────────────────────────────

/// Names of the response headers that carry rate-limit information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderNames {
    /// Writes left in the current window.
    pub remaining: String,
    /// Seconds until the window resets.
    pub reset: String,
    /// Seconds to wait after writing too fast.
    pub cooldown: String,
    /// Seconds to wait after an edge/CDN throttle.
    pub upstream: String,
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self {
            remaining: "requests-remaining".into(),
            reset: "requests-reset".into(),
            cooldown: "cooldown-reset".into(),
            upstream: "retry-after".into(),
        }
    }
}

// ── RateLimitSignals ─────────────────────────────────────────────

/// Rate-limit information extracted from one write response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitSignals {
    /// Remaining-request counter.
    pub remaining: Option<i64>,
    /// Delay paired with the counter.
    pub reset: Option<Duration>,
    /// Cooldown-violation delay.
    pub cooldown: Option<Duration>,
    /// Upstream throttle delay.
    pub upstream: Option<Duration>,
}

impl RateLimitSignals {
    /// Read the signals out of a header map. Malformed values are ignored.
    pub fn from_headers(headers: &HeaderMap, names: &HeaderNames) -> Self {
        Self {
            remaining: header_str(headers, &names.remaining).and_then(parse_count),
            reset: header_str(headers, &names.reset).and_then(parse_seconds),
            cooldown: header_str(headers, &names.cooldown).and_then(parse_seconds),
            upstream: header_str(headers, &names.upstream).and_then(parse_seconds),
        }
    }

    /// Fill in `fallback` where the server asked for a wait without saying
    /// how long: a `429` with no delay at all, or an exhausted counter with
    /// no usable reset.
    pub fn with_throttle_fallback(mut self, status: StatusCode, fallback: Duration) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS && !self.has_delay() {
            self.upstream = Some(fallback);
        }
        if matches!(self.remaining, Some(n) if n <= 0) && self.reset.is_none() {
            self.reset = Some(fallback);
        }
        self
    }

    /// Whether any signal would impose a wait.
    pub fn has_delay(&self) -> bool {
        self.upstream.is_some()
            || self.cooldown.is_some()
            || matches!(self.remaining, Some(n) if n <= 0)
    }

    /// The delay these signals impose, or `None` for "free to write".
    pub fn delay(&self) -> Option<Duration> {
        if let Some(d) = self.upstream {
            return Some(d);
        }
        if let Some(d) = self.cooldown {
            return Some(d);
        }
        match self.remaining {
            Some(n) if n <= 0 => Some(self.reset.unwrap_or(Duration::ZERO)),
            _ => None,
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let value = headers.get(name)?;
    match value.to_str() {
        Ok(s) => Some(s.trim()),
        Err(_) => {
            debug!("ignoring non-ascii {name} header");
            None
        }
    }
}

fn parse_count(raw: &str) -> Option<i64> {
    if let Ok(n) = raw.parse::<i64>() {
        return Some(n);
    }
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() => Some(f.floor() as i64),
        _ => {
            debug!("ignoring malformed counter {raw:?}");
            None
        }
    }
}

fn parse_seconds(raw: &str) -> Option<Duration> {
    match raw.parse::<f64>().ok().and_then(|s| Duration::try_from_secs_f64(s).ok()) {
        Some(d) => Some(d),
        None => {
            debug!("ignoring malformed delay {raw:?}");
            None
        }
    }
}

// ── RateLimitTracker ─────────────────────────────────────────────

/// One worker's cooldown state.
#[derive(Debug, Clone, Default)]
pub struct RateLimitTracker {
    not_until: Option<Instant>,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cooldown with the one implied by `signals`.
    ///
    /// Returns the new "not until" instant, `None` when the worker is free.
    pub fn record(&mut self, signals: &RateLimitSignals, now: Instant) -> Option<Instant> {
        self.not_until = signals.delay().map(|d| now + d);
        self.not_until
    }

    /// Set an explicit cooldown (used for workers that start limited).
    pub fn limit_until(&mut self, when: Instant) {
        self.not_until = Some(when);
    }

    pub fn not_until(&self) -> Option<Instant> {
        self.not_until
    }

    /// `true` iff a cooldown is set and lies strictly after `now`.
    pub fn is_limited(&self, now: Instant) -> bool {
        matches!(self.not_until, Some(t) if t > now)
    }

    /// Time left before the next write is allowed.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.not_until
            .map(|t| t.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    fn secs(s: u64) -> Option<Duration> {
        Some(Duration::from_secs(s))
    }

    #[test]
    fn upstream_throttle_wins_over_everything() {
        let now = Instant::now();
        let mut tracker = RateLimitTracker::new();
        let signals = RateLimitSignals {
            remaining: Some(0),
            reset: secs(10),
            cooldown: secs(3),
            upstream: secs(5),
        };
        assert_eq!(tracker.record(&signals, now), Some(now + Duration::from_secs(5)));
    }

    #[test]
    fn cooldown_violation_beats_counter() {
        let now = Instant::now();
        let mut tracker = RateLimitTracker::new();
        let signals = RateLimitSignals {
            remaining: Some(0),
            reset: secs(10),
            cooldown: secs(3),
            upstream: None,
        };
        assert_eq!(tracker.record(&signals, now), Some(now + Duration::from_secs(3)));

        // Even a healthy counter does not cancel a violation.
        let signals = RateLimitSignals {
            remaining: Some(4),
            reset: secs(10),
            cooldown: secs(2),
            upstream: None,
        };
        assert_eq!(tracker.record(&signals, now), Some(now + Duration::from_secs(2)));
    }

    #[test]
    fn exhausted_counter_waits_for_reset() {
        let now = Instant::now();
        let mut tracker = RateLimitTracker::new();
        let signals = RateLimitSignals {
            remaining: Some(0),
            reset: secs(8),
            ..Default::default()
        };
        tracker.record(&signals, now);
        assert!(tracker.is_limited(now));
        assert!(tracker.is_limited(now + Duration::from_secs(7)));
        assert!(!tracker.is_limited(now + Duration::from_secs(8)));
        assert_eq!(tracker.remaining(now + Duration::from_secs(3)), Duration::from_secs(5));
    }

    #[test]
    fn negative_counter_counts_as_exhausted() {
        let signals = RateLimitSignals {
            remaining: Some(-1),
            reset: secs(4),
            ..Default::default()
        };
        assert_eq!(signals.delay(), secs(4));
    }

    #[test]
    fn positive_counter_clears_prior_cooldown() {
        let now = Instant::now();
        let mut tracker = RateLimitTracker::new();
        tracker.limit_until(now + Duration::from_secs(100));
        assert!(tracker.is_limited(now));

        let signals = RateLimitSignals {
            remaining: Some(3),
            reset: secs(10),
            ..Default::default()
        };
        assert_eq!(tracker.record(&signals, now), None);
        assert!(!tracker.is_limited(now));
        assert_eq!(tracker.remaining(now), Duration::ZERO);
    }

    #[test]
    fn empty_signals_clear() {
        let now = Instant::now();
        let mut tracker = RateLimitTracker::new();
        tracker.limit_until(now + Duration::from_secs(1));
        assert_eq!(tracker.record(&RateLimitSignals::default(), now), None);
    }

    #[test]
    fn cooldown_ending_exactly_now_is_not_limiting() {
        let now = Instant::now();
        let mut tracker = RateLimitTracker::new();
        tracker.limit_until(now);
        assert!(!tracker.is_limited(now));
    }

    #[test]
    fn headers_are_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert("requests-remaining", HeaderValue::from_static("0"));
        headers.insert("requests-reset", HeaderValue::from_static("7.5"));
        headers.insert("cooldown-reset", HeaderValue::from_static("not-a-number"));
        let signals = RateLimitSignals::from_headers(&headers, &HeaderNames::default());
        assert_eq!(signals.remaining, Some(0));
        assert_eq!(signals.reset, Some(Duration::from_millis(7500)));
        assert_eq!(signals.cooldown, None);
        assert_eq!(signals.upstream, None);
    }

    #[test]
    fn custom_header_names() {
        let names = HeaderNames {
            upstream: "x-edge-wait".into(),
            ..HeaderNames::default()
        };
        let mut headers = HeaderMap::new();
        headers.insert("x-edge-wait", HeaderValue::from_static("12"));
        let signals = RateLimitSignals::from_headers(&headers, &names);
        assert_eq!(signals.upstream, secs(12));
    }

    #[test]
    fn bare_429_falls_back() {
        let signals = RateLimitSignals::default()
            .with_throttle_fallback(StatusCode::TOO_MANY_REQUESTS, Duration::from_secs(10));
        assert_eq!(signals.delay(), secs(10));

        // A 429 that already names a delay keeps it.
        let signals = RateLimitSignals {
            cooldown: secs(2),
            ..Default::default()
        }
        .with_throttle_fallback(StatusCode::TOO_MANY_REQUESTS, Duration::from_secs(10));
        assert_eq!(signals.delay(), secs(2));

        let signals =
            RateLimitSignals::default().with_throttle_fallback(StatusCode::OK, Duration::from_secs(10));
        assert_eq!(signals.delay(), None);
    }

    #[test]
    fn exhausted_counter_without_reset_falls_back() {
        let exhausted = RateLimitSignals {
            remaining: Some(0),
            ..Default::default()
        };
        assert_eq!(exhausted.delay(), Some(Duration::ZERO));

        let signals = exhausted.with_throttle_fallback(StatusCode::OK, Duration::from_secs(10));
        assert_eq!(signals.delay(), secs(10));

        // A reset the server did send is kept.
        let signals = RateLimitSignals {
            remaining: Some(0),
            reset: secs(3),
            ..Default::default()
        }
        .with_throttle_fallback(StatusCode::OK, Duration::from_secs(10));
        assert_eq!(signals.delay(), secs(3));

        // A counter with requests left needs no reset.
        let signals = RateLimitSignals {
            remaining: Some(2),
            ..Default::default()
        }
        .with_throttle_fallback(StatusCode::OK, Duration::from_secs(10));
        assert_eq!(signals.delay(), None);
    }
}
