//! One authenticated identity on the pixels API.
//!
//! A [`Worker`] owns its credential and its [`RateLimitTracker`]. Every
//! operation takes `&self`/`&mut self`, so a worker can never have two
//! requests in flight at once.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::api::CanvasApi;
use crate::canvas::{CanvasSize, CanvasSnapshot, Pixel};
use crate::error::Result;
use crate::ratelimit::RateLimitTracker;

// ── SubmitOutcome ────────────────────────────────────────────────

/// Result of a single `set_pixel` round-trip.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub pixel: Pixel,
    pub status: u16,
    pub accepted: bool,
    /// Server message, for logging only.
    pub message: String,
    /// Cooldown installed by this response.
    pub not_until: Option<Instant>,
}

// ── Worker ───────────────────────────────────────────────────────

pub struct Worker {
    id: usize,
    token: String,
    api: Arc<dyn CanvasApi>,
    limiter: RateLimitTracker,
}

impl Worker {
    /// `id` is only used in log lines.
    pub fn new(id: usize, token: impl Into<String>, api: Arc<dyn CanvasApi>) -> Self {
        Self {
            id,
            token: token.into(),
            api,
            limiter: RateLimitTracker::new(),
        }
    }

    /// One worker per credential, numbered from 1.
    pub fn from_tokens<I, S>(tokens: I, api: Arc<dyn CanvasApi>) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        tokens
            .into_iter()
            .enumerate()
            .map(|(i, token)| Self::new(i + 1, token, Arc::clone(&api)))
            .collect()
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Canvas dimensions, for the startup check.
    pub async fn fetch_size(&self) -> Result<CanvasSize> {
        self.api.get_size().await
    }

    /// Read the whole canvas with this worker's credential.
    pub async fn fetch_canvas(&self, size: CanvasSize) -> Result<CanvasSnapshot> {
        self.api.get_pixels(&self.token, size).await
    }

    /// Write one pixel.
    ///
    /// The cooldown is replaced from the response whatever its status; a
    /// transport error leaves it untouched.
    pub async fn submit(&mut self, pixel: Pixel) -> Result<SubmitOutcome> {
        let response = self.api.set_pixel(&self.token, &pixel).await?;
        let not_until = self.limiter.record(&response.signals, Instant::now());

        Ok(SubmitOutcome {
            pixel,
            status: response.status,
            accepted: response.accepted(),
            message: response.message(),
            not_until,
        })
    }

    pub fn is_limited(&self, now: Instant) -> bool {
        self.limiter.is_limited(now)
    }

    pub fn cooldown_remaining(&self, now: Instant) -> Duration {
        self.limiter.remaining(now)
    }

    /// Force a cooldown, e.g. when the limit is already known.
    pub fn limit_until(&mut self, when: Instant) {
        self.limiter.limit_until(when);
    }

    pub fn rate_limit(&self) -> &RateLimitTracker {
        &self.limiter
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("token", &"<redacted>")
            .field("limiter", &self.limiter)
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::api::SetPixelResponse;
    use crate::canvas::Rgb;
    use crate::error::RepaintError;
    use crate::ratelimit::RateLimitSignals;

    /// Answers every write with the same status and signals.
    struct FixedApi {
        status: u16,
        signals: RateLimitSignals,
    }

    #[async_trait]
    impl CanvasApi for FixedApi {
        async fn get_size(&self) -> Result<CanvasSize> {
            Ok(CanvasSize::new(4, 4))
        }

        async fn get_pixels(&self, _token: &str, size: CanvasSize) -> Result<CanvasSnapshot> {
            Ok(CanvasSnapshot::filled(size, Rgb::BLACK))
        }

        async fn set_pixel(&self, _token: &str, _pixel: &Pixel) -> Result<SetPixelResponse> {
            if self.status == 0 {
                return Err(RepaintError::Decode("connection reset".into()));
            }
            Ok(SetPixelResponse {
                status: self.status,
                signals: self.signals,
                body: serde_json::json!({"message": "ok"}),
            })
        }
    }

    fn worker(status: u16, signals: RateLimitSignals) -> Worker {
        Worker::new(1, "secret", Arc::new(FixedApi { status, signals }))
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_response_limits_worker() {
        let mut w = worker(
            200,
            RateLimitSignals {
                remaining: Some(0),
                reset: Some(Duration::from_secs(8)),
                ..Default::default()
            },
        );
        let outcome = w.submit(Pixel::new(0, 0, Rgb::BLACK)).await.unwrap();
        assert!(outcome.accepted);
        assert_eq!(outcome.message, "ok");
        assert!(w.is_limited(Instant::now()));
        assert_eq!(w.cooldown_remaining(Instant::now()), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_write_still_updates_cooldown() {
        let mut w = worker(
            429,
            RateLimitSignals {
                cooldown: Some(Duration::from_secs(3)),
                ..Default::default()
            },
        );
        let outcome = w.submit(Pixel::new(1, 1, Rgb::BLACK)).await.unwrap();
        assert!(!outcome.accepted);
        assert_eq!(outcome.status, 429);
        assert!(w.is_limited(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_keeps_previous_cooldown() {
        let mut w = worker(0, RateLimitSignals::default());
        let until = Instant::now() + Duration::from_secs(5);
        w.limit_until(until);
        assert!(w.submit(Pixel::new(0, 0, Rgb::BLACK)).await.is_err());
        assert_eq!(w.rate_limit().not_until(), Some(until));
    }

    #[test]
    fn debug_hides_token() {
        let w = worker(200, RateLimitSignals::default());
        let text = format!("{w:?}");
        assert!(!text.contains("secret"));
    }

    #[test]
    fn from_tokens_numbers_from_one() {
        let api: Arc<dyn CanvasApi> = Arc::new(FixedApi {
            status: 200,
            signals: RateLimitSignals::default(),
        });
        let workers = Worker::from_tokens(["a", "b", "c"], api);
        let ids: Vec<usize> = workers.iter().map(Worker::id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
