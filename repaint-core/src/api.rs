//! Remote canvas API.
//!
//! [`CanvasApi`] is the seam between the scheduler and the network: the
//! production implementation, [`HttpCanvasApi`], talks to the pixels
//! service over HTTPS, and tests plug in an in-memory fake.
//!
//! | Endpoint          | Auth   | Response                              |
//! |-------------------|--------|---------------------------------------|
//! | `GET get_size`    | none   | `{"width": int, "height": int}`       |
//! | `GET get_pixels`  | bearer | raw RGB, `width * height * 3` bytes   |
//! | `POST set_pixel`  | bearer | JSON + rate-limit headers             |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;

use crate::canvas::{CanvasSize, CanvasSnapshot, Pixel};
use crate::error::{RepaintError, Result};
use crate::ratelimit::{HeaderNames, RateLimitSignals};

pub const DEFAULT_BASE_URL: &str = "https://pixels.pythondiscord.com";

// ── SetPixelResponse ─────────────────────────────────────────────

/// What came back from one `set_pixel` call.
#[derive(Debug, Clone)]
pub struct SetPixelResponse {
    /// HTTP status code.
    pub status: u16,
    /// Rate-limit signals carried by the response.
    pub signals: RateLimitSignals,
    /// Decoded body; a JSON string when the body was not JSON.
    pub body: serde_json::Value,
}

impl SetPixelResponse {
    /// Whether the write was accepted (2xx).
    pub fn accepted(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The server's `message` field if present, otherwise the raw body.
    pub fn message(&self) -> String {
        match self.body.get("message").and_then(|m| m.as_str()) {
            Some(m) => m.to_string(),
            None => match &self.body {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        }
    }
}

// ── CanvasApi ────────────────────────────────────────────────────

/// The three remote operations the engine needs.
#[async_trait]
pub trait CanvasApi: Send + Sync {
    /// Canvas dimensions. Unauthenticated.
    async fn get_size(&self) -> Result<CanvasSize>;

    /// Current canvas contents, read with `token`.
    async fn get_pixels(&self, token: &str, size: CanvasSize) -> Result<CanvasSnapshot>;

    /// Paint one pixel with `token`.
    ///
    /// Any HTTP status is a valid response here; only transport and
    /// decoding failures are errors.
    async fn set_pixel(&self, token: &str, pixel: &Pixel) -> Result<SetPixelResponse>;
}

// ── HttpCanvasApi ────────────────────────────────────────────────

/// Settings for [`HttpCanvasApi`].
#[derive(Debug, Clone)]
pub struct HttpApiConfig {
    /// Service root, without a trailing slash.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Rate-limit header names.
    pub headers: HeaderNames,
    /// Delay assumed for a `429` that carries no usable header.
    pub throttle_fallback: Duration,
}

impl Default for HttpApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            timeout: Duration::from_secs(10),
            headers: HeaderNames::default(),
            throttle_fallback: Duration::from_secs(10),
        }
    }
}

/// `reqwest`-backed [`CanvasApi`].
pub struct HttpCanvasApi {
    client: Client,
    config: HttpApiConfig,
}

impl HttpCanvasApi {
    pub fn new(config: HttpApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("repaint/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }
}

#[async_trait]
impl CanvasApi for HttpCanvasApi {
    async fn get_size(&self) -> Result<CanvasSize> {
        let resp = self.client.get(self.url("get_size")).send().await?;
        if !resp.status().is_success() {
            return Err(RepaintError::Status {
                endpoint: "get_size",
                status: resp.status().as_u16(),
            });
        }
        let size = resp
            .json::<CanvasSize>()
            .await
            .map_err(|e| RepaintError::Decode(format!("get_size body: {e}")))?;
        Ok(size)
    }

    async fn get_pixels(&self, token: &str, size: CanvasSize) -> Result<CanvasSnapshot> {
        let resp = self
            .client
            .get(self.url("get_pixels"))
            .header(AUTHORIZATION, Self::bearer(token))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(RepaintError::Status {
                endpoint: "get_pixels",
                status: resp.status().as_u16(),
            });
        }
        let data = resp.bytes().await?;
        CanvasSnapshot::from_raw(size, data)
    }

    async fn set_pixel(&self, token: &str, pixel: &Pixel) -> Result<SetPixelResponse> {
        let resp = self
            .client
            .post(self.url("set_pixel"))
            .header(AUTHORIZATION, Self::bearer(token))
            .json(pixel)
            .send()
            .await?;

        let status = resp.status();
        let signals = RateLimitSignals::from_headers(resp.headers(), &self.config.headers)
            .with_throttle_fallback(status, self.config.throttle_fallback);
        let text = resp.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));

        Ok(SetPixelResponse {
            status: status.as_u16(),
            signals,
            body,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────
