//! # repaint-core
//!
//! Reconciliation engine that keeps a shared remote pixel canvas in line
//! with a local target image.
//!
//! This crate contains:
//! - **Canvas types**: `Rgb`, `Pixel`, `CanvasSize`, `TargetImage`, `CanvasSnapshot`
//! - **Diff**: `diff` and the randomly drained `WorkQueue`
//! - **Rate limits**: `RateLimitSignals` parsed from response headers, `RateLimitTracker`
//! - **API**: the `CanvasApi` trait and its `reqwest` implementation
//! - **Worker**: one credential plus its cooldown
//! - **Dispatcher**: the fetch → diff → write loop
//! - **Error**: `RepaintError` / `ConfigError`, `thiserror`-based

pub mod api;
pub mod canvas;
pub mod diff;
pub mod dispatcher;
pub mod error;
pub mod ratelimit;
pub mod worker;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use api::{CanvasApi, DEFAULT_BASE_URL, HttpApiConfig, HttpCanvasApi, SetPixelResponse};
pub use canvas::{CanvasSize, CanvasSnapshot, Pixel, Rgb, TargetImage};
pub use diff::{WorkQueue, diff};
pub use dispatcher::{DispatchStats, Dispatcher, DispatcherConfig, PassOutcome};
pub use error::{ConfigError, RepaintError, Result};
pub use ratelimit::{HeaderNames, RateLimitSignals, RateLimitTracker};
pub use worker::{SubmitOutcome, Worker};
