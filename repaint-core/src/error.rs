//! Domain-specific error types for canvas reconciliation.
//!
//! Runtime operations return `Result<T, RepaintError>`. Problems with the
//! setup (credentials, target image, placement) are [`ConfigError`]s and are
//! only ever raised before the dispatch loop starts.

use std::path::PathBuf;

use thiserror::Error;

/// The canonical error type for the reconciliation engine.
#[derive(Debug, Error)]
pub enum RepaintError {
    // ── Transport Errors ─────────────────────────────────────────
    /// The HTTP layer failed (connect, TLS, timeout, body read).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a status the caller cannot use.
    #[error("{endpoint} returned status {status}")]
    Status { endpoint: &'static str, status: u16 },

    // ── Decoding Errors ──────────────────────────────────────────
    /// A response body could not be interpreted.
    #[error("decode error: {0}")]
    Decode(String),

    /// The fetched canvas cannot hold the target region.
    #[error("canvas {width}x{height} is too small for the target region ending at ({need_x}, {need_y})")]
    CanvasTooSmall {
        width: u32,
        height: u32,
        need_x: u32,
        need_y: u32,
    },

    // ── Setup Errors ─────────────────────────────────────────────
    /// Invalid setup; fatal.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RepaintError {
    /// Whether the dispatcher may log this error and carry on.
    ///
    /// Everything except configuration errors is transient.
    pub fn is_transient(&self) -> bool {
        !matches!(self, RepaintError::Config(_))
    }
}

// ── ConfigError ───────────────────────────────────────────────────

/// Startup-time configuration problems. None of these are retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No worker credentials were supplied.
    #[error("no worker credentials configured")]
    NoWorkers,

    /// The target image could not be opened or decoded.
    #[error("failed to load target image {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The target image is not 8-bit RGBA.
    #[error("target image {path} is {found}, expected 8-bit RGBA")]
    NotRgba { path: PathBuf, found: String },

    /// The target region does not fit on the remote canvas.
    #[error(
        "target {target_width}x{target_height} at ({offset_x}, {offset_y}) does not fit on canvas {canvas_width}x{canvas_height}"
    )]
    TargetTooLarge {
        target_width: u32,
        target_height: u32,
        offset_x: u32,
        offset_y: u32,
        canvas_width: u32,
        canvas_height: u32,
    },

    /// A scheduling parameter is out of range.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(&'static str),
}

pub type Result<T> = std::result::Result<T, RepaintError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = RepaintError::Status {
            endpoint: "set_pixel",
            status: 502,
        };
        assert!(e.to_string().contains("set_pixel"));
        assert!(e.to_string().contains("502"));

        let e = ConfigError::TargetTooLarge {
            target_width: 200,
            target_height: 10,
            offset_x: 0,
            offset_y: 0,
            canvas_width: 160,
            canvas_height: 90,
        };
        assert!(e.to_string().contains("200x10"));
        assert!(e.to_string().contains("160x90"));
    }

    #[test]
    fn config_errors_are_not_transient() {
        let e: RepaintError = ConfigError::NoWorkers.into();
        assert!(matches!(e, RepaintError::Config(_)));
        assert!(!e.is_transient());
    }

    #[test]
    fn runtime_errors_are_transient() {
        let e = RepaintError::Decode("short body".into());
        assert!(e.is_transient());

        let e = RepaintError::Status {
            endpoint: "get_pixels",
            status: 503,
        };
        assert!(e.is_transient());
    }
}
