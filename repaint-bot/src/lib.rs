//! # repaint-bot — Canvas Reconciliation Bot
//!
//! Keeps a region of a shared pixel canvas equal to a local target image,
//! spreading writes over every configured API token and honouring each
//! token's rate limit.
//!
//! ## Modes
//!
//! - **Run** (default): load config, validate against the live canvas,
//!   reconcile until Ctrl-C.
//! - **Gen-config**: print the default TOML configuration and exit.

pub mod config;
pub mod signal;
