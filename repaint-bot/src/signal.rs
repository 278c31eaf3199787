//! Ctrl-C wiring.

use std::future::Future;
use std::io;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancel `stop` once `interrupt` fires.
///
/// If the interrupt listener cannot be installed the bot keeps running;
/// it just cannot be stopped gracefully.
pub async fn cancel_on_interrupt<F>(interrupt: F, stop: CancellationToken)
where
    F: Future<Output = io::Result<()>>,
{
    match interrupt.await {
        Ok(()) => {
            info!("interrupt received, stopping after the current write");
            stop.cancel();
        }
        Err(e) => warn!("cannot listen for interrupts: {e}; running without Ctrl-C handling"),
    }
}
