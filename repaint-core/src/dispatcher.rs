//! The reconciliation loop.
//!
//! Each pass:
//!
//! 1. A randomly chosen [`Worker`] reads the canvas.
//! 2. [`diff`] turns target vs. canvas into a [`WorkQueue`].
//! 3. An empty queue means the canvas is correct: idle, then start over.
//! 4. Otherwise workers are swept in order; each writes randomly chosen
//!    pixels until it hits its cooldown or the queue runs dry.
//! 5. When every worker is cooling down, sleep until the first one is free
//!    and sweep again with the same queue.
//!
//! A single control task drives all workers, so the queue needs no lock.
//! Stopping is cooperative through a [`CancellationToken`].

use std::fmt;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::canvas::{CanvasSize, TargetImage};
use crate::diff::{WorkQueue, diff};
use crate::error::{ConfigError, Result};
use crate::worker::Worker;

// ── DispatcherConfig ─────────────────────────────────────────────

/// Timing knobs for [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Sleep after a pass that found nothing to fix.
    pub idle_interval: Duration,
    /// Sleep after a failed canvas read.
    pub fetch_retry: Duration,
    /// Lower bound of the pause between two writes of one worker.
    pub jitter_min: Duration,
    /// Upper bound of that pause.
    pub jitter_max: Duration,
    /// Added to the shortest cooldown when every worker is limited.
    pub cooldown_margin: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_secs(60),
            fetch_retry: Duration::from_secs(5),
            jitter_min: Duration::from_millis(250),
            jitter_max: Duration::from_millis(1000),
            cooldown_margin: Duration::from_millis(500),
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.jitter_min > self.jitter_max {
            return Err(ConfigError::InvalidSchedule("jitter_min exceeds jitter_max"));
        }
        Ok(())
    }
}

// ── DispatchStats ────────────────────────────────────────────────

/// Running totals since the dispatcher was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub passes: u64,
    pub converged: u64,
    pub submitted: u64,
    pub rejected: u64,
    pub failed_submits: u64,
    pub failed_fetches: u64,
}

/// How a single pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Nothing to fix; the idle interval was slept.
    Converged,
    /// The queue was emptied.
    Drained { writes: usize },
    /// Reading or diffing the canvas failed; the retry interval was slept.
    FetchFailed,
    /// Shutdown was requested mid-pass.
    Interrupted,
}

// ── Dispatcher ───────────────────────────────────────────────────

pub struct Dispatcher {
    workers: Vec<Worker>,
    target: TargetImage,
    canvas_size: CanvasSize,
    config: DispatcherConfig,
    rng: StdRng,
    shutdown: CancellationToken,
    stats: DispatchStats,
}

impl Dispatcher {
    /// Validate the setup against the live canvas and build a dispatcher.
    ///
    /// The canvas size is read once, through a random worker.
    pub async fn start(
        workers: Vec<Worker>,
        target: TargetImage,
        config: DispatcherConfig,
    ) -> Result<Self> {
        if workers.is_empty() {
            return Err(ConfigError::NoWorkers.into());
        }
        let mut rng = StdRng::from_entropy();
        let probe = &workers[rng.gen_range(0..workers.len())];
        let canvas_size = probe.fetch_size().await?;
        info!(
            "canvas is {}x{}, target is {}x{} at {:?}",
            canvas_size.width,
            canvas_size.height,
            target.width(),
            target.height(),
            target.offset()
        );

        let mut dispatcher = Self::new(workers, target, canvas_size, config)?;
        dispatcher.rng = rng;
        Ok(dispatcher)
    }

    /// Build a dispatcher for a canvas of known size.
    pub fn new(
        workers: Vec<Worker>,
        target: TargetImage,
        canvas_size: CanvasSize,
        config: DispatcherConfig,
    ) -> Result<Self> {
        if workers.is_empty() {
            return Err(ConfigError::NoWorkers.into());
        }
        config.validate()?;
        target.check_fits(canvas_size)?;

        Ok(Self {
            workers,
            target,
            canvas_size,
            config,
            rng: StdRng::from_entropy(),
            shutdown: CancellationToken::new(),
            stats: DispatchStats::default(),
        })
    }

    /// Make worker choice, pop order and jitter reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Cancelling this token stops [`run`](Self::run) at the next write or
    /// sleep.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn canvas_size(&self) -> CanvasSize {
        self.canvas_size
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn workers_mut(&mut self) -> &mut [Worker] {
        &mut self.workers
    }

    /// Run passes until shutdown is requested.
    pub async fn run(&mut self) -> DispatchStats {
        info!(
            "starting {} worker(s), {} pixel(s) under watch",
            self.workers.len(),
            self.target.participating()
        );

        while !self.shutdown.is_cancelled() {
            if self.run_pass().await == PassOutcome::Interrupted {
                break;
            }
        }

        let s = self.stats;
        info!(
            "stopped after {} passes: {} writes ({} rejected, {} failed), {} failed reads",
            s.passes, s.submitted, s.rejected, s.failed_submits, s.failed_fetches
        );
        s
    }

    /// One fetch → diff → drain cycle.
    pub async fn run_pass(&mut self) -> PassOutcome {
        self.stats.passes += 1;

        let reader = self.rng.gen_range(0..self.workers.len());
        let fetched = self.workers[reader].fetch_canvas(self.canvas_size).await;
        let snapshot = match fetched {
            Ok(s) => s,
            Err(e) => {
                warn!("[worker {}] canvas read failed: {e}", self.workers[reader].id());
                return self.fetch_failed().await;
            }
        };

        let mut queue = match diff(&self.target, &snapshot) {
            Ok(q) => q,
            Err(e) => {
                warn!("diff failed: {e}");
                return self.fetch_failed().await;
            }
        };
        drop(snapshot);

        if queue.is_empty() {
            self.stats.converged += 1;
            info!(
                "all pixels correct; checking again in {:?}",
                self.config.idle_interval
            );
            if !self.pause(self.config.idle_interval).await {
                return PassOutcome::Interrupted;
            }
            return PassOutcome::Converged;
        }

        info!(
            "found {} of {} pixels to fix",
            queue.len(),
            self.target.participating()
        );
        self.drain(&mut queue).await
    }

    // ── Internal ─────────────────────────────────────────────────

    async fn fetch_failed(&mut self) -> PassOutcome {
        self.stats.failed_fetches += 1;
        if !self.pause(self.config.fetch_retry).await {
            return PassOutcome::Interrupted;
        }
        PassOutcome::FetchFailed
    }

    /// Sweep workers until the queue is empty.
    async fn drain(&mut self, queue: &mut WorkQueue) -> PassOutcome {
        let mut writes = 0;

        while !queue.is_empty() {
            for index in 0..self.workers.len() {
                match self.drain_worker(index, queue).await {
                    Some(n) => writes += n,
                    None => return PassOutcome::Interrupted,
                }
            }

            if queue.is_empty() {
                break;
            }

            let now = Instant::now();
            if self.workers.iter().any(|w| !w.is_limited(now)) {
                continue;
            }

            let wait = self
                .workers
                .iter()
                .map(|w| w.cooldown_remaining(now))
                .min()
                .unwrap_or(Duration::ZERO)
                + self.config.cooldown_margin;
            info!(
                "all workers rate limited, {} pixel(s) left; sleeping {:.1}s",
                queue.len(),
                wait.as_secs_f64()
            );
            if !self.pause(wait).await {
                return PassOutcome::Interrupted;
            }
        }

        info!("queue drained after {writes} write(s)");
        PassOutcome::Drained { writes }
    }

    /// Let one worker write until it is limited or the queue is empty.
    ///
    /// Returns the number of write attempts, `None` on shutdown.
    async fn drain_worker(&mut self, index: usize, queue: &mut WorkQueue) -> Option<usize> {
        let mut attempts = 0;

        while !self.workers[index].is_limited(Instant::now()) {
            if self.shutdown.is_cancelled() {
                return None;
            }
            let Some(pixel) = queue.pop_random(&mut self.rng) else {
                break;
            };
            attempts += 1;

            let worker = &mut self.workers[index];
            let id = worker.id();
            debug!("[worker {id}] setting pixel {pixel}");
            match worker.submit(pixel).await {
                Ok(outcome) if outcome.accepted => {
                    self.stats.submitted += 1;
                    debug!("[worker {id}] {}", outcome.message);
                }
                Ok(outcome) => {
                    self.stats.rejected += 1;
                    warn!(
                        "[worker {id}] pixel {pixel} rejected with {}: {}",
                        outcome.status, outcome.message
                    );
                }
                Err(e) => {
                    self.stats.failed_submits += 1;
                    warn!("[worker {id}] pixel {pixel} failed: {e}");
                    // Give the other workers a turn before retrying this one.
                    let jitter = self.jitter();
                    if !self.pause(jitter).await {
                        return None;
                    }
                    break;
                }
            }

            let now = Instant::now();
            let worker = &self.workers[index];
            if worker.is_limited(now) {
                debug!(
                    "[worker {id}] cooling down for {:.1}s",
                    worker.cooldown_remaining(now).as_secs_f64()
                );
                break;
            }
            if queue.is_empty() {
                break;
            }
            let jitter = self.jitter();
            if !self.pause(jitter).await {
                return None;
            }
        }

        Some(attempts)
    }

    fn jitter(&mut self) -> Duration {
        self.rng.gen_range(self.config.jitter_min..=self.config.jitter_max)
    }

    /// Sleep unless shut down first. Returns `false` on shutdown.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.shutdown.cancelled() => false,
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("workers", &self.workers)
            .field("canvas_size", &self.canvas_size)
            .field("target_offset", &self.target.offset())
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

// ── Tests ────────────────────────────────────────────────────────
