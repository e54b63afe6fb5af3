//! Sampling loop
//!
//! Paces [`Sampler::sample_tick`] at a fixed frequency until the sample
//! limit is reached or a termination signal arrives. A tick that takes
//! longer than the interval counts as an overrun, and the intervals it
//! swallowed are taken off the remaining sample budget so the run still ends
//! at roughly the planned wall-clock time.

use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use tokio::signal::unix::{signal, SignalKind};

use crate::domain::{SamplerError, Seconds};
use crate::procfs::text::{nth_token, parse_f64};
use crate::procfs::ProcFs;
use crate::sampler::Sampler;
use crate::trace::Trace;

/// Loop parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecorderConfig {
    /// Maximum number of ticks to run.
    pub samples: u32,
    /// Sampling frequency in Hz. Must be positive.
    pub hz: f64,
    /// Measure from the start of recording instead of from boot.
    pub relative: bool,
}

/// How a recording went.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordSummary {
    /// Loop iterations run, including ticks discarded while `/proc` was
    /// missing.
    pub samples: u32,
    /// Ticks that took longer than one interval.
    pub overruns: u32,
    /// Origin of the time axis: boot time, or `log_start` with `relative`.
    pub graph_start: Seconds,
    /// Clock reading when recording began.
    pub log_start: Seconds,
    pub interval: Duration,
    /// The loop ended because of a signal rather than the sample limit.
    pub interrupted: bool,
}

pub struct Recorder {
    sampler: Sampler,
    config: RecorderConfig,
}

impl Recorder {
    pub fn new(sampler: Sampler, config: RecorderConfig) -> Self {
        Self { sampler, config }
    }

    /// Record until the sample limit or SIGINT/SIGTERM/SIGHUP.
    ///
    /// # Errors
    /// See [`Recorder::run_until`].
    pub async fn run(self) -> Result<(Trace, RecordSummary)> {
        let stop = async {
            if let Err(e) = shutdown_signal().await {
                warn!("Cannot install signal handlers: {e}");
                std::future::pending::<()>().await;
            }
        };
        self.run_until(stop).await
    }

    /// Record until the sample limit or until `stop` resolves.
    ///
    /// `stop` is checked after every tick, overrun or not.
    ///
    /// # Errors
    /// Fails on an invalid frequency, when the boot-relative time origin
    /// would be negative, or when a mandatory global file cannot be read.
    pub async fn run_until<F>(mut self, stop: F) -> Result<(Trace, RecordSummary)>
    where
        F: Future<Output = ()>,
    {
        if !(self.config.hz.is_finite() && self.config.hz > 0.0) {
            bail!("invalid sampling frequency {} Hz", self.config.hz);
        }
        let interval = Duration::from_secs_f64(1.0 / self.config.hz);

        let log_start = self.sampler.clock().now();
        let graph_start = if self.config.relative {
            log_start
        } else {
            let uptime = read_uptime(self.sampler.procfs()).unwrap_or_else(|| {
                debug!("uptime unavailable, using the clock reading");
                log_start
            });
            log_start - uptime
        };
        if graph_start.0 < 0.0 {
            bail!(
                "Failed to set up graph start time ({graph_start}). The system uptime \
                 probably includes time the system was suspended; use --rel to bypass this."
            );
        }

        tokio::pin!(stop);
        let mut limit = self.config.samples;
        let mut samples = 0u32;
        let mut overruns = 0u32;
        let mut interrupted = false;

        while samples < limit {
            let started = Instant::now();

            match self.sampler.sample_tick() {
                Ok(_) => {}
                Err(SamplerError::ProcUnavailable { path, .. }) => {
                    debug!("{} not available yet, discarding tick", path.display());
                }
                Err(e) => return Err(e).context("sampling failed"),
            }
            samples += 1;

            let elapsed = started.elapsed();
            if let Some(left) = interval.checked_sub(elapsed).filter(|d| !d.is_zero()) {
                tokio::select! {
                    biased;
                    () = &mut stop => interrupted = true,
                    () = tokio::time::sleep(left) => {}
                }
            } else {
                overruns += 1;
                let lost = lost_intervals(elapsed, interval);
                limit = limit.saturating_sub(lost);
                debug!("tick took {elapsed:?}, dropping {lost} samples from the budget");
                // no sleep to wait in, still give a pending signal its turn
                tokio::select! {
                    biased;
                    () = &mut stop => interrupted = true,
                    () = tokio::task::yield_now() => {}
                }
            }
            if interrupted {
                info!("Signal received, stopping after {samples} samples");
                break;
            }
        }

        // don't complain about a single overrun, the first tick often is one
        if overruns > 1 {
            warn!("Sample time overrun {overruns} times");
        }

        let summary =
            RecordSummary { samples, overruns, graph_start, log_start, interval, interrupted };
        Ok((self.sampler.into_trace(), summary))
    }
}

/// Whole intervals swallowed beyond the current one by a tick of `elapsed`.
pub fn lost_intervals(elapsed: Duration, interval: Duration) -> u32 {
    let over = elapsed.saturating_sub(interval);
    u32::try_from(over.as_nanos() / interval.as_nanos().max(1)).unwrap_or(u32::MAX)
}

/// Seconds since boot, first field of `/proc/uptime`.
pub fn read_uptime(procfs: &ProcFs) -> Option<Seconds> {
    let text = std::fs::read_to_string(procfs.path("uptime")).ok()?;
    parse_f64(nth_token(&text, 0)?).map(Seconds)
}

/// Resolves on the first SIGINT, SIGTERM or SIGHUP.
///
/// # Errors
/// Returns an error if a handler cannot be registered.
pub async fn shutdown_signal() -> std::io::Result<()> {
    let mut int = signal(SignalKind::interrupt())?;
    let mut term = signal(SignalKind::terminate())?;
    let mut hup = signal(SignalKind::hangup())?;
    tokio::select! {
        _ = int.recv() => {}
        _ = term.recv() => {}
        _ = hup.recv() => {}
    }
    Ok(())
}
