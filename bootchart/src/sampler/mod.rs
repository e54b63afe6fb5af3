//! Sampling engine
//!
//! One call to [`Sampler::sample_tick`] performs a full sampling pass:
//!
//! 1. `/proc` is enumerated; a procfs that is not mounted yet discards the tick
//! 2. system-wide counters ([`system`]) go into a new [`TickRecord`] and every
//!    enumerated process is looked up or registered
//! 3. per-process counters ([`process`]) are appended to each history
//! 4. processes missing for too long are collected
//!
//! All state that survives between ticks (cached descriptors, the detected
//! `smaps` layout, scratch buffers, the trace itself) lives in [`Sampler`].

pub mod process;
pub mod smaps;
pub mod system;

use log::{debug, info};

use crate::clock::BootClock;
use crate::domain::{SampleId, SamplerError, TickId};
use crate::model::TickRecord;
use crate::procfs::ProcFs;
use crate::trace::Trace;

use self::smaps::SmapsDecoder;
use self::system::SystemSampler;

/// What to collect besides the always-on scheduler counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerOptions {
    /// Sampling frequency in Hz, used to pace name refreshes.
    pub hz: f64,
    /// Sum PSS from `smaps` for every process.
    pub pss: bool,
    /// Read the kernel entropy pool level.
    pub entropy: bool,
    /// Prefer the full command line over `comm` as display name.
    pub show_cmdline: bool,
    /// Record each process's systemd cgroup path.
    pub show_cgroup: bool,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self { hz: 25.0, pss: false, entropy: false, show_cmdline: false, show_cgroup: false }
    }
}

/// Ticks between two name refreshes of the same process.
///
/// Names are re-read roughly four times a second; below 4 Hz every fourth
/// tick.
pub fn rename_interval(hz: f64) -> u64 {
    if hz < 4.0 {
        4
    } else {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let ticks = (hz / 4.0) as u64;
        ticks.max(1)
    }
}

/// Summary of one sampling pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub tick: TickId,
    /// Processes seen in `/proc` this tick.
    pub processes: usize,
    /// Processes registered for the first time this tick.
    pub new_processes: usize,
    /// Processes that received a sample this tick.
    pub sampled: usize,
    /// Processes collected at the end of the tick.
    pub collected: usize,
}

#[derive(Debug)]
pub struct Sampler {
    procfs: ProcFs,
    clock: BootClock,
    options: SamplerOptions,
    rename_interval: u64,
    system: SystemSampler,
    smaps_decoder: Option<Box<dyn SmapsDecoder>>,
    /// Scratch for per-process pseudo-files.
    buf: Vec<u8>,
    /// Scratch for `smaps` decoding.
    line: Vec<u8>,
    trace: Trace,
}

impl Sampler {
    pub fn new(procfs: ProcFs, options: SamplerOptions) -> Self {
        let clock = BootClock::new();
        if !clock.is_boottime() {
            info!("CLOCK_BOOTTIME unavailable, timestamps use CLOCK_MONOTONIC");
        }
        let system = SystemSampler::new(&procfs, options.entropy);
        Self {
            rename_interval: rename_interval(options.hz),
            procfs,
            clock,
            options,
            system,
            smaps_decoder: None,
            buf: Vec::with_capacity(4096),
            line: Vec::with_capacity(512),
            trace: Trace::new(),
        }
    }

    pub fn procfs(&self) -> &ProcFs {
        &self.procfs
    }

    pub fn clock(&self) -> &BootClock {
        &self.clock
    }

    pub fn options(&self) -> &SamplerOptions {
        &self.options
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Name of the `smaps` decoder picked so far, if any.
    pub fn smaps_layout(&self) -> Option<&'static str> {
        self.smaps_decoder.as_ref().map(|d| d.name())
    }

    /// Whether `/proc` is mounted and listable yet.
    pub fn proc_available(&self) -> bool {
        self.procfs.is_available()
    }

    /// Release every cached descriptor and hand over the trace.
    pub fn into_trace(mut self) -> Trace {
        self.trace.registry.close_all();
        self.trace
    }

    /// Run one sampling pass.
    ///
    /// # Errors
    /// Fails if a mandatory global file cannot be read or `/proc` cannot be
    /// enumerated. Per-process failures are never fatal.
    pub fn sample_tick(&mut self) -> Result<TickOutcome, SamplerError> {
        #[allow(clippy::cast_possible_truncation)]
        let counter = self.trace.ticks().len() as u32;
        let mut tick = TickRecord::new(counter, self.clock.now());

        // an unmounted procfs discards the tick before any global file is read
        let pids = self.procfs.list_pids().map_err(|source| SamplerError::ProcUnavailable {
            path: self.procfs.root().to_path_buf(),
            source,
        })?;

        self.system.sample(&mut tick)?;
        self.trace.cpus = self.system.cpus();

        let tick_id = self.trace.push_tick(tick);
        let mut outcome = TickOutcome {
            tick: tick_id,
            processes: pids.len(),
            new_processes: 0,
            sampled: 0,
            collected: 0,
        };
        let mut prev_in_tick: Option<SampleId> = None;

        for pid in pids {
            let (id, created) = self.trace.registry.find_or_create(&self.procfs, pid);
            self.trace.registry.mark_seen(id);
            if created {
                outcome.new_processes += 1;
                self.register(id);
            }

            let Some(data) = self.sample_process(id, counter) else {
                continue;
            };
            prev_in_tick = Some(self.trace.append_sample(tick_id, id, data, prev_in_tick));
            outcome.sampled += 1;
        }

        outcome.collected = self.trace.registry.collect_garbage();
        debug!(
            "tick {counter}: {} processes, {} new, {} sampled, {} collected",
            outcome.processes, outcome.new_processes, outcome.sampled, outcome.collected
        );
        Ok(outcome)
    }
}
