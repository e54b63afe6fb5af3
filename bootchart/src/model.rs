//! Per-tick and per-sample records
//!
//! Records reference each other through arena handles rather than pointers:
//! a [`ProcessSample`] names its [`TickRecord`] by [`TickId`] and its owner
//! by [`ProcessId`]. The arenas live in [`Trace`](crate::trace::Trace), which
//! only ever appends, so every handle stays valid for the life of the trace.

use crate::domain::{CpuId, ProcessId, SampleId, Seconds, TickId};

/// Capacity of the per-CPU arrays in a [`TickRecord`].
pub const MAX_CPUS: usize = 256;

/// `/proc/vmstat` page-in / page-out counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockStat {
    /// `pgpgin`
    pub bi: u64,
    /// `pgpgout`
    pub bo: u64,
}

/// System-wide data for one sampling tick.
#[derive(Debug, Clone)]
pub struct TickRecord {
    /// Zero-based tick number.
    pub counter: u32,
    /// Boot-clock reading taken at the start of the tick.
    pub sampletime: Seconds,
    runtime: [u64; MAX_CPUS],
    waittime: [u64; MAX_CPUS],
    pub entropy_avail: Option<u32>,
    pub blockstat: BlockStat,
    /// First process sample taken during this tick; the rest follow via
    /// [`ProcessSample::cross`].
    pub first_sample: Option<SampleId>,
}

impl TickRecord {
    pub fn new(counter: u32, sampletime: Seconds) -> Self {
        Self {
            counter,
            sampletime,
            runtime: [0; MAX_CPUS],
            waittime: [0; MAX_CPUS],
            entropy_avail: None,
            blockstat: BlockStat::default(),
            first_sample: None,
        }
    }

    /// Store the accumulated run/wait time of `cpu`.
    ///
    /// Returns `false` (and stores nothing) if `cpu` is beyond [`MAX_CPUS`].
    pub fn set_cpu_times(&mut self, cpu: CpuId, runtime: u64, waittime: u64) -> bool {
        let idx = cpu.0 as usize;
        if idx >= MAX_CPUS {
            return false;
        }
        self.runtime[idx] = runtime;
        self.waittime[idx] = waittime;
        true
    }

    /// Accumulated run time of `cpu` in nanoseconds.
    pub fn cpu_runtime(&self, cpu: CpuId) -> Option<u64> {
        self.runtime.get(cpu.0 as usize).copied()
    }

    /// Accumulated wait time of `cpu` in nanoseconds.
    pub fn cpu_waittime(&self, cpu: CpuId) -> Option<u64> {
        self.waittime.get(cpu.0 as usize).copied()
    }
}

/// One process's scheduler and memory counters at one tick.
#[derive(Debug, Clone)]
pub struct ProcessSample {
    /// Accumulated on-CPU time of all threads, in nanoseconds.
    pub runtime: u64,
    /// Accumulated run-queue wait time of all threads, in nanoseconds.
    pub waittime: u64,
    /// Proportional set size in kB, 0 when not measured.
    pub pss: u64,
    pub tick: TickId,
    pub process: ProcessId,
    /// Previous sample of the same process.
    pub prev: Option<SampleId>,
    /// Next sample of the same process.
    pub next: Option<SampleId>,
    /// Next sample taken in the same tick.
    pub cross: Option<SampleId>,
}
