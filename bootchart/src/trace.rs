//! The in-memory trace
//!
//! A [`Trace`] owns the append-only arenas of tick records and process
//! samples, plus the process registry. Nothing is freed before the trace
//! itself, so a sample's tick and process handles stay valid as long as the
//! sample does.

use crate::domain::{Pid, ProcessId, SampleId, TickId};
use crate::model::{ProcessSample, TickRecord};
use crate::registry::Registry;

/// Counters measured for one process in one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleData {
    pub runtime: u64,
    pub waittime: u64,
    pub pss: u64,
}

#[derive(Debug, Default)]
pub struct Trace {
    ticks: Vec<TickRecord>,
    samples: Vec<ProcessSample>,
    pub(crate) registry: Registry,
    pub(crate) cpus: usize,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticks(&self) -> &[TickRecord] {
        &self.ticks
    }

    pub fn tick(&self, id: TickId) -> &TickRecord {
        &self.ticks[id.0]
    }

    /// The tick recorded just before `id`.
    pub fn prev_tick(&self, id: TickId) -> Option<TickId> {
        id.0.checked_sub(1).map(TickId)
    }

    /// The tick recorded just after `id`.
    pub fn next_tick(&self, id: TickId) -> Option<TickId> {
        (id.0 + 1 < self.ticks.len()).then_some(TickId(id.0 + 1))
    }

    pub fn samples(&self) -> &[ProcessSample] {
        &self.samples
    }

    pub fn sample(&self, id: SampleId) -> &ProcessSample {
        &self.samples[id.0]
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Number of CPUs found in `/proc/schedstat`.
    pub fn cpus(&self) -> usize {
        self.cpus
    }

    /// The most recently registered record for `pid`, live or not.
    pub fn find_process(&self, pid: Pid) -> Option<ProcessId> {
        self.registry.ids().rev().find(|&id| self.registry.get(id).pid == pid)
    }

    /// Sample history of a process, oldest first.
    pub fn history(&self, id: ProcessId) -> Chain<'_> {
        Chain { trace: self, next: self.registry.get(id).first, via_cross: false }
    }

    /// Every process sample taken during `tick`, in scan order.
    pub fn tick_samples(&self, tick: TickId) -> Chain<'_> {
        Chain { trace: self, next: self.tick(tick).first_sample, via_cross: true }
    }

    pub(crate) fn push_tick(&mut self, tick: TickRecord) -> TickId {
        let id = TickId(self.ticks.len());
        self.ticks.push(tick);
        id
    }

    /// Append a sample to `process`'s history and to `tick`'s cross list.
    ///
    /// `prev_in_tick` is the sample appended just before in the same tick.
    /// Updates the process's `first`/`last` bounds, total CPU time and
    /// peak PSS.
    pub(crate) fn append_sample(
        &mut self,
        tick: TickId,
        process: ProcessId,
        data: SampleData,
        prev_in_tick: Option<SampleId>,
    ) -> SampleId {
        let id = SampleId(self.samples.len());
        let prev = self.registry.get(process).last;

        self.samples.push(ProcessSample {
            runtime: data.runtime,
            waittime: data.waittime,
            pss: data.pss,
            tick,
            process,
            prev,
            next: None,
            cross: None,
        });

        if let Some(prev) = prev {
            self.samples[prev.0].next = Some(id);
        }
        match prev_in_tick {
            Some(p) => self.samples[p.0].cross = Some(id),
            None => self.ticks[tick.0].first_sample = Some(id),
        }

        let first_runtime = match self.registry.get(process).first {
            Some(first) => self.samples[first.0].runtime,
            None => data.runtime,
        };
        let rec = self.registry.get_mut(process);
        if rec.first.is_none() {
            rec.first = Some(id);
        }
        rec.last = Some(id);
        #[allow(clippy::cast_precision_loss)]
        let total = data.runtime.saturating_sub(first_runtime) as f64 / 1_000_000_000.0;
        rec.total = total;
        rec.pss_max = rec.pss_max.max(data.pss);

        id
    }
}

/// Walks samples either along a process history or across a tick.
pub struct Chain<'a> {
    trace: &'a Trace,
    next: Option<SampleId>,
    via_cross: bool,
}

impl<'a> Iterator for Chain<'a> {
    type Item = (SampleId, &'a ProcessSample);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let sample = self.trace.sample(id);
        self.next = if self.via_cross { sample.cross } else { sample.next };
        Some((id, sample))
    }
}
