use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;

use crate::domain::{Pid, TickId};
use crate::recorder::RecordSummary;
use crate::registry::Registry;
use crate::trace::Trace;

/// One sampling tick
#[derive(Debug, Clone, Serialize)]
pub struct TickSummary {
    pub counter: u32,
    /// Seconds on the boot clock
    pub time: f64,
    /// `pgpgin`
    pub bi: u64,
    /// `pgpgout`
    pub bo: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entropy: Option<u32>,
    /// Processes sampled in this tick
    pub processes: usize,
}

/// One observed process
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSummary {
    pub pid: u32,
    pub ppid: u32,
    pub name: String,
    /// Depth in the process forest, 1 for children of the root
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cgroup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starttime: Option<f64>,
    /// CPU seconds between first and last sample
    pub total: f64,
    /// Peak PSS in kB
    pub pss_max: u64,
    pub samples: usize,
    pub children: Vec<u32>,
}

/// Whole recording, processes in forest pre-order
#[derive(Debug, Clone, Serialize)]
pub struct TraceSummary {
    pub build: String,
    pub samples: u32,
    pub cpus: usize,
    pub overruns: u32,
    pub graph_start: f64,
    pub log_start: f64,
    /// Sampling interval in milliseconds
    pub interval_ms: f64,
    pub ticks: Vec<TickSummary>,
    pub processes: Vec<ProcessSummary>,
}

impl TraceSummary {
    pub fn new(trace: &Trace, record: &RecordSummary, build: Option<&str>) -> Self {
        let registry = trace.registry();

        let ticks = trace
            .ticks()
            .iter()
            .enumerate()
            .map(|(i, tick)| TickSummary {
                counter: tick.counter,
                time: tick.sampletime.0,
                bi: tick.blockstat.bi,
                bo: tick.blockstat.bo,
                entropy: tick.entropy_avail,
                processes: trace.tick_samples(TickId(i)).count(),
            })
            .collect();

        let processes = registry
            .descendants(Registry::ROOT)
            .into_iter()
            .map(|(id, depth)| {
                let rec = registry.get(id);
                ProcessSummary {
                    pid: rec.pid.0,
                    ppid: rec.ppid.0,
                    name: rec.name.clone(),
                    depth,
                    cgroup: rec.cgroup.clone(),
                    starttime: rec.starttime.map(|s| s.0),
                    total: rec.total,
                    pss_max: rec.pss_max,
                    samples: trace.history(id).count(),
                    children: registry.children(id).map(|c| registry.get(c).pid.0).collect(),
                }
            })
            .collect();

        Self {
            build: build.unwrap_or("n/a").to_string(),
            samples: record.samples,
            cpus: trace.cpus(),
            overruns: record.overruns,
            graph_start: record.graph_start.0,
            log_start: record.log_start.0,
            interval_ms: record.interval.as_secs_f64() * 1000.0,
            ticks,
            processes,
        }
    }

    /// The summary entry for `pid`, if it was observed.
    pub fn process(&self, pid: Pid) -> Option<&ProcessSummary> {
        self.processes.iter().rev().find(|p| p.pid == pid.0)
    }
}

/// Write `summary` as pretty-printed JSON.
pub fn write_summary<W: Write>(writer: W, summary: &TraceSummary) -> Result<()> {
    serde_json::to_writer_pretty(writer, summary).context("Failed to write trace summary")
}

/// `bootchart-<unix-seconds>.json`
pub fn summary_file_name(unix_secs: u64) -> String {
    format!("bootchart-{unix_secs}.json")
}
