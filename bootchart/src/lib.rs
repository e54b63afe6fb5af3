//! # bootchart - /proc Sampling Engine
//!
//! bootchart periodically samples the textual procfs interface during system
//! boot (or any other interval) and builds an in-memory model of every
//! process it observed: who started whom, how much CPU time each one used,
//! how long it waited for a CPU, and how much memory it held.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    /proc (procfs root)                       │
//! │  vmstat  schedstat  <pid>/sched  <pid>/schedstat  <pid>/smaps │
//! └──────────────────────────┬───────────────────────────────────┘
//!                            │ pread at offset 0, every tick
//!                            ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Sampler                               │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐      │
//! │  │ System-wide  │   │  Registry    │──▶│ Per-process  │      │
//! │  │  counters    │   │ find/create  │   │   counters   │      │
//! │  └──────┬───────┘   └──────────────┘   └──────┬───────┘      │
//! │         ▼                                     ▼              │
//! │  ┌────────────────────────────────────────────────────┐      │
//! │  │  Trace: ticks ◀── samples ──▶ process forest        │      │
//! │  └────────────────────────────────────────────────────┘      │
//! └──────────────────────────┬───────────────────────────────────┘
//!                            │ Recorder paces ticks, stops on signal
//!                            ▼
//!                     Export (JSON summary)
//! ```
//!
//! ## Module Structure
//!
//! - [`sampler`]: one sampling pass per tick
//!   - `system`: `/proc/vmstat`, `/proc/schedstat`, entropy
//!   - `process`: `sched`, `schedstat` (all threads), `smaps` per process
//!   - `smaps`: pluggable PSS decoders with one-time layout detection
//! - [`registry`]: process records, family tree, garbage collection
//! - [`trace`]: append-only arenas of ticks, samples and processes
//! - [`recorder`]: the timed loop, overrun accounting, signal handling
//! - [`procfs`]: procfs root abstraction, cached descriptors, text parsing
//! - [`config`] / [`cli`]: `bootchart.conf` and command-line settings
//! - [`preflight`]: boot-time setup (PID 1 hand-over, schedstats)
//! - [`export`]: JSON summary of a finished trace
//!
//! ## Example
//!
//! ```no_run
//! use bootchart::procfs::ProcFs;
//! use bootchart::sampler::{Sampler, SamplerOptions};
//!
//! let mut sampler = Sampler::new(ProcFs::default(), SamplerOptions::default());
//! let outcome = sampler.sample_tick()?;
//! println!("{} new processes on {} CPUs", outcome.new_processes, sampler.trace().cpus());
//! # Ok::<(), bootchart::domain::SamplerError>(())
//! ```

pub mod cli;
pub mod clock;
pub mod config;
pub mod domain;
pub mod export;
pub mod model;
pub mod preflight;
pub mod procfs;
pub mod recorder;
pub mod registry;
pub mod sampler;
pub mod trace;
