//! Per-process sampling
//!
//! On first sighting a process gets its name and start time from
//! `/proc/<pid>/sched`, optionally its command line and cgroup, and a place
//! in the family tree from the ppid in `/proc/<pid>/stat`.
//!
//! Every tick then reads `/proc/<pid>/schedstat` (run time, wait time) and
//! adds the counters of all other threads from `task/<tid>/schedstat`, so a
//! multi-threaded process is charged for all of its threads. With PSS
//! enabled the `smaps` file is summed as well. Names are refreshed
//! periodically to catch `exec`.
//!
//! Nothing here is fatal: a file that cannot be read only means the process
//! gets no sample (or no value for that field) in this tick.

use std::fs::File;
use std::io::{self, BufReader, Seek};

use log::{debug, info};

use crate::domain::{Pid, ProcessId, Seconds};
use crate::procfs::cgroup::pid_cgroup_path;
use crate::procfs::text::{
    extract_comm, extract_ppid, nth_token, parse_f64, parse_int, skip_lines, truncate_name,
    MAX_NAME_LEN,
};
use crate::procfs::{CachedFile, ProcFs};
use crate::registry::ProcessFiles;
use crate::trace::SampleData;

use super::smaps::{detect_layout, SmapsDecoder};
use super::Sampler;

const SMAPS_BUF_SIZE: usize = 16 * 1024;

/// The command name heading `/proc/<pid>/sched`, e.g. `bash (1234, #threads: 1)`.
///
/// `comm` may contain spaces, so the name is everything before the last
/// ` (` of the first line.
pub fn parse_sched_name(sched: &str) -> Option<&str> {
    let header = sched.lines().next()?;
    let name = match header.rsplit_once(" (") {
        Some((name, _)) => name.trim_start(),
        None => nth_token(header, 0)?,
    };
    (!name.is_empty()).then(|| truncate_name(name, MAX_NAME_LEN))
}

/// Start time from the `se.exec_start` row (third line) of
/// `/proc/<pid>/sched`. The kernel prints milliseconds.
pub fn parse_sched_starttime(sched: &str) -> Option<Seconds> {
    let line = skip_lines(sched, 2)?;
    let ms = parse_f64(nth_token(line, 2)?)?;
    Some(Seconds(ms / 1000.0))
}

/// Run time and run-queue wait time from a `schedstat` file
/// (`runtime waittime timeslices`), in nanoseconds.
pub fn parse_task_schedstat(text: &str) -> Option<(u64, u64)> {
    let rt = parse_int(nth_token(text, 0)?)?;
    let wt = parse_int(nth_token(text, 1)?)?;
    Some((rt, wt))
}

impl Sampler {
    /// Fill in a freshly created record and attach it to its parent.
    pub(super) fn register(&mut self, id: ProcessId) {
        let rec = self.trace.registry.get_mut(id);
        let pid = rec.pid;

        if let Some(files) = rec.files.as_mut() {
            match read_text(&mut files.sched, &mut self.buf) {
                Some(sched) => {
                    rec.name = parse_sched_name(&sched).unwrap_or_default().to_string();
                    rec.starttime = parse_sched_starttime(&sched);
                }
                None => debug!("{pid}: sched unreadable on first sighting"),
            }
        }

        if self.options.show_cmdline || rec.name.is_empty() {
            if let Some(cmdline) = self.procfs.read_cmdline(pid) {
                rec.name = cmdline;
            }
        }
        if self.options.show_cgroup {
            rec.cgroup = pid_cgroup_path(&self.procfs, pid);
        }

        // an unreadable stat leaves the ppid unknown: the process is
        // treated as an orphan
        let stat = self.procfs.read_pid_file(pid, "stat").ok();
        if rec.name.is_empty() {
            if let Some(comm) = stat.as_deref().and_then(extract_comm) {
                rec.name = truncate_name(comm, MAX_NAME_LEN).to_string();
            }
        }
        let ppid = stat.as_deref().and_then(extract_ppid).map(Pid);

        self.trace.registry.attach_to_parent(id, ppid);
    }

    /// Collect this tick's counters for a live process.
    ///
    /// Returns `None` when the process has no readable `schedstat`; its
    /// `sched` and `schedstat` descriptors are closed then.
    pub(super) fn sample_process(&mut self, id: ProcessId, counter: u32) -> Option<SampleData> {
        let prev = self.trace.registry.get(id).last.map(|s| self.trace.sample(s));
        let (prev_rt, prev_wt) = prev.map_or((0, 0), |s| (s.runtime, s.waittime));

        let rec = self.trace.registry.get_mut(id);
        let pid = rec.pid;
        let files = rec.files.as_mut()?;

        let Some(text) = read_text(&mut files.schedstat, &mut self.buf) else {
            debug!("{pid}: schedstat unreadable, skipping");
            files.sched.close();
            files.schedstat.close();
            return None;
        };
        let Some((mut runtime, mut waittime)) = parse_task_schedstat(&text) else {
            debug!("{pid}: malformed schedstat {text:?}");
            return None;
        };

        let (thread_rt, thread_wt) = thread_times(&self.procfs, pid, &mut self.buf);
        runtime += thread_rt;
        waittime += thread_wt;

        // a thread that exits takes its counters with it; never let the
        // aggregate go backwards
        runtime = runtime.max(prev_rt);
        waittime = waittime.max(prev_wt);

        let mut pss = 0;
        if self.options.pss {
            match read_pss(&self.procfs, pid, files, &mut self.smaps_decoder, &mut self.line) {
                Ok(Some(kb)) => pss = kb,
                Ok(None) => {}
                Err(e) => {
                    debug!("{pid}: smaps unreadable: {e}");
                    files.smaps = None;
                }
            }
        }

        if (u64::from(counter) + u64::from(pid.0)) % self.rename_interval == 0 {
            self.refresh_name(id);
        }

        Some(SampleData { runtime, waittime, pss })
    }

    /// Re-read the display name, which changes when the process `exec`s.
    fn refresh_name(&mut self, id: ProcessId) {
        let rec = self.trace.registry.get_mut(id);
        let pid = rec.pid;
        let Some(files) = rec.files.as_mut() else {
            return;
        };

        let Some(sched) = read_text(&mut files.sched, &mut self.buf) else {
            files.sched.close();
            files.schedstat.close();
            return;
        };
        if rec.starttime.is_none() {
            rec.starttime = parse_sched_starttime(&sched);
        }

        let name = if self.options.show_cmdline {
            self.procfs.read_cmdline(pid)
        } else {
            parse_sched_name(&sched).map(str::to_string)
        };
        if let Some(name) = name.filter(|n| *n != rec.name) {
            debug!("{pid} renamed {:?} -> {name:?}", rec.name);
            rec.name = name;
        }
    }
}

/// Read a cached file and decode it as text; `None` on error or empty read.
fn read_text(file: &mut CachedFile, buf: &mut Vec<u8>) -> Option<String> {
    match file.read_into(buf) {
        Ok(n) if n > 0 => Some(String::from_utf8_lossy(buf).into_owned()),
        _ => None,
    }
}

/// Summed run/wait time of every thread of `pid` other than the leader.
fn thread_times(procfs: &ProcFs, pid: Pid, buf: &mut Vec<u8>) -> (u64, u64) {
    let Ok(tids) = procfs.list_tids(pid) else {
        return (0, 0);
    };

    let (mut runtime, mut waittime) = (0u64, 0u64);
    for tid in tids.into_iter().filter(|&tid| tid != pid.0) {
        let path = procfs.pid_path(pid, &format!("task/{tid}/schedstat"));
        let mut file = CachedFile::new(path);
        let Some(text) = read_text(&mut file, buf) else {
            continue;
        };
        let Some((rt, wt)) = parse_task_schedstat(&text) else {
            continue;
        };
        runtime += rt;
        waittime += wt;
    }
    (runtime, waittime)
}

/// Sum the PSS of `pid`, opening or rewinding its cached `smaps` reader.
///
/// The decoder is chosen from the first `smaps` file that has any mapping.
/// `Ok(None)` means there was nothing to measure (no mappings yet).
fn read_pss(
    procfs: &ProcFs,
    pid: Pid,
    files: &mut ProcessFiles,
    decoder: &mut Option<Box<dyn SmapsDecoder>>,
    scratch: &mut Vec<u8>,
) -> io::Result<Option<u64>> {
    if let Some(reader) = files.smaps.as_mut() {
        reader.rewind()?;
    } else {
        let file = File::open(procfs.pid_path(pid, "smaps"))?;
        files.smaps = Some(BufReader::with_capacity(SMAPS_BUF_SIZE, file));
    }
    let Some(reader) = files.smaps.as_mut() else {
        return Ok(None);
    };

    if decoder.is_none() {
        let Some(detected) = detect_layout(reader, scratch)? else {
            return Ok(None);
        };
        info!("smaps layout: {}", detected.name());
        *decoder = Some(detected);
        reader.rewind()?;
    }

    match decoder.as_ref() {
        Some(d) => d.sum_pss(reader, scratch).map(Some),
        None => Ok(None),
    }
}
