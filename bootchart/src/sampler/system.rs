//! System-wide counters read once per tick
//!
//! - `/proc/vmstat`: `pgpgin` / `pgpgout` block I/O page counters
//! - `/proc/schedstat`: per-CPU accumulated run and wait time
//! - `/proc/sys/kernel/random/entropy_avail`: optional entropy pool level
//!
//! All three are kept open across ticks and re-read from offset 0.

use log::warn;

use crate::domain::{CpuId, SamplerError};
use crate::model::{BlockStat, TickRecord, MAX_CPUS};
use crate::procfs::text::{leading_u64, nth_token, parse_int};
use crate::procfs::{CachedFile, ProcFs};

/// Result of scanning `/proc/schedstat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedstatScan {
    /// Highest CPU index seen, plus one.
    pub cpus: usize,
    /// A CPU beyond [`MAX_CPUS`] was found and scanning stopped there.
    pub truncated: bool,
}

#[derive(Debug)]
pub struct SystemSampler {
    vmstat: CachedFile,
    schedstat: CachedFile,
    entropy: Option<CachedFile>,
    buf: Vec<u8>,
    cpus: usize,
    warned_truncated: bool,
    warned_entropy: bool,
}

impl SystemSampler {
    pub fn new(procfs: &ProcFs, entropy: bool) -> Self {
        Self {
            vmstat: CachedFile::new(procfs.path("vmstat")),
            schedstat: CachedFile::new(procfs.path("schedstat")),
            entropy: entropy
                .then(|| CachedFile::new(procfs.path("sys/kernel/random/entropy_avail"))),
            buf: Vec::with_capacity(8192),
            cpus: 0,
            warned_truncated: false,
            warned_entropy: false,
        }
    }

    /// Number of CPUs detected so far.
    pub fn cpus(&self) -> usize {
        self.cpus
    }

    /// Fill the system-wide part of `tick`.
    ///
    /// # Errors
    /// `vmstat` and `schedstat` are mandatory; failing to read either one
    /// returns [`SamplerError::GlobalFile`].
    pub fn sample(&mut self, tick: &mut TickRecord) -> Result<(), SamplerError> {
        read_global(&mut self.vmstat, &mut self.buf)?;
        tick.blockstat = parse_vmstat(&String::from_utf8_lossy(&self.buf));

        read_global(&mut self.schedstat, &mut self.buf)?;
        let scan = parse_schedstat(&String::from_utf8_lossy(&self.buf), tick);
        self.cpus = self.cpus.max(scan.cpus);
        if scan.truncated && !self.warned_truncated {
            warn!("More than {MAX_CPUS} CPUs present, per-CPU data truncated");
            self.warned_truncated = true;
        }

        if let Some(entropy) = self.entropy.as_mut() {
            match entropy.read_into(&mut self.buf) {
                Ok(n) if n > 0 => {
                    tick.entropy_avail = parse_entropy(&String::from_utf8_lossy(&self.buf));
                }
                Ok(_) => {}
                Err(e) => {
                    if !self.warned_entropy {
                        warn!("Cannot read {}: {e}", entropy.path().display());
                        self.warned_entropy = true;
                    }
                }
            }
        }

        Ok(())
    }
}

fn read_global(file: &mut CachedFile, buf: &mut Vec<u8>) -> Result<(), SamplerError> {
    match file.read_into(buf) {
        Ok(n) if n > 0 => Ok(()),
        Ok(_) => Err(SamplerError::GlobalFile {
            path: file.path().to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "empty file"),
        }),
        Err(source) => Err(SamplerError::GlobalFile { path: file.path().to_path_buf(), source }),
    }
}

/// Extract the `pgpgin` / `pgpgout` counters from `/proc/vmstat`.
///
/// Scanning stops as soon as both keys have been seen.
pub fn parse_vmstat(text: &str) -> BlockStat {
    let mut stat = BlockStat::default();
    let (mut seen_in, mut seen_out) = (false, false);

    for line in text.lines() {
        let mut tokens = line.split_ascii_whitespace();
        let (Some(key), Some(value)) = (tokens.next(), tokens.next()) else {
            continue;
        };
        match key {
            "pgpgin" => {
                stat.bi = leading_u64(value).unwrap_or(0);
                seen_in = true;
            }
            "pgpgout" => {
                stat.bo = leading_u64(value).unwrap_or(0);
                seen_out = true;
            }
            _ => continue,
        }
        if seen_in && seen_out {
            break;
        }
    }

    stat
}

/// Store per-CPU run/wait time from `/proc/schedstat` into `tick`.
///
/// Rows look like `cpuN f1 f2 f3 f4 f5 f6 runtime waittime ...`; the
/// seventh and eighth numeric fields are the accumulated run time and
/// run-queue wait time in nanoseconds. Other rows (`version`, `domainN`)
/// are skipped.
pub fn parse_schedstat(text: &str, tick: &mut TickRecord) -> SchedstatScan {
    let mut scan = SchedstatScan::default();

    for line in text.lines() {
        let Some(key) = nth_token(line, 0) else {
            continue;
        };
        let Some(index) = key.strip_prefix("cpu") else {
            continue;
        };
        let (Some(rt), Some(wt)) = (nth_token(line, 7), nth_token(line, 8)) else {
            continue;
        };
        let Some(cpu) = parse_int::<u32>(index) else {
            continue;
        };
        let (Some(rt), Some(wt)) = (parse_int::<u64>(rt), parse_int::<u64>(wt)) else {
            continue;
        };

        if !tick.set_cpu_times(CpuId(cpu), rt, wt) {
            scan.truncated = true;
            break;
        }
        scan.cpus = scan.cpus.max(cpu as usize + 1);
    }

    scan
}

/// Parse the single integer in `entropy_avail`.
pub fn parse_entropy(text: &str) -> Option<u32> {
    parse_int(text.trim_end())
}
