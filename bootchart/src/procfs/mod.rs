//! Access to the procfs tree
//!
//! [`ProcFs`] anchors every path at a configurable root (`/proc` in
//! production, a temporary directory in tests). [`CachedFile`] keeps a
//! pseudo-file open across ticks and re-reads it from offset 0, which is how
//! procfs files are meant to be polled.

pub mod cgroup;
pub mod text;

use std::fs::{self, File};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::domain::Pid;

/// Default procfs mount point.
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Read granularity for pseudo-files.
const READ_CHUNK: usize = 4096;

/// Root of a procfs tree.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new(DEFAULT_PROC_ROOT)
    }
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a file relative to the procfs root, e.g. `"vmstat"`.
    pub fn path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.root.join(rel)
    }

    /// Path of a per-process file, e.g. `/proc/<pid>/sched`.
    pub fn pid_path(&self, pid: Pid, name: &str) -> PathBuf {
        self.root.join(pid.0.to_string()).join(name)
    }

    /// Whether the procfs root can be listed at all.
    pub fn is_available(&self) -> bool {
        fs::read_dir(&self.root).is_ok()
    }

    /// Enumerate the numeric entries of the procfs root.
    ///
    /// The result is sorted ascending, matching the order the kernel emits
    /// them in, so that parents (lower pids) are usually seen first.
    pub fn list_pids(&self) -> io::Result<Vec<Pid>> {
        let mut pids = numeric_entries(&self.root)?;
        pids.sort_unstable();
        Ok(pids.into_iter().map(Pid).collect())
    }

    /// Enumerate thread ids in `/proc/<pid>/task`.
    pub fn list_tids(&self, pid: Pid) -> io::Result<Vec<u32>> {
        numeric_entries(&self.pid_path(pid, "task"))
    }

    /// Read a whole per-process file into a string (lossy UTF-8).
    pub fn read_pid_file(&self, pid: Pid, name: &str) -> io::Result<String> {
        let bytes = fs::read(self.pid_path(pid, name))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// The flattened command line of `pid`, or `None` for kernel threads and
    /// unreadable processes.
    pub fn read_cmdline(&self, pid: Pid) -> Option<String> {
        let raw = fs::read(self.pid_path(pid, "cmdline")).ok()?;
        text::flatten_cmdline(&raw)
    }
}

fn numeric_entries(dir: &Path) -> io::Result<Vec<u32>> {
    let entries = fs::read_dir(dir)?;
    Ok(entries
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let name = entry.file_name();
            let name = name.to_str()?;
            if !name.starts_with(|c: char| c.is_ascii_digit()) {
                return None;
            }
            name.parse::<u32>().ok()
        })
        .collect())
}

/// A pseudo-file whose descriptor is opened once and reused every tick.
///
/// A failed or empty read drops the descriptor; the next read reopens it.
#[derive(Debug)]
pub struct CachedFile {
    path: PathBuf,
    file: Option<File>,
}

impl CachedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), file: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Release the cached descriptor.
    pub fn close(&mut self) {
        self.file = None;
    }

    /// Read the whole file from offset 0 into `buf`, opening it if needed.
    ///
    /// Returns the number of bytes read. `Ok(0)` means the file was empty;
    /// the descriptor is closed in that case and on error.
    pub fn read_into(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        let file = match self.file.take() {
            Some(file) => file,
            None => File::open(&self.path)?,
        };
        let n = read_all_at(&file, buf)?;
        if n > 0 {
            self.file = Some(file);
        }
        Ok(n)
    }
}

/// pread-style full read starting at offset 0.
fn read_all_at(file: &File, buf: &mut Vec<u8>) -> io::Result<usize> {
    buf.clear();
    let mut offset = 0u64;
    loop {
        if buf.capacity() - buf.len() < READ_CHUNK {
            buf.reserve(READ_CHUNK);
        }
        let start = buf.len();
        buf.resize(buf.capacity(), 0);
        let n = match file.read_at(&mut buf[start..], offset) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                buf.truncate(start);
                continue;
            }
            Err(e) => {
                buf.truncate(start);
                return Err(e);
            }
        };
        buf.truncate(start + n);
        // seq_file pseudo-files return about a page per read, so only EOF
        // ends the loop
        if n == 0 {
            break;
        }
        offset += n as u64;
    }
    Ok(buf.len())
}
