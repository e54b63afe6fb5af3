//! Boot-time setup for bootchart
//!
//! Runs before the sampler starts: hands PID 1 over to the real init when
//! bootchart was started by the kernel, turns on scheduler statistics, and
//! checks that the procfs files the sampler cannot do without are there.

#![allow(unsafe_code)] // getpid() and fork() require unsafe

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

use crate::domain::Pid;
use crate::procfs::ProcFs;

const SCHED_SCHEDSTATS: &str = "sys/kernel/sched_schedstats";
const OS_RELEASE: [&str; 2] = ["etc/os-release", "usr/lib/os-release"];

/// Run all pre-flight steps that do not depend on being PID 1.
pub fn run_preflight_checks(procfs: &ProcFs, quiet: bool) -> Result<()> {
    enable_schedstats(procfs);
    check_proc_files(procfs, quiet)?;
    Ok(())
}

/// When running as PID 1, fork: the parent becomes the configured init and
/// the child carries on recording.
///
/// Returns only in the recording process.
pub fn hand_over_init(init: &Path) -> Result<()> {
    if current_pid() != Pid::INIT {
        return Ok(());
    }

    // SAFETY: called before the runtime or any other thread is started
    let child = unsafe { libc::fork() };
    if child == 0 {
        info!("Recording as {}", current_pid());
        return Ok(());
    }
    if child < 0 {
        warn!("fork() failed: {}, starting init without recording", std::io::Error::last_os_error());
    }

    // only returns on failure
    let err = Command::new(init).exec();
    Err(err).with_context(|| format!("Failed to execute init {}", init.display()))
}

fn current_pid() -> Pid {
    // SAFETY: getpid has no preconditions and cannot fail
    Pid::from(unsafe { libc::getpid() })
}

/// Ask the kernel to collect scheduler statistics.
///
/// Kernels built with `CONFIG_SCHEDSTATS` but booted without
/// `schedstats=enable` report zero wait times until this is set.
pub fn enable_schedstats(procfs: &ProcFs) {
    let path = procfs.path(SCHED_SCHEDSTATS);
    match std::fs::write(&path, "1\n") {
        Ok(()) => debug!("Enabled {}", path.display()),
        Err(e) => debug!("Cannot enable {}: {e}", path.display()),
    }
}

/// Check that the global procfs files are readable.
///
/// An unmounted procfs is only reported, as early boot may start before
/// `/proc` is mounted; missing statistics on a mounted procfs are fatal.
fn check_proc_files(procfs: &ProcFs, quiet: bool) -> Result<()> {
    if !procfs.is_available() {
        if !quiet {
            warn!("{} is not mounted yet, waiting for it", procfs.root().display());
        }
        return Ok(());
    }

    for name in ["schedstat", "vmstat"] {
        let path = procfs.path(name);
        if !path.exists() {
            bail!(
                "{} not found.\n\n\
                 bootchart needs a kernel built with CONFIG_SCHEDSTATS.",
                path.display()
            );
        }
    }
    Ok(())
}

/// `PRETTY_NAME` from os-release below `root`, trying `/etc` first.
pub fn os_pretty_name(root: &Path) -> Option<String> {
    OS_RELEASE.iter().find_map(|rel| {
        let text = std::fs::read_to_string(root.join(rel)).ok()?;
        parse_env_value(&text, "PRETTY_NAME")
    })
}

/// Value of `key` in a shell-style `KEY=value` file, unquoted.
pub fn parse_env_value(text: &str, key: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let (k, v) = line.trim().split_once('=')?;
        if k.trim() != key {
            return None;
        }
        let v = v.trim();
        let unquoted = ['"', '\'']
            .iter()
            .find_map(|&q| v.strip_prefix(q).and_then(|s| s.strip_suffix(q)))
            .unwrap_or(v);
        Some(unquoted.to_string())
    })
}
