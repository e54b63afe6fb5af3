//! cgroup path lookup for a process
//!
//! Parses `/proc/<pid>/cgroup`. On hybrid/legacy hierarchies the
//! `name=systemd` controller line names the service; on a unified hierarchy
//! only the `0::<path>` line exists.

use super::ProcFs;
use crate::domain::Pid;

const SYSTEMD_CONTROLLER: &str = "name=systemd";

/// The cgroup path of `pid`, or `None` if it cannot be determined.
pub fn pid_cgroup_path(procfs: &ProcFs, pid: Pid) -> Option<String> {
    let content = procfs.read_pid_file(pid, "cgroup").ok()?;
    parse_cgroup_path(&content)
}

/// Pick the systemd-relevant path out of `/proc/<pid>/cgroup` content.
pub fn parse_cgroup_path(content: &str) -> Option<String> {
    let mut unified = None;

    for line in content.lines() {
        // hierarchy-id:controller-list:path
        let mut parts = line.splitn(3, ':');
        let (Some(id), Some(controllers), Some(path)) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };

        if controllers.split(',').any(|c| c == SYSTEMD_CONTROLLER) {
            return Some(path.to_string());
        }
        if id == "0" && controllers.is_empty() && unified.is_none() {
            unified = Some(path.to_string());
        }
    }

    unified
}
