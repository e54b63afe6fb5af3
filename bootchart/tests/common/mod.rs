//! Fake procfs trees for driving the sampler.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub struct FakeProc {
    dir: TempDir,
}

impl FakeProc {
    /// A procfs with two CPUs and no processes.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let fake = Self { dir };
        fake.write("vmstat", "nr_free_pages 1000\npgpgin 100\npgpgout 50\n");
        fake.write(
            "schedstat",
            "version 15\ntimestamp 100\ncpu0 0 0 0 0 0 0 1000 2000 3\ncpu1 0 0 0 0 0 0 3000 4000 5\n",
        );
        fake.write("uptime", "1.00 2.00\n");
        fake
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.root().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn pid_dir(&self, pid: u32) -> PathBuf {
        self.root().join(pid.to_string())
    }

    /// A single-threaded process with the usual per-process files.
    pub fn add(&self, pid: u32, ppid: u32, name: &str) {
        self.set_sched(pid, name, 1500.0);
        self.write(&format!("{pid}/stat"), &format!("{pid} ({name}) S {ppid} {pid} {pid} 0 -1\n"));
        self.write(&format!("{pid}/cmdline"), &format!("/usr/bin/{name}\0--flag\0"));
        self.set_schedstat(pid, 0, 0);
        self.set_thread(pid, pid, 0, 0);
    }

    pub fn set_sched(&self, pid: u32, name: &str, exec_start_ms: f64) {
        self.write(
            &format!("{pid}/sched"),
            &format!(
                "{name} ({pid}, #threads: 1)\n\
                 -------------------------------------------------------------------\n\
                 se.exec_start                                :   {exec_start_ms:>14.6}\n\
                 se.vruntime                                  :         1.000000\n"
            ),
        );
    }

    pub fn set_schedstat(&self, pid: u32, runtime: u64, waittime: u64) {
        self.write(&format!("{pid}/schedstat"), &format!("{runtime} {waittime} 1\n"));
    }

    pub fn set_thread(&self, pid: u32, tid: u32, runtime: u64, waittime: u64) {
        self.write(&format!("{pid}/task/{tid}/schedstat"), &format!("{runtime} {waittime} 1\n"));
    }

    pub fn remove_thread(&self, pid: u32, tid: u32) {
        fs::remove_dir_all(self.pid_dir(pid).join("task").join(tid.to_string())).unwrap();
    }

    pub fn remove(&self, pid: u32) {
        fs::remove_dir_all(self.pid_dir(pid)).unwrap();
    }

    pub fn remove_file(&self, pid: u32, name: &str) {
        fs::remove_file(self.pid_dir(pid).join(name)).unwrap();
    }
}
