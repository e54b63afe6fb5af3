//! Process registry
//!
//! Holds one [`ProcessRecord`] per process observed during the trace and the
//! family tree linking them. Records live in an append-only arena addressed
//! by [`ProcessId`]; slot 0 is a synthetic root under which PID 1 (and any
//! process whose ancestry cannot be resolved) hangs.
//!
//! Lookup is a linear scan of the live list in discovery order. The scan
//! resumes after the previous hit, so when `/proc` enumerates processes in
//! the same order every tick each lookup succeeds on its first probe.
//!
//! Dead processes are never removed from the arena (their history is still
//! needed for the finished trace); garbage collection only unlinks them from
//! the live list and releases their cached descriptors.

use std::fs::File;
use std::io::BufReader;

use log::debug;

use crate::domain::{Pid, ProcessId, SampleId, Seconds};
use crate::procfs::{CachedFile, ProcFs};

/// Consecutive ticks a process may go unseen before it is collected.
pub const GC_MISSED_TICKS: u32 = 2;

/// Descriptors a live process keeps open across ticks.
#[derive(Debug)]
pub struct ProcessFiles {
    pub sched: CachedFile,
    pub schedstat: CachedFile,
    pub smaps: Option<BufReader<File>>,
}

impl ProcessFiles {
    fn new(procfs: &ProcFs, pid: Pid) -> Self {
        Self {
            sched: CachedFile::new(procfs.pid_path(pid, "sched")),
            schedstat: CachedFile::new(procfs.pid_path(pid, "schedstat")),
            smaps: None,
        }
    }

    /// Number of descriptors currently held open.
    pub fn open_count(&self) -> usize {
        usize::from(self.sched.is_open())
            + usize::from(self.schedstat.is_open())
            + usize::from(self.smaps.is_some())
    }
}

/// Everything known about one process.
#[derive(Debug)]
pub struct ProcessRecord {
    pub pid: Pid,
    pub ppid: Pid,
    /// Display name: `comm` from `sched`, or the command line.
    pub name: String,
    pub cgroup: Option<String>,
    /// When the process started, relative to boot. May predate the trace.
    pub starttime: Option<Seconds>,
    /// CPU seconds consumed between the first and last sample.
    pub total: f64,
    /// Largest PSS seen, in kB.
    pub pss_max: u64,

    pub parent: Option<ProcessId>,
    /// First child; the others follow via `next_sibling`.
    pub children: Option<ProcessId>,
    pub next_sibling: Option<ProcessId>,
    last_child: Option<ProcessId>,

    /// Bounds of the sample history.
    pub first: Option<SampleId>,
    pub last: Option<SampleId>,

    /// `None` for the synthetic root and for collected processes.
    pub(crate) files: Option<ProcessFiles>,
    still_running: bool,
    missed_ticks: u32,
}

impl ProcessRecord {
    fn new(pid: Pid, files: Option<ProcessFiles>) -> Self {
        Self {
            pid,
            ppid: Pid(0),
            name: String::new(),
            cgroup: None,
            starttime: None,
            total: 0.0,
            pss_max: 0,
            parent: None,
            children: None,
            next_sibling: None,
            last_child: None,
            first: None,
            last: None,
            files,
            still_running: false,
            missed_ticks: 0,
        }
    }

    /// Whether the process is still on the live list.
    pub fn is_live(&self) -> bool {
        self.files.is_some()
    }

    /// Number of descriptors this record holds open.
    pub fn open_files(&self) -> usize {
        self.files.as_ref().map_or(0, ProcessFiles::open_count)
    }
}

#[derive(Debug)]
pub struct Registry {
    records: Vec<ProcessRecord>,
    live: Vec<ProcessId>,
    cursor: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Handle of the synthetic root.
    pub const ROOT: ProcessId = ProcessId(0);

    pub fn new() -> Self {
        let mut root = ProcessRecord::new(Pid(0), None);
        root.name = "[root]".to_string();
        Self { records: vec![root], live: Vec::new(), cursor: 0 }
    }

    pub fn get(&self, id: ProcessId) -> &ProcessRecord {
        &self.records[id.0]
    }

    pub fn get_mut(&mut self, id: ProcessId) -> &mut ProcessRecord {
        &mut self.records[id.0]
    }

    /// Number of processes ever registered (the synthetic root excluded).
    pub fn len(&self) -> usize {
        self.records.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All registered processes in discovery order.
    pub fn ids(&self) -> impl DoubleEndedIterator<Item = ProcessId> {
        (1..self.records.len()).map(ProcessId)
    }

    /// Live processes in discovery order.
    pub fn live(&self) -> &[ProcessId] {
        &self.live
    }

    /// Find the live record for `pid` without moving the scan cursor.
    pub fn find(&self, pid: Pid) -> Option<ProcessId> {
        self.live.iter().copied().find(|id| self.records[id.0].pid == pid)
    }

    /// Return the live record for `pid`, creating it on first sighting.
    ///
    /// The boolean is `true` when the record was just created; the caller
    /// is then responsible for filling it in and placing it in the tree.
    pub fn find_or_create(&mut self, procfs: &ProcFs, pid: Pid) -> (ProcessId, bool) {
        let n = self.live.len();
        for step in 0..n {
            let idx = (self.cursor + step) % n;
            let id = self.live[idx];
            if self.records[id.0].pid == pid {
                self.cursor = idx + 1;
                return (id, false);
            }
        }

        let id = ProcessId(self.records.len());
        self.records.push(ProcessRecord::new(pid, Some(ProcessFiles::new(procfs, pid))));
        self.live.push(id);
        self.cursor = self.live.len();
        (id, true)
    }

    /// Place a freshly created record in the family tree.
    ///
    /// `claimed_ppid` is the parent pid read from `/proc/<pid>/stat`, if it
    /// could be read. PID 1 hangs off the synthetic root; a ppid of 0
    /// (kernel-spawned) is treated as PID 1; a parent that has not been
    /// registered makes the process an orphan under PID 1, or under the root
    /// if PID 1 itself is unknown.
    pub fn attach_to_parent(&mut self, id: ProcessId, claimed_ppid: Option<Pid>) {
        let pid = self.records[id.0].pid;
        if pid == Pid::INIT {
            self.records[id.0].ppid = Pid(0);
            self.link(Self::ROOT, id);
            return;
        }

        let mut ppid = match claimed_ppid {
            Some(Pid(0)) | None => Pid::INIT,
            Some(p) => p,
        };

        let parent = match self.find(ppid).filter(|&p| p != id) {
            Some(parent) => parent,
            None => {
                debug!("{pid} has unregistered parent {ppid}, attaching as orphan");
                ppid = Pid::INIT;
                self.find(Pid::INIT).unwrap_or(Self::ROOT)
            }
        };

        self.records[id.0].ppid = ppid;
        self.link(parent, id);
    }

    fn link(&mut self, parent: ProcessId, child: ProcessId) {
        self.records[child.0].parent = Some(parent);
        match self.records[parent.0].last_child {
            None => self.records[parent.0].children = Some(child),
            Some(last) => self.records[last.0].next_sibling = Some(child),
        }
        self.records[parent.0].last_child = Some(child);
    }

    /// Record that `id` was seen in this tick's `/proc` scan.
    pub fn mark_seen(&mut self, id: ProcessId) {
        self.records[id.0].still_running = true;
    }

    /// End-of-tick sweep over the live list.
    ///
    /// Records not seen this tick accumulate a miss; after
    /// [`GC_MISSED_TICKS`] consecutive misses they leave the live list and
    /// their descriptors are closed. Every surviving record's seen flag is
    /// reset for the next tick. Returns the number of records collected.
    pub fn collect_garbage(&mut self) -> usize {
        let records = &mut self.records;
        let before = self.live.len();
        self.live.retain(|id| {
            let rec = &mut records[id.0];
            if rec.still_running {
                rec.still_running = false;
                rec.missed_ticks = 0;
                return true;
            }
            rec.missed_ticks += 1;
            if rec.missed_ticks < GC_MISSED_TICKS {
                return true;
            }
            debug!("{} ({}) exited, releasing descriptors", rec.pid, rec.name);
            rec.files = None;
            false
        });
        self.cursor = 0;
        before - self.live.len()
    }

    /// Close every cached descriptor, e.g. at the end of a run.
    pub fn close_all(&mut self) {
        for id in self.live.drain(..) {
            self.records[id.0].files = None;
        }
        self.cursor = 0;
    }

    /// Total descriptors held by live records.
    pub fn open_files(&self) -> usize {
        self.live.iter().map(|id| self.records[id.0].open_files()).sum()
    }

    /// Direct children of `id` in attachment order.
    pub fn children(&self, id: ProcessId) -> Children<'_> {
        Children { registry: self, next: self.records[id.0].children }
    }

    /// Pre-order walk of the subtree below `id` (excluding `id`), with depth.
    pub fn descendants(&self, id: ProcessId) -> Vec<(ProcessId, usize)> {
        let mut out = Vec::new();
        let mut stack: Vec<(ProcessId, usize)> = Vec::new();
        let push_children = |stack: &mut Vec<(ProcessId, usize)>, parent: ProcessId, depth: usize| {
            let kids: Vec<ProcessId> = self.children(parent).collect();
            stack.extend(kids.into_iter().rev().map(|k| (k, depth)));
        };
        push_children(&mut stack, id, 1);
        while let Some((node, depth)) = stack.pop() {
            out.push((node, depth));
            push_children(&mut stack, node, depth + 1);
        }
        out
    }
}

/// Iterator over a record's children via sibling links.
pub struct Children<'a> {
    registry: &'a Registry,
    next: Option<ProcessId>,
}

impl Iterator for Children<'_> {
    type Item = ProcessId;

    fn next(&mut self) -> Option<ProcessId> {
        let current = self.next?;
        self.next = self.registry.get(current).next_sibling;
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn procfs() -> ProcFs {
        ProcFs::new("/nonexistent/proc")
    }

    fn register(registry: &mut Registry, pid: u32, ppid: Option<u32>) -> ProcessId {
        let (id, created) = registry.find_or_create(&procfs(), Pid(pid));
        assert!(created);
        registry.attach_to_parent(id, ppid.map(Pid));
        id
    }

    #[test]
    fn test_find_or_create_dedupes() {
        let mut registry = Registry::new();
        let (a, created_a) = registry.find_or_create(&procfs(), Pid(10));
        let (b, created_b) = registry.find_or_create(&procfs(), Pid(10));
        assert!(created_a);
        assert!(!created_b);
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_find_wraps_around_cursor() {
        let mut registry = Registry::new();
        let ids: Vec<ProcessId> =
            [5, 6, 7].iter().map(|&p| registry.find_or_create(&procfs(), Pid(p)).0).collect();
        // Cursor sits past the end; an earlier pid must still be found
        assert_eq!(registry.find_or_create(&procfs(), Pid(6)), (ids[1], false));
        assert_eq!(registry.find_or_create(&procfs(), Pid(5)), (ids[0], false));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_init_hangs_off_root() {
        let mut registry = Registry::new();
        let init = register(&mut registry, 1, Some(0));
        assert_eq!(registry.get(init).parent, Some(Registry::ROOT));
        assert_eq!(registry.children(Registry::ROOT).collect::<Vec<_>>(), vec![init]);
    }

    #[test]
    fn test_kernel_thread_ppid_zero_maps_to_init() {
        let mut registry = Registry::new();
        let init = register(&mut registry, 1, Some(0));
        let kthreadd = register(&mut registry, 2, Some(0));
        assert_eq!(registry.get(kthreadd).ppid, Pid(1));
        assert_eq!(registry.get(kthreadd).parent, Some(init));
    }

    #[test]
    fn test_children_and_siblings() {
        let mut registry = Registry::new();
        let init = register(&mut registry, 1, Some(0));
        let a = register(&mut registry, 100, Some(1));
        let b = register(&mut registry, 101, Some(1));
        let c = register(&mut registry, 102, Some(100));

        assert_eq!(registry.children(init).collect::<Vec<_>>(), vec![a, b]);
        assert_eq!(registry.children(a).collect::<Vec<_>>(), vec![c]);
        assert_eq!(registry.get(a).next_sibling, Some(b));

        let walk = registry.descendants(Registry::ROOT);
        assert_eq!(walk, vec![(init, 1), (a, 2), (c, 3), (b, 2)]);
    }

    #[test]
    fn test_orphan_attaches_under_init() {
        let mut registry = Registry::new();
        let init = register(&mut registry, 1, Some(0));
        let orphan = register(&mut registry, 500, Some(499));
        assert_eq!(registry.get(orphan).parent, Some(init));
        assert_eq!(registry.get(orphan).ppid, Pid(1));
    }

    #[test]
    fn test_orphan_without_init_attaches_under_root() {
        let mut registry = Registry::new();
        let orphan = register(&mut registry, 500, Some(499));
        assert_eq!(registry.get(orphan).parent, Some(Registry::ROOT));
    }

    #[test]
    fn test_unknown_ppid_is_orphan() {
        let mut registry = Registry::new();
        let init = register(&mut registry, 1, Some(0));
        let unknown = register(&mut registry, 77, None);
        assert_eq!(registry.get(unknown).parent, Some(init));
    }

    #[test]
    fn test_garbage_collection_after_two_misses() {
        let mut registry = Registry::new();
        let keep = register(&mut registry, 1, Some(0));
        let gone = register(&mut registry, 50, Some(1));

        // Both seen
        registry.mark_seen(keep);
        registry.mark_seen(gone);
        assert_eq!(registry.collect_garbage(), 0);

        // First miss: still live
        registry.mark_seen(keep);
        assert_eq!(registry.collect_garbage(), 0);
        assert!(registry.get(gone).is_live());

        // Second miss: collected
        registry.mark_seen(keep);
        assert_eq!(registry.collect_garbage(), 1);
        assert!(!registry.get(gone).is_live());
        assert!(registry.get(keep).is_live());
        assert_eq!(registry.live(), &[keep]);

        // The record itself stays in the arena and in the tree
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.children(keep).collect::<Vec<_>>(), vec![gone]);
    }

    #[test]
    fn test_single_miss_is_forgiven() {
        let mut registry = Registry::new();
        let id = register(&mut registry, 1, Some(0));
        registry.collect_garbage();
        registry.mark_seen(id);
        registry.collect_garbage();
        registry.collect_garbage();
        assert!(registry.get(id).is_live());
    }

    #[test]
    fn test_pid_reuse_after_collection_creates_new_record() {
        let mut registry = Registry::new();
        let old = register(&mut registry, 1, Some(0));
        registry.collect_garbage();
        registry.collect_garbage();
        assert!(!registry.get(old).is_live());

        let (new, created) = registry.find_or_create(&procfs(), Pid(1));
        assert!(created);
        assert_ne!(old, new);
    }

    #[test]
    fn test_close_all() {
        let mut registry = Registry::new();
        let id = register(&mut registry, 1, Some(0));
        registry.close_all();
        assert!(!registry.get(id).is_live());
        assert!(registry.live().is_empty());
        assert_eq!(registry.open_files(), 0);
    }
}
