mod common;

use bootchart::domain::{CpuId, Pid, ProcessId, SampleId, TickId};
use bootchart::model::BlockStat;
use bootchart::procfs::ProcFs;
use bootchart::registry::Registry;
use bootchart::sampler::{Sampler, SamplerOptions};
use common::FakeProc;

const NSEC: u64 = 1_000_000_000;

fn sampler(fake: &FakeProc, options: SamplerOptions) -> Sampler {
    Sampler::new(ProcFs::new(fake.root()), options)
}

fn process(sampler: &Sampler, pid: u32) -> ProcessId {
    sampler.trace().find_process(Pid(pid)).unwrap()
}

fn history(sampler: &Sampler, id: ProcessId) -> Vec<SampleId> {
    sampler.trace().history(id).map(|(id, _)| id).collect()
}

#[test]
fn test_global_counters_land_in_tick() {
    let fake = FakeProc::new();
    let mut s = sampler(&fake, SamplerOptions::default());

    let outcome = s.sample_tick().unwrap();
    let tick = s.trace().tick(outcome.tick);

    assert_eq!(tick.counter, 0);
    assert_eq!(tick.blockstat, BlockStat { bi: 100, bo: 50 });
    assert_eq!(tick.cpu_runtime(CpuId(1)), Some(3000));
    assert_eq!(tick.cpu_waittime(CpuId(0)), Some(2000));
    assert_eq!(tick.entropy_avail, None);
    assert_eq!(s.trace().cpus(), 2);
    assert_eq!(outcome.processes, 0);
}

#[test]
fn test_history_length_and_garbage_collection() {
    let fake = FakeProc::new();
    fake.add(1, 0, "systemd");
    fake.add(50, 1, "udevd");
    let mut s = sampler(&fake, SamplerOptions::default());

    let first = s.sample_tick().unwrap();
    assert_eq!(first.new_processes, 2);
    for _ in 0..2 {
        assert_eq!(s.sample_tick().unwrap().new_processes, 0);
    }

    let udevd = process(&s, 50);
    assert_eq!(history(&s, udevd).len(), 3);
    assert!(s.trace().registry().get(udevd).open_files() > 0);

    fake.remove(50);
    let missed_once = s.sample_tick().unwrap();
    assert_eq!(missed_once.collected, 0);
    assert!(s.trace().registry().get(udevd).is_live());

    let missed_twice = s.sample_tick().unwrap();
    assert_eq!(missed_twice.collected, 1);
    let rec = s.trace().registry().get(udevd);
    assert!(!rec.is_live());
    assert_eq!(rec.open_files(), 0);
    assert_eq!(history(&s, udevd).len(), 3);

    let init = process(&s, 1);
    assert_eq!(history(&s, init).len(), 5);
    assert_eq!(s.trace().registry().live(), &[init]);
}

#[test]
fn test_pid_reuse_creates_new_record() {
    let fake = FakeProc::new();
    fake.add(1, 0, "systemd");
    fake.add(60, 1, "first");
    let mut s = sampler(&fake, SamplerOptions::default());
    s.sample_tick().unwrap();
    let old = process(&s, 60);

    fake.remove(60);
    s.sample_tick().unwrap();
    s.sample_tick().unwrap();

    fake.add(60, 1, "second");
    let outcome = s.sample_tick().unwrap();
    assert_eq!(outcome.new_processes, 1);

    let new = process(&s, 60);
    assert_ne!(old, new);
    assert_eq!(s.trace().registry().get(new).name, "second");
    assert_eq!(s.trace().registry().get(old).name, "first");
    assert_eq!(s.trace().registry().len(), 3);
}

#[test]
fn test_samples_link_to_tick_and_process() {
    let fake = FakeProc::new();
    fake.add(1, 0, "systemd");
    fake.add(2, 0, "kthreadd");
    fake.add(30, 1, "journald");
    let mut s = sampler(&fake, SamplerOptions::default());

    let ticks: Vec<TickId> = (0..3).map(|_| s.sample_tick().unwrap().tick).collect();
    let trace = s.trace();

    for &tick in &ticks {
        let in_tick: Vec<_> = trace.tick_samples(tick).collect();
        assert_eq!(in_tick.len(), 3);
        assert!(in_tick.iter().all(|(_, sample)| sample.tick == tick));
    }

    for id in trace.registry().ids() {
        let samples: Vec<_> = trace.history(id).collect();
        assert!(samples.iter().all(|(_, sample)| sample.process == id));
        for pair in samples.windows(2) {
            assert_eq!(pair[0].1.next, Some(pair[1].0));
            assert_eq!(pair[1].1.prev, Some(pair[0].0));
            assert!(trace.tick(pair[0].1.tick).sampletime <= trace.tick(pair[1].1.tick).sampletime);
        }
        assert_eq!(trace.registry().get(id).first, samples.first().map(|(id, _)| *id));
        assert_eq!(trace.registry().get(id).last, samples.last().map(|(id, _)| *id));
    }
}

#[test]
fn test_total_tracks_runtime() {
    let fake = FakeProc::new();
    fake.add(1, 0, "systemd");
    let mut s = sampler(&fake, SamplerOptions::default());

    let mut last_total = 0.0;
    for i in 0..4u64 {
        fake.set_schedstat(1, NSEC + i * NSEC / 2, i * 10);
        s.sample_tick().unwrap();
        let total = s.trace().registry().get(process(&s, 1)).total;
        assert!(total >= last_total);
        last_total = total;
    }
    assert!((last_total - 1.5).abs() < 1e-9);
}

#[test]
fn test_tree_and_orphans() {
    let fake = FakeProc::new();
    fake.add(1, 0, "systemd");
    fake.add(2, 0, "kthreadd");
    fake.add(40, 1, "getty");
    fake.add(77, 999, "orphan");
    let mut s = sampler(&fake, SamplerOptions::default());
    s.sample_tick().unwrap();

    let registry = s.trace().registry();
    let init = process(&s, 1);
    assert_eq!(registry.get(init).parent, Some(Registry::ROOT));
    assert_eq!(registry.get(init).ppid, Pid(0));

    let orphan = registry.get(process(&s, 77));
    assert_eq!(orphan.parent, Some(init));
    assert_eq!(orphan.ppid, Pid(1));

    let kthreadd = registry.get(process(&s, 2));
    assert_eq!(kthreadd.parent, Some(init));

    let children: Vec<Pid> = registry.children(init).map(|c| registry.get(c).pid).collect();
    assert_eq!(children, vec![Pid(2), Pid(40), Pid(77)]);

    let walk = registry.descendants(Registry::ROOT);
    assert_eq!(walk.len(), registry.len());
    assert_eq!(walk[0], (init, 1));
}

#[test]
fn test_orphan_without_init_hangs_off_root() {
    let fake = FakeProc::new();
    fake.add(300, 299, "lonely");
    let mut s = sampler(&fake, SamplerOptions::default());
    s.sample_tick().unwrap();

    let rec = s.trace().registry().get(process(&s, 300));
    assert_eq!(rec.parent, Some(Registry::ROOT));
}

#[test]
fn test_threads_are_summed() {
    let fake = FakeProc::new();
    fake.add(1, 0, "systemd");
    fake.add(60, 1, "worker");
    fake.set_schedstat(60, 1000, 100);
    fake.set_thread(60, 60, 1000, 100);
    fake.set_thread(60, 61, 2000, 200);
    fake.set_thread(60, 62, 3000, 300);
    let mut s = sampler(&fake, SamplerOptions::default());

    s.sample_tick().unwrap();
    let id = process(&s, 60);
    let last = s.trace().registry().get(id).last.unwrap();
    let sample = s.trace().sample(last);
    assert_eq!(sample.runtime, 6000);
    assert_eq!(sample.waittime, 600);

    // the exiting thread takes its time with it, the aggregate must not drop
    fake.remove_thread(60, 62);
    s.sample_tick().unwrap();
    let last = s.trace().registry().get(id).last.unwrap();
    assert_eq!(s.trace().sample(last).runtime, 6000);
    assert_eq!(s.trace().sample(last).waittime, 600);
}

#[test]
fn test_first_sighting_name_and_starttime() {
    let fake = FakeProc::new();
    fake.add(1, 0, "systemd");
    let mut s = sampler(&fake, SamplerOptions::default());
    s.sample_tick().unwrap();

    let rec = s.trace().registry().get(process(&s, 1));
    assert_eq!(rec.name, "systemd");
    let start = rec.starttime.unwrap();
    assert!((start.0 - 1.5).abs() < 1e-9);
}

#[test]
fn test_cmdline_names() {
    let fake = FakeProc::new();
    fake.add(1, 0, "systemd");
    let options = SamplerOptions { show_cmdline: true, ..SamplerOptions::default() };
    let mut s = sampler(&fake, options);
    s.sample_tick().unwrap();

    let rec = s.trace().registry().get(process(&s, 1));
    assert_eq!(rec.name, "/usr/bin/systemd --flag");
}

#[test]
fn test_name_falls_back_without_sched() {
    let fake = FakeProc::new();
    fake.add(1, 0, "systemd");
    fake.add(70, 1, "noshed");
    fake.remove_file(70, "sched");
    fake.add(71, 1, "kworker/0:1");
    fake.remove_file(71, "sched");
    fake.write("71/cmdline", "");
    let mut s = sampler(&fake, SamplerOptions::default());
    s.sample_tick().unwrap();

    let registry = s.trace().registry();
    assert_eq!(registry.get(process(&s, 70)).name, "/usr/bin/noshed --flag");
    assert_eq!(registry.get(process(&s, 71)).name, "kworker/0:1");
    assert_eq!(registry.get(process(&s, 71)).starttime, None);
}

#[test]
fn test_rename_updates_existing_record() {
    let fake = FakeProc::new();
    fake.add(1, 0, "systemd");
    fake.add(12, 1, "sh");
    let mut s = sampler(&fake, SamplerOptions::default());
    s.sample_tick().unwrap();
    let id = process(&s, 12);

    // exec: same pid, new comm
    fake.set_sched(12, "modprobe", 1500.0);
    let before = s.trace().registry().len();
    // at 25 Hz names are refreshed every 6 ticks, pid 12 on counters 0, 6, ...
    for _ in 0..6 {
        s.sample_tick().unwrap();
    }

    assert_eq!(s.trace().registry().len(), before);
    assert_eq!(process(&s, 12), id);
    assert_eq!(s.trace().registry().get(id).name, "modprobe");
}

#[test]
fn test_unreadable_schedstat_skips_process() {
    let fake = FakeProc::new();
    fake.add(1, 0, "systemd");
    fake.add(80, 1, "zombie");
    fake.remove_file(80, "schedstat");
    let mut s = sampler(&fake, SamplerOptions::default());

    let outcome = s.sample_tick().unwrap();
    assert_eq!(outcome.processes, 2);
    assert_eq!(outcome.sampled, 1);

    let rec = s.trace().registry().get(process(&s, 80));
    assert!(rec.is_live());
    assert_eq!(rec.first, None);
    assert_eq!(rec.open_files(), 0);
    assert_eq!(rec.name, "zombie");

    fake.set_schedstat(80, 5, 5);
    s.sample_tick().unwrap();
    assert_eq!(history(&s, process(&s, 80)).len(), 1);
}

#[test]
fn test_pss_from_smaps() {
    let fake = FakeProc::new();
    fake.add(1, 0, "systemd");
    let smaps = |pss: u64| {
        format!(
            "00400000-00452000 r-xp 00000000 08:02 173521 /usr/lib/systemd/systemd\n\
             Size:                328 kB\n\
             Rss:                 300 kB\n\
             Pss:                 {pss} kB\n\
             VmFlags: rd ex mr mw me dw\n\
             7fff0000-7fff2000 rw-p 00000000 00:00 0 [stack]\n\
             Size:                  8 kB\n\
             Pss:                   4 kB\n"
        )
    };
    fake.write("1/smaps", &smaps(100));
    let options = SamplerOptions { pss: true, ..SamplerOptions::default() };
    let mut s = sampler(&fake, options);

    s.sample_tick().unwrap();
    assert_eq!(s.smaps_layout(), Some("line-scan"));
    let id = process(&s, 1);
    let last = s.trace().registry().get(id).last.unwrap();
    assert_eq!(s.trace().sample(last).pss, 104);

    fake.write("1/smaps", &smaps(20));
    s.sample_tick().unwrap();
    let last = s.trace().registry().get(id).last.unwrap();
    assert_eq!(s.trace().sample(last).pss, 24);
    assert_eq!(s.trace().registry().get(id).pss_max, 104);
}

#[test]
fn test_missing_smaps_is_not_fatal() {
    let fake = FakeProc::new();
    fake.add(1, 0, "systemd");
    let options = SamplerOptions { pss: true, ..SamplerOptions::default() };
    let mut s = sampler(&fake, options);

    let outcome = s.sample_tick().unwrap();
    assert_eq!(outcome.sampled, 1);
    assert_eq!(s.smaps_layout(), None);
}

#[test]
fn test_entropy_and_cgroup() {
    let fake = FakeProc::new();
    fake.add(1, 0, "systemd");
    fake.write("sys/kernel/random/entropy_avail", "256\n");
    fake.write("1/cgroup", "1:name=systemd:/init.scope\n0::/init.scope\n");
    let options = SamplerOptions { entropy: true, show_cgroup: true, ..SamplerOptions::default() };
    let mut s = sampler(&fake, options);

    let outcome = s.sample_tick().unwrap();
    assert_eq!(s.trace().tick(outcome.tick).entropy_avail, Some(256));
    let rec = s.trace().registry().get(process(&s, 1));
    assert_eq!(rec.cgroup.as_deref(), Some("/init.scope"));
}

#[test]
fn test_into_trace_closes_descriptors() {
    let fake = FakeProc::new();
    fake.add(1, 0, "systemd");
    fake.add(2, 0, "kthreadd");
    let mut s = sampler(&fake, SamplerOptions::default());
    s.sample_tick().unwrap();
    assert!(s.trace().registry().open_files() > 0);

    let trace = s.into_trace();
    assert_eq!(trace.registry().open_files(), 0);
    assert!(trace.registry().live().is_empty());
    assert_eq!(trace.registry().len(), 2);
}
