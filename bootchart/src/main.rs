//! # bootchart - Main Entry Point
//!
//! Loads settings, hands PID 1 over to the real init when started by the
//! kernel, records until the sample limit or a signal, and writes a JSON
//! summary of the recording to the output directory.

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use bootchart::cli::Args;
use bootchart::config::{ConfigPaths, Settings};
use bootchart::export::{summary_file_name, write_summary, TraceSummary};
use bootchart::preflight::{hand_over_init, os_pretty_name, run_preflight_checks};
use bootchart::procfs::ProcFs;
use bootchart::recorder::{Recorder, RecorderConfig};
use bootchart::sampler::{Sampler, SamplerOptions};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("permission denied") {
        EXIT_NOPERM
    } else if msg.contains("invalid sampling frequency") || msg.contains("config file not found") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = if let Some(ref path) = args.config {
        if !path.exists() {
            bail!("Config file not found: {}", path.display());
        }
        let mut settings = Settings::default();
        settings.apply_file(path)?;
        settings
    } else {
        Settings::load(&ConfigPaths::system())?
    };
    settings.apply_args(args);
    Ok(settings)
}

fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;
    let settings = load_settings(&args)?;

    // must happen before any thread exists
    hand_over_init(&settings.init)?;

    let procfs = args.proc_root.clone().map_or_else(ProcFs::default, ProcFs::new);
    run_preflight_checks(&procfs, quiet)?;

    if !quiet {
        println!("bootchart v{}", env!("CARGO_PKG_VERSION"));
        println!(
            "Recording {} samples at {} Hz{}",
            settings.samples,
            settings.hz,
            if settings.relative { " (relative)" } else { "" }
        );
    }

    let options = SamplerOptions {
        hz: settings.hz,
        pss: settings.pss,
        entropy: settings.entropy,
        show_cmdline: settings.show_cmdline,
        show_cgroup: settings.show_cgroup,
    };
    let sampler = Sampler::new(procfs, options);
    let recorder = Recorder::new(
        sampler,
        RecorderConfig { samples: settings.samples, hz: settings.hz, relative: settings.relative },
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let (trace, record) = runtime.block_on(recorder.run())?;

    info!(
        "Recorded {} ticks, {} processes, {} overruns",
        trace.ticks().len(),
        trace.registry().len(),
        record.overruns
    );

    let build = os_pretty_name(Path::new("/"));
    let summary = TraceSummary::new(&trace, &record, build.as_deref());
    let path = write_summary_file(&settings.output, &summary)?;

    if !quiet {
        println!("bootchart wrote {}", path.display());
    }
    Ok(())
}

fn write_summary_file(dir: &Path, summary: &TraceSummary) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
    let path = dir.join(summary_file_name(secs));
    let file = File::create(&path)
        .with_context(|| format!("Failed to create output file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_summary(&mut writer, summary)?;
    writer.flush().with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
