//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "bootchart",
    version,
    about = "Record per-process CPU, scheduling and memory activity from /proc",
    after_help = "\
EXAMPLES:
    bootchart -r -n 200 -f 50          Record 200 samples at 50 Hz from now on
    bootchart -p -e -o /tmp            Include PSS and entropy, write to /tmp
    init=/usr/lib/systemd/systemd-bootchart   Kernel command line for boot-time use

Settings not given on the command line are read from
/etc/systemd/bootchart.conf and bootchart.conf.d/*.conf drop-ins."
)]
pub struct Args {
    /// Record time relative to the start of recording instead of boot
    #[arg(short, long)]
    pub rel: bool,

    /// Sample frequency in Hz
    #[arg(short, long, value_name = "HZ", value_parser = parse_frequency)]
    pub freq: Option<f64>,

    /// Number of samples to record
    #[arg(short = 'n', long, value_name = "N")]
    pub samples: Option<u32>,

    /// Record proportional set size of every process
    #[arg(short, long)]
    pub pss: bool,

    /// Record the kernel entropy pool level
    #[arg(short, long)]
    pub entropy: bool,

    /// Directory to write the summary to
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Init to execute when started as PID 1
    #[arg(short, long, value_name = "PATH")]
    pub init: Option<PathBuf>,

    /// Name processes by their full command line
    #[arg(short = 'C', long)]
    pub cmdline: bool,

    /// Record the cgroup of every process
    #[arg(short = 'c', long)]
    pub control_group: bool,

    /// Read settings from FILE instead of the system configuration
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Sample a procfs mounted somewhere other than /proc
    #[arg(long, value_name = "DIR", hide = true)]
    pub proc_root: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

fn parse_frequency(s: &str) -> Result<f64, String> {
    let hz: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if hz.is_finite() && hz > 0.0 {
        Ok(hz)
    } else {
        Err("frequency must be greater than 0".to_string())
    }
}
