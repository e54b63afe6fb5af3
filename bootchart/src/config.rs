//! Configuration loading
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. built-in defaults ([`Settings::default`])
//! 2. `bootchart.conf` and its drop-ins, `[Bootchart]` section
//! 3. command-line arguments ([`Settings::apply_args`])
//!
//! The main file is `/etc/systemd/bootchart.conf`. Drop-ins are `*.conf`
//! files in `bootchart.conf.d/` under each of [`DROPIN_ROOTS`]; a drop-in in
//! an earlier directory masks one with the same file name in a later
//! directory, and the survivors are applied in file-name order.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::cli::Args;
use crate::domain::ConfigError;

pub const DEFAULT_SAMPLES: u32 = 500;
pub const DEFAULT_HZ: f64 = 25.0;
pub const DEFAULT_OUTPUT: &str = "/run/log";
pub const DEFAULT_INIT: &str = "/usr/lib/systemd/systemd";

pub const MAIN_CONFIG: &str = "/etc/systemd/bootchart.conf";
pub const DROPIN_ROOTS: [&str; 4] =
    ["/etc/systemd", "/run/systemd", "/usr/local/lib/systemd", "/usr/lib/systemd"];
const DROPIN_DIR: &str = "bootchart.conf.d";
const SECTION: &str = "Bootchart";

/// Effective settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub samples: u32,
    pub hz: f64,
    pub relative: bool,
    /// Directory the summary is written to.
    pub output: PathBuf,
    /// Init executed when started as PID 1.
    pub init: PathBuf,
    pub pss: bool,
    pub entropy: bool,
    pub show_cmdline: bool,
    pub show_cgroup: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            samples: DEFAULT_SAMPLES,
            hz: DEFAULT_HZ,
            relative: false,
            output: PathBuf::from(DEFAULT_OUTPUT),
            init: PathBuf::from(DEFAULT_INIT),
            pss: false,
            entropy: false,
            show_cmdline: false,
            show_cgroup: false,
        }
    }
}

/// Where to look for configuration files.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub main: PathBuf,
    pub dropin_dirs: Vec<PathBuf>,
}

impl ConfigPaths {
    /// The standard system locations.
    pub fn system() -> Self {
        Self::under(Path::new("/"))
    }

    /// The standard locations re-rooted below `root`.
    pub fn under(root: &Path) -> Self {
        let rebase = |p: &str| root.join(p.trim_start_matches('/'));
        Self {
            main: rebase(MAIN_CONFIG),
            dropin_dirs: DROPIN_ROOTS.iter().map(|d| rebase(d).join(DROPIN_DIR)).collect(),
        }
    }

    /// Main file followed by the effective drop-ins, in application order.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut dropins: BTreeMap<String, PathBuf> = BTreeMap::new();
        for dir in &self.dropin_dirs {
            let Ok(entries) = fs::read_dir(dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                if !name.ends_with(".conf") {
                    continue;
                }
                dropins.entry(name).or_insert_with(|| entry.path());
            }
        }

        std::iter::once(self.main.clone()).chain(dropins.into_values()).collect()
    }
}

impl Settings {
    /// Defaults overlaid with every configuration file under `paths`.
    ///
    /// # Errors
    /// A file that exists but cannot be read yields [`ConfigError::Read`].
    /// Missing files are skipped.
    pub fn load(paths: &ConfigPaths) -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        for file in paths.files() {
            settings.apply_file(&file)?;
        }
        Ok(settings)
    }

    /// Overlay one configuration file.
    ///
    /// # Errors
    /// Fails if the file exists but cannot be read.
    pub fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(source) => return Err(ConfigError::Read { path: path.to_path_buf(), source }),
        };
        debug!("Loading {}", path.display());
        self.apply_str(path, &text);
        Ok(())
    }

    /// Overlay configuration text; `path` is only used in messages.
    ///
    /// Unknown keys and invalid values are reported and skipped.
    pub fn apply_str(&mut self, path: &Path, text: &str) {
        let mut section: Option<&str> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                if name != SECTION {
                    warn!("{}:{}: unknown section [{name}], ignoring", path.display(), idx + 1);
                }
                section = Some(name);
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                warn!("{}:{}: missing '=', ignoring line", path.display(), idx + 1);
                continue;
            };
            if section != Some(SECTION) {
                continue;
            }
            if let Err(e) = self.set(path, idx + 1, key.trim(), value.trim()) {
                warn!("{e}");
            }
        }
    }

    fn set(&mut self, path: &Path, line: usize, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            path: path.to_path_buf(),
            line,
            key: key.to_string(),
            value: value.to_string(),
        };

        match key {
            "Samples" => self.samples = value.parse().map_err(|_| invalid())?,
            "Frequency" => {
                self.hz = value
                    .parse::<f64>()
                    .ok()
                    .filter(|hz| hz.is_finite() && *hz > 0.0)
                    .ok_or_else(invalid)?;
            }
            "Relative" => self.relative = parse_bool(value).ok_or_else(invalid)?,
            "PlotMemoryUsage" => self.pss = parse_bool(value).ok_or_else(invalid)?,
            "PlotEntropyGraph" => self.entropy = parse_bool(value).ok_or_else(invalid)?,
            "ControlGroup" => self.show_cgroup = parse_bool(value).ok_or_else(invalid)?,
            "Output" => self.output = non_empty_path(value).ok_or_else(invalid)?,
            "Init" => self.init = non_empty_path(value).ok_or_else(invalid)?,
            // chart rendering only
            "Filter" | "ScaleX" | "ScaleY" | "PerCPU" => {}
            _ => warn!("{}:{line}: unknown key {key}, ignoring", path.display()),
        }
        Ok(())
    }

    /// Overlay command-line arguments.
    pub fn apply_args(&mut self, args: &Args) {
        if args.rel {
            self.relative = true;
        }
        if let Some(hz) = args.freq {
            self.hz = hz;
        }
        if let Some(samples) = args.samples {
            self.samples = samples;
        }
        if args.pss {
            self.pss = true;
        }
        if args.entropy {
            self.entropy = true;
        }
        if let Some(output) = &args.output {
            self.output.clone_from(output);
        }
        if let Some(init) = &args.init {
            self.init.clone_from(init);
        }
        if args.cmdline {
            self.show_cmdline = true;
        }
        if args.control_group {
            self.show_cgroup = true;
        }
    }
}

/// systemd-style boolean.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "yes" | "y" | "true" | "t" | "on" => Some(true),
        "0" | "no" | "n" | "false" | "f" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    (!value.is_empty()).then(|| PathBuf::from(value))
}
