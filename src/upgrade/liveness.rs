//! Is a binary image still executing?
//!
//! Answered from the full process table when the platform exposes one, else from
//! a coarse list of process names. Every uncertain answer is "running"; the
//! swap plan bounds how long it waits on one.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;
use tracing::{debug, warn};

use crate::upgrade::remote::BoxFuture;

/// Linux truncates `comm` to this many bytes.
const TRUNCATED_NAME_LEN: usize = 15;

/// Result of a liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Liveness {
    /// No process is backed by the image.
    NotRunning,
    /// A process is (or is assumed to be) backed by the image. `pid` is known
    /// only when the full process table was available.
    Running {
        /// Process id of the matching process
        pid: Option<u32>,
    },
}

impl Liveness {
    /// Whether the image should be treated as in use.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }
}

/// Decides whether a binary image is in use.
pub trait LivenessProbe: Send + Sync {
    /// Probe `image`. Never fails; uncertainty resolves to [`Liveness::Running`].
    fn probe<'a>(&'a self, image: &'a Path) -> BoxFuture<'a, Liveness>;
}

/// One row of the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    /// Process id
    pub pid: u32,
    /// Short process name
    pub name: String,
    /// Backing executable, when the platform exposes it
    pub exe: Option<PathBuf>,
}

/// Snapshot of running processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessTable {
    entries: Vec<ProcessEntry>,
}

impl ProcessTable {
    /// Build a table from explicit entries.
    pub fn from_entries(entries: Vec<ProcessEntry>) -> Self {
        Self {
            entries,
        }
    }

    /// Enumerate processes with `sysinfo`.
    ///
    /// Returns `None` when the platform is unsupported or when no process exposes
    /// its executable path (the table would be useless for path matching).
    pub fn snapshot() -> Option<Self> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return None;
        }

        let mut system = sysinfo::System::new();
        system.refresh_processes();

        let entries: Vec<ProcessEntry> = system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessEntry {
                pid: pid.as_u32(),
                name: Path::new(process.name()).to_string_lossy().into_owned(),
                exe: process.exe().map(Path::to_path_buf),
            })
            .collect();

        if entries.iter().all(|e| e.exe.is_none()) {
            debug!("Process table exposes no executable paths");
            return None;
        }
        Some(Self::from_entries(entries))
    }

    /// Find a process backed by `image`.
    ///
    /// Processes with an executable path are compared by canonical path; the
    /// others by name against the image's file name.
    pub fn find(&self, image: &Path) -> Option<u32> {
        let canonical = canonical_or_self(image);
        let basename = image.file_name()?.to_string_lossy().into_owned();

        self.entries
            .iter()
            .find(|entry| match &entry.exe {
                Some(exe) => exe == image || canonical_or_self(exe) == canonical,
                None => name_matches(&entry.name, &basename),
            })
            .map(|entry| entry.pid)
    }
}

fn canonical_or_self(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Compare a listed process name with a binary's file name.
///
/// Names may be listed with a directory (macOS `ps`), are case-insensitive on
/// Windows, and may be cut to 15 bytes on Linux.
pub fn name_matches(listed: &str, basename: &str) -> bool {
    let listed = Path::new(listed.trim())
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if listed.is_empty() {
        return false;
    }

    if cfg!(windows) {
        return listed.eq_ignore_ascii_case(basename);
    }
    listed == basename || (listed.len() == TRUNCATED_NAME_LEN && basename.starts_with(&listed))
}

/// Parse `ps -A -o comm=` output into names.
pub fn parse_ps_output(output: &str) -> Vec<String> {
    output.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect()
}

/// Parse `tasklist /FO CSV /NH` output into image names.
pub fn parse_tasklist_output(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split(',').next())
        .map(|field| field.trim().trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// List process names with the platform's listing tool.
///
/// Returns `None` if the tool is missing or fails.
fn list_process_names() -> Option<Vec<String>> {
    let (tool, args, parse): (&str, &[&str], fn(&str) -> Vec<String>) = if cfg!(windows) {
        ("tasklist", &["/FO", "CSV", "/NH"], parse_tasklist_output)
    } else {
        ("ps", &["-A", "-o", "comm="], parse_ps_output)
    };

    let program = which::which(tool).ok()?;
    let output = Command::new(&program).args(args).output().ok()?;
    if !output.status.success() {
        debug!("{} exited with {}", tool, output.status);
        return None;
    }
    Some(parse(&String::from_utf8_lossy(&output.stdout)))
}

/// Default probe: `sysinfo` process table, then the OS name listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLivenessProbe;

impl ProcessLivenessProbe {
    /// Blocking probe; use [`LivenessProbe::probe`] from async code.
    pub fn probe_blocking(image: &Path) -> Liveness {
        if let Some(table) = ProcessTable::snapshot() {
            return match table.find(image) {
                Some(pid) => {
                    debug!("{} is running as pid {}", image.display(), pid);
                    Liveness::Running {
                        pid: Some(pid),
                    }
                }
                None => Liveness::NotRunning,
            };
        }

        let Some(basename) = image.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return Liveness::Running {
                pid: None,
            };
        };

        match list_process_names() {
            Some(names) if !names.iter().any(|n| name_matches(n, &basename)) => {
                Liveness::NotRunning
            }
            Some(_) => {
                debug!("A process named like {} is listed; assuming running", basename);
                Liveness::Running {
                    pid: None,
                }
            }
            None => {
                warn!("Cannot list processes; assuming {} is running", image.display());
                Liveness::Running {
                    pid: None,
                }
            }
        }
    }
}

impl LivenessProbe for ProcessLivenessProbe {
    fn probe<'a>(&'a self, image: &'a Path) -> BoxFuture<'a, Liveness> {
        Box::pin(async move {
            let image = image.to_path_buf();
            tokio::task::spawn_blocking(move || Self::probe_blocking(&image))
                .await
                .unwrap_or(Liveness::Running {
                    pid: None,
                })
        })
    }
}
