//! The post-exit continuation that replaces a running binary.
//!
//! A running executable cannot reliably replace itself, so the final part of
//! an update happens after this process exits. It is described as data: a
//! [`SwapPlan`] is an ordered list of [`SwapStep`]s that can be
//!
//! - rendered into a self-deleting shell or batch script ([`SwapPlan::render`]),
//!   which is what actually runs once the caller exits,
//! - interpreted against a [`SwapHost`] ([`SwapPlan::run`]), which checks the
//!   step semantics without spawning anything,
//! - serialized to JSON for `--dry-run` output.
//!
//! Every step is best-effort. A wait that runs out of time proceeds anyway, a
//! failed removal does not stop the move, and nothing reports back.

use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{
    DEFAULT_SWAP_INITIAL_DELAY_MS, DEFAULT_SWAP_MAX_WAIT_SECS, DEFAULT_SWAP_POLL_INITIAL_MS,
    DEFAULT_SWAP_POLL_MAX_MS,
};
use crate::upgrade::liveness::Liveness;

/// One instruction of a swap plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum SwapStep {
    /// Pause unconditionally.
    Sleep {
        /// Pause length in milliseconds
        millis: u64,
    },
    /// Poll until `pid` is gone, doubling the interval up to `poll_max_ms`,
    /// for at most `max_wait_ms`.
    WaitForExit {
        /// Process to wait for
        pid: u32,
        /// Image the process runs, for diagnostics
        image: PathBuf,
        /// First poll interval
        poll_initial_ms: u64,
        /// Poll interval cap
        poll_max_ms: u64,
        /// Give up waiting after this long
        max_wait_ms: u64,
    },
    /// Delete a file if present.
    RemoveFile {
        /// File to delete
        path: PathBuf,
    },
    /// Move `from` to `to` unless `to` already exists. Rename first, then
    /// copy-and-delete.
    MoveFile {
        /// Source
        from: PathBuf,
        /// Destination
        to: PathBuf,
    },
    /// Start `program` detached.
    Launch {
        /// Binary to run
        program: PathBuf,
        /// Arguments passed to it
        args: Vec<String>,
    },
}

/// Delays used when building a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapTimings {
    /// Pause before anything else, so the parent can exit
    pub initial_delay: Duration,
    /// First liveness poll interval
    pub poll_initial: Duration,
    /// Liveness poll interval cap
    pub poll_max: Duration,
    /// Upper bound on the liveness wait
    pub max_wait: Duration,
}

impl Default for SwapTimings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(DEFAULT_SWAP_INITIAL_DELAY_MS),
            poll_initial: Duration::from_millis(DEFAULT_SWAP_POLL_INITIAL_MS),
            poll_max: Duration::from_millis(DEFAULT_SWAP_POLL_MAX_MS),
            max_wait: Duration::from_secs(DEFAULT_SWAP_MAX_WAIT_SECS),
        }
    }
}

/// Inputs for [`SwapPlan::for_handoff`].
#[derive(Debug, Clone)]
pub struct SwapRequest<'a> {
    /// The image being replaced (normally the running executable)
    pub old_image: Option<&'a Path>,
    /// Liveness of `old_image` at generation time
    pub old_liveness: Liveness,
    /// Pid to wait for when the probe could not name one
    pub fallback_pid: u32,
    /// Verified artifact still waiting to be moved into place
    pub staged: Option<&'a Path>,
    /// Canonical versioned path of the new build
    pub target: &'a Path,
    /// Arguments for the relaunched binary
    pub relaunch_args: &'a [String],
    /// Delays
    pub timings: SwapTimings,
}

/// Script dialect for [`SwapPlan::render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptFlavor {
    /// POSIX `sh`
    Sh,
    /// Windows `cmd.exe` batch
    Cmd,
}

impl ScriptFlavor {
    /// The flavor the current platform runs.
    pub fn native() -> Self {
        if cfg!(windows) { Self::Cmd } else { Self::Sh }
    }

    /// File extension for scripts of this flavor.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Sh => "sh",
            Self::Cmd => "cmd",
        }
    }
}

/// What happened to one step when a plan was interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step did its work.
    Done,
    /// The step had nothing to do.
    Skipped(String),
    /// The wait ran out of time; the plan continued.
    TimedOut,
    /// The step failed; the plan continued.
    Failed(String),
}

/// The side effects a plan needs.
pub trait SwapHost {
    /// Block for `duration`.
    fn sleep(&mut self, duration: Duration);
    /// Whether process `pid` still exists.
    fn is_alive(&mut self, pid: u32) -> bool;
    /// Whether `path` exists.
    fn exists(&mut self, path: &Path) -> bool;
    /// Delete a file.
    fn remove_file(&mut self, path: &Path) -> io::Result<()>;
    /// Rename a file.
    fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()>;
    /// Copy a file.
    fn copy(&mut self, from: &Path, to: &Path) -> io::Result<()>;
    /// Start a detached program.
    fn launch(&mut self, program: &Path, args: &[String]) -> io::Result<()>;
}

/// An ordered list of swap steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapPlan {
    steps: Vec<SwapStep>,
}

impl SwapPlan {
    /// Build a plan from explicit steps.
    pub fn new(steps: Vec<SwapStep>) -> Self {
        Self {
            steps,
        }
    }

    /// The steps, in execution order.
    pub fn steps(&self) -> &[SwapStep] {
        &self.steps
    }

    /// The plan that completes a handoff to `request.target`.
    ///
    /// - always starts with the initial delay
    /// - waits for the old process only if it was reported running
    /// - removes the old image unless it *is* the target
    /// - moves the staged file only if the target does not exist yet
    /// - always ends by launching the target
    pub fn for_handoff(request: &SwapRequest<'_>) -> Self {
        let timings = request.timings;
        let mut steps = vec![SwapStep::Sleep {
            millis: duration_ms(timings.initial_delay),
        }];

        if let Some(old) = request.old_image {
            if let Liveness::Running {
                pid,
            } = request.old_liveness
            {
                steps.push(SwapStep::WaitForExit {
                    pid: pid.unwrap_or(request.fallback_pid),
                    image: old.to_path_buf(),
                    poll_initial_ms: duration_ms(timings.poll_initial).max(1),
                    poll_max_ms: duration_ms(timings.poll_max).max(1),
                    max_wait_ms: duration_ms(timings.max_wait),
                });
            }

            if same_file(old, request.target) {
                debug!("Old image is the target; keeping it");
            } else {
                steps.push(SwapStep::RemoveFile {
                    path: old.to_path_buf(),
                });
            }
        }

        if let Some(staged) = request.staged {
            if request.target.is_file() {
                debug!("Target {} already exists; no move step", request.target.display());
            } else {
                steps.push(SwapStep::MoveFile {
                    from: staged.to_path_buf(),
                    to: request.target.to_path_buf(),
                });
            }
        }

        steps.push(SwapStep::Launch {
            program: request.target.to_path_buf(),
            args: request.relaunch_args.to_vec(),
        });

        Self::new(steps)
    }

    /// Pretty JSON form of the plan.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Interpret the plan against `host`, returning one outcome per step.
    pub fn run<H: SwapHost>(&self, host: &mut H) -> Vec<StepOutcome> {
        self.steps.iter().map(|step| run_step(step, host)).collect()
    }

    /// Render the plan as a self-deleting script.
    pub fn render(&self, flavor: ScriptFlavor) -> String {
        match flavor {
            ScriptFlavor::Sh => render_sh(&self.steps),
            ScriptFlavor::Cmd => render_cmd(&self.steps),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn run_step<H: SwapHost>(step: &SwapStep, host: &mut H) -> StepOutcome {
    match step {
        SwapStep::Sleep {
            millis,
        } => {
            host.sleep(Duration::from_millis(*millis));
            StepOutcome::Done
        }
        SwapStep::WaitForExit {
            pid,
            poll_initial_ms,
            poll_max_ms,
            max_wait_ms,
            ..
        } => {
            let mut waited = 0u64;
            let mut delay = *poll_initial_ms;
            while host.is_alive(*pid) {
                if waited >= *max_wait_ms {
                    return StepOutcome::TimedOut;
                }
                host.sleep(Duration::from_millis(delay));
                waited = waited.saturating_add(delay);
                delay = delay.saturating_mul(2).min(*poll_max_ms);
            }
            StepOutcome::Done
        }
        SwapStep::RemoveFile {
            path,
        } => match host.remove_file(path) {
            Ok(()) => StepOutcome::Done,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                StepOutcome::Skipped("already absent".to_string())
            }
            Err(e) => StepOutcome::Failed(e.to_string()),
        },
        SwapStep::MoveFile {
            from,
            to,
        } => {
            if host.exists(to) {
                return StepOutcome::Skipped("target exists".to_string());
            }
            if host.rename(from, to).is_ok() {
                return StepOutcome::Done;
            }
            match host.copy(from, to) {
                Ok(()) => {
                    let _ = host.remove_file(from);
                    StepOutcome::Done
                }
                Err(e) => StepOutcome::Failed(e.to_string()),
            }
        }
        SwapStep::Launch {
            program,
            args,
        } => match host.launch(program, args) {
            Ok(()) => StepOutcome::Done,
            Err(e) => StepOutcome::Failed(e.to_string()),
        },
    }
}

fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn sh_path(path: &Path) -> String {
    sh_quote(&path.to_string_lossy())
}

fn render_sh(steps: &[SwapStep]) -> String {
    let mut script = String::from("#!/bin/sh\n# binswap swap plan\n");
    script.push_str(
        "pause_ms() { sleep \"$(($1 / 1000)).$(printf '%03d' $(($1 % 1000)))\" 2>/dev/null || sleep $((($1 + 999) / 1000)); }\n",
    );

    for step in steps {
        match step {
            SwapStep::Sleep {
                millis,
            } => {
                let _ = writeln!(script, "pause_ms {millis}");
            }
            SwapStep::WaitForExit {
                pid,
                poll_initial_ms,
                poll_max_ms,
                max_wait_ms,
                ..
            } => {
                let _ = write!(
                    script,
                    "waited=0\n\
                     delay={poll_initial_ms}\n\
                     while kill -0 {pid} 2>/dev/null; do\n\
                     \x20 if [ \"$waited\" -ge {max_wait_ms} ]; then break; fi\n\
                     \x20 pause_ms \"$delay\"\n\
                     \x20 waited=$((waited + delay))\n\
                     \x20 delay=$((delay * 2))\n\
                     \x20 if [ \"$delay\" -gt {poll_max_ms} ]; then delay={poll_max_ms}; fi\n\
                     done\n"
                );
            }
            SwapStep::RemoveFile {
                path,
            } => {
                let _ = writeln!(script, "rm -f {}", sh_path(path));
            }
            SwapStep::MoveFile {
                from,
                to,
            } => {
                let (from, to) = (sh_path(from), sh_path(to));
                let _ = writeln!(
                    script,
                    "if [ ! -e {to} ]; then mv -f {from} {to} 2>/dev/null || {{ cp -f {from} {to} && rm -f {from}; }}; fi"
                );
            }
            SwapStep::Launch {
                program,
                args,
            } => {
                let mut line = format!("nohup {}", sh_path(program));
                for arg in args {
                    line.push(' ');
                    line.push_str(&sh_quote(arg));
                }
                let _ = writeln!(script, "{line} >/dev/null 2>&1 &");
            }
        }
    }

    script.push_str("rm -f \"$0\"\nexit 0\n");
    script
}

fn cmd_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "").replace('%', "%%"))
}

fn cmd_path(path: &Path) -> String {
    cmd_quote(&path.to_string_lossy())
}

fn render_cmd(steps: &[SwapStep]) -> String {
    let mut script = String::from("@echo off\r\nrem binswap swap plan\r\nsetlocal\r\n");

    for (index, step) in steps.iter().enumerate() {
        match step {
            SwapStep::Sleep {
                millis,
            } => {
                let _ = write!(
                    script,
                    "powershell -NoProfile -Command \"Start-Sleep -Milliseconds {millis}\" >nul 2>&1\r\n"
                );
            }
            SwapStep::WaitForExit {
                pid,
                poll_initial_ms,
                poll_max_ms,
                max_wait_ms,
                ..
            } => {
                let _ = write!(
                    script,
                    "set /a waited=0\r\n\
                     set /a delay={poll_initial_ms}\r\n\
                     :wait_{index}\r\n\
                     tasklist /FI \"PID eq {pid}\" /FO CSV /NH | find \",\"\"{pid}\"\",\" >nul || goto waited_{index}\r\n\
                     if %waited% GEQ {max_wait_ms} goto waited_{index}\r\n\
                     powershell -NoProfile -Command \"Start-Sleep -Milliseconds %delay%\" >nul 2>&1\r\n\
                     set /a waited+=delay\r\n\
                     set /a delay*=2\r\n\
                     if %delay% GTR {poll_max_ms} set /a delay={poll_max_ms}\r\n\
                     goto wait_{index}\r\n\
                     :waited_{index}\r\n"
                );
            }
            SwapStep::RemoveFile {
                path,
            } => {
                let _ = write!(script, "del /f /q {} >nul 2>&1\r\n", cmd_path(path));
            }
            SwapStep::MoveFile {
                from,
                to,
            } => {
                let (from, to) = (cmd_path(from), cmd_path(to));
                let _ = write!(
                    script,
                    "if exist {to} goto moved_{index}\r\n\
                     move /y {from} {to} >nul 2>&1\r\n\
                     if errorlevel 1 copy /y {from} {to} >nul && del /f /q {from} >nul 2>&1\r\n\
                     :moved_{index}\r\n"
                );
            }
            SwapStep::Launch {
                program,
                args,
            } => {
                let mut line = format!("start \"\" {}", cmd_path(program));
                for arg in args {
                    line.push(' ');
                    line.push_str(&cmd_quote(arg));
                }
                let _ = write!(script, "{line}\r\n");
            }
        }
    }

    script.push_str("(goto) 2>nul & del \"%~f0\"\r\n");
    script
}
