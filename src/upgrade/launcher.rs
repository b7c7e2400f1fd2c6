//! Starting a swap plan outside this process.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;

use tracing::{debug, info};

use crate::constants::SWAP_SCRIPT_PREFIX;
use crate::core::UpdateError;
use crate::upgrade::remote::BoxFuture;
use crate::upgrade::swap_plan::{ScriptFlavor, SwapPlan};

/// Hands a swap plan over to something that outlives this process.
pub trait PlanLauncher: Send + Sync {
    /// Start `plan`. Once this returns `Ok`, the swap is irreversible.
    fn launch<'a>(&'a self, plan: &'a SwapPlan) -> BoxFuture<'a, Result<(), UpdateError>>;
}

/// Configure `command` so the child survives the parent's exit.
///
/// Standard streams are detached; on Unix the child gets its own process group,
/// on Windows it is created detached in a new process group.
pub fn detach(command: &mut Command) -> &mut Command {
    command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    command
}

/// Renders the plan to a script in the temp directory and runs it detached.
#[derive(Debug, Clone)]
pub struct DetachedLauncher {
    script_dir: PathBuf,
    flavor: ScriptFlavor,
}

impl Default for DetachedLauncher {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl DetachedLauncher {
    /// Launcher writing its scripts into `script_dir`.
    pub fn new(script_dir: impl Into<PathBuf>) -> Self {
        Self {
            script_dir: script_dir.into(),
            flavor: ScriptFlavor::native(),
        }
    }

    /// Write the rendered script and return its path. The file is kept on disk;
    /// the script deletes itself when it finishes.
    pub fn write_script(&self, plan: &SwapPlan) -> Result<PathBuf, UpdateError> {
        let launch_err = |e: std::io::Error| UpdateError::Launch {
            reason: format!("cannot write swap script in {}: {e}", self.script_dir.display()),
        };

        let suffix = format!(".{}", self.flavor.extension());
        let mut file = tempfile::Builder::new()
            .prefix(SWAP_SCRIPT_PREFIX)
            .suffix(&suffix)
            .tempfile_in(&self.script_dir)
            .map_err(launch_err)?;

        std::io::Write::write_all(&mut file, plan.render(self.flavor).as_bytes())
            .map_err(launch_err)?;

        let (_, path) = file.keep().map_err(|e| launch_err(e.error))?;
        debug!("Wrote swap script {}", path.display());
        Ok(path)
    }

    fn spawn_script(&self, script: &Path) -> Result<(), UpdateError> {
        let mut command = match self.flavor {
            ScriptFlavor::Sh => {
                let mut command = Command::new("/bin/sh");
                command.arg(script);
                command
            }
            ScriptFlavor::Cmd => {
                let mut command = Command::new("cmd.exe");
                command.arg("/C").arg(script);
                command
            }
        };

        detach(&mut command).spawn().map_err(|e| UpdateError::Launch {
            reason: format!("cannot start {}: {e}", script.display()),
        })?;
        info!("Swap plan started from {}", script.display());
        Ok(())
    }
}

impl PlanLauncher for DetachedLauncher {
    fn launch<'a>(&'a self, plan: &'a SwapPlan) -> BoxFuture<'a, Result<(), UpdateError>> {
        Box::pin(async move {
            let script = self.write_script(plan)?;
            self.spawn_script(&script).inspect_err(|_| {
                let _ = std::fs::remove_file(&script);
            })
        })
    }
}

/// Prints the plan instead of running it. Used by `check --dry-run`.
#[derive(Debug, Default)]
pub struct DryRunLauncher {
    rendered: Mutex<Vec<SwapPlan>>,
}

impl DryRunLauncher {
    /// Create an empty dry-run launcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Plans received so far.
    pub fn plans(&self) -> Vec<SwapPlan> {
        self.rendered.lock().map(|plans| plans.clone()).unwrap_or_default()
    }
}

impl PlanLauncher for DryRunLauncher {
    fn launch<'a>(&'a self, plan: &'a SwapPlan) -> BoxFuture<'a, Result<(), UpdateError>> {
        Box::pin(async move {
            info!("Dry run: swap plan not started");
            if let Ok(mut plans) = self.rendered.lock() {
                plans.push(plan.clone());
            }
            Ok(())
        })
    }
}
