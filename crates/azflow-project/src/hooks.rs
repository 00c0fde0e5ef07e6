//! Lifecycle hooks
//!
//! Runs the `pre<command>` / `post<command>` entries of a hooks map through the
//! command runner, with the deployment environment exported to the script.

use crate::command::{CommandRunner, RunArgs};
use crate::error::{ProjectError, Result};
use azflow_cloud::SharedEnvironment;
use azflow_core::{HookConfig, HookPhase, HooksConfig, ShellKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct HooksRunner {
    runner: Arc<dyn CommandRunner>,
    env: SharedEnvironment,
}

impl HooksRunner {
    pub fn new(runner: Arc<dyn CommandRunner>, env: SharedEnvironment) -> Self {
        Self { runner, env }
    }

    /// Run the hooks registered for `phase` of `command` (e.g. `Pre` + `deploy` runs `predeploy`)
    pub async fn run(
        &self,
        hooks: &HooksConfig,
        phase: HookPhase,
        command: &str,
        cwd: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let name = hook_name(phase, command);
        let Some(list) = hooks.get(&name) else {
            return Ok(());
        };

        let environ = self.env.read().await.environ();
        for hook in &list.0 {
            let hook = hook.for_current_platform();
            if hook.run.trim().is_empty() {
                continue;
            }

            info!(hook = %name, "Running hook");
            let args = shell_command(hook)
                .with_cwd(cwd)
                .with_env(environ.clone());

            match self.runner.run(&args, cancel).await {
                Ok(_) => {}
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) if hook.continue_on_error => {
                    warn!(hook = %name, error = %e, "Hook failed, continuing");
                }
                Err(e) => {
                    return Err(ProjectError::Hook {
                        name,
                        source: Box::new(e),
                    });
                }
            }
        }
        Ok(())
    }
}

pub fn hook_name(phase: HookPhase, command: &str) -> String {
    match phase {
        HookPhase::Pre => format!("pre{command}"),
        HookPhase::Post => format!("post{command}"),
    }
}

fn default_shell() -> ShellKind {
    if cfg!(windows) { ShellKind::Pwsh } else { ShellKind::Sh }
}

/// Inline scripts run through the shell; a path to an existing script runs that file
fn shell_command(hook: &HookConfig) -> RunArgs {
    let shell = hook.shell.unwrap_or_else(default_shell);
    let is_script = PathBuf::from(hook.run.trim()).extension().is_some_and(|ext| {
        matches!(ext.to_str(), Some("sh") | Some("ps1"))
    });

    match (shell, is_script) {
        (ShellKind::Sh, true) => RunArgs::new("sh", [hook.run.trim()]),
        (ShellKind::Sh, false) => RunArgs::new("sh", ["-c", hook.run.as_str()]),
        (ShellKind::Pwsh, true) => RunArgs::new("pwsh", ["-File", hook.run.trim()]),
        (ShellKind::Pwsh, false) => RunArgs::new("pwsh", ["-Command", hook.run.as_str()]),
    }
}
