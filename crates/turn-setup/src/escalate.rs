use std::env;
use std::process::Command;

use anyhow::{Context, Result, bail};
use nix::unistd::geteuid;

use crate::prompt::Prompter;

/// Whether the installer runs with an effective uid of 0.
pub fn is_root() -> bool {
    geteuid().is_root()
}

/// Continue only as root.
///
/// Unattended runs fail straight away. Interactive runs are offered a re-exec
/// of the same command line through `sudo`; the process then exits with the
/// child's status and this function does not return.
pub fn ensure_root(prompter: &dyn Prompter, non_interactive: bool) -> Result<()> {
    if is_root() {
        return Ok(());
    }
    if non_interactive {
        bail!("turn-setup must run as root; re-run with sudo");
    }
    if !prompter.confirm("Root privileges are required. Re-run with sudo?", true)? {
        bail!("root privileges declined; re-run with sudo");
    }

    let mut sudo = sudo_command()?;
    tracing::info!("re-executing through sudo");
    tracing::debug!("exec: {sudo:?}");
    let status = sudo.status().context("failed to start sudo")?;
    std::process::exit(status.code().unwrap_or(1));
}

/// `sudo <this executable> <same arguments>`.
fn sudo_command() -> Result<Command> {
    let exe = env::current_exe().context("cannot locate the running executable")?;
    let mut cmd = Command::new("sudo");
    cmd.arg(exe).args(env::args_os().skip(1));
    Ok(cmd)
}
