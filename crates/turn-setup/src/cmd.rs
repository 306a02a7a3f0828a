use std::process::Command;

use anyhow::{Context, Result, bail};

/// Captured result of an external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub const fn success(&self) -> bool {
        matches!(self.status, Some(0))
    }
}

/// Executes external programs on the host.
///
/// Only [`Runner::exec`] touches the operating system; everything else is
/// built on top of it so a scripted runner can stand in during tests.
pub trait Runner {
    /// Spawn `program` with `args`, wait for it and capture its output.
    /// Fails only when the process could not be started.
    fn exec(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Execute a command with logging. Logs the full command line at debug level
    /// and a human-friendly description at info level. A non-zero exit is an error.
    fn run(&self, description: &str, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let cmd_line = format!("{program} {}", args.join(" "));
        tracing::info!("{description}");
        tracing::debug!("exec: {cmd_line}");

        let output = self.exec(program, args)?;
        if !output.success() {
            let stderr = output.stderr.trim();
            tracing::error!("command failed: {cmd_line}\nstderr: {stderr}");
            bail!("{description} failed (exit {}): {stderr}", exit_label(output.status));
        }
        Ok(output)
    }

    /// Like [`Runner::run`] but never fails. Returns whether the command succeeded.
    fn run_best_effort(&self, description: &str, program: &str, args: &[&str]) -> bool {
        match self.run(description, program, args) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("{description} skipped: {e:#}");
                false
            }
        }
    }

    /// Execute a command and return its trimmed stdout. A non-zero exit is an error.
    fn capture(&self, program: &str, args: &[&str]) -> Result<String> {
        let cmd_line = format!("{program} {}", args.join(" "));
        tracing::debug!("exec (capture): {cmd_line}");

        let output = self.exec(program, args)?;
        if !output.success() {
            bail!(
                "{cmd_line} exited with {}: {}",
                exit_label(output.status),
                output.stderr.trim()
            );
        }
        Ok(output.stdout.trim().to_string())
    }

    /// Check whether a program exists on PATH.
    fn command_exists(&self, program: &str) -> bool {
        self.exec("which", &[program]).is_ok_and(|o| o.success())
    }
}

fn exit_label(status: Option<i32>) -> String {
    status.map_or_else(|| "signal".to_string(), |code| code.to_string())
}

/// [`Runner`] backed by real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn exec(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let cmd_line = format!("{program} {}", args.join(" "));
        let output = Command::new(program)
            .args(args)
            // apt and its maintainer scripts must never stop to ask questions
            .env("DEBIAN_FRONTEND", "noninteractive")
            .output()
            .with_context(|| format!("failed to execute: {cmd_line}"))?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::testing::ScriptedRunner;
    use super::*;

    #[test]
    fn run_fails_on_non_zero_exit() {
        let runner = ScriptedRunner::new().fail("apt-get install", "E: Unable to locate package");
        let args = ["install", "-y", "coturn"];
        let err = runner
            .run("installing packages", "apt-get", &args)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("installing packages failed (exit 1)"), "{msg}");
        assert!(msg.contains("Unable to locate package"), "{msg}");
    }

    #[test]
    fn best_effort_swallows_failure() {
        let runner = ScriptedRunner::new().fail("systemctl stop nginx", "not loaded");
        assert!(!runner.run_best_effort("stopping nginx", "systemctl", &["stop", "nginx"]));
        assert!(runner.run_best_effort("stopping apache2", "systemctl", &["stop", "apache2"]));
        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn capture_trims_stdout() {
        let runner = ScriptedRunner::new().ok("curl", "203.0.113.7\n");
        assert_eq!(runner.capture("curl", &["-fsS", "x"]).unwrap(), "203.0.113.7");
    }

    #[test]
    fn command_exists_uses_which() {
        let runner = ScriptedRunner::new().fail("which certbot", "");
        assert!(!runner.command_exists("certbot"));
        assert!(runner.command_exists("systemctl"));
        assert_eq!(runner.calls(), vec!["which certbot", "which systemctl"]);
    }

    #[test]
    fn signal_exit_is_not_success() {
        let out = CommandOutput {
            status: None,
            ..CommandOutput::default()
        };
        assert!(!out.success());
        assert_eq!(exit_label(out.status), "signal");
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_captures_output() {
        let out = SystemRunner.exec("sh", &["-c", "echo hi; exit 3"]).unwrap();
        assert_eq!(out.status, Some(3));
        assert_eq!(out.stdout.trim(), "hi");
    }
}
