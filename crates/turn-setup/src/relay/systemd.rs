use anyhow::Result;

use crate::cmd::Runner;
use crate::config::SERVICE_NAME;

/// Check whether the relay unit is currently active.
pub fn is_relay_active(runner: &dyn Runner) -> bool {
    runner
        .exec("systemctl", &["is-active", "--quiet", SERVICE_NAME])
        .is_ok_and(|o| o.success())
}

/// Enable the relay at boot and (re)start it so the new configuration is loaded.
pub fn enable_and_restart(runner: &dyn Runner) -> Result<()> {
    runner.run(
        &format!("enabling {SERVICE_NAME} at boot"),
        "systemctl",
        &["enable", SERVICE_NAME],
    )?;
    restart(runner)
}

/// Restart the relay and warn when it does not come back.
pub fn restart(runner: &dyn Runner) -> Result<()> {
    runner.run(
        &format!("restarting {SERVICE_NAME}"),
        "systemctl",
        &["restart", SERVICE_NAME],
    )?;

    if is_relay_active(runner) {
        tracing::info!("{SERVICE_NAME} is running");
    } else {
        tracing::warn!(
            "service may not have started correctly; check: journalctl -u {SERVICE_NAME}"
        );
    }
    Ok(())
}

/// Restart journald so a new drop-in takes effect. Best effort.
pub fn restart_journald(runner: &dyn Runner) {
    runner.run_best_effort(
        "restarting systemd-journald",
        "systemctl",
        &["restart", "systemd-journald"],
    );
}
