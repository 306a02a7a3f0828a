pub mod systemd;
mod templates;

use anyhow::{Context, Result};

use crate::cmd::Runner;
use crate::config::{PACKAGES, RelaySettings, SERVICE_USER, SetupPaths};
use crate::credentials::Credentials;
use crate::files::{ensure_line, upsert_key, write_atomic};
use crate::turnconf::TurnConfig;

/// Install the relay package, write its configuration and start it.
///
/// Every step is safe to repeat: the configuration is rewritten from
/// scratch and the system files it touches are edited idempotently.
pub fn install(
    runner: &dyn Runner,
    paths: &SetupPaths,
    domain: &str,
    credentials: &Credentials,
    settings: &RelaySettings,
) -> Result<()> {
    // Build the configuration before touching the host so invalid input
    // fails fast.
    let mut config = TurnConfig::relay(domain, credentials, settings)?;

    install_packages(runner)?;
    tune_file_limits(runner, paths)?;
    enable_in_defaults(paths)?;

    carry_over_tls(paths, &mut config, settings)?;
    save_config(runner, paths, &config)?;

    grant_bind_capability(runner, paths)?;
    cap_log_volume(runner, paths)?;
    systemd::enable_and_restart(runner)?;

    tracing::info!("relay installed for {domain}");
    Ok(())
}

/// Write the relay configuration and give its group to the service account.
///
/// The file is replaced on every save, so ownership has to be restored each
/// time: the relay only reads it through the group bit of mode 0640.
pub fn save_config(runner: &dyn Runner, paths: &SetupPaths, config: &TurnConfig) -> Result<()> {
    config.save(&paths.turn_config)?;
    runner.run(
        "setting ownership on relay configuration",
        "chown",
        &[
            &format!("root:{SERVICE_USER}"),
            &paths.turn_config.to_string_lossy(),
        ],
    )?;
    Ok(())
}

fn install_packages(runner: &dyn Runner) -> Result<()> {
    runner.run("updating package lists", "apt-get", &["update"])?;
    let mut args = vec!["install", "-y"];
    args.extend_from_slice(PACKAGES);
    runner.run(
        &format!("installing {}", PACKAGES.join(", ")),
        "apt-get",
        &args,
    )?;
    Ok(())
}

/// Raise file-descriptor limits. Existing settings are replaced rather than
/// appended to, so repeated runs leave one line per setting.
fn tune_file_limits(runner: &dyn Runner, paths: &SetupPaths) -> Result<()> {
    upsert_key(
        &paths.sysctl_conf,
        "fs.file-max",
        " = ",
        &templates::FILE_MAX.to_string(),
    )?;
    for line in templates::limits_lines() {
        ensure_line(&paths.limits_conf, &line)?;
    }
    runner.run_best_effort("applying sysctl settings", "sysctl", &["-p"]);
    Ok(())
}

/// The Debian init wrapper refuses to start the relay without this switch.
fn enable_in_defaults(paths: &SetupPaths) -> Result<()> {
    upsert_key(&paths.turn_defaults, "TURNSERVER_ENABLED", "=", "1")?;
    Ok(())
}

/// Keep a previously configured TLS listener when its mirrored certificate
/// files are still in place.
fn carry_over_tls(
    paths: &SetupPaths,
    config: &mut TurnConfig,
    settings: &RelaySettings,
) -> Result<()> {
    let Ok(previous) = TurnConfig::load(&paths.turn_config) else {
        return Ok(());
    };
    let (cert, key) = (paths.cert_file(), paths.key_file());
    if previous.has_tls() && cert.exists() && key.exists() {
        tracing::info!("keeping existing TLS listener ({})", cert.display());
        config.apply_tls(&cert, &key, settings.tls_listening_port)?;
    }
    Ok(())
}

fn grant_bind_capability(runner: &dyn Runner, paths: &SetupPaths) -> Result<()> {
    runner.run(
        "allowing turnserver to bind privileged ports",
        "setcap",
        &[
            "cap_net_bind_service=+ep",
            &paths.turnserver_binary.to_string_lossy(),
        ],
    )?;
    Ok(())
}

fn cap_log_volume(runner: &dyn Runner, paths: &SetupPaths) -> Result<()> {
    tracing::info!("capping journal size: {}", paths.journald_dropin.display());
    write_atomic(&paths.journald_dropin, &templates::journald_dropin(), 0o644)
        .context("failed to write journald drop-in")?;
    systemd::restart_journald(runner);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    use super::*;
    use crate::cmd::testing::ScriptedRunner;

    fn creds() -> Credentials {
        Credentials {
            username: "alice".into(),
            password: "s3cret-pass".into(),
            generated: false,
        }
    }

    fn install_into(paths: &SetupPaths, runner: &ScriptedRunner) -> Result<()> {
        install(
            runner,
            paths,
            "turn.example.com",
            &creds(),
            &RelaySettings::default(),
        )
    }

    fn count_lines(path: &std::path::Path, needle: &str) -> usize {
        fs::read_to_string(path)
            .expect("read")
            .lines()
            .filter(|l| l.starts_with(needle))
            .count()
    }

    #[test]
    fn install_writes_config_with_single_user() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = SetupPaths::rooted(dir.path());
        let runner = ScriptedRunner::new();

        install_into(&paths, &runner).unwrap();

        let cfg = TurnConfig::load(&paths.turn_config).unwrap();
        assert_eq!(cfg.count("user"), 1);
        assert_eq!(cfg.get("user"), Some("alice:s3cret-pass"));
        assert_eq!(cfg.realm(), Some("turn.example.com"));
        assert!(!cfg.has_any_tls());
    }

    #[test]
    fn repeated_install_keeps_system_files_unique() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = SetupPaths::rooted(dir.path());
        fs::create_dir_all(paths.turn_defaults.parent().expect("parent")).expect("mkdir");
        fs::write(
            &paths.turn_defaults,
            "#TURNSERVER_ENABLED=1\nTURNSERVER_ENABLED=0\n",
        )
        .expect("write");

        for _ in 0..2 {
            install_into(&paths, &ScriptedRunner::new()).unwrap();
        }

        assert_eq!(count_lines(&paths.turn_defaults, "TURNSERVER_ENABLED="), 1);
        let defaults = fs::read_to_string(&paths.turn_defaults).unwrap();
        assert!(defaults.contains("TURNSERVER_ENABLED=1"));
        assert_eq!(count_lines(&paths.sysctl_conf, "fs.file-max"), 1);
        assert_eq!(count_lines(&paths.limits_conf, "* soft nofile"), 1);
        assert_eq!(count_lines(&paths.limits_conf, "* hard nofile"), 1);
        assert_eq!(count_lines(&paths.turn_config, "user="), 1);
    }

    #[test]
    fn install_runs_host_commands() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = SetupPaths::rooted(dir.path());
        let runner = ScriptedRunner::new();

        install_into(&paths, &runner).unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0], "apt-get update");
        assert_eq!(calls[1], "apt-get install -y coturn dnsutils curl libcap2-bin");
        assert!(runner.ran("setcap cap_net_bind_service=+ep"));
        assert!(runner.ran("chown root:turnserver"));
        assert!(runner.ran("systemctl enable coturn"));
        assert!(runner.ran("systemctl restart coturn"));
        assert!(paths.journald_dropin.exists());
    }

    #[test]
    fn saved_config_is_group_readable_by_relay_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = SetupPaths::rooted(dir.path());
        let runner = ScriptedRunner::new();
        let cfg = TurnConfig::relay("turn.example.com", &creds(), &RelaySettings::default())
            .unwrap();

        save_config(&runner, &paths, &cfg).unwrap();

        let chown = format!("chown root:turnserver {}", paths.turn_config.display());
        assert_eq!(runner.calls(), vec![chown]);
        let meta = fs::metadata(&paths.turn_config).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o640);
    }

    #[test]
    fn failed_chown_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = SetupPaths::rooted(dir.path());
        let runner = ScriptedRunner::new().fail("chown", "invalid group");
        let cfg = TurnConfig::relay("turn.example.com", &creds(), &RelaySettings::default())
            .unwrap();

        let err = save_config(&runner, &paths, &cfg).unwrap_err();
        assert!(format!("{err:#}").contains("invalid group"));
    }

    #[test]
    fn failed_package_install_stops_before_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = SetupPaths::rooted(dir.path());
        let runner = ScriptedRunner::new().fail("apt-get install", "dpkg lock held");

        let err = install_into(&paths, &runner).unwrap_err();
        assert!(format!("{err:#}").contains("dpkg lock held"));
        assert!(!paths.turn_config.exists());
        assert!(!runner.ran("systemctl"));
    }

    #[test]
    fn reinstall_keeps_tls_when_certs_present() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = SetupPaths::rooted(dir.path());
        install_into(&paths, &ScriptedRunner::new()).unwrap();

        let mut cfg = TurnConfig::load(&paths.turn_config).unwrap();
        cfg.apply_tls(&paths.cert_file(), &paths.key_file(), 443).unwrap();
        cfg.save(&paths.turn_config).unwrap();
        fs::create_dir_all(&paths.cert_dir).expect("mkdir");
        fs::write(paths.cert_file(), "chain").expect("write");
        fs::write(paths.key_file(), "key").expect("write");

        install_into(&paths, &ScriptedRunner::new()).unwrap();
        assert!(TurnConfig::load(&paths.turn_config).unwrap().has_tls());
    }

    #[test]
    fn reinstall_drops_tls_without_certs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = SetupPaths::rooted(dir.path());
        install_into(&paths, &ScriptedRunner::new()).unwrap();

        let mut cfg = TurnConfig::load(&paths.turn_config).unwrap();
        cfg.apply_tls(&paths.cert_file(), &paths.key_file(), 443).unwrap();
        cfg.save(&paths.turn_config).unwrap();

        install_into(&paths, &ScriptedRunner::new()).unwrap();
        assert!(!TurnConfig::load(&paths.turn_config).unwrap().has_any_tls());
    }
}
