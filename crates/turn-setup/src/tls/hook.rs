//! certbot deploy hook that keeps the relay's certificate copy current.
//!
//! The hook is rendered with the domain it was generated for. certbot runs
//! deploy hooks for every renewed lineage, so the script ignores renewals
//! of any other domain.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::config::{SERVICE_NAME, SERVICE_USER, SetupPaths};

use super::TlsError;

/// Quote `s` for a POSIX shell.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Generate the deploy hook for `domain`.
pub fn render(paths: &SetupPaths, domain: &str) -> String {
    script(paths, domain, &format!("{SERVICE_USER}:{SERVICE_USER}"))
}

fn script(paths: &SetupPaths, domain: &str, owner: &str) -> String {
    let lineage = shell_quote(&paths.live_dir(domain).to_string_lossy());
    let cert_dir = shell_quote(&paths.cert_dir.to_string_lossy());
    let owner = shell_quote(owner);
    format!(
        r#"#!/bin/sh
# Generated by turn-setup for {domain}. Re-run `turn-setup tls` to regenerate.
set -eu

LINEAGE={lineage}
CERT_DIR={cert_dir}

if [ -n "${{RENEWED_LINEAGE:-}}" ] && [ "$RENEWED_LINEAGE" != "$LINEAGE" ]; then
    exit 0
fi

mkdir -p "$CERT_DIR"
cp -L "$LINEAGE/fullchain.pem" "$CERT_DIR/fullchain.pem"
cp -L "$LINEAGE/privkey.pem" "$CERT_DIR/privkey.pem"
chown -R {owner} "$CERT_DIR"
chmod 0700 "$CERT_DIR"
chmod 0600 "$CERT_DIR/fullchain.pem" "$CERT_DIR/privkey.pem"

# coturn reloads its certificates on SIGUSR2
systemctl kill --signal=SIGUSR2 {SERVICE_NAME}
"#
    )
}

/// Write (or overwrite) the hook at `paths.renewal_hook`, executable.
pub fn install(paths: &SetupPaths, domain: &str) -> Result<(), TlsError> {
    let path = paths.renewal_hook.as_path();
    let io_err = |source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|source| TlsError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    tracing::info!("installing certbot deploy hook: {}", path.display());
    fs::write(path, render(paths, domain)).map_err(io_err)?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(io_err)?;
    Ok(())
}

/// Domain a previously installed hook was generated for, if any.
pub fn installed_domain(hook: &Path) -> Option<String> {
    let content = fs::read_to_string(hook).ok()?;
    content.lines().find_map(|l| {
        l.strip_prefix("# Generated by turn-setup for ")
            .and_then(|rest| rest.split_once(". "))
            .map(|(domain, _)| domain.to_string())
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use nix::unistd::{getegid, geteuid};

    use super::*;

    const DOMAIN: &str = "turn.example.com";

    fn run_hook(hook: &Path, lineage: &Path) {
        // The trailing `systemctl kill` may fail off a real host; the copy
        // happens before it, so only the files are checked.
        let _status = std::process::Command::new("sh")
            .arg(hook)
            .env("RENEWED_LINEAGE", lineage)
            .status()
            .expect("run hook");
    }

    #[test]
    fn hook_targets_generation_domain() {
        let paths = SetupPaths::default();
        let script = render(&paths, DOMAIN);

        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("LINEAGE='/etc/letsencrypt/live/turn.example.com'\n"));
        assert!(script.contains("CERT_DIR='/etc/coturn/certs'\n"));
        assert!(
            script.contains("cp -L \"$LINEAGE/fullchain.pem\" \"$CERT_DIR/fullchain.pem\"\n")
        );
        assert!(script.contains("cp -L \"$LINEAGE/privkey.pem\" \"$CERT_DIR/privkey.pem\"\n"));
        assert!(script.contains("chown -R 'turnserver:turnserver' \"$CERT_DIR\"\n"));
        assert!(script.contains("systemctl kill --signal=SIGUSR2 coturn\n"));
        assert!(script.contains("\"${RENEWED_LINEAGE:-}\""));
    }

    #[test]
    fn rendering_is_deterministic() {
        let paths = SetupPaths::default();
        assert_eq!(
            render(&paths, "a.example.com"),
            render(&paths, "a.example.com")
        );
        assert_ne!(
            render(&paths, "a.example.com"),
            render(&paths, "b.example.com")
        );
    }

    #[test]
    fn quotes_paths_with_single_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn install_overwrites_and_is_executable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = SetupPaths::rooted(dir.path());

        install(&paths, "old.example.com").unwrap();
        assert_eq!(
            installed_domain(&paths.renewal_hook).as_deref(),
            Some("old.example.com")
        );

        install(&paths, "new.example.com").unwrap();
        assert_eq!(
            installed_domain(&paths.renewal_hook).as_deref(),
            Some("new.example.com")
        );
        assert_eq!(
            fs::read_to_string(&paths.renewal_hook).unwrap(),
            render(&paths, "new.example.com")
        );

        let mode = fs::metadata(&paths.renewal_hook)
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[test]
    fn hook_ignores_other_lineages() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = SetupPaths::rooted(dir.path());
        install(&paths, DOMAIN).unwrap();

        run_hook(&paths.renewal_hook, &paths.live_dir("other.example.com"));
        assert!(
            !paths.cert_dir.exists(),
            "hook must not touch certs for other domains"
        );
    }

    #[test]
    fn hook_copies_own_lineage_privately() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = SetupPaths::rooted(dir.path());
        let live = paths.live_dir(DOMAIN);
        fs::create_dir_all(&live).expect("mkdir live");
        fs::write(live.join("fullchain.pem"), "chain\n").expect("write chain");
        fs::write(live.join("privkey.pem"), "key\n").expect("write key");

        let hook = dir.path().join("hook.sh");
        let owner = format!("{}:{}", geteuid(), getegid());
        fs::write(&hook, script(&paths, DOMAIN, &owner)).expect("write hook");

        run_hook(&hook, &live);

        let expected = [(paths.cert_file(), "chain\n"), (paths.key_file(), "key\n")];
        for (copy, body) in expected {
            assert_eq!(fs::read_to_string(&copy).unwrap(), body, "{}", copy.display());
            let mode = fs::metadata(&copy).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600, "{}", copy.display());
        }
        let dir_mode = fs::metadata(&paths.cert_dir)
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }
}
