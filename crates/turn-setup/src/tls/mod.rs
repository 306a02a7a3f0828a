//! Let's Encrypt certificate issuance and TLS wiring for the relay.
//!
//! The relay configuration is only touched once a certificate has been
//! issued and mirrored and the renewal hook is in place. If saving the TLS
//! configuration or restarting on it fails, the plaintext configuration is
//! written back, so an error from [`configure`] always means the relay is
//! still configured without TLS.

pub mod challenge;
mod error;
pub mod hook;

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::cmd::Runner;
use crate::config::{Host, RelaySettings, SERVICE_NAME, SERVICE_USER, SetupPaths};
use crate::net;
use crate::relay::{self, systemd};
use crate::turnconf::TurnConfig;

pub use challenge::{Challenge, ChallengeFailure};
pub use error::TlsError;

/// Web servers commonly holding port 80, stopped to free it for `http-01`.
pub const CONFLICTING_SERVICES: &[&str] = &["nginx", "apache2"];

/// Operator choices for a TLS run.
#[derive(Debug, Clone)]
pub struct TlsOptions {
    pub domain: String,
    pub email: Option<String>,
    /// Continue on an address mismatch without asking.
    pub assume_yes: bool,
    /// Port the `http-01` challenge is answered on.
    pub http_port: u16,
}

impl TlsOptions {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            email: None,
            assume_yes: false,
            http_port: 80,
        }
    }
}

/// Result of a successful TLS run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsOutcome {
    pub challenge: Challenge,
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Obtain a certificate for `opts.domain` and switch the relay's TLS listener on.
pub fn configure(
    host: &Host<'_>,
    opts: &TlsOptions,
    settings: &RelaySettings,
) -> Result<TlsOutcome, TlsError> {
    let domain = opts.domain.as_str();
    // The relay must already be installed; this also validates the file
    // before anything is changed.
    let mut config = TurnConfig::load(&host.paths.turn_config)?;

    free_http_port(host.runner, opts.http_port);
    ensure_certbot(host.runner)?;
    check_addresses(host, opts)?;

    let request = challenge::CertRequest {
        domain,
        email: opts.email.as_deref(),
        http_port: opts.http_port,
    };
    let used = challenge::obtain(host.runner, &request, &Challenge::ORDER)?;

    mirror_certificates(host.runner, host.paths, domain)?;

    if let Some(previous) = hook::installed_domain(&host.paths.renewal_hook)
        && previous != domain
    {
        tracing::warn!("replacing deploy hook generated for {previous}");
    }
    hook::install(host.paths, domain)?;

    let plaintext = config.clone();
    let (cert, key) = (host.paths.cert_file(), host.paths.key_file());
    config.apply_tls(&cert, &key, settings.tls_listening_port)?;
    switch_over(host, &config, &plaintext)?;
    tracing::info!("TLS enabled on port {}", settings.tls_listening_port);

    Ok(TlsOutcome {
        challenge: used,
        cert,
        key,
    })
}

/// Save the TLS configuration and restart the relay on it. When either step
/// fails the plaintext configuration is written back.
fn switch_over(
    host: &Host<'_>,
    with_tls: &TurnConfig,
    plaintext: &TurnConfig,
) -> Result<(), TlsError> {
    if let Err(e) = relay::save_config(host.runner, host.paths, with_tls) {
        restore_plaintext(host, plaintext, &e)?;
        return Err(e.into());
    }
    if let Err(e) = systemd::restart(host.runner) {
        restore_plaintext(host, plaintext, &e)?;
        host.runner.run_best_effort(
            &format!("restarting {SERVICE_NAME} without TLS"),
            "systemctl",
            &["restart", SERVICE_NAME],
        );
        return Err(e.into());
    }
    Ok(())
}

fn restore_plaintext(
    host: &Host<'_>,
    plaintext: &TurnConfig,
    cause: &anyhow::Error,
) -> Result<(), TlsError> {
    tracing::error!("enabling TLS failed, restoring plaintext configuration: {cause:#}");
    relay::save_config(host.runner, host.paths, plaintext)?;
    Ok(())
}

/// Stop well-known web servers when something already listens on `port`.
/// Failures are ignored: the services may simply not be installed.
fn free_http_port(runner: &dyn Runner, port: u16) {
    if !net::port_in_use(port) {
        return;
    }
    tracing::info!("port {port} is busy, stopping common web servers for the challenge");
    for &service in CONFLICTING_SERVICES {
        runner.run_best_effort(
            &format!("stopping {service}"),
            "systemctl",
            &["stop", service],
        );
    }
    if net::port_in_use(port) {
        tracing::warn!("port {port} is still in use; the http-01 challenge will likely fail");
    }
}

fn ensure_certbot(runner: &dyn Runner) -> Result<(), TlsError> {
    if runner.command_exists("certbot") {
        return Ok(());
    }
    runner
        .run(
            "installing certbot",
            "apt-get",
            &["install", "-y", "certbot"],
        )
        .map_err(|e| TlsError::CertbotUnavailable(format!("{e:#}")))?;
    Ok(())
}

/// Compare this host's public address with what the domain resolves to.
/// On a mismatch the operator decides whether to continue.
fn check_addresses(host: &Host<'_>, opts: &TlsOptions) -> Result<(), TlsError> {
    let domain = opts.domain.as_str();
    let public = match net::public_ip(host.runner) {
        Ok(ip) => Some(ip),
        Err(e) => {
            tracing::warn!("{e:#}");
            None
        }
    };
    let resolved = host.resolver.resolve(domain);

    if public.is_some_and(|ip| resolved.contains(&ip)) {
        tracing::info!("{domain} points at this host");
        return Ok(());
    }

    let mismatch = TlsError::AddressMismatch {
        domain: domain.to_string(),
        public,
        resolved,
    };
    tracing::warn!("address check failed: {domain} may not point at this host");

    if opts.assume_yes {
        tracing::warn!("continuing despite address mismatch (--yes)");
        return Ok(());
    }
    let proceed = host.prompter.confirm(
        "The domain does not appear to point at this server. Request a certificate anyway?",
        false,
    )?;
    if proceed { Ok(()) } else { Err(mismatch) }
}

/// Copy the issued certificate pair into the relay's own directory,
/// readable only by the service account.
fn mirror_certificates(
    runner: &dyn Runner,
    paths: &SetupPaths,
    domain: &str,
) -> Result<(), TlsError> {
    let live = paths.live_dir(domain);
    let pairs = [
        (live.join("fullchain.pem"), paths.cert_file()),
        (live.join("privkey.pem"), paths.key_file()),
    ];
    if let Some((missing, _)) = pairs.iter().find(|(src, _)| !src.exists()) {
        return Err(TlsError::MissingCertificate(missing.clone()));
    }

    create_private_dir(&paths.cert_dir)?;
    for (src, dest) in &pairs {
        tracing::info!("copying {} -> {}", src.display(), dest.display());
        fs::copy(src, dest).map_err(|source| TlsError::Io {
            path: dest.clone(),
            source,
        })?;
        set_mode(dest, 0o600)?;
    }

    runner.run(
        "setting ownership on relay certificates",
        "chown",
        &[
            "-R",
            &format!("{SERVICE_USER}:{SERVICE_USER}"),
            &paths.cert_dir.to_string_lossy(),
        ],
    )?;
    Ok(())
}

fn create_private_dir(dir: &Path) -> Result<(), TlsError> {
    fs::create_dir_all(dir).map_err(|source| TlsError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    set_mode(dir, 0o700)
}

fn set_mode(path: &Path, mode: u32) -> Result<(), TlsError> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    })
}
