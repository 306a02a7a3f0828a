use std::path::{Path, PathBuf};

use crate::cmd::Runner;
use crate::net::Resolve;
use crate::prompt::Prompter;

/// systemd unit installed by the coturn package.
pub const SERVICE_NAME: &str = "coturn";

/// Account the coturn package runs the relay as.
pub const SERVICE_USER: &str = "turnserver";

/// Packages installed alongside the relay: DNS and HTTP helpers plus `setcap`.
pub const PACKAGES: &[&str] = &["coturn", "dnsutils", "curl", "libcap2-bin"];

/// Default swap file size in GiB.
pub const DEFAULT_SWAP_GIB: u64 = 16;

/// Every host location the installer reads or writes.
///
/// The default points at the real system files. [`SetupPaths::rooted`]
/// re-bases all of them under a directory so the components can be
/// exercised without root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupPaths {
    pub turn_config: PathBuf,
    pub turn_defaults: PathBuf,
    pub turnserver_binary: PathBuf,
    pub sysctl_conf: PathBuf,
    pub limits_conf: PathBuf,
    pub journald_dropin: PathBuf,
    pub fstab: PathBuf,
    pub swap_file: PathBuf,
    pub cert_dir: PathBuf,
    pub letsencrypt_live: PathBuf,
    pub renewal_hook: PathBuf,
    pub os_release: PathBuf,
}

impl Default for SetupPaths {
    fn default() -> Self {
        Self {
            turn_config: "/etc/turnserver.conf".into(),
            turn_defaults: "/etc/default/coturn".into(),
            turnserver_binary: "/usr/bin/turnserver".into(),
            sysctl_conf: "/etc/sysctl.conf".into(),
            limits_conf: "/etc/security/limits.conf".into(),
            journald_dropin: "/etc/systemd/journald.conf.d/coturn.conf".into(),
            fstab: "/etc/fstab".into(),
            swap_file: "/swapfile".into(),
            cert_dir: "/etc/coturn/certs".into(),
            letsencrypt_live: "/etc/letsencrypt/live".into(),
            renewal_hook: "/etc/letsencrypt/renewal-hooks/deploy/coturn-certs.sh".into(),
            os_release: "/etc/os-release".into(),
        }
    }
}

impl SetupPaths {
    /// Default layout re-based under `root`.
    pub fn rooted(root: &Path) -> Self {
        let rebase = |p: PathBuf| root.join(p.strip_prefix("/").unwrap_or(p.as_path()));
        let d = Self::default();
        Self {
            turn_config: rebase(d.turn_config),
            turn_defaults: rebase(d.turn_defaults),
            turnserver_binary: rebase(d.turnserver_binary),
            sysctl_conf: rebase(d.sysctl_conf),
            limits_conf: rebase(d.limits_conf),
            journald_dropin: rebase(d.journald_dropin),
            fstab: rebase(d.fstab),
            swap_file: rebase(d.swap_file),
            cert_dir: rebase(d.cert_dir),
            letsencrypt_live: rebase(d.letsencrypt_live),
            renewal_hook: rebase(d.renewal_hook),
            os_release: rebase(d.os_release),
        }
    }

    /// Let's Encrypt lineage directory for `domain`.
    pub fn live_dir(&self, domain: &str) -> PathBuf {
        self.letsencrypt_live.join(domain)
    }

    /// Mirrored certificate chain used by the relay.
    pub fn cert_file(&self) -> PathBuf {
        self.cert_dir.join("fullchain.pem")
    }

    /// Mirrored private key used by the relay.
    pub fn key_file(&self) -> PathBuf {
        self.cert_dir.join("privkey.pem")
    }
}

/// Relay tunables written into the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySettings {
    pub listening_port: u16,
    pub min_port: u16,
    pub max_port: u16,
    /// Seconds before a nonce is considered stale.
    pub stale_nonce: u32,
    pub tls_listening_port: u16,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            listening_port: 3478,
            min_port: 49152,
            max_port: 65535,
            stale_nonce: 600,
            tls_listening_port: 443,
        }
    }
}

/// Handles to the host: process execution, operator prompts, DNS and file locations.
pub struct Host<'a> {
    pub runner: &'a dyn Runner,
    pub prompter: &'a dyn Prompter,
    pub resolver: &'a dyn Resolve,
    pub paths: &'a SetupPaths,
}
