use std::fmt::Write as _;
use std::net::IpAddr;
use std::path::PathBuf;

use thiserror::Error;

use super::challenge::ChallengeFailure;
use crate::turnconf::ConfigError;

/// Why TLS configuration stopped. Any of these leaves the plaintext relay
/// as it was.
#[derive(Debug, Error)]
pub enum TlsError {
    /// The domain does not point at this host and the operator chose not to continue.
    #[error(
        "{domain} resolves to [{}] but this host is {}; aborted at operator request",
        join_ips(.resolved),
        host_label(.public)
    )]
    AddressMismatch {
        domain: String,
        public: Option<IpAddr>,
        resolved: Vec<IpAddr>,
    },

    #[error("certbot is not available: {0}")]
    CertbotUnavailable(String),

    #[error("certificate issuance for {domain} failed: {}", summarize(.attempts))]
    IssuanceFailed {
        domain: String,
        attempts: Vec<ChallengeFailure>,
    },

    #[error("certificate material missing at {0}")]
    MissingCertificate(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Host(#[from] anyhow::Error),
}

fn join_ips(ips: &[IpAddr]) -> String {
    ips.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn host_label(public: &Option<IpAddr>) -> String {
    public.map_or_else(|| "unknown".to_string(), |ip| ip.to_string())
}

fn summarize(attempts: &[ChallengeFailure]) -> String {
    if attempts.is_empty() {
        return "no challenge was attempted".to_string();
    }
    let mut out = String::new();
    for (i, a) in attempts.iter().enumerate() {
        if i > 0 {
            out.push_str("; ");
        }
        let _ = write!(out, "{}: {}", a.challenge, a.reason);
    }
    out
}
