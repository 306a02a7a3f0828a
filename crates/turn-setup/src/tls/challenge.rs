use std::fmt;

use crate::cmd::Runner;

use super::TlsError;

/// ACME challenge types, in the order they are attempted.
///
/// Stock certbot's `--standalone` authenticator only answers `http-01`. The
/// `tls-alpn-01` attempt is kept as the fallback but fails unless the
/// installed certbot provides that challenge, so in practice port 80 has to
/// be reachable from the internet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Challenge {
    /// Plain HTTP on port 80.
    Http01,
    /// ALPN on the TLS port. Not supported by stock certbot standalone.
    TlsAlpn01,
}

impl Challenge {
    /// Strategies tried by [`obtain`] when issuing a certificate.
    pub const ORDER: [Self; 2] = [Self::Http01, Self::TlsAlpn01];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Http01 => "http-01",
            Self::TlsAlpn01 => "tls-alpn-01",
        }
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One failed issuance attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeFailure {
    pub challenge: Challenge,
    pub reason: String,
}

/// What to ask certbot for.
#[derive(Debug, Clone, Copy)]
pub struct CertRequest<'a> {
    pub domain: &'a str,
    pub email: Option<&'a str>,
    /// Port certbot's standalone server answers `http-01` on.
    pub http_port: u16,
}

/// certbot arguments for issuing `req` with `challenge`.
pub fn certbot_args(req: &CertRequest<'_>, challenge: Challenge) -> Vec<String> {
    let mut args: Vec<String> = [
        "certonly",
        "--standalone",
        "--non-interactive",
        "--agree-tos",
        "--keep-until-expiring",
        "--preferred-challenges",
        challenge.name(),
        "-d",
        req.domain,
    ]
    .iter()
    .map(ToString::to_string)
    .collect();

    if challenge == Challenge::Http01 && req.http_port != 80 {
        args.push("--http-01-port".into());
        args.push(req.http_port.to_string());
    }

    match req.email {
        Some(email) => {
            args.push("--email".into());
            args.push(email.to_string());
        }
        None => args.push("--register-unsafely-without-email".into()),
    }
    args
}

/// Try each strategy in order until certbot succeeds.
///
/// Returns the challenge that worked, or every failure at once.
pub fn obtain(
    runner: &dyn Runner,
    req: &CertRequest<'_>,
    strategies: &[Challenge],
) -> Result<Challenge, TlsError> {
    let mut attempts = Vec::new();
    for &challenge in strategies {
        let args = certbot_args(req, challenge);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let description = format!(
            "obtaining TLS certificate for {} ({challenge} challenge)",
            req.domain
        );
        match runner.run(&description, "certbot", &args) {
            Ok(_) => {
                tracing::info!("certificate issued for {} via {challenge}", req.domain);
                return Ok(challenge);
            }
            Err(e) => {
                tracing::warn!("{challenge} challenge failed, trying next strategy");
                attempts.push(ChallengeFailure {
                    challenge,
                    reason: format!("{e:#}"),
                });
            }
        }
    }
    Err(TlsError::IssuanceFailed {
        domain: req.domain.to_string(),
        attempts,
    })
}
