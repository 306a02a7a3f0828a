use std::net::IpAddr;

use anyhow::{Result, bail};

use crate::net::Resolve;
use crate::prompt::Prompter;

/// Outcome of the domain collection loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainCheck {
    /// The domain resolved to at least one address.
    Verified {
        domain: String,
        addresses: Vec<IpAddr>,
    },
    /// The operator chose to continue with a domain that does not resolve.
    Unverified { domain: String },
}

impl DomainCheck {
    pub fn domain(&self) -> &str {
        match self {
            Self::Verified { domain, .. } | Self::Unverified { domain } => domain,
        }
    }
}

/// Check that `domain` is a syntactically valid DNS hostname.
pub fn validate_domain(domain: &str) -> Result<()> {
    if domain.is_empty() {
        bail!("domain must not be empty");
    }
    if domain.len() > 253 {
        bail!("domain is longer than 253 characters");
    }
    for label in domain.split('.') {
        if label.is_empty() || label.len() > 63 {
            bail!("invalid domain label {label:?} in {domain}");
        }
        if label.starts_with('-') || label.ends_with('-') {
            bail!("domain label {label:?} may not start or end with '-'");
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            bail!("domain label {label:?} contains characters other than letters, digits and '-'");
        }
    }
    Ok(())
}

/// Collect the relay domain and confirm it resolves.
///
/// Interactively this loops until the domain resolves or the operator opts
/// to continue without it; malformed input is rejected before any lookup.
/// Unattended, the preset is resolved once and an unresolved domain is only
/// accepted with `allow_unresolved`.
pub fn collect(
    prompter: &dyn Prompter,
    resolver: &dyn Resolve,
    preset: Option<String>,
    non_interactive: bool,
    allow_unresolved: bool,
) -> Result<DomainCheck> {
    if non_interactive {
        let Some(domain) = preset else {
            bail!("--domain is required in non-interactive mode");
        };
        let domain = domain.to_ascii_lowercase();
        validate_domain(&domain)?;
        let addresses = resolver.resolve(&domain);
        if !addresses.is_empty() {
            tracing::info!("{domain} resolves to {}", join_ips(&addresses));
            return Ok(DomainCheck::Verified { domain, addresses });
        }
        if allow_unresolved {
            tracing::warn!("{domain} does not resolve, continuing (--allow-unresolved)");
            return Ok(DomainCheck::Unverified { domain });
        }
        bail!("{domain} does not resolve; fix DNS or pass --allow-unresolved");
    }

    let mut next = preset;
    loop {
        let raw = match next.take() {
            Some(d) => d,
            None => prompter.input("Domain name for the relay (e.g. turn.example.com)", None)?,
        };
        let domain = raw.trim().to_ascii_lowercase();
        if let Err(e) = validate_domain(&domain) {
            tracing::warn!("{e}");
            continue;
        }

        let addresses = resolver.resolve(&domain);
        if !addresses.is_empty() {
            tracing::info!("{domain} resolves to {}", join_ips(&addresses));
            return Ok(DomainCheck::Verified { domain, addresses });
        }

        tracing::warn!("{domain} does not resolve to any address");
        if !prompter.confirm("Domain did not resolve. Try a different domain?", true)? {
            tracing::warn!("continuing with unverified domain {domain}");
            return Ok(DomainCheck::Unverified { domain });
        }
    }
}

fn join_ips(ips: &[IpAddr]) -> String {
    ips.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
