use anyhow::{Context, Result};
use clap::Args;

use crate::config::{DEFAULT_SWAP_GIB, Host, RelaySettings};
use crate::credentials::{self, PASSWORD_ENV};
use crate::domain::{self, DomainCheck};
use crate::report::{self, Summary};
use crate::tls::{self, TlsOptions};
use crate::turnconf::TurnConfig;
use crate::{relay, swap};

/// Arguments for the `install` subcommand.
#[derive(Debug, Default, Args)]
pub struct InstallArgs {
    /// Domain name of the relay (e.g. turn.example.com)
    #[arg(long)]
    pub domain: Option<String>,

    /// Relay username
    #[arg(long)]
    pub username: Option<String>,

    /// Relay password. Prefer the environment variable over the flag.
    #[arg(long, env = PASSWORD_ENV, hide = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Request a Let's Encrypt certificate and enable TLS
    #[arg(long, conflicts_with = "no_tls")]
    pub tls: bool,

    /// Skip TLS configuration
    #[arg(long, conflicts_with = "tls")]
    pub no_tls: bool,

    /// Email address for Let's Encrypt expiry notices
    #[arg(long)]
    pub email: Option<String>,

    /// Continue when the domain does not resolve (non-interactive mode)
    #[arg(long)]
    pub allow_unresolved: bool,

    /// Do not touch swap
    #[arg(long)]
    pub no_swap: bool,

    /// Swap file size in GiB
    #[arg(long, default_value_t = DEFAULT_SWAP_GIB)]
    pub swap_size_gib: u64,
}

/// Run the full installation: swap, domain, credentials, relay, optional TLS, summary.
pub fn run(host: &Host<'_>, args: InstallArgs, non_interactive: bool) -> Result<()> {
    let settings = RelaySettings::default();

    if args.no_swap {
        tracing::info!("skipping swap provisioning (--no-swap)");
    } else if let Err(e) = swap::provision(
        host.runner,
        &host.paths.swap_file,
        &host.paths.fstab,
        args.swap_size_gib,
    ) {
        // The relay runs fine without swap (e.g. in containers), so keep going.
        tracing::warn!("swap provisioning failed: {e:#}");
    }

    let check = domain::collect(
        host.prompter,
        host.resolver,
        args.domain,
        non_interactive,
        args.allow_unresolved,
    )?;
    let domain = check.domain().to_string();

    let creds = credentials::collect(
        host.prompter,
        args.username,
        args.password,
        non_interactive,
    )?;

    tracing::info!("installing relay for {domain}");
    relay::install(host.runner, host.paths, &domain, &creds, &settings)?;

    let want_tls = if args.tls {
        true
    } else if args.no_tls {
        false
    } else {
        let verified = matches!(check, DomainCheck::Verified { .. });
        host.prompter.confirm(
            "Enable TLS (turns:) with a Let's Encrypt certificate?",
            verified,
        )?
    };

    if want_tls {
        let opts = TlsOptions {
            email: args.email,
            ..TlsOptions::new(domain.clone())
        };
        match tls::configure(host, &opts, &settings) {
            Ok(outcome) => tracing::info!(
                "TLS configured ({} challenge), certificate at {}",
                outcome.challenge,
                outcome.cert.display()
            ),
            Err(e) => {
                tracing::error!("TLS configuration failed: {e}");
                report::print_tls_recovery(&domain, host.paths, settings.tls_listening_port);
            }
        }
    }

    let config = TurnConfig::load(&host.paths.turn_config)?;
    let mut summary = Summary::from_config(&config, &host.paths.turn_config)
        .context("failed to summarize relay configuration")?;
    if creds.generated {
        summary.generated_password = Some(creds.password.clone());
    }

    report::print_status(host.runner);
    report::print_summary(&summary, false)
}
