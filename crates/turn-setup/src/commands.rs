//! Standalone subcommands that re-run one stage of the installation.

use anyhow::{Context, Result};
use clap::Args;

use crate::config::{DEFAULT_SWAP_GIB, Host, RelaySettings};
use crate::domain::validate_domain;
use crate::report::{self, Summary};
use crate::swap;
use crate::tls::{self, TlsOptions};
use crate::turnconf::TurnConfig;

/// Arguments for the `tls` subcommand.
#[derive(Debug, Default, Args)]
pub struct TlsArgs {
    /// Domain to request the certificate for [default: realm of the relay config]
    #[arg(long)]
    pub domain: Option<String>,

    /// Email address for Let's Encrypt expiry notices
    #[arg(long)]
    pub email: Option<String>,

    /// Continue when the domain does not point at this host
    #[arg(long, short = 'y')]
    pub yes: bool,
}

/// Arguments for the `swap` subcommand.
#[derive(Debug, Args)]
pub struct SwapArgs {
    /// Swap file size in GiB
    #[arg(long, default_value_t = DEFAULT_SWAP_GIB)]
    pub size_gib: u64,
}

/// Arguments for the `status` subcommand.
#[derive(Debug, Default, Args)]
pub struct StatusArgs {
    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

/// Obtain a certificate and enable TLS on an existing installation.
pub fn run_tls(host: &Host<'_>, args: TlsArgs) -> Result<()> {
    let settings = RelaySettings::default();
    let config = TurnConfig::load(&host.paths.turn_config)
        .context("the relay is not installed yet; run `turn-setup install` first")?;

    let domain = match args.domain {
        Some(d) => d.trim().to_ascii_lowercase(),
        None => config
            .realm()
            .context("relay configuration has no realm; pass --domain")?
            .to_string(),
    };
    validate_domain(&domain)?;

    let opts = TlsOptions {
        email: args.email,
        assume_yes: args.yes,
        ..TlsOptions::new(domain.clone())
    };
    match tls::configure(host, &opts, &settings) {
        Ok(outcome) => {
            tracing::info!("certificate obtained via {} challenge", outcome.challenge);
            let config = TurnConfig::load(&host.paths.turn_config)?;
            let summary = Summary::from_config(&config, &host.paths.turn_config)?;
            report::print_summary(&summary, false)
        }
        Err(e) => {
            report::print_tls_recovery(&domain, host.paths, settings.tls_listening_port);
            Err(e).context("TLS configuration failed")
        }
    }
}

/// Recreate the swap file on its own.
pub fn run_swap(host: &Host<'_>, args: &SwapArgs) -> Result<()> {
    swap::provision(
        host.runner,
        &host.paths.swap_file,
        &host.paths.fstab,
        args.size_gib,
    )
}

/// Print the service status and the client-facing summary.
pub fn run_status(host: &Host<'_>, args: &StatusArgs) -> Result<()> {
    let config = TurnConfig::load(&host.paths.turn_config)?;
    let summary = Summary::from_config(&config, &host.paths.turn_config)?;
    if !args.json {
        report::print_status(host.runner);
    }
    report::print_summary(&summary, args.json)
}
