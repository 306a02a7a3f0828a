use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use turn_setup::cmd::SystemRunner;
use turn_setup::commands::{StatusArgs, SwapArgs, TlsArgs};
use turn_setup::config::{Host, SetupPaths};
use turn_setup::install::InstallArgs;
use turn_setup::net::SystemResolver;
use turn_setup::prompt::{Prompter, Terminal, Unattended};
use turn_setup::{commands, escalate, install, os};

/// TURN/STUN relay (coturn) installer.
#[derive(Debug, Parser)]
#[command(name = "turn-setup", version, about)]
struct Cli {
    /// Run without interactive prompts (use defaults, flags or environment)
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Install and configure the relay
    Install(InstallArgs),
    /// Obtain a Let's Encrypt certificate and enable TLS
    Tls(TlsArgs),
    /// Recreate the swap file
    Swap(SwapArgs),
    /// Show service status and client connection details
    Status(StatusArgs),
}

fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let paths = SetupPaths::default();
    let runner = SystemRunner;
    let resolver = SystemResolver;
    let prompter: &dyn Prompter = if cli.non_interactive {
        &Unattended
    } else {
        &Terminal
    };
    let host = Host {
        runner: &runner,
        prompter,
        resolver: &resolver,
        paths: &paths,
    };

    match cli.command {
        Commands::Install(args) => {
            escalate::ensure_root(prompter, cli.non_interactive)?;
            os::ensure_supported(&paths.os_release)?;
            install::run(&host, args, cli.non_interactive)?;
        }
        Commands::Tls(args) => {
            escalate::ensure_root(prompter, cli.non_interactive)?;
            os::ensure_supported(&paths.os_release)?;
            commands::run_tls(&host, args)?;
        }
        Commands::Swap(ref args) => {
            escalate::ensure_root(prompter, cli.non_interactive)?;
            commands::run_swap(&host, args)?;
        }
        Commands::Status(ref args) => commands::run_status(&host, args)?,
    }

    Ok(())
}
