use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cmd::Runner;
use crate::config::{SERVICE_NAME, SetupPaths};
use crate::turnconf::TurnConfig;

/// What the operator needs to point clients at the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub domain: String,
    pub username: Option<String>,
    /// Only present when the password was generated during this run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_password: Option<String>,
    pub listening_port: u16,
    pub relay_ports: String,
    pub tls_port: Option<u16>,
    pub config_path: PathBuf,
    pub uris: Vec<String>,
}

impl Summary {
    /// Derive the summary from an installed relay configuration.
    pub fn from_config(config: &TurnConfig, config_path: &Path) -> Result<Self> {
        let domain = config
            .realm()
            .context("relay configuration has no realm")?
            .to_string();
        let listening_port = port(config, "listening-port")?.unwrap_or(3478);
        let tls_port = if config.has_tls() {
            port(config, "tls-listening-port")?
        } else {
            None
        };
        let relay_ports = format!(
            "{}-{}",
            config.get("min-port").unwrap_or("49152"),
            config.get("max-port").unwrap_or("65535")
        );

        let mut uris = vec![
            format!("stun:{domain}:{listening_port}"),
            format!("turn:{domain}:{listening_port}?transport=udp"),
            format!("turn:{domain}:{listening_port}?transport=tcp"),
        ];
        if let Some(tls) = tls_port {
            uris.push(format!("turns:{domain}:{tls}?transport=tcp"));
        }

        Ok(Self {
            domain,
            username: config.username().map(str::to_string),
            generated_password: None,
            listening_port,
            relay_ports,
            tls_port,
            config_path: config_path.to_path_buf(),
            uris,
        })
    }

    /// Human-readable rendering.
    pub fn render(&self) -> String {
        let mut lines = vec![
            String::new(),
            "TURN relay setup complete".to_string(),
            String::new(),
            format!("  Domain:        {}", self.domain),
            format!(
                "  Username:      {}",
                self.username.as_deref().unwrap_or("(none)")
            ),
        ];
        if let Some(password) = &self.generated_password {
            lines.push(format!("  Password:      {password}  (generated, store it now)"));
        }
        lines.push(format!("  Listening:     {} (udp/tcp)", self.listening_port));
        lines.push(format!("  Relay ports:   {}", self.relay_ports));
        lines.push(match self.tls_port {
            Some(port) => format!("  TLS:           enabled on {port}"),
            None => "  TLS:           disabled".to_string(),
        });
        lines.push(format!("  Configuration: {}", self.config_path.display()));
        lines.push(String::new());
        lines.push("  Client URIs:".to_string());
        for uri in &self.uris {
            lines.push(format!("    {uri}"));
        }
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

fn port(config: &TurnConfig, key: &str) -> Result<Option<u16>> {
    config
        .get(key)
        .map(|v| v.parse::<u16>().with_context(|| format!("{key}={v} is not a port")))
        .transpose()
}

/// Print the relay unit status as systemd reports it.
pub fn print_status(runner: &dyn Runner) {
    match runner.exec("systemctl", &["status", SERVICE_NAME, "--no-pager"]) {
        Ok(output) => {
            #[allow(clippy::print_stdout)]
            {
                println!("{}", output.stdout.trim_end());
            }
            if !output.success() {
                tracing::warn!(
                    "{SERVICE_NAME} is not running cleanly; check: journalctl -u {SERVICE_NAME}"
                );
            }
        }
        Err(e) => tracing::warn!("could not query {SERVICE_NAME} status: {e:#}"),
    }
}

/// Print the summary, as text or as pretty JSON.
pub fn print_summary(summary: &Summary, json: bool) -> Result<()> {
    let out = if json {
        serde_json::to_string_pretty(summary).context("failed to serialize summary")?
    } else {
        summary.render()
    };
    #[allow(clippy::print_stdout)]
    {
        println!("{out}");
    }
    Ok(())
}

/// Steps to finish TLS by hand after an automated attempt failed.
pub fn tls_recovery(domain: &str, paths: &SetupPaths, tls_port: u16) -> String {
    let live = paths.live_dir(domain);
    format!(
        r"
TLS was not configured. The relay keeps running without TLS.
To finish by hand:

  1. Free port 80 (e.g. systemctl stop nginx apache2), open it in the
     firewall and make sure {domain} points at this server. certbot's
     standalone mode cannot use the tls-alpn-01 fallback, so http-01 on
     port 80 is the only challenge that works.
  2. sudo certbot certonly --standalone -d {domain}
  3. sudo install -d -m 0700 -o turnserver -g turnserver {cert_dir}
     sudo install -m 0600 -o turnserver -g turnserver \
       {live}/fullchain.pem {live}/privkey.pem {cert_dir}/
  4. Add to {config}:
       cert={cert}
       pkey={key}
       tls-listening-port={tls_port}
  5. sudo systemctl restart {SERVICE_NAME}

Or re-run: sudo turn-setup tls --domain {domain}
",
        cert_dir = paths.cert_dir.display(),
        live = live.display(),
        config = paths.turn_config.display(),
        cert = paths.cert_file().display(),
        key = paths.key_file().display(),
    )
}

/// Print [`tls_recovery`] instructions.
pub fn print_tls_recovery(domain: &str, paths: &SetupPaths, tls_port: u16) {
    #[allow(clippy::print_stdout)]
    {
        println!("{}", tls_recovery(domain, paths, tls_port));
    }
}
