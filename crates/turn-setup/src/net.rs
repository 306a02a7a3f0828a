use std::net::{IpAddr, SocketAddr, TcpListener, ToSocketAddrs};

use anyhow::{Result, bail};

use crate::cmd::Runner;

/// Endpoints answering a plain-text body with the caller's public address.
/// Tried in order; the first parseable answer wins.
pub const PUBLIC_IP_ENDPOINTS: &[&str] = &[
    "https://api.ipify.org",
    "https://ifconfig.me/ip",
    "https://icanhazip.com",
];

/// Hostname resolution.
pub trait Resolve {
    /// Addresses `host` resolves to. Empty when resolution fails.
    fn resolve(&self, host: &str) -> Vec<IpAddr>;
}

/// Resolves through the system resolver (`/etc/hosts`, `resolv.conf`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolve for SystemResolver {
    fn resolve(&self, host: &str) -> Vec<IpAddr> {
        match (host, 0).to_socket_addrs() {
            Ok(addrs) => {
                let mut ips: Vec<IpAddr> = addrs.map(|a| a.ip()).collect();
                ips.sort_unstable();
                ips.dedup();
                ips
            }
            Err(e) => {
                tracing::debug!("DNS resolution failed for {host}: {e}");
                Vec::new()
            }
        }
    }
}

/// Look up this host's public address through [`PUBLIC_IP_ENDPOINTS`].
pub fn public_ip(runner: &dyn Runner) -> Result<IpAddr> {
    for endpoint in PUBLIC_IP_ENDPOINTS {
        match runner.capture("curl", &["-fsS", "--max-time", "10", endpoint]) {
            Ok(body) => match body.trim().parse::<IpAddr>() {
                Ok(ip) => {
                    tracing::debug!("public address {ip} (via {endpoint})");
                    return Ok(ip);
                }
                Err(_) => tracing::debug!("{endpoint} returned a non-address body: {body}"),
            },
            Err(e) => tracing::debug!("public address lookup via {endpoint} failed: {e:#}"),
        }
    }
    bail!("could not determine the public address of this host")
}

/// Whether something is already listening on `port` on all interfaces.
pub fn port_in_use(port: u16) -> bool {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    match TcpListener::bind(addr) {
        Ok(_listener) => {
            tracing::debug!("port {port} is available");
            false
        }
        Err(e) => {
            tracing::debug!("port {port} is busy: {e}");
            true
        }
    }
}
