use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};

/// Parse an `os-release` file into key-value pairs.
fn parse_os_release(content: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim_matches('"');
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}

/// Whether the release describes an apt-based distribution coturn is packaged for.
fn is_debian_family(release: &HashMap<String, String>) -> bool {
    let id = release.get("ID").map_or("", String::as_str);
    let id_like = release.get("ID_LIKE").map_or("", String::as_str);
    std::iter::once(id)
        .chain(id_like.split_whitespace())
        .any(|name| name == "debian" || name == "ubuntu")
}

/// Ensure the host runs Debian, Ubuntu or a derivative. Bails with a clear message otherwise.
pub fn ensure_supported(os_release: &Path) -> Result<()> {
    let content = fs::read_to_string(os_release)
        .with_context(|| format!("failed to read {}", os_release.display()))?;
    let release = parse_os_release(&content);

    let id = release.get("ID").map_or("unknown", String::as_str);
    if !is_debian_family(&release) {
        bail!(
            "turn-setup only supports Debian-based distributions (detected OS: {id}). \
             The relay is installed with apt-get."
        );
    }
    let version = release.get("VERSION_ID").map_or("unknown", String::as_str);
    tracing::info!("detected {id} ({version})");
    Ok(())
}
