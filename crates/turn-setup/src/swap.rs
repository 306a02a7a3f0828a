//! Swap file provisioning.
//!
//! The swap file is recreated on every run; the fstab entry is kept unique.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::cmd::Runner;
use crate::files::{read_or_empty, write_atomic};

/// Recreate the swap file at `swap_file` with `size_gib` GiB, enable it and
/// register it in `fstab`.
pub fn provision(runner: &dyn Runner, swap_file: &Path, fstab: &Path, size_gib: u64) -> Result<()> {
    if size_gib == 0 {
        bail!("swap size must be at least 1 GiB");
    }
    let path = swap_file.to_string_lossy();

    if swap_file.exists() {
        tracing::info!("existing swap file found at {path}, recreating it");
        runner.run_best_effort("disabling existing swap file", "swapoff", &[&path]);
        fs::remove_file(swap_file).with_context(|| format!("failed to remove {path}"))?;
    }

    allocate(runner, &path, size_gib)?;

    fs::set_permissions(swap_file, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("failed to set permissions on {path}"))?;

    runner.run("formatting swap file", "mkswap", &[&path])?;
    runner.run("enabling swap file", "swapon", &[&path])?;

    ensure_fstab_entry(fstab, swap_file)?;
    tracing::info!("{size_gib} GiB swap enabled at {path}");
    Ok(())
}

/// Allocate the file with `fallocate`, falling back to `dd` on filesystems
/// that do not support it.
fn allocate(runner: &dyn Runner, path: &str, size_gib: u64) -> Result<()> {
    let size = format!("{size_gib}G");
    let description = format!("allocating {size_gib} GiB swap file");
    if runner.run(&description, "fallocate", &["-l", &size, path]).is_ok() {
        return Ok(());
    }

    tracing::warn!("fallocate failed, falling back to dd (this is slower)");
    let of = format!("of={path}");
    let count = format!("count={}", size_gib * 1024);
    runner.run(&description, "dd", &["if=/dev/zero", &of, "bs=1M", &count])?;
    Ok(())
}

/// fstab line mounting `swap_file` as swap.
pub fn fstab_entry(swap_file: &Path) -> String {
    format!("{} none swap sw 0 0", swap_file.display())
}

/// Make `fstab` hold exactly one entry for `swap_file`.
/// Returns whether the file changed.
pub fn ensure_fstab_entry(fstab: &Path, swap_file: &Path) -> Result<bool> {
    let content = read_or_empty(fstab)?;
    let target = swap_file.to_string_lossy();

    let mut seen = false;
    let mut lines = Vec::new();
    for line in content.lines() {
        if mounts(line, &target) {
            if seen {
                tracing::info!("dropping duplicate fstab entry: {line}");
                continue;
            }
            seen = true;
        }
        lines.push(line.to_string());
    }
    if !seen {
        lines.push(fstab_entry(swap_file));
    }

    let mut new_content = lines.join("\n");
    new_content.push('\n');
    if new_content == content {
        tracing::debug!("fstab already has a single entry for {target}");
        return Ok(false);
    }

    tracing::info!("updating {} for {target}", fstab.display());
    write_atomic(fstab, &new_content, 0o644)?;
    Ok(true)
}

/// Whether an uncommented fstab line has `device` as its first field.
fn mounts(line: &str, device: &str) -> bool {
    let trimmed = line.trim_start();
    !trimmed.starts_with('#') && trimmed.split_whitespace().next() == Some(device)
}
