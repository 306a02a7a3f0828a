//! Idempotent edits of line-oriented system files.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::{Context, Result};

/// Read a file, treating a missing file as empty.
pub fn read_or_empty(path: &Path) -> Result<String> {
    if !path.exists() {
        return Ok(String::new());
    }
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Replace `path` with `content` through a temp file and rename, so a reader
/// sees either the old or the new file, never a truncated one.
pub fn write_atomic(path: &Path, content: &str, mode: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    fs::write(&tmp, content).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::set_permissions(&tmp, fs::Permissions::from_mode(mode))
        .with_context(|| format!("failed to set permissions on {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to move {} into place", path.display()))?;
    Ok(())
}

fn with_trailing_newline(mut content: String) -> String {
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content
}

/// Append `line` to `path` unless an identical line is already present.
/// Returns whether the file changed.
pub fn ensure_line(path: &Path, line: &str) -> Result<bool> {
    let content = read_or_empty(path)?;
    if content.lines().any(|l| l.trim() == line.trim()) {
        tracing::debug!("{} already contains '{line}'", path.display());
        return Ok(false);
    }

    tracing::info!("appending '{line}' to {}", path.display());
    let mut new_content = with_trailing_newline(content);
    new_content.push_str(line);
    new_content.push('\n');

    let mode = current_mode(path).unwrap_or(0o644);
    write_atomic(path, &new_content, mode)?;
    Ok(true)
}

/// Set `key` to `value` so the file holds exactly one uncommented
/// `key<sep>value` line. The first existing occurrence keeps its position,
/// later duplicates are dropped; otherwise the line is appended.
/// Returns whether the file changed.
pub fn upsert_key(path: &Path, key: &str, sep: &str, value: &str) -> Result<bool> {
    let content = read_or_empty(path)?;
    let wanted = format!("{key}{sep}{value}");

    let mut replaced = false;
    let mut lines = Vec::new();
    for line in content.lines() {
        if line_sets_key(line, key) {
            if !replaced {
                lines.push(wanted.clone());
                replaced = true;
            }
            continue;
        }
        lines.push(line.to_string());
    }
    if !replaced {
        lines.push(wanted);
    }

    let mut new_content = lines.join("\n");
    new_content.push('\n');
    if new_content == content {
        tracing::debug!("{} already sets {key}", path.display());
        return Ok(false);
    }

    tracing::info!("setting {key} in {}", path.display());
    let mode = current_mode(path).unwrap_or(0o644);
    write_atomic(path, &new_content, mode)?;
    Ok(true)
}

/// Whether an uncommented line assigns `key` (`key=…`, `key = …`).
fn line_sets_key(line: &str, key: &str) -> bool {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return false;
    }
    trimmed
        .strip_prefix(key)
        .is_some_and(|rest| rest.trim_start().starts_with('='))
}

fn current_mode(path: &Path) -> Option<u32> {
    fs::metadata(path)
        .ok()
        .map(|m| m.permissions().mode() & 0o7777)
}
