/// System-wide open file limit applied through sysctl.
pub const FILE_MAX: u64 = 1_048_576;

/// Per-process `nofile` limit for every account.
pub const NOFILE_LIMIT: u64 = 1_048_576;

/// journald cap for persistent log storage.
pub const JOURNAL_MAX_USE: &str = "200M";

/// journald retention window.
pub const JOURNAL_MAX_RETENTION: &str = "7day";

/// `limits.conf` lines raising the open-file limit.
pub fn limits_lines() -> [String; 2] {
    [
        format!("* soft nofile {NOFILE_LIMIT}"),
        format!("* hard nofile {NOFILE_LIMIT}"),
    ]
}

/// Generate the journald drop-in capping log volume.
pub fn journald_dropin() -> String {
    format!(
        r"# Managed by turn-setup: keep relay logging from filling the disk.
[Journal]
SystemMaxUse={JOURNAL_MAX_USE}
MaxRetentionSec={JOURNAL_MAX_RETENTION}
"
    )
}
