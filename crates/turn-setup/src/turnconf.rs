//! Structured model of `turnserver.conf`.
//!
//! Directives are validated on construction so operator input can never
//! break out of its line, and the file is always rendered from the model.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::RelaySettings;
use crate::credentials::Credentials;
use crate::files::write_atomic;

/// First line of every rendered configuration.
const HEADER: &str = "# Managed by turn-setup. Local edits are overwritten on re-run.\n";

/// Directives that make up the TLS block.
pub const TLS_KEYS: &[&str] = &["cert", "pkey", "tls-listening-port"];

/// Errors from building, reading or writing the relay configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid directive name {0:?}")]
    InvalidKey(String),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: &'static str },

    #[error("line {line}: cannot parse {text:?}")]
    Parse { line: usize, text: String },

    #[error("relay configuration not found at {0}")]
    Missing(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

/// One line of the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Bare option such as `fingerprint`.
    Flag(String),
    /// `key=value`.
    Value(String, String),
}

impl Directive {
    pub fn flag(key: &str) -> Result<Self, ConfigError> {
        check_key(key)?;
        Ok(Self::Flag(key.to_string()))
    }

    pub fn value(key: &str, value: impl fmt::Display) -> Result<Self, ConfigError> {
        check_key(key)?;
        let value = value.to_string();
        check_value(key, &value)?;
        Ok(Self::Value(key.to_string(), value))
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Flag(k) | Self::Value(k, _) => k,
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(k) => write!(f, "{k}"),
            Self::Value(k, v) => write!(f, "{k}={v}"),
        }
    }
}

fn check_key(key: &str) -> Result<(), ConfigError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidKey(key.to_string()))
    }
}

fn check_value(key: &str, value: &str) -> Result<(), ConfigError> {
    let invalid = |reason| ConfigError::InvalidValue {
        key: key.to_string(),
        reason,
    };
    if value.is_empty() {
        return Err(invalid("empty"));
    }
    if value.trim() != value {
        return Err(invalid("surrounding whitespace"));
    }
    if value.chars().any(char::is_control) {
        return Err(invalid("control character"));
    }
    if value.contains('#') {
        return Err(invalid("'#' starts a comment"));
    }
    Ok(())
}

/// Ordered set of relay directives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnConfig {
    directives: Vec<Directive>,
}

impl TurnConfig {
    /// Base relay configuration for `domain` with a single long-term credential.
    pub fn relay(
        domain: &str,
        credentials: &Credentials,
        settings: &RelaySettings,
    ) -> Result<Self, ConfigError> {
        let user = format!("{}:{}", credentials.username, credentials.password);
        let directives = vec![
            Directive::value("listening-port", settings.listening_port)?,
            Directive::value("alt-listening-port", 0)?,
            Directive::flag("fingerprint")?,
            Directive::flag("lt-cred-mech")?,
            Directive::value("min-port", settings.min_port)?,
            Directive::value("max-port", settings.max_port)?,
            Directive::value("user", user)?,
            Directive::value("stale-nonce", settings.stale_nonce)?,
            Directive::value("realm", domain)?,
            Directive::value("server-name", domain)?,
            Directive::flag("no-multicast-peers")?,
            Directive::flag("no-stdout-log")?,
        ];
        Ok(Self { directives })
    }

    /// Parse configuration text. Comments and blank lines are dropped.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut directives = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parse_err = || ConfigError::Parse {
                line: idx + 1,
                text: raw.to_string(),
            };
            let directive = match line.split_once('=') {
                Some((k, v)) => Directive::value(k.trim(), v.trim()).map_err(|_| parse_err())?,
                None => Directive::flag(line).map_err(|_| parse_err())?,
            };
            directives.push(directive);
        }
        Ok(Self { directives })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Atomically replace `path` with the rendered configuration (mode 0640).
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        tracing::info!("writing relay configuration: {}", path.display());
        write_atomic(path, &self.render(), 0o640).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            reason: format!("{e:#}"),
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::from(HEADER);
        for d in &self.directives {
            out.push_str(&d.to_string());
            out.push('\n');
        }
        out
    }

    /// Value of the first `key=value` directive.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.directives.iter().find_map(|d| match d {
            Directive::Value(k, v) if k == key => Some(v.as_str()),
            _ => None,
        })
    }

    pub fn has(&self, key: &str) -> bool {
        self.directives.iter().any(|d| d.key() == key)
    }

    pub fn count(&self, key: &str) -> usize {
        self.directives.iter().filter(|d| d.key() == key).count()
    }

    /// Set `key=value`, replacing the first occurrence and dropping any others.
    pub fn set(&mut self, key: &str, value: impl fmt::Display) -> Result<(), ConfigError> {
        let directive = Directive::value(key, value)?;
        match self.directives.iter().position(|d| d.key() == key) {
            Some(pos) => {
                self.directives[pos] = directive;
                let mut seen = 0;
                self.directives.retain(|d| {
                    if d.key() != key {
                        return true;
                    }
                    seen += 1;
                    seen == 1
                });
            }
            None => self.directives.push(directive),
        }
        Ok(())
    }

    /// Point the relay at a certificate pair and open the TLS listener.
    pub fn apply_tls(&mut self, cert: &Path, key: &Path, port: u16) -> Result<(), ConfigError> {
        self.set("cert", cert.display())?;
        self.set("pkey", key.display())?;
        self.set("tls-listening-port", port)?;
        Ok(())
    }

    /// Whether every TLS directive is present.
    pub fn has_tls(&self) -> bool {
        TLS_KEYS.iter().all(|k| self.has(k))
    }

    /// Whether any TLS directive is present.
    pub fn has_any_tls(&self) -> bool {
        TLS_KEYS.iter().any(|k| self.has(k))
    }

    pub fn realm(&self) -> Option<&str> {
        self.get("realm")
    }

    /// Username of the first `user=` credential.
    pub fn username(&self) -> Option<&str> {
        self.get("user")
            .and_then(|u| u.split_once(':'))
            .map(|(name, _)| name)
    }
}
