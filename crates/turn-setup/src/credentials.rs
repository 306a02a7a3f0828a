use std::fmt;

use anyhow::{Result, bail};
use rand::RngExt;

use crate::prompt::Prompter;

/// Environment variable consulted for the password in non-interactive mode.
pub const PASSWORD_ENV: &str = "TURN_SETUP_PASSWORD";

/// Length of generated passwords.
const GENERATED_LEN: usize = 24;

/// Long-term credential pair embedded in the relay configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Set when the password was generated rather than supplied, so the
    /// summary can show it once.
    pub generated: bool,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("generated", &self.generated)
            .finish()
    }
}

/// Generate a random alphanumeric string of the given length.
pub fn generate_password(len: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Usernames end up in `user=<name>:<password>`.
pub fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() || username.len() > 64 {
        bail!("username must be 1-64 characters (got {})", username.len());
    }
    if let Some(c) = username
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '@')))
    {
        bail!("username contains unsupported character {c:?} (allowed: letters, digits, . _ - @)");
    }
    Ok(())
}

/// Passwords must survive the configuration file unquoted.
pub fn validate_password(password: &str) -> Result<()> {
    if password.len() < 8 || password.len() > 128 {
        bail!("password must be 8-128 characters (got {})", password.len());
    }
    if let Some(c) = password
        .chars()
        .find(|c| !c.is_ascii_graphic() || matches!(c, ':' | '#'))
    {
        bail!("password contains unsupported character {c:?} (no whitespace, ':' or '#')");
    }
    Ok(())
}

/// Collect and validate the relay credential pair.
///
/// Interactive runs re-ask until the answers validate. An empty password
/// (or, unattended, an unset [`PASSWORD_ENV`]) yields a generated one.
pub fn collect(
    prompter: &dyn Prompter,
    preset_username: Option<String>,
    env_password: Option<String>,
    non_interactive: bool,
) -> Result<Credentials> {
    let username = match preset_username {
        Some(u) => {
            validate_username(&u)?;
            u
        }
        None if non_interactive => bail!("--username is required in non-interactive mode"),
        None => loop {
            let u = prompter.input("Relay username", None)?;
            match validate_username(&u) {
                Ok(()) => break u,
                Err(e) => tracing::warn!("{e}"),
            }
        },
    };

    if non_interactive {
        return match env_password.filter(|p| !p.is_empty()) {
            Some(p) => {
                validate_password(&p)?;
                Ok(Credentials {
                    username,
                    password: p,
                    generated: false,
                })
            }
            None => {
                tracing::info!("{PASSWORD_ENV} not set, generating a relay password");
                Ok(Credentials {
                    username,
                    password: generate_password(GENERATED_LEN),
                    generated: true,
                })
            }
        };
    }

    loop {
        let p = prompter.password("Relay password (leave empty to generate)")?;
        if p.is_empty() {
            tracing::info!("generated {GENERATED_LEN}-character relay password");
            return Ok(Credentials {
                username,
                password: generate_password(GENERATED_LEN),
                generated: true,
            });
        }
        match validate_password(&p) {
            Ok(()) => {
                return Ok(Credentials {
                    username,
                    password: p,
                    generated: false,
                });
            }
            Err(e) => tracing::warn!("{e}"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::prompt::testing::Scripted;

    #[test]
    fn generated_password_is_valid() {
        let p = generate_password(GENERATED_LEN);
        assert_eq!(p.len(), GENERATED_LEN);
        validate_password(&p).unwrap();
    }

    #[test]
    fn username_rejects_separator_and_newline() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("bob@relay.example").is_ok());
        assert!(validate_username("a:b").is_err());
        assert!(validate_username("a\nrealm=evil").is_err());
        assert!(validate_username("").is_err());
    }

    #[test]
    fn password_rejects_injection_characters() {
        assert!(validate_password("s3cret-Pass!").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password("has space in it").is_err());
        assert!(validate_password("pass:word123").is_err());
        assert!(validate_password("line\nbreak123").is_err());
    }

    #[test]
    fn interactive_reprompts_until_valid() {
        let prompter = Scripted::new(&["bad name", "alice", "short", "long-enough-pass"]);
        let creds = collect(&prompter, None, None, false).unwrap();
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, "long-enough-pass");
        assert!(!creds.generated);
        assert_eq!(prompter.asked().len(), 4);
    }

    #[test]
    fn empty_password_is_generated() {
        let prompter = Scripted::new(&[""]);
        let creds = collect(&prompter, Some("alice".into()), None, false).unwrap();
        assert!(creds.generated);
        assert_eq!(creds.password.len(), GENERATED_LEN);
    }

    #[test]
    fn non_interactive_uses_env_password() {
        let prompter = Scripted::new(&[]);
        let creds = collect(
            &prompter,
            Some("alice".into()),
            Some("from-env-123".into()),
            true,
        )
        .unwrap();
        assert_eq!(creds.password, "from-env-123");
        assert!(prompter.asked().is_empty());
    }

    #[test]
    fn non_interactive_requires_username() {
        let prompter = Scripted::new(&[]);
        assert!(collect(&prompter, None, None, true).is_err());
    }

    #[test]
    fn debug_redacts_password() {
        let creds = Credentials {
            username: "alice".into(),
            password: "top-secret-1".into(),
            generated: false,
        };
        let out = format!("{creds:?}");
        assert!(out.contains("alice"));
        assert!(!out.contains("top-secret-1"));
    }
}
