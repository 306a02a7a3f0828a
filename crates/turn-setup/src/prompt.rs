use anyhow::{Result, bail};
use dialoguer::{Confirm, Input, Password};

/// Operator interaction used by the setup flow.
pub trait Prompter {
    /// Free-text input. `default` is offered when present.
    fn input(&self, prompt: &str, default: Option<&str>) -> Result<String>;

    /// Hidden input, asked twice for confirmation. Empty input is allowed.
    fn password(&self, prompt: &str) -> Result<String>;

    /// Yes/no question.
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool>;
}

/// Prompts on the controlling terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct Terminal;

impl Prompter for Terminal {
    fn input(&self, prompt: &str, default: Option<&str>) -> Result<String> {
        let mut input = Input::<String>::new().with_prompt(prompt);
        if let Some(d) = default {
            input = input.default(d.to_string());
        }
        let value = input.interact_text()?;
        Ok(value.trim().to_string())
    }

    fn password(&self, prompt: &str) -> Result<String> {
        let password = Password::new()
            .with_prompt(prompt)
            .with_confirmation("Repeat password", "Passwords do not match")
            .allow_empty_password(true)
            .interact()?;
        Ok(password)
    }

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        Ok(Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?)
    }
}

/// Never asks: confirmations take their default, inputs take their default or fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unattended;

impl Prompter for Unattended {
    fn input(&self, prompt: &str, default: Option<&str>) -> Result<String> {
        match default {
            Some(d) => Ok(d.to_string()),
            None => bail!("'{prompt}' needs an answer but --non-interactive was given"),
        }
    }

    fn password(&self, prompt: &str) -> Result<String> {
        bail!("'{prompt}' needs an answer but --non-interactive was given")
    }

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        tracing::debug!("non-interactive: '{prompt}' -> {default}");
        Ok(default)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use anyhow::{Result, anyhow};

    use super::Prompter;

    /// Replays queued answers in order and records the prompts it was shown.
    #[derive(Debug, Default)]
    pub struct Scripted {
        answers: RefCell<VecDeque<String>>,
        asked: RefCell<Vec<String>>,
    }

    impl Scripted {
        pub fn new(answers: &[&str]) -> Self {
            Self {
                answers: RefCell::new(answers.iter().copied().map(String::from).collect()),
                asked: RefCell::default(),
            }
        }

        pub fn asked(&self) -> Vec<String> {
            self.asked.borrow().clone()
        }

        fn next(&self, prompt: &str) -> Result<String> {
            self.asked.borrow_mut().push(prompt.to_string());
            self.answers
                .borrow_mut()
                .pop_front()
                .ok_or_else(|| anyhow!("no scripted answer for '{prompt}'"))
        }
    }

    impl Prompter for Scripted {
        fn input(&self, prompt: &str, _default: Option<&str>) -> Result<String> {
            self.next(prompt)
        }

        fn password(&self, prompt: &str) -> Result<String> {
            self.next(prompt)
        }

        fn confirm(&self, prompt: &str, _default: bool) -> Result<bool> {
            let answer = self.next(prompt)?;
            Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn unattended_confirm_takes_default() {
        assert!(Unattended.confirm("Enable TLS?", true).unwrap());
        assert!(!Unattended.confirm("Continue anyway?", false).unwrap());
    }

    #[test]
    fn unattended_input_requires_default() {
        assert_eq!(Unattended.input("Domain", Some("a.example")).unwrap(), "a.example");
        assert!(Unattended.input("Username", None).is_err());
        assert!(Unattended.password("Password").is_err());
    }

    #[test]
    fn scripted_confirm_is_case_insensitive() {
        let p = testing::Scripted::new(&["Y", "YES", "no"]);
        assert!(p.confirm("a", false).unwrap());
        assert!(p.confirm("b", false).unwrap());
        assert!(!p.confirm("c", true).unwrap());
        assert!(p.confirm("d", true).is_err());
    }
}
