//! Passphrases and the interactive prompt providers that acquire them

use crate::error::{EnvSafeError, ErrorCategory, ErrorKind, Result};
use std::collections::VecDeque;
use std::fmt;
use std::io::{self, BufRead, IsTerminal, Read, Write};
use zeroize::Zeroizing;

/// Message shown when an empty passphrase is submitted
pub const EMPTY_PHRASE: &str = "Passphrase cannot be empty";

/// A non-empty passphrase, wiped from memory when dropped
#[derive(Clone, PartialEq, Eq)]
pub struct Passphrase(Zeroizing<String>);

impl Passphrase {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = Zeroizing::new(value.into());
        validate(&value)?;
        Ok(Self(value))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

/// Validation rule applied to passphrase input
pub fn validate(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(EnvSafeError::with_kind(
            ErrorCategory::User,
            ErrorKind::EmptyPassphrase,
            EMPTY_PHRASE,
        ));
    }
    Ok(())
}

/// Interactive collaborator used to acquire secrets and report outcomes
pub trait Prompt {
    /// Ask for a secret with masked input.
    ///
    /// Returns `Ok(None)` when the user cancels. Submitted input is passed
    /// to `validate` exactly once and its error, if any, is returned as is.
    fn ask_secret(
        &mut self,
        message: &str,
        validate: &dyn Fn(&str) -> Result<()>,
    ) -> Result<Option<Zeroizing<String>>>;

    /// Ask the user to pick one of `options`, returning its index or `None` on cancel.
    fn ask_choice(&mut self, question: &str, options: &[&str]) -> Result<Option<usize>>;

    fn notify_info(&mut self, message: &str);

    fn notify_error(&mut self, message: &str);
}

impl<P: Prompt + ?Sized> Prompt for Box<P> {
    fn ask_secret(
        &mut self,
        message: &str,
        validate: &dyn Fn(&str) -> Result<()>,
    ) -> Result<Option<Zeroizing<String>>> {
        (**self).ask_secret(message, validate)
    }

    fn ask_choice(&mut self, question: &str, options: &[&str]) -> Result<Option<usize>> {
        (**self).ask_choice(question, options)
    }

    fn notify_info(&mut self, message: &str) {
        (**self).notify_info(message)
    }

    fn notify_error(&mut self, message: &str) {
        (**self).notify_error(message)
    }
}

fn io_error(msg: &str, e: io::Error) -> EnvSafeError {
    EnvSafeError::with_kind_and_source(
        ErrorCategory::Internal,
        ErrorKind::Io,
        format!("{}: {}", msg, e),
        e,
    )
}

/// Strip one trailing `\n` or `\r\n`
fn trim_line_ending(value: &mut String) {
    if value.ends_with('\n') {
        value.pop();
        if value.ends_with('\r') {
            value.pop();
        }
    }
}

/// Reads the passphrase from the terminal with no echo and the persist
/// choice as a numbered menu on stdin. Notifications go to stderr.
pub struct TerminalPrompt;

impl TerminalPrompt {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompt for TerminalPrompt {
    /// Note: Terminal input is limited to UTF-8 due to rpassword library constraints.
    fn ask_secret(
        &mut self,
        message: &str,
        validate: &dyn Fn(&str) -> Result<()>,
    ) -> Result<Option<Zeroizing<String>>> {
        if !io::stdin().is_terminal() {
            return Err(EnvSafeError::with_kind(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                "cannot read passphrase from terminal - stdin is not a terminal",
            ));
        }

        let value = match rpassword::prompt_password(format!("{}: ", message)) {
            Ok(value) => Zeroizing::new(value),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => {
                return Err(EnvSafeError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::PassphraseUnavailable,
                    format!("failure reading passphrase: {}", e),
                    e,
                ));
            }
        };
        validate(&value)?;
        Ok(Some(value))
    }

    fn ask_choice(&mut self, question: &str, options: &[&str]) -> Result<Option<usize>> {
        let mut stderr = io::stderr();
        let mut menu = format!("{}\n", question);
        for (i, option) in options.iter().enumerate() {
            menu.push_str(&format!("  {}) {}\n", i + 1, option));
        }
        menu.push_str("Choice: ");
        stderr
            .write_all(menu.as_bytes())
            .and_then(|()| stderr.flush())
            .map_err(|e| io_error("failed to write prompt", e))?;

        let mut line = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| io_error("failed to read choice", e))?;
        if read == 0 {
            return Ok(None);
        }
        let choice = line
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|n| (1..=options.len()).contains(n))
            .map(|n| n - 1);
        Ok(choice)
    }

    fn notify_info(&mut self, message: &str) {
        eprintln!("{}", message);
    }

    fn notify_error(&mut self, message: &str) {
        eprintln!("Error: {}", message);
    }
}

/// Reads the passphrase from any io::Read source (typically stdin)
///
/// The whole stream is the passphrase, minus one trailing line ending. A
/// stream that ends without yielding any bytes counts as a cancel. The
/// persist choice is answered from a fixed policy.
pub struct StdinPrompt {
    reader: Box<dyn Read>,
    remember: bool,
}

impl StdinPrompt {
    pub fn new(reader: Box<dyn Read>, remember: bool) -> Self {
        Self { reader, remember }
    }
}

impl Prompt for StdinPrompt {
    fn ask_secret(
        &mut self,
        _message: &str,
        validate: &dyn Fn(&str) -> Result<()>,
    ) -> Result<Option<Zeroizing<String>>> {
        let mut data = Zeroizing::new(Vec::new());
        self.reader
            .read_to_end(&mut data)
            .map_err(|e| io_error("error reading passphrase", e))?;
        if data.is_empty() {
            return Ok(None);
        }

        let value = String::from_utf8(std::mem::take(&mut *data)).map_err(|e| {
            EnvSafeError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                "passphrase is not valid UTF-8",
                e,
            )
        })?;
        let mut value = Zeroizing::new(value);
        trim_line_ending(&mut value);
        validate(&value)?;
        Ok(Some(value))
    }

    fn ask_choice(&mut self, _question: &str, options: &[&str]) -> Result<Option<usize>> {
        // Option order is [persist, use once].
        let index = if self.remember { 0 } else { 1 };
        Ok((index < options.len()).then_some(index))
    }

    fn notify_info(&mut self, message: &str) {
        eprintln!("{}", message);
    }

    fn notify_error(&mut self, message: &str) {
        eprintln!("Error: {}", message);
    }
}

/// Answers prompts from a prepared script and records notifications (for testing)
///
/// Running out of scripted secrets is reported as `PassphraseUnavailable`;
/// running out of choices behaves like a cancelled choice.
#[derive(Default)]
pub struct ScriptedPrompt {
    secrets: VecDeque<Option<String>>,
    choices: VecDeque<Option<usize>>,
    secret_requests: usize,
    choice_requests: usize,
    infos: Vec<String>,
    errors: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a submitted secret.
    pub fn secret(mut self, value: &str) -> Self {
        self.secrets.push_back(Some(value.to_string()));
        self
    }

    /// Queue a cancelled secret prompt.
    pub fn cancel_secret(mut self) -> Self {
        self.secrets.push_back(None);
        self
    }

    /// Queue a choice answer.
    pub fn choice(mut self, index: usize) -> Self {
        self.choices.push_back(Some(index));
        self
    }

    /// Queue a cancelled choice.
    pub fn cancel_choice(mut self) -> Self {
        self.choices.push_back(None);
        self
    }

    pub fn secret_requests(&self) -> usize {
        self.secret_requests
    }

    pub fn choice_requests(&self) -> usize {
        self.choice_requests
    }

    pub fn infos(&self) -> &[String] {
        &self.infos
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

impl Prompt for ScriptedPrompt {
    fn ask_secret(
        &mut self,
        _message: &str,
        validate: &dyn Fn(&str) -> Result<()>,
    ) -> Result<Option<Zeroizing<String>>> {
        self.secret_requests += 1;
        match self.secrets.pop_front() {
            Some(Some(value)) => {
                validate(&value)?;
                Ok(Some(Zeroizing::new(value)))
            }
            Some(None) => Ok(None),
            None => Err(EnvSafeError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::PassphraseUnavailable,
                "no scripted passphrase left",
            )),
        }
    }

    fn ask_choice(&mut self, _question: &str, _options: &[&str]) -> Result<Option<usize>> {
        self.choice_requests += 1;
        Ok(self.choices.pop_front().flatten())
    }

    fn notify_info(&mut self, message: &str) {
        self.infos.push(message.to_string());
    }

    fn notify_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }
}
