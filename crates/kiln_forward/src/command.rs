//! Command lines and the cache keys derived from them.

use std::fmt;

use serde::{Deserialize, Serialize};

use kiln_common::ContentHash;
use kiln_config::MAX_HASH_DIGITS;

/// Name used when a command has no non-option argument.
const UNKNOWN_NAME: &str = "unknown";

/// An ordered token sequence describing one command invocation.
///
/// The first token is the program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandLine {
    args: Vec<String>,
}

impl CommandLine {
    /// Creates a command line from its tokens.
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Splits `line` on whitespace.
    ///
    /// No quoting rules apply.
    pub fn parse(line: &str) -> Self {
        Self::new(line.split_whitespace())
    }

    /// All tokens, program first.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The program token, if any.
    pub fn program(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// The first argument after the program that does not start with `-`.
    pub fn subject(&self) -> Option<&str> {
        self.args
            .iter()
            .skip(1)
            .map(String::as_str)
            .find(|arg| !arg.starts_with('-'))
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args.join(" "))
    }
}

/// A legible, collision-resistant identity for a command.
///
/// Rendered as `"<subject> #<HASH>"`, where the hash covers every token.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandKey(String);

impl CommandKey {
    /// The rendered key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Derives the cache key of `command` with a `digits`-long hash suffix.
///
/// `digits` is clamped to `1..=32`.
pub fn command_key(command: &CommandLine, digits: usize) -> CommandKey {
    let name = command.subject().unwrap_or(UNKNOWN_NAME);
    let hash = ContentHash::from_parts(command.args());
    let digits = digits.clamp(1, MAX_HASH_DIGITS);
    CommandKey(format!("{name} #{}", hash.short_hex(digits)))
}
