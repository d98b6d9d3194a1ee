//! Command representation, formatting and log masking.

use std::borrow::Cow;
use std::cmp::Reverse;

use regex::Regex;

use crate::error::ValidationError;

/// Replacement text for masked command fragments.
pub const MASK_TOKEN: &str = "<*masked*>";

/// Program used to wrap scoped commands.
pub const SCOPE_PREFIX: &str = "chroot";

/// The scope commands actually run in.
///
/// An empty scope and the root directory both mean no scoping.
pub fn effective_scope(scope: Option<&str>) -> Option<&str> {
    scope.filter(|s| !s.is_empty() && *s != "/")
}

/// A command to be executed.
///
/// Either a shell string passed through as-is, or argument tokens that are
/// quoted and joined into one shell string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// Shell command line.
    Shell(String),
    /// Argument vector, quoted token by token.
    Argv(Vec<String>),
}

impl CommandLine {
    /// Render the command as one shell string.
    ///
    /// Fails if the command is blank or holds a NUL byte.
    pub fn to_shell(&self) -> Result<String, ValidationError> {
        let rendered = match self {
            Self::Shell(line) => {
                if line.contains('\0') {
                    return Err(ValidationError::InvalidCharacter('\0'));
                }
                line.trim_end().to_string()
            }
            Self::Argv(tokens) => {
                if tokens.iter().all(|t| t.trim().is_empty()) {
                    return Err(ValidationError::EmptyCommand);
                }
                shlex::try_join(tokens.iter().map(String::as_str))
                    .map_err(|_| ValidationError::InvalidCharacter('\0'))?
            }
        };

        if rendered.trim().is_empty() {
            return Err(ValidationError::EmptyCommand);
        }
        Ok(rendered)
    }
}

impl From<&str> for CommandLine {
    fn from(line: &str) -> Self {
        Self::Shell(line.to_string())
    }
}

impl From<String> for CommandLine {
    fn from(line: String) -> Self {
        Self::Shell(line)
    }
}

impl From<&String> for CommandLine {
    fn from(line: &String) -> Self {
        Self::Shell(line.clone())
    }
}

impl From<Vec<String>> for CommandLine {
    fn from(tokens: Vec<String>) -> Self {
        Self::Argv(tokens)
    }
}

impl From<Vec<&str>> for CommandLine {
    fn from(tokens: Vec<&str>) -> Self {
        Self::Argv(tokens.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for CommandLine {
    fn from(tokens: &[&str]) -> Self {
        Self::Argv(tokens.iter().map(|t| t.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for CommandLine {
    fn from(tokens: [&str; N]) -> Self {
        Self::Argv(tokens.iter().map(|t| t.to_string()).collect())
    }
}

/// Regex based redaction of command text.
///
/// Every capture group that takes part in a match is replaced with
/// [`MASK_TOKEN`], even when it matched empty text. Text outside groups is
/// kept.
#[derive(Debug, Clone)]
pub struct LogMask(Regex);

impl LogMask {
    /// Compile a mask from a regular expression.
    pub fn new(pattern: &str) -> Result<Self, ValidationError> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|e| ValidationError::InvalidMask {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    /// The source pattern.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Mask every matched group of `text`.
    pub fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut spans: Vec<(usize, usize)> = Vec::new();
        for caps in self.0.captures_iter(text) {
            let mut groups: Vec<_> = caps
                .iter()
                .skip(1)
                .flatten()
                .map(|m| (m.start(), m.end()))
                .collect();
            // parents ahead of the groups nested in them
            groups.sort_unstable_by_key(|&(start, end)| (start, Reverse(end)));
            for (start, end) in groups {
                if matches!(spans.last(), Some(&(s, e)) if s <= start && end <= e && s != e) {
                    continue;
                }
                spans.push((start, end));
            }
        }

        if spans.is_empty() {
            return Cow::Borrowed(text);
        }

        let mut masked = String::with_capacity(text.len());
        let mut cursor = 0;
        for (start, end) in spans {
            if start < cursor {
                continue;
            }
            masked.push_str(&text[cursor..start]);
            masked.push_str(MASK_TOKEN);
            cursor = end;
        }
        masked.push_str(&text[cursor..]);
        Cow::Owned(masked)
    }
}

impl From<Regex> for LogMask {
    fn from(regex: Regex) -> Self {
        Self(regex)
    }
}

/// Builds executable command strings and their log-safe counterparts.
#[derive(Debug, Clone, Default)]
pub struct CommandFormatter {
    mask: Option<LogMask>,
}

impl CommandFormatter {
    /// Create a formatter with an optional instance-wide mask.
    pub fn new(mask: Option<LogMask>) -> Self {
        Self { mask }
    }

    /// The instance-wide mask.
    pub fn log_mask(&self) -> Option<&LogMask> {
        self.mask.as_ref()
    }

    /// Render `command`, wrapping it into `scope` when one is given.
    pub fn format(
        &self,
        command: &CommandLine,
        scope: Option<&str>,
    ) -> Result<String, ValidationError> {
        self.wrap(&command.to_shell()?, scope)
    }

    /// Wrap an already rendered command into `scope`.
    ///
    /// A scoped command runs as `chroot <scope> sh -c <command>` so that the
    /// whole command line, separators included, stays inside the scope.
    pub fn wrap(&self, rendered: &str, scope: Option<&str>) -> Result<String, ValidationError> {
        match effective_scope(scope) {
            None => Ok(rendered.to_string()),
            Some(root) => Ok(format!(
                "{SCOPE_PREFIX} {} sh -c {}",
                quote(root)?,
                quote(rendered)?
            )),
        }
    }

    /// Redact `command` for logging.
    ///
    /// The instance mask runs first, then `extra`.
    pub fn mask(&self, command: &str, extra: Option<&LogMask>) -> String {
        let mut text = command.trim_end().to_string();
        for rule in [self.mask.as_ref(), extra].into_iter().flatten() {
            let masked = rule.apply(&text).into_owned();
            text = masked;
        }
        text.trim_end().to_string()
    }
}

fn quote(text: &str) -> Result<Cow<'_, str>, ValidationError> {
    shlex::try_quote(text).map_err(|_| ValidationError::InvalidCharacter('\0'))
}
