use crate::command::CommandError;
use std::collections::HashMap;

/// Parsed command arguments: positional tokens plus `-x value` flags.
///
/// A token counts as a flag only when it is a dash followed by a single
/// letter, so negative numbers stay positional. A flag consumes the next
/// token as its value when one exists.
#[derive(Debug, Clone, Default)]
pub struct CommandArgs {
    positional: Vec<String>,
    flags: HashMap<char, String>,
}

impl CommandArgs {
    pub fn parse(tokens: &[&str]) -> Self {
        let mut positional = Vec::new();
        let mut flags = HashMap::new();
        let mut iter = tokens.iter().peekable();
        while let Some(token) = iter.next() {
            let mut chars = token.chars();
            if chars.next() == Some('-') {
                if let Some(flag) = chars.next() {
                    if flag.is_ascii_alphabetic() && chars.next().is_none() {
                        let value = iter.next().map(|v| v.to_string()).unwrap_or_default();
                        flags.insert(flag, value);
                        continue;
                    }
                }
            }
            positional.push(token.to_string());
        }
        Self { positional, flags }
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }

    pub fn string(&self, index: usize) -> Result<&str, CommandError> {
        self.positional
            .get(index)
            .map(|s| s.as_str())
            .ok_or_else(|| CommandError(format!("Missing argument {}.", index + 1)))
    }

    pub fn integer(&self, index: usize) -> Result<i64, CommandError> {
        let raw = self.string(index)?;
        raw.parse()
            .map_err(|_| CommandError(format!("'{}' is not a whole number.", raw)))
    }

    pub fn float(&self, index: usize) -> Result<f32, CommandError> {
        let raw = self.string(index)?;
        raw.parse()
            .map_err(|_| CommandError(format!("'{}' is not a number.", raw)))
    }

    /// A coordinate argument: a plain number, or `~`/`~n` relative to
    /// `base`.
    pub fn relative_coord(&self, index: usize, base: f32) -> Result<f32, CommandError> {
        let raw = self.string(index)?;
        if let Some(rest) = raw.strip_prefix('~') {
            if rest.is_empty() {
                return Ok(base);
            }
            return rest
                .parse::<f32>()
                .map(|offset| base + offset)
                .map_err(|_| CommandError(format!("'{}' is not a relative offset.", raw)));
        }
        self.float(index)
    }

    /// Remaining positional arguments from `from`, joined with spaces.
    pub fn joined(&self, from: usize) -> String {
        self.positional[from.min(self.positional.len())..].join(" ")
    }

    pub fn has_flag(&self, flag: char) -> bool {
        self.flags.contains_key(&flag)
    }

    pub fn flag(&self, flag: char) -> Option<&str> {
        self.flags.get(&flag).map(|s| s.as_str())
    }
}
