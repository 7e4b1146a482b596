//! Anchor resolution against live file content.
//!
//! Anchors are resolved fresh on every call; nothing is cached between steps.

use std::fmt;
use std::ops::Range;

use regex::Regex;
use serde::Serialize;

use crate::error::StepError;

/// A literal substring or a regular expression locating an edit point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    Literal(String),
    Pattern(String),
}

enum Matcher<'a> {
    Literal(&'a str),
    Regex(Regex),
}

impl Anchor {
    pub fn literal(text: impl Into<String>) -> Self {
        Anchor::Literal(text.into())
    }

    pub fn pattern(pattern: impl Into<String>) -> Self {
        Anchor::Pattern(pattern.into())
    }

    fn matcher(&self) -> Result<Matcher<'_>, StepError> {
        match self {
            Anchor::Literal(text) => Ok(Matcher::Literal(text)),
            Anchor::Pattern(pattern) => {
                Regex::new(pattern)
                    .map(Matcher::Regex)
                    .map_err(|err| StepError::InvalidPattern {
                        pattern: pattern.clone(),
                        message: err.to_string(),
                    })
            }
        }
    }

    /// Index of the first line matching this anchor, scanning top to bottom.
    pub fn find_line(&self, lines: &[String]) -> Result<Option<usize>, StepError> {
        let matcher = self.matcher()?;
        Ok(lines.iter().position(|line| match &matcher {
            Matcher::Literal(text) => line.contains(text),
            Matcher::Regex(re) => re.is_match(line),
        }))
    }

    /// Byte span of the first match in `text` starting at or after `from`.
    pub fn find_span(&self, text: &str, from: usize) -> Result<Option<Range<usize>>, StepError> {
        let matcher = self.matcher()?;
        if !text.is_char_boundary(from) {
            return Ok(None);
        }
        // Regexes see the text before `from`, so `^` and `\b` stay line-aware.
        let span = match &matcher {
            Matcher::Literal(needle) => text[from..]
                .find(needle)
                .map(|start| start + from..start + from + needle.len()),
            Matcher::Regex(re) => re.find_at(text, from).map(|m| m.range()),
        };
        Ok(span)
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anchor::Literal(text) => write!(f, "literal {text:?}"),
            Anchor::Pattern(pattern) => write!(f, "pattern /{pattern}/"),
        }
    }
}
