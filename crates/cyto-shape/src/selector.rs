//! Shape-specific selectors and the dotted/bracketed string grammar

use cyto_core::{Error, Result};
use serde_json::Value;
use std::fmt;

/// Top-level block kinds addressable in source files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Function,
    Class,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Function => "function",
            BlockKind::Class => "class",
        }
    }
}

/// One step of a path selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Map key or named table column
    Key(String),
    /// List index or table row
    Index(usize),
}

/// A parsed selector.
///
/// Source trees address top-level blocks (`function:<name>`,
/// `class:<name>`); maps address nested values by path; tables reuse a
/// two-segment path `[row, column]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Block { kind: BlockKind, name: String },
    Path(Vec<Segment>),
}

impl Selector {
    /// Parse a selector from its tool-call representation: either a
    /// structured path array or a selector string.
    pub fn parse(value: &Value) -> Result<Selector> {
        match value {
            Value::Array(items) => {
                let mut segments = Vec::with_capacity(items.len());
                for item in items {
                    segments.push(match item {
                        Value::String(s) => Segment::Key(s.clone()),
                        Value::Number(n) => match n.as_u64() {
                            Some(i) => Segment::Index(i as usize),
                            None => {
                                return Err(Error::InvalidSelector(format!(
                                    "Selector index must be a non-negative integer, got {n}"
                                )));
                            }
                        },
                        other => {
                            return Err(Error::InvalidSelector(format!(
                                "Selector path elements must be strings or integers, got {other}"
                            )));
                        }
                    });
                }
                Ok(Selector::Path(segments))
            }
            Value::String(s) => Self::parse_str(s),
            _ => Err(Error::InvalidSelector(
                "Selector must be a list path or a string path".to_string(),
            )),
        }
    }

    /// Parse the string grammar: `.`-separated segments with `[N]` /
    /// `[name]` brackets; `function:` and `class:` prefixes pass through.
    pub fn parse_str(selector: &str) -> Result<Selector> {
        let selector = selector.trim();
        if selector.is_empty() {
            return Err(Error::InvalidSelector("Selector cannot be empty".to_string()));
        }
        if let Some(name) = selector.strip_prefix("function:") {
            return Ok(Selector::Block {
                kind: BlockKind::Function,
                name: name.to_string(),
            });
        }
        if let Some(name) = selector.strip_prefix("class:") {
            return Ok(Selector::Block {
                kind: BlockKind::Class,
                name: name.to_string(),
            });
        }

        let mut segments = Vec::new();
        let mut token = String::new();
        let chars: Vec<char> = selector.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '.' => {
                    if !token.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut token)));
                    }
                    i += 1;
                }
                '[' => {
                    if !token.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut token)));
                    }
                    let close = chars[i + 1..]
                        .iter()
                        .position(|&c| c == ']')
                        .map(|p| i + 1 + p)
                        .ok_or_else(|| {
                            Error::InvalidSelector(format!(
                                "Invalid selector \"{selector}\": missing \"]\""
                            ))
                        })?;
                    let idx: String = chars[i + 1..close].iter().collect();
                    if idx.is_empty() {
                        return Err(Error::InvalidSelector(format!(
                            "Invalid selector \"{selector}\": empty index"
                        )));
                    }
                    if idx.chars().all(|c| c.is_ascii_digit()) {
                        segments.push(Segment::Index(idx.parse().map_err(|_| {
                            Error::InvalidSelector(format!(
                                "Invalid selector \"{selector}\": index out of range"
                            ))
                        })?));
                    } else {
                        segments.push(Segment::Key(idx));
                    }
                    i = close + 1;
                }
                c => {
                    token.push(c);
                    i += 1;
                }
            }
        }
        if !token.is_empty() {
            segments.push(Segment::Key(token));
        }
        Ok(Selector::Path(segments))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Block { kind, name } => write!(f, "{}:{}", kind.as_str(), name),
            Selector::Path(segments) => {
                for (i, segment) in segments.iter().enumerate() {
                    match segment {
                        Segment::Key(k) => {
                            if i > 0 {
                                write!(f, ".")?;
                            }
                            write!(f, "{k}")?;
                        }
                        Segment::Index(n) => write!(f, "[{n}]")?,
                    }
                }
                Ok(())
            }
        }
    }
}
