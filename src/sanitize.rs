//! Extraction of a single SQL statement from a free-form model response.
//!
//! This is pattern matching, not parsing. A response without any recognizable statement keyword is reported as
//! [SanitizeError::NoSqlCandidate] instead of being replaced by a default query.

use once_cell::sync::Lazy;
use regex::Regex;
use snafu::Snafu;

static CLOSED_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:[\w-]*[ \t]*\r?\n)?(.*?)```").expect("closed fence pattern is valid")
});

static OPEN_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:[\w-]*[ \t]*\r?\n)?(.*)").expect("open fence pattern is valid")
});

static LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:sql|query|запрос|ответ|answer)\s*:\s*").expect("label pattern is valid")
});

static LEADING_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:select|insert|update|delete)\b|\bwith\s+(?:recursive\s+)?\w+\s+as\s*\(")
        .expect("keyword pattern is valid")
});

static DOLLAR_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$(?:[A-Za-z_][A-Za-z0-9_]*)?\$").expect("dollar tag pattern is valid"));

static BLANK_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r?\n[ \t]*\r?\n").expect("blank line pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum SanitizeError {
    /// The response does not contain any recognizable SQL statement.
    #[snafu(display("the model response does not contain an SQL statement"))]
    NoSqlCandidate,
}

/// SQL text extracted from a model response that has not been validated yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate(String);

impl Candidate {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for Candidate {
    fn from(text: &str) -> Self {
        Candidate(text.to_string())
    }
}

impl std::fmt::Display for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Candidate {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Reduce a raw model response to one candidate statement.
pub fn sanitize(raw: &str) -> Result<Candidate, SanitizeError> {
    let text = strip_fence(raw);
    let text = strip_label(text);
    let text = skip_to_keyword(text).ok_or(SanitizeError::NoSqlCandidate)?;
    let text = cut_trailing(text);

    Ok(Candidate(text.trim().to_string()))
}

fn strip_fence(text: &str) -> &str {
    let captures = CLOSED_FENCE
        .captures(text)
        .or_else(|| OPEN_FENCE.captures(text));

    match captures.and_then(|captures| captures.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => text,
    }
}

fn strip_label(text: &str) -> &str {
    match LABEL.find(text) {
        Some(label) => &text[label.end()..],
        None => text,
    }
}

fn skip_to_keyword(text: &str) -> Option<&str> {
    LEADING_KEYWORD.find(text).map(|keyword| &text[keyword.start()..])
}

/// Drop everything after the first statement terminator. Without a terminator, a blank line ends the statement.
fn cut_trailing(text: &str) -> &str {
    if let Some(end) = terminator(text) {
        return &text[..=end];
    }

    match BLANK_LINE.find(text) {
        Some(blank) => &text[..blank.start()],
        None => text,
    }
}

/// Byte offset of the first `;` that is not inside a quoted literal, a quoted identifier or a dollar-quoted string.
fn terminator(text: &str) -> Option<usize> {
    let mut offset = 0;

    while let Some(c) = text[offset..].chars().next() {
        offset = match c {
            ';' => return Some(offset),
            '"' => close_quote(text, offset + 1, '"', false)?,
            '\'' => close_quote(text, offset + 1, '\'', escape_prefix(&text[..offset]))?,
            '$' if !text[..offset].ends_with(is_identifier_char) => match DOLLAR_TAG.find(&text[offset..]) {
                Some(tag) => {
                    let body = offset + tag.end();
                    body + text[body..].find(tag.as_str())? + tag.len()
                }
                None => offset + 1,
            },
            c => offset + c.len_utf8(),
        };
    }

    None
}

/// Offset just past the `quote` closing a run that starts at `from`. A doubled quote closes and reopens the run.
fn close_quote(text: &str, from: usize, quote: char, backslash_escapes: bool) -> Option<usize> {
    let mut chars = text[from..].char_indices();

    while let Some((i, c)) = chars.next() {
        if backslash_escapes && c == '\\' {
            chars.next();
        } else if c == quote {
            return Some(from + i + c.len_utf8());
        }
    }

    None
}

/// Whether a literal opening right after `before` is an `E'...'` escape string.
fn escape_prefix(before: &str) -> bool {
    let mut chars = before.chars().rev();
    matches!(chars.next(), Some('e' | 'E')) && !chars.next().is_some_and(is_identifier_char)
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}
