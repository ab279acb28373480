//! Regex tokenizer for the bracket language
//!
//! Each match of [`POSTSCRIPT_TOKEN`] is exactly one of, in order of preference:
//!
//! 1. a comment, `%` to the end of the line
//! 2. a run of whitespace (NUL, TAB, LF, CR, FF, space)
//! 3. a string literal in parentheses; backslash escapes anything, but a bare `(` or `)`
//!    inside is not supported
//! 4. a structural token: `{`, `}`, `[`, `]`, `<<`, `>>`
//! 5. a bare token: a run of anything that is not whitespace or a delimiter; names such as
//!    `/Foo` are bare tokens starting with `/`
//! 6. any other single character, which is an error

use once_cell::sync::Lazy;
use regex::{CaptureMatches, Regex};
use serde::Serialize;

use crate::error::{Error, Result};

static POSTSCRIPT_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"%[^\r\n]*|",
        r"[\x00\t\n\r\x0c ]+|",
        r"(\((?s:[^()\\]+|\\.)*\))|",
        r"(<<|>>|[{}\[\]])|",
        r"([^\x00\t\n\r\x0c %(){}<>\[\]]+)|",
        r"(?s:(.))",
    ))
    .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketKind {
    Comment,
    Whitespace,
    String,
    Structural,
    Bare,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BracketToken<'src> {
    pub kind: BracketKind,
    pub text: &'src str,
    pub offset: usize,
}

impl<'src> BracketToken<'src> {
    /// Whether this token survives minification.
    pub fn is_significant(&self) -> bool {
        !matches!(self.kind, BracketKind::Comment | BracketKind::Whitespace)
    }
}

/// Iterator over the tokens of a bracket language source.
///
/// Yields an [`Error::UnsupportedSyntax`] for the first character no pattern accepts and
/// stops there.
pub struct BracketLexer<'src> {
    source: &'src str,
    captures: CaptureMatches<'static, 'src>,
    failed: bool,
}

impl<'src> BracketLexer<'src> {
    pub fn new(source: &'src str) -> Self {
        BracketLexer {
            source,
            captures: POSTSCRIPT_TOKEN.captures_iter(source),
            failed: false,
        }
    }
}

impl<'src> Iterator for BracketLexer<'src> {
    type Item = Result<BracketToken<'src>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let caps = self.captures.next()?;
        let whole = caps.get(0)?;
        let kind = if caps.get(1).is_some() {
            BracketKind::String
        } else if caps.get(2).is_some() {
            BracketKind::Structural
        } else if caps.get(3).is_some() {
            BracketKind::Bare
        } else if caps.get(4).is_some() {
            self.failed = true;
            return Some(Err(Error::unsupported_syntax(self.source, whole.start())));
        } else if whole.as_str().starts_with('%') {
            BracketKind::Comment
        } else {
            BracketKind::Whitespace
        };
        Some(Ok(BracketToken {
            kind,
            text: whole.as_str(),
            offset: whole.start(),
        }))
    }
}
