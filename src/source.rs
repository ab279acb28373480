//! Source adapters and the input gate
//!
//!     The tokenizer works on one contiguous `&str`. Callers hold source text in different
//!     shapes: a borrowed string, an owned buffer of bytes read from disk, or a sequence of
//!     lines produced by some other reader. [`IntoSource`] turns each of those into a
//!     [`Source`], which is what the rest of the crate consumes.
//!
//!     [`check_input`] is the gate applied before a file is tokenized: only newline and
//!     printable ASCII are accepted, and an encoding declaration in the first two lines is
//!     rejected outright. Minified output carries no comments, so a declaration could not
//!     survive minification anyway.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::block::Tokenizer;
use crate::error::{snippet, Error, Result};

/// Any run of characters other than newline and printable ASCII.
static UNSUPPORTED_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\na -~]+").unwrap());

/// An encoding declaration comment (`# -*- coding: latin-1 -*-`, `# vim: set fileencoding=...`).
static CODING_DECLARATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[ \t\x0c]*#.*?coding[:=][ \t]*[-\w.]+").unwrap());

/// Source text ready to be tokenized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source<'a> {
    text: Cow<'a, str>,
}

impl<'a> Source<'a> {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Tokenize this source lazily.
    pub fn tokens(&self) -> Tokenizer<'_> {
        Tokenizer::new(&self.text)
    }

    pub fn into_owned(self) -> Source<'static> {
        Source {
            text: Cow::Owned(self.text.into_owned()),
        }
    }
}

/// Conversion into a [`Source`].
pub trait IntoSource<'a> {
    fn into_source(self) -> Result<Source<'a>>;
}

impl<'a> IntoSource<'a> for Source<'a> {
    fn into_source(self) -> Result<Source<'a>> {
        Ok(self)
    }
}

impl<'a> IntoSource<'a> for &'a str {
    fn into_source(self) -> Result<Source<'a>> {
        Ok(Source {
            text: Cow::Borrowed(self),
        })
    }
}

impl IntoSource<'static> for String {
    fn into_source(self) -> Result<Source<'static>> {
        Ok(Source {
            text: Cow::Owned(self),
        })
    }
}

impl<'a> IntoSource<'a> for &'a [u8] {
    fn into_source(self) -> Result<Source<'a>> {
        match std::str::from_utf8(self) {
            Ok(text) => text.into_source(),
            Err(err) => Err(invalid_utf8(self, err)),
        }
    }
}

impl IntoSource<'static> for Vec<u8> {
    fn into_source(self) -> Result<Source<'static>> {
        String::from_utf8(self)
            .map_err(|err| invalid_utf8(err.as_bytes(), err.utf8_error()))?
            .into_source()
    }
}

fn invalid_utf8(bytes: &[u8], err: std::str::Utf8Error) -> Error {
    let offset = err.valid_up_to();
    let end = (offset + 4).min(bytes.len());
    Error::UnsupportedEncoding {
        offset,
        reason: "invalid UTF-8",
        snippet: String::from_utf8_lossy(&bytes[offset..end]).into_owned(),
    }
}

/// A sequence of lines. A line terminator is added to every line that lacks one.
#[derive(Debug, Clone)]
pub struct Lines<I>(pub I);

impl<'a, I, S> IntoSource<'a> for Lines<I>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fn into_source(self) -> Result<Source<'a>> {
        let mut text = String::new();
        for line in self.0 {
            let line = line.as_ref();
            text.push_str(line);
            if !line.ends_with('\n') {
                text.push('\n');
            }
        }
        text.into_source()
    }
}

/// Reject input the minifiers are not prepared to reproduce faithfully.
pub fn check_input(source: &str) -> Result<()> {
    let mut offset = 0;
    for line in source.split_inclusive('\n').take(2) {
        if CODING_DECLARATION.is_match(line) {
            return Err(Error::UnsupportedEncoding {
                offset,
                reason: "coding declarations are not supported",
                snippet: snippet(source, offset),
            });
        }
        offset += line.len();
    }
    if let Some(found) = UNSUPPORTED_CHARS.find(source) {
        return Err(Error::UnsupportedEncoding {
            offset: found.start(),
            reason: "unsupported characters",
            snippet: found.as_str().chars().take(crate::error::SNIPPET_LEN).collect(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_adapter_terminates_lines() {
        let source = Lines(["x = 1", "y = 2\n"]).into_source().unwrap();
        assert_eq!(source.as_str(), "x = 1\ny = 2\n");
    }

    #[test]
    fn test_bytes_adapter_reports_invalid_utf8() {
        let bytes: &[u8] = b"x = 1\n\xff\n";
        let err = bytes.into_source().unwrap_err();
        assert!(matches!(err, Error::UnsupportedEncoding { offset: 6, .. }));
    }

    #[test]
    fn test_owned_bytes_adapter() {
        let source = b"pass\n".to_vec().into_source().unwrap();
        assert_eq!(source.as_str(), "pass\n");
    }

    #[test]
    fn test_check_input_accepts_printable_ascii() {
        assert!(check_input("def f(x):\n  return x ~ 1\n").is_ok());
    }

    #[test]
    fn test_check_input_rejects_tabs_and_non_ascii() {
        let err = check_input("x = 1\n\ty = 2\n").unwrap_err();
        assert!(matches!(err, Error::UnsupportedEncoding { offset: 6, .. }));
        let err = check_input("s = '\u{e9}t\u{e9}'\n").unwrap_err();
        assert!(matches!(err, Error::UnsupportedEncoding { offset: 5, .. }));
    }

    #[test]
    fn test_check_input_rejects_coding_declaration() {
        let err = check_input("#!/usr/bin/env python\n# -*- coding: utf-8 -*-\nx = 1\n").unwrap_err();
        assert!(matches!(err, Error::UnsupportedEncoding { offset: 22, .. }));
        // Only the first two lines count.
        assert!(check_input("a = 1\nb = 2\n# coding: utf-8\n").is_ok());
    }
}
