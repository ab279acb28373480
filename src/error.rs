//! Error types shared by both minifiers.
//!
//!     Every failure is fatal for the unit being processed (one source file or one
//!     definitions table). Positional errors carry the byte offset into the input and a
//!     short snippet starting there so the offending construct can be found quickly.

use thiserror::Error;

/// Maximum number of characters quoted from the input in an error message.
pub const SNIPPET_LEN: usize = 20;

/// Errors produced while checking, tokenizing, minifying or validating input.
#[derive(Debug, Error)]
pub enum Error {
    /// Input contains bytes outside newline + printable ASCII, or declares an encoding.
    #[error("unsupported input encoding at byte {offset}: {reason}: {snippet:?}")]
    UnsupportedEncoding {
        offset: usize,
        reason: &'static str,
        snippet: String,
    },

    /// Input (or minified output) does not tokenize or fails the structural check.
    #[error("syntax error at byte {offset}: {message}: {snippet:?}")]
    Syntax {
        offset: usize,
        message: String,
        snippet: String,
    },

    /// The bracket-language scanner met a construct it does not support.
    #[error("unsupported syntax at byte {offset}: {snippet:?}")]
    UnsupportedSyntax { offset: usize, snippet: String },

    /// A required marker appeared in minified content, a table value had the
    /// wrong type, or minified output diverged from its input.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Wraps any other error with the name of the file being processed. The inner message
    /// is part of the display, not a separate `source`.
    #[error("{file}: {error}")]
    InFile { file: String, error: Box<Error> },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Archive(#[from] zip::result::ZipError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn syntax(source: &str, offset: usize, message: impl Into<String>) -> Self {
        Error::Syntax {
            offset,
            message: message.into(),
            snippet: snippet(source, offset),
        }
    }

    pub fn unsupported_syntax(source: &str, offset: usize) -> Self {
        Error::UnsupportedSyntax {
            offset,
            snippet: snippet(source, offset),
        }
    }

    /// Attach a file name to this error.
    pub fn in_file(self, file: impl Into<String>) -> Self {
        Error::InFile {
            file: file.into(),
            error: Box::new(self),
        }
    }

    /// The innermost error, skipping file-name wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::InFile { error, .. } => error.root(),
            other => other,
        }
    }
}

/// Up to [`SNIPPET_LEN`] characters of `source` starting at byte `offset`.
pub fn snippet(source: &str, offset: usize) -> String {
    let mut start = offset.min(source.len());
    while !source.is_char_boundary(start) {
        start -= 1;
    }
    source[start..].chars().take(SNIPPET_LEN).collect()
}
