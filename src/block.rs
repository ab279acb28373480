//! Block language (Python) minification
//!
//! Structure:
//!     Raw tokens are produced by a logos lexer ([tokens]). The [tokenizer] layers the
//!     logical-line rules of the language on top: implicit joining inside brackets,
//!     backslash continuations, and the indentation stack that turns leading whitespace
//!     into Indent and Dedent tokens. The result has the same shape as the standard
//!     tokenizer of the language (NAME, NUMBER, STRING, OP, COMMENT, NEWLINE, NL, INDENT,
//!     DEDENT, ENDMARKER).
//!
//!     The [minifier] is a state machine over that stream. It only ever decides, token by
//!     token, whether to write indentation, a separating space, a newline, a placeholder
//!     statement, or nothing. It never reorders or rewrites a token.
//!
//!     The [validate] module is the safety net: both the input and the minified output must
//!     pass a strict syntax check, and their normalized token streams must agree.
//!
//! Indentation Handling
//!
//!     Output indentation is one space per level, whatever the input used. Since blocks are
//!     only ever opened by an Indent token and closed by a Dedent token, the depth counter is
//!     all the minifier needs; the widths live in the tokenizer's indentation stack.

pub mod minifier;
pub mod tokenizer;
pub mod tokens;
pub mod validate;

pub use minifier::{
    minify, minify_source, minify_str, minify_to_writer, needs_separator, Fragment, Minifier,
};
pub use tokenizer::{tokenize, Tokenizer};
pub use tokens::{Token, TokenKind};
pub use validate::{check_equivalence, minify_file, validate, MinifyOptions};
