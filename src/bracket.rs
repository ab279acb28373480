//! Bracket language (PostScript) minification
//!
//!     PostScript has no significant indentation: grouping is spelled out with `{ }`, `[ ]`,
//!     `<< >>` and parenthesized strings. A single regular expression is enough to split it
//!     into tokens ([lexer]); the [minifier] then drops comments and whitespace and puts
//!     back exactly one space where two bare tokens would otherwise fuse.
//!
//!     Only the subset used by procsets is supported. Hex strings (`<0a>`), ASCII85 strings
//!     and strings with unescaped nested parentheses are rejected rather than passed
//!     through.
//!
//!     [procsets] handles tables of named procsets kept in a definitions file: it parses the
//!     file, drops private names, minifies each literal and serializes the table into a
//!     single assignment that splits back into the literals at load time.

pub mod lexer;
pub mod minifier;
pub mod procsets;

pub use lexer::{BracketKind, BracketLexer, BracketToken};
pub use minifier::minify_postscript;
pub use procsets::{minify_procsets, parse_definitions, DefinitionTable, ProcsetOptions};
