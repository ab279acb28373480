//! # srcmin
//!
//! Token-stream minifiers for shipping source code in a small single-file bundle.
//!
//! - [block]: an indentation-sensitive language (Python 3). Comments, blank lines, doc
//!   strings and redundant whitespace are removed, indentation is reduced to one space per
//!   level, and every result is validated against its input.
//! - [bracket]: a bracket-delimited language (PostScript procsets), plus the definitions
//!   tables that carry named procsets inside a block language module.
//! - [bundle]: writes minified entries through an archive interface and assembles the
//!   single executable file.
//!
//! Configuration is layered over embedded defaults by [config]; every failure is an
//! [`Error`].

pub mod block;
pub mod bracket;
pub mod bundle;
pub mod config;
pub mod error;
pub mod source;

pub use error::{Error, Result};
pub use source::{IntoSource, Lines, Source};
