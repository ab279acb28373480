//! Block language minifier
//!
//!     Converts a token stream back into source text, keeping only what the language needs
//!     to read the same tokens again:
//!
//!     - Comments and blank lines are dropped.
//!     - Indentation is one space per block level.
//!     - Newlines inside brackets and backslash continuations disappear, so a logical line
//!       always becomes one physical line.
//!     - Inside a line, a space is written only where two tokens would otherwise merge.
//!     - Statements made only of string literals at the top of a module or block (doc
//!       strings) are dropped.
//!     - A block left without statements gets a `pass` placeholder.
//!
//!     The minifier is an iterator of [`Fragment`]s. It pulls tokens on demand and never
//!     builds the output itself; [`minify`] feeds the fragments to a callback, the other
//!     helpers wrap that for strings and writers.
//!
//! Doc Strings
//!
//!     A string token at the start of a logical line, while the enclosing block has not
//!     emitted a statement yet, is held back rather than written. If the logical line ends
//!     with nothing but string tokens the whole statement is dropped. If anything else
//!     follows (`"-".join(parts)`), the held strings are written out first and the line is
//!     kept intact. Dropping repeats for consecutive leading string statements, which keeps
//!     minification idempotent.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::io::Write;

use log::{debug, trace};

use super::tokenizer::Tokenizer;
use super::tokens::{Token, TokenKind};
use crate::error::{Error, Result};
use crate::source::IntoSource;

/// The statement written into blocks that lost all their content.
pub const PLACEHOLDER: &str = "pass";

const SPACES: &str = "                                ";

/// A piece of minified output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fragment<'src> {
    /// Indentation for the given depth.
    Indent(usize),
    /// A space separating two tokens that would otherwise merge.
    Space,
    Newline,
    /// Token text, copied verbatim.
    Text(&'src str),
}

impl<'src> Fragment<'src> {
    pub fn as_str(&self) -> Cow<'src, str> {
        match *self {
            Fragment::Indent(depth) if depth <= SPACES.len() => Cow::Borrowed(&SPACES[..depth]),
            Fragment::Indent(depth) => Cow::Owned(" ".repeat(depth)),
            Fragment::Space => Cow::Borrowed(" "),
            Fragment::Newline => Cow::Borrowed("\n"),
            Fragment::Text(text) => Cow::Borrowed(text),
        }
    }
}

/// Token-driven minifier state machine.
pub struct Minifier<'src, I> {
    tokens: I,
    depth: usize,
    /// Nothing has been written on the current output line.
    at_bol: bool,
    /// The innermost block was opened and has not written a statement yet.
    empty_block: bool,
    /// The current block (or the module) has not written a statement yet.
    doc_position: bool,
    /// Last token written on the current line.
    prev: Option<Token<'src>>,
    /// Leading string tokens waiting for the rest of their line.
    held: Vec<Token<'src>>,
    queue: VecDeque<Fragment<'src>>,
    done: bool,
}

impl<'src, I> Minifier<'src, I>
where
    I: Iterator<Item = Result<Token<'src>>>,
{
    pub fn new(tokens: I) -> Self {
        Minifier {
            tokens,
            depth: 0,
            at_bol: true,
            empty_block: false,
            doc_position: true,
            prev: None,
            held: Vec::new(),
            queue: VecDeque::new(),
            done: false,
        }
    }

    fn feed(&mut self, token: Token<'src>) -> Result<()> {
        match token.kind {
            TokenKind::Indent => {
                self.depth += 1;
                self.empty_block = true;
                self.doc_position = true;
            }
            TokenKind::Dedent => {
                if self.depth == 0 {
                    return Err(Error::Invariant(format!(
                        "dedent below the top level at byte {}",
                        token.span.start
                    )));
                }
                if self.empty_block {
                    self.placeholder();
                }
                self.depth -= 1;
                self.doc_position = false;
            }
            TokenKind::Newline => {
                self.drop_held();
                if !self.at_bol {
                    self.queue.push_back(Fragment::Newline);
                }
                self.at_bol = true;
                self.prev = None;
            }
            TokenKind::Comment | TokenKind::Nl => {}
            TokenKind::End => {
                self.drop_held();
                if self.depth != 0 {
                    return Err(Error::Invariant(format!(
                        "end of input inside {} open block(s)",
                        self.depth
                    )));
                }
            }
            TokenKind::String if self.at_bol && self.doc_position => self.held.push(token),
            _ => {
                for held in std::mem::take(&mut self.held) {
                    self.emit(held);
                }
                self.emit(token);
            }
        }
        Ok(())
    }

    fn emit(&mut self, token: Token<'src>) {
        if self.at_bol {
            if self.depth > 0 {
                self.queue.push_back(Fragment::Indent(self.depth));
            }
            self.at_bol = false;
        }
        if let Some(prev) = &self.prev {
            if needs_separator(prev, &token) {
                self.queue.push_back(Fragment::Space);
            }
        }
        self.queue.push_back(Fragment::Text(token.text));
        self.empty_block = false;
        self.doc_position = false;
        self.prev = Some(token);
    }

    fn drop_held(&mut self) {
        if let Some(first) = self.held.first() {
            trace!("dropping doc string statement at byte {}", first.span.start);
            self.held.clear();
        }
    }

    fn placeholder(&mut self) {
        trace!("inserting placeholder at depth {}", self.depth);
        self.queue.push_back(Fragment::Indent(self.depth));
        self.queue.push_back(Fragment::Text(PLACEHOLDER));
        self.queue.push_back(Fragment::Newline);
        self.empty_block = false;
    }

    fn finish(&mut self) {
        self.drop_held();
        if self.empty_block {
            self.placeholder();
        }
    }
}

impl<'src, I> Iterator for Minifier<'src, I>
where
    I: Iterator<Item = Result<Token<'src>>>,
{
    type Item = Result<Fragment<'src>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(fragment) = self.queue.pop_front() {
                return Some(Ok(fragment));
            }
            if self.done {
                return None;
            }
            let step = match self.tokens.next() {
                Some(Ok(token)) => self.feed(token),
                Some(Err(error)) => Err(error),
                None => {
                    self.done = true;
                    self.finish();
                    Ok(())
                }
            };
            if let Err(error) = step {
                self.done = true;
                self.queue.clear();
                return Some(Err(error));
            }
        }
    }
}

/// Whether writing `next` right after `prev` would read back as different tokens.
///
/// Word characters on both sides merge (`if x`, `1 or`, `else r''`). A number is always
/// kept apart from a following dot or word (`1 .real`, `1. if`). An empty string followed by
/// the same quote opens a triple-quoted literal (`'' 'a'`).
pub fn needs_separator(prev: &Token<'_>, next: &Token<'_>) -> bool {
    let (Some(last), Some(first)) = (prev.text.chars().last(), next.text.chars().next()) else {
        return false;
    };
    if is_word_char(last) && is_word_char(first) {
        return true;
    }
    match prev.kind {
        TokenKind::Number => first == '.' || is_word_char(first),
        TokenKind::String => is_empty_short_string(prev.text) && first == last,
        _ => false,
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || !c.is_ascii()
}

/// `''`, `""`, `r''`, `b""` and friends.
fn is_empty_short_string(text: &str) -> bool {
    let body = text.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    body == "''" || body == "\"\""
}

/// Minify a token stream, passing each output piece to `output`.
///
/// The output ends with a newline unless it is empty.
pub fn minify<'src, T>(tokens: T, mut output: impl FnMut(&str)) -> Result<()>
where
    T: IntoIterator<Item = Result<Token<'src>>>,
{
    for fragment in Minifier::new(tokens.into_iter()) {
        output(&fragment?.as_str());
    }
    Ok(())
}

/// Minify any supported source into a string.
pub fn minify_source<'a>(input: impl IntoSource<'a>) -> Result<String> {
    let source = input.into_source()?;
    let mut minified = String::with_capacity(source.as_str().len() / 2);
    minify(source.tokens(), |piece| minified.push_str(piece))?;
    debug!(
        "minified {} bytes of source into {} bytes",
        source.as_str().len(),
        minified.len()
    );
    Ok(minified)
}

pub fn minify_str(source: &str) -> Result<String> {
    minify_source(source)
}

/// Minify `source` straight into a writer.
pub fn minify_to_writer<W: Write>(source: &str, writer: &mut W) -> Result<()> {
    for fragment in Minifier::new(Tokenizer::new(source)) {
        writer.write_all(fragment?.as_str().as_bytes())?;
    }
    Ok(())
}
