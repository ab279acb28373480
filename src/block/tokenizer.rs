//! Logical-line tokenizer
//!
//!     Raw logos tokens know nothing about lines or blocks. This stage is a stateful machine
//!     over them that produces the token stream of the language's standard tokenizer:
//!
//!     - A physical newline ends a logical line only outside brackets and only when the line
//!       has content. Otherwise it becomes an Nl token (blank line, comment-only line, or
//!       implicit joining inside brackets).
//!     - A backslash-newline joins two physical lines and produces no token.
//!     - At the first token of each logical line the indentation column is compared with the
//!       indentation stack: a deeper column pushes and emits Indent, a shallower one pops
//!       and emits one Dedent per level. A column that matches no enclosing level is an error.
//!     - At the end of input a missing final Newline is synthesized, open blocks are closed
//!       with Dedent tokens, and End is emitted.
//!
//!     Tokens are produced lazily: the tokenizer only reads as far as the consumer pulls.

use std::collections::VecDeque;
use std::ops::Range;

use logos::Logos;

use super::tokens::{RawError, RawToken, Token, TokenKind};
use crate::error::{Error, Result};

/// Pull-based tokenizer over a source string.
pub struct Tokenizer<'src> {
    source: &'src str,
    raw: logos::Lexer<'src, RawToken>,
    pending: VecDeque<Token<'src>>,
    /// Indentation columns of the enclosing blocks; never empty.
    indents: Vec<usize>,
    /// Open brackets with their byte offsets.
    brackets: Vec<(u8, usize)>,
    /// Offset of the current physical line.
    line_start: usize,
    /// No token has been seen yet on the current logical line.
    at_line_start: bool,
    finished: bool,
}

impl<'src> Tokenizer<'src> {
    pub fn new(source: &'src str) -> Self {
        Tokenizer {
            source,
            raw: RawToken::lexer(source),
            pending: VecDeque::new(),
            indents: vec![0],
            brackets: Vec::new(),
            line_start: 0,
            at_line_start: true,
            finished: false,
        }
    }

    fn push(&mut self, kind: TokenKind, span: Range<usize>) {
        let source = self.source;
        let text = &source[span.clone()];
        self.pending.push_back(Token::new(kind, text, span));
    }

    fn push_raw(&mut self, raw: RawToken, span: Range<usize>) -> Result<()> {
        match raw {
            RawToken::Comment => self.push(TokenKind::Comment, span),
            RawToken::Newline => {
                if self.at_line_start || !self.brackets.is_empty() {
                    self.push(TokenKind::Nl, span.clone());
                } else {
                    self.push(TokenKind::Newline, span.clone());
                    self.at_line_start = true;
                }
                self.line_start = span.end;
            }
            RawToken::Continuation => self.line_start = span.end,
            RawToken::Name | RawToken::Number | RawToken::String | RawToken::Op => {
                self.begin_line(span.start)?;
                let kind = match raw {
                    RawToken::Name => TokenKind::Name,
                    RawToken::Number => TokenKind::Number,
                    RawToken::String => TokenKind::String,
                    _ => TokenKind::Op,
                };
                self.push(kind, span);
            }
            RawToken::Open => {
                self.begin_line(span.start)?;
                self.brackets.push((self.source.as_bytes()[span.start], span.start));
                self.push(TokenKind::Op, span);
            }
            RawToken::Close => {
                self.begin_line(span.start)?;
                let close = self.source.as_bytes()[span.start];
                match self.brackets.pop() {
                    None => {
                        return Err(Error::syntax(
                            self.source,
                            span.start,
                            format!("unmatched '{}'", close as char),
                        ));
                    }
                    Some((open, _)) if matching_close(open) != close => {
                        return Err(Error::syntax(
                            self.source,
                            span.start,
                            format!(
                                "closing '{}' does not match opening '{}'",
                                close as char, open as char
                            ),
                        ));
                    }
                    Some(_) => {}
                }
                self.push(TokenKind::Op, span);
            }
        }
        Ok(())
    }

    /// Emit Indent/Dedent tokens if `offset` holds the first token of a logical line.
    fn begin_line(&mut self, offset: usize) -> Result<()> {
        if !self.at_line_start {
            return Ok(());
        }
        self.at_line_start = false;

        let column = indentation_column(&self.source[self.line_start..offset]);
        let current = self.current_indent();
        if column > current {
            self.indents.push(column);
            self.push(TokenKind::Indent, self.line_start..offset);
        } else if column < current {
            while column < self.current_indent() {
                self.indents.pop();
                self.push(TokenKind::Dedent, offset..offset);
            }
            if column != self.current_indent() {
                return Err(Error::syntax(
                    self.source,
                    offset,
                    "unindent does not match any outer indentation level",
                ));
            }
        }
        Ok(())
    }

    fn current_indent(&self) -> usize {
        self.indents.last().copied().unwrap_or(0)
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(&(open, offset)) = self.brackets.last() {
            return Err(Error::syntax(
                self.source,
                offset,
                format!("'{}' was never closed", open as char),
            ));
        }
        let end = self.source.len();
        if !self.at_line_start {
            self.push(TokenKind::Newline, end..end);
            self.at_line_start = true;
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent, end..end);
        }
        self.push(TokenKind::End, end..end);
        Ok(())
    }

    fn raw_error(&self, error: RawError, span: Range<usize>) -> Error {
        Error::syntax(self.source, span.start, error.message())
    }
}

impl<'src> Iterator for Tokenizer<'src> {
    type Item = Result<Token<'src>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Some(Ok(token));
            }
            if self.finished {
                return None;
            }
            let step = match self.raw.next() {
                Some(Ok(raw)) => {
                    let span = self.raw.span();
                    self.push_raw(raw, span)
                }
                Some(Err(error)) => Err(self.raw_error(error, self.raw.span())),
                None => {
                    self.finished = true;
                    self.finish()
                }
            };
            if let Err(error) = step {
                self.finished = true;
                self.pending.clear();
                return Some(Err(error));
            }
        }
    }
}

fn matching_close(open: u8) -> u8 {
    match open {
        b'(' => b')',
        b'[' => b']',
        _ => b'}',
    }
}

/// Column reached after `whitespace`: tabs advance to the next multiple of eight and a
/// form feed resets the column.
fn indentation_column(whitespace: &str) -> usize {
    whitespace.bytes().fold(0, |column, byte| match byte {
        b'\t' => (column / 8 + 1) * 8,
        b'\x0c' => 0,
        _ => column + 1,
    })
}

/// Tokenize a whole source string.
pub fn tokenize(source: &str) -> Result<Vec<Token<'_>>> {
    Tokenizer::new(source).collect()
}
