//! Token definitions for the block language
//!
//! [`RawToken`] is the logos lexer: it recognizes names, numbers, strings, operators,
//! brackets, comments, newlines and line continuations. Horizontal whitespace is skipped;
//! the tokenizer recovers indentation from token offsets instead.
//!
//! [`Token`] is what the rest of the crate sees: a [`TokenKind`] with the literal text and
//! byte span it was read from.

use std::ops::Range;

use logos::Logos;
use serde::Serialize;

/// Token categories of the block language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    Name,
    Number,
    String,
    Comment,
    /// End of a logical line.
    Newline,
    /// A newline that does not end a logical line: blank lines, comment-only lines, and
    /// newlines inside brackets.
    Nl,
    Indent,
    Dedent,
    End,
    /// Operators and brackets.
    Op,
}

impl TokenKind {
    /// Tokens that only exist for human readers.
    pub fn is_cosmetic(self) -> bool {
        matches!(self, TokenKind::Comment | TokenKind::Nl)
    }
}

/// A classified lexical unit with the text it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub text: &'src str,
    pub span: Range<usize>,
}

impl<'src> Token<'src> {
    pub fn new(kind: TokenKind, text: &'src str, span: Range<usize>) -> Self {
        Token { kind, text, span }
    }

    pub fn is_op(&self, op: &str) -> bool {
        self.kind == TokenKind::Op && self.text == op
    }
}

/// Errors raised by the raw lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RawError {
    #[default]
    UnexpectedCharacter,
    UnterminatedString,
}

impl RawError {
    pub fn message(self) -> &'static str {
        match self {
            RawError::UnexpectedCharacter => "unexpected character",
            RawError::UnterminatedString => "unterminated string literal",
        }
    }
}

/// Raw tokens produced by logos.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(error = RawError)]
#[logos(skip r"[ \t\x0c]+")]
pub enum RawToken {
    #[regex(r"[A-Za-z_\u{80}-\u{10FFFF}][A-Za-z0-9_\u{80}-\u{10FFFF}]*")]
    Name,

    // Decimal numbers are scanned by `lex_decimal` from their first digit (or `.digit`);
    // hex, octal and binary literals are plain patterns.
    #[regex(r"[0-9]", lex_decimal)]
    #[regex(r"\.[0-9]", lex_decimal)]
    #[regex(r"0[xX](_?[0-9a-fA-F])+")]
    #[regex(r"0[oO](_?[0-7])+")]
    #[regex(r"0[bB](_?[01])+")]
    Number,

    // Only the prefix and the opening quote are matched here; the body is scanned by
    // `lex_string` so single- and triple-quoted forms share one rule.
    #[regex(r#"([rR][bBfF]?|[bBfF][rR]?|[uU])?['"]"#, lex_string)]
    String,

    #[regex(r"#[^\r\n]*")]
    Comment,

    #[regex(r"\r?\n")]
    Newline,

    #[regex(r"\\\r?\n")]
    Continuation,

    #[token("(")]
    #[token("[")]
    #[token("{")]
    Open,

    #[token(")")]
    #[token("]")]
    #[token("}")]
    Close,

    #[regex(r"->|:=|\.\.\.|\*\*=?|//=?|>>=?|<<=?|[-+*/%@&|^=<>!]=|[-+*/%@&|^~<>=.,:;]")]
    Op,
}

/// Extend a decimal literal over its digits, fraction, exponent and imaginary suffix.
///
/// `e`/`E` only starts an exponent when a digit follows it (after an optional sign), so
/// `1else` reads as `1` followed by `else`.
fn lex_decimal(lex: &mut logos::Lexer<'_, RawToken>) {
    let text = &lex.source().as_bytes()[lex.span().start..];
    let mut end = digit_run(text);
    if text.get(end) == Some(&b'.') {
        end += 1 + digit_run(&text[end + 1..]);
    }
    if matches!(text.get(end), Some(b'e' | b'E')) {
        let sign = usize::from(matches!(text.get(end + 1), Some(b'+' | b'-')));
        let exponent = digit_run(&text[end + 1 + sign..]);
        if exponent > 0 {
            end += 1 + sign + exponent;
        }
    }
    if matches!(text.get(end), Some(b'j' | b'J')) {
        end += 1;
    }
    lex.bump(end - lex.slice().len());
}

/// Length of the digits at the start of `bytes`; single underscores may sit between digits.
fn digit_run(bytes: &[u8]) -> usize {
    let mut len = 0;
    while len < bytes.len() {
        if bytes[len].is_ascii_digit() {
            len += 1;
        } else if bytes[len] == b'_' && len > 0 && bytes.get(len + 1).map_or(false, u8::is_ascii_digit) {
            len += 2;
        } else {
            break;
        }
    }
    len
}

/// Scan the body of a string literal whose prefix and opening quote were just matched.
///
/// A backslash always protects the next byte, raw strings included: `r'\''` is one literal.
/// Single-quoted literals may not contain an unescaped newline.
fn lex_string(lex: &mut logos::Lexer<'_, RawToken>) -> Result<(), RawError> {
    let quote = lex.slice().as_bytes()[lex.slice().len() - 1];
    let rest = lex.remainder().as_bytes();
    let triple = rest.len() >= 2 && rest[0] == quote && rest[1] == quote;
    let mut i = if triple { 2 } else { 0 };

    while i < rest.len() {
        match rest[i] {
            b'\\' => i += 2,
            b'\n' if !triple => {
                lex.bump(i);
                return Err(RawError::UnterminatedString);
            }
            c if c == quote => {
                if !triple {
                    lex.bump(i + 1);
                    return Ok(());
                }
                if rest[i..].starts_with(&[quote; 3]) {
                    lex.bump(i + 3);
                    return Ok(());
                }
                i += 1;
            }
            _ => i += 1,
        }
    }

    lex.bump(rest.len());
    Err(RawError::UnterminatedString)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(source: &str) -> Vec<(Result<RawToken, RawError>, &str)> {
        let mut lexer = RawToken::lexer(source);
        let mut tokens = Vec::new();
        while let Some(result) = lexer.next() {
            tokens.push((result, lexer.slice()));
        }
        tokens
    }

    #[test]
    fn test_names_and_operators() {
        let tokens = lex_all("x += foo.bar**2");
        assert_eq!(
            tokens,
            vec![
                (Ok(RawToken::Name), "x"),
                (Ok(RawToken::Op), "+="),
                (Ok(RawToken::Name), "foo"),
                (Ok(RawToken::Op), "."),
                (Ok(RawToken::Name), "bar"),
                (Ok(RawToken::Op), "**"),
                (Ok(RawToken::Number), "2"),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        for number in ["0", "1_000", "3.14", "1.", ".5", "1e-9", "2.5E+3j", "0xFF", "0o17", "0b1010"] {
            let tokens = lex_all(number);
            assert_eq!(tokens, vec![(Ok(RawToken::Number), number)], "{number}");
        }
    }

    #[test]
    fn test_number_followed_by_attribute() {
        let tokens = lex_all("1 .real");
        assert_eq!(
            tokens,
            vec![
                (Ok(RawToken::Number), "1"),
                (Ok(RawToken::Op), "."),
                (Ok(RawToken::Name), "real"),
            ]
        );
    }

    #[test]
    fn test_exponent_requires_digits() {
        assert_eq!(
            lex_all("0else"),
            vec![(Ok(RawToken::Number), "0"), (Ok(RawToken::Name), "else")]
        );
        assert_eq!(
            lex_all("1e+x"),
            vec![
                (Ok(RawToken::Number), "1"),
                (Ok(RawToken::Name), "e"),
                (Ok(RawToken::Op), "+"),
                (Ok(RawToken::Name), "x"),
            ]
        );
        assert_eq!(
            lex_all("1.e5 2.else"),
            vec![
                (Ok(RawToken::Number), "1.e5"),
                (Ok(RawToken::Number), "2."),
                (Ok(RawToken::Name), "else"),
            ]
        );
    }

    #[test]
    fn test_underscore_must_separate_digits() {
        assert_eq!(
            lex_all("1_000 1_x"),
            vec![
                (Ok(RawToken::Number), "1_000"),
                (Ok(RawToken::Number), "1"),
                (Ok(RawToken::Name), "_x"),
            ]
        );
    }

    #[test]
    fn test_string_prefixes() {
        for literal in [r"'a'", r#""a""#, r"r'\d'", r"b'x'", r"Rb'x'", r"f'{x}'", r"u'x'"] {
            let tokens = lex_all(literal);
            assert_eq!(tokens, vec![(Ok(RawToken::String), literal)], "{literal}");
        }
    }

    #[test]
    fn test_empty_and_triple_quoted_strings() {
        assert_eq!(lex_all("''"), vec![(Ok(RawToken::String), "''")]);
        assert_eq!(lex_all("''''''"), vec![(Ok(RawToken::String), "''''''")]);
        assert_eq!(
            lex_all("\"\"\"a\n\"b\"\n\"\"\""),
            vec![(Ok(RawToken::String), "\"\"\"a\n\"b\"\n\"\"\"")]
        );
    }

    #[test]
    fn test_escaped_quotes() {
        assert_eq!(lex_all(r"'it\'s'"), vec![(Ok(RawToken::String), r"'it\'s'")]);
        assert_eq!(lex_all(r"r'\''"), vec![(Ok(RawToken::String), r"r'\''")]);
    }

    #[test]
    fn test_unterminated_string() {
        let tokens = lex_all("'abc\nx");
        assert_eq!(tokens[0].0, Err(RawError::UnterminatedString));
    }

    #[test]
    fn test_comment_newline_and_continuation() {
        let tokens = lex_all("a # note\nb \\\nc");
        assert_eq!(
            tokens,
            vec![
                (Ok(RawToken::Name), "a"),
                (Ok(RawToken::Comment), "# note"),
                (Ok(RawToken::Newline), "\n"),
                (Ok(RawToken::Name), "b"),
                (Ok(RawToken::Continuation), "\\\n"),
                (Ok(RawToken::Name), "c"),
            ]
        );
    }

    #[test]
    fn test_unexpected_character() {
        let tokens = lex_all("a $ b");
        assert_eq!(tokens[1].0, Err(RawError::UnexpectedCharacter));
    }
}
