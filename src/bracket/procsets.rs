//! Procset definition tables
//!
//!     A definitions file is a block language module made only of assignments of string
//!     literals to names, optionally with doc strings, comments and blank lines:
//!
//!         """Procsets used by the printer backend."""
//!         header = r'''
//!         /F { findfont exch scalefont setfont } bind def
//!         '''
//!         __draft = '% not shipped'
//!
//!     The file is parsed, never executed. Names starting with the private prefix are
//!     discarded; every other value must be a plain text string. [`minify_procsets`] minifies
//!     each literal as PostScript and writes the whole table as one assignment:
//!
//!         header,=r'''/F{findfont exch scalefont setfont}bind def
//!         '''.split('\n%%')
//!
//!     With several names the literals are joined by a newline plus the delimiter, so the
//!     `split` hands them back in name order.

use std::collections::BTreeMap;
use std::ops::Range;

use chumsky::{prelude::*, Stream};
use log::{debug, trace};
use serde::Deserialize;

use super::minifier::minify_postscript;
use crate::block::tokenizer::tokenize;
use crate::block::tokens::TokenKind;
use crate::block::validate::validate;
use crate::error::{Error, Result};

/// Marker that would close the raw triple-quoted blob early.
const BLOB_QUOTE: &str = "'''";

/// Names mapped to their decoded literal text, in name order.
pub type DefinitionTable = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProcsetOptions {
    /// Names starting with this prefix are not emitted.
    pub private_prefix: String,
    /// Marker placed after the newline that separates literals in the blob.
    pub delimiter: String,
}

impl Default for ProcsetOptions {
    fn default() -> Self {
        ProcsetOptions {
            private_prefix: "__".to_string(),
            delimiter: "%%".to_string(),
        }
    }
}

/// Token kind with its text.
type TokenText = (TokenKind, String);
type ParserError = Simple<TokenText>;

#[derive(Debug, Clone)]
enum Statement {
    Definition {
        name: String,
        value: Vec<TokenText>,
        span: Range<usize>,
    },
    DocString,
}

fn kind(expected: TokenKind) -> impl Parser<TokenText, TokenText, Error = ParserError> + Clone {
    filter(move |(kind, _): &TokenText| *kind == expected)
}

fn op(expected: &'static str) -> impl Parser<TokenText, TokenText, Error = ParserError> + Clone {
    filter(move |(kind, text): &TokenText| *kind == TokenKind::Op && text == expected)
}

/// Statements of a definitions module, up to the end marker.
fn definitions_parser() -> impl Parser<TokenText, Vec<Statement>, Error = ParserError> {
    let newline = kind(TokenKind::Newline).ignored();

    let value_token = filter::<TokenText, _, ParserError>(|(kind, text): &TokenText| {
        !matches!(
            kind,
            TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent | TokenKind::End
        ) && !(*kind == TokenKind::Op && (text == "=" || text == ";"))
    });

    let definition = kind(TokenKind::Name)
        .map(|(_, name)| name)
        .then_ignore(op("="))
        .then(value_token.repeated().at_least(1))
        .then_ignore(newline.clone())
        .map_with_span(|(name, value), span| Statement::Definition { name, value, span });

    let doc_string = kind(TokenKind::String)
        .repeated()
        .at_least(1)
        .then_ignore(newline)
        .to(Statement::DocString);

    definition
        .or(doc_string)
        .repeated()
        .then_ignore(kind(TokenKind::End))
        .then_ignore(end())
}

fn parse_error(source: &str, error: &ParserError) -> Error {
    let message = match error.found() {
        Some((TokenKind::Newline, _)) => "expected a string literal assignment".to_string(),
        Some((kind, text)) => format!("unexpected {:?} {:?} in definitions", kind, text),
        None => "unexpected end of definitions".to_string(),
    };
    Error::syntax(source, error.span().start, message)
}

/// Parse a definitions file into its table, without the private names.
pub fn parse_definitions(source: &str, options: &ProcsetOptions) -> Result<DefinitionTable> {
    validate(source)?;

    let tokens: Vec<_> = tokenize(source)?
        .into_iter()
        .filter(|token| !token.kind.is_cosmetic())
        .map(|token| ((token.kind, token.text.to_string()), token.span))
        .collect();
    let eoi = source.len()..source.len();
    let stream = Stream::from_iter(eoi, tokens.into_iter());
    let statements = definitions_parser()
        .parse(stream)
        .map_err(|errors| match errors.first() {
            Some(error) => parse_error(source, error),
            None => Error::syntax(source, 0, "invalid definitions"),
        })?;

    let mut table = DefinitionTable::new();
    for statement in statements {
        let Statement::Definition { name, value, span } = statement else {
            continue;
        };
        if name.starts_with(&options.private_prefix) {
            trace!("skipping private definition {}", name);
            continue;
        }
        let parts = string_parts(&value)
            .map_err(|reason| Error::Invariant(format!("{}: {}", name, reason)))?;
        let mut literal = String::new();
        for part in parts {
            let decoded = decode_string(part)
                .map_err(|reason| Error::syntax(source, span.start, reason))?;
            literal.push_str(&decoded);
        }
        table.insert(name, literal);
    }
    Ok(table)
}

/// String literal tokens of an assigned value, which may be wrapped in parentheses.
fn string_parts(value: &[TokenText]) -> std::result::Result<Vec<&str>, String> {
    let mut inner = value;
    while let [(TokenKind::Op, open), rest @ .., (TokenKind::Op, close)] = inner {
        if open != "(" || close != ")" {
            break;
        }
        inner = rest;
    }
    let mut parts = Vec::with_capacity(inner.len());
    for (kind, text) in inner {
        if *kind != TokenKind::String {
            return Err(format!("expected a string literal, found {:?} {:?}", kind, text));
        }
        let prefix = string_prefix(text).to_ascii_lowercase();
        if prefix.contains('b') {
            return Err(format!("expected a text string, found bytes {}", text));
        }
        if prefix.contains('f') {
            return Err(format!("formatted strings are not allowed: {}", text));
        }
        parts.push(text.as_str());
    }
    if parts.is_empty() {
        return Err("expected a string literal".to_string());
    }
    Ok(parts)
}

fn string_prefix(literal: &str) -> &str {
    let quote = literal.find(['\'', '"']).unwrap_or(literal.len());
    &literal[..quote]
}

/// Value of a single text string literal, including its prefix and quotes.
fn decode_string(literal: &str) -> std::result::Result<String, &'static str> {
    let prefix = string_prefix(literal);
    let quoted = &literal[prefix.len()..];
    let quote_len = if quoted.len() >= 6 && (quoted.starts_with("'''") || quoted.starts_with("\"\"\"")) {
        3
    } else {
        1
    };
    if quoted.len() < 2 * quote_len {
        return Err("malformed string literal");
    }
    let body = &quoted[quote_len..quoted.len() - quote_len];
    if prefix.contains(['r', 'R']) {
        Ok(body.to_string())
    } else {
        unescape(body)
    }
}

fn unescape(body: &str) -> std::result::Result<String, &'static str> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            None => out.push('\\'),
            Some('\n') => {}
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('f') => out.push('\x0c'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('v') => out.push('\x0b'),
            Some(digit @ '0'..='7') => {
                let mut value = digit.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(value).ok_or("invalid octal escape")?);
            }
            Some('x') => out.push(hex_escape(&mut chars, 2).ok_or("truncated \\xXX escape")?),
            Some('u') => out.push(hex_escape(&mut chars, 4).ok_or("truncated \\uXXXX escape")?),
            Some('U') => {
                out.push(hex_escape(&mut chars, 8).ok_or("invalid \\UXXXXXXXX escape")?)
            }
            Some('N') => return Err("named unicode escapes are not supported"),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Ok(out)
}

fn hex_escape(chars: &mut impl Iterator<Item = char>, digits: usize) -> Option<char> {
    let mut value = 0u32;
    for _ in 0..digits {
        value = value * 16 + chars.next()?.to_digit(16)?;
    }
    char::from_u32(value)
}

/// Minify every public literal of a definitions file and serialize the table.
///
/// Returns an empty string when no public definitions remain.
pub fn minify_procsets(source: &str, options: &ProcsetOptions) -> Result<String> {
    let table = parse_definitions(source, options)?;
    if table.is_empty() {
        return Ok(String::new());
    }

    let separator = format!("\n{}", options.delimiter);
    let mut names = Vec::with_capacity(table.len());
    let mut literals = Vec::with_capacity(table.len());
    for (name, literal) in &table {
        let minified = minify_postscript(literal).map_err(|error| error.in_file(name))?;
        if minified.contains(options.delimiter.as_str()) {
            return Err(Error::Invariant(format!(
                "{}: minified procset contains the delimiter {:?}",
                name, options.delimiter
            )));
        }
        debug!("procset {}: {} -> {} bytes", name, literal.len(), minified.len());
        names.push(name.as_str());
        literals.push(minified);
    }

    let blob = literals.join(&separator);
    if blob.contains(BLOB_QUOTE) {
        return Err(Error::Invariant(format!(
            "minified procsets contain {}",
            BLOB_QUOTE
        )));
    }
    let targets = match names.as_slice() {
        [single] => format!("{},", single),
        _ => names.join(","),
    };
    let output = format!("{}=r'''{}\n'''.split({:?})\n", targets, blob, separator);
    validate(&output)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(source: &str) -> DefinitionTable {
        parse_definitions(source, &ProcsetOptions::default()).unwrap()
    }

    #[test]
    fn test_parse_simple_table() {
        let parsed = table("\"\"\"Doc.\"\"\"\n# comment\n\nb = '2'\na = r'''\n1\n'''\n");
        assert_eq!(
            parsed.into_iter().collect::<Vec<_>>(),
            vec![("a".to_string(), "\n1\n".to_string()), ("b".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn test_implicit_concatenation_in_parentheses() {
        let parsed = table("p = ('a '\n     \"b\")\n");
        assert_eq!(parsed["p"], "a b");
    }

    #[test]
    fn test_later_assignment_wins() {
        assert_eq!(table("x = '1'\nx = '2'\n")["x"], "2");
    }

    #[test]
    fn test_private_names_are_discarded_before_type_check() {
        let parsed = table("__version = 3\npublic = 'x'\n");
        assert_eq!(parsed.keys().collect::<Vec<_>>(), vec!["public"]);
    }

    #[test]
    fn test_non_text_values_are_rejected() {
        for source in ["n = 3\n", "b = b'x'\n", "f = f'{x}'\n", "e = 'a' + 'b'\n"] {
            let err = parse_definitions(source, &ProcsetOptions::default()).unwrap_err();
            assert!(matches!(err, Error::Invariant(_)), "{source}: {err}");
        }
    }

    #[test]
    fn test_other_statements_are_syntax_errors() {
        let err = parse_definitions("import os\n", &ProcsetOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }), "{err}");
        let err =
            parse_definitions("if x:\n    a = '1'\n", &ProcsetOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }), "{err}");
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"a\nb\tc").unwrap(), "a\nb\tc");
        assert_eq!(unescape(r"\101\x42\u0043").unwrap(), "ABC");
        assert_eq!(unescape(r"\(x\)").unwrap(), r"\(x\)");
        assert_eq!(unescape("line\\\nnext").unwrap(), "linenext");
        assert!(unescape(r"\x4").is_err());
    }

    #[test]
    fn test_decode_prefixes_and_quotes() {
        assert_eq!(decode_string(r"r'\n'").unwrap(), r"\n");
        assert_eq!(decode_string(r"'\n'").unwrap(), "\n");
        assert_eq!(decode_string("''").unwrap(), "");
        assert_eq!(decode_string("''''''").unwrap(), "");
        assert_eq!(decode_string("U\"\"\"a\"b\"\"\"").unwrap(), "a\"b");
    }

    #[test]
    fn test_minify_two_procsets() {
        let source = "b = '/B { 2 } def'\na = '''\n% a comment\n/A { 1 } def\n'''\n";
        assert_eq!(
            minify_procsets(source, &ProcsetOptions::default()).unwrap(),
            "a,b=r'''/A{1}def\n%%/B{2}def\n'''.split(\"\\n%%\")\n"
        );
    }

    #[test]
    fn test_single_procset_keeps_tuple_unpacking() {
        let output = minify_procsets("only = '/X 1 def'\n", &ProcsetOptions::default()).unwrap();
        assert!(output.starts_with("only,=r'''/X 1 def\n'''"), "{output}");
    }

    #[test]
    fn test_empty_table() {
        let output = minify_procsets("'''Nothing here.'''\n", &ProcsetOptions::default()).unwrap();
        assert_eq!(output, "");
    }

    #[test]
    fn test_delimiter_in_literal_is_an_error() {
        let err = minify_procsets("p = '(100%%) show'\n", &ProcsetOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Invariant(_)), "{err}");
    }

    #[test]
    fn test_blob_quote_in_literal_is_an_error() {
        let err =
            minify_procsets("p = \"(''') show\"\n", &ProcsetOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Invariant(_)), "{err}");
    }

    #[test]
    fn test_unsupported_postscript_names_the_procset() {
        let err = minify_procsets("p = '(a(b)c)'\n", &ProcsetOptions::default()).unwrap_err();
        assert!(err.to_string().starts_with("p: "), "{err}");
        assert!(matches!(err.root(), Error::UnsupportedSyntax { .. }));
    }
}
