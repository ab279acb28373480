//! Validation gate for block language minification
//!
//!     Minification must never ship code that reads differently from its input. Three
//!     checks guard it:
//!
//!     1. [`validate`]: a strict syntax check. The source must tokenize completely
//!        (strings terminated, brackets balanced, dedents consistent), every indented block
//!        must be introduced by a line ending in `:`, and every such line must be followed
//!        by an indented block. The source is then parsed with `rustpython-parser`, and the
//!        tree is checked for what the grammar leaves to the compiler: assignment targets,
//!        `return` outside a function, `break`/`continue` outside a loop.
//!     2. The same check on the minified output.
//!     3. [`check_equivalence`]: the two token streams, normalized, must be identical.
//!        Normalization removes what the minifier is allowed to remove (comments, blank
//!        lines, leading string statements) and reduces blocks holding a single `pass` to
//!        empty blocks, so an inserted placeholder compares equal to a dropped doc string.
//!
//!     [`minify_file`] runs the whole sequence for one named file.

use log::debug;
use rustpython_parser::ast::{self, Ranged};
use rustpython_parser::Parse;
use serde::Deserialize;

use super::minifier::{minify_str, PLACEHOLDER};
use super::tokenizer::tokenize;
use super::tokens::{Token, TokenKind};
use crate::error::{Error, Result};
use crate::source::check_input;

/// Which checks [`minify_file`] runs. All are enabled by default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MinifyOptions {
    pub check_input: bool,
    pub validate_input: bool,
    pub validate_output: bool,
    pub check_equivalence: bool,
}

impl Default for MinifyOptions {
    fn default() -> Self {
        MinifyOptions {
            check_input: true,
            validate_input: true,
            validate_output: true,
            check_equivalence: true,
        }
    }
}

/// Strict syntax check of block language source.
pub fn validate(source: &str) -> Result<()> {
    let tokens = tokenize(source)?;
    check_blocks(source, &tokens)?;
    let suite = ast::Suite::parse(source, "<input>").map_err(|error| {
        Error::syntax(source, usize::from(error.offset), error.error.to_string())
    })?;
    check_suite(source, &suite, Context::default())
}

/// Enclosing constructs of a statement.
#[derive(Debug, Clone, Copy, Default)]
struct Context {
    in_function: bool,
    in_loop: bool,
}

fn check_suite(source: &str, body: &[ast::Stmt], context: Context) -> Result<()> {
    body.iter()
        .try_for_each(|stmt| check_statement(source, stmt, context))
}

fn check_statement(source: &str, stmt: &ast::Stmt, context: Context) -> Result<()> {
    let offset = usize::from(stmt.start());
    let looping = Context {
        in_loop: true,
        ..context
    };
    match stmt {
        ast::Stmt::FunctionDef(ast::StmtFunctionDef { body, .. })
        | ast::Stmt::AsyncFunctionDef(ast::StmtAsyncFunctionDef { body, .. }) => {
            let function = Context {
                in_function: true,
                in_loop: false,
            };
            check_suite(source, body, function)
        }
        ast::Stmt::ClassDef(ast::StmtClassDef { body, .. }) => {
            check_suite(source, body, Context::default())
        }
        ast::Stmt::Return(_) if !context.in_function => {
            Err(Error::syntax(source, offset, "'return' outside function"))
        }
        ast::Stmt::Break(_) if !context.in_loop => {
            Err(Error::syntax(source, offset, "'break' outside loop"))
        }
        ast::Stmt::Continue(_) if !context.in_loop => {
            Err(Error::syntax(source, offset, "'continue' not properly in loop"))
        }
        ast::Stmt::Delete(ast::StmtDelete { targets, .. })
        | ast::Stmt::Assign(ast::StmtAssign { targets, .. }) => targets
            .iter()
            .try_for_each(|target| check_target(source, target)),
        ast::Stmt::AugAssign(ast::StmtAugAssign { target, .. })
        | ast::Stmt::AnnAssign(ast::StmtAnnAssign { target, .. }) => {
            check_single_target(source, target)
        }
        ast::Stmt::For(ast::StmtFor {
            target,
            body,
            orelse,
            ..
        })
        | ast::Stmt::AsyncFor(ast::StmtAsyncFor {
            target,
            body,
            orelse,
            ..
        }) => {
            check_target(source, target)?;
            check_suite(source, body, looping)?;
            check_suite(source, orelse, context)
        }
        ast::Stmt::While(ast::StmtWhile { body, orelse, .. }) => {
            check_suite(source, body, looping)?;
            check_suite(source, orelse, context)
        }
        ast::Stmt::If(ast::StmtIf { body, orelse, .. }) => {
            check_suite(source, body, context)?;
            check_suite(source, orelse, context)
        }
        ast::Stmt::With(ast::StmtWith { items, body, .. })
        | ast::Stmt::AsyncWith(ast::StmtAsyncWith { items, body, .. }) => {
            for item in items {
                if let Some(vars) = &item.optional_vars {
                    check_target(source, vars)?;
                }
            }
            check_suite(source, body, context)
        }
        ast::Stmt::Try(ast::StmtTry {
            body,
            handlers,
            orelse,
            finalbody,
            ..
        })
        | ast::Stmt::TryStar(ast::StmtTryStar {
            body,
            handlers,
            orelse,
            finalbody,
            ..
        }) => {
            check_suite(source, body, context)?;
            for handler in handlers {
                match handler {
                    ast::ExceptHandler::ExceptHandler(handler) => {
                        check_suite(source, &handler.body, context)?
                    }
                }
            }
            check_suite(source, orelse, context)?;
            check_suite(source, finalbody, context)
        }
        _ => Ok(()),
    }
}

/// Targets of `=`, `for`, `with ... as` and `del`.
fn check_target(source: &str, target: &ast::Expr) -> Result<()> {
    match target {
        ast::Expr::Name(_) | ast::Expr::Attribute(_) | ast::Expr::Subscript(_) => Ok(()),
        ast::Expr::Starred(ast::ExprStarred { value, .. }) => check_target(source, value),
        ast::Expr::Tuple(ast::ExprTuple { elts, .. })
        | ast::Expr::List(ast::ExprList { elts, .. }) => elts
            .iter()
            .try_for_each(|elt| check_target(source, elt)),
        other => Err(Error::syntax(
            source,
            usize::from(other.start()),
            "cannot assign to expression",
        )),
    }
}

/// Targets of augmented and annotated assignments: no unpacking.
fn check_single_target(source: &str, target: &ast::Expr) -> Result<()> {
    match target {
        ast::Expr::Name(_) | ast::Expr::Attribute(_) | ast::Expr::Subscript(_) => Ok(()),
        other => Err(Error::syntax(
            source,
            usize::from(other.start()),
            "illegal target for augmented or annotated assignment",
        )),
    }
}

fn check_blocks(source: &str, tokens: &[Token<'_>]) -> Result<()> {
    let mut last: Option<&Token<'_>> = None;
    // Offset of the `:` whose block has not been opened yet.
    let mut expecting_block: Option<usize> = None;

    for token in tokens {
        match token.kind {
            TokenKind::Comment | TokenKind::Nl => {}
            TokenKind::Newline => {
                expecting_block = last.filter(|t| t.is_op(":")).map(|t| t.span.start);
                last = None;
            }
            TokenKind::Indent => {
                if expecting_block.take().is_none() {
                    return Err(Error::syntax(source, token.span.end, "unexpected indent"));
                }
            }
            _ => {
                if let Some(offset) = expecting_block.take() {
                    return Err(Error::syntax(source, offset, "expected an indented block"));
                }
                if !matches!(token.kind, TokenKind::Dedent | TokenKind::End) {
                    last = Some(token);
                }
            }
        }
    }
    Ok(())
}

/// One item of a normalized token stream: the kind, and the text where it matters.
type Normalized<'src> = (TokenKind, &'src str);

/// Reduce a token stream to what minification must preserve.
fn normalize<'src>(tokens: &[Token<'src>]) -> Vec<Normalized<'src>> {
    let mut normalized = Vec::with_capacity(tokens.len());
    let mut line: Vec<Normalized<'src>> = Vec::new();
    let mut doc_position = true;

    for token in tokens.iter().filter(|t| !t.kind.is_cosmetic()) {
        match token.kind {
            TokenKind::Indent => {
                doc_position = true;
                normalized.push((TokenKind::Indent, ""));
            }
            TokenKind::Dedent | TokenKind::End => {
                doc_position = false;
                normalized.push((token.kind, ""));
            }
            TokenKind::Newline => {
                let only_strings = line.iter().all(|(kind, _)| *kind == TokenKind::String);
                if !(doc_position && only_strings) {
                    normalized.append(&mut line);
                    normalized.push((TokenKind::Newline, ""));
                    doc_position = false;
                }
                line.clear();
            }
            kind => line.push((kind, token.text)),
        }
    }

    let placeholder_block = [
        (TokenKind::Indent, ""),
        (TokenKind::Name, PLACEHOLDER),
        (TokenKind::Newline, ""),
        (TokenKind::Dedent, ""),
    ];
    let mut collapsed = Vec::with_capacity(normalized.len());
    let mut i = 0;
    while i < normalized.len() {
        if normalized[i..].starts_with(&placeholder_block) {
            collapsed.push((TokenKind::Indent, ""));
            collapsed.push((TokenKind::Dedent, ""));
            i += placeholder_block.len();
        } else {
            collapsed.push(normalized[i]);
            i += 1;
        }
    }
    collapsed
}

/// Check that `minified` reads as the same program as `original`.
pub fn check_equivalence(original: &str, minified: &str) -> Result<()> {
    let expected = normalize(&tokenize(original)?);
    let actual = normalize(&tokenize(minified)?);
    if expected == actual {
        return Ok(());
    }
    let index = expected
        .iter()
        .zip(&actual)
        .position(|(e, a)| e != a)
        .unwrap_or_else(|| expected.len().min(actual.len()));
    Err(Error::Invariant(format!(
        "minified output diverges at token {}: expected {:?}, found {:?}",
        index,
        expected.get(index),
        actual.get(index)
    )))
}

/// Check, minify and re-validate one source file.
pub fn minify_file(name: &str, source: &str, options: &MinifyOptions) -> Result<String> {
    let run = || -> Result<String> {
        if options.check_input {
            check_input(source)?;
        }
        if options.validate_input {
            validate(source)?;
        }
        let minified = minify_str(source)?;
        if options.validate_output {
            validate(&minified)?;
        }
        if options.check_equivalence {
            check_equivalence(source, &minified)?;
        }
        debug!("{}: {} -> {} bytes", name, source.len(), minified.len());
        Ok(minified)
    };
    run().map_err(|error| error.in_file(name))
}
