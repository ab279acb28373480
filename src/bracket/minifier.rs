use log::debug;

use super::lexer::{BracketKind, BracketLexer};
use crate::error::Result;

/// Characters after which a bare token can follow without a separating space.
const SELF_DELIMITING: &[char] = &[')', '<', '>', '{', '}', '[', ']'];

/// Minify a bracket language source.
///
/// Comments and whitespace are removed. String literals and structural tokens are copied
/// verbatim. A bare token is preceded by a single space unless it starts with `/` or the
/// output so far is empty or ends in a self-delimiting character.
pub fn minify_postscript(source: &str) -> Result<String> {
    let mut output = String::with_capacity(source.len());
    for token in BracketLexer::new(source) {
        let token = token?;
        if !token.is_significant() {
            continue;
        }
        if token.kind == BracketKind::Bare {
            let glued = token.text.starts_with('/')
                || output.chars().last().map_or(true, |c| SELF_DELIMITING.contains(&c));
            if !glued {
                output.push(' ');
            }
        }
        output.push_str(token.text);
    }
    debug!("postscript: {} -> {} bytes", source.len(), output.len());
    Ok(output)
}
