//! Separates the template preamble (comments, blank lines, parameter
//! declarations) from the body, and decides whether the generated function
//! must be asynchronous.

use crate::error::CoreError;
use crate::lexer::{Keyword, LineKind, LineToken, is_ident_continue, is_ident_start};
use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreambleKind {
    Comment,
    Blank,
}

/// A comment or blank line that precedes the first parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreambleLine {
    pub kind: PreambleKind,
    /// Index into the token list.
    pub token: usize,
}

/// `name: type` (optionally `= default`) at the top of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDeclaration {
    pub name: Span,
    pub type_expression: Span,
    pub default: Option<Span>,
    /// Trimmed content of the whole declaration line.
    pub source_range: Span,
    pub token: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Structure {
    pub preamble: Vec<PreambleLine>,
    pub parameters: Vec<ParameterDeclaration>,
    /// Index of the first body token; equals the token count when the
    /// template has no body.
    pub body_start: usize,
    pub is_async: bool,
}

pub fn collect(source: &str, tokens: &[LineToken]) -> Result<Structure, CoreError> {
    let mut preamble = Vec::new();
    let mut parameters: Vec<ParameterDeclaration> = Vec::new();
    let mut body_start = tokens.len();

    for (index, token) in tokens.iter().enumerate() {
        if token.is_blank() {
            // Blank lines between parameters are separators, not preamble.
            if parameters.is_empty() {
                preamble.push(PreambleLine {
                    kind: PreambleKind::Blank,
                    token: index,
                });
            }
            continue;
        }

        if parameters.is_empty() && token.is_comment(source) {
            preamble.push(PreambleLine {
                kind: PreambleKind::Comment,
                token: index,
            });
            continue;
        }

        if token.kind == LineKind::Host {
            if let Some(parameter) = parse_parameter(source, token, index)? {
                parameters.push(parameter);
                continue;
            }
        }

        body_start = index;
        break;
    }

    let body = &tokens[body_start..];
    let is_async = body.iter().any(|token| line_forces_async(source, token));

    Ok(Structure {
        preamble,
        parameters,
        body_start,
        is_async,
    })
}

/// Recognize `name : type-expression [= default]`.
///
/// Returns `Ok(None)` for lines that are not parameter-shaped and an error
/// for a parameter with nothing after the colon.
fn parse_parameter(
    source: &str,
    token: &LineToken,
    index: usize,
) -> Result<Option<ParameterDeclaration>, CoreError> {
    let content = token.content;
    let text = content.slice(source);
    let bytes = text.as_bytes();

    if !bytes.first().is_some_and(|&b| is_ident_start(b)) {
        return Ok(None);
    }
    let name_len = bytes.iter().take_while(|&&b| is_ident_continue(b)).count();
    let after_name = text[name_len..].trim_start();
    let Some(after_colon) = after_name.strip_prefix(':') else {
        return Ok(None);
    };
    // `name := value` is an assignment expression, not a declaration.
    if after_colon.starts_with('=') {
        return Ok(None);
    }

    let ty_text = after_colon.trim_start();
    if ty_text.is_empty() {
        return Err(CoreError::structure(
            token.line + 1,
            content.start,
            format!("parameter `{}` is missing a type", &text[..name_len]),
        ));
    }

    let ty_start = content.start + (text.len() - ty_text.len());
    let (type_expression, default) = match split_default(ty_text) {
        Some(eq) => {
            let ty = ty_text[..eq].trim_end();
            let default_text = ty_text[eq + 1..].trim_start();
            if ty.is_empty() {
                return Err(CoreError::structure(
                    token.line + 1,
                    content.start,
                    format!("parameter `{}` is missing a type", &text[..name_len]),
                ));
            }
            let default_start = content.end - default_text.len();
            let default = (!default_text.is_empty())
                .then(|| Span::new(default_start, content.end));
            (Span::new(ty_start, ty_start + ty.len()), default)
        }
        None => (Span::new(ty_start, content.end), None),
    };

    Ok(Some(ParameterDeclaration {
        name: Span::new(content.start, content.start + name_len),
        type_expression,
        default,
        source_range: content,
        token: index,
    }))
}

/// Byte index of a top-level `=` that introduces a default value.
fn split_default(ty_text: &str) -> Option<usize> {
    let bytes = ty_text.as_bytes();
    let mut depth = 0i32;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'[' | b'(' | b'{' => depth += 1,
            b']' | b')' | b'}' => depth -= 1,
            b'=' if depth == 0 => {
                let prev = i.checked_sub(1).map(|p| bytes[p]);
                let next = bytes.get(i + 1).copied();
                let comparison = matches!(prev, Some(b'=' | b'!' | b'<' | b'>'))
                    || next == Some(b'=');
                if !comparison {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn line_forces_async(source: &str, token: &LineToken) -> bool {
    match token.kind {
        LineKind::Host => {
            let text = token.content_str(source);
            !text.starts_with('#') && contains_await(text)
        }
        LineKind::ControlOpen {
            keyword: Keyword::For | Keyword::With,
            is_async: true,
        } => true,
        _ => false,
    }
}

/// True when `await` appears as the first token of the line or right after
/// one of `= ( [ , :`, and is followed by whitespace.
pub fn contains_await(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut search = 0;
    while let Some(rel) = text[search..].find("await") {
        let at = search + rel;
        search = at + "await".len();

        if !bytes.get(search).is_some_and(|b| b.is_ascii_whitespace()) {
            continue;
        }
        let before = text[..at].trim_end();
        match before.as_bytes().last() {
            None => return true,
            Some(b'=' | b'(' | b'[' | b',' | b':') => return true,
            _ => {}
        }
    }
    false
}
