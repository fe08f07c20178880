//! Virtual program generation.
//!
//! Walks the classified lines once and emits an ordered list of
//! [`GeneratedPiece`]s. Concatenating `prefix + source[range] + suffix` for
//! every piece yields a host-language function definition whose body
//! mirrors the template. Block nesting comes from keyword pairs: openers
//! push a [`BlockFrame`], `end` pops it, and the indentation level follows
//! the stack.
//!
//! Piece ranges never overlap and never move backwards, so the same list can
//! be handed to an editor as injection placements.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GeneratorOptions;
use crate::error::CoreError;
use crate::lexer::{Keyword, LineKind, LineToken};
use crate::span::Span;
use crate::structure::{PreambleKind, Structure};

/// One emitted unit: literal prefix, a verbatim slice of the source, and a
/// literal suffix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedPiece {
    pub prefix: String,
    pub suffix: String,
    pub source_range: Span,
}

impl GeneratedPiece {
    fn new(prefix: impl Into<String>, source_range: Span, suffix: impl Into<String>) -> Self {
        GeneratedPiece {
            prefix: prefix.into(),
            suffix: suffix.into(),
            source_range,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Block,
    Match,
    Case,
}

/// An open compound statement waiting for its `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockFrame {
    pub kind: FrameKind,
    /// Token index of the line that opened the frame.
    pub opened_by: usize,
    /// Whether the current suite of this frame holds a statement yet.
    has_statement: bool,
}

pub fn generate(
    source: &str,
    tokens: &[LineToken],
    structure: &Structure,
    options: &GeneratorOptions,
) -> Result<Vec<GeneratedPiece>, CoreError> {
    let mut generator = Generator {
        source,
        tokens,
        options,
        indent_level: 1,
        block_stack: Vec::new(),
        pieces: Vec::new(),
        function_has_statement: false,
    };
    generator.run(structure)?;

    let pieces = generator.pieces;
    let checked = validate_pieces(&pieces);
    debug_assert!(checked.is_ok(), "generator produced overlapping pieces: {checked:?}");
    checked?;

    debug!(pieces = pieces.len(), lines = tokens.len(), "generated virtual program");
    Ok(pieces)
}

/// Check that piece ranges are ordered and non-overlapping.
pub fn validate_pieces(pieces: &[GeneratedPiece]) -> Result<(), CoreError> {
    for (index, pair) in pieces.windows(2).enumerate() {
        let previous = pair[0].source_range;
        let current = pair[1].source_range;
        if current.start < previous.end || current.start < previous.start {
            return Err(CoreError::InvariantViolation {
                index: index + 1,
                previous_end: previous.end,
                start: current.start,
            });
        }
    }
    Ok(())
}

struct Generator<'a> {
    source: &'a str,
    tokens: &'a [LineToken],
    options: &'a GeneratorOptions,
    indent_level: usize,
    block_stack: Vec<BlockFrame>,
    pieces: Vec<GeneratedPiece>,
    function_has_statement: bool,
}

impl<'a> Generator<'a> {
    fn run(&mut self, structure: &Structure) -> Result<(), CoreError> {
        self.emit_preamble(structure);
        self.emit_signature(structure);

        for index in structure.body_start..self.tokens.len() {
            self.emit_body_line(index)?;
        }

        self.finish()
    }

    fn emit_preamble(&mut self, structure: &Structure) {
        let tokens = self.tokens;
        for line in &structure.preamble {
            let token = &tokens[line.token];
            let range = match line.kind {
                PreambleKind::Comment => token.content,
                PreambleKind::Blank => Span::point(token.range.start),
            };
            self.pieces.push(GeneratedPiece::new("", range, "\n"));
        }
    }

    fn emit_signature(&mut self, structure: &Structure) {
        let def = if structure.is_async { "async def" } else { "def" };
        let name = &self.options.function_name;

        if structure.parameters.is_empty() {
            let anchor = self
                .tokens
                .get(structure.body_start)
                .map(|token| token.range.start)
                .unwrap_or(self.source.len());
            self.pieces.push(GeneratedPiece::new(
                format!("{def} {name}():\n"),
                Span::point(anchor),
                "",
            ));
            return;
        }

        let last = structure.parameters.len() - 1;
        for (i, parameter) in structure.parameters.iter().enumerate() {
            let prefix = if i == 0 {
                format!("{def} {name}(")
            } else {
                ", ".to_string()
            };
            let suffix = if i == last { "):\n" } else { "" };
            self.pieces
                .push(GeneratedPiece::new(prefix, parameter.source_range, suffix));
        }
    }

    fn emit_body_line(&mut self, index: usize) -> Result<(), CoreError> {
        let tokens = self.tokens;
        let token = &tokens[index];

        if token.is_blank() {
            self.pieces
                .push(GeneratedPiece::new("", Span::point(token.range.start), "\n"));
            return Ok(());
        }

        match token.kind {
            LineKind::ControlOpen { keyword, .. } if keyword.is_dedent() => {
                if self.block_stack.is_empty() {
                    return Err(CoreError::structure(
                        token.line + 1,
                        token.content.start,
                        format!("`{}` does not continue any open block", keyword.as_str()),
                    ));
                }
                self.fill_empty_suite(token);
                let level = self.indent_level.saturating_sub(1).max(1);
                self.emit_statement(level, token.content);
                // The continuation starts a fresh suite in the same frame.
                if let Some(top) = self.block_stack.last_mut() {
                    top.has_statement = false;
                }
            }
            LineKind::ControlOpen {
                keyword: Keyword::Case,
                ..
            } => {
                if self.top_kind() == Some(FrameKind::Case) {
                    self.fill_empty_suite(token);
                    self.block_stack.pop();
                    self.indent_level = self.indent_level.saturating_sub(1).max(1);
                }
                self.emit_statement(self.indent_level, token.content);
                self.push_frame(FrameKind::Case, index);
            }
            LineKind::ControlOpen { keyword, .. } => {
                self.emit_statement(self.indent_level, token.content);
                let kind = if keyword == Keyword::Match {
                    FrameKind::Match
                } else {
                    FrameKind::Block
                };
                self.push_frame(kind, index);
            }
            LineKind::ControlClose => self.close_block(index)?,
            LineKind::Markup => {
                let indent = self.options.indent(self.indent_level);
                let quote = format!("{}\"\"\"", self.options.markup_string_prefix);
                self.pieces.push(GeneratedPiece::new(
                    format!("{indent}{quote}"),
                    token.content,
                    "\"\"\"\n",
                ));
                self.mark_statement();
            }
            LineKind::Host => {
                let indent = self.options.indent(self.indent_level);
                self.pieces
                    .push(GeneratedPiece::new(indent, token.content, "\n"));
                if !token.is_comment(self.source) {
                    self.mark_statement();
                }
            }
        }
        Ok(())
    }

    fn close_block(&mut self, index: usize) -> Result<(), CoreError> {
        let tokens = self.tokens;
        let token = &tokens[index];
        self.fill_empty_suite(token);

        let mut popped = 0;
        while self.top_kind() == Some(FrameKind::Case) {
            self.block_stack.pop();
            self.indent_level = self.indent_level.saturating_sub(1);
            popped += 1;
        }
        if self.block_stack.pop().is_some() {
            self.indent_level = self.indent_level.saturating_sub(1);
            popped += 1;
        }
        self.indent_level = self.indent_level.max(1);

        if popped == 0 {
            return Err(CoreError::structure(
                token.line + 1,
                token.content.start,
                "`end` does not close any open block",
            ));
        }

        let indent = self.options.indent(self.indent_level);
        self.pieces.push(GeneratedPiece::new(
            format!("{indent}pass\n"),
            Span::point(token.range.start),
            "",
        ));
        self.mark_statement();
        Ok(())
    }

    /// The host language rejects empty suites; when the suite being left has
    /// no statement, anchor a `pass` at the start of the line that leaves it.
    fn fill_empty_suite(&mut self, token: &LineToken) {
        let Some(top) = self.block_stack.last_mut() else {
            return;
        };
        if top.has_statement {
            return;
        }
        top.has_statement = true;
        let indent = self.options.indent(self.indent_level);
        self.pieces.push(GeneratedPiece::new(
            format!("{indent}pass\n"),
            Span::point(token.range.start),
            "",
        ));
    }

    fn emit_statement(&mut self, level: usize, range: Span) {
        let indent = self.options.indent(level);
        self.pieces.push(GeneratedPiece::new(indent, range, "\n"));
        self.mark_statement();
    }

    fn push_frame(&mut self, kind: FrameKind, opened_by: usize) {
        self.block_stack.push(BlockFrame {
            kind,
            opened_by,
            has_statement: false,
        });
        self.indent_level += 1;
    }

    fn mark_statement(&mut self) {
        self.function_has_statement = true;
        if let Some(top) = self.block_stack.last_mut() {
            top.has_statement = true;
        }
    }

    fn top_kind(&self) -> Option<FrameKind> {
        self.block_stack.last().map(|frame| frame.kind)
    }

    fn finish(&mut self) -> Result<(), CoreError> {
        if let Some(frame) = self
            .block_stack
            .iter()
            .rev()
            .find(|frame| frame.kind != FrameKind::Case)
            .or(self.block_stack.last())
        {
            let token = &self.tokens[frame.opened_by];
            return Err(CoreError::structure(
                token.line + 1,
                token.content.start,
                format!(
                    "block opened by `{}` is never closed with `end`",
                    token.content_str(self.source)
                ),
            ));
        }
        debug_assert_eq!(self.indent_level, 1);

        if !self.function_has_statement {
            let indent = self.options.indent(1);
            self.pieces.push(GeneratedPiece::new(
                format!("{indent}pass\n"),
                Span::point(self.source.len()),
                "",
            ));
        }
        Ok(())
    }
}
