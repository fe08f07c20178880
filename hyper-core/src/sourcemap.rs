//! Position mapping between a template and its virtual program.
//!
//! Pieces are emitted in source order, so both the source ranges and the
//! generated ranges of the pieces that carry text are sorted. Lookups in
//! either direction are a binary search.

use serde::{Deserialize, Serialize};

use crate::generator::GeneratedPiece;
use crate::span::{LineIndex, Span};

/// Line-level anchor from a generated position to a source position.
/// All fields are 0-based; columns are byte columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMapping {
    pub gen_line: usize,
    pub gen_col: usize,
    pub src_line: usize,
    pub src_col: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    source: Span,
    generated: Span,
}

/// Offset translation table for one generated program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    segments: Vec<Segment>,
}

impl SourceMap {
    /// Offset in the virtual program for a source byte offset, if that
    /// offset lies inside text copied from the source.
    pub fn to_generated(&self, offset: usize) -> Option<usize> {
        let idx = self
            .segments
            .partition_point(|segment| segment.source.end < offset);
        let segment = self.segments.get(idx)?;
        segment
            .source
            .contains(offset)
            .then(|| segment.generated.start + (offset - segment.source.start))
    }

    /// Source byte offset for an offset in the virtual program, if that
    /// offset lies inside text copied from the source.
    pub fn to_source(&self, offset: usize) -> Option<usize> {
        let idx = self
            .segments
            .partition_point(|segment| segment.generated.end < offset);
        let segment = self.segments.get(idx)?;
        segment
            .generated
            .contains(offset)
            .then(|| segment.source.start + (offset - segment.generated.start))
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Generated text plus its mapping tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembled {
    pub code: String,
    pub mappings: Vec<SourceMapping>,
    pub source_map: SourceMap,
}

/// Concatenate pieces into program text and record where every piece
/// landed.
pub fn assemble(source: &str, pieces: &[GeneratedPiece]) -> Assembled {
    let mut code = String::new();
    // (piece start, slice start) offsets in `code`
    let mut landed = Vec::with_capacity(pieces.len());
    let mut segments = Vec::new();

    for piece in pieces {
        let piece_start = code.len();
        code.push_str(&piece.prefix);
        let slice_start = code.len();
        code.push_str(piece.source_range.slice(source));
        let slice_end = code.len();
        code.push_str(&piece.suffix);

        landed.push((piece_start, slice_start));
        if !piece.source_range.is_empty() {
            segments.push(Segment {
                source: piece.source_range,
                generated: Span::new(slice_start, slice_end),
            });
        }
    }

    let source_lines = LineIndex::new(source);
    let code_lines = LineIndex::new(&code);
    let mappings = pieces
        .iter()
        .zip(&landed)
        .map(|(piece, &(piece_start, slice_start))| {
            if piece.source_range.is_empty() {
                let (gen_line, _) = code_lines.line_col(piece_start);
                let (src_line, _) = source_lines.line_col(piece.source_range.start);
                SourceMapping {
                    gen_line,
                    gen_col: 0,
                    src_line,
                    src_col: 0,
                }
            } else {
                let (gen_line, gen_col) = code_lines.line_col(slice_start);
                let (src_line, src_col) = source_lines.line_col(piece.source_range.start);
                SourceMapping {
                    gen_line,
                    gen_col,
                    src_line,
                    src_col,
                }
            }
        })
        .collect();

    Assembled {
        code,
        mappings,
        source_map: SourceMap { segments },
    }
}
