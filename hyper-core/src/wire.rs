//! JSON payload exchanged between the `hyper` binary and the bridge.
//!
//! ```json
//! {
//!   "generated_code": "def __hyper_template__():\n    ...",
//!   "source_mappings": [{"gen_line": 0, "gen_col": 0, "src_line": 0, "src_col": 0}],
//!   "pieces": [{"prefix": "...", "suffix": "...", "src_start": 0, "src_end": 4}]
//! }
//! ```
//!
//! `pieces` is present only when requested.

use serde::{Deserialize, Serialize};

use crate::compiler::VirtualProgram;
use crate::error::CoreError;
use crate::generator::{GeneratedPiece, validate_pieces};
use crate::sourcemap::SourceMapping;
use crate::span::Span;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranspileOutput {
    pub generated_code: String,
    pub source_mappings: Vec<SourceMapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pieces: Option<Vec<WirePiece>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirePiece {
    pub prefix: String,
    pub suffix: String,
    pub src_start: usize,
    pub src_end: usize,
}

impl From<&GeneratedPiece> for WirePiece {
    fn from(piece: &GeneratedPiece) -> Self {
        WirePiece {
            prefix: piece.prefix.clone(),
            suffix: piece.suffix.clone(),
            src_start: piece.source_range.start,
            src_end: piece.source_range.end,
        }
    }
}

impl WirePiece {
    pub fn to_piece(&self) -> Result<GeneratedPiece, CoreError> {
        if self.src_start > self.src_end {
            return Err(decode_error(format!(
                "piece range {}..{} is reversed",
                self.src_start, self.src_end
            )));
        }
        Ok(GeneratedPiece {
            prefix: self.prefix.clone(),
            suffix: self.suffix.clone(),
            source_range: Span::new(self.src_start, self.src_end),
        })
    }
}

impl TranspileOutput {
    pub fn from_program(program: &VirtualProgram, include_pieces: bool) -> Self {
        TranspileOutput {
            generated_code: program.code.clone(),
            source_mappings: program.mappings.clone(),
            pieces: include_pieces.then(|| program.pieces.iter().map(WirePiece::from).collect()),
        }
    }

    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, CoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Pieces converted back into generator form, or `None` when the
    /// payload carries no piece list.
    pub fn generated_pieces(&self) -> Result<Option<Vec<GeneratedPiece>>, CoreError> {
        self.pieces
            .as_ref()
            .map(|pieces| {
                pieces
                    .iter()
                    .map(WirePiece::to_piece)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()
    }

    /// Reject a payload that could not have come from `source`. Every piece
    /// must sit on character boundaries inside the source, in order.
    pub fn validate_for(&self, source: &str, pieces_requested: bool) -> Result<(), CoreError> {
        let pieces = match self.generated_pieces()? {
            Some(pieces) => pieces,
            None if pieces_requested => {
                return Err(decode_error("piece list was requested but not returned"));
            }
            None => return Ok(()),
        };

        for (index, piece) in pieces.iter().enumerate() {
            let range = piece.source_range;
            if range.end > source.len()
                || !source.is_char_boundary(range.start)
                || !source.is_char_boundary(range.end)
            {
                return Err(decode_error(format!(
                    "piece {index} range {}..{} does not fit the {}-byte source",
                    range.start,
                    range.end,
                    source.len()
                )));
            }
        }
        validate_pieces(&pieces)
    }
}

fn decode_error(message: impl std::fmt::Display) -> CoreError {
    CoreError::Decode(<serde_json::Error as serde::de::Error>::custom(message))
}
