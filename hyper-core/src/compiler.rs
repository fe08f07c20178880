//! One generation pass: classify, collect, generate, assemble.

use tracing::debug;

use crate::config::GeneratorOptions;
use crate::error::CoreError;
use crate::generator::{GeneratedPiece, generate};
use crate::lexer::{LineToken, classify};
use crate::sourcemap::{SourceMap, SourceMapping, assemble};
use crate::structure::{Structure, collect};

/// Everything derived from one generation pass over a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualProgram {
    pub tokens: Vec<LineToken>,
    pub structure: Structure,
    pub pieces: Vec<GeneratedPiece>,
    pub code: String,
    pub mappings: Vec<SourceMapping>,
    pub source_map: SourceMap,
}

pub fn transpile(source: &str) -> Result<VirtualProgram, CoreError> {
    transpile_with(source, &GeneratorOptions::default())
}

pub fn transpile_with(
    source: &str,
    options: &GeneratorOptions,
) -> Result<VirtualProgram, CoreError> {
    let tokens = classify(source);
    let structure = collect(source, &tokens)?;
    let pieces = generate(source, &tokens, &structure, options)?;
    let assembled = assemble(source, &pieces);

    debug!(
        parameters = structure.parameters.len(),
        is_async = structure.is_async,
        bytes = assembled.code.len(),
        "transpiled template"
    );

    Ok(VirtualProgram {
        tokens,
        structure,
        pieces,
        code: assembled.code,
        mappings: assembled.mappings,
        source_map: assembled.source_map,
    })
}
