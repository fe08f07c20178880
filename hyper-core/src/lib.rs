//! Core pipeline for Hyper templates.
//!
//! A template mixes markup lines with host-language (Python) control flow.
//! The pipeline turns one into a virtual Python program whose every piece
//! points back at a range of the template:
//!
//!   template text
//!     -> lexer      (one classified token per line)
//!     -> structure  (preamble, parameters, body start, async)
//!     -> generator  (prefix + source slice + suffix pieces)
//!     -> sourcemap  (assembled code and line/column mappings)
//!
//! `placement` splits one generation result into host and markup injection
//! lists for editors, and `bridge` drives the same conversion through the
//! external `hyper` binary.

// ---------------------------------------------------------------------
// Error handling and configuration
// ---------------------------------------------------------------------

pub mod span;
pub mod error;
pub mod config;

// ---------------------------------------------------------------------
// Front-end: line classification and structure
// ---------------------------------------------------------------------

pub mod lexer;
pub mod structure;

// ---------------------------------------------------------------------
// Generation and source mapping
// ---------------------------------------------------------------------

pub mod generator;
pub mod sourcemap;
pub mod compiler;

// ---------------------------------------------------------------------
// Consumers: editor placements and the batch bridge
// ---------------------------------------------------------------------

pub mod placement;
pub mod wire;
pub mod bridge;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use bridge::{BinaryLocator, InMemoryTranspiler, ProcessBridge, TranspilePort};
pub use compiler::{VirtualProgram, transpile, transpile_with};
pub use config::{BridgeConfig, GeneratorOptions};
pub use error::{CoreError, ProcessFailure};
pub use generator::GeneratedPiece;
pub use placement::{Coordinator, Placement, Placements, place};
pub use wire::TranspileOutput;
