//! Error types.
//!
//! Only static configuration can fail: keystrokes, navigation and timers never
//! surface errors to callers.

use std::path::PathBuf;

use thiserror::Error;

/// Rejected width configuration. Fatal at startup since a malformed table makes
/// width computation non-deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WidthTableError {
    #[error("width rule U+{start:04X}..=U+{end:04X} has start after end")]
    InvertedRange { start: u32, end: u32 },

    #[error("width rule U+{start:04X}..=U+{end:04X} has width {width}; expected 0, 1 or 2")]
    InvalidRuleWidth { start: u32, end: u32, width: u8 },

    #[error(
        "width rule U+{start:04X}..=U+{end:04X} overlaps U+{other_start:04X}..=U+{other_end:04X}"
    )]
    Overlap {
        start: u32,
        end: u32,
        other_start: u32,
        other_end: u32,
    },

    #[error("width override glyph is empty")]
    EmptyGlyph,

    #[error("width override glyph {glyph:?} spans {graphemes} grapheme clusters; expected 1")]
    NotSingleGrapheme { glyph: String, graphemes: usize },

    #[error("width override glyph {glyph:?} is listed more than once")]
    DuplicateGlyph { glyph: String },

    #[error("width override glyph {glyph:?} has width {width}; a single cell holds at most 2")]
    InvalidOverrideWidth { glyph: String, width: usize },

    #[error("width override glyph {glyph:?} has width {width}, below its base width {base}")]
    OverrideBelowBase {
        glyph: String,
        width: usize,
        base: usize,
    },
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("I/O error while opening log file at {path}: {source}")]
    OpenLogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid log filter {filter:?}: {source}")]
    InvalidFilter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
}
