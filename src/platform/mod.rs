//! Byte-stream plumbing between the terminal and the normalizer.

pub mod keystroke_buffer;

pub use keystroke_buffer::{InputChunk, KeystrokeBuffer};
