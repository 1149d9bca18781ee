//! Pure data and parsing: width measurement and keystroke normalization.

pub mod input;
pub mod text;
