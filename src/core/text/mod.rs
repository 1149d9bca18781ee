//! Text width helpers (codepoint classification, overrides, grapheme measurement).
//!
//! These helpers are pure (string in/value out) and live under `core` so renderers and input
//! handlers can use them without touching the runtime.

pub mod classify;
pub mod overrides;
pub mod width;
