//! Display-width-aware text measurement and race-free keystroke routing for terminal apps.
//!
//! Invariant: one keystroke is fully dispatched, and every navigation or registration it
//! requested applied, before the next keystroke is routed.
//!
//! # Public API Overview
//! - Measure, truncate and pad text by terminal columns with [`measure`], [`truncate`],
//!   [`pad`] and [`column_for_char_index`], or a custom [`WidthEngine`].
//! - Split raw input with [`KeystrokeBuffer`] and turn each sequence into a [`NormalizedKey`]
//!   via [`Normalizer`].
//! - Drive screens through a [`Session`]: register handlers with [`HandlerSpec`], navigate
//!   from handlers through [`EventCtx`], and let the transition guard hold freshly pushed
//!   screens until they settle.

#![allow(clippy::type_complexity)]

pub mod config;
pub mod error;
pub mod logging;

pub mod core;
pub mod platform;
pub mod runtime;

/// Configuration and error types.
pub use crate::config::EnvConfig;
pub use crate::error::{LoggingError, WidthTableError};

/// Width classification and measurement.
pub use crate::core::text::classify::{width_of, CodepointWidthRule, WidthRuleTable};
pub use crate::core::text::overrides::{OverrideTable, WidthOverride};
pub use crate::core::text::width::{
    char_index_for_column, column_for_byte_offset, column_for_char_index, display_width, fit,
    grapheme_width, measure, pad, truncate, truncate_with, MeasuredString, MeasuredUnit,
    WidthEngine, ELLIPSIS, TAB_WIDTH,
};

/// Keystroke normalization.
pub use crate::core::input::{
    decode_input, normalize, KeyEventType, KeyName, NormalizedKey, Normalizer,
};

/// Input buffering for chunked terminal streams.
pub use crate::platform::keystroke_buffer::{InputChunk, KeystrokeBuffer};

/// Routing, navigation and the session that ties them together.
pub use crate::runtime::{
    CancellationToken, CtrlCPolicy, DispatchReport, EntryId, EventCtx, GuardPolicy, HandlerId,
    HandlerSpec, KeyOutcome, Scope, ScreenId, ScreenStack, Session, SessionConfig, StackEntry,
    TickReport, TimerHandle, TimerId,
};
