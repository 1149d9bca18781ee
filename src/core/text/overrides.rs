//! Exact-match width overrides for glyphs whose rule-derived width disagrees with what
//! terminals actually render.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use unicode_segmentation::UnicodeSegmentation;

use super::classify::width_of;
use crate::error::WidthTableError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidthOverride {
    pub glyph: String,
    pub width: usize,
}

impl WidthOverride {
    pub fn new(glyph: impl Into<String>, width: usize) -> Self {
        Self {
            glyph: glyph.into(),
            width,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    entries: HashMap<String, usize>,
}

impl OverrideTable {
    /// Builds a table. Each glyph must be exactly one grapheme cluster (lookups happen per
    /// cluster, so anything else could never match) and at most 2 columns wide. An override
    /// may only widen: its width is never below the builtin width of the glyph's base
    /// codepoint.
    pub fn new(
        overrides: impl IntoIterator<Item = WidthOverride>,
    ) -> Result<Self, WidthTableError> {
        let mut entries = HashMap::new();
        for WidthOverride { glyph, width } in overrides {
            if glyph.is_empty() {
                return Err(WidthTableError::EmptyGlyph);
            }
            let graphemes = glyph.graphemes(true).count();
            if graphemes != 1 {
                return Err(WidthTableError::NotSingleGrapheme { glyph, graphemes });
            }
            if width > 2 {
                return Err(WidthTableError::InvalidOverrideWidth { glyph, width });
            }
            let base = glyph.chars().next().map(width_of).unwrap_or(0);
            if width < base {
                return Err(WidthTableError::OverrideBelowBase { glyph, width, base });
            }
            if entries.contains_key(&glyph) {
                return Err(WidthTableError::DuplicateGlyph { glyph });
            }
            entries.insert(glyph, width);
        }
        Ok(Self { entries })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> &'static OverrideTable {
        &BUILTIN_OVERRIDES
    }

    pub fn get(&self, grapheme: &str) -> Option<usize> {
        self.entries.get(grapheme).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Text-default symbols promoted to emoji presentation by VS16. Terminals draw these in two
/// cells while the per-codepoint sum says one.
const BUILTIN_GLYPHS: &[(&str, usize)] = &[
    ("\u{23F1}\u{FE0F}", 2),
    ("\u{23F2}\u{FE0F}", 2),
    ("\u{2139}\u{FE0F}", 2),
    ("\u{2600}\u{FE0F}", 2),
    ("\u{2601}\u{FE0F}", 2),
    ("\u{260E}\u{FE0F}", 2),
    ("\u{2611}\u{FE0F}", 2),
    ("\u{263A}\u{FE0F}", 2),
    ("\u{26A0}\u{FE0F}", 2),
    ("\u{2699}\u{FE0F}", 2),
    ("\u{2702}\u{FE0F}", 2),
    ("\u{2714}\u{FE0F}", 2),
    ("\u{2716}\u{FE0F}", 2),
    ("\u{2733}\u{FE0F}", 2),
    ("\u{2744}\u{FE0F}", 2),
    ("\u{2764}\u{FE0F}", 2),
    ("\u{27A1}\u{FE0F}", 2),
    ("\u{2B05}\u{FE0F}", 2),
    ("\u{2B06}\u{FE0F}", 2),
    ("\u{2B07}\u{FE0F}", 2),
];

static BUILTIN_OVERRIDES: Lazy<OverrideTable> = Lazy::new(|| {
    let overrides = BUILTIN_GLYPHS
        .iter()
        .map(|&(glyph, width)| WidthOverride::new(glyph, width));
    match OverrideTable::new(overrides) {
        Ok(table) => table,
        Err(err) => panic!("builtin width overrides are malformed: {err}"),
    }
});
