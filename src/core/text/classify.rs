//! Per-codepoint display width classification.
//!
//! A [`WidthRuleTable`] is a sorted, non-overlapping set of codepoint ranges, each mapped to
//! 0, 1 or 2 terminal columns. Codepoints no rule covers are one column wide. The builtin
//! table is derived from `unicode-width` with [`WIDE_BLOCKS`] layered on top.
//!
//! Sequence-level corrections (variation selectors, ZWJ emoji) are not handled here; see
//! [`super::overrides`] and [`super::width`].

use once_cell::sync::Lazy;
use unicode_width::UnicodeWidthChar;

use crate::error::WidthTableError;

/// Width used for codepoints that no rule covers.
pub const DEFAULT_WIDTH: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodepointWidthRule {
    pub start: u32,
    pub end: u32,
    pub width: u8,
}

impl CodepointWidthRule {
    pub const fn new(start: u32, end: u32, width: u8) -> Self {
        Self { start, end, width }
    }

    pub fn contains(&self, codepoint: u32) -> bool {
        self.start <= codepoint && codepoint <= self.end
    }
}

#[derive(Debug, Clone)]
pub struct WidthRuleTable {
    rules: Vec<CodepointWidthRule>,
}

impl WidthRuleTable {
    /// Builds a table, rejecting inverted ranges, widths above 2 and any overlap.
    ///
    /// Rules may be given in any order; they are sorted by range start.
    pub fn new(
        rules: impl IntoIterator<Item = CodepointWidthRule>,
    ) -> Result<Self, WidthTableError> {
        let mut rules: Vec<CodepointWidthRule> = rules.into_iter().collect();
        for rule in &rules {
            if rule.start > rule.end {
                return Err(WidthTableError::InvertedRange {
                    start: rule.start,
                    end: rule.end,
                });
            }
            if rule.width > 2 {
                return Err(WidthTableError::InvalidRuleWidth {
                    start: rule.start,
                    end: rule.end,
                    width: rule.width,
                });
            }
        }

        rules.sort_by_key(|rule| (rule.start, rule.end));
        for pair in rules.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            if next.start <= prev.end {
                return Err(WidthTableError::Overlap {
                    start: next.start,
                    end: next.end,
                    other_start: prev.start,
                    other_end: prev.end,
                });
            }
        }

        Ok(Self { rules })
    }

    /// Process-wide table built from [`builtin_rules`].
    pub fn builtin() -> &'static WidthRuleTable {
        &BUILTIN_TABLE
    }

    pub fn rules(&self) -> &[CodepointWidthRule] {
        &self.rules
    }

    pub fn rule_for(&self, codepoint: u32) -> Option<&CodepointWidthRule> {
        let idx = self
            .rules
            .partition_point(|rule| rule.end < codepoint);
        self.rules.get(idx).filter(|rule| rule.contains(codepoint))
    }

    pub fn width_of(&self, ch: char) -> u8 {
        self.rule_for(ch as u32)
            .map(|rule| rule.width)
            .unwrap_or(DEFAULT_WIDTH)
    }
}

static BUILTIN_TABLE: Lazy<WidthRuleTable> = Lazy::new(|| {
    match WidthRuleTable::new(builtin_rules()) {
        Ok(table) => table,
        // Checked by `builtin_rules_are_well_formed`.
        Err(err) => panic!("builtin width rules are malformed: {err}"),
    }
});

/// Display width of a single codepoint using the builtin table.
pub fn width_of(ch: char) -> usize {
    WidthRuleTable::builtin().width_of(ch) as usize
}

/// Blocks measured 2 columns even where their East Asian Width class says narrow (emoji
/// pictographs with text presentation, unassigned slots). Combining marks inside them stay 0.
#[rustfmt::skip]
pub const WIDE_BLOCKS: &[(u32, u32)] = &[
    // Hangul Jamo leading consonants.
    (0x1100, 0x115F),
    // CJK radicals, Kangxi, ideographic description, CJK symbols and punctuation.
    (0x2E80, 0x303E),
    // Hiragana, Katakana, Bopomofo, Hangul compatibility Jamo, Kanbun, CJK strokes.
    (0x3041, 0x3096),
    (0x30A1, 0x30FA),
    (0x3105, 0x312F),
    (0x3131, 0x318E),
    // Enclosed CJK letters and CJK compatibility.
    (0x3200, 0x33FF),
    // CJK unified ideographs extension A and main block.
    (0x3400, 0x4DBF),
    (0x4E00, 0x9FFF),
    // Yi syllables and radicals.
    (0xA000, 0xA4C6),
    // Hangul Jamo extended-A.
    (0xA960, 0xA97C),
    // Hangul syllables.
    (0xAC00, 0xD7A3),
    // CJK compatibility ideographs.
    (0xF900, 0xFAFF),
    // CJK vertical forms.
    (0xFE10, 0xFE19),
    // CJK compatibility forms and small form variants.
    (0xFE30, 0xFE6B),
    // Fullwidth forms.
    (0xFF01, 0xFF60),
    (0xFFE0, 0xFFE6),
    // Kana supplement and extensions.
    (0x1B000, 0x1B2FB),
    // Miscellaneous symbols and pictographs, emoticons.
    (0x1F300, 0x1F64F),
    // Transport and map symbols.
    (0x1F680, 0x1F6FF),
    // Supplemental symbols and pictographs.
    (0x1F900, 0x1F9FF),
    // Symbols and pictographs extended-A.
    (0x1FA70, 0x1FAFF),
    // CJK unified ideographs extensions B through H and compatibility supplement.
    (0x20000, 0x2FFFD),
    (0x30000, 0x3FFFD),
];

/// Width of `ch` before any table lookup: `unicode-width`'s class, widened to 2 inside
/// [`WIDE_BLOCKS`]. Control characters measure 0.
pub fn builtin_width(ch: char) -> u8 {
    if ch.is_control() {
        return 0;
    }
    match UnicodeWidthChar::width(ch) {
        None | Some(0) => 0,
        Some(1) if !in_wide_block(ch as u32) => 1,
        Some(_) => 2,
    }
}

fn in_wide_block(codepoint: u32) -> bool {
    WIDE_BLOCKS
        .iter()
        .any(|&(start, end)| start <= codepoint && codepoint <= end)
}

/// Run-length encodes [`builtin_width`] over every scalar value. Default-width runs are
/// left out.
pub fn builtin_rules() -> Vec<CodepointWidthRule> {
    let mut rules: Vec<CodepointWidthRule> = Vec::new();
    for ch in (0..=char::MAX as u32).filter_map(char::from_u32) {
        let width = builtin_width(ch);
        if width == DEFAULT_WIDTH {
            continue;
        }
        let codepoint = ch as u32;
        match rules.last_mut() {
            Some(last) if last.width == width && last.end + 1 == codepoint => last.end = codepoint,
            _ => rules.push(CodepointWidthRule::new(codepoint, codepoint, width)),
        }
    }
    rules
}
