//! Grapheme-aware display width: measurement, cursor mapping, truncation and padding.
//!
//! Strings are walked by extended grapheme cluster. Each cluster's width is resolved as:
//! 1. exact match in the [`OverrideTable`],
//! 2. 2 columns for a multi-codepoint RGI emoji sequence (ZWJ families, flags, keycaps),
//! 3. the sum of [`WidthRuleTable`] widths of its codepoints.
//!
//! Character indices are `char` (Unicode scalar) indices. An index that lands inside a
//! multi-codepoint cluster maps to the column where that cluster starts.

use emojis::get as emoji_get;
use once_cell::sync::Lazy;
use unicode_segmentation::UnicodeSegmentation;

use super::classify::WidthRuleTable;
use super::overrides::OverrideTable;

pub const TAB_WIDTH: usize = 3;

/// Single-column truncation marker.
pub const ELLIPSIS: &str = "…";

/// One grapheme cluster of a measured string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasuredUnit<'a> {
    pub grapheme: &'a str,
    pub char_index: usize,
    pub byte_offset: usize,
    /// Column at which this unit starts.
    pub column: usize,
    pub width: usize,
}

/// Width breakdown of a string. Borrowed from the text it describes; recompute after any edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasuredString<'a> {
    text: &'a str,
    units: Vec<MeasuredUnit<'a>>,
    total_width: usize,
    char_count: usize,
}

impl<'a> MeasuredString<'a> {
    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn total_width(&self) -> usize {
        self.total_width
    }

    pub fn char_count(&self) -> usize {
        self.char_count
    }

    pub fn units(&self) -> &[MeasuredUnit<'a>] {
        &self.units
    }

    /// `(char_index, width)` for every unit, in order.
    pub fn per_char_widths(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.units.iter().map(|unit| (unit.char_index, unit.width))
    }

    pub fn column_for_char_index(&self, char_index: usize) -> usize {
        if char_index >= self.char_count {
            return self.total_width;
        }
        let idx = self
            .units
            .partition_point(|unit| unit.char_index <= char_index);
        idx.checked_sub(1)
            .map(|idx| self.units[idx].column)
            .unwrap_or(0)
    }

    pub fn column_for_byte_offset(&self, byte_offset: usize) -> usize {
        if byte_offset >= self.text.len() {
            return self.total_width;
        }
        let idx = self
            .units
            .partition_point(|unit| unit.byte_offset <= byte_offset);
        idx.checked_sub(1)
            .map(|idx| self.units[idx].column)
            .unwrap_or(0)
    }

    /// Char index of the last unit starting at or before `column`; the char count when the
    /// column is at or past the end.
    pub fn char_index_for_column(&self, column: usize) -> usize {
        if column >= self.total_width {
            return self.char_count;
        }
        let idx = self.units.partition_point(|unit| unit.column <= column);
        idx.checked_sub(1)
            .map(|idx| self.units[idx].char_index)
            .unwrap_or(0)
    }
}

/// Width classifier plus override table plus tab policy.
#[derive(Debug, Clone, Copy)]
pub struct WidthEngine<'t> {
    rules: &'t WidthRuleTable,
    overrides: &'t OverrideTable,
    tab_width: usize,
}

static BUILTIN_ENGINE: Lazy<WidthEngine<'static>> = Lazy::new(|| {
    WidthEngine::new(WidthRuleTable::builtin(), OverrideTable::builtin())
});

impl<'t> WidthEngine<'t> {
    pub fn new(rules: &'t WidthRuleTable, overrides: &'t OverrideTable) -> Self {
        Self {
            rules,
            overrides,
            tab_width: TAB_WIDTH,
        }
    }

    pub fn with_tab_width(mut self, tab_width: usize) -> Self {
        self.tab_width = tab_width;
        self
    }

    pub fn tab_width(&self) -> usize {
        self.tab_width
    }

    pub fn grapheme_width(&self, grapheme: &str) -> usize {
        if grapheme.is_empty() {
            return 0;
        }
        if grapheme == "\t" {
            return self.tab_width;
        }
        if let Some(width) = self.overrides.get(grapheme) {
            return width;
        }

        let mut chars = grapheme.chars();
        let multi_codepoint = chars.next().is_some() && chars.next().is_some();
        if multi_codepoint && emoji_get(grapheme).is_some() {
            return 2;
        }

        grapheme
            .chars()
            .map(|ch| self.rules.width_of(ch) as usize)
            .sum()
    }

    pub fn measure<'a>(&self, text: &'a str) -> MeasuredString<'a> {
        let mut units = Vec::new();
        let mut column = 0;
        let mut char_index = 0;
        for (byte_offset, grapheme) in text.grapheme_indices(true) {
            let width = self.grapheme_width(grapheme);
            units.push(MeasuredUnit {
                grapheme,
                char_index,
                byte_offset,
                column,
                width,
            });
            column += width;
            char_index += grapheme.chars().count();
        }
        MeasuredString {
            text,
            units,
            total_width: column,
            char_count: char_index,
        }
    }

    pub fn display_width(&self, text: &str) -> usize {
        text.graphemes(true)
            .map(|grapheme| self.grapheme_width(grapheme))
            .sum()
    }

    pub fn column_for_char_index(&self, text: &str, char_index: usize) -> usize {
        self.measure(text).column_for_char_index(char_index)
    }

    pub fn truncate(&self, text: &str, max_width: usize) -> String {
        self.truncate_with(text, max_width, ELLIPSIS)
    }

    /// Cuts `text` at a grapheme boundary so that it plus `ellipsis` fits in `max_width`.
    /// Text that already fits is returned unchanged. An ellipsis wider than `max_width` is
    /// itself clipped.
    pub fn truncate_with(&self, text: &str, max_width: usize, ellipsis: &str) -> String {
        let measured = self.measure(text);
        if measured.total_width() <= max_width {
            return text.to_string();
        }

        let ellipsis_width = self.display_width(ellipsis);
        if ellipsis_width > max_width {
            return self.take_columns(&self.measure(ellipsis), max_width).to_string();
        }

        let kept = self.take_columns(&measured, max_width - ellipsis_width);
        let mut result = String::with_capacity(kept.len() + ellipsis.len());
        result.push_str(kept);
        result.push_str(ellipsis);
        result
    }

    /// Appends spaces up to `target_width`. Never truncates.
    pub fn pad(&self, text: &str, target_width: usize) -> String {
        let padding = target_width.saturating_sub(self.display_width(text));
        let mut result = String::with_capacity(text.len() + padding);
        result.push_str(text);
        result.extend(std::iter::repeat(' ').take(padding));
        result
    }

    /// Truncates then pads, producing exactly `width` columns.
    pub fn fit(&self, text: &str, width: usize) -> String {
        self.pad(&self.truncate(text, width), width)
    }

    fn take_columns<'a>(&self, measured: &MeasuredString<'a>, budget: usize) -> &'a str {
        let text = measured.text();
        let end = measured
            .units()
            .iter()
            .find(|unit| unit.column + unit.width > budget)
            .map(|unit| unit.byte_offset)
            .unwrap_or(text.len());
        &text[..end]
    }
}

impl Default for WidthEngine<'static> {
    fn default() -> Self {
        *BUILTIN_ENGINE
    }
}

/// Shared engine over the builtin tables.
pub fn engine() -> &'static WidthEngine<'static> {
    &BUILTIN_ENGINE
}

pub fn grapheme_width(grapheme: &str) -> usize {
    engine().grapheme_width(grapheme)
}

pub fn measure(text: &str) -> MeasuredString<'_> {
    engine().measure(text)
}

pub fn display_width(text: &str) -> usize {
    engine().display_width(text)
}

pub fn column_for_char_index(text: &str, char_index: usize) -> usize {
    engine().column_for_char_index(text, char_index)
}

pub fn column_for_byte_offset(text: &str, byte_offset: usize) -> usize {
    measure(text).column_for_byte_offset(byte_offset)
}

pub fn char_index_for_column(text: &str, column: usize) -> usize {
    measure(text).char_index_for_column(column)
}

pub fn truncate(text: &str, max_width: usize) -> String {
    engine().truncate(text, max_width)
}

pub fn truncate_with(text: &str, max_width: usize, ellipsis: &str) -> String {
    engine().truncate_with(text, max_width, ellipsis)
}

pub fn pad(text: &str, target_width: usize) -> String {
    engine().pad(text, target_width)
}

pub fn fit(text: &str, width: usize) -> String {
    engine().fit(text, width)
}
