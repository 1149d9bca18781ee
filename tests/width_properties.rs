use proptest::prelude::*;
use tape_nav::core::text::classify::WIDE_BLOCKS;
use tape_nav::{
    column_for_char_index, display_width, fit, measure, pad, truncate, width_of, WidthRuleTable,
    ELLIPSIS,
};
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthChar;

const PIECES: &[&str] = &[
    "a",
    "Z",
    " ",
    "\t",
    "\u{6F22}",
    "\u{D55C}",
    "\u{E9}",
    "e\u{301}",
    "\u{1F44D}\u{1F3FD}",
    "\u{1F468}\u{200D}\u{1F469}\u{200D}\u{1F467}",
    "\u{1F1EF}\u{1F1F5}",
    "\u{26A0}\u{FE0F}",
    "\u{26A0}",
    "\u{FF21}",
];

fn mixed_text() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(PIECES), 0..24).prop_map(|pieces| pieces.concat())
}

fn any_text() -> impl Strategy<Value = String> {
    prop_oneof![mixed_text(), "\\PC{0,32}"]
}

proptest! {
    #[test]
    fn column_mapping_starts_at_zero_and_never_decreases(text in any_text()) {
        prop_assert_eq!(column_for_char_index(&text, 0), 0);
        let char_count = text.chars().count();
        let mut previous = 0;
        for index in 0..=char_count + 1 {
            let column = column_for_char_index(&text, index);
            prop_assert!(column >= previous, "index {} went back from {} to {}", index, previous, column);
            previous = column;
        }
        prop_assert_eq!(previous, display_width(&text));
    }

    #[test]
    fn truncate_never_exceeds_budget(text in any_text(), max_width in 0usize..24) {
        let truncated = truncate(&text, max_width);
        prop_assert!(display_width(&truncated) <= max_width);
        if display_width(&text) <= max_width {
            prop_assert_eq!(&truncated, &text);
        } else if max_width >= 1 {
            prop_assert!(truncated.ends_with(ELLIPSIS));
        } else {
            prop_assert!(truncated.is_empty());
        }
    }

    #[test]
    fn truncate_cuts_on_grapheme_boundaries(text in mixed_text(), max_width in 1usize..24) {
        let truncated = truncate(&text, max_width);
        let kept = truncated.strip_suffix(ELLIPSIS).unwrap_or(&truncated);
        prop_assert!(text.starts_with(kept));
        let boundaries: Vec<usize> = text.grapheme_indices(true).map(|(idx, _)| idx).collect();
        prop_assert!(kept.len() == text.len() || boundaries.contains(&kept.len()));
    }

    #[test]
    fn pad_reaches_target_or_leaves_text_alone(text in any_text(), target in 0usize..40) {
        let padded = pad(&text, target);
        let width = display_width(&text);
        prop_assert_eq!(display_width(&padded), target.max(width));
        prop_assert!(padded.starts_with(text.as_str()));
    }

    #[test]
    fn fit_is_exact(text in any_text(), width in 0usize..30) {
        prop_assert_eq!(display_width(&fit(&text, width)), width);
    }

    #[test]
    fn measured_units_tile_the_string(text in any_text()) {
        let measured = measure(&text);
        let mut column = 0;
        let mut rebuilt = String::new();
        for unit in measured.units() {
            prop_assert_eq!(unit.column, column);
            column += unit.width;
            rebuilt.push_str(unit.grapheme);
        }
        prop_assert_eq!(column, measured.total_width());
        prop_assert_eq!(rebuilt, text);
    }

    #[test]
    fn wide_ranges_agree_with_unicode_width(
        code in prop_oneof![0x4E00u32..=0x9FFF, 0xAC00u32..=0xD7A3, 0x3400u32..=0x4DBF, 0xFF01u32..=0xFF60]
    ) {
        let ch = char::from_u32(code).expect("ranges hold scalar values");
        prop_assert_eq!(width_of(ch), 2);
        prop_assert_eq!(UnicodeWidthChar::width(ch), Some(2));
    }

    #[test]
    fn printable_ascii_is_one_column(code in 0x20u32..0x7F) {
        let ch = char::from_u32(code).expect("ascii");
        prop_assert_eq!(width_of(ch), 1);
    }

    #[test]
    fn combining_marks_are_zero_width(code in 0x0300u32..=0x036F) {
        let ch = char::from_u32(code).expect("combining range");
        prop_assert_eq!(width_of(ch), 0);
    }
}

fn is_mark(ch: char) -> bool {
    UnicodeWidthChar::width(ch) == Some(0)
}

#[test]
fn every_codepoint_in_wide_blocks_is_two_columns() {
    for &(start, end) in WIDE_BLOCKS {
        for ch in (start..=end).filter_map(char::from_u32) {
            if !is_mark(ch) {
                assert_eq!(width_of(ch), 2, "U+{:04X} in U+{start:04X}..=U+{end:04X}", ch as u32);
            }
        }
        let mid = char::from_u32(start + (end - start) / 2).expect("block midpoint");
        for ch in [mid, char::from_u32(start).expect("start"), char::from_u32(end).expect("end")] {
            assert!(width_of(ch) == 2 || is_mark(ch), "U+{:04X}", ch as u32);
        }
    }
}

#[test]
fn builtin_rules_hold_at_edges_and_interior() {
    for rule in WidthRuleTable::builtin().rules() {
        let mid = rule.start + (rule.end - rule.start) / 2;
        for codepoint in [rule.start, mid, rule.end] {
            let ch = char::from_u32(codepoint).expect("rules cover scalar values");
            assert_eq!(width_of(ch) as u8, rule.width, "U+{codepoint:04X}");
        }
    }
}

#[test]
fn combining_marks_from_many_scripts_are_zero_width() {
    for ch in [
        '\u{0300}', '\u{036F}', '\u{0591}', '\u{05BD}', '\u{0610}', '\u{06EA}', '\u{06ED}',
        '\u{0711}', '\u{0900}', '\u{094D}', '\u{09CD}', '\u{0A4D}', '\u{0BCD}', '\u{0D4D}',
        '\u{0E31}', '\u{0F71}', '\u{1DC0}', '\u{20D0}', '\u{302A}', '\u{302D}', '\u{3099}',
        '\u{FE20}',
    ] {
        assert_eq!(width_of(ch), 0, "U+{:04X}", ch as u32);
    }
}
