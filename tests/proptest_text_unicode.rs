//! Property-based tests for Unicode scanning and width measurement.
//!
//! Uses proptest to verify invariants that must hold across all valid inputs.

use opentui_text::unicode::{
    Clusters, LineBreakKind, ShapedText, WidthMethod, WidthOptions, WrapBreakSet,
    calculate_text_width, column_at_byte, display_width_with_method, find_line_breaks,
    find_pos_by_width, find_word_wrap_pos, find_wrap_breaks, find_wrap_pos_by_width,
    grapheme_info, graphemes, is_ascii_only, word_wrap_end,
};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

/// Generate arbitrary UTF-8 strings (proptest default).
fn utf8_string() -> impl Strategy<Value = String> {
    "\\PC{0,100}"
}

/// Generate printable ASCII with tabs.
fn ascii_string() -> impl Strategy<Value = String> {
    "[\\x20-\\x7E\\t]{0,100}"
}

/// Text mixing line terminators of every kind.
fn multiline_string() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop::sample::select(vec!["ab", "漢", " ", "\n", "\r", "\r\n", "\t", "é"]),
        0..60,
    )
    .prop_map(|parts| parts.concat())
}

/// Strings with emoji, combining marks and wide characters.
fn mixed_string() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop::sample::select(vec![
            "a", " ", "\t", "-", "😀", "👨‍👩‍👧‍👦", "🇺🇸", "e\u{301}", "中", "文", "xyz",
        ]),
        0..40,
    )
    .prop_map(|parts| parts.concat())
}

fn opts(tab_width: u32) -> WidthOptions {
    WidthOptions::new(tab_width, false)
}

// ============================================================================
// Grapheme Properties
// ============================================================================

proptest! {
    /// Graphemes are lossless: joining them back produces the original string.
    #[test]
    fn grapheme_join_is_lossless(s in utf8_string()) {
        let joined: String = graphemes(&s).collect();
        prop_assert_eq!(&joined, &s);
    }

    /// grapheme_info tiles the string with strictly increasing offsets.
    #[test]
    fn grapheme_info_tiles_string(s in mixed_string()) {
        let infos = grapheme_info(&s, WidthMethod::WcWidth);
        prop_assert_eq!(infos.len(), graphemes(&s).count());
        let mut expected = 0u32;
        for info in &infos {
            prop_assert_eq!(info.byte_offset, expected);
            prop_assert!(info.byte_len > 0);
            expected = info.byte_end();
        }
        prop_assert_eq!(expected as usize, s.len());
    }

    /// is_ascii_only matches str::is_ascii.
    #[test]
    fn is_ascii_only_matches_stdlib(s in utf8_string()) {
        prop_assert_eq!(is_ascii_only(s.as_bytes()), s.is_ascii());
    }

    /// For pure ASCII, both width methods agree.
    #[test]
    fn width_methods_agree_on_ascii(s in "[\\x20-\\x7E]{0,100}") {
        prop_assert_eq!(
            display_width_with_method(&s, WidthMethod::WcWidth),
            display_width_with_method(&s, WidthMethod::Unicode)
        );
    }
}

// ============================================================================
// Line Break Properties
// ============================================================================

proptest! {
    /// Breaks are ordered, typed by the bytes they cover, and never split CRLF.
    #[test]
    fn line_breaks_match_bytes(s in multiline_string()) {
        let bytes = s.as_bytes();
        let breaks = find_line_breaks(bytes);
        let mut last_end = 0;
        for brk in &breaks {
            prop_assert!(brk.pos >= last_end);
            let covered = &s[brk.pos..brk.end()];
            prop_assert_eq!(covered, brk.kind.as_str());
            if brk.kind == LineBreakKind::Cr {
                prop_assert_ne!(bytes.get(brk.pos + 1), Some(&b'\n'));
            }
            prop_assert!(!s[last_end..brk.pos].contains(['\n', '\r']));
            last_end = brk.end();
        }
        prop_assert!(!s[last_end..].contains(['\n', '\r']));
    }

    /// Splitting at breaks and rejoining with their bytes is lossless.
    #[test]
    fn line_breaks_round_trip(s in multiline_string()) {
        let mut rebuilt = String::new();
        let mut pos = 0;
        for brk in find_line_breaks(s.as_bytes()) {
            rebuilt.push_str(&s[pos..brk.pos]);
            rebuilt.push_str(brk.kind.as_str());
            pos = brk.end();
        }
        rebuilt.push_str(&s[pos..]);
        prop_assert_eq!(rebuilt, s);
    }
}

// ============================================================================
// Width Properties
// ============================================================================

proptest! {
    /// Clusters tile the text and their columns accumulate widths.
    #[test]
    fn clusters_tile_text(s in mixed_string(), tab in 1u32..9) {
        let mut end = 0;
        let mut col = 0;
        for cluster in Clusters::new(&s, opts(tab)) {
            prop_assert_eq!(cluster.start, end);
            prop_assert_eq!(cluster.col, col);
            end = cluster.end;
            col = cluster.end_col();
        }
        prop_assert_eq!(end, s.len());
        prop_assert_eq!(col, calculate_text_width(&s, opts(tab)));
        prop_assert_eq!(column_at_byte(&s, s.len(), opts(tab)), col);
    }

    /// The ASCII fast path measures ASCII text exactly like segmentation.
    #[test]
    fn ascii_fast_path_agrees(s in ascii_string(), tab in 1u32..9) {
        let slow = WidthOptions::new(tab, false);
        let fast = WidthOptions::new(tab, true);
        prop_assert_eq!(calculate_text_width(&s, fast), calculate_text_width(&s, slow));
        for target in 0..calculate_text_width(&s, slow) + 2 {
            prop_assert_eq!(
                find_pos_by_width(&s, target, fast, true),
                find_pos_by_width(&s, target, slow, true)
            );
        }
    }

    /// find_pos_by_width lands on a cluster boundary at or before the target
    /// column when rounding down, and at or after it when rounding up.
    #[test]
    fn pos_by_width_rounds(s in mixed_string(), target in 0u32..60) {
        let o = opts(4);
        let down = find_pos_by_width(&s, target, o, true);
        let up = find_pos_by_width(&s, target, o, false);
        prop_assert!(s.is_char_boundary(down) && s.is_char_boundary(up));
        prop_assert!(down <= up);
        prop_assert!(column_at_byte(&s, down, o) <= target);
        if up < s.len() {
            prop_assert!(column_at_byte(&s, up, o) >= target);
        }
    }

    /// Wrap positions fit the width unless a single cluster is wider.
    #[test]
    fn wrap_pos_fits(s in mixed_string(), max in 1u32..20) {
        let o = opts(4);
        let pos = find_wrap_pos_by_width(&s, max, o);
        prop_assert!(s.is_char_boundary(pos));
        if s.is_empty() {
            prop_assert_eq!(pos, 0);
        } else {
            prop_assert!(pos > 0);
            let prefix = &s[..pos];
            prop_assert!(
                calculate_text_width(prefix, o) <= max || graphemes(prefix).count() == 1
            );
        }
        if calculate_text_width(&s, o) <= max {
            prop_assert_eq!(pos, s.len());
        }
    }

    /// Word wrap always makes progress and never passes the end.
    #[test]
    fn word_wrap_pos_progresses(s in mixed_string(), max in 1u32..20) {
        let pos = find_word_wrap_pos(&s, max, opts(4), &WrapBreakSet::default());
        prop_assert!(pos <= s.len());
        prop_assert!(s.is_char_boundary(pos));
        if !s.is_empty() {
            prop_assert!(pos > 0);
        }
    }

    /// Wrapping a whole line against one list of opportunities gives the
    /// same pieces as searching each remainder separately.
    #[test]
    fn word_wrap_end_agrees_with_per_piece_search(s in mixed_string(), max in 1u32..20) {
        let set = WrapBreakSet::default();
        let breaks = find_wrap_breaks(s.as_bytes(), &set);
        let mut start = 0;
        while start < s.len() {
            let rest = &s[start..];
            let fit = start + find_wrap_pos_by_width(rest, max, opts(4));
            let end = word_wrap_end(s.as_bytes(), start, fit, &breaks);
            prop_assert_eq!(end - start, find_word_wrap_pos(rest, max, opts(4), &set));
            prop_assert!(end > start);
            start = end;
        }
    }

    /// Measuring through precomputed clusters matches scanning the text.
    #[test]
    fn shaped_text_matches_scanning(s in mixed_string(), target in 0u32..60, max in 1u32..20) {
        let o = opts(4);
        let infos = grapheme_info(&s, o.method);
        let known = ShapedText::with_clusters(&s, &infos, o);
        prop_assert_eq!(known.width(), calculate_text_width(&s, o));
        prop_assert_eq!(known.pos_by_width(target, true), find_pos_by_width(&s, target, o, true));
        prop_assert_eq!(known.pos_by_width(target, false), find_pos_by_width(&s, target, o, false));
        prop_assert_eq!(known.wrap_pos(max), find_wrap_pos_by_width(&s, max, o));
        prop_assert_eq!(known.column_at_byte(s.len()), calculate_text_width(&s, o));
    }
}
