//! Fuzz target for the line, wrap and width scanners.
//!
//! Every scanner must accept arbitrary text and return positions that are
//! in bounds and on char boundaries.

#![no_main]

use libfuzzer_sys::fuzz_target;
use opentui_text::unicode::{
    WidthOptions, WrapBreakSet, calculate_text_width, find_line_breaks, find_pos_by_width,
    find_word_wrap_pos, find_wrap_breaks, find_wrap_pos_by_width, is_ascii_only,
};

fuzz_target!(|input: (&str, u8, u8, bool)| {
    let (text, max, tab, ascii_fast) = input;
    let opts = WidthOptions::new(u32::from(tab % 17), ascii_fast && text.is_ascii());
    let bytes = text.as_bytes();

    assert_eq!(is_ascii_only(bytes), text.is_ascii());

    let mut last = 0;
    for brk in find_line_breaks(bytes) {
        assert!(brk.pos >= last && brk.end() <= bytes.len());
        last = brk.end();
    }

    for brk in find_wrap_breaks(bytes, &WrapBreakSet::default()) {
        assert!(brk.pos < bytes.len());
    }

    let width = calculate_text_width(text, opts);
    let max = u32::from(max);

    let pos = find_pos_by_width(text, max, opts, true);
    assert!(text.is_char_boundary(pos));
    let wrap = find_wrap_pos_by_width(text, max.max(1), opts);
    assert!(text.is_char_boundary(wrap));
    assert!(text.is_empty() || wrap > 0);
    if width <= max.max(1) {
        assert_eq!(wrap, text.len());
    }
    let word = find_word_wrap_pos(text, max.max(1), opts, &WrapBreakSet::default());
    assert!(text.is_char_boundary(word));
});
