//! Fuzz target for text buffer editing and view coordinate mapping.
//!
//! Invalid offsets must come back as errors, never panics, and accepted
//! edits must keep line accounting equal to a fresh load of the same text.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use opentui_text::{TextBuffer, TextBufferView, WrapMode};

#[derive(Arbitrary, Debug)]
enum Op<'a> {
    Insert(u16, &'a str),
    Delete(u16, u16),
    Backspace(u16),
    Type(&'a str),
    SetCursor(u16, u8),
    Append(&'a str),
}

fuzz_target!(|input: (&str, Vec<Op<'_>>, u8, u8)| {
    let (initial, ops, width, mode) = input;
    let Ok(mut buffer) = TextBuffer::with_text(initial) else {
        return;
    };

    for op in ops.into_iter().take(64) {
        let _ = match op {
            Op::Insert(at, text) => buffer.insert_text_at(usize::from(at), text),
            Op::Delete(a, b) => buffer.delete_range_bytes(usize::from(a), usize::from(b)),
            Op::Backspace(at) => buffer
                .set_cursor_offset(usize::from(at))
                .and_then(|()| buffer.backspace().map(|_| ())),
            Op::Type(text) => buffer.insert_text(text),
            Op::SetCursor(row, col) => buffer.set_cursor(usize::from(row), u32::from(col)),
            Op::Append(text) => buffer.append(text),
        };
        let text = buffer.to_string();
        assert_eq!(buffer.len_bytes(), text.len());
        assert!(buffer.cursor_offset() <= text.len());
        if let Ok(fresh) = TextBuffer::with_text(&text) {
            assert_eq!(buffer.line_count(), fresh.line_count());
        }
    }

    buffer.rebuild_marker_index();
    let mode = match mode % 3 {
        0 => WrapMode::None,
        1 => WrapMode::Char,
        _ => WrapMode::Word,
    };
    let view = TextBufferView::new(&buffer)
        .viewport(0, 0, u32::from(width).max(1), 24)
        .wrap_mode(mode);
    let text = buffer.to_string();
    for offset in (0..=text.len().min(512)).filter(|&o| text.is_char_boundary(o)) {
        assert_eq!(
            view.offset_to_coords(offset).ok(),
            view.offset_to_coords_fast(offset).ok()
        );
    }
});
