//! Property-based tests for the text buffer and its wrapping view.
//!
//! Buffer edits are mirrored on a `String`; views are checked for layout
//! invariants and for agreement between the walking and the indexed
//! coordinate paths.

use opentui_text::unicode::{grapheme_indices, graphemes};
use opentui_text::{TextBuffer, TextBufferView, WrapMode};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

const PIECES: &[&str] = &[
    "a", "b", "xyz", " ", "  ", "\t", "\n", "\r", "\r\n", "é", "e\u{301}", "漢", "字", "👍", "-",
    ".",
];

/// Strings assembled from whole pieces. Only a lone CR followed by an LF
/// joins two pieces into one cluster.
fn doc_text(max: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(PIECES), 0..max).prop_map(|p| p.concat())
}

fn wrap_mode() -> impl Strategy<Value = WrapMode> {
    prop_oneof![
        Just(WrapMode::None),
        Just(WrapMode::Char),
        Just(WrapMode::Word),
    ]
}

#[derive(Clone, Debug)]
enum Edit {
    Insert(usize, String),
    Delete(usize, usize),
    Backspace(usize),
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        3 => (any::<usize>(), doc_text(6)).prop_map(|(p, s)| Edit::Insert(p, s)),
        2 => (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Edit::Delete(a, b)),
        1 => any::<usize>().prop_map(Edit::Backspace),
    ]
}

/// Grapheme boundaries of `text`, including both ends.
fn boundaries(text: &str) -> Vec<usize> {
    let mut out: Vec<usize> = grapheme_indices(text).map(|(i, _)| i).collect();
    out.push(text.len());
    out
}

/// Lines split at CRLF, lone CR and LF alike.
fn model_lines(text: &str) -> Vec<String> {
    text.replace("\r\n", "\n")
        .split(['\n', '\r'])
        .map(str::to_string)
        .collect()
}

// ============================================================================
// Buffer editing
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(96))]

    /// Edits at grapheme boundaries keep the buffer equal to a string model.
    #[test]
    fn edits_match_string_model(
        initial in doc_text(40),
        edits in prop::collection::vec(edit(), 1..30),
    ) {
        let mut buffer = TextBuffer::with_text(&initial).unwrap();
        let mut model = initial;

        for edit in &edits {
            let bounds = boundaries(&model);
            let pick = |n: usize| bounds[n % bounds.len()];
            match edit {
                Edit::Insert(p, text) => {
                    let pos = pick(*p);
                    buffer.insert_text_at(pos, text).unwrap();
                    model.insert_str(pos, text);
                }
                Edit::Delete(a, b) => {
                    let (a, b) = (pick(*a), pick(*b));
                    let (start, end) = (a.min(b), a.max(b));
                    buffer.delete_range_bytes(start, end).unwrap();
                    model.replace_range(start..end, "");
                }
                Edit::Backspace(p) => {
                    let pos = pick(*p);
                    buffer.set_cursor_offset(pos).unwrap();
                    let deleted = buffer.backspace().unwrap();
                    match grapheme_indices(&model[..pos]).last() {
                        Some((start, _)) => {
                            prop_assert!(deleted);
                            model.replace_range(start..pos, "");
                            // A CR and an LF brought together become one
                            // terminator, and the cursor moves before it.
                            let joined = model[..start].ends_with('\r')
                                && model[start..].starts_with('\n');
                            let expected = if joined { start - 1 } else { start };
                            prop_assert_eq!(buffer.cursor_offset(), expected);
                        }
                        None => prop_assert!(!deleted),
                    }
                }
            }
            prop_assert_eq!(buffer.to_string(), model.clone());
        }

        prop_assert_eq!(buffer.len_bytes(), model.len());
        prop_assert_eq!(buffer.len_chars(), model.chars().count());
        prop_assert_eq!(buffer.lines(), model_lines(&model));
        prop_assert_eq!(buffer.line_count(), model_lines(&model).len());
        prop_assert!(buffer.rope().check_invariants().is_ok());
    }

    /// Logical line/column conversion round-trips at grapheme boundaries.
    #[test]
    fn line_col_round_trip(text in doc_text(60)) {
        let buffer = TextBuffer::with_text(&text).unwrap();
        for offset in boundaries(&text) {
            let (row, col) = buffer.offset_to_line_col(offset).unwrap();
            prop_assert_eq!(buffer.line_col_to_offset(row, col).unwrap(), offset);
        }
    }
}

// ============================================================================
// View layout and coordinates
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(96))]

    /// Virtual lines tile every logical line in order, and only a single
    /// cluster or hanging whitespace may exceed the wrap width.
    #[test]
    fn wrapped_lines_tile_source(
        text in doc_text(80),
        mode in wrap_mode(),
        width in 1..16u32,
    ) {
        let buffer = TextBuffer::with_text(&text).unwrap();
        let view = TextBufferView::new(&buffer).viewport(0, 0, width, 10).wrap_mode(mode);
        let lines = view.virtual_lines();

        let mut next_source = 0;
        for (i, line) in lines.iter().enumerate() {
            let range = buffer.line_byte_range(line.source_line).unwrap();
            if line.is_wrap {
                prop_assert_eq!(line.byte_start, lines[i - 1].byte_end);
            } else {
                prop_assert_eq!(line.source_line, next_source);
                prop_assert_eq!(line.byte_start, range.start);
                next_source += 1;
            }
            let last = lines.get(i + 1).is_none_or(|n| !n.is_wrap);
            if last {
                prop_assert_eq!(line.byte_end, range.end);
            }

            if mode != WrapMode::None {
                let content = &text[line.byte_start..line.byte_end];
                let trimmed = content.trim_end_matches([' ', '\t']);
                let trimmed_width = opentui_text::unicode::calculate_text_width(
                    trimmed,
                    buffer.width_options(),
                );
                prop_assert!(
                    trimmed_width <= width || graphemes(trimmed).count() <= 1,
                    "{:?} is {} columns at width {}", content, trimmed_width, width
                );
            }
        }
        prop_assert_eq!(next_source, buffer.line_count());

        let measure = view.measure_for_dimensions(width, 10);
        prop_assert_eq!(measure.line_count, lines.len());
    }

    /// The walking and the indexed coordinate paths agree everywhere.
    #[test]
    fn fast_and_slow_coordinates_agree(
        text in doc_text(60),
        mode in wrap_mode(),
        width in 1..12u32,
    ) {
        let mut buffer = TextBuffer::with_text(&text).unwrap();
        buffer.rebuild_marker_index();
        let view = TextBufferView::new(&buffer).viewport(0, 0, width, 10).wrap_mode(mode);

        for offset in 0..=text.len() + 1 {
            prop_assert_eq!(
                view.offset_to_coords(offset),
                view.offset_to_coords_fast(offset),
                "offset {}", offset
            );
        }
        let max_col = view.line_info().max_width + 2;
        for row in 0..=view.virtual_line_count() {
            for col in 0..max_col {
                prop_assert_eq!(
                    view.coords_to_offset(row, col),
                    view.coords_to_offset_fast(row, col),
                    "({}, {})", row, col
                );
            }
        }
    }

    /// Offsets at grapheme boundaries survive a trip through screen
    /// coordinates.
    #[test]
    fn view_coordinates_round_trip(
        text in doc_text(60),
        mode in wrap_mode(),
        width in 1..12u32,
    ) {
        let buffer = TextBuffer::with_text(&text).unwrap();
        let view = TextBufferView::new(&buffer).viewport(0, 0, width, 10).wrap_mode(mode);
        for offset in boundaries(&text) {
            let (row, col) = view.offset_to_coords(offset).unwrap();
            prop_assert_eq!(view.coords_to_offset(row, col).unwrap(), offset);
        }
    }
}
