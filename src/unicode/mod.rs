//! Unicode utilities: grapheme handling, display width and text scanning.

mod grapheme;
pub mod scan;
mod width;

pub use grapheme::{
    GraphemeInfo, grapheme_indices, grapheme_info, graphemes, is_grapheme_boundary,
    next_grapheme_boundary, prev_grapheme_boundary,
};
pub use scan::{
    Cluster, Clusters, LineBreak, LineBreakKind, ShapedText, WidthOptions, WrapBreak,
    WrapBreakSet, calculate_text_width, column_at_byte, find_line_breaks, find_pos_by_width,
    find_word_wrap_pos, find_wrap_breaks, find_wrap_pos_by_width, is_ascii_only,
    word_wrap_end,
};
pub use width::{
    WidthMethod, ascii_byte_width, cluster_width, display_width_char_with_method,
    display_width_with_method, tab_advance,
};
