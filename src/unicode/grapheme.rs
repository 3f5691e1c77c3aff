//! Grapheme cluster iteration and boundary lookup.

use crate::unicode::width::{WidthMethod, cluster_width};
use unicode_segmentation::{GraphemeCursor, UnicodeSegmentation};

/// Grapheme metadata for layout.
///
/// Tabs are flagged rather than given a width because their advance depends
/// on the column they start at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraphemeInfo {
    pub byte_offset: u32,
    pub byte_len: u32,
    pub width: u8,
    pub is_tab: bool,
}

impl GraphemeInfo {
    /// Byte offset one past the end of the cluster.
    #[must_use]
    pub const fn byte_end(&self) -> u32 {
        self.byte_offset + self.byte_len
    }
}

/// Iterate over extended grapheme clusters in a string.
pub fn graphemes(s: &str) -> impl Iterator<Item = &str> {
    s.graphemes(true)
}

/// Iterate over grapheme clusters with byte indices.
pub fn grapheme_indices(s: &str) -> impl Iterator<Item = (usize, &str)> {
    s.grapheme_indices(true)
}

/// Compute grapheme info for a string.
///
/// Widths are saturated to `u8::MAX`; real clusters are 0, 1 or 2 columns.
#[must_use]
pub fn grapheme_info(s: &str, method: WidthMethod) -> Vec<GraphemeInfo> {
    s.grapheme_indices(true)
        .map(|(offset, g)| GraphemeInfo {
            byte_offset: offset as u32,
            byte_len: g.len() as u32,
            width: if g == "\t" {
                0
            } else {
                cluster_width(g, method).min(u32::from(u8::MAX)) as u8
            },
            is_tab: g == "\t",
        })
        .collect()
}

/// Start of the grapheme cluster that ends at or contains `offset - 1`.
///
/// Returns `None` at the start of the string.
#[must_use]
pub fn prev_grapheme_boundary(s: &str, offset: usize) -> Option<usize> {
    if offset == 0 || offset > s.len() || !s.is_char_boundary(offset) {
        return None;
    }
    let mut cursor = GraphemeCursor::new(offset, s.len(), true);
    cursor.prev_boundary(s, 0).ok().flatten()
}

/// End of the grapheme cluster starting at or containing `offset`.
///
/// Returns `None` at the end of the string.
#[must_use]
pub fn next_grapheme_boundary(s: &str, offset: usize) -> Option<usize> {
    if offset >= s.len() || !s.is_char_boundary(offset) {
        return None;
    }
    let mut cursor = GraphemeCursor::new(offset, s.len(), true);
    cursor.next_boundary(s, 0).ok().flatten()
}

/// Whether `offset` falls between two grapheme clusters of `s`.
///
/// Both ends of the string are boundaries; offsets inside a char are not.
#[must_use]
pub fn is_grapheme_boundary(s: &str, offset: usize) -> bool {
    if offset == 0 || offset == s.len() {
        return true;
    }
    if offset > s.len() || !s.is_char_boundary(offset) {
        return false;
    }
    let mut cursor = GraphemeCursor::new(offset, s.len(), true);
    cursor.is_boundary(s, 0).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graphemes_ascii() {
        let g: Vec<_> = graphemes("hello").collect();
        assert_eq!(g, vec!["h", "e", "l", "l", "o"]);
    }

    #[test]
    fn test_graphemes_emoji() {
        assert_eq!(graphemes("👨‍👩‍👧").count(), 1);
    }

    #[test]
    fn test_graphemes_combining() {
        assert_eq!(graphemes("e\u{0301}").count(), 1);
    }

    #[test]
    fn test_grapheme_info_tabs_flagged() {
        let infos = grapheme_info("ab\tc", WidthMethod::WcWidth);
        assert_eq!(infos.len(), 4);
        assert_eq!(infos[0].width, 1);
        assert!(infos[2].is_tab);
        assert_eq!(infos[2].width, 0);
        assert_eq!(infos[3].byte_offset, 3);
    }

    #[test]
    fn test_boundaries() {
        let s = "ae\u{0301}b";
        assert_eq!(prev_grapheme_boundary(s, s.len()), Some(4));
        assert_eq!(prev_grapheme_boundary(s, 4), Some(1));
        assert_eq!(prev_grapheme_boundary(s, 0), None);
        assert_eq!(next_grapheme_boundary(s, 1), Some(4));
        assert_eq!(next_grapheme_boundary(s, 4), Some(5));
        assert_eq!(next_grapheme_boundary(s, 5), None);
    }

    #[test]
    fn test_is_grapheme_boundary() {
        let s = "ae\u{0301}\r\nb";
        assert!(is_grapheme_boundary(s, 0));
        assert!(is_grapheme_boundary(s, 1));
        assert!(!is_grapheme_boundary(s, 2));
        assert!(is_grapheme_boundary(s, 4));
        assert!(!is_grapheme_boundary(s, 5));
        assert!(is_grapheme_boundary(s, s.len()));
        assert!(!is_grapheme_boundary(s, 99));
    }
}
