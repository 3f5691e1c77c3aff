//! Display width calculation for terminal columns.

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Width calculation method for ambiguous-width characters.
///
/// Chosen per buffer; there is no process-wide setting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WidthMethod {
    /// POSIX-like wcwidth: ambiguous width = 1.
    #[default]
    WcWidth,
    /// Unicode East Asian Width: ambiguous width = 2.
    Unicode,
}

/// Width of a printable ASCII byte: 1 for `0x20..=0x7E`, 0 for controls.
#[inline]
#[must_use]
pub const fn ascii_byte_width(b: u8) -> u32 {
    if b >= 0x20 && b < 0x7F { 1 } else { 0 }
}

/// Get the display width of a string using a specific method.
#[must_use]
pub fn display_width_with_method(s: &str, method: WidthMethod) -> usize {
    match method {
        WidthMethod::WcWidth => UnicodeWidthStr::width(s),
        WidthMethod::Unicode => UnicodeWidthStr::width_cjk(s),
    }
}

/// Get the display width of a character using a specific method.
///
/// Includes a fast path for printable ASCII, the common case.
#[inline]
#[must_use]
pub fn display_width_char_with_method(c: char, method: WidthMethod) -> usize {
    if c.is_ascii() {
        return ascii_byte_width(c as u8) as usize;
    }
    match method {
        WidthMethod::WcWidth => UnicodeWidthChar::width(c).unwrap_or(0),
        WidthMethod::Unicode => UnicodeWidthChar::width_cjk(c).unwrap_or(0),
    }
}

/// Width of one grapheme cluster that is not a tab.
///
/// ASCII clusters (including `"\r\n"`) are summed per byte so control bytes
/// stay zero-width regardless of how `unicode-width` treats them.
#[inline]
#[must_use]
pub fn cluster_width(cluster: &str, method: WidthMethod) -> u32 {
    if cluster.is_ascii() {
        return cluster.bytes().map(ascii_byte_width).sum();
    }
    display_width_with_method(cluster, method).min(u32::MAX as usize) as u32
}

/// Columns a tab occupies when it starts at `col`.
#[inline]
#[must_use]
pub const fn tab_advance(col: u32, tab_width: u32) -> u32 {
    let tab_width = if tab_width == 0 { 1 } else { tab_width };
    tab_width - (col % tab_width)
}
