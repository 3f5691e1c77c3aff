//! Text metrics scanner: stateless passes over raw text.
//!
//! Everything here is a pure function of its input slice. Byte-oriented
//! scans (ASCII detection, line breaks) work a machine word at a time and fall
//! back to per-byte inspection only around interesting bytes. Width functions
//! walk grapheme clusters, or single bytes on the ASCII fast path, with a
//! running column so tabs expand to the next multiple of the tab width.
//!
//! `find_pos_by_width` is the inverse of `calculate_text_width`: for any
//! cluster boundary `p`, `find_pos_by_width(s, width(&s[..p]), ..)` returns a
//! boundary whose prefix width equals `width(&s[..p])`.

use crate::unicode::grapheme::GraphemeInfo;
use crate::unicode::width::{WidthMethod, ascii_byte_width, cluster_width, tab_advance};
use std::ops::Range;
use unicode_segmentation::{GraphemeIndices, UnicodeSegmentation};

const LO_BYTES: u64 = 0x0101_0101_0101_0101;
const HI_BITS: u64 = 0x8080_8080_8080_8080;

/// Kind of a hard line break.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LineBreakKind {
    /// `\n`
    Lf,
    /// `\r`
    Cr,
    /// `\r\n`, counted as one break.
    CrLf,
}

impl LineBreakKind {
    /// Number of bytes the break occupies.
    #[must_use]
    pub const fn len(self) -> usize {
        match self {
            Self::Lf | Self::Cr => 1,
            Self::CrLf => 2,
        }
    }

    /// The break's text.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::Cr => "\r",
            Self::CrLf => "\r\n",
        }
    }
}

/// A hard line break found by [`find_line_breaks`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineBreak {
    /// Byte offset of the first byte of the break.
    pub pos: usize,
    pub kind: LineBreakKind,
}

impl LineBreak {
    /// Byte offset just past the break.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.pos + self.kind.len()
    }
}

/// A soft-wrap opportunity: a line may be broken right after `pos`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WrapBreak {
    pub pos: usize,
    pub byte: u8,
}

/// ASCII bytes after which word wrapping may break a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WrapBreakSet {
    table: [bool; 128],
}

impl Default for WrapBreakSet {
    fn default() -> Self {
        Self::whitespace_only().with_bytes(b"-/\\.,;:!?)]}")
    }
}

impl WrapBreakSet {
    /// Break only after spaces and tabs.
    #[must_use]
    pub const fn whitespace_only() -> Self {
        let mut table = [false; 128];
        table[b' ' as usize] = true;
        table[b'\t' as usize] = true;
        Self { table }
    }

    /// Add break bytes. Non-ASCII bytes are ignored.
    #[must_use]
    pub fn with_bytes(mut self, bytes: &[u8]) -> Self {
        for &b in bytes {
            if let Some(slot) = self.table.get_mut(usize::from(b)) {
                *slot = true;
            }
        }
        self
    }

    /// Whether a line may break after `b`.
    #[inline]
    #[must_use]
    pub fn contains(&self, b: u8) -> bool {
        self.table.get(usize::from(b)).copied().unwrap_or(false)
    }
}

/// Width parameters shared by every width-aware scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WidthOptions {
    /// Columns per tab stop (0 is treated as 1).
    pub tab_width: u32,
    /// Ambiguous-width policy for non-ASCII clusters.
    pub method: WidthMethod,
    /// Treat the text as ASCII: one byte is one cluster, no segmentation.
    pub ascii_fast: bool,
}

impl Default for WidthOptions {
    fn default() -> Self {
        Self {
            tab_width: 4,
            method: WidthMethod::WcWidth,
            ascii_fast: false,
        }
    }
}

impl WidthOptions {
    /// Options with the given tab width and fast-path hint.
    #[must_use]
    pub fn new(tab_width: u32, ascii_fast: bool) -> Self {
        Self {
            tab_width,
            ascii_fast,
            ..Self::default()
        }
    }

    /// Same options with a different width method.
    #[must_use]
    pub const fn with_method(self, method: WidthMethod) -> Self {
        Self { method, ..self }
    }
}

/// One grapheme cluster (or byte, on the fast path) with its layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cluster {
    pub start: usize,
    pub end: usize,
    /// Column the cluster starts at.
    pub col: u32,
    /// Columns the cluster occupies at that column.
    pub width: u32,
}

impl Cluster {
    /// Column just past the cluster.
    #[must_use]
    pub const fn end_col(&self) -> u32 {
        self.col + self.width
    }
}

enum ClusterSource<'a> {
    Ascii { pos: usize },
    Graphemes(GraphemeIndices<'a>),
    /// Clusters measured earlier, offsets shifted by `base`.
    Cached {
        infos: std::slice::Iter<'a, GraphemeInfo>,
        base: usize,
    },
}

/// Iterator over the clusters of a string with running columns.
pub struct Clusters<'a> {
    text: &'a str,
    source: ClusterSource<'a>,
    col: u32,
    opts: WidthOptions,
}

impl<'a> Clusters<'a> {
    /// Walk `text` starting at column 0.
    #[must_use]
    pub fn new(text: &'a str, opts: WidthOptions) -> Self {
        Self::starting_at(text, 0, opts)
    }

    /// Walk `text` as if its first cluster started at `col`.
    #[must_use]
    pub fn starting_at(text: &'a str, col: u32, opts: WidthOptions) -> Self {
        let source = if opts.ascii_fast {
            ClusterSource::Ascii { pos: 0 }
        } else {
            ClusterSource::Graphemes(text.grapheme_indices(true))
        };
        Self {
            text,
            source,
            col,
            opts,
        }
    }

    /// Walk clusters that were already segmented and measured.
    ///
    /// `infos` describe a string that `text` begins `base` bytes into. Tabs
    /// are still expanded against the running column.
    #[must_use]
    pub fn from_graphemes(
        text: &'a str,
        infos: &'a [GraphemeInfo],
        base: usize,
        opts: WidthOptions,
    ) -> Self {
        Self {
            text,
            source: ClusterSource::Cached {
                infos: infos.iter(),
                base,
            },
            col: 0,
            opts,
        }
    }
}

impl Iterator for Clusters<'_> {
    type Item = Cluster;

    fn next(&mut self) -> Option<Cluster> {
        let (start, end, width) = match &mut self.source {
            ClusterSource::Ascii { pos } => {
                let bytes = self.text.as_bytes();
                let b = *bytes.get(*pos)?;
                let start = *pos;
                // A non-ASCII char on the fast path still advances by whole
                // chars so every reported offset stays a char boundary.
                let len = match b {
                    0x00..=0x7F => 1,
                    0xC0..=0xDF => 2,
                    0xE0..=0xEF => 3,
                    _ => 4,
                }
                .min(bytes.len() - start);
                *pos += len;
                let width = match b {
                    b'\t' => tab_advance(self.col, self.opts.tab_width),
                    0x00..=0x7F => ascii_byte_width(b),
                    _ => 1,
                };
                (start, start + len, width)
            }
            ClusterSource::Graphemes(iter) => {
                let (start, g) = iter.next()?;
                let width = if g == "\t" {
                    tab_advance(self.col, self.opts.tab_width)
                } else {
                    cluster_width(g, self.opts.method)
                };
                (start, start + g.len(), width)
            }
            ClusterSource::Cached { infos, base } => {
                let info = infos.next()?;
                let len = self.text.len();
                let start = (info.byte_offset as usize).saturating_sub(*base).min(len);
                let end = (info.byte_end() as usize).saturating_sub(*base).min(len);
                let width = if info.is_tab {
                    tab_advance(self.col, self.opts.tab_width)
                } else {
                    u32::from(info.width)
                };
                (start, end, width)
            }
        };
        let cluster = Cluster {
            start,
            end,
            col: self.col,
            width,
        };
        self.col += width;
        Some(cluster)
    }
}

#[inline]
fn word_at(bytes: &[u8], i: usize) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&bytes[i..i + 8]);
    u64::from_le_bytes(arr)
}

#[inline]
const fn has_zero_byte(v: u64) -> bool {
    v.wrapping_sub(LO_BYTES) & !v & HI_BITS != 0
}

#[inline]
const fn has_byte(word: u64, b: u8) -> bool {
    has_zero_byte(word ^ (LO_BYTES * b as u64))
}

/// Check whether every byte is below 0x80.
///
/// Scans eight bytes per step and stops at the first word holding a
/// non-ASCII byte.
#[must_use]
pub fn is_ascii_only(bytes: &[u8]) -> bool {
    let mut words = bytes.chunks_exact(8);
    for chunk in words.by_ref() {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(chunk);
        if u64::from_ne_bytes(arr) & HI_BITS != 0 {
            return false;
        }
    }
    words.remainder().iter().all(|&b| b < 0x80)
}

/// Find hard line breaks in ascending order.
///
/// `\r\n` is reported once, as [`LineBreakKind::CrLf`] at the `\r`.
#[must_use]
pub fn find_line_breaks(bytes: &[u8]) -> Vec<LineBreak> {
    let mut breaks = Vec::new();
    let len = bytes.len();
    let mut i = 0;
    while i < len {
        if i + 8 <= len {
            let word = word_at(bytes, i);
            if !has_byte(word, b'\n') && !has_byte(word, b'\r') {
                i += 8;
                continue;
            }
        }
        match bytes[i] {
            b'\n' => {
                breaks.push(LineBreak {
                    pos: i,
                    kind: LineBreakKind::Lf,
                });
                i += 1;
            }
            b'\r' if bytes.get(i + 1) == Some(&b'\n') => {
                breaks.push(LineBreak {
                    pos: i,
                    kind: LineBreakKind::CrLf,
                });
                i += 2;
            }
            b'\r' => {
                breaks.push(LineBreak {
                    pos: i,
                    kind: LineBreakKind::Cr,
                });
                i += 1;
            }
            _ => i += 1,
        }
    }
    breaks
}

/// Find word-wrap opportunities: positions of bytes in `set`.
#[must_use]
pub fn find_wrap_breaks(bytes: &[u8], set: &WrapBreakSet) -> Vec<WrapBreak> {
    bytes
        .iter()
        .enumerate()
        .filter(|&(_, &b)| set.contains(b))
        .map(|(pos, &byte)| WrapBreak { pos, byte })
        .collect()
}

/// Text to measure, with its grapheme clusters when they are already known.
///
/// Without known clusters the text is segmented on the fly, or walked byte
/// by byte when the options allow the ASCII fast path.
#[derive(Clone, Copy, Debug)]
pub struct ShapedText<'a> {
    text: &'a str,
    clusters: Option<&'a [GraphemeInfo]>,
    /// Offset of `text` within the string `clusters` describe.
    base: usize,
    opts: WidthOptions,
}

impl<'a> ShapedText<'a> {
    /// Text whose clusters are found while scanning.
    #[must_use]
    pub const fn new(text: &'a str, opts: WidthOptions) -> Self {
        Self {
            text,
            clusters: None,
            base: 0,
            opts,
        }
    }

    /// Text with precomputed clusters. `clusters` must tile `text`.
    #[must_use]
    pub const fn with_clusters(
        text: &'a str,
        clusters: &'a [GraphemeInfo],
        opts: WidthOptions,
    ) -> Self {
        Self {
            text,
            clusters: Some(clusters),
            base: 0,
            opts,
        }
    }

    #[must_use]
    pub const fn text(&self) -> &'a str {
        self.text
    }

    #[must_use]
    pub const fn options(&self) -> WidthOptions {
        self.opts
    }

    /// The part of the text in `range`, whose ends lie on cluster boundaries.
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Self {
        let text = self.text.get(range.clone()).unwrap_or_default();
        let clusters = self.clusters.map(|infos| {
            let lo = self.base + range.start;
            let hi = self.base + range.end;
            let from = infos.partition_point(|info| (info.byte_offset as usize) < lo);
            let to = infos.partition_point(|info| (info.byte_offset as usize) < hi);
            &infos[from..to.max(from)]
        });
        Self {
            text,
            clusters,
            base: self.base + range.start,
            opts: self.opts,
        }
    }

    /// Clusters of the text with running columns from 0.
    #[must_use]
    pub fn clusters(&self) -> Clusters<'a> {
        match self.clusters {
            Some(infos) => Clusters::from_graphemes(self.text, infos, self.base, self.opts),
            None => Clusters::new(self.text, self.opts),
        }
    }

    /// Display width starting at column 0.
    #[must_use]
    pub fn width(&self) -> u32 {
        if self.clusters.is_none() && self.opts.ascii_fast && !self.text.as_bytes().contains(&b'\t')
        {
            return self
                .text
                .bytes()
                .map(|b| if b < 0x80 { ascii_byte_width(b) } else { u32::from(b >= 0xC0) })
                .sum();
        }
        self.clusters().map(|c| c.width).sum()
    }

    /// See [`column_at_byte`].
    #[must_use]
    pub fn column_at_byte(&self, byte: usize) -> u32 {
        let mut col = 0;
        for cluster in self.clusters() {
            if cluster.end > byte {
                break;
            }
            col = cluster.end_col();
        }
        col
    }

    /// See [`find_pos_by_width`].
    #[must_use]
    pub fn pos_by_width(&self, target: u32, include_start_before: bool) -> usize {
        for cluster in self.clusters() {
            if cluster.col >= target {
                return cluster.start;
            }
            if target < cluster.end_col() {
                return if include_start_before {
                    cluster.start
                } else {
                    cluster.end
                };
            }
        }
        self.text.len()
    }

    /// See [`find_wrap_pos_by_width`].
    #[must_use]
    pub fn wrap_pos(&self, max_columns: u32) -> usize {
        for cluster in self.clusters() {
            if cluster.end_col() > max_columns {
                return if cluster.start == 0 {
                    cluster.end
                } else {
                    cluster.start
                };
            }
        }
        self.text.len()
    }
}

/// Display width of `text` starting at column 0.
#[must_use]
pub fn calculate_text_width(text: &str, opts: WidthOptions) -> u32 {
    ShapedText::new(text, opts).width()
}

/// Column reached after the clusters that end at or before `byte`.
///
/// A cluster straddling `byte` is not counted.
#[must_use]
pub fn column_at_byte(text: &str, byte: usize, opts: WidthOptions) -> u32 {
    ShapedText::new(text, opts).column_at_byte(byte)
}

/// Byte offset of the cluster boundary at display column `target`.
///
/// When `target` falls strictly inside a multi-column cluster (a wide
/// character or an expanded tab), `include_start_before` rounds down to the
/// cluster's start; otherwise the position rounds up to its end. Targets
/// past the end of the text return `text.len()`.
#[must_use]
pub fn find_pos_by_width(
    text: &str,
    target: u32,
    opts: WidthOptions,
    include_start_before: bool,
) -> usize {
    ShapedText::new(text, opts).pos_by_width(target, include_start_before)
}

/// Longest cluster-aligned prefix that fits in `max_columns`.
///
/// Always consumes at least one cluster of non-empty text so wrapping makes
/// progress even when a single cluster is wider than the line.
#[must_use]
pub fn find_wrap_pos_by_width(text: &str, max_columns: u32, opts: WidthOptions) -> usize {
    ShapedText::new(text, opts).wrap_pos(max_columns)
}

/// End of a word-wrapped piece of `bytes` that starts at `start`.
///
/// `fit` is where a cluster break would end the piece. `breaks` holds the
/// wrap opportunities of all of `bytes` in ascending order, so a whole line
/// is scanned for them once. Whitespace right at `fit` hangs on the piece;
/// with no opportunity inside the piece the cluster break stands.
#[must_use]
pub fn word_wrap_end(bytes: &[u8], start: usize, fit: usize, breaks: &[WrapBreak]) -> usize {
    if fit >= bytes.len() {
        return bytes.len();
    }
    if matches!(bytes[fit], b' ' | b'\t') {
        let run = bytes[fit..]
            .iter()
            .take_while(|&&b| matches!(b, b' ' | b'\t'))
            .count();
        return fit + run;
    }
    let before = breaks.partition_point(|brk| brk.pos < fit);
    match before.checked_sub(1).and_then(|i| breaks.get(i)) {
        Some(brk) if brk.pos >= start => brk.pos + 1,
        _ => fit,
    }
}

/// Word-mode variant of [`find_wrap_pos_by_width`].
///
/// Breaks after the last wrap opportunity inside the fitting prefix.
/// Whitespace right at the limit hangs on the current line instead of
/// starting the next one. A word longer than the line falls back to a
/// cluster break.
#[must_use]
pub fn find_word_wrap_pos(
    text: &str,
    max_columns: u32,
    opts: WidthOptions,
    set: &WrapBreakSet,
) -> usize {
    let bytes = text.as_bytes();
    let fit = find_wrap_pos_by_width(text, max_columns, opts);
    let breaks = find_wrap_breaks(&bytes[..fit.min(bytes.len())], set);
    word_wrap_end(bytes, 0, fit, &breaks)
}
