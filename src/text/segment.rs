//! Rope elements for the text buffer.
//!
//! A document is a sequence of [`Segment`]s of the shape
//! `LineStart Text* (Break LineStart Text*)*`: every logical line opens with
//! a zero-width [`Segment::LineStart`] marker, text lives in
//! [`TextChunk`]s that reference bytes in the memory registry, and each line
//! terminator is a [`Segment::Break`] that keeps its original bytes. An empty
//! document is a single `LineStart`.

use crate::color::Rgba;
use crate::error::Result;
use crate::style::Style;
use crate::text::mem::{MemId, MemRegistry};
use crate::text::rope::{RopeItem, Summary};
use crate::unicode::{LineBreakKind, WidthOptions, calculate_text_width, is_ascii_only};
use bitflags::bitflags;

bitflags! {
    /// Facts about a chunk computed once when it is created.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ChunkFlags: u8 {
        /// Every byte is below 0x80; width and boundaries skip segmentation.
        const ASCII_ONLY = 0x01;
        /// Contains at least one tab, so width depends on the start column.
        const HAS_TAB    = 0x02;
    }
}

/// A run of text without line breaks, referencing registry bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextChunk {
    pub mem: MemId,
    pub start: usize,
    pub end: usize,
    /// Display width when the chunk starts at column 0.
    pub width: u32,
    pub chars: usize,
    pub flags: ChunkFlags,
}

impl TextChunk {
    /// Measure `[start, end)` of `mem` and build a chunk for it.
    pub fn new(
        registry: &MemRegistry,
        mem: MemId,
        start: usize,
        end: usize,
        opts: WidthOptions,
    ) -> Result<Self> {
        let text = registry.slice(mem, start, end)?;
        Ok(Self::measure_text(mem, start, text, opts))
    }

    /// Build a chunk for `text`, which starts at `start` inside `mem`.
    pub(crate) fn measure_text(mem: MemId, start: usize, text: &str, opts: WidthOptions) -> Self {
        let mut flags = ChunkFlags::empty();
        if is_ascii_only(text.as_bytes()) {
            flags |= ChunkFlags::ASCII_ONLY;
        }
        if text.as_bytes().contains(&b'\t') {
            flags |= ChunkFlags::HAS_TAB;
        }
        let opts = WidthOptions {
            ascii_fast: opts.ascii_fast && flags.contains(ChunkFlags::ASCII_ONLY),
            ..opts
        };
        Self {
            mem,
            start,
            end: start + text.len(),
            width: calculate_text_width(text, opts),
            chars: if flags.contains(ChunkFlags::ASCII_ONLY) {
                text.len()
            } else {
                text.chars().count()
            },
            flags,
        }
    }

    /// Zero-length chunk pointing nowhere; the rope's miss sentinel.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            mem: MemId::DANGLING,
            start: 0,
            end: 0,
            width: 0,
            chars: 0,
            flags: ChunkFlags::ASCII_ONLY,
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end == self.start
    }

    #[must_use]
    pub fn is_ascii(&self) -> bool {
        self.flags.contains(ChunkFlags::ASCII_ONLY)
    }

    /// Text of this chunk.
    pub fn text<'r>(&self, registry: &'r MemRegistry) -> Result<&'r str> {
        registry.slice(self.mem, self.start, self.end)
    }
}

/// Rope element: text, a line-start marker, or a line terminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segment {
    Text(TextChunk),
    LineStart,
    Break(LineBreakKind),
}

impl Segment {
    /// Bytes this segment contributes to the document string.
    #[must_use]
    pub const fn byte_len(&self) -> usize {
        match self {
            Self::Text(chunk) => chunk.len(),
            Self::LineStart => 0,
            Self::Break(kind) => kind.len(),
        }
    }

    #[must_use]
    pub const fn as_text(&self) -> Option<&TextChunk> {
        match self {
            Self::Text(chunk) => Some(chunk),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_line_start(&self) -> bool {
        matches!(self, Self::LineStart)
    }
}

/// Marker kinds tracked by the rope's marker index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LineMarker {
    /// Start of a logical line; ordinal `n` is line `n`.
    LineStart,
    /// A line terminator; ordinal `n` ends line `n`.
    Break,
}

/// Aggregate metrics of a run of segments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextSummary {
    pub bytes: usize,
    pub chars: usize,
    /// Sum of column-0 chunk widths; exact unless chunks contain tabs.
    pub width: u64,
    /// Number of line starts.
    pub lines: usize,
}

impl Summary for TextSummary {
    fn add(&mut self, other: &Self) {
        self.bytes += other.bytes;
        self.chars += other.chars;
        self.width += other.width;
        self.lines += other.lines;
    }
}

impl RopeItem for Segment {
    type Summary = TextSummary;
    type Marker = LineMarker;

    fn measure(&self) -> TextSummary {
        match self {
            Self::Text(chunk) => TextSummary {
                bytes: chunk.len(),
                chars: chunk.chars,
                width: u64::from(chunk.width),
                lines: 0,
            },
            Self::LineStart => TextSummary {
                lines: 1,
                ..TextSummary::default()
            },
            Self::Break(kind) => TextSummary {
                bytes: kind.len(),
                chars: kind.len(),
                ..TextSummary::default()
            },
        }
    }

    fn marker(&self) -> Option<LineMarker> {
        match self {
            Self::Text(_) => None,
            Self::LineStart => Some(LineMarker::LineStart),
            Self::Break(_) => Some(LineMarker::Break),
        }
    }

    fn empty() -> Self {
        Self::Text(TextChunk::empty())
    }
}

/// A chunk of styled text for building buffer content in one pass.
#[derive(Clone, Debug)]
pub struct StyledChunk<'a> {
    pub text: &'a str,
    pub style: Style,
}

impl<'a> StyledChunk<'a> {
    #[must_use]
    pub fn new(text: &'a str, style: Style) -> Self {
        Self { text, style }
    }

    /// Chunk from raw colors and an attribute bitmask.
    #[must_use]
    pub fn from_parts(text: &'a str, fg: Option<Rgba>, bg: Option<Rgba>, attributes: u8) -> Self {
        Self {
            text,
            style: Style::new(fg, bg, attributes),
        }
    }

    /// Create an unstyled chunk.
    #[must_use]
    pub fn plain(text: &'a str) -> Self {
        Self {
            text,
            style: Style::NONE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_flags_and_width() {
        let mut reg = MemRegistry::new();
        let mem = reg.register("ab\tcd漢").unwrap();
        let opts = WidthOptions::new(4, true);

        let ascii = TextChunk::new(&reg, mem, 0, 5, opts).unwrap();
        assert!(ascii.is_ascii());
        assert!(ascii.flags.contains(ChunkFlags::HAS_TAB));
        assert_eq!(ascii.width, 6);
        assert_eq!(ascii.chars, 5);

        let wide = TextChunk::new(&reg, mem, 5, 8, opts).unwrap();
        assert!(!wide.is_ascii());
        assert_eq!(wide.width, 2);
        assert_eq!(wide.chars, 1);
    }

    #[test]
    fn test_segment_measure() {
        let brk = Segment::Break(LineBreakKind::CrLf);
        assert_eq!(brk.measure().bytes, 2);
        assert_eq!(brk.marker(), Some(LineMarker::Break));
        assert_eq!(Segment::LineStart.measure().lines, 1);
        assert_eq!(Segment::LineStart.byte_len(), 0);
        assert!(Segment::empty().as_text().is_some_and(TextChunk::is_empty));
    }

    #[test]
    fn test_styled_chunk_from_parts() {
        let chunk = StyledChunk::from_parts("x", Some(Rgba::RED), None, 0x01);
        assert_eq!(chunk.style, Style::fg(Rgba::RED).with_bold());
    }
}
