//! Text buffer view with viewport and wrapping.
//!
//! A [`TextBufferView`] lays the buffer's logical lines out as virtual
//! lines for a wrap mode and width, caches the layout per buffer revision,
//! and maps between byte offsets and `(virtual row, display column)`.
//!
//! Coordinate mapping has two paths that always agree:
//!
//! - [`TextBufferView::coords_to_offset`] / [`TextBufferView::offset_to_coords`]
//!   walk the rope line by line and re-wrap each line on the way.
//! - The `_fast` variants use the view's line cache to find the logical line
//!   and the buffer's marker index to find its start, then wrap only that
//!   line. They fail with [`Error::StaleMarkerIndex`] when the buffer's
//!   marker index was not rebuilt after the last edit.

// Layout code reads better with a few long functions
#![allow(clippy::too_many_lines)]

use crate::error::{Error, Result};
use crate::style::Style;
use crate::text::buffer::TextBufferOptions;
use crate::text::{LineRef, TextBuffer};
use crate::unicode::{ShapedText, WrapBreakSet, find_wrap_breaks, word_wrap_end};
use smallvec::{SmallVec, smallvec};
use std::borrow::Cow;
use std::cell::RefCell;
use std::ops::ControlFlow;

/// Text wrapping mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WrapMode {
    /// No wrapping - lines extend beyond viewport.
    #[default]
    None,
    /// Wrap at grapheme cluster boundaries.
    Char,
    /// Wrap after whitespace and punctuation, falling back to clusters.
    Word,
}

/// Viewport configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Create a new viewport.
    #[must_use]
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Selection over document byte offsets.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
    pub style: Style,
}

impl Selection {
    /// Create a new selection.
    #[must_use]
    pub fn new(start: usize, end: usize, style: Style) -> Self {
        Self { start, end, style }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Get normalized (start <= end) selection.
    #[must_use]
    pub fn normalized(&self) -> Self {
        if self.start <= self.end {
            *self
        } else {
            Self {
                start: self.end,
                end: self.start,
                style: self.style,
            }
        }
    }

    /// Check if position is within selection.
    #[must_use]
    pub fn contains(&self, pos: usize) -> bool {
        let norm = self.normalized();
        pos >= norm.start && pos < norm.end
    }
}

/// One display row produced by wrapping a logical line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VirtualLine {
    pub source_line: usize,
    pub byte_start: usize,
    pub byte_end: usize,
    /// Display width; hanging whitespace may push it past the wrap width.
    pub width: u32,
    /// Continuation of the previous virtual line.
    pub is_wrap: bool,
}

/// Line layout information for wrapped text, column-major.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LineInfo {
    /// Byte offset where each virtual line starts.
    pub starts: Vec<usize>,
    /// Byte offset where each virtual line ends (exclusive).
    pub ends: Vec<usize>,
    /// Display width of each virtual line.
    pub widths: Vec<u32>,
    /// Source line index for each virtual line.
    pub sources: Vec<usize>,
    /// Whether the line is a wrapped continuation.
    pub wraps: Vec<bool>,
    /// Maximum line width across all virtual lines.
    pub max_width: u32,
}

impl LineInfo {
    fn from_virtual_lines(lines: &[VirtualLine]) -> Self {
        let mut info = Self::default();
        for line in lines {
            info.starts.push(line.byte_start);
            info.ends.push(line.byte_end);
            info.widths.push(line.width);
            info.sources.push(line.source_line);
            info.wraps.push(line.is_wrap);
            info.max_width = info.max_width.max(line.width);
        }
        info
    }

    #[must_use]
    pub fn virtual_line_count(&self) -> usize {
        self.starts.len()
    }

    /// First virtual line of a source line.
    #[must_use]
    pub fn source_to_virtual(&self, source_line: usize) -> Option<usize> {
        let idx = self.sources.partition_point(|&s| s < source_line);
        (self.sources.get(idx) == Some(&source_line)).then_some(idx)
    }

    #[must_use]
    pub fn virtual_to_source(&self, virtual_line: usize) -> Option<usize> {
        self.sources.get(virtual_line).copied()
    }

    /// `(byte_start, byte_end)` of a virtual line.
    #[must_use]
    pub fn virtual_line_byte_range(&self, virtual_line: usize) -> Option<(usize, usize)> {
        let start = *self.starts.get(virtual_line)?;
        let end = *self.ends.get(virtual_line)?;
        Some((start, end))
    }

    #[must_use]
    pub fn virtual_line_width(&self, virtual_line: usize) -> Option<u32> {
        self.widths.get(virtual_line).copied()
    }

    #[must_use]
    pub fn is_continuation(&self, virtual_line: usize) -> Option<bool> {
        self.wraps.get(virtual_line).copied()
    }

    /// Count virtual lines for a given source line.
    #[must_use]
    pub fn virtual_lines_for_source(&self, source_line: usize) -> usize {
        let first = self.sources.partition_point(|&s| s < source_line);
        let last = self.sources.partition_point(|&s| s <= source_line);
        last - first
    }
}

/// Measurement result for a given width.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextMeasure {
    pub line_count: usize,
    /// Widest virtual line, capped at the wrap width when wrapping.
    pub max_width: u32,
}

/// `(start, end, width)` of one wrapped piece, relative to its line.
type Span = (usize, usize, u32);

/// Split one logical line into virtual lines.
///
/// Continuation lines measure tabs from their own column 0. An empty line
/// yields one empty span. Word mode scans the line for wrap opportunities
/// once and picks each break from that list.
fn layout_line(
    line: ShapedText<'_>,
    wrap_width: Option<u32>,
    mode: WrapMode,
    breaks: &WrapBreakSet,
) -> SmallVec<[Span; 2]> {
    let text = line.text();
    let full = line.width();
    let max = match wrap_width {
        Some(max) if full > max && mode != WrapMode::None => max,
        _ => return smallvec![(0, text.len(), full)],
    };

    let bytes = text.as_bytes();
    let candidates = match mode {
        WrapMode::Word => find_wrap_breaks(bytes, breaks),
        WrapMode::Char | WrapMode::None => Vec::new(),
    };
    let mut spans = SmallVec::new();
    let mut start = 0;
    while start < text.len() {
        let fit = start + line.slice(start..text.len()).wrap_pos(max);
        let end = match mode {
            WrapMode::Word => word_wrap_end(bytes, start, fit, &candidates),
            WrapMode::Char | WrapMode::None => fit,
        };
        let end = end.max(start + 1).min(text.len());
        spans.push((start, end, line.slice(start..end).width()));
        start = end;
    }
    spans
}

/// Index of the span that displays byte `rel`; a wrap boundary belongs to
/// the later span.
fn span_for_byte(spans: &[Span], rel: usize) -> usize {
    spans.iter().rposition(|span| span.0 <= rel).unwrap_or(0)
}

/// Byte (relative to the line) at display column `col` of `span`.
fn byte_for_col(line: ShapedText<'_>, span: Span, col: u32) -> Option<usize> {
    let (start, end, width) = span;
    (col <= width).then(|| start + line.slice(start..end).pos_by_width(col, true))
}

/// Display column of byte `rel` within `span`.
fn col_for_byte(line: ShapedText<'_>, span: Span, rel: usize) -> u32 {
    let (start, end, _) = span;
    line.slice(start..end).column_at_byte(rel - start)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct LineCacheKey {
    wrap_mode: WrapMode,
    wrap_width: Option<u32>,
    breaks: WrapBreakSet,
    options: TextBufferOptions,
    buffer_revision: u64,
}

#[derive(Clone, Debug)]
struct LineCache {
    key: LineCacheKey,
    virtual_lines: Vec<VirtualLine>,
    /// First virtual line of each logical line.
    first_virtual: Vec<usize>,
}

impl LineCache {
    fn measure(&self) -> TextMeasure {
        let cap = self.key.wrap_width.unwrap_or(u32::MAX);
        TextMeasure {
            line_count: self.virtual_lines.len(),
            max_width: self
                .virtual_lines
                .iter()
                .map(|line| line.width.min(cap))
                .max()
                .unwrap_or(0),
        }
    }
}

/// View into a text buffer with viewport, wrapping and selection.
#[derive(Debug)]
pub struct TextBufferView<'a> {
    buffer: &'a TextBuffer,
    viewport: Viewport,
    wrap_mode: WrapMode,
    wrap_width: Option<u32>,
    wrap_breaks: WrapBreakSet,
    scroll_x: u32,
    scroll_y: u32,
    selection: Option<Selection>,
    line_cache: RefCell<Option<LineCache>>,
    measure_cache: RefCell<Option<(LineCacheKey, TextMeasure)>>,
}

impl<'a> TextBufferView<'a> {
    /// Create a new view of a text buffer.
    #[must_use]
    pub fn new(buffer: &'a TextBuffer) -> Self {
        Self {
            buffer,
            viewport: Viewport::default(),
            wrap_mode: WrapMode::None,
            wrap_width: None,
            wrap_breaks: WrapBreakSet::default(),
            scroll_x: 0,
            scroll_y: 0,
            selection: None,
            line_cache: RefCell::new(None),
            measure_cache: RefCell::new(None),
        }
    }

    #[must_use]
    pub fn buffer(&self) -> &'a TextBuffer {
        self.buffer
    }

    /// Set the viewport.
    #[must_use]
    pub fn viewport(mut self, x: u32, y: u32, width: u32, height: u32) -> Self {
        self.set_viewport(Viewport::new(x, y, width, height));
        self
    }

    /// Set the wrap mode.
    #[must_use]
    pub fn wrap_mode(mut self, mode: WrapMode) -> Self {
        self.set_wrap_mode(mode);
        self
    }

    /// Set explicit wrap width (overrides viewport width when wrapping).
    #[must_use]
    pub fn wrap_width(mut self, width: u32) -> Self {
        self.set_wrap_width(Some(width));
        self
    }

    /// Set scroll position.
    #[must_use]
    pub fn scroll(mut self, x: u32, y: u32) -> Self {
        self.set_scroll(x, y);
        self
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn set_wrap_mode(&mut self, mode: WrapMode) {
        self.wrap_mode = mode;
    }

    /// `None` wraps at the viewport width.
    pub fn set_wrap_width(&mut self, width: Option<u32>) {
        self.wrap_width = width;
    }

    /// Bytes after which word wrapping may break a line.
    pub fn set_wrap_breaks(&mut self, breaks: WrapBreakSet) {
        self.wrap_breaks = breaks;
    }

    pub fn set_scroll(&mut self, x: u32, y: u32) {
        self.scroll_x = x;
        self.scroll_y = y;
    }

    #[must_use]
    pub fn scroll_position(&self) -> (u32, u32) {
        (self.scroll_x, self.scroll_y)
    }

    #[must_use]
    pub fn current_viewport(&self) -> Viewport {
        self.viewport
    }

    #[must_use]
    pub fn current_wrap_mode(&self) -> WrapMode {
        self.wrap_mode
    }

    /// Wrap width in effect, or `None` when lines are not wrapped.
    #[must_use]
    pub fn effective_wrap_width(&self) -> Option<u32> {
        self.wrap_width_for(self.viewport.width)
    }

    fn wrap_width_for(&self, viewport_width: u32) -> Option<u32> {
        if self.wrap_mode == WrapMode::None {
            return None;
        }
        self.wrap_width
            .or((viewport_width > 0).then_some(viewport_width))
            .map(|width| width.max(1))
    }

    fn cache_key_for(&self, wrap_width: Option<u32>) -> LineCacheKey {
        LineCacheKey {
            wrap_mode: self.wrap_mode,
            wrap_width,
            breaks: self.wrap_breaks,
            options: self.buffer.options(),
            buffer_revision: self.buffer.revision(),
        }
    }

    fn layout(&self, line: ShapedText<'_>, wrap_width: Option<u32>) -> SmallVec<[Span; 2]> {
        layout_line(line, wrap_width, self.wrap_mode, &self.wrap_breaks)
    }

    /// Visit every logical line with its shape, stopping at the first
    /// failure to read or segment one.
    fn walk_shaped<F>(&self, mut visitor: F) -> Result<()>
    where
        F: FnMut(&LineRef<'_>, ShapedText<'_>) -> ControlFlow<()>,
    {
        let mut failed = None;
        self.buffer.walk_lines(|line| {
            match self.buffer.shape_line(Cow::Borrowed(line.text), line.chunks) {
                Ok(shape) => visitor(&line, shape.shaped()),
                Err(err) => {
                    failed = Some(err);
                    ControlFlow::Break(())
                }
            }
        })?;
        failed.map_or(Ok(()), Err)
    }

    fn build_cache(&self, key: LineCacheKey) -> Result<LineCache> {
        let mut virtual_lines = Vec::with_capacity(self.buffer.line_count());
        let mut first_virtual = Vec::with_capacity(self.buffer.line_count());
        self.walk_shaped(|line, shaped| {
            first_virtual.push(virtual_lines.len());
            for (i, (start, end, width)) in self.layout(shaped, key.wrap_width).into_iter().enumerate() {
                virtual_lines.push(VirtualLine {
                    source_line: line.row,
                    byte_start: line.start + start,
                    byte_end: line.start + end,
                    width,
                    is_wrap: i > 0,
                });
            }
            ControlFlow::Continue(())
        })?;
        tracing::debug!(
            logical = first_virtual.len(),
            virtual_lines = virtual_lines.len(),
            wrap_width = ?key.wrap_width,
            revision = key.buffer_revision,
            "rebuilt line cache"
        );
        Ok(LineCache {
            key,
            virtual_lines,
            first_virtual,
        })
    }

    /// Run `f` against an up-to-date line cache.
    fn with_cache<R>(&self, f: impl FnOnce(&LineCache) -> R) -> Result<R> {
        let key = self.cache_key_for(self.effective_wrap_width());
        if let Some(cache) = self.line_cache.borrow().as_ref().filter(|c| c.key == key) {
            return Ok(f(cache));
        }
        let cache = self.build_cache(key)?;
        let result = f(&cache);
        *self.line_cache.borrow_mut() = Some(cache);
        Ok(result)
    }

    fn cached_or_default<R: Default>(&self, f: impl FnOnce(&LineCache) -> R) -> R {
        self.with_cache(f).unwrap_or_else(|err| {
            tracing::warn!(%err, "line layout failed");
            R::default()
        })
    }

    /// Number of virtual lines (accounting for wrapping).
    #[must_use]
    pub fn virtual_line_count(&self) -> usize {
        self.cached_or_default(|cache| cache.virtual_lines.len())
    }

    #[must_use]
    pub fn virtual_line(&self, index: usize) -> Option<VirtualLine> {
        self.cached_or_default(|cache| cache.virtual_lines.get(index).copied())
    }

    #[must_use]
    pub fn virtual_lines(&self) -> Vec<VirtualLine> {
        self.cached_or_default(|cache| cache.virtual_lines.clone())
    }

    /// Byte range of a virtual line.
    #[must_use]
    pub fn virtual_line_byte_range(&self, index: usize) -> Option<(usize, usize)> {
        self.virtual_line(index)
            .map(|line| (line.byte_start, line.byte_end))
    }

    /// Line layout information for the current view.
    #[must_use]
    pub fn line_info(&self) -> LineInfo {
        self.cached_or_default(|cache| LineInfo::from_virtual_lines(&cache.virtual_lines))
    }

    /// Virtual lines inside the viewport after vertical scrolling.
    ///
    /// A zero-height viewport shows every line below the scroll position.
    #[must_use]
    pub fn visible_lines(&self) -> Vec<VirtualLine> {
        let skip = self.scroll_y as usize;
        let take = match self.viewport.height {
            0 => usize::MAX,
            height => height as usize,
        };
        self.cached_or_default(|cache| {
            cache
                .virtual_lines
                .iter()
                .skip(skip)
                .take(take)
                .copied()
                .collect()
        })
    }

    /// Line count and max width the text would have at `width` columns.
    ///
    /// Reuses the line cache when it matches; otherwise memoizes the last
    /// measurement without touching the view's layout.
    #[must_use]
    pub fn measure_for_dimensions(&self, width: u32, _height: u32) -> TextMeasure {
        let key = self.cache_key_for(self.wrap_width_for(width.max(1)));
        if let Some(cache) = self.line_cache.borrow().as_ref().filter(|c| c.key == key) {
            return cache.measure();
        }
        if let Some((_, measure)) = self.measure_cache.borrow().as_ref().filter(|m| m.0 == key) {
            return *measure;
        }

        let cap = key.wrap_width.unwrap_or(u32::MAX);
        let mut measure = TextMeasure::default();
        let walked = self.walk_shaped(|_, shaped| {
            for (_, _, width) in self.layout(shaped, key.wrap_width) {
                measure.line_count += 1;
                measure.max_width = measure.max_width.max(width.min(cap));
            }
            ControlFlow::Continue(())
        });
        if let Err(err) = walked {
            tracing::warn!(%err, "measurement failed");
            return TextMeasure::default();
        }
        *self.measure_cache.borrow_mut() = Some((key, measure));
        measure
    }

    // ---------------------------------------------------------------
    // Coordinates
    // ---------------------------------------------------------------

    /// Byte offset at `(virtual row, display column)`, walking the rope.
    ///
    /// A column inside a wide cluster or tab rounds down to its start; a
    /// column past the end of the virtual line is an error.
    pub fn coords_to_offset(&self, row: usize, col: u32) -> Result<usize> {
        let wrap_width = self.effective_wrap_width();
        let mut vrow = 0;
        let mut found = None;
        self.walk_shaped(|line, shaped| {
            let spans = self.layout(shaped, wrap_width);
            if row < vrow + spans.len() {
                found = byte_for_col(shaped, spans[row - vrow], col).map(|rel| line.start + rel);
                return ControlFlow::Break(());
            }
            vrow += spans.len();
            ControlFlow::Continue(())
        })?;
        found.ok_or(Error::InvalidPosition {
            row,
            col: col as usize,
        })
    }

    /// `(virtual row, display column)` of a byte offset, walking the rope.
    ///
    /// An offset at a wrap boundary belongs to the later virtual line; an
    /// offset inside a line terminator maps to the end of its line.
    pub fn offset_to_coords(&self, offset: usize) -> Result<(usize, u32)> {
        self.buffer.byte_to_char(offset)?;
        let wrap_width = self.effective_wrap_width();
        let mut vrow = 0;
        let mut found = None;
        self.walk_shaped(|line, shaped| {
            let spans = self.layout(shaped, wrap_width);
            let line_end = line.start + line.text.len() + line.break_len;
            if offset < line_end || line.break_len == 0 {
                let rel = (offset - line.start).min(line.text.len());
                let idx = span_for_byte(&spans, rel);
                found = Some((vrow + idx, col_for_byte(shaped, spans[idx], rel)));
                return ControlFlow::Break(());
            }
            vrow += spans.len();
            ControlFlow::Continue(())
        })?;
        found.ok_or(Error::OutOfRange {
            index: offset,
            len: self.buffer.len_bytes(),
        })
    }

    /// [`coords_to_offset`](Self::coords_to_offset) through the line cache
    /// and the buffer's marker index.
    pub fn coords_to_offset_fast(&self, row: usize, col: u32) -> Result<usize> {
        let invalid = Error::InvalidPosition {
            row,
            col: col as usize,
        };
        let (source, sub) = self
            .with_cache(|cache| {
                cache.virtual_lines.get(row).map(|line| {
                    let first = cache.first_virtual.get(line.source_line).copied().unwrap_or(row);
                    (line.source_line, row - first)
                })
            })?
            .ok_or_else(|| invalid.clone())?;

        let marker = self.buffer.line_start_marker(source)?;
        let shape = self.buffer.line_shape_after(marker.pos)?;
        let spans = self.layout(shape.shaped(), self.effective_wrap_width());
        let span = *spans.get(sub).ok_or_else(|| invalid.clone())?;
        byte_for_col(shape.shaped(), span, col)
            .map(|rel| marker.prefix.bytes + rel)
            .ok_or(invalid)
    }

    /// [`offset_to_coords`](Self::offset_to_coords) through the line cache
    /// and the buffer's marker index.
    pub fn offset_to_coords_fast(&self, offset: usize) -> Result<(usize, u32)> {
        let row = self.buffer.line_for_offset_fast(offset)?;
        self.buffer.byte_to_char(offset)?;
        let marker = self.buffer.line_start_marker(row)?;
        let shape = self.buffer.line_shape_after(marker.pos)?;
        let shaped = shape.shaped();
        let spans = self.layout(shaped, self.effective_wrap_width());

        let rel = (offset - marker.prefix.bytes).min(shape.text().len());
        let idx = span_for_byte(&spans, rel);
        let col = col_for_byte(shaped, spans[idx], rel);
        let first = self
            .with_cache(|cache| cache.first_virtual.get(row).copied())?
            .ok_or(Error::OutOfRange {
                index: row,
                len: self.buffer.line_count(),
            })?;
        Ok((first + idx, col))
    }

    // ---------------------------------------------------------------
    // Selection
    // ---------------------------------------------------------------

    /// Select the byte range between `start` and `end` (either order).
    pub fn set_selection(&mut self, start: usize, end: usize, style: Style) {
        self.selection = Some(Selection::new(start, end, style));
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    #[must_use]
    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    /// Selected text, clamped to the document.
    #[must_use]
    pub fn selected_text(&self) -> Option<String> {
        let sel = self.selection.as_ref()?.normalized();
        let max = self.buffer.len_bytes();
        let start = sel.start.min(max);
        let end = sel.end.min(max);
        if start >= end {
            return None;
        }
        self.buffer.slice(start, end).ok()
    }

    /// Part of the selection on one virtual line, in document bytes.
    #[must_use]
    pub fn selection_byte_range_for_line(&self, virtual_line: usize) -> Option<(usize, usize)> {
        let sel = self.selection.as_ref()?.normalized();
        let line = self.virtual_line(virtual_line)?;
        let start = sel.start.max(line.byte_start);
        let end = sel.end.min(line.byte_end);
        (start < end).then_some((start, end))
    }
}
