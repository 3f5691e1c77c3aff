//! Segment-rope text buffer.
//!
//! [`TextBuffer`] is the mutable model of a document: a [`Rope`] of
//! [`Segment`]s, the [`MemRegistry`] those segments point into, a shared
//! [`GraphemeCache`], an edit cursor, and a highlight layer.
//!
//! Offsets are byte offsets into the document string (what
//! [`to_string`](ToString::to_string) returns). Line terminators keep their
//! original bytes, so `"a\r\nb"` is four bytes on two lines. Columns are
//! display columns with tabs expanded to the buffer's tab width.
//!
//! # Example
//!
//! ```
//! use opentui_text::TextBuffer;
//!
//! let mut buffer = TextBuffer::with_text("line1\nline2\nline3").unwrap();
//! assert_eq!(buffer.line_count(), 3);
//!
//! buffer.rebuild_marker_index();
//! assert_eq!(buffer.line_start(1).unwrap(), 6);
//!
//! buffer.set_cursor(1, 5).unwrap();
//! buffer.insert_text("!").unwrap();
//! assert_eq!(buffer.line(1).as_deref(), Some("line2!"));
//! ```

use crate::error::{Error, Result};
use crate::event::{LogLevel, emit_event, emit_log};
use crate::style::Style;
use crate::text::grapheme_cache::{GraphemeCache, GraphemeKey};
use crate::text::highlight::{Highlight, HighlightSet, StyleRegistry};
use crate::text::mem::{MemId, MemRegistry};
use crate::text::rope::{MarkerEntry, Rope};
use crate::text::segment::{LineMarker, Segment, StyledChunk, TextChunk, TextSummary};
use crate::unicode::{
    GraphemeInfo, LineBreakKind, ShapedText, WidthMethod, WidthOptions, find_line_breaks,
    grapheme_info, is_grapheme_boundary,
};
use smallvec::SmallVec;
use std::borrow::Cow;
use std::fmt;
use std::ops::{ControlFlow, Range};
use std::rc::Rc;

/// Text chunks are capped so splitting one for an edit stays cheap.
const MAX_CHUNK_BYTES: usize = 4096;

/// Buffer configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextBufferOptions {
    /// Columns per tab stop; 0 is treated as 1.
    pub tab_width: u8,
    pub width_method: WidthMethod,
    /// Let ASCII-only text skip grapheme segmentation.
    pub ascii_fast_path: bool,
}

impl Default for TextBufferOptions {
    fn default() -> Self {
        Self {
            tab_width: 4,
            width_method: WidthMethod::WcWidth,
            ascii_fast_path: true,
        }
    }
}

impl TextBufferOptions {
    /// Scanner options derived from this configuration.
    #[must_use]
    pub fn width_options(&self) -> WidthOptions {
        WidthOptions::new(u32::from(self.tab_width.max(1)), self.ascii_fast_path)
            .with_method(self.width_method)
    }
}

/// One logical line handed to [`TextBuffer::walk_lines`] visitors.
#[derive(Clone, Copy, Debug)]
pub struct LineRef<'t> {
    pub row: usize,
    /// Byte offset of the line's first byte.
    pub start: usize,
    /// Line content without its terminator.
    pub text: &'t str,
    /// Length of the terminator (0 for the last line).
    pub break_len: usize,
    /// Chunks the text is made of, in order.
    pub chunks: &'t [TextChunk],
}

impl LineRef<'_> {
    /// Whether every chunk of the line is ASCII-only.
    #[must_use]
    pub fn is_ascii(&self) -> bool {
        self.chunks.iter().all(TextChunk::is_ascii)
    }
}

/// A line's text together with its clusters when the cache knows them.
#[derive(Debug)]
pub(crate) struct LineShape<'t> {
    text: Cow<'t, str>,
    opts: WidthOptions,
    clusters: Option<Rc<[GraphemeInfo]>>,
}

impl LineShape<'_> {
    pub(crate) fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn shaped(&self) -> ShapedText<'_> {
        match &self.clusters {
            Some(infos) => ShapedText::with_clusters(&self.text, infos, self.opts),
            None => ShapedText::new(&self.text, self.opts),
        }
    }
}

fn byte_dim(summary: &TextSummary) -> u64 {
    summary.bytes as u64
}

fn char_dim(summary: &TextSummary) -> u64 {
    summary.chars as u64
}

fn line_dim(summary: &TextSummary) -> u64 {
    summary.lines as u64
}

fn empty_rope() -> Rope<Segment> {
    let mut rope = Rope::new();
    rope.append(Segment::LineStart);
    rope
}

fn push_text_chunks(
    out: &mut Vec<Segment>,
    text: &str,
    mem: MemId,
    base: usize,
    opts: WidthOptions,
) {
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + MAX_CHUNK_BYTES).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        out.push(Segment::Text(TextChunk::measure_text(
            mem,
            base + start,
            &text[start..end],
            opts,
        )));
        start = end;
    }
}

/// Segments for `text`, which lives at `base..` inside `mem`.
///
/// With `leading`, the result opens with the first line's `LineStart`.
fn build_segments(
    text: &str,
    mem: MemId,
    base: usize,
    opts: WidthOptions,
    leading: bool,
) -> Result<Vec<Segment>> {
    let breaks = find_line_breaks(text.as_bytes());
    let estimate = breaks.len() * 3 + text.len() / MAX_CHUNK_BYTES + 2;
    let mut out = Vec::new();
    out.try_reserve(estimate)
        .map_err(|e| Error::alloc(e, estimate * std::mem::size_of::<Segment>()))?;
    if leading {
        out.push(Segment::LineStart);
    }
    let mut pos = 0;
    for brk in &breaks {
        push_text_chunks(&mut out, &text[pos..brk.pos], mem, base + pos, opts);
        out.push(Segment::Break(brk.kind));
        out.push(Segment::LineStart);
        pos = brk.end();
    }
    push_text_chunks(&mut out, &text[pos..], mem, base + pos, opts);
    Ok(out)
}

/// Text buffer backed by a rope of text segments.
#[derive(Debug)]
pub struct TextBuffer {
    rope: Rope<Segment>,
    mem: MemRegistry,
    /// Buffers registered by `set_text` and `append`, freed on replacement.
    owned: Vec<MemId>,
    graphemes: Rc<GraphemeCache>,
    options: TextBufferOptions,
    cursor: usize,
    highlights: HighlightSet,
    styles: StyleRegistry,
    default_style: Style,
    revision: u64,
}

impl Default for TextBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextBuffer {
    /// Create an empty buffer with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(TextBufferOptions::default())
    }

    #[must_use]
    pub fn with_options(options: TextBufferOptions) -> Self {
        Self::with_grapheme_cache(options, Rc::new(GraphemeCache::new()))
    }

    /// Create a buffer that shares a grapheme cache with other buffers.
    #[must_use]
    pub fn with_grapheme_cache(options: TextBufferOptions, graphemes: Rc<GraphemeCache>) -> Self {
        Self {
            rope: empty_rope(),
            mem: MemRegistry::new(),
            owned: Vec::new(),
            graphemes,
            options,
            cursor: 0,
            highlights: HighlightSet::new(),
            styles: StyleRegistry::new(),
            default_style: Style::NONE,
            revision: 0,
        }
    }

    /// Create a buffer holding `text`.
    pub fn with_text(text: &str) -> Result<Self> {
        let mut buffer = Self::new();
        buffer.set_text(text)?;
        Ok(buffer)
    }

    // ---------------------------------------------------------------
    // Configuration
    // ---------------------------------------------------------------

    #[must_use]
    pub fn options(&self) -> TextBufferOptions {
        self.options
    }

    #[must_use]
    pub fn tab_width(&self) -> u8 {
        self.options.tab_width
    }

    #[must_use]
    pub fn width_method(&self) -> WidthMethod {
        self.options.width_method
    }

    /// Set the tab width (clamped to at least 1) and re-measure chunks.
    pub fn set_tab_width(&mut self, width: u8) -> Result<()> {
        let width = width.max(1);
        if width != self.options.tab_width {
            self.remeasure(TextBufferOptions {
                tab_width: width,
                ..self.options
            })?;
        }
        Ok(())
    }

    /// Set the ambiguous-width policy and re-measure chunks.
    pub fn set_width_method(&mut self, method: WidthMethod) -> Result<()> {
        if method != self.options.width_method {
            self.remeasure(TextBufferOptions {
                width_method: method,
                ..self.options
            })?;
            self.graphemes.clear();
        }
        Ok(())
    }

    pub fn set_ascii_fast_path(&mut self, enabled: bool) {
        self.options.ascii_fast_path = enabled;
        self.bump_revision();
    }

    /// Scanner options for the buffer, without the ASCII fast path.
    #[must_use]
    pub fn width_options(&self) -> WidthOptions {
        WidthOptions {
            ascii_fast: false,
            ..self.options.width_options()
        }
    }

    /// Scanner options for a line, enabling the ASCII fast path when the
    /// buffer allows it and every chunk of the line is ASCII.
    #[must_use]
    pub fn line_width_options(&self, ascii: bool) -> WidthOptions {
        let base = self.options.width_options();
        WidthOptions {
            ascii_fast: base.ascii_fast && ascii,
            ..base
        }
    }

    pub fn set_default_style(&mut self, style: Style) {
        self.default_style = style;
    }

    #[must_use]
    pub fn default_style(&self) -> Style {
        self.default_style
    }

    /// Re-measure every chunk under `options`, which take effect only if
    /// the whole pass succeeds.
    fn remeasure(&mut self, options: TextBufferOptions) -> Result<()> {
        let opts = options.width_options();
        let count = self.rope.count();
        let mut segments = Vec::new();
        segments
            .try_reserve_exact(count)
            .map_err(|e| Error::alloc(e, count * std::mem::size_of::<Segment>()))?;
        for segment in &self.rope {
            segments.push(match *segment {
                Segment::Text(chunk) => Segment::Text(TextChunk::new(
                    &self.mem, chunk.mem, chunk.start, chunk.end, opts,
                )?),
                other => other,
            });
        }
        self.rope = Rope::from_vec(segments)?;
        self.options = options;
        self.bump_revision();
        Ok(())
    }

    // ---------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------

    /// The underlying segment rope.
    #[must_use]
    pub fn rope(&self) -> &Rope<Segment> {
        &self.rope
    }

    #[must_use]
    pub fn mem_registry(&self) -> &MemRegistry {
        &self.mem
    }

    #[must_use]
    pub fn grapheme_cache(&self) -> &Rc<GraphemeCache> {
        &self.graphemes
    }

    /// Content revision; bumped by every change views must react to.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn len_bytes(&self) -> usize {
        self.rope.summary().bytes
    }

    #[must_use]
    pub fn len_chars(&self) -> usize {
        self.rope.summary().chars
    }

    /// Number of logical lines; an empty buffer has one.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.rope.summary().lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len_bytes() == 0
    }

    fn bump_revision(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    fn content_replaced(&mut self) {
        self.bump_revision();
        tracing::debug!(
            bytes = self.len_bytes(),
            lines = self.line_count(),
            segments = self.rope.count(),
            revision = self.revision,
            "text buffer content replaced"
        );
        emit_event(
            "text_buffer.content_changed",
            &format!(
                "{{\"revision\":{},\"bytes\":{},\"lines\":{}}}",
                self.revision,
                self.len_bytes(),
                self.line_count()
            ),
        );
    }

    // ---------------------------------------------------------------
    // Whole-content operations
    // ---------------------------------------------------------------

    /// Replace the whole document. O(n).
    ///
    /// Resets the cursor, highlights and grapheme cache.
    pub fn set_text(&mut self, text: &str) -> Result<()> {
        let mem = self.mem.register(text)?;
        if let Err(err) = self.load_mem(mem) {
            let _ = self.mem.release(mem);
            return Err(err);
        }
        self.owned.push(mem);
        Ok(())
    }

    /// Register `text` for later use with the `*_from_mem_id` operations.
    pub fn register_text(&mut self, text: &str) -> Result<MemId> {
        self.mem.register(text)
    }

    /// Replace the document with a previously registered buffer.
    pub fn set_text_from_mem_id(&mut self, mem: MemId) -> Result<()> {
        self.load_mem(mem)
    }

    fn load_mem(&mut self, mem: MemId) -> Result<()> {
        let text = self.mem.get(mem)?;
        let segments = build_segments(text, mem, 0, self.options.width_options(), true)?;
        self.rope = Rope::from_vec(segments)?;
        self.release_owned(Some(mem));
        self.graphemes.clear();
        self.highlights.reset();
        self.cursor = 0;
        self.content_replaced();
        Ok(())
    }

    /// Free the buffers this buffer registered itself, and the scratch
    /// buffer, once no segment points into them.
    fn release_owned(&mut self, keep: Option<MemId>) {
        let mem = &mut self.mem;
        self.owned.retain(|&id| {
            if Some(id) == keep {
                return true;
            }
            // Ids in `owned` are live until released here.
            let _ = mem.release(id);
            false
        });
        if keep.is_none_or(|id| !self.mem.is_scratch(id)) {
            self.mem.release_scratch();
        }
    }

    /// Replace the document with styled chunks in one pass.
    ///
    /// The text is the concatenation of the chunks; each non-empty style
    /// becomes a priority-0 highlight over its chunk.
    pub fn set_styled_text(&mut self, chunks: &[StyledChunk<'_>]) -> Result<()> {
        let total: usize = chunks.iter().map(|c| c.text.len()).sum();
        let mut joined = String::new();
        joined
            .try_reserve_exact(total)
            .map_err(|e| Error::alloc(e, total))?;
        for chunk in chunks {
            joined.push_str(chunk.text);
        }
        self.set_text(&joined)?;

        let batch = !self.highlights.in_transaction();
        if batch {
            self.highlights.begin()?;
        }
        let mut char_pos = 0;
        for chunk in chunks {
            let chars = chunk.text.chars().count();
            if !chunk.style.is_empty() && chars > 0 {
                let id = self.styles.register_anonymous(chunk.style);
                self.highlights
                    .add(Highlight::new(char_pos, char_pos + chars, id));
            }
            char_pos += chars;
        }
        if batch {
            self.highlights.commit()?;
        }
        Ok(())
    }

    /// Append a registered buffer at the end of the document.
    ///
    /// A leading LF joins a trailing lone CR into one CRLF terminator.
    pub fn append_from_mem_id(&mut self, mem: MemId) -> Result<()> {
        let text = self.mem.get(mem)?;
        let leading_lf = text.starts_with('\n');
        let segments = build_segments(text, mem, 0, self.options.width_options(), false)?;
        let old_len = self.len_bytes();
        let end = self.rope.count();
        self.rope.insert_slice(end, &segments)?;
        if leading_lf {
            self.merge_crlf_at(old_len, true)?;
        }
        self.bump_revision();
        Ok(())
    }

    /// Register `text` and append it at the end of the document.
    pub fn append(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let mem = self.mem.register(text)?;
        if let Err(err) = self.append_from_mem_id(mem) {
            let _ = self.mem.release(mem);
            return Err(err);
        }
        self.owned.push(mem);
        Ok(())
    }

    /// Remove all text, keeping buffers registered by the caller and styles.
    ///
    /// Buffers the document registered for itself are freed.
    pub fn clear(&mut self) {
        self.rope = empty_rope();
        self.release_owned(None);
        self.graphemes.clear();
        self.highlights.reset();
        self.cursor = 0;
        self.content_replaced();
    }

    /// Clear text and drop every registered buffer and style.
    pub fn reset(&mut self) {
        self.clear();
        self.mem.clear();
        self.styles.clear();
    }

    // ---------------------------------------------------------------
    // Reading
    // ---------------------------------------------------------------

    /// Visit every logical line in order.
    pub fn walk_lines<F>(&self, mut visitor: F) -> Result<()>
    where
        F: FnMut(LineRef<'_>) -> ControlFlow<()>,
    {
        let mut line = String::new();
        let mut chunks: Vec<TextChunk> = Vec::new();
        let mut start = 0;
        let mut offset = 0;
        let mut row = 0;
        let mut failed = None;
        let mut stopped = false;

        self.rope.walk(|segment, _| {
            match segment {
                Segment::LineStart => start = offset,
                Segment::Text(chunk) => match chunk.text(&self.mem) {
                    Ok(text) => {
                        line.push_str(text);
                        chunks.push(*chunk);
                        offset += text.len();
                    }
                    Err(err) => {
                        failed = Some(err);
                        return ControlFlow::Break(());
                    }
                },
                Segment::Break(kind) => {
                    let flow = visitor(LineRef {
                        row,
                        start,
                        text: &line,
                        break_len: kind.len(),
                        chunks: &chunks,
                    });
                    if flow.is_break() {
                        stopped = true;
                        return ControlFlow::Break(());
                    }
                    row += 1;
                    line.clear();
                    chunks.clear();
                    offset += kind.len();
                }
            }
            ControlFlow::Continue(())
        });

        if let Some(err) = failed {
            return Err(err);
        }
        if !stopped {
            let _ = visitor(LineRef {
                row,
                start,
                text: &line,
                break_len: 0,
                chunks: &chunks,
            });
        }
        Ok(())
    }

    /// Chunks of the line whose `LineStart` sits at rope index `marker`.
    fn line_chunks_after(&self, marker: usize) -> SmallVec<[TextChunk; 4]> {
        let mut chunks = SmallVec::new();
        self.rope.walk_from(marker + 1, |segment, _| match segment {
            Segment::Text(chunk) => {
                chunks.push(*chunk);
                ControlFlow::Continue(())
            }
            _ => ControlFlow::Break(()),
        });
        chunks
    }

    /// Text of the line whose `LineStart` sits at rope index `marker`.
    pub(crate) fn line_text_after(&self, marker: usize) -> Result<Cow<'_, str>> {
        self.join_chunks(&self.line_chunks_after(marker))
    }

    /// Text and clusters of the line whose `LineStart` sits at `marker`.
    pub(crate) fn line_shape_after(&self, marker: usize) -> Result<LineShape<'_>> {
        let chunks = self.line_chunks_after(marker);
        let text = self.join_chunks(&chunks)?;
        self.shape_line(text, &chunks)
    }

    /// Attach clusters to a line's text. ASCII lines on the fast path need
    /// none; other lines take them from the grapheme cache.
    pub(crate) fn shape_line<'t>(
        &self,
        text: Cow<'t, str>,
        chunks: &[TextChunk],
    ) -> Result<LineShape<'t>> {
        let opts = self.line_width_options(chunks.iter().all(TextChunk::is_ascii));
        let clusters = if opts.ascii_fast || text.is_empty() {
            None
        } else {
            Some(self.line_clusters(&text, chunks)?)
        };
        Ok(LineShape {
            text,
            opts,
            clusters,
        })
    }

    /// Clusters of `text`, the concatenation of `chunks`.
    ///
    /// Per-chunk entries are stitched together with shifted offsets. When a
    /// chunk seam falls inside a cluster the line is segmented as a whole.
    fn line_clusters(&self, text: &str, chunks: &[TextChunk]) -> Result<Rc<[GraphemeInfo]>> {
        if let [one] = chunks {
            return self.graphemes.get_or_compute(self.chunk_key(one), text);
        }
        let mut infos = Vec::new();
        let mut base = 0;
        for chunk in chunks {
            if !is_grapheme_boundary(text, base) {
                return Ok(Rc::from(grapheme_info(text, self.options.width_method)));
            }
            let piece = chunk.text(&self.mem)?;
            let clusters = self.graphemes.get_or_compute(self.chunk_key(chunk), piece)?;
            let shift = base as u32;
            infos.extend(clusters.iter().map(|info| GraphemeInfo {
                byte_offset: info.byte_offset + shift,
                ..*info
            }));
            base += piece.len();
        }
        Ok(Rc::from(infos))
    }

    fn join_chunks(&self, chunks: &[TextChunk]) -> Result<Cow<'_, str>> {
        match chunks {
            [] => Ok(Cow::Borrowed("")),
            [one] => Ok(Cow::Borrowed(one.text(&self.mem)?)),
            many => {
                let mut text = String::new();
                for chunk in many {
                    text.push_str(chunk.text(&self.mem)?);
                }
                Ok(Cow::Owned(text))
            }
        }
    }

    /// Rope index and byte offset of line `row`'s `LineStart`. O(log n).
    fn line_marker(&self, row: usize) -> Result<(usize, usize)> {
        self.rope
            .find_by(row as u64, line_dim)
            .map(|(idx, before)| (idx, before.bytes))
            .ok_or(Error::InvalidPosition { row, col: 0 })
    }

    /// Content of a logical line, without its terminator.
    pub fn line_text(&self, row: usize) -> Result<Cow<'_, str>> {
        let (marker, _) = self.line_marker(row)?;
        self.line_text_after(marker)
    }

    /// Content of a logical line, or `None` past the last line.
    #[must_use]
    pub fn line(&self, row: usize) -> Option<String> {
        self.line_text(row).ok().map(Cow::into_owned)
    }

    /// All logical lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.line_count());
        // Registry lookups cannot fail for chunks this buffer created.
        let _ = self.walk_lines(|line| {
            lines.push(line.text.to_string());
            ControlFlow::Continue(())
        });
        lines
    }

    /// Byte range of a logical line, without its terminator.
    pub fn line_byte_range(&self, row: usize) -> Result<Range<usize>> {
        let (_, start) = self.line_marker(row)?;
        let end = if row + 1 < self.line_count() {
            let (next, next_start) = self.line_marker(row + 1)?;
            let brk = self.rope.get(next.saturating_sub(1))?.byte_len();
            next_start - brk
        } else {
            self.len_bytes()
        };
        Ok(start..end)
    }

    /// Display width of a logical line.
    pub fn line_width(&self, row: usize) -> Result<u32> {
        let (marker, _) = self.line_marker(row)?;
        Ok(self.line_shape_after(marker)?.shaped().width())
    }

    /// Widest logical line.
    #[must_use]
    pub fn max_line_width(&self) -> u32 {
        let mut max = 0;
        let _ = self.walk_lines(|line| {
            if let Ok(shape) = self.shape_line(Cow::Borrowed(line.text), line.chunks) {
                max = max.max(shape.shaped().width());
            }
            ControlFlow::Continue(())
        });
        max
    }

    /// Copy `[start, end)` out of the document.
    pub fn slice(&self, start: usize, end: usize) -> Result<String> {
        let len = self.len_bytes();
        if start > end || end > len {
            return Err(Error::InvalidRange { start, end, len });
        }
        let mut out = String::with_capacity(end - start);
        let Some((first, before)) = self.rope.find_by(start as u64, byte_dim) else {
            return Ok(out);
        };
        let mut pos = before.bytes;
        let mut failed = None;
        self.rope.walk_from(first, |segment, _| {
            let seg_start = pos;
            pos += segment.byte_len();
            if seg_start >= end {
                return ControlFlow::Break(());
            }
            let from = start.max(seg_start) - seg_start;
            let to = end.min(pos) - seg_start;
            let piece = match segment {
                Segment::Text(chunk) => chunk.text(&self.mem).and_then(|text| {
                    text.get(from..to)
                        .ok_or(Error::NotCharBoundary(seg_start + from))
                }),
                Segment::Break(kind) => Ok(&kind.as_str()[from..to]),
                Segment::LineStart => Ok(""),
            };
            match piece {
                Ok(piece) => {
                    out.push_str(piece);
                    ControlFlow::Continue(())
                }
                Err(err) => {
                    failed = Some(err);
                    ControlFlow::Break(())
                }
            }
        });
        match failed {
            Some(err) => Err(err),
            None => Ok(out),
        }
    }

    // ---------------------------------------------------------------
    // Coordinates
    // ---------------------------------------------------------------

    /// Byte offset of the first byte of char `char_offset`.
    pub fn char_to_byte(&self, char_offset: usize) -> Result<usize> {
        let Some((idx, before)) = self.rope.find_by(char_offset as u64, char_dim) else {
            return if char_offset == self.len_chars() {
                Ok(self.len_bytes())
            } else {
                Err(Error::OutOfRange {
                    index: char_offset,
                    len: self.len_chars(),
                })
            };
        };
        let rel = char_offset - before.chars;
        match self.rope.get(idx)? {
            Segment::Text(chunk) if !chunk.is_ascii() => {
                let text = chunk.text(&self.mem)?;
                let byte = text.char_indices().nth(rel).map_or(text.len(), |(b, _)| b);
                Ok(before.bytes + byte)
            }
            _ => Ok(before.bytes + rel),
        }
    }

    /// Number of chars before byte `offset`.
    pub fn byte_to_char(&self, offset: usize) -> Result<usize> {
        let Some((idx, before)) = self.rope.find_by(offset as u64, byte_dim) else {
            return if offset == self.len_bytes() {
                Ok(self.len_chars())
            } else {
                Err(Error::OutOfRange {
                    index: offset,
                    len: self.len_bytes(),
                })
            };
        };
        let rel = offset - before.bytes;
        match self.rope.get(idx)? {
            Segment::Text(chunk) if !chunk.is_ascii() => {
                let text = chunk.text(&self.mem)?;
                let head = text.get(..rel).ok_or(Error::NotCharBoundary(offset))?;
                Ok(before.chars + head.chars().count())
            }
            _ => Ok(before.chars + rel),
        }
    }

    /// Logical `(row, display column)` of a byte offset.
    ///
    /// An offset inside a line terminator maps to the end of its line.
    pub fn offset_to_line_col(&self, offset: usize) -> Result<(usize, u32)> {
        let row = match self.rope.find_by(offset as u64, byte_dim) {
            Some((_, before)) => before.lines.saturating_sub(1),
            None if offset == self.len_bytes() => self.line_count() - 1,
            None => {
                return Err(Error::OutOfRange {
                    index: offset,
                    len: self.len_bytes(),
                });
            }
        };
        let range = self.line_byte_range(row)?;
        let (marker, _) = self.line_marker(row)?;
        let shape = self.line_shape_after(marker)?;
        let rel = offset.min(range.end) - range.start;
        Ok((row, shape.shaped().column_at_byte(rel)))
    }

    /// Byte offset of logical `(row, display column)`.
    ///
    /// A column inside a wide cluster or tab rounds down to its start.
    pub fn line_col_to_offset(&self, row: usize, col: u32) -> Result<usize> {
        let (marker, start) = self.line_marker(row)?;
        let shape = self.line_shape_after(marker)?;
        let shaped = shape.shaped();
        if col > shaped.width() {
            return Err(Error::InvalidPosition {
                row,
                col: col as usize,
            });
        }
        Ok(start + shaped.pos_by_width(col, true))
    }

    // ---------------------------------------------------------------
    // Marker index
    // ---------------------------------------------------------------

    /// Rebuild the rope's marker index. O(n).
    pub fn rebuild_marker_index(&mut self) {
        self.rope.rebuild_marker_index();
    }

    #[must_use]
    pub fn has_fresh_marker_index(&self) -> bool {
        self.rope.has_fresh_marker_index()
    }

    fn warn_stale<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err @ Error::StaleMarkerIndex { .. }) = &result {
            emit_log(LogLevel::Warn, &format!("text buffer marker lookup: {err}"));
        }
        result
    }

    /// Number of lines according to the marker index. O(1).
    pub fn line_marker_count(&self) -> Result<usize> {
        self.warn_stale(self.rope.marker_count(LineMarker::LineStart))
    }

    /// Marker entry for line `row`. O(1).
    pub fn line_start_marker(&self, row: usize) -> Result<MarkerEntry<TextSummary>> {
        self.warn_stale(self.rope.get_marker(LineMarker::LineStart, row))
    }

    /// Byte offset where line `row` starts, via the marker index. O(1).
    pub fn line_start(&self, row: usize) -> Result<usize> {
        self.line_start_marker(row).map(|entry| entry.prefix.bytes)
    }

    /// Logical line containing `offset`, via the marker index. O(log lines).
    pub fn line_for_offset_fast(&self, offset: usize) -> Result<usize> {
        let starts = self.warn_stale(self.rope.markers(LineMarker::LineStart))?;
        if offset > self.len_bytes() {
            return Err(Error::OutOfRange {
                index: offset,
                len: self.len_bytes(),
            });
        }
        Ok(starts
            .partition_point(|entry| entry.prefix.bytes <= offset)
            .saturating_sub(1))
    }

    // ---------------------------------------------------------------
    // Editing
    // ---------------------------------------------------------------

    /// Cursor as logical `(row, display column)`.
    #[must_use]
    pub fn cursor(&self) -> (usize, u32) {
        self.offset_to_line_col(self.cursor).unwrap_or((0, 0))
    }

    /// Cursor as a byte offset.
    #[must_use]
    pub fn cursor_offset(&self) -> usize {
        self.cursor
    }

    /// Move the cursor to logical `(row, display column)`.
    pub fn set_cursor(&mut self, row: usize, col: u32) -> Result<()> {
        self.cursor = self.line_col_to_offset(row, col)?;
        Ok(())
    }

    /// Move the cursor to a byte offset; offsets inside CRLF snap back.
    pub fn set_cursor_offset(&mut self, offset: usize) -> Result<()> {
        if offset > self.len_bytes() {
            return Err(Error::OutOfRange {
                index: offset,
                len: self.len_bytes(),
            });
        }
        self.byte_to_char(offset)?;
        self.cursor = self.snap_out_of_break(offset, false);
        Ok(())
    }

    /// Move `offset` out of the inside of a line terminator.
    fn snap_out_of_break(&self, offset: usize, forward: bool) -> usize {
        match self.rope.find_by(offset as u64, byte_dim) {
            Some((idx, before)) if before.bytes < offset => match self.rope.get(idx) {
                Ok(Segment::Break(kind)) if forward => before.bytes + kind.len(),
                Ok(Segment::Break(_)) => before.bytes,
                _ => offset,
            },
            _ => offset,
        }
    }

    /// Join a lone CR ending at `offset` with a lone LF starting there.
    ///
    /// A cursor left between the two moves past the joined terminator when
    /// `forward`, otherwise before it.
    fn merge_crlf_at(&mut self, offset: usize, forward: bool) -> Result<()> {
        let Some(before_offset) = offset.checked_sub(1) else {
            return Ok(());
        };
        let Some((idx, _)) = self.rope.find_by(before_offset as u64, byte_dim) else {
            return Ok(());
        };
        let joinable = matches!(self.rope.get(idx), Ok(Segment::Break(LineBreakKind::Cr)))
            && matches!(self.rope.get(idx + 1), Ok(Segment::LineStart))
            && matches!(self.rope.get(idx + 2), Ok(Segment::Break(LineBreakKind::Lf)));
        if !joinable {
            return Ok(());
        }
        self.rope.replace(idx, Segment::Break(LineBreakKind::CrLf))?;
        self.rope.delete_range(idx + 1, idx + 3)?;
        if self.cursor == offset {
            self.cursor = if forward { offset + 1 } else { before_offset };
        }
        tracing::trace!(offset, "joined CR and LF");
        Ok(())
    }

    fn chunk_key(&self, chunk: &TextChunk) -> GraphemeKey {
        GraphemeKey {
            mem: chunk.mem,
            start: chunk.start,
            end: chunk.end,
            method: self.options.width_method,
        }
    }

    /// Ensure a segment boundary at `offset` (which must not be inside a
    /// line terminator) and return the index of the segment starting there.
    fn split_at(&mut self, offset: usize) -> Result<usize> {
        let Some((idx, before)) = self.rope.find_by(offset as u64, byte_dim) else {
            return Ok(self.rope.count());
        };
        if before.bytes == offset {
            return Ok(idx);
        }
        let Segment::Text(chunk) = *self.rope.get(idx)? else {
            return Ok(idx);
        };
        let rel = offset - before.bytes;
        let text = chunk.text(&self.mem)?;
        if !text.is_char_boundary(rel) {
            return Err(Error::NotCharBoundary(offset));
        }
        let opts = self.options.width_options();
        let left = TextChunk::measure_text(chunk.mem, chunk.start, &text[..rel], opts);
        let right = TextChunk::measure_text(chunk.mem, chunk.start + rel, &text[rel..], opts);
        self.rope.replace(idx, Segment::Text(left))?;
        self.rope.insert(idx + 1, Segment::Text(right))?;
        self.graphemes.evict(chunk.mem, chunk.start, chunk.end);
        Ok(idx + 1)
    }

    /// Insert at the cursor and move the cursor past the new text.
    pub fn insert_text(&mut self, text: &str) -> Result<()> {
        self.insert_text_at(self.cursor, text)
    }

    /// Insert `text` at byte `offset`.
    ///
    /// An offset inside a CRLF inserts before the CR. A cursor at or after
    /// the insertion point shifts with the text. A CR and an LF that end up
    /// adjacent are joined into one CRLF terminator.
    pub fn insert_text_at(&mut self, offset: usize, text: &str) -> Result<()> {
        let len = self.len_bytes();
        if offset > len {
            return Err(Error::OutOfRange { index: offset, len });
        }
        if text.is_empty() {
            return Ok(());
        }
        let offset = self.snap_out_of_break(offset, false);
        self.byte_to_char(offset)?;

        let (mem, base, _) = self.mem.append_scratch(text)?;
        let opts = self.options.width_options();
        let segments = build_segments(text, mem, base, opts, false)?;
        let idx = self.split_at(offset)?;

        let merged = match (segments.as_slice(), idx.checked_sub(1)) {
            ([Segment::Text(new)], Some(prev_idx)) => match self.rope.get(prev_idx)? {
                Segment::Text(prev)
                    if prev.mem == new.mem
                        && prev.end == new.start
                        && prev.len() + new.len() <= MAX_CHUNK_BYTES =>
                {
                    Some((prev_idx, *prev, *new))
                }
                _ => None,
            },
            _ => None,
        };

        match merged {
            Some((prev_idx, prev, new)) => {
                let chunk = TextChunk::new(&self.mem, prev.mem, prev.start, new.end, opts)?;
                self.rope.replace(prev_idx, Segment::Text(chunk))?;
                self.graphemes.evict(prev.mem, prev.start, prev.end);
            }
            None => self.rope.insert_slice(idx, &segments)?,
        }

        if self.cursor >= offset {
            self.cursor += text.len();
        }
        if text.ends_with('\r') {
            self.merge_crlf_at(offset + text.len(), true)?;
        }
        if text.starts_with('\n') {
            self.merge_crlf_at(offset, true)?;
        }
        self.bump_revision();
        tracing::trace!(offset, bytes = text.len(), "inserted text");
        Ok(())
    }

    /// Delete the byte range `[start, end)`.
    ///
    /// Ends inside a CRLF widen to cover the whole terminator. Deleting a
    /// terminator joins its two lines, and a CR and an LF brought together
    /// become one CRLF terminator.
    pub fn delete_range_bytes(&mut self, start: usize, end: usize) -> Result<()> {
        let len = self.len_bytes();
        if start > end || end > len {
            return Err(Error::InvalidRange { start, end, len });
        }
        if start == end {
            return Ok(());
        }
        let start = self.snap_out_of_break(start, false);
        let end = self.snap_out_of_break(end, true);
        self.byte_to_char(start)?;
        self.byte_to_char(end)?;

        let start_idx = self.split_at(start)?;
        let end_idx = self.split_at(end)?;
        let removed = self.rope.drain_range(start_idx, end_idx)?;
        for segment in &removed {
            if let Segment::Text(chunk) = segment {
                self.graphemes.evict(chunk.mem, chunk.start, chunk.end);
            }
        }

        if self.cursor >= end {
            self.cursor -= end - start;
        } else if self.cursor > start {
            self.cursor = start;
        }
        self.merge_crlf_at(start, false)?;
        self.bump_revision();
        tracing::trace!(start, end, segments = removed.count(), "deleted range");
        Ok(())
    }

    /// Delete between two logical `(row, display column)` positions.
    pub fn delete_range(&mut self, start: (usize, u32), end: (usize, u32)) -> Result<()> {
        let from = self.line_col_to_offset(start.0, start.1)?;
        let to = self.line_col_to_offset(end.0, end.1)?;
        if from > to {
            return Err(Error::InvalidRange {
                start: from,
                end: to,
                len: self.len_bytes(),
            });
        }
        self.delete_range_bytes(from, to)
    }

    /// Delete the grapheme cluster (or line terminator) before the cursor.
    ///
    /// Returns `false` when the cursor is at the start of the document.
    pub fn backspace(&mut self) -> Result<bool> {
        let cursor = self.cursor;
        if cursor == 0 {
            return Ok(false);
        }
        let Some((idx, before)) = self.rope.find_by((cursor - 1) as u64, byte_dim) else {
            return Ok(false);
        };
        let start = match *self.rope.get(idx)? {
            Segment::Text(chunk) => {
                before.bytes + self.cluster_start_before(&chunk, cursor - before.bytes)?
            }
            Segment::Break(_) | Segment::LineStart => before.bytes,
        };
        self.delete_range_bytes(start, cursor)?;
        Ok(true)
    }

    /// Start of the cluster that ends at or straddles `rel` within `chunk`.
    fn cluster_start_before(&self, chunk: &TextChunk, rel: usize) -> Result<usize> {
        if chunk.is_ascii() && self.options.ascii_fast_path {
            return Ok(rel.saturating_sub(1));
        }
        let text = chunk.text(&self.mem)?;
        let clusters = self.graphemes.get_or_compute(self.chunk_key(chunk), text)?;
        Ok(clusters
            .iter()
            .rev()
            .find(|g| (g.byte_offset as usize) < rel)
            .map_or(0, |g| g.byte_offset as usize))
    }

    // ---------------------------------------------------------------
    // Highlights
    // ---------------------------------------------------------------

    /// Register a named style for use with highlight style ids.
    pub fn register_style(&mut self, name: impl Into<String>, style: Style) -> u32 {
        self.styles.register(name, style)
    }

    #[must_use]
    pub fn style(&self, id: u32) -> Option<Style> {
        self.styles.style(id)
    }

    #[must_use]
    pub fn styles(&self) -> &StyleRegistry {
        &self.styles
    }

    #[must_use]
    pub fn highlights(&self) -> &HighlightSet {
        &self.highlights
    }

    pub fn start_highlights_transaction(&mut self) -> Result<()> {
        let result = self.highlights.begin();
        if let Err(err) = &result {
            emit_log(LogLevel::Warn, &format!("text buffer highlights: {err}"));
        }
        result
    }

    /// Apply queued highlight changes; returns how many were applied.
    pub fn end_highlights_transaction(&mut self) -> Result<usize> {
        self.highlights.commit()
    }

    /// Highlight the char range `[start, end)` with a registered style id.
    pub fn add_highlight_by_char_range(
        &mut self,
        start: usize,
        end: usize,
        style_id: u32,
        priority: u8,
        layer: u16,
    ) -> Result<()> {
        let len = self.len_chars();
        if start > end || end > len {
            return Err(Error::InvalidRange { start, end, len });
        }
        self.highlights.add(
            Highlight::new(start, end, style_id)
                .with_priority(priority)
                .with_layer(layer),
        );
        Ok(())
    }

    /// Highlight a byte range with an ad-hoc style; returns its style id.
    pub fn add_highlight(&mut self, range: Range<usize>, style: Style, priority: u8) -> Result<u32> {
        let len = self.len_bytes();
        if range.start > range.end || range.end > len {
            return Err(Error::InvalidRange {
                start: range.start,
                end: range.end,
                len,
            });
        }
        let start = self.byte_to_char(range.start)?;
        let end = self.byte_to_char(range.end)?;
        let id = self.styles.register_anonymous(style);
        self.highlights
            .add(Highlight::new(start, end, id).with_priority(priority));
        Ok(id)
    }

    pub fn remove_highlights_by_layer(&mut self, layer: u16) {
        self.highlights.remove_layer(layer);
    }

    pub fn clear_highlights(&mut self) {
        self.highlights.clear();
    }

    /// Highlights overlapping the char range `[start, end)`.
    pub fn highlights_in_range(&self, start: usize, end: usize) -> impl Iterator<Item = &Highlight> {
        self.highlights.in_range(start, end)
    }

    /// Effective style at a byte offset; higher priorities apply last.
    pub fn style_at(&self, offset: usize) -> Result<Style> {
        let pos = self.byte_to_char(offset)?;
        let mut covering: SmallVec<[&Highlight; 8]> = self.highlights.at(pos).collect();
        covering.sort_by_key(|h| h.priority);
        Ok(covering
            .iter()
            .filter_map(|h| self.styles.style(h.style_id))
            .fold(self.default_style, Style::merge))
    }
}

impl fmt::Display for TextBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.rope {
            match segment {
                Segment::Text(chunk) => f.write_str(chunk.text(&self.mem).map_err(|_| fmt::Error)?)?,
                Segment::Break(kind) => f.write_str(kind.as_str())?,
                Segment::LineStart => {}
            }
        }
        Ok(())
    }
}
