//! Text storage, editing and layout.
//!
//! Key types:
//!
//! - [`Rope`]: generic balanced tree with split/concat, fingers and markers
//! - [`TextBuffer`]: segment rope over a [`MemRegistry`], with highlights
//! - [`TextBufferView`]: wrapping, measurement and coordinate mapping
//!
//! # Examples
//!
//! ```
//! use opentui_text::{TextBuffer, TextBufferView, WrapMode};
//!
//! let buffer = TextBuffer::with_text("Hello, world!\nsecond line").unwrap();
//! assert_eq!(buffer.len_chars(), 25);
//! assert_eq!(buffer.line_count(), 2);
//!
//! let view = TextBufferView::new(&buffer)
//!     .viewport(0, 0, 6, 10)
//!     .wrap_mode(WrapMode::Word);
//! assert_eq!(view.virtual_line_count(), 4);
//! assert_eq!(view.offset_to_coords(8).unwrap(), (1, 1));
//! ```

mod buffer;
mod grapheme_cache;
mod highlight;
mod mem;
mod rope;
mod segment;
mod view;

pub use buffer::{LineRef, TextBuffer, TextBufferOptions};
pub use grapheme_cache::{GraphemeCache, GraphemeCacheStats, GraphemeKey};
pub use highlight::{Highlight, HighlightSet, NamedStyle, StyleRegistry};
pub use mem::{MemId, MemRegistry};
pub use rope::{Finger, Iter, MarkerEntry, Metrics, Rope, RopeItem, RopeStats, Summary};
pub use segment::{ChunkFlags, LineMarker, Segment, StyledChunk, TextChunk, TextSummary};
pub use view::{
    LineInfo, Selection, TextBufferView, TextMeasure, Viewport, VirtualLine, WrapMode,
};
