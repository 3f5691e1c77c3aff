//! `opentui_text` - text engine for terminal UIs
//!
//! Rope-backed text storage with line markers and fingers, Unicode width and
//! grapheme scanning, highlight layers, and a wrapping view that maps between
//! byte offsets and screen coordinates.
//!
//! ```
//! use opentui_text::{TextBuffer, TextBufferView, WrapMode};
//!
//! let mut buffer = TextBuffer::with_text("fn main() {\n    println!(\"hi\");\n}").unwrap();
//! buffer.rebuild_marker_index();
//!
//! let view = TextBufferView::new(&buffer)
//!     .viewport(0, 0, 12, 10)
//!     .wrap_mode(WrapMode::Char);
//! assert_eq!(view.virtual_line_count(), 4);
//! assert_eq!(
//!     view.coords_to_offset_fast(2, 3).unwrap(),
//!     view.coords_to_offset(2, 3).unwrap()
//! );
//! ```

// Crate-level lint configuration
#![allow(clippy::cast_possible_truncation)] // Offsets fit in u32 columns
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)] // Intentional for color math
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Docs WIP
#![allow(clippy::missing_panics_doc)] // Docs WIP
#![allow(clippy::missing_const_for_fn)] // Many functions could be const, not critical
#![allow(clippy::doc_markdown)] // Allow technical names without backticks
#![allow(clippy::use_self)] // Allow explicit type names in impl blocks
#![allow(clippy::format_push_string)] // format! with push_str is fine
#![allow(clippy::suboptimal_flops)] // Standard math notation is clearer than mul_add
#![allow(clippy::cast_lossless)] // as casts are fine for primitive widening
#![allow(clippy::items_after_statements)] // Common pattern in tests
#![allow(clippy::needless_collect)] // Collect for assertions is clear

pub mod color;
pub mod error;
pub mod event;
pub mod style;
pub mod text;
pub mod unicode;

// Re-export core types at crate root
pub use color::Rgba;
pub use error::{Error, Result};
pub use event::{LogLevel, emit_event, emit_log, set_event_callback, set_log_callback};
pub use style::{Style, TextAttributes};
pub use text::{
    MemId, MemRegistry, Rope, RopeItem, StyledChunk, TextBuffer, TextBufferOptions,
    TextBufferView, WrapMode,
};
pub use unicode::{WidthMethod, WidthOptions};
