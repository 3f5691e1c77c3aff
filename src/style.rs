//! Text styling attached to buffer ranges.
//!
//! - [`TextAttributes`]: Bitflags for bold, italic, underline, etc.
//! - [`Style`]: Foreground, background and attributes
//!
//! Styles are payloads: the engine stores and merges them per byte range,
//! the renderer interprets them.
//!
//! # Examples
//!
//! ```
//! use opentui_text::{Rgba, Style, TextAttributes};
//!
//! let keyword = Style::fg(Rgba::BLUE).with_bold();
//! let combined = Style::bg(Rgba::BLACK).merge(keyword);
//! assert_eq!(combined.fg, Some(Rgba::BLUE));
//! assert_eq!(combined.bg, Some(Rgba::BLACK));
//! assert!(combined.attributes.contains(TextAttributes::BOLD));
//! ```

use crate::color::Rgba;
use bitflags::bitflags;

bitflags! {
    /// Attribute bits carried by a styled chunk.
    ///
    /// Bit values are the ones a host passes as a raw attribute byte.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
    pub struct TextAttributes: u8 {
        const BOLD          = 0x01;
        const DIM           = 0x02;
        const ITALIC        = 0x04;
        const UNDERLINE     = 0x08;
        const BLINK         = 0x10;
        const INVERSE       = 0x20;
        const HIDDEN        = 0x40;
        const STRIKETHROUGH = 0x80;
    }
}

/// Colors and attributes for a byte range.
///
/// `None` colors inherit from whatever the style is merged onto.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Style {
    pub fg: Option<Rgba>,
    pub bg: Option<Rgba>,
    pub attributes: TextAttributes,
}

impl Style {
    pub const NONE: Self = Self {
        fg: None,
        bg: None,
        attributes: TextAttributes::empty(),
    };

    /// Build from optional colors and a raw attribute byte.
    #[must_use]
    pub const fn new(fg: Option<Rgba>, bg: Option<Rgba>, attributes: u8) -> Self {
        Self {
            fg,
            bg,
            attributes: TextAttributes::from_bits_truncate(attributes),
        }
    }

    /// Foreground only.
    #[must_use]
    pub const fn fg(color: Rgba) -> Self {
        Self {
            fg: Some(color),
            ..Self::NONE
        }
    }

    /// Background only.
    #[must_use]
    pub const fn bg(color: Rgba) -> Self {
        Self {
            bg: Some(color),
            ..Self::NONE
        }
    }

    #[must_use]
    pub const fn bold() -> Self {
        Self {
            attributes: TextAttributes::BOLD,
            ..Self::NONE
        }
    }

    #[must_use]
    pub const fn underline() -> Self {
        Self {
            attributes: TextAttributes::UNDERLINE,
            ..Self::NONE
        }
    }

    /// Add attribute bits.
    #[must_use]
    pub const fn with_attributes(self, attrs: TextAttributes) -> Self {
        Self {
            attributes: self.attributes.union(attrs),
            ..self
        }
    }

    #[must_use]
    pub const fn with_bold(self) -> Self {
        self.with_attributes(TextAttributes::BOLD)
    }

    /// True when merging this style onto another changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fg.is_none() && self.bg.is_none() && self.attributes.is_empty()
    }

    /// Layer `other` on top: its colors win where set, attributes accumulate.
    ///
    /// Highlight resolution folds styles in ascending priority with this.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            fg: other.fg.or(self.fg),
            bg: other.bg.or(self.bg),
            attributes: self.attributes | other.attributes,
        }
    }
}
