use core::fmt;
use std::collections::BTreeMap;

use crate::tags::TagKind;

/// Opening delimiter of a placeholder token in the processed text stream.
pub const PLACEHOLDER_OPEN: char = '\u{E000}';
/// Closing delimiter of a placeholder token in the processed text stream.
pub const PLACEHOLDER_CLOSE: char = '\u{E001}';

/// Width/height pair in layout units.
///
/// A zero component means "unknown, resolve later".
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Size {
    /// Horizontal extent.
    pub width: f32,
    /// Vertical extent.
    pub height: f32,
}

impl Size {
    /// The fully unknown size.
    pub const ZERO: Self = Self {
        width: 0.0,
        height: 0.0,
    };

    /// Create a size.
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// True when both components are zero.
    pub fn is_zero(self) -> bool {
        self.width == 0.0 && self.height == 0.0
    }

    /// True when either component is still unknown.
    pub fn is_unknown(self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Width over height, when both are known.
    pub fn aspect_ratio(self) -> Option<f32> {
        if self.is_unknown() {
            None
        } else {
            Some(self.width / self.height)
        }
    }

    /// Shrink to `max_width`, preserving aspect ratio.
    ///
    /// Sizes that already fit, and non-positive limits, are returned unchanged.
    pub fn clamp_width(self, max_width: f32) -> Self {
        if max_width <= 0.0 || self.width <= max_width {
            return self;
        }
        match self.aspect_ratio() {
            Some(ratio) => Self::new(max_width, max_width / ratio),
            None => Self::new(max_width, self.height),
        }
    }
}

/// Horizontal placement requested by an `align` attribute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Alignment {
    /// Block-centered on its own line; text flows above and below.
    #[default]
    None,
    /// Flush left; text may flow beside it.
    Left,
    /// Flush right; text may flow beside it.
    Right,
    /// Centered without claiming the full line.
    Center,
}

impl Alignment {
    /// Parse an `align` attribute value, case-insensitively.
    ///
    /// Absent or unrecognized values map to [`Alignment::None`].
    pub fn parse(raw: &str) -> Self {
        let value = raw.trim();
        if value.eq_ignore_ascii_case("left") {
            Self::Left
        } else if value.eq_ignore_ascii_case("right") {
            Self::Right
        } else if value.eq_ignore_ascii_case("center") {
            Self::Center
        } else {
            Self::None
        }
    }

    /// Stable lowercase name (empty for `None`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Left => "left",
            Self::Right => "right",
            Self::Center => "center",
        }
    }
}

/// Identifier of one attachment occurrence.
///
/// The identifier is textually equal to the placeholder token substituted
/// into the processed text, so locating the token recovers the attachment.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttachmentId(String);

impl AttachmentId {
    /// Build the placeholder identifier for the `ordinal`-th occurrence of `kind`.
    pub fn placeholder(kind: TagKind, ordinal: usize) -> Self {
        Self(format!(
            "{PLACEHOLDER_OPEN}{}-{ordinal}{PLACEHOLDER_CLOSE}",
            kind.name()
        ))
    }

    /// Placeholder token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Byte length of the placeholder token.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for generated identifiers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Human-readable form without the private-use delimiters.
    pub fn label(&self) -> &str {
        self.0
            .trim_start_matches(PLACEHOLDER_OPEN)
            .trim_end_matches(PLACEHOLDER_CLOSE)
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Descriptor for a piece of markup replaced by non-text content.
///
/// Identity fields (`id`, `kind`, `source_url`, `raw_markup`) are fixed at
/// extraction. Declared size, alignment and link may be refined until the
/// attachment is first materialized; `max_size` stays adjustable afterwards
/// so late natural sizes can still be reconciled.
#[derive(Clone, Debug, PartialEq)]
pub struct Attachment {
    id: AttachmentId,
    kind: TagKind,
    source_url: String,
    raw_attributes: BTreeMap<String, String>,
    raw_markup: String,
    declared_size: Size,
    max_size: Size,
    alignment: Alignment,
    link: Option<String>,
    materialized: bool,
}

impl Attachment {
    /// Create a descriptor. `max_size` starts equal to `declared_size`.
    pub fn new(
        id: AttachmentId,
        kind: TagKind,
        source_url: impl Into<String>,
        raw_markup: impl Into<String>,
    ) -> Self {
        Self {
            id,
            kind,
            source_url: source_url.into(),
            raw_attributes: BTreeMap::new(),
            raw_markup: raw_markup.into(),
            declared_size: Size::ZERO,
            max_size: Size::ZERO,
            alignment: Alignment::None,
            link: None,
            materialized: false,
        }
    }

    pub(crate) fn with_attributes(mut self, attributes: BTreeMap<String, String>) -> Self {
        self.raw_attributes = attributes;
        self
    }

    pub fn id(&self) -> &AttachmentId {
        &self.id
    }

    pub fn kind(&self) -> TagKind {
        self.kind
    }

    /// Resolved source URL (empty for tags that need none).
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Every attribute on the element, last writer wins per name.
    pub fn raw_attributes(&self) -> &BTreeMap<String, String> {
        &self.raw_attributes
    }

    /// Exact original markup of the occurrence.
    pub fn raw_markup(&self) -> &str {
        &self.raw_markup
    }

    pub fn declared_size(&self) -> Size {
        self.declared_size
    }

    pub fn max_size(&self) -> Size {
        self.max_size
    }

    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    /// URL of the enclosing anchor, if any.
    pub fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }

    /// Whether replacement content has been created for this attachment.
    pub fn is_materialized(&self) -> bool {
        self.materialized
    }

    /// Refine the declared size; also resets `max_size` to match.
    ///
    /// Returns `false` (and changes nothing) once materialized.
    pub fn set_declared_size(&mut self, size: Size) -> bool {
        if self.materialized {
            return false;
        }
        self.declared_size = size;
        self.max_size = size;
        true
    }

    /// Adjust the layout upper bound. Allowed at any point in the lifecycle.
    pub fn set_max_size(&mut self, size: Size) {
        self.max_size = size;
    }

    /// Returns `false` (and changes nothing) once materialized.
    pub fn set_alignment(&mut self, alignment: Alignment) -> bool {
        if self.materialized {
            return false;
        }
        self.alignment = alignment;
        true
    }

    /// Returns `false` (and changes nothing) once materialized.
    pub fn set_link(&mut self, link: impl Into<String>) -> bool {
        if self.materialized {
            return false;
        }
        self.link = Some(link.into());
        true
    }

    /// Freeze refinable fields; called when replacement content is first created.
    pub fn mark_materialized(&mut self) {
        self.materialized = true;
    }
}
