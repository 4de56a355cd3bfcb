//! Replacement content and the attachment-to-content mapping.

use core::fmt;
use std::any::Any;
use std::sync::Arc;

use attach_flow::{Attachment, Size, TagKind};

/// Opaque decoded payload produced by a [`ContentLoader`].
pub type ContentHandle = Arc<dyn Any + Send + Sync>;

/// What a replacement shows in place of its attachment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplacementKind {
    /// Remote image fetched by the content loader.
    Image { source: String },
    /// Embedded web surface (iframes).
    Web { source: String },
    /// Full-width thin marker.
    Separator,
    /// Caller-defined content, identified by a caller-chosen label.
    Custom(String),
}

/// Replacement content attached to the host for one attachment.
#[derive(Clone)]
pub struct Replacement {
    pub kind: ReplacementKind,
    /// Current view size. Zero while the natural size is still unknown.
    pub size: Size,
    /// Drawn over the host background instead of blending with it.
    pub opaque: bool,
    pub content: Option<ContentHandle>,
}

impl fmt::Debug for Replacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replacement")
            .field("kind", &self.kind)
            .field("size", &self.size)
            .field("opaque", &self.opaque)
            .field("has_content", &self.content.is_some())
            .finish()
    }
}

impl Replacement {
    pub fn new(kind: ReplacementKind, size: Size) -> Self {
        Self {
            kind,
            size,
            opaque: false,
            content: None,
        }
    }

    pub fn custom(label: impl Into<String>, size: Size) -> Self {
        Self::new(ReplacementKind::Custom(label.into()), size)
    }

    pub fn with_opaque(mut self, opaque: bool) -> Self {
        self.opaque = opaque;
        self
    }

    /// Source the content loader should resolve, when the size is unknown.
    pub fn pending_source(&self) -> Option<&str> {
        match &self.kind {
            ReplacementKind::Image { source } if self.size.is_unknown() => Some(source),
            _ => None,
        }
    }
}

/// Caller-provided mapping from attachment to replacement content.
///
/// Returning `None` falls through to the built-in mapping when auto-loading
/// is enabled.
pub type AttachmentMap = Box<dyn FnMut(&Attachment) -> Option<Replacement> + Send + 'static>;

/// Result of a successful content load.
#[derive(Clone)]
pub struct LoadedContent {
    pub natural_size: Size,
    pub content: Option<ContentHandle>,
}

impl fmt::Debug for LoadedContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedContent")
            .field("natural_size", &self.natural_size)
            .field("has_content", &self.content.is_some())
            .finish()
    }
}

/// Completion handed to a [`ContentLoader`]; may be invoked from any thread.
pub type LoadCallback = Box<dyn FnOnce(Option<LoadedContent>) + Send + 'static>;

/// Fetches and decodes remote content.
///
/// Failures are reported as `None` (or by never calling `done`); the
/// attachment's size then stays unknown.
pub trait ContentLoader: Send + Sync {
    fn load(&self, source: &str, done: LoadCallback);
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http") || source.starts_with("ftp")
}

/// Built-in mapping for images, iframes and separators.
///
/// Remote images are clamped to `container_width` preserving aspect ratio
/// and the clamped size becomes the attachment's `max_size`. Iframes use
/// their declared size for both. Separators are one unit high and span the
/// container. Everything else has no default content.
pub fn default_replacement(attachment: &mut Attachment, container_width: f32) -> Option<Replacement> {
    let source = attachment.source_url().to_string();
    let replacement = match attachment.kind() {
        TagKind::Image if is_remote(&source) => {
            let size = attachment.declared_size().clamp_width(container_width);
            attachment.set_max_size(size);
            Replacement::new(ReplacementKind::Image { source }, size)
        }
        TagKind::Iframe if !source.is_empty() => {
            let size = attachment.declared_size();
            attachment.set_max_size(size);
            Replacement::new(ReplacementKind::Web { source }, size)
        }
        TagKind::Separator => Replacement::new(
            ReplacementKind::Separator,
            Size::new(container_width.floor(), 1.0),
        ),
        _ => return None,
    };
    Some(replacement.with_opaque(true))
}
