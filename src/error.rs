use core::fmt;

use crate::tags::TagKind;

/// Recoverable problem found while extracting one tag occurrence.
///
/// Extraction never fails as a whole: each error is logged, recorded in
/// [`Extraction::diagnostics`](crate::Extraction::diagnostics), and the
/// occurrence is handled locally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MarkupError {
    /// The occurrence failed structural parsing and was left untouched.
    MalformedMarkup {
        tag: TagKind,
        /// Byte offset of the occurrence in the pass input.
        offset: usize,
        message: String,
    },
    /// A content tag had no usable source and was removed from the text.
    UnresolvableSource { tag: TagKind, offset: usize },
}

impl MarkupError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedMarkup { .. } => "MARKUP_MALFORMED",
            Self::UnresolvableSource { .. } => "MARKUP_NO_SOURCE",
        }
    }

    pub fn tag(&self) -> TagKind {
        match self {
            Self::MalformedMarkup { tag, .. } | Self::UnresolvableSource { tag, .. } => *tag,
        }
    }
}

impl fmt::Display for MarkupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedMarkup {
                tag,
                offset,
                message,
            } => write!(
                f,
                "malformed <{}> at byte {}: {}",
                tag.name(),
                offset,
                message
            ),
            Self::UnresolvableSource { tag, offset } => write!(
                f,
                "<{}> at byte {} has no usable source",
                tag.name(),
                offset
            ),
        }
    }
}

impl std::error::Error for MarkupError {}
