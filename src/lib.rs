//! Restricted-HTML attachment extraction and inline style resolution.
//!
//! `attach-flow` turns a small HTML dialect into a styled text buffer plus an
//! ordered list of typed [`Attachment`] descriptors. Content tags (images,
//! iframes, embeds, audio/video, separators) are replaced by placeholder
//! tokens that later become attachment anchors in the styled text; inline
//! emphasis (`<strong>`, `<em>`) is resolved into bold/italic run attributes.
//!
//! Positioning and lazy materialization of attachments against a live text
//! layout lives in the companion `attach-flow-view` crate.
//!
//! ```
//! use attach_flow::{prepare, PrepareOptions, TagKind};
//!
//! let prepared = prepare(
//!     r#"<p>Intro</p><img src="https://example.com/a.png" width="320" height="200">"#,
//!     &PrepareOptions::default(),
//! );
//! assert_eq!(prepared.attachments.len(), 1);
//! assert_eq!(prepared.attachments[0].kind(), TagKind::Image);
//! assert_eq!(prepared.text.anchors().len(), 1);
//! ```

#![cfg_attr(
    not(test),
    deny(
        clippy::disallowed_methods,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::panic_in_result_fn,
        clippy::todo,
        clippy::unimplemented
    )
)]

mod attachment;
mod builder;
mod element;
mod error;
mod extract;
mod inline_style;
mod prepare;
mod styled_text;
mod tags;

pub use attachment::{
    Alignment, Attachment, AttachmentId, Size, PLACEHOLDER_CLOSE, PLACEHOLDER_OPEN,
};
pub use builder::StyledTextBuilder;
pub use error::MarkupError;
pub use extract::{extract, extract_all, Extraction};
pub use inline_style::{InlineStyleResolver, DEFAULT_ITALIC_SHEAR};
pub use prepare::{prepare, BaseFont, PrepareOptions, PreparedContent};
pub use styled_text::{
    AttachmentAnchor, Color, FontDescriptor, RunAttributes, StyledRun, StyledText,
    OBJECT_REPLACEMENT,
};
pub use tags::{TagKind, TagRole, TagShape, TagSpec, EXTRACTION_ORDER, TAG_REGISTRY};
