//! Attachment layout and lazy materialization for `attach-flow`.
//!
//! An [`AttachmentView`] owns a [`TextHost`] (the text-flow renderer),
//! applies prepared markup to it, decides which attachments get replacement
//! content under a [`MaterializationPolicy`], and positions that content at
//! its anchors with exclusion regions so text flows around it.
//!
//! ```
//! use attach_flow_view::{AttachmentView, DisplayOptions, GridHost};
//!
//! let host = GridHost::new(320.0, 8.0, 18.0);
//! let mut view = AttachmentView::new(host, DisplayOptions::default());
//! view.set_content(r#"<p>Hello</p><img src="https://example.com/a.png" width="640" height="320">"#);
//! let frames = view.frames();
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].frame.width, 320.0);
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

mod geometry;
mod grid_host;
mod host;
mod layout;
mod materialize;
mod replacement;
mod resize;
mod view;

pub use geometry::{Insets, Rect};
pub use grid_host::{GridHost, HostedView};
pub use host::TextHost;
pub use layout::{
    AttachmentFrame, ExclusionTransaction, LayoutContext, LayoutEngine, LayoutItem,
    DEFAULT_TOP_LINE_PADDING,
};
pub use materialize::{AttachmentState, Decision, MaterializationController, MaterializationPolicy};
pub use replacement::{
    default_replacement, AttachmentMap, ContentHandle, ContentLoader, LoadCallback, LoadedContent,
    Replacement, ReplacementKind,
};
pub use resize::{fit_to_container, ResizeReconciler};
pub use view::{AttachmentView, DisplayOptions, ViewDiagnostic, ViewError};
