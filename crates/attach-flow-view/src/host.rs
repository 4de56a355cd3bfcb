//! The host text-flow collaborator.

use core::ops::Range;

use attach_flow::{AttachmentId, Size, StyledText};

use crate::geometry::{Insets, Rect};
use crate::replacement::Replacement;

/// A text-flow renderer that owns line layout and exclusion regions.
///
/// Text offsets are byte offsets into the [`StyledText`] most recently
/// passed to [`set_content`](TextHost::set_content). Rectangles are in
/// text-container coordinates, except frames passed to
/// [`set_frame`](TextHost::set_frame), which include the container insets.
///
/// All methods are called from the single thread that owns the host.
pub trait TextHost {
    /// Replace the displayed text.
    fn set_content(&mut self, text: &StyledText);

    /// Glyph range laid out for a text byte range.
    fn glyph_range(&self, text_range: Range<usize>) -> Range<usize>;

    /// Line fragment containing `glyph`, if laid out.
    fn line_fragment_rect(&self, glyph: usize) -> Option<Rect>;

    /// Bounding box of `glyphs`, if laid out.
    fn bounding_rect(&self, glyphs: Range<usize>) -> Option<Rect>;

    /// Size of the text container. The width is the usable line width.
    fn container_size(&self) -> Size;

    fn container_insets(&self) -> Insets;

    /// Full width of the host surface; full-width exclusions span it.
    fn host_width(&self) -> f32 {
        let insets = self.container_insets();
        self.container_size().width + insets.left + insets.right
    }

    fn exclusion_regions(&self) -> &[Rect];

    fn set_exclusion_regions(&mut self, regions: Vec<Rect>);

    /// Bring line layout up to date with the current exclusion regions.
    fn ensure_layout(&mut self);

    /// Add replacement content to the host surface.
    fn attach(&mut self, id: &AttachmentId, replacement: &Replacement);

    /// Remove replacement content from the host surface.
    fn detach(&mut self, id: &AttachmentId);

    fn set_frame(&mut self, id: &AttachmentId, frame: Rect);
}
