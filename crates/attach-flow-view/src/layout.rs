//! Frame and exclusion computation against host line geometry.

use core::ops::Range;

use attach_flow::{Alignment, AttachmentId, Size};
use serde::Serialize;

use crate::geometry::{Insets, Rect};
use crate::host::TextHost;

/// Fixed gap between an anchor line and the attachment placed on it.
pub const DEFAULT_TOP_LINE_PADDING: f32 = 4.0;

/// Container geometry and the working exclusion set for one layout pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayoutContext {
    pub container_width: f32,
    pub host_width: f32,
    pub insets: Insets,
    exclusions: Vec<Rect>,
}

impl LayoutContext {
    pub fn capture<H: TextHost>(host: &H) -> Self {
        Self {
            container_width: host.container_size().width,
            host_width: host.host_width(),
            insets: host.container_insets(),
            exclusions: host.exclusion_regions().to_vec(),
        }
    }

    pub fn exclusions(&self) -> &[Rect] {
        &self.exclusions
    }
}

/// Remove-recompute-reinstate sequence over the host's exclusion regions.
///
/// [`begin`](Self::begin) withdraws every region this engine owns and
/// re-runs host layout, so geometry queried afterwards never reflects stale
/// exclusions. Each [`reinstate`](Self::reinstate) registers one new region
/// and re-runs host layout before the next attachment is measured.
pub struct ExclusionTransaction<'h, H: TextHost> {
    host: &'h mut H,
    ctx: LayoutContext,
    added: Vec<Rect>,
}

impl<'h, H: TextHost> ExclusionTransaction<'h, H> {
    pub fn begin(host: &'h mut H, owned: &[Rect]) -> Self {
        let mut ctx = LayoutContext::capture(&*host);
        for rect in owned {
            if let Some(pos) = ctx.exclusions.iter().position(|r| r == rect) {
                ctx.exclusions.remove(pos);
            }
        }
        host.set_exclusion_regions(ctx.exclusions.clone());
        host.ensure_layout();
        Self {
            host,
            ctx,
            added: Vec::new(),
        }
    }

    pub fn host(&self) -> &H {
        &*self.host
    }

    pub fn context(&self) -> &LayoutContext {
        &self.ctx
    }

    pub fn reinstate(&mut self, rect: Rect) {
        self.ctx.exclusions.push(rect);
        self.added.push(rect);
        self.host.set_exclusion_regions(self.ctx.exclusions.clone());
        self.host.ensure_layout();
    }

    /// Finish the pass; returns the regions registered during it.
    pub fn commit(self) -> Vec<Rect> {
        self.added
    }
}

/// One materialized attachment to position.
#[derive(Clone, Debug, PartialEq)]
pub struct LayoutItem {
    pub id: AttachmentId,
    /// Byte range of the anchor character.
    pub anchor: Range<usize>,
    pub alignment: Alignment,
    /// Current replacement size.
    pub size: Size,
}

/// Computed placement of one attachment.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AttachmentFrame {
    #[serde(serialize_with = "serialize_id")]
    pub id: AttachmentId,
    /// Frame in host coordinates (insets included).
    pub frame: Rect,
    /// Exclusion region in text-container coordinates.
    pub exclusion: Rect,
}

fn serialize_id<S: serde::Serializer>(id: &AttachmentId, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(id.label())
}

/// Positions attachments at their anchors and keeps text flowing around
/// them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutEngine {
    top_line_padding: f32,
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_LINE_PADDING)
    }
}

impl LayoutEngine {
    pub fn new(top_line_padding: f32) -> Self {
        Self { top_line_padding }
    }

    /// Lay out `items` in anchor order.
    ///
    /// `owned` are the exclusion regions registered by the previous pass.
    /// Items whose anchor has no line geometry yet are left out of the
    /// result.
    pub fn layout<H: TextHost>(
        &self,
        host: &mut H,
        items: &[LayoutItem],
        owned: &[Rect],
    ) -> Vec<AttachmentFrame> {
        let mut tx = ExclusionTransaction::begin(host, owned);
        let mut frames = Vec::with_capacity(items.len());
        let mut previous: Option<(&LayoutItem, Rect)> = None;

        for item in items {
            let Some(frame) = self.frame_for(tx.host(), tx.context(), item, previous) else {
                log::debug!("no line geometry for {}; leaving it unplaced", item.id);
                continue;
            };
            let exclusion = self.exclusion_for(tx.context(), frame, item.alignment);
            tx.reinstate(exclusion);
            frames.push(AttachmentFrame {
                id: item.id.clone(),
                frame,
                exclusion,
            });
            previous = Some((item, frame));
        }
        tx.commit();
        frames
    }

    /// Frame for one attachment, or `None` when the host has no geometry
    /// for its anchor.
    pub fn frame_for<H: TextHost>(
        &self,
        host: &H,
        ctx: &LayoutContext,
        item: &LayoutItem,
        previous: Option<(&LayoutItem, Rect)>,
    ) -> Option<Rect> {
        let size = item.size.clamp_width(ctx.container_width);

        let stacked = previous.filter(|(prev, _)| prev.anchor.end + 1 == item.anchor.start);
        let y = match stacked {
            Some((_, prev_frame)) => prev_frame.max_y(),
            None => {
                let glyphs = host.glyph_range(item.anchor.clone());
                let line = host.line_fragment_rect(glyphs.start)?;
                let bounds = host.bounding_rect(glyphs)?;
                let line_y = match item.alignment {
                    Alignment::None if bounds.min_x() != line.min_x() => line.max_y(),
                    _ => line.min_y(),
                };
                line_y + ctx.insets.top + self.top_line_padding
            }
        };

        let offset = match item.alignment {
            Alignment::None | Alignment::Center => (ctx.container_width - size.width) / 2.0,
            Alignment::Left => 0.0,
            Alignment::Right => ctx.container_width - size.width,
        };
        Some(Rect::from_origin_size(ctx.insets.left + offset, y, size))
    }

    /// Exclusion region for a frame, in text-container coordinates.
    ///
    /// Block attachments exclude the full host width over their height;
    /// floated ones exclude only their own frame.
    pub fn exclusion_for(&self, ctx: &LayoutContext, frame: Rect, alignment: Alignment) -> Rect {
        let y = frame.min_y() - ctx.insets.top;
        match alignment {
            Alignment::None => Rect::new(0.0, y, ctx.host_width, frame.height),
            _ => Rect::new(frame.min_x() - ctx.insets.left, y, frame.width, frame.height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attach_flow::{StyledText, TagKind};

    use crate::replacement::Replacement;

    /// Host with one 20-unit line per anchor position and fixed glyph x.
    struct LineHost {
        width: f32,
        insets: Insets,
        exclusions: Vec<Rect>,
        glyph_x: f32,
        layouts: usize,
    }

    impl LineHost {
        fn new(width: f32) -> Self {
            Self {
                width,
                insets: Insets::default(),
                exclusions: Vec::new(),
                glyph_x: 0.0,
                layouts: 0,
            }
        }
    }

    impl TextHost for LineHost {
        fn set_content(&mut self, _text: &StyledText) {}
        fn glyph_range(&self, text_range: Range<usize>) -> Range<usize> {
            text_range
        }
        fn line_fragment_rect(&self, glyph: usize) -> Option<Rect> {
            Some(Rect::new(0.0, glyph as f32 * 10.0, self.width, 20.0))
        }
        fn bounding_rect(&self, glyphs: Range<usize>) -> Option<Rect> {
            Some(Rect::new(self.glyph_x, glyphs.start as f32 * 10.0, 8.0, 20.0))
        }
        fn container_size(&self) -> Size {
            Size::new(self.width, 1000.0)
        }
        fn container_insets(&self) -> Insets {
            self.insets
        }
        fn exclusion_regions(&self) -> &[Rect] {
            &self.exclusions
        }
        fn set_exclusion_regions(&mut self, regions: Vec<Rect>) {
            self.exclusions = regions;
        }
        fn ensure_layout(&mut self) {
            self.layouts += 1;
        }
        fn attach(&mut self, _id: &AttachmentId, _replacement: &Replacement) {}
        fn detach(&mut self, _id: &AttachmentId) {}
        fn set_frame(&mut self, _id: &AttachmentId, _frame: Rect) {}
    }

    fn item(ordinal: usize, anchor: Range<usize>, alignment: Alignment, size: Size) -> LayoutItem {
        LayoutItem {
            id: AttachmentId::placeholder(TagKind::Image, ordinal),
            anchor,
            alignment,
            size,
        }
    }

    #[test]
    fn block_attachment_starting_a_line_sits_below_the_line_top() {
        let mut host = LineHost::new(300.0);
        host.insets = Insets::new(8.0, 5.0, 0.0, 5.0);
        let items = [item(1, 2..5, Alignment::None, Size::new(100.0, 50.0))];
        let frames = LayoutEngine::default().layout(&mut host, &items, &[]);
        assert_eq!(frames[0].frame, Rect::new(105.0, 20.0 + 8.0 + 4.0, 100.0, 50.0));
        assert_eq!(frames[0].exclusion, Rect::new(0.0, 24.0, 310.0, 50.0));
        assert_eq!(host.exclusions, vec![frames[0].exclusion]);
    }

    #[test]
    fn block_attachment_after_inline_text_uses_the_line_bottom() {
        let mut host = LineHost::new(300.0);
        host.glyph_x = 40.0;
        let items = [item(1, 2..5, Alignment::None, Size::new(100.0, 50.0))];
        let frames = LayoutEngine::default().layout(&mut host, &items, &[]);
        assert_eq!(frames[0].frame.y, 40.0 + 4.0);
    }

    #[test]
    fn floated_attachments_use_the_line_top_and_exclude_their_frame() {
        let mut host = LineHost::new(300.0);
        host.glyph_x = 40.0;
        let items = [
            item(1, 0..3, Alignment::Left, Size::new(80.0, 80.0)),
            item(2, 10..13, Alignment::Right, Size::new(60.0, 30.0)),
        ];
        let frames = LayoutEngine::default().layout(&mut host, &items, &[]);
        assert_eq!(frames[0].frame, Rect::new(0.0, 4.0, 80.0, 80.0));
        assert_eq!(frames[0].exclusion, frames[0].frame);
        assert_eq!(frames[1].frame, Rect::new(240.0, 104.0, 60.0, 30.0));
    }

    #[test]
    fn wide_attachments_are_clamped_to_the_container() {
        let mut host = LineHost::new(300.0);
        let items = [item(1, 0..3, Alignment::Center, Size::new(600.0, 200.0))];
        let frames = LayoutEngine::default().layout(&mut host, &items, &[]);
        assert_eq!(frames[0].frame, Rect::new(0.0, 4.0, 300.0, 100.0));
    }

    #[test]
    fn adjacent_anchors_stack_below_the_previous_frame() {
        let mut host = LineHost::new(300.0);
        let items = [
            item(1, 0..3, Alignment::None, Size::new(100.0, 50.0)),
            item(2, 4..7, Alignment::None, Size::new(100.0, 70.0)),
            item(3, 9..12, Alignment::None, Size::new(100.0, 10.0)),
        ];
        let frames = LayoutEngine::default().layout(&mut host, &items, &[]);
        assert_eq!(frames[1].frame.y, frames[0].frame.max_y());
        assert_eq!(frames[2].frame.y, 90.0 + 4.0);
    }

    #[test]
    fn previous_exclusions_are_replaced_not_accumulated() {
        let mut host = LineHost::new(300.0);
        let foreign = Rect::new(1.0, 1.0, 1.0, 1.0);
        host.exclusions.push(foreign);
        let engine = LayoutEngine::default();
        let items = [item(1, 0..3, Alignment::Left, Size::new(10.0, 10.0))];
        let first = engine.layout(&mut host, &items, &[]);
        let owned: Vec<Rect> = first.iter().map(|f| f.exclusion).collect();
        let layouts_before = host.layouts;
        engine.layout(&mut host, &items, &owned);
        assert_eq!(host.exclusions, vec![foreign, first[0].exclusion]);
        // one layout after withdrawal, one per reinstated region
        assert_eq!(host.layouts - layouts_before, 2);
    }
}
