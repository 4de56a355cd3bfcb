//! Headless monospace text host.

use core::ops::Range;
use std::collections::BTreeMap;

use attach_flow::{AttachmentId, Size, StyledText, OBJECT_REPLACEMENT};
use serde::Serialize;

use crate::geometry::{Insets, Rect};
use crate::host::TextHost;
use crate::replacement::{Replacement, ReplacementKind};

#[derive(Clone, Copy, Debug, PartialEq)]
struct Glyph {
    /// Byte offset of the character in the text.
    byte: usize,
    rect: Rect,
    line: usize,
}

/// Replacement content attached to a [`GridHost`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HostedView {
    pub kind: String,
    pub frame: Rect,
}

/// Fixed-advance text host that lays characters out on a grid and flows
/// lines around its exclusion regions.
///
/// Lines wrap per character. An anchor flagged as a block fills the rest of
/// its line. A full-width exclusion pushes the next line below it; a partial
/// one narrows the lines it overlaps from the side it touches.
#[derive(Clone, Debug)]
pub struct GridHost {
    width: f32,
    advance: f32,
    line_height: f32,
    insets: Insets,
    text: String,
    block_anchors: Vec<usize>,
    exclusions: Vec<Rect>,
    glyphs: Vec<Glyph>,
    lines: Vec<Rect>,
    views: BTreeMap<AttachmentId, HostedView>,
    layouts: usize,
}

impl GridHost {
    pub fn new(width: f32, advance: f32, line_height: f32) -> Self {
        Self {
            width,
            advance,
            line_height,
            insets: Insets::default(),
            text: String::new(),
            block_anchors: Vec::new(),
            exclusions: Vec::new(),
            glyphs: Vec::new(),
            lines: Vec::new(),
            views: BTreeMap::new(),
            layouts: 0,
        }
    }

    pub fn with_insets(mut self, insets: Insets) -> Self {
        self.insets = insets;
        self
    }

    /// Change the container width; the caller notifies the view.
    pub fn set_container_width(&mut self, width: f32) {
        self.width = width;
        self.relayout();
    }

    pub fn views(&self) -> &BTreeMap<AttachmentId, HostedView> {
        &self.views
    }

    pub fn layout_count(&self) -> usize {
        self.layouts
    }

    /// Height of the laid-out text.
    pub fn content_height(&self) -> f32 {
        self.lines.last().map_or(0.0, Rect::max_y)
    }

    /// Text of line `index`, for inspection.
    pub fn line_text(&self, index: usize) -> String {
        self.glyphs
            .iter()
            .filter(|glyph| glyph.line == index)
            .filter_map(|glyph| self.text[glyph.byte..].chars().next())
            .filter(|ch| *ch != '\n')
            .collect()
    }

    /// First free horizontal span at or below `y`.
    fn line_span(&self, mut y: f32) -> (f32, f32, f32) {
        loop {
            let band = Rect::new(0.0, y, self.width, self.line_height);
            let mut start = 0.0_f32;
            let mut end = self.width;
            let mut lowest = None::<f32>;
            for ex in self.exclusions.iter().filter(|ex| {
                ex.min_y() < band.max_y() && ex.max_y() > band.min_y() && ex.width > 0.0
            }) {
                lowest = Some(lowest.map_or(ex.max_y(), |low: f32| low.max(ex.max_y())));
                if ex.min_x() <= start && ex.max_x() >= end {
                    end = start;
                } else if ex.min_x() <= start || ex.min_x() + ex.width / 2.0 < self.width / 2.0 {
                    start = start.max(ex.max_x());
                } else {
                    end = end.min(ex.min_x());
                }
            }
            match lowest {
                Some(low) if end - start < self.advance => y = low,
                _ => return (y, start, end),
            }
        }
    }

    fn relayout(&mut self) {
        self.layouts += 1;
        self.glyphs.clear();
        self.lines.clear();

        let (mut y, mut start, mut end) = self.line_span(0.0);
        let mut cursor = start;
        self.lines.push(Rect::new(start, y, end - start, self.line_height));

        let text = std::mem::take(&mut self.text);
        for (byte, ch) in text.char_indices() {
            let block = ch == OBJECT_REPLACEMENT && self.block_anchors.contains(&byte);
            let width = match ch {
                '\n' => 0.0,
                _ if block => (end - cursor).max(self.advance),
                _ => self.advance,
            };
            if ch != '\n' && cursor > start && cursor + width > end {
                (y, start, end) = self.line_span(y + self.line_height);
                cursor = start;
                self.lines.push(Rect::new(start, y, end - start, self.line_height));
            }
            let width = if block { (end - cursor).max(self.advance) } else { width };
            let line = self.lines.len() - 1;
            self.glyphs.push(Glyph {
                byte,
                rect: Rect::new(cursor, y, width, self.line_height),
                line,
            });
            cursor += width;
            if ch == '\n' {
                (y, start, end) = self.line_span(y + self.line_height);
                cursor = start;
                self.lines.push(Rect::new(start, y, end - start, self.line_height));
            }
        }
        self.text = text;
    }
}

impl TextHost for GridHost {
    fn set_content(&mut self, text: &StyledText) {
        self.text = text.text().to_string();
        self.block_anchors = text
            .anchors()
            .iter()
            .filter(|anchor| anchor.block)
            .map(|anchor| anchor.range.start)
            .collect();
        self.relayout();
    }

    fn glyph_range(&self, text_range: Range<usize>) -> Range<usize> {
        let start = self.glyphs.partition_point(|g| g.byte < text_range.start);
        let end = self.glyphs.partition_point(|g| g.byte < text_range.end);
        start..end
    }

    fn line_fragment_rect(&self, glyph: usize) -> Option<Rect> {
        let line = self.glyphs.get(glyph)?.line;
        self.lines.get(line).copied()
    }

    fn bounding_rect(&self, glyphs: Range<usize>) -> Option<Rect> {
        let boxes = self.glyphs.get(glyphs)?;
        let first = boxes.first()?.rect;
        let (mut min_x, mut min_y, mut max_x, mut max_y) =
            (first.min_x(), first.min_y(), first.max_x(), first.max_y());
        for glyph in &boxes[1..] {
            min_x = min_x.min(glyph.rect.min_x());
            min_y = min_y.min(glyph.rect.min_y());
            max_x = max_x.max(glyph.rect.max_x());
            max_y = max_y.max(glyph.rect.max_y());
        }
        Some(Rect::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    fn container_size(&self) -> Size {
        Size::new(self.width, self.content_height())
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
        self.relayout();
    }

    fn attach(&mut self, id: &AttachmentId, replacement: &Replacement) {
        let kind = match &replacement.kind {
            ReplacementKind::Image { .. } => "image".to_string(),
            ReplacementKind::Web { .. } => "web".to_string(),
            ReplacementKind::Separator => "separator".to_string(),
            ReplacementKind::Custom(label) => label.clone(),
        };
        self.views.insert(
            id.clone(),
            HostedView {
                kind,
                frame: Rect::from_origin_size(0.0, 0.0, replacement.size),
            },
        );
    }

    fn detach(&mut self, id: &AttachmentId) {
        self.views.remove(id);
    }

    fn set_frame(&mut self, id: &AttachmentId, frame: Rect) {
        if let Some(view) = self.views.get_mut(id) {
            view.frame = frame;
        }
    }
}
