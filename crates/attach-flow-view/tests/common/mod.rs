#![allow(dead_code)]

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::{Arc, Mutex};

use attach_flow::{AttachmentId, Size, StyledText, OBJECT_REPLACEMENT};
use attach_flow_view::{
    ContentLoader, Insets, LoadCallback, LoadedContent, Rect, Replacement, TextHost,
    ViewDiagnostic,
};

pub const LINE_HEIGHT: f32 = 20.0;

/// Host whose n-th anchor sits on a line at a fixed, scripted y position.
///
/// Glyph indices equal byte offsets. Exclusions are recorded but never
/// move anything, so vertical positions stay pinned across passes.
#[derive(Debug, Default)]
pub struct ScriptedHost {
    pub width: f32,
    pub insets: Insets,
    pub anchor_tops: Vec<f32>,
    pub anchor_starts: Vec<usize>,
    pub exclusions: Vec<Rect>,
    pub attached: BTreeMap<AttachmentId, Replacement>,
    pub frames: BTreeMap<AttachmentId, Rect>,
    pub detached: Vec<AttachmentId>,
    pub layouts: usize,
}

impl ScriptedHost {
    pub fn new(width: f32, anchor_tops: Vec<f32>) -> Self {
        Self {
            width,
            anchor_tops,
            ..Self::default()
        }
    }

    fn anchor_index(&self, glyph: usize) -> Option<usize> {
        self.anchor_starts.iter().position(|start| *start == glyph)
    }

    fn line_top(&self, glyph: usize) -> f32 {
        self.anchor_index(glyph)
            .and_then(|i| self.anchor_tops.get(i).copied())
            .unwrap_or(0.0)
    }
}

impl TextHost for ScriptedHost {
    fn set_content(&mut self, text: &StyledText) {
        self.anchor_starts = text
            .text()
            .char_indices()
            .filter(|(_, ch)| *ch == OBJECT_REPLACEMENT)
            .map(|(at, _)| at)
            .collect();
    }

    fn glyph_range(&self, text_range: Range<usize>) -> Range<usize> {
        text_range
    }

    fn line_fragment_rect(&self, glyph: usize) -> Option<Rect> {
        Some(Rect::new(0.0, self.line_top(glyph), self.width, LINE_HEIGHT))
    }

    fn bounding_rect(&self, glyphs: Range<usize>) -> Option<Rect> {
        Some(Rect::new(0.0, self.line_top(glyphs.start), 10.0, LINE_HEIGHT))
    }

    fn container_size(&self) -> Size {
        Size::new(self.width, 10_000.0)
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

    fn attach(&mut self, id: &AttachmentId, replacement: &Replacement) {
        self.attached.insert(id.clone(), replacement.clone());
    }

    fn detach(&mut self, id: &AttachmentId) {
        self.attached.remove(id);
        self.frames.remove(id);
        self.detached.push(id.clone());
    }

    fn set_frame(&mut self, id: &AttachmentId, frame: Rect) {
        self.frames.insert(id.clone(), frame);
    }
}

/// Loader that parks every request until the test completes it.
#[derive(Default)]
pub struct RecordingLoader {
    requests: Mutex<Vec<(String, LoadCallback)>>,
}

impl RecordingLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sources(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.iter().map(|(s, _)| s.clone()).collect())
            .unwrap_or_default()
    }

    /// Complete the oldest request with `size` (or a failure for `None`).
    pub fn complete_next(&self, size: Option<Size>) -> bool {
        let Some((_, done)) = self.requests.lock().ok().and_then(|mut r| {
            if r.is_empty() {
                None
            } else {
                Some(r.remove(0))
            }
        }) else {
            return false;
        };
        done(size.map(|natural_size| LoadedContent {
            natural_size,
            content: None,
        }));
        true
    }
}

impl ContentLoader for RecordingLoader {
    fn load(&self, source: &str, done: LoadCallback) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((source.to_string(), done));
        }
    }
}

/// Shared diagnostics collected from a view's sink.
pub type Collected = Arc<Mutex<Vec<ViewDiagnostic>>>;

pub fn collector() -> (Collected, impl FnMut(ViewDiagnostic) + Send + 'static) {
    let out: Collected = Arc::new(Mutex::new(Vec::new()));
    let sink = out.clone();
    (out, move |diagnostic| {
        if let Ok(mut all) = sink.lock() {
            all.push(diagnostic);
        }
    })
}

pub fn collected(out: &Collected) -> Vec<ViewDiagnostic> {
    out.lock().map(|d| d.clone()).unwrap_or_default()
}

/// `count` remote images with absolute sizes, one per paragraph.
pub fn sized_images(count: usize, width: u32, height: u32) -> String {
    (0..count)
        .map(|i| {
            format!(
                r#"<p>text {i}</p><img src="https://cdn.test/{i}.png" width="{width}" height="{height}">"#
            )
        })
        .collect()
}
