//! Styled text buffer: text, attribute runs and attachment anchors.

use core::fmt;
use core::ops::Range;
use std::collections::BTreeMap;

use crate::attachment::AttachmentId;

/// Character standing in for an attachment in the styled text.
pub const OBJECT_REPLACEMENT: char = '\u{FFFC}';

/// 8-bit RGBA color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xFF }
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`.
    pub fn parse_hex(raw: &str) -> Option<Self> {
        let hex = raw.trim().strip_prefix('#')?;
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        match hex.len() {
            3 => {
                let mut it = hex.chars().map(|c| c.to_digit(16).map(|d| (d * 17) as u8));
                Some(Self::rgb(it.next()??, it.next()??, it.next()??))
            }
            6 => Some(Self::rgb(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            8 => Some(Self {
                r: channel(&hex[0..2])?,
                g: channel(&hex[2..4])?,
                b: channel(&hex[4..6])?,
                a: channel(&hex[6..8])?,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)?;
        if self.a != 0xFF {
            write!(f, "{:02x}", self.a)?;
        }
        Ok(())
    }
}

/// Font selection for a run.
#[derive(Clone, Debug, PartialEq)]
pub struct FontDescriptor {
    pub family: String,
    pub size: f32,
    /// Bold trait.
    pub bold: bool,
    /// Horizontal shear applied to glyphs; non-zero renders as italic.
    pub shear: f32,
}

impl FontDescriptor {
    pub fn new(family: impl Into<String>, size: f32) -> Self {
        Self {
            family: family.into(),
            size,
            bold: false,
            shear: 0.0,
        }
    }

    /// Same descriptor with the bold trait merged in.
    pub fn with_bold(&self) -> Self {
        Self {
            bold: true,
            ..self.clone()
        }
    }

    /// Same descriptor with a fixed shear transform.
    pub fn with_shear(&self, shear: f32) -> Self {
        Self {
            shear,
            ..self.clone()
        }
    }

    pub fn is_italic(&self) -> bool {
        self.shear != 0.0
    }
}

/// Attribute set of one run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunAttributes {
    pub font: FontDescriptor,
    pub color: Color,
    /// Target of an enclosing anchor.
    pub link: Option<String>,
    /// Text inside a blockquote.
    pub quote: bool,
    /// Caller-supplied base attributes not interpreted by this crate.
    pub extra: BTreeMap<String, String>,
}

impl Default for RunAttributes {
    fn default() -> Self {
        Self {
            font: FontDescriptor::new("system", 13.0),
            color: Color::BLACK,
            link: None,
            quote: false,
            extra: BTreeMap::new(),
        }
    }
}

/// Contiguous byte range sharing one attribute set.
#[derive(Clone, Debug, PartialEq)]
pub struct StyledRun {
    pub range: Range<usize>,
    pub attributes: RunAttributes,
}

/// Position of an attachment in the styled text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentAnchor {
    pub id: AttachmentId,
    /// Byte range of the [`OBJECT_REPLACEMENT`] character.
    pub range: Range<usize>,
    /// Whether the attachment claims its own line (alignment `none`).
    pub block: bool,
}

/// Text plus attribute runs plus attachment anchors.
///
/// Runs cover the text without gaps, in order, and adjacent runs never share
/// an attribute set. Anchors are sorted by position.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StyledText {
    text: String,
    runs: Vec<StyledRun>,
    anchors: Vec<AttachmentAnchor>,
}

impl StyledText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn runs(&self) -> &[StyledRun] {
        &self.runs
    }

    pub fn anchors(&self) -> &[AttachmentAnchor] {
        &self.anchors
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Anchor of the attachment with `id`.
    pub fn anchor(&self, id: &AttachmentId) -> Option<&AttachmentAnchor> {
        self.anchors.iter().find(|anchor| &anchor.id == id)
    }

    /// Attributes in effect at byte `offset`.
    pub fn attributes_at(&self, offset: usize) -> Option<&RunAttributes> {
        self.runs
            .iter()
            .find(|run| run.range.contains(&offset))
            .map(|run| &run.attributes)
    }

    /// Iterate `(text, attributes)` pairs in order.
    pub fn segments(&self) -> impl Iterator<Item = (&str, &RunAttributes)> {
        self.runs
            .iter()
            .map(move |run| (&self.text[run.range.clone()], &run.attributes))
    }

    /// Byte range of the first occurrence of `needle` at or after `from`.
    pub fn find(&self, needle: &str, from: usize) -> Option<Range<usize>> {
        let start = self.text.get(from..)?.find(needle)? + from;
        Some(start..start + needle.len())
    }

    /// Append text with `attributes`, merging into the last run when equal.
    pub fn push_str(&mut self, text: &str, attributes: &RunAttributes) {
        if text.is_empty() {
            return;
        }
        let start = self.text.len();
        self.text.push_str(text);
        let end = self.text.len();
        match self.runs.last_mut() {
            Some(last) if last.attributes == *attributes && last.range.end == start => {
                last.range.end = end;
            }
            _ => self.runs.push(StyledRun {
                range: start..end,
                attributes: attributes.clone(),
            }),
        }
    }

    /// Remove `range` from the text, shifting runs and anchors.
    ///
    /// Anchors inside the removed range are dropped.
    pub fn delete(&mut self, range: Range<usize>) {
        self.splice(range, "");
    }

    /// Replace `range` with a single attachment character anchored to `id`.
    pub fn replace_with_anchor(&mut self, range: Range<usize>, id: AttachmentId, block: bool) {
        let start = range.start;
        let mut buf = [0u8; 4];
        self.splice(range, OBJECT_REPLACEMENT.encode_utf8(&mut buf));
        let anchor = AttachmentAnchor {
            id,
            range: start..start + OBJECT_REPLACEMENT.len_utf8(),
            block,
        };
        let at = self
            .anchors
            .partition_point(|existing| existing.range.start < start);
        self.anchors.insert(at, anchor);
    }

    /// Mutate the attributes of every run inside `range`, splitting runs at
    /// the range edges as needed.
    pub fn update_attributes<F>(&mut self, range: Range<usize>, mut update: F)
    where
        F: FnMut(&mut RunAttributes),
    {
        if range.is_empty() {
            return;
        }
        let mut runs = Vec::with_capacity(self.runs.len() + 2);
        for run in self.runs.drain(..) {
            let (start, end) = (run.range.start, run.range.end);
            if end <= range.start || start >= range.end {
                runs.push(run);
                continue;
            }
            if start < range.start {
                runs.push(StyledRun {
                    range: start..range.start,
                    attributes: run.attributes.clone(),
                });
            }
            let mut inside = StyledRun {
                range: start.max(range.start)..end.min(range.end),
                attributes: run.attributes.clone(),
            };
            update(&mut inside.attributes);
            runs.push(inside);
            if end > range.end {
                runs.push(StyledRun {
                    range: range.end..end,
                    attributes: run.attributes,
                });
            }
        }
        self.runs = runs;
        self.coalesce();
    }

    fn splice(&mut self, range: Range<usize>, replacement: &str) {
        let inserted = replacement.len();
        let host = self
            .attributes_at(range.start)
            .or_else(|| self.runs.last().map(|run| &run.attributes))
            .cloned();
        let shift = |offset: usize| offset - range.end + range.start + inserted;

        let mut runs = Vec::with_capacity(self.runs.len() + 1);
        for run in self.runs.drain(..) {
            let (start, end) = (run.range.start, run.range.end);
            if start < range.start {
                runs.push(StyledRun {
                    range: start..end.min(range.start),
                    attributes: run.attributes.clone(),
                });
            }
            if end > range.end {
                runs.push(StyledRun {
                    range: shift(start.max(range.end))..shift(end),
                    attributes: run.attributes,
                });
            }
        }
        if inserted > 0 {
            if let Some(attributes) = host {
                runs.push(StyledRun {
                    range: range.start..range.start + inserted,
                    attributes,
                });
            }
        }
        runs.sort_by_key(|run| run.range.start);
        self.runs = runs;
        self.coalesce();

        self.anchors.retain(|anchor| {
            anchor.range.end <= range.start || anchor.range.start >= range.end
        });
        for anchor in &mut self.anchors {
            if anchor.range.start >= range.end {
                anchor.range = shift(anchor.range.start)..shift(anchor.range.end);
            }
        }
        self.text.replace_range(range, replacement);
    }

    fn coalesce(&mut self) {
        let mut merged: Vec<StyledRun> = Vec::with_capacity(self.runs.len());
        for run in self.runs.drain(..) {
            if run.range.is_empty() {
                continue;
            }
            match merged.last_mut() {
                Some(last)
                    if last.range.end == run.range.start && last.attributes == run.attributes =>
                {
                    last.range.end = run.range.end;
                }
                _ => merged.push(run),
            }
        }
        self.runs = merged;
    }
}
