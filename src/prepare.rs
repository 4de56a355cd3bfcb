//! The full markup-to-styled-content pipeline.

use std::collections::BTreeMap;

use crate::attachment::Attachment;
use crate::builder::StyledTextBuilder;
use crate::error::MarkupError;
use crate::extract::extract_all;
use crate::inline_style::{InlineStyleResolver, DEFAULT_ITALIC_SHEAR};
use crate::styled_text::{Color, FontDescriptor, RunAttributes, StyledText};

/// Empty paragraph appended to every document so trailing attachments
/// always have a following line to anchor against.
const DOCUMENT_TERMINATOR: &str = "<p></p>";

/// Base font applied before any tag-specific styling.
#[derive(Clone, Debug, PartialEq)]
pub struct BaseFont {
    pub family: String,
    pub size: f32,
    pub color: Color,
}

impl Default for BaseFont {
    fn default() -> Self {
        Self {
            family: "system-light".to_string(),
            size: 13.0,
            color: Color::rgb(0x4d, 0x4d, 0x4d),
        }
    }
}

/// Options for [`prepare`].
#[derive(Clone, Debug, PartialEq)]
pub struct PrepareOptions {
    pub base_font: BaseFont,
    /// Base style keys applied to every run. `font-family`, `font-size` and
    /// `color` override [`BaseFont`]; other keys are carried verbatim in
    /// [`RunAttributes::extra`].
    pub default_attributes: BTreeMap<String, String>,
    /// Shear applied to `<em>` spans.
    pub italic_shear: f32,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            base_font: BaseFont::default(),
            default_attributes: BTreeMap::new(),
            italic_shear: DEFAULT_ITALIC_SHEAR,
        }
    }
}

impl PrepareOptions {
    /// Run attributes every run starts from.
    pub fn base_attributes(&self) -> RunAttributes {
        let mut attrs = RunAttributes {
            font: FontDescriptor::new(self.base_font.family.clone(), self.base_font.size),
            color: self.base_font.color,
            ..RunAttributes::default()
        };
        for (key, value) in &self.default_attributes {
            match key.as_str() {
                "font-family" => attrs.font.family = value.trim().to_string(),
                "font-size" => match parse_font_size(value) {
                    Some(size) => attrs.font.size = size,
                    None => log::warn!("ignoring unparsable font-size {:?}", value),
                },
                "color" => match Color::parse_hex(value) {
                    Some(color) => attrs.color = color,
                    None => log::warn!("ignoring unparsable color {:?}", value),
                },
                _ => {
                    attrs.extra.insert(key.clone(), value.clone());
                }
            }
        }
        attrs
    }
}

fn parse_font_size(raw: &str) -> Option<f32> {
    let trimmed = raw.trim();
    let number = trimmed
        .strip_suffix("px")
        .or_else(|| trimmed.strip_suffix("pt"))
        .unwrap_or(trimmed)
        .trim();
    number.parse::<f32>().ok().filter(|size| *size > 0.0)
}

/// Styled text and attachment descriptors ready for a host.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PreparedContent {
    pub text: StyledText,
    /// Attachments in anchor order; each has exactly one anchor in `text`.
    pub attachments: Vec<Attachment>,
    pub diagnostics: Vec<MarkupError>,
}

/// Extract attachments, build styled text and resolve inline emphasis.
///
/// Never fails: recoverable markup problems are returned in
/// [`PreparedContent::diagnostics`].
pub fn prepare(markup: &str, options: &PrepareOptions) -> PreparedContent {
    let mut extraction = extract_all(markup);
    extraction.text.push_str(DOCUMENT_TERMINATOR);

    let builder = StyledTextBuilder::new(options.base_attributes());
    let mut text = builder.build(&extraction.text, &extraction.attachments);
    let styled = InlineStyleResolver::new(options.italic_shear).resolve(&mut text);

    let mut attachments = extraction.attachments;
    attachments.retain(|attachment| {
        let anchored = text.anchor(attachment.id()).is_some();
        if !anchored {
            log::warn!("dropping {}: placeholder lost during build", attachment.id());
        }
        anchored
    });
    attachments.sort_by_key(|attachment| {
        text.anchor(attachment.id())
            .map_or(usize::MAX, |anchor| anchor.range.start)
    });

    log::debug!(
        "prepared {} bytes: {} attachment(s), {} styled span(s), {} diagnostic(s)",
        markup.len(),
        attachments.len(),
        styled,
        extraction.diagnostics.len()
    );

    PreparedContent {
        text,
        attachments,
        diagnostics: extraction.diagnostics,
    }
}
