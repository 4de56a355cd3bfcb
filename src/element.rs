//! Small event-based element parser for content-tag occurrences.

use std::borrow::Cow;
use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use smallvec::SmallVec;

use crate::attachment::{Alignment, Size};
use crate::tags::{TagKind, TagShape};

/// Extensions that mark a candidate source as directly playable media.
const MEDIA_EXTENSIONS: [&str; 6] = ["wav", "aac", "mp3", "mov", "mp4", "m4v"];

/// Attributes and source candidates of one parsed occurrence.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct ParsedElement {
    pub tag: String,
    /// Attributes of the outer element; later duplicates overwrite earlier ones.
    pub attributes: BTreeMap<String, String>,
    /// Candidate sources in document order: the element's own `src`, then
    /// each child `<source src>`.
    pub sources: SmallVec<[String; 2]>,
}

impl ParsedElement {
    /// Pick the source: the first candidate naming a recognized media
    /// extension, else the first candidate.
    pub fn preferred_source(&self) -> Option<&str> {
        if self.sources.len() > 1 {
            let media = self.sources.iter().find(|src| {
                let lower = src.to_ascii_lowercase();
                MEDIA_EXTENSIONS
                    .iter()
                    .any(|ext| lower.contains(&format!(".{ext}")))
            });
            if let Some(src) = media {
                return Some(src.as_str());
            }
        }
        self.sources.first().map(String::as_str)
    }

    /// Declared size from absolute `width`/`height` attributes.
    pub fn declared_size(&self) -> Size {
        Size::new(
            self.attributes
                .get("width")
                .and_then(|raw| parse_absolute_dimension(raw))
                .unwrap_or(0.0),
            self.attributes
                .get("height")
                .and_then(|raw| parse_absolute_dimension(raw))
                .unwrap_or(0.0),
        )
    }

    pub fn alignment(&self) -> Alignment {
        self.attributes
            .get("align")
            .map(|raw| Alignment::parse(raw))
            .unwrap_or_default()
    }
}

/// Parse one matched occurrence of `kind`.
///
/// Void tags written without a self-closing slash are closed before parsing.
/// End-name checking is off, so HTML-style unclosed children such as
/// `<source src=...>` are tolerated; attribute syntax errors and unterminated
/// tags are reported as `Err`.
pub(crate) fn parse_element(markup: &str, kind: TagKind) -> Result<ParsedElement, String> {
    let xml: Cow<'_, str> =
        if kind.spec().shape == TagShape::Void && !markup.trim_end().ends_with("/>") {
            Cow::Owned(format!("{markup}</{}>", kind.name()))
        } else {
            Cow::Borrowed(markup)
        };

    let mut reader = Reader::from_str(&xml);
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = false;
    let mut buf = Vec::with_capacity(64);
    let mut parsed: Option<ParsedElement> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let tag = decode_tag_name(&reader, &e)?;
                match parsed.as_mut() {
                    None => {
                        let attributes = read_attributes(&reader, &e)?;
                        let mut element = ParsedElement {
                            tag,
                            attributes,
                            sources: SmallVec::new(),
                        };
                        if let Some(src) = element.attributes.get("src").filter(|s| !s.is_empty())
                        {
                            element.sources.push(src.clone());
                        }
                        parsed = Some(element);
                    }
                    Some(element) if tag == "source" => {
                        let attributes = read_attributes(&reader, &e)?;
                        if let Some(src) = attributes.get("src").filter(|s| !s.is_empty()) {
                            element.sources.push(src.clone());
                        }
                    }
                    Some(_) => {}
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                return Err(format!(
                    "{} (near byte {})",
                    err,
                    reader.buffer_position()
                ));
            }
        }
        buf.clear();
    }

    parsed.ok_or_else(|| format!("no <{}> element found", kind.name()))
}

/// Parse the opening tag of an anchor and return its `href`.
pub(crate) fn anchor_href(open_tag: &str) -> Option<String> {
    let xml = format!("{open_tag}</a>");
    let mut reader = Reader::from_str(&xml);
    reader.config_mut().check_end_names = false;
    let mut buf = Vec::with_capacity(32);
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let attributes = read_attributes(&reader, &e).ok()?;
                return attributes.get("href").filter(|h| !h.is_empty()).cloned();
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
        buf.clear();
    }
}

fn decode_tag_name(reader: &Reader<&[u8]>, e: &BytesStart<'_>) -> Result<String, String> {
    let name = e.name();
    let decoded = reader
        .decoder()
        .decode(name.as_ref())
        .map_err(|err| format!("tag name decode: {:?}", err))?;
    let local_name = decoded.rsplit(':').next().unwrap_or(decoded.as_ref());
    Ok(local_name.to_ascii_lowercase())
}

fn read_attributes(
    reader: &Reader<&[u8]>,
    e: &BytesStart<'_>,
) -> Result<BTreeMap<String, String>, String> {
    let mut out = BTreeMap::new();
    let mut attributes = e.html_attributes();
    attributes.with_checks(false);
    for attr in attributes {
        let attr = attr.map_err(|err| format!("attribute: {}", err))?;
        let key = reader
            .decoder()
            .decode(attr.key.as_ref())
            .map_err(|err| format!("attribute name decode: {:?}", err))?
            .to_ascii_lowercase();
        let raw = reader
            .decoder()
            .decode(&attr.value)
            .map_err(|err| format!("attribute value decode: {:?}", err))?;
        let value = match quick_xml::escape::unescape(&raw) {
            Ok(unescaped) => unescaped.into_owned(),
            Err(_) => raw.into_owned(),
        };
        out.insert(key, value);
    }
    Ok(out)
}

/// Absolute pixel dimension; percentages and non-numeric values are unknown.
fn parse_absolute_dimension(raw: &str) -> Option<f32> {
    if raw.contains('%') {
        return None;
    }
    let trimmed = raw.trim().trim_end_matches("px").trim();
    let parsed = trimmed.parse::<u32>().ok()?;
    if parsed == 0 {
        return None;
    }
    Some(parsed as f32)
}
