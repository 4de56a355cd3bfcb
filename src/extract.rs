//! Markup extraction: placeholder substitution, blockquote rewriting and
//! sentinel wrapping, one tag kind per pass.

use crate::attachment::{Attachment, AttachmentId, PLACEHOLDER_CLOSE, PLACEHOLDER_OPEN};
use crate::element::{anchor_href, parse_element};
use crate::error::MarkupError;
use crate::tags::{
    anchor_patterns, patterns, TagKind, TagRole, EM_SENTINELS, EXTRACTION_ORDER, STRONG_SENTINELS,
};

/// Decorative prefix written at the start of every blockquote.
pub(crate) const BLOCKQUOTE_PREFIX: &str = "\u{275D} ";

/// Result of one extraction pass (or of the full ordered pipeline).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Extraction {
    /// Processed text with placeholders, rewritten blockquotes and sentinels.
    pub text: String,
    /// Attachment descriptors in document order.
    pub attachments: Vec<Attachment>,
    /// Occurrences that were skipped or dropped.
    pub diagnostics: Vec<MarkupError>,
}

/// Extract every occurrence of `kind` from `text`.
///
/// Occurrences are processed last-to-first so replacing a span never
/// invalidates the offsets of spans still waiting to be processed.
pub fn extract(text: &str, kind: TagKind) -> Extraction {
    let mut out = Extraction {
        text: text.to_string(),
        ..Extraction::default()
    };
    let Some(patterns) = patterns(kind) else {
        return out;
    };
    let spans = patterns.find_spans(text);
    if spans.is_empty() {
        return out;
    }

    match kind.spec().role {
        TagRole::Content => {
            out.attachments.reserve(spans.len());
            for (index, span) in spans.iter().enumerate().rev() {
                let matched = &text[span.outer.clone()];
                let element = match parse_element(matched, kind) {
                    Ok(element) => element,
                    Err(message) => {
                        log::warn!(
                            "skipping malformed <{}> at byte {}: {}",
                            kind.name(),
                            span.outer.start,
                            message
                        );
                        out.diagnostics.push(MarkupError::MalformedMarkup {
                            tag: kind,
                            offset: span.outer.start,
                            message,
                        });
                        continue;
                    }
                };
                let source = element.preferred_source().map(str::to_string);
                if kind.spec().requires_source && source.is_none() {
                    log::warn!(
                        "dropping <{}> at byte {}: no usable source",
                        kind.name(),
                        span.outer.start
                    );
                    out.diagnostics.push(MarkupError::UnresolvableSource {
                        tag: kind,
                        offset: span.outer.start,
                    });
                    out.text.replace_range(span.outer.clone(), "");
                    continue;
                }

                let id = AttachmentId::placeholder(kind, index + 1);
                let mut attachment =
                    Attachment::new(id, kind, source.unwrap_or_default(), matched)
                        .with_attributes(element.attributes.clone());
                attachment.set_declared_size(element.declared_size());
                attachment.set_alignment(element.alignment());

                out.text
                    .replace_range(span.outer.clone(), attachment.id().as_str());
                out.attachments.push(attachment);
            }
            out.attachments.reverse();
            out.diagnostics.reverse();
        }
        TagRole::Block => {
            for span in spans.iter().rev() {
                let open_tag = &text[span.outer.start..span.inner.start];
                let inner = &text[span.inner.clone()];
                let close_tag = &text[span.inner.end..span.outer.end];
                let rewritten = format!("{open_tag}{BLOCKQUOTE_PREFIX}{inner}{close_tag}<br/>");
                out.text.replace_range(span.outer.clone(), &rewritten);
            }
        }
        TagRole::Wrapping => {
            let Some((start, end)) = kind.spec().sentinels else {
                return out;
            };
            for span in spans.iter().rev() {
                let inner = &text[span.inner.clone()];
                let mut wrapped = String::with_capacity(inner.len() + 8);
                wrapped.push(start);
                wrapped.push_str(inner);
                wrapped.push(end);
                out.text.replace_range(span.outer.clone(), &wrapped);
            }
        }
    }

    out
}

/// Run every registered tag through [`extract`] in the fixed order, then
/// attach enclosing-anchor links to extracted images.
///
/// Characters reserved for placeholders and sentinels are stripped from the
/// input first, so every token in the output was produced by this call. The
/// returned attachments are sorted by placeholder position.
pub fn extract_all(text: &str) -> Extraction {
    let mut out = Extraction {
        text: strip_reserved(text),
        ..Extraction::default()
    };
    let mut links_resolved = false;
    for kind in EXTRACTION_ORDER {
        if !links_resolved && !kind.is_content() {
            link_anchored_images(&out.text, &mut out.attachments);
            links_resolved = true;
        }
        let pass = extract(&out.text, kind);
        out.text = pass.text;
        out.attachments.extend(pass.attachments);
        out.diagnostics.extend(pass.diagnostics);
    }
    if !links_resolved {
        link_anchored_images(&out.text, &mut out.attachments);
    }

    let text = &out.text;
    out.attachments
        .sort_by_key(|attachment| text.find(attachment.id().as_str()).unwrap_or(usize::MAX));
    out
}

fn is_reserved(ch: char) -> bool {
    ch == PLACEHOLDER_OPEN
        || ch == PLACEHOLDER_CLOSE
        || ch == STRONG_SENTINELS.0
        || ch == STRONG_SENTINELS.1
        || ch == EM_SENTINELS.0
        || ch == EM_SENTINELS.1
}

fn strip_reserved(text: &str) -> String {
    if !text.contains(is_reserved) {
        return text.to_string();
    }
    log::warn!("input contains reserved marker characters; removing them");
    text.chars().filter(|&ch| !is_reserved(ch)).collect()
}

/// Record the `href` of every anchor on the image placeholders it encloses.
///
/// The anchor itself stays in the text and never becomes an attachment.
fn link_anchored_images(text: &str, attachments: &mut [Attachment]) {
    let Some(patterns) = anchor_patterns() else {
        return;
    };
    for span in patterns.find_spans(text) {
        let inner = &text[span.inner.clone()];
        if !inner.contains(PLACEHOLDER_OPEN) {
            continue;
        }
        let Some(href) = anchor_href(&text[span.outer.start..span.inner.start]) else {
            continue;
        };
        for token in placeholder_tokens(inner) {
            if let Some(attachment) = attachments
                .iter_mut()
                .find(|a| a.kind() == TagKind::Image && a.id().as_str() == token)
            {
                attachment.set_link(href.clone());
            }
        }
    }
}

/// Placeholder tokens contained in `text`, in order.
pub(crate) fn placeholder_tokens(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    core::iter::from_fn(move || {
        let start = rest.find(PLACEHOLDER_OPEN)?;
        let end = rest[start..].find(PLACEHOLDER_CLOSE)? + start + PLACEHOLDER_CLOSE.len_utf8();
        let token = &rest[start..end];
        rest = &rest[end..];
        Some(token)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::{Alignment, Size};

    #[test]
    fn content_tags_become_placeholders_in_document_order() {
        let text = r#"<p>a<img src="1.png" width="10" height="20">b<img src="2.png">c</p>"#;
        let out = extract(text, TagKind::Image);
        assert_eq!(out.attachments.len(), 2);
        assert_eq!(out.attachments[0].source_url(), "1.png");
        assert_eq!(out.attachments[1].source_url(), "2.png");
        assert_eq!(out.attachments[0].declared_size(), Size::new(10.0, 20.0));
        assert!(out.attachments[1].declared_size().is_zero());
        let expected = format!(
            "<p>a{}b{}c</p>",
            out.attachments[0].id().as_str(),
            out.attachments[1].id().as_str()
        );
        assert_eq!(out.text, expected);
    }

    #[test]
    fn malformed_occurrence_is_left_in_place() {
        let text = r#"x<img src="a.png>y"#;
        let out = extract(text, TagKind::Image);
        assert!(out.attachments.is_empty());
        assert_eq!(out.text, text);
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].code(), "MARKUP_MALFORMED");
    }

    #[test]
    fn sourceless_content_tag_is_removed() {
        let out = extract(r#"a<embed width="3">b"#, TagKind::Embed);
        assert!(out.attachments.is_empty());
        assert_eq!(out.text, "ab");
        assert_eq!(out.diagnostics[0].code(), "MARKUP_NO_SOURCE");
    }

    #[test]
    fn separator_needs_no_source() {
        let out = extract("a<hr>b", TagKind::Separator);
        assert_eq!(out.attachments.len(), 1);
        assert_eq!(out.attachments[0].source_url(), "");
    }

    #[test]
    fn alignment_and_raw_markup_are_recorded() {
        let markup = r#"<iframe src="https://v.test/1" align="LEFT" width="300" height="200"></iframe>"#;
        let out = extract(markup, TagKind::Iframe);
        let attachment = &out.attachments[0];
        assert_eq!(attachment.alignment(), Alignment::Left);
        assert_eq!(attachment.raw_markup(), markup);
        assert_eq!(attachment.max_size(), Size::new(300.0, 200.0));
        assert_eq!(
            attachment.raw_attributes().get("width").map(String::as_str),
            Some("300")
        );
    }

    #[test]
    fn blockquote_is_rewritten_not_replaced() {
        let out = extract("<blockquote>quoted</blockquote>after", TagKind::Blockquote);
        assert!(out.attachments.is_empty());
        assert_eq!(
            out.text,
            format!("<blockquote>{BLOCKQUOTE_PREFIX}quoted</blockquote><br/>after")
        );
    }

    #[test]
    fn wrapping_tags_become_sentinels_around_inner_markup() {
        let strong = extract("<strong>a<em>b</em>c</strong>", TagKind::Strong);
        let em = extract(&strong.text, TagKind::Em);
        let expected: String = [
            STRONG_SENTINELS.0.to_string(),
            "a".into(),
            EM_SENTINELS.0.to_string(),
            "b".into(),
            EM_SENTINELS.1.to_string(),
            "c".into(),
            STRONG_SENTINELS.1.to_string(),
        ]
        .concat();
        assert_eq!(em.text, expected);
        assert!(em.attachments.is_empty());
    }

    #[test]
    fn anchor_href_links_enclosed_images() {
        let out = extract_all(r#"<a href="X"><img src="Y"/></a><img src="Z">"#);
        assert_eq!(out.attachments.len(), 2);
        assert_eq!(out.attachments[0].source_url(), "Y");
        assert_eq!(out.attachments[0].link(), Some("X"));
        assert_eq!(out.attachments[1].link(), None);
    }

    #[test]
    fn extract_all_orders_attachments_by_position() {
        let out = extract_all(
            r#"<video src="v.mp4"></video><img src="i.png"><iframe src="f"></iframe>"#,
        );
        let kinds: Vec<TagKind> = out.attachments.iter().map(Attachment::kind).collect();
        assert_eq!(kinds, vec![TagKind::Video, TagKind::Image, TagKind::Iframe]);
    }

    #[test]
    fn reserved_characters_in_input_cannot_forge_placeholders() {
        let forged = AttachmentId::placeholder(TagKind::Image, 1);
        let input = format!("{}<img src=\"a.png\">", forged.as_str());
        let out = extract_all(&input);
        assert_eq!(out.attachments.len(), 1);
        assert_eq!(placeholder_tokens(&out.text).count(), 1);
        assert!(out.text.starts_with("img-1"));
    }

    #[test]
    fn placeholder_tokens_are_found_in_order() {
        let a = AttachmentId::placeholder(TagKind::Image, 1);
        let b = AttachmentId::placeholder(TagKind::Image, 2);
        let text = format!("x{}y{}z", a.as_str(), b.as_str());
        let tokens: Vec<&str> = placeholder_tokens(&text).collect();
        assert_eq!(tokens, vec![a.as_str(), b.as_str()]);
    }
}
