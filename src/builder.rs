//! Processed markup to styled text.

use std::borrow::Cow;
use std::sync::OnceLock;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use regex::Regex;

use crate::attachment::{Alignment, Attachment};
use crate::styled_text::{RunAttributes, StyledText, OBJECT_REPLACEMENT};

#[derive(Clone, Debug, Default)]
struct ElementCtx {
    tag: String,
    href: Option<String>,
}

/// Builds a [`StyledText`] from markup that has already been through
/// extraction.
///
/// Block elements become line breaks, anchors set the run link, and text
/// inside `<blockquote>` is flagged as quoted. Placeholder tokens are turned
/// into attachment anchors once the text is assembled. If the tokenizer
/// rejects the markup, the text from the failing event onward is added as
/// literal text with tags stripped.
#[derive(Clone, Debug)]
pub struct StyledTextBuilder {
    base: RunAttributes,
}

impl StyledTextBuilder {
    /// Create a builder whose runs start from `base`.
    pub fn new(base: RunAttributes) -> Self {
        Self { base }
    }

    /// Build styled text from processed markup, anchoring `attachments`.
    pub fn build(&self, markup: &str, attachments: &[Attachment]) -> StyledText {
        let markup = escape_bare_ampersands(markup);
        let mut out = StyledText::new();
        let mut stack: Vec<ElementCtx> = Vec::with_capacity(8);
        if let Err((message, at)) = self.build_tokenized(&markup, &mut stack, &mut out) {
            log::warn!(
                "markup tokenizer failed ({}); rest of the text from byte {} is literal",
                message,
                at
            );
            let mut at = at.min(markup.len());
            while !markup.is_char_boundary(at) {
                at += 1;
            }
            let attrs = self.attributes_for(&stack);
            self.build_literal(&markup[at..], &attrs, &mut out);
        }
        anchor_placeholders(&mut out, attachments);
        out
    }

    /// Tokenize `markup` into `out`. On a reader error, returns the byte
    /// offset where the failing event began; `out` and `stack` keep
    /// everything built before it.
    fn build_tokenized(
        &self,
        markup: &str,
        stack: &mut Vec<ElementCtx>,
        out: &mut StyledText,
    ) -> Result<(), (String, usize)> {
        let mut reader = Reader::from_str(markup);
        reader.config_mut().trim_text(false);
        reader.config_mut().check_end_names = false;
        let mut buf = Vec::with_capacity(64);
        let mut skip_depth = 0usize;
        let mut entity_buf = String::with_capacity(16);

        loop {
            let event_start = usize::try_from(reader.buffer_position()).unwrap_or(markup.len());
            let fail = |message: String| (message, event_start);
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let tag = decode_tag_name(&reader, &e).map_err(fail)?;
                    if should_skip_tag(&tag) {
                        skip_depth += 1;
                    } else if skip_depth == 0 {
                        self.open_element(&reader, &e, tag, stack, out);
                    }
                }
                Ok(Event::Empty(e)) => {
                    let tag = decode_tag_name(&reader, &e).map_err(fail)?;
                    if skip_depth == 0 && !should_skip_tag(&tag) {
                        if tag == "br" {
                            out.push_str("\n", &self.attributes_for(stack));
                        } else if is_block_tag(&tag) {
                            self.ensure_line_break(stack, out);
                        }
                    }
                }
                Ok(Event::End(e)) => {
                    let tag = decode_tag_name_bytes(&reader, e.name().as_ref()).map_err(fail)?;
                    if should_skip_tag(&tag) {
                        skip_depth = skip_depth.saturating_sub(1);
                    } else if skip_depth == 0 {
                        if is_block_tag(&tag) {
                            self.ensure_line_break(stack, out);
                        }
                        if let Some(pos) = stack.iter().rposition(|ctx| ctx.tag == tag) {
                            stack.truncate(pos);
                        }
                    }
                }
                Ok(Event::Text(e)) => {
                    if skip_depth == 0 {
                        let text = e
                            .decode()
                            .map_err(|err| fail(format!("text decode: {:?}", err)))?;
                        self.push_text(text.as_ref(), stack, out);
                    }
                }
                Ok(Event::CData(e)) => {
                    if skip_depth == 0 {
                        let text = reader
                            .decoder()
                            .decode(&e)
                            .map_err(|err| fail(format!("cdata decode: {:?}", err)))?;
                        self.push_text(text.as_ref(), stack, out);
                    }
                }
                Ok(Event::GeneralRef(e)) => {
                    if skip_depth == 0 {
                        let name = e
                            .decode()
                            .map_err(|err| fail(format!("entity decode: {:?}", err)))?;
                        entity_buf.clear();
                        entity_buf.push('&');
                        entity_buf.push_str(name.as_ref());
                        entity_buf.push(';');
                        let resolved = resolve_entity(&entity_buf, name.as_ref());
                        self.push_text(&resolved, stack, out);
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => return Err(fail(err.to_string())),
            }
            buf.clear();
        }
        Ok(())
    }

    fn open_element(
        &self,
        reader: &Reader<&[u8]>,
        e: &BytesStart<'_>,
        tag: String,
        stack: &mut Vec<ElementCtx>,
        out: &mut StyledText,
    ) {
        if tag == "br" {
            out.push_str("\n", &self.attributes_for(stack));
            return;
        }
        if is_block_tag(&tag) {
            self.ensure_line_break(stack, out);
        }
        if is_void_tag(&tag) {
            return;
        }
        let href = if tag == "a" { attribute(reader, e, "href") } else { None };
        stack.push(ElementCtx { tag, href });
    }

    fn build_literal(&self, markup: &str, attrs: &RunAttributes, out: &mut StyledText) {
        let (block_break, any_tag) = literal_patterns();
        let with_breaks = match block_break {
            Some(re) => re.replace_all(markup, "\n"),
            None => markup.into(),
        };
        let stripped = match any_tag {
            Some(re) => re.replace_all(&with_breaks, ""),
            None => with_breaks.clone(),
        };
        let mut literal = String::with_capacity(stripped.len());
        let mut rest = stripped.as_ref();
        while let Some(amp) = rest.find('&') {
            literal.push_str(&rest[..amp]);
            rest = &rest[amp..];
            match rest.find(';').filter(|&end| end <= 10) {
                Some(end) => {
                    literal.push_str(&resolve_entity(&rest[..=end], &rest[1..end]));
                    rest = &rest[end + 1..];
                }
                None => {
                    literal.push('&');
                    rest = &rest[1..];
                }
            }
        }
        literal.push_str(rest);
        for line in literal.split_inclusive('\n') {
            let (body, newline) = match line.strip_suffix('\n') {
                Some(body) => (body, true),
                None => (line, false),
            };
            push_collapsed(body, attrs, out);
            if newline && !out.text().ends_with('\n') && !out.is_empty() {
                out.push_str("\n", attrs);
            }
        }
    }

    fn attributes_for(&self, stack: &[ElementCtx]) -> RunAttributes {
        let mut attrs = self.base.clone();
        for ctx in stack {
            if ctx.href.is_some() {
                attrs.link.clone_from(&ctx.href);
            }
            if ctx.tag == "blockquote" {
                attrs.quote = true;
            }
        }
        attrs
    }

    fn ensure_line_break(&self, stack: &[ElementCtx], out: &mut StyledText) {
        if !out.is_empty() && !out.text().ends_with('\n') {
            out.push_str("\n", &self.attributes_for(stack));
        }
    }

    fn push_text(&self, text: &str, stack: &[ElementCtx], out: &mut StyledText) {
        let attrs = self.attributes_for(stack);
        push_collapsed(text, &attrs, out);
    }
}

/// Append `text` with whitespace runs collapsed to one space; no leading
/// space at the start of a line.
fn push_collapsed(text: &str, attrs: &RunAttributes, out: &mut StyledText) {
    let mut collapsed = String::with_capacity(text.len());
    let mut prev_space = out.is_empty() || out.text().ends_with([' ', '\n']);
    for ch in text.chars() {
        if ch == OBJECT_REPLACEMENT {
            continue;
        }
        if ch.is_whitespace() && ch != '\u{A0}' {
            if !prev_space {
                collapsed.push(' ');
                prev_space = true;
            }
        } else {
            collapsed.push(ch);
            prev_space = false;
        }
    }
    out.push_str(&collapsed, attrs);
}

/// Replace each attachment's placeholder token with an anchor character.
fn anchor_placeholders(out: &mut StyledText, attachments: &[Attachment]) {
    for attachment in attachments {
        match out.find(attachment.id().as_str(), 0) {
            Some(range) => out.replace_with_anchor(
                range,
                attachment.id().clone(),
                attachment.alignment() == Alignment::None,
            ),
            None => log::debug!(
                "placeholder for {} not present in styled text",
                attachment.id()
            ),
        }
    }
}

/// Escape every `&` that does not start a character or entity reference,
/// so prose like `Tom & Jerry` does not stop the tokenizer.
fn escape_bare_ampersands(markup: &str) -> Cow<'_, str> {
    if !markup.contains('&') {
        return Cow::Borrowed(markup);
    }
    static REFERENCE: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(reference) = REFERENCE
        .get_or_init(|| {
            Regex::new(r"&(?:#[0-9]{1,7}|#[xX][0-9A-Fa-f]{1,6}|[A-Za-z][A-Za-z0-9]{0,31});").ok()
        })
        .as_ref()
    else {
        return Cow::Borrowed(markup);
    };

    let mut out = String::with_capacity(markup.len() + 16);
    let mut last = 0;
    for found in reference.find_iter(markup) {
        out.push_str(&markup[last..found.start()].replace('&', "&amp;"));
        out.push_str(found.as_str());
        last = found.end();
    }
    out.push_str(&markup[last..].replace('&', "&amp;"));
    Cow::Owned(out)
}

fn resolve_entity(reference: &str, name: &str) -> String {
    if let Ok(unescaped) = quick_xml::escape::unescape(reference) {
        return unescaped.into_owned();
    }
    let named = match name {
        "nbsp" => "\u{A0}",
        "copy" => "\u{A9}",
        "reg" => "\u{AE}",
        "hellip" => "\u{2026}",
        "mdash" => "\u{2014}",
        "ndash" => "\u{2013}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201C}",
        "rdquo" => "\u{201D}",
        "middot" => "\u{B7}",
        "bull" => "\u{2022}",
        _ => return reference.to_string(),
    };
    named.to_string()
}

fn decode_tag_name(reader: &Reader<&[u8]>, e: &BytesStart<'_>) -> Result<String, String> {
    decode_tag_name_bytes(reader, e.name().as_ref())
}

fn decode_tag_name_bytes(reader: &Reader<&[u8]>, raw: &[u8]) -> Result<String, String> {
    let decoded = reader
        .decoder()
        .decode(raw)
        .map_err(|err| format!("tag name decode: {:?}", err))?;
    let local_name = decoded.rsplit(':').next().unwrap_or(decoded.as_ref());
    Ok(local_name.to_ascii_lowercase())
}

fn attribute(reader: &Reader<&[u8]>, e: &BytesStart<'_>, name: &str) -> Option<String> {
    let mut attributes = e.html_attributes();
    attributes.with_checks(false);
    let mut found = None;
    for attr in attributes.flatten() {
        let Ok(key) = reader.decoder().decode(attr.key.as_ref()) else {
            continue;
        };
        if key.eq_ignore_ascii_case(name) {
            if let Ok(value) = reader.decoder().decode(&attr.value) {
                found = Some(match quick_xml::escape::unescape(&value) {
                    Ok(unescaped) => unescaped.into_owned(),
                    Err(_) => value.into_owned(),
                });
            }
        }
    }
    found
}

fn should_skip_tag(tag: &str) -> bool {
    matches!(tag, "script" | "style" | "head" | "noscript" | "title")
}

fn is_block_tag(tag: &str) -> bool {
    matches!(
        tag,
        "p" | "div"
            | "blockquote"
            | "li"
            | "ul"
            | "ol"
            | "figure"
            | "figcaption"
            | "pre"
            | "section"
            | "article"
            | "header"
            | "footer"
            | "tr"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
    )
}

fn is_void_tag(tag: &str) -> bool {
    matches!(
        tag,
        "br" | "hr" | "img" | "meta" | "link" | "input" | "source" | "wbr" | "col" | "area"
    )
}

fn literal_patterns() -> (Option<&'static Regex>, Option<&'static Regex>) {
    static BLOCK_BREAK: OnceLock<Option<Regex>> = OnceLock::new();
    static ANY_TAG: OnceLock<Option<Regex>> = OnceLock::new();
    let compile = |pattern: &str| match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(err) => {
            log::error!("literal fallback pattern failed to compile: {}", err);
            None
        }
    };
    (
        BLOCK_BREAK
            .get_or_init(|| compile(r"(?i)<\s*(?:br|/p|/div|/h[1-6]|/li|/blockquote)\b[^>]*>"))
            .as_ref(),
        ANY_TAG.get_or_init(|| compile(r"<[^>]*>")).as_ref(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::AttachmentId;
    use crate::tags::TagKind;

    fn build(markup: &str) -> StyledText {
        StyledTextBuilder::new(RunAttributes::default()).build(markup, &[])
    }

    #[test]
    fn block_tags_become_line_breaks() {
        let styled = build("<p>one</p><p>two</p>three<br>four");
        assert_eq!(styled.text(), "one\ntwo\nthree\nfour");
    }

    #[test]
    fn whitespace_collapses_across_text_nodes() {
        let styled = build("<p>  a   <span> b </span>\n c </p>");
        assert_eq!(styled.text(), "a b c \n");
    }

    #[test]
    fn script_content_is_skipped() {
        let styled = build("<p>a<script>var x = 1;</script>b</p>");
        assert_eq!(styled.text(), "ab\n");
    }

    #[test]
    fn anchors_set_run_links() {
        let styled = build(r#"see <a href="https://a.test">here</a> now"#);
        let linked: Vec<&str> = styled
            .segments()
            .filter(|(_, attrs)| attrs.link.is_some())
            .map(|(text, _)| text)
            .collect();
        assert_eq!(linked, vec!["here"]);
    }

    #[test]
    fn entities_resolve_including_html_names() {
        let styled = build("<p>a &amp; b&nbsp;c &hellip;</p>");
        assert_eq!(styled.text(), "a & b\u{A0}c \u{2026}\n");
    }

    #[test]
    fn blockquote_text_is_flagged_as_quote() {
        let styled = build("<blockquote>q</blockquote>t");
        assert!(styled.attributes_at(0).unwrap().quote);
        assert!(!styled.attributes_at(styled.len() - 1).unwrap().quote);
    }

    #[test]
    fn placeholders_become_anchors() {
        let id = AttachmentId::placeholder(TagKind::Image, 1);
        let attachment = Attachment::new(id.clone(), TagKind::Image, "a.png", "<img>");
        let markup = format!("<p>x</p><p>{}</p>", id.as_str());
        let styled = StyledTextBuilder::new(RunAttributes::default()).build(&markup, &[attachment]);
        assert_eq!(styled.text(), "x\n\u{FFFC}\n");
        let anchor = styled.anchor(&id).unwrap();
        assert_eq!(anchor.range, 2..5);
        assert!(anchor.block);
    }

    #[test]
    fn tokenizer_failure_keeps_what_was_built_before_it() {
        let styled = build("<p><a href=\"https://a.test\">a</a></p><p b=\"unterminated>c</p>");
        assert!(styled.text().starts_with('a'));
        assert!(styled.text().contains('c'));
        assert!(!styled.text().contains('<'));
        assert_eq!(
            styled.attributes_at(0).unwrap().link.as_deref(),
            Some("https://a.test")
        );
    }

    #[test]
    fn bare_ampersands_do_not_degrade_links_or_quotes() {
        let styled = build(
            r#"<p>Tom & Jerry <a href="https://x.test/?a=1&b=2">link</a></p><blockquote>q</blockquote>"#,
        );
        assert_eq!(styled.text(), "Tom & Jerry link\nq\n");
        let linked: Vec<(&str, Option<&str>)> = styled
            .segments()
            .filter(|(_, attrs)| attrs.link.is_some())
            .map(|(text, attrs)| (text, attrs.link.as_deref()))
            .collect();
        assert_eq!(linked, vec![("link", Some("https://x.test/?a=1&b=2"))]);
        let q = styled.text().find('q').unwrap();
        assert!(styled.attributes_at(q).unwrap().quote);
    }

    #[test]
    fn escaping_leaves_real_references_alone() {
        assert_eq!(escape_bare_ampersands("a &amp; b &#169; &x"), "a &amp; b &#169; &amp;x");
        assert!(matches!(escape_bare_ampersands("plain"), Cow::Borrowed(_)));
    }
}
