//! Static registry of recognized tags and their outer-boundary patterns.

use core::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

/// Recognized tag kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagKind {
    /// `<img>`
    Image,
    /// `<iframe>`
    Iframe,
    /// `<embed>`
    Embed,
    /// `<audio>`
    Audio,
    /// `<video>`
    Video,
    /// `<hr>` thin separator marker.
    Separator,
    /// `<blockquote>`
    Blockquote,
    /// `<strong>`
    Strong,
    /// `<em>`
    Em,
}

impl TagKind {
    /// Every kind, in registry order.
    pub const ALL: [Self; 9] = [
        Self::Image,
        Self::Iframe,
        Self::Embed,
        Self::Audio,
        Self::Video,
        Self::Separator,
        Self::Blockquote,
        Self::Strong,
        Self::Em,
    ];

    /// Registry entry for this kind.
    pub fn spec(self) -> &'static TagSpec {
        &TAG_REGISTRY[self as usize]
    }

    /// Element name as written in markup.
    pub fn name(self) -> &'static str {
        self.spec().name
    }

    /// Resolve an element name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        TAG_REGISTRY
            .iter()
            .find(|spec| spec.name.eq_ignore_ascii_case(name))
            .map(|spec| spec.kind)
    }

    /// Whether occurrences of this kind become positioned attachments.
    pub fn is_content(self) -> bool {
        self.spec().role == TagRole::Content
    }
}

/// What extraction does with an occurrence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagRole {
    /// Replaced by a placeholder and described by an attachment.
    Content,
    /// Rewritten in place with a decorative prefix; stays in the text flow.
    Block,
    /// Unwrapped into sentinel tokens for inline style resolution.
    Wrapping,
}

/// Markup shape used for outer-boundary discovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagShape {
    /// Single tag with no closing counterpart (`<img ...>`).
    Void,
    /// Opening and closing tag around content; only outermost spans match.
    Paired,
}

/// One registry row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagSpec {
    pub kind: TagKind,
    pub name: &'static str,
    pub shape: TagShape,
    pub role: TagRole,
    /// Occurrences without a usable source are dropped.
    pub requires_source: bool,
    /// Start/end sentinel characters for wrapping tags.
    pub sentinels: Option<(char, char)>,
}

/// Sentinel pair wrapping `<strong>` content between extraction and style resolution.
pub(crate) const STRONG_SENTINELS: (char, char) = ('\u{E002}', '\u{E003}');
/// Sentinel pair wrapping `<em>` content between extraction and style resolution.
pub(crate) const EM_SENTINELS: (char, char) = ('\u{E004}', '\u{E005}');

/// Registry rows, indexed by `TagKind as usize`.
pub const TAG_REGISTRY: [TagSpec; 9] = [
    TagSpec {
        kind: TagKind::Image,
        name: "img",
        shape: TagShape::Void,
        role: TagRole::Content,
        requires_source: true,
        sentinels: None,
    },
    TagSpec {
        kind: TagKind::Iframe,
        name: "iframe",
        shape: TagShape::Paired,
        role: TagRole::Content,
        requires_source: true,
        sentinels: None,
    },
    TagSpec {
        kind: TagKind::Embed,
        name: "embed",
        shape: TagShape::Void,
        role: TagRole::Content,
        requires_source: true,
        sentinels: None,
    },
    TagSpec {
        kind: TagKind::Audio,
        name: "audio",
        shape: TagShape::Paired,
        role: TagRole::Content,
        requires_source: true,
        sentinels: None,
    },
    TagSpec {
        kind: TagKind::Video,
        name: "video",
        shape: TagShape::Paired,
        role: TagRole::Content,
        requires_source: true,
        sentinels: None,
    },
    TagSpec {
        kind: TagKind::Separator,
        name: "hr",
        shape: TagShape::Void,
        role: TagRole::Content,
        requires_source: false,
        sentinels: None,
    },
    TagSpec {
        kind: TagKind::Blockquote,
        name: "blockquote",
        shape: TagShape::Paired,
        role: TagRole::Block,
        requires_source: false,
        sentinels: None,
    },
    TagSpec {
        kind: TagKind::Strong,
        name: "strong",
        shape: TagShape::Paired,
        role: TagRole::Wrapping,
        requires_source: false,
        sentinels: Some(STRONG_SENTINELS),
    },
    TagSpec {
        kind: TagKind::Em,
        name: "em",
        shape: TagShape::Paired,
        role: TagRole::Wrapping,
        requires_source: false,
        sentinels: Some(EM_SENTINELS),
    },
];

/// Fixed extraction order: content tags, then blockquote, then wrapping tags.
pub const EXTRACTION_ORDER: [TagKind; 9] = [
    TagKind::Image,
    TagKind::Embed,
    TagKind::Iframe,
    TagKind::Audio,
    TagKind::Video,
    TagKind::Separator,
    TagKind::Blockquote,
    TagKind::Strong,
    TagKind::Em,
];

/// Outer boundaries of one matched occurrence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct TagSpan {
    /// Whole occurrence, opening tag through closing tag.
    pub outer: Range<usize>,
    /// Content between the opening and closing tags (empty for void tags).
    pub inner: Range<usize>,
}

pub(crate) struct TagPatterns {
    open: Regex,
    close: Option<Regex>,
}

impl TagPatterns {
    fn compile(name: &str, shape: TagShape) -> Option<Self> {
        let open = Regex::new(&format!(r"(?i)<{name}\b[^>]*>"));
        let close = match shape {
            TagShape::Void => Ok(None),
            TagShape::Paired => Regex::new(&format!(r"(?i)</{name}\s*>")).map(Some),
        };
        match (open, close) {
            (Ok(open), Ok(close)) => Some(Self { open, close }),
            (Err(err), _) | (_, Err(err)) => {
                log::error!("tag pattern for <{}> failed to compile: {}", name, err);
                None
            }
        }
    }

    /// Non-overlapping outermost spans, in document order.
    pub(crate) fn find_spans(&self, text: &str) -> Vec<TagSpan> {
        let Some(close) = &self.close else {
            return self
                .open
                .find_iter(text)
                .map(|m| TagSpan {
                    outer: m.range(),
                    inner: m.end()..m.end(),
                })
                .collect();
        };

        // Opening tags sort before closing tags at equal offsets, which cannot
        // happen anyway since both start with '<'.
        let mut marks: Vec<(usize, usize, bool)> = self
            .open
            .find_iter(text)
            .map(|m| (m.start(), m.end(), true))
            .chain(close.find_iter(text).map(|m| (m.start(), m.end(), false)))
            .collect();
        marks.sort_by_key(|&(start, _, _)| start);

        let mut spans = Vec::with_capacity(marks.len() / 2);
        let mut depth = 0usize;
        let mut current: Option<(usize, usize)> = None;
        for (start, end, is_open) in marks {
            if is_open {
                if depth == 0 {
                    current = Some((start, end));
                }
                depth += 1;
            } else if depth > 0 {
                depth -= 1;
                if depth == 0 {
                    if let Some((outer_start, inner_start)) = current.take() {
                        spans.push(TagSpan {
                            outer: outer_start..end,
                            inner: inner_start..start,
                        });
                    }
                }
            }
        }
        spans
    }
}

/// Compiled patterns for a registry kind.
pub(crate) fn patterns(kind: TagKind) -> Option<&'static TagPatterns> {
    static COMPILED: OnceLock<Vec<Option<TagPatterns>>> = OnceLock::new();
    COMPILED
        .get_or_init(|| {
            TAG_REGISTRY
                .iter()
                .map(|spec| TagPatterns::compile(spec.name, spec.shape))
                .collect()
        })
        .get(kind as usize)
        .and_then(Option::as_ref)
}

/// Compiled patterns for anchor (`<a>`) elements.
pub(crate) fn anchor_patterns() -> Option<&'static TagPatterns> {
    static ANCHOR: OnceLock<Option<TagPatterns>> = OnceLock::new();
    ANCHOR
        .get_or_init(|| TagPatterns::compile("a", TagShape::Paired))
        .as_ref()
}
