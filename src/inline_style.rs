//! Sentinel resolution: turn strong/em sentinel pairs into font traits.

use core::ops::Range;

use crate::styled_text::StyledText;
use crate::tags::{EM_SENTINELS, STRONG_SENTINELS};

/// Shear applied to emphasized runs when no italic face is requested.
pub const DEFAULT_ITALIC_SHEAR: f32 = 0.2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Emphasis {
    Strong,
    Em,
}

impl Emphasis {
    fn sentinels(self) -> (char, char) {
        match self {
            Self::Strong => STRONG_SENTINELS,
            Self::Em => EM_SENTINELS,
        }
    }

    fn opened_by(ch: char) -> Option<Self> {
        if ch == STRONG_SENTINELS.0 {
            Some(Self::Strong)
        } else if ch == EM_SENTINELS.0 {
            Some(Self::Em)
        } else {
            None
        }
    }

    fn closes(ch: char) -> bool {
        ch == STRONG_SENTINELS.1 || ch == EM_SENTINELS.1
    }
}

/// Resolves sentinel-wrapped spans into bold and sheared runs.
///
/// Spans nest: an em span inside a strong span comes out bold and sheared.
/// Every sentinel character is removed from the text, including orphans left
/// by unbalanced markup, so resolution always terminates and a second pass
/// finds nothing to do.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InlineStyleResolver {
    italic_shear: f32,
}

impl Default for InlineStyleResolver {
    fn default() -> Self {
        Self::new(DEFAULT_ITALIC_SHEAR)
    }
}

impl InlineStyleResolver {
    pub fn new(italic_shear: f32) -> Self {
        Self { italic_shear }
    }

    pub fn italic_shear(&self) -> f32 {
        self.italic_shear
    }

    /// Resolve every sentinel span in `text`; returns the number of spans
    /// styled.
    pub fn resolve(&self, text: &mut StyledText) -> usize {
        let mut styled = 0;
        while let Some(span) = next_span(text.text(), 0..text.len()) {
            styled += self.resolve_span(text, span);
        }
        let orphans = strip_orphans(text);
        if orphans > 0 {
            log::warn!("removed {} unbalanced emphasis marker(s)", orphans);
        }
        styled
    }

    /// Resolve one span and everything nested inside it. Returns the number
    /// of spans styled.
    fn resolve_span(&self, text: &mut StyledText, span: SentinelSpan) -> usize {
        let (open, close) = span.kind.sentinels();
        text.delete(span.close..span.close + close.len_utf8());
        text.delete(span.open..span.open + open.len_utf8());
        let mut inner = span.open..span.close - open.len_utf8();

        let mut styled = 1;
        while let Some(nested) = next_span(text.text(), inner.clone()) {
            let before = text.len();
            styled += self.resolve_span(text, nested);
            inner.end -= before - text.len();
        }

        let shear = self.italic_shear;
        match span.kind {
            Emphasis::Strong => {
                text.update_attributes(inner, |attrs| attrs.font = attrs.font.with_bold())
            }
            Emphasis::Em => {
                text.update_attributes(inner, |attrs| attrs.font = attrs.font.with_shear(shear))
            }
        }
        styled
    }
}

#[derive(Clone, Copy, Debug)]
struct SentinelSpan {
    kind: Emphasis,
    /// Byte offset of the opening sentinel.
    open: usize,
    /// Byte offset of the matching closing sentinel.
    close: usize,
}

/// First balanced sentinel span starting inside `within`.
///
/// Closers are matched by depth, so a strong span containing an em span is
/// found as one span rather than ending at the inner closer.
fn next_span(text: &str, within: Range<usize>) -> Option<SentinelSpan> {
    let slice = text.get(within.clone())?;
    let mut opened: Option<(Emphasis, usize)> = None;
    let mut depth = 0usize;
    for (offset, ch) in slice.char_indices() {
        let at = within.start + offset;
        if let Some(kind) = Emphasis::opened_by(ch) {
            if opened.is_none() {
                opened = Some((kind, at));
            }
            depth += 1;
        } else if Emphasis::closes(ch) {
            let Some((kind, open)) = opened else {
                continue;
            };
            depth -= 1;
            if depth == 0 {
                if ch == kind.sentinels().1 {
                    return Some(SentinelSpan {
                        kind,
                        open,
                        close: at,
                    });
                }
                // Mismatched closer for the outer opener; restart after it.
                opened = None;
            }
        }
    }
    None
}

fn strip_orphans(text: &mut StyledText) -> usize {
    let mut removed = 0;
    loop {
        let found = text
            .text()
            .char_indices()
            .find(|&(_, ch)| Emphasis::opened_by(ch).is_some() || Emphasis::closes(ch));
        let Some((at, ch)) = found else {
            return removed;
        };
        text.delete(at..at + ch.len_utf8());
        removed += 1;
    }
}
