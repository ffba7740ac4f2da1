//! Depth-aware block scanning over XML plist text.
//!
//! Plist containers nest (`<dict>` inside `<array>` inside `<dict>`), so a
//! closing tag can only be matched to its opener by counting depth. A regex
//! on its own would happily pair a block's opener with a sibling's closer.

use std::ops::Range;

/// How a tag participates in nesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TagKind {
    /// `<name>`
    Open,
    /// `</name>`
    Close,
    /// `<name/>`, a complete empty element.
    Empty,
}

/// One markup tag with its byte span in the document.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Tag<'a> {
    pub name: &'a str,
    pub kind: TagKind,
    /// Offset of `<`.
    pub start: usize,
    /// Offset just past `>`.
    pub end: usize,
}

/// Iterator over the element tags of a document.
///
/// Declarations, doctypes and comments are skipped. An unterminated tag
/// ends the iteration.
pub(crate) struct Tags<'a> {
    doc: &'a str,
    pos: usize,
}

pub(crate) fn tags(doc: &str) -> Tags<'_> {
    Tags { doc, pos: 0 }
}

impl<'a> Tags<'a> {
    /// Continue scanning from a byte offset.
    pub(crate) fn starting_at(doc: &'a str, pos: usize) -> Self {
        Self { doc, pos }
    }
}

impl<'a> Iterator for Tags<'a> {
    type Item = Tag<'a>;

    fn next(&mut self) -> Option<Tag<'a>> {
        loop {
            let start = self.pos + self.doc.get(self.pos..)?.find('<')?;
            let rest = &self.doc[start..];

            if rest.starts_with("<!--") {
                self.pos = start + rest.find("-->")? + 3;
                continue;
            }

            let end = start + rest.find('>')? + 1;
            self.pos = end;

            let inner = &self.doc[start + 1..end - 1];
            if inner.starts_with('?') || inner.starts_with('!') {
                continue;
            }

            let (kind, body) = if let Some(body) = inner.strip_prefix('/') {
                (TagKind::Close, body)
            } else if let Some(body) = inner.strip_suffix('/') {
                (TagKind::Empty, body)
            } else {
                (TagKind::Open, inner)
            };
            let name = body
                .split(|c: char| c.is_whitespace() || c == '/')
                .next()
                .unwrap_or_default();

            return Some(Tag {
                name,
                kind,
                start,
                end,
            });
        }
    }
}

/// Inner content of every top-level `<tag>...</tag>` block.
///
/// Nested blocks with the same tag are skipped over, not split out. The
/// returned slices exclude the delimiters, so wrapping each in `<tag>` and
/// `</tag>` reproduces the original span byte for byte. A trailing block
/// with no matching close is dropped silently; complete blocks before it
/// are kept.
pub fn extract_top_level_blocks<'a>(doc: &'a str, tag: &str) -> Vec<&'a str> {
    let mut blocks = Vec::new();
    let mut depth = 0usize;
    let mut content_start = 0;

    for t in tags(doc).filter(|t| t.name == tag) {
        match t.kind {
            TagKind::Open => {
                if depth == 0 {
                    content_start = t.end;
                }
                depth += 1;
            }
            TagKind::Close if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    blocks.push(&doc[content_start..t.start]);
                }
            }
            // stray closer or `<tag/>`
            _ => {}
        }
    }

    blocks
}

/// Inner content of every top-level `<dict>` block.
pub fn extract_top_level_dicts(doc: &str) -> Vec<&str> {
    extract_top_level_blocks(doc, "dict")
}

/// Given that a `<tag>` opener ends at `from`, find the start offset of
/// its matching `</tag>`.
pub(crate) fn matching_close(doc: &str, from: usize, tag: &str) -> Option<usize> {
    let mut depth = 1usize;
    for t in Tags::starting_at(doc, from).filter(|t| t.name == tag) {
        match t.kind {
            TagKind::Open => depth += 1,
            TagKind::Close => {
                depth -= 1;
                if depth == 0 {
                    return Some(t.start);
                }
            }
            TagKind::Empty => {}
        }
    }
    None
}

/// Byte ranges of the containers (`dict`/`array`) directly inside `content`.
///
/// Anything falling inside one of these ranges belongs to a nested
/// structure rather than to `content`'s own level. An unterminated
/// container extends to the end of `content`.
pub(crate) fn nested_spans(content: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut open_at = 0;

    for t in tags(content).filter(|t| is_container(t.name)) {
        match t.kind {
            TagKind::Open => {
                if depth == 0 {
                    open_at = t.start;
                }
                depth += 1;
            }
            TagKind::Close if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push(open_at..t.end);
                }
            }
            _ => {}
        }
    }

    if depth > 0 {
        spans.push(open_at..content.len());
    }
    spans
}

fn is_container(name: &str) -> bool {
    name == "dict" || name == "array"
}
