//! Wiki-link parsing for document bodies.
//!
//! # Link Syntax Supported
//!
//! | Form | Example | Target |
//! |------|---------|--------|
//! | Explicit id | `[[Getting Started|guides/Getting Started]]` | the id after `|` |
//! | Bare title | `[[Getting Started]]` | resolved through a title map |
//! | Heading | `[[Getting Started#Install]]` | the title part, heading ignored |
//!
//! Links inside fenced code blocks (```` ``` ```` or `~~~`) are ignored.

use serde::Serialize;

/// Where a link points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum LinkTarget {
    /// `[[title|id]]`: the id is given explicitly
    Id(String),
    /// `[[title]]`: must be resolved by title
    Title(String),
}

/// A wiki link found in a document body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WikiLink {
    /// Display text (the title part)
    pub text: String,
    /// Link target
    pub target: LinkTarget,
    /// Byte offset of the opening `[[` in the body
    pub offset: usize,
}

/// Parse the inside of a `[[...]]` pair.
///
/// # Examples
///
/// ```
/// use folia_core::link_parser::{parse_link_inner, LinkTarget};
///
/// let link = parse_link_inner("Intro|guides/Intro").unwrap();
/// assert_eq!(link.0, "Intro");
/// assert_eq!(link.1, LinkTarget::Id("guides/Intro".to_string()));
///
/// let link = parse_link_inner("Intro#Setup").unwrap();
/// assert_eq!(link.1, LinkTarget::Title("Intro".to_string()));
/// ```
pub fn parse_link_inner(inner: &str) -> Option<(String, LinkTarget)> {
    let (text, target) = match inner.split_once('|') {
        Some((text, id)) => {
            let id = id.trim().trim_matches('/');
            if id.is_empty() {
                (text.trim(), None)
            } else {
                (text.trim(), Some(LinkTarget::Id(id.to_string())))
            }
        }
        None => (inner.trim(), None),
    };

    let title = text.split('#').next().unwrap_or(text).trim();
    let target = match target {
        Some(target) => target,
        None if title.is_empty() => return None,
        None => LinkTarget::Title(title.to_string()),
    };
    Some((title.to_string(), target))
}

/// Whether a line opens or closes a fenced code block.
fn fence_marker(line: &str) -> Option<&'static str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with("```") {
        Some("```")
    } else if trimmed.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}

/// Extract every wiki link from a body, in order of appearance.
pub fn parse_wiki_links(body: &str) -> Vec<WikiLink> {
    let mut links = Vec::new();
    let mut open_fence: Option<&'static str> = None;
    let mut line_start = 0;

    for line in body.split_inclusive('\n') {
        let offset = line_start;
        line_start += line.len();

        if let Some(marker) = fence_marker(line) {
            match open_fence {
                None => open_fence = Some(marker),
                Some(open) if open == marker => open_fence = None,
                Some(_) => {}
            }
            continue;
        }
        if open_fence.is_some() {
            continue;
        }

        let mut search = 0;
        while let Some(start) = line[search..].find("[[") {
            let open = search + start;
            let Some(len) = line[open + 2..].find("]]") else {
                break;
            };
            let inner = &line[open + 2..open + 2 + len];
            // A nested `[[` means the first opener was stray text
            if let Some(nested) = inner.rfind("[[") {
                search = open + 2 + nested;
                continue;
            }
            if let Some((text, target)) = parse_link_inner(inner) {
                links.push(WikiLink {
                    text,
                    target,
                    offset: offset + open,
                });
            }
            search = open + 2 + len + 2;
        }
    }

    links
}
