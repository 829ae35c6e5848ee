//! Frontmatter codec for document files.
//!
//! A document may start with a YAML metadata header bounded by `---` marker lines.
//! The codec owns exactly one field, `tags`; every other key is kept in a
//! [`MetadataBag`] and written back unchanged, in its original order.
//!
//! Files that never had a header stay pure markdown: when there is nothing to
//! write, [`serialize`] emits the body alone.

use indexmap::IndexMap;
use serde_yaml::Value;

use crate::document::FOLDER_TAG;
use crate::error::Result;

/// The one frontmatter key interpreted by the codec
pub const TAGS_KEY: &str = "tags";

const MARKER: &str = "---";

/// Frontmatter fields not owned by the codec, carried through unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataBag {
    fields: IndexMap<String, Value>,
    /// Where `tags` sat among the keys when the file was read
    tags_position: Option<usize>,
}

impl MetadataBag {
    /// Build a bag from already-parsed fields. A `tags` key is ignored.
    pub fn from_fields(mut fields: IndexMap<String, Value>) -> Self {
        let tags_position = fields.get_index_of(TAGS_KEY);
        fields.shift_remove(TAGS_KEY);
        Self {
            fields,
            tags_position,
        }
    }

    /// Look up a field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a field. `tags` is owned by the codec and cannot be set here.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        if key == TAGS_KEY {
            return false;
        }
        self.fields.insert(key, value);
        true
    }

    /// Remove a field, keeping the order of the rest
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.shift_remove(key)
    }

    /// Iterate over fields in file order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Number of carried fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no fields are carried
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Merge the current tags back in at their original position.
    fn to_frontmatter(&self, tags: &[String]) -> IndexMap<String, Value> {
        let mut map = self.fields.clone();
        let tags: Vec<Value> = tags
            .iter()
            .filter(|t| t.as_str() != FOLDER_TAG)
            .map(|t| Value::String(t.clone()))
            .collect();
        if !tags.is_empty() {
            let index = self.tags_position.unwrap_or(map.len()).min(map.len());
            map.shift_insert(index, TAGS_KEY.to_string(), Value::Sequence(tags));
        }
        map
    }
}

/// Result of parsing a document file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDocument {
    /// Tags from the header, deduplicated in file order
    pub tags: Vec<String>,
    /// Every other header field
    pub metadata: MetadataBag,
    /// Content after the header (or the whole file when there is none)
    pub body: String,
    /// Whether the file started with a well-formed header
    pub had_header: bool,
}

/// Split `content` into (header text, body) if it starts with a terminated header.
fn split_header(content: &str) -> Option<(&str, &str)> {
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))?;

    // Header closed immediately: "---\n---\n"
    if let Some(body) = strip_marker_line(rest) {
        return Some(("", body));
    }

    let mut search_from = 0;
    while let Some(offset) = rest[search_from..].find("\n---") {
        let newline = search_from + offset;
        let after_newline = &rest[newline + 1..];
        if let Some(body) = strip_marker_line(after_newline) {
            return Some((&rest[..newline + 1], body));
        }
        search_from = newline + 1;
    }
    None
}

/// If `s` starts with a full marker line, return what follows it.
fn strip_marker_line(s: &str) -> Option<&str> {
    let after = s.strip_prefix(MARKER)?;
    if after.is_empty() {
        Some("")
    } else if let Some(body) = after.strip_prefix('\n') {
        Some(body)
    } else {
        after.strip_prefix("\r\n")
    }
}

/// Parse tags leniently: a list of strings or a single string.
fn parse_tags(value: Option<&Value>) -> Vec<String> {
    let raw: Vec<String> = match value {
        Some(Value::Sequence(seq)) => seq
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
            .collect(),
        Some(Value::String(s)) => vec![s.trim().to_string()],
        _ => Vec::new(),
    };

    let mut tags: Vec<String> = Vec::with_capacity(raw.len());
    for tag in raw {
        if !tag.is_empty() && tag != FOLDER_TAG && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// Parse a document file.
///
/// Never fails: a missing, unterminated or unparseable header yields empty tags
/// with the whole content as body and `had_header == false`.
pub fn parse(content: &str) -> ParsedDocument {
    let Some((header, body)) = split_header(content) else {
        return header_less(content);
    };

    let fields: IndexMap<String, Value> = if header.trim().is_empty() {
        IndexMap::new()
    } else {
        match serde_yaml::from_str(header) {
            Ok(fields) => fields,
            Err(e) => {
                log::debug!("Treating unparseable frontmatter as body: {}", e);
                return header_less(content);
            }
        }
    };

    let tags = parse_tags(fields.get(TAGS_KEY));
    ParsedDocument {
        tags,
        metadata: MetadataBag::from_fields(fields),
        body: body.to_string(),
        had_header: true,
    }
}

fn header_less(content: &str) -> ParsedDocument {
    ParsedDocument {
        tags: Vec::new(),
        metadata: MetadataBag::default(),
        body: content.to_string(),
        had_header: false,
    }
}

/// Serialize tags, carried fields and body back to file content.
///
/// When there are no fields to write the header is omitted, unless the body itself
/// starts with something that would be read back as a header.
pub fn serialize(tags: &[String], metadata: &MetadataBag, body: &str) -> Result<String> {
    let frontmatter = metadata.to_frontmatter(tags);
    if frontmatter.is_empty() {
        if split_header(body).is_some() {
            return Ok(format!("---\n---\n{}", body));
        }
        return Ok(body.to_string());
    }

    let yaml_str = serde_yaml::to_string(&frontmatter)?;
    Ok(format!("---\n{}---\n{}", yaml_str, body))
}

/// Extract only the body from file content, stripping the header.
///
/// If no header exists, returns the content unchanged.
pub fn extract_body(content: &str) -> &str {
    match split_header(content) {
        Some((_, body)) => body,
        None => content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reparse_body(raw: &str) -> String {
        let parsed = parse(raw);
        let written = serialize(&parsed.tags, &parsed.metadata, &parsed.body).unwrap();
        parse(&written).body
    }

    #[test]
    fn test_parse_header_with_tags() {
        let raw = "---\ntitle: Kept\ntags: [guide, intro]\n---\n# Body\n";
        let parsed = parse(raw);
        assert!(parsed.had_header);
        assert_eq!(parsed.tags, vec!["guide", "intro"]);
        assert_eq!(parsed.body, "# Body\n");
        assert_eq!(parsed.metadata.get("title").unwrap().as_str(), Some("Kept"));
        assert!(parsed.metadata.get(TAGS_KEY).is_none());
    }

    #[test]
    fn test_parse_without_header() {
        let parsed = parse("Just body content");
        assert!(!parsed.had_header);
        assert!(parsed.tags.is_empty());
        assert_eq!(parsed.body, "Just body content");
    }

    #[test]
    fn test_unterminated_header_is_body() {
        let raw = "---\ntags: [a]\nno closing marker";
        let parsed = parse(raw);
        assert!(!parsed.had_header);
        assert_eq!(parsed.body, raw);
    }

    #[test]
    fn test_invalid_yaml_is_body() {
        let raw = "---\nbroken: [unclosed\n---\nbody";
        let parsed = parse(raw);
        assert!(!parsed.had_header);
        assert_eq!(parsed.body, raw);
    }

    #[test]
    fn test_crlf_header() {
        let raw = "---\r\ntags: [x]\r\n---\r\nbody\r\n";
        let parsed = parse(raw);
        assert!(parsed.had_header);
        assert_eq!(parsed.tags, vec!["x"]);
        assert_eq!(parsed.body, "body\r\n");
    }

    #[test]
    fn test_single_string_tag() {
        let parsed = parse("---\ntags: solo\n---\n");
        assert_eq!(parsed.tags, vec!["solo"]);
        assert_eq!(parsed.body, "");
    }

    #[test]
    fn test_no_tags_serializes_without_header() {
        let written = serialize(&[], &MetadataBag::default(), "# Plain\n").unwrap();
        assert_eq!(written, "# Plain\n");
        assert!(parse(&written).tags.is_empty());
    }

    #[test]
    fn test_unknown_keys_survive_in_order() {
        let raw = "---\nzeta: 1\ntags:\n- a\nalpha:\n  nested: true\n---\nbody";
        let parsed = parse(raw);
        let written =
            serialize(&["a".to_string(), "b".to_string()], &parsed.metadata, &parsed.body)
                .unwrap();

        let reparsed = parse(&written);
        assert_eq!(reparsed.tags, vec!["a", "b"]);
        assert_eq!(reparsed.metadata, parsed.metadata);

        let zeta = written.find("zeta").unwrap();
        let tags = written.find("tags").unwrap();
        let alpha = written.find("alpha").unwrap();
        assert!(zeta < tags && tags < alpha);
    }

    #[test]
    fn test_folder_tag_never_written() {
        let written = serialize(
            &[FOLDER_TAG.to_string(), "real".to_string()],
            &MetadataBag::default(),
            "",
        )
        .unwrap();
        assert!(!written.contains(FOLDER_TAG));
        assert!(written.contains("real"));
    }

    #[test]
    fn test_removing_last_tag_drops_header() {
        let parsed = parse("---\ntags: [a]\n---\nbody");
        let written = serialize(&[], &parsed.metadata, &parsed.body).unwrap();
        assert_eq!(written, "body");
    }

    #[test]
    fn test_body_that_looks_like_header_is_protected() {
        let body = "---\nnot: metadata\n---\ntext";
        let written = serialize(&[], &MetadataBag::default(), body).unwrap();
        let parsed = parse(&written);
        assert_eq!(parsed.body, body);
        assert!(parsed.tags.is_empty());
    }

    #[test]
    fn test_body_round_trip_for_varied_inputs() {
        let inputs = [
            "",
            "plain",
            "---\n---\n",
            "---\ntags: []\n---\n---\nx: 1\n---\ninner",
            "---\ntitle: t\n---\n\n\nspaced\n",
            "---\ntags: [a]\n---",
            "line\n---\nnot a header\n",
            "---\nbroken: [\n---\nbody",
        ];
        for raw in inputs {
            assert_eq!(reparse_body(raw), parse(raw).body, "input: {:?}", raw);
        }
    }

    #[test]
    fn test_extract_body() {
        assert_eq!(extract_body("---\ntags: [a]\n---\nBody"), "Body");
        assert_eq!(extract_body("No header"), "No header");
    }

    #[test]
    fn test_bag_refuses_tags_key() {
        let mut bag = MetadataBag::default();
        assert!(!bag.insert(TAGS_KEY, Value::Null));
        assert!(bag.insert("status", Value::String("draft".into())));
        assert_eq!(bag.len(), 1);
    }
}
