//! Full-text search over document titles and tags.
//!
//! Each document contributes two fields: its title, and its tags joined with
//! spaces. Query terms match indexed terms exactly, by prefix, or fuzzily within
//! a bounded edit distance, so partial and slightly misspelled queries still find
//! their page. Title hits are boosted over tag hits.
//!
//! The index supports a wholesale [`SearchIndex::rebuild`] as well as
//! single-document [`SearchIndex::add_document`] / [`SearchIndex::remove_document`]
//! for interactive edit flows.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use ts_rs::TS;

use crate::document::{DocumentId, DocumentMeta};

const PREFIX_WEIGHT: f64 = 0.375;
const FUZZY_WEIGHT: f64 = 0.45;

/// Tuning knobs for matching and ranking
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// Maximum edit distance as a fraction of the query term length (0 disables)
    pub fuzzy: f64,
    /// Whether query terms match as prefixes of longer terms
    pub prefix: bool,
    /// Score multiplier for title matches (tag matches count 1.0)
    pub title_boost: f64,
    /// Maximum number of results
    pub limit: Option<usize>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            fuzzy: 0.2,
            prefix: true,
            title_boost: 2.0,
            limit: None,
        }
    }
}

/// Which indexed field a match was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    /// The document title
    Title,
    /// The space-joined tag list
    Tags,
}

/// A matched span inside a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FieldMatch {
    /// Field the span belongs to
    pub field: SearchField,
    /// The indexed term that matched
    pub term: String,
    /// Byte offset of the span start in the field text
    pub start: usize,
    /// Byte offset of the span end (exclusive)
    pub end: usize,
}

/// A ranked search hit
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SearchResult {
    /// Matching document
    pub id: DocumentId,
    /// Its title
    pub title: String,
    /// Relevance, higher is better
    pub score: f64,
    /// Indexed terms that matched, sorted
    pub terms: Vec<String>,
    /// Every matched span
    pub matches: Vec<FieldMatch>,
}

#[derive(Debug, Clone)]
struct Token {
    term: String,
    start: usize,
    end: usize,
}

#[derive(Debug, Clone)]
struct IndexedDocument {
    title: String,
    title_tokens: Vec<Token>,
    tag_tokens: Vec<Token>,
}

impl IndexedDocument {
    fn tokens(&self) -> impl Iterator<Item = (SearchField, &Token)> {
        self.title_tokens
            .iter()
            .map(|t| (SearchField::Title, t))
            .chain(self.tag_tokens.iter().map(|t| (SearchField::Tags, t)))
    }
}

/// Split text into lowercase alphanumeric terms with their byte spans.
fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        if c.is_alphanumeric() {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(s) = start.take() {
            tokens.push(Token {
                term: text[s..i].to_lowercase(),
                start: s,
                end: i,
            });
        }
    }
    if let Some(s) = start {
        tokens.push(Token {
            term: text[s..].to_lowercase(),
            start: s,
            end: text.len(),
        });
    }
    tokens
}

fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a_chars.len();
    let b_len = b_chars.len();
    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev = (0..=b_len).collect::<Vec<_>>();
    let mut curr = vec![0; b_len + 1];

    for i in 1..=a_len {
        curr[0] = i;
        for j in 1..=b_len {
            let cost = if a_chars[i - 1] == b_chars[j - 1] {
                0
            } else {
                1
            };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// In-memory search index keyed by document id.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    options: SearchOptions,
    documents: BTreeMap<DocumentId, IndexedDocument>,
    /// term -> documents containing it
    terms: BTreeMap<String, BTreeSet<DocumentId>>,
}

impl SearchIndex {
    /// Create an empty index with default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty index with the given options
    pub fn with_options(options: SearchOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Current options
    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Number of indexed documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether nothing is indexed
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Whether `id` is indexed
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.documents.contains_key(id)
    }

    /// Replace the whole index with the given listing.
    pub fn rebuild(&mut self, metas: &[DocumentMeta]) {
        self.documents.clear();
        self.terms.clear();
        for meta in metas {
            self.add_document(meta);
        }
        log::debug!("Search index rebuilt with {} documents", self.documents.len());
    }

    /// Index one document, replacing any previous entry for the same id.
    /// Folder placeholders are not indexed.
    pub fn add_document(&mut self, meta: &DocumentMeta) {
        self.remove_document(&meta.id);
        if meta.is_folder() {
            return;
        }

        let doc = IndexedDocument {
            title: meta.title.clone(),
            title_tokens: tokenize(&meta.title),
            tag_tokens: tokenize(&meta.tags.join(" ")),
        };
        for (_, token) in doc.tokens() {
            self.terms
                .entry(token.term.clone())
                .or_default()
                .insert(meta.id.clone());
        }
        self.documents.insert(meta.id.clone(), doc);
    }

    /// Drop a document from the index. Unknown ids are ignored.
    pub fn remove_document(&mut self, id: &DocumentId) -> bool {
        let Some(doc) = self.documents.remove(id) else {
            return false;
        };
        for (_, token) in doc.tokens() {
            if let Some(ids) = self.terms.get_mut(&token.term) {
                ids.remove(id);
                if ids.is_empty() {
                    self.terms.remove(&token.term);
                }
            }
        }
        true
    }

    /// Weight of an indexed term for one query term, if it matches at all.
    fn term_weight(&self, query: &str, term: &str) -> Option<f64> {
        if query == term {
            return Some(1.0);
        }

        let query_len = query.chars().count();
        let term_len = term.chars().count();
        let mut best: Option<f64> = None;

        if self.options.prefix && term.starts_with(query) {
            best = Some(PREFIX_WEIGHT * query_len as f64 / term_len as f64);
        }

        let max_distance = (self.options.fuzzy * query_len as f64).round() as usize;
        if max_distance > 0 && query_len.abs_diff(term_len) <= max_distance {
            let distance = levenshtein_distance(query, term);
            if distance <= max_distance {
                let weight = FUZZY_WEIGHT * (1.0 - distance as f64 / (max_distance + 1) as f64);
                best = Some(best.map_or(weight, |b| b.max(weight)));
            }
        }

        best
    }

    /// Search titles and tags.
    ///
    /// An empty or whitespace-only query returns nothing. Query terms are OR-ed;
    /// results are sorted by descending score, then title.
    pub fn search(&self, query: &str) -> Vec<SearchResult> {
        let query_terms: BTreeSet<String> = tokenize(query).into_iter().map(|t| t.term).collect();
        if query_terms.is_empty() {
            return Vec::new();
        }

        // indexed term -> best weight over all query terms
        let mut matched_terms: BTreeMap<&str, f64> = BTreeMap::new();
        for query_term in &query_terms {
            for term in self.terms.keys() {
                if let Some(weight) = self.term_weight(query_term, term) {
                    let entry = matched_terms.entry(term.as_str()).or_insert(0.0);
                    *entry = entry.max(weight);
                }
            }
        }

        let mut hits: BTreeMap<&DocumentId, SearchResult> = BTreeMap::new();
        for (term, weight) in &matched_terms {
            let Some(ids) = self.terms.get(*term) else {
                continue;
            };
            for id in ids {
                let Some(doc) = self.documents.get(id) else {
                    continue;
                };
                let hit = hits.entry(id).or_insert_with(|| SearchResult {
                    id: id.clone(),
                    title: doc.title.clone(),
                    score: 0.0,
                    terms: Vec::new(),
                    matches: Vec::new(),
                });
                hit.terms.push((*term).to_string());

                for (field, token) in doc.tokens().filter(|(_, t)| t.term == *term) {
                    let boost = match field {
                        SearchField::Title => self.options.title_boost,
                        SearchField::Tags => 1.0,
                    };
                    hit.score += weight * boost;
                    hit.matches.push(FieldMatch {
                        field,
                        term: token.term.clone(),
                        start: token.start,
                        end: token.end,
                    });
                }
            }
        }

        let mut results: Vec<SearchResult> = hits.into_values().collect();
        for result in &mut results {
            result
                .matches
                .sort_by_key(|m| (m.field != SearchField::Title, m.start));
        }
        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
                .then_with(|| a.id.cmp(&b.id))
        });
        if let Some(limit) = self.options.limit {
            results.truncate(limit);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: &str, tags: &[&str]) -> DocumentMeta {
        DocumentMeta::document(
            DocumentId::parse(id).unwrap(),
            tags.iter().map(|t| t.to_string()).collect(),
        )
    }

    fn ids(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_typo_matches_fuzzily() {
        let mut index = SearchIndex::new();
        index.rebuild(&[meta("Getting Started", &["guide"])]);

        let results = index.search("Geting");
        assert_eq!(ids(&results), vec!["Getting Started"]);
        assert!(results[0].score > 0.0);
        assert_eq!(results[0].terms, vec!["getting"]);
        assert_eq!(
            results[0].matches,
            vec![FieldMatch {
                field: SearchField::Title,
                term: "getting".to_string(),
                start: 0,
                end: 7
            }]
        );
    }

    #[test]
    fn test_empty_query_returns_nothing() {
        let mut index = SearchIndex::new();
        index.rebuild(&[meta("Getting Started", &["guide"])]);
        assert!(index.search("").is_empty());
        assert!(index.search("   \t").is_empty());
        assert!(index.search("--").is_empty());
    }

    #[test]
    fn test_prefix_and_tag_matches() {
        let mut index = SearchIndex::new();
        index.rebuild(&[
            meta("Getting Started", &["guide"]),
            meta("Other", &["guidelines"]),
        ]);

        let results = index.search("star");
        assert_eq!(ids(&results), vec!["Getting Started"]);

        let results = index.search("guide");
        assert_eq!(ids(&results), vec!["Getting Started", "Other"]);
        assert_eq!(results[0].matches[0].field, SearchField::Tags);
    }

    #[test]
    fn test_title_outranks_tag() {
        let mut index = SearchIndex::new();
        index.rebuild(&[meta("Notes", &["rust"]), meta("Rust", &[])]);
        assert_eq!(ids(&index.search("rust")), vec!["Rust", "Notes"]);
    }

    #[test]
    fn test_incremental_updates() {
        let mut index = SearchIndex::new();
        index.add_document(&meta("Alpha", &[]));
        index.add_document(&meta("Beta", &[]));
        assert_eq!(index.len(), 2);

        let mut renamed = meta("Beta", &["gamma"]);
        renamed.tags.push("delta".to_string());
        index.add_document(&renamed);
        assert_eq!(index.len(), 2);
        assert_eq!(ids(&index.search("delta")), vec!["Beta"]);

        assert!(index.remove_document(&DocumentId::parse("Alpha").unwrap()));
        assert!(!index.remove_document(&DocumentId::parse("Alpha").unwrap()));
        assert!(index.search("alpha").is_empty());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_folders_are_not_indexed() {
        let mut index = SearchIndex::new();
        index.rebuild(&[DocumentMeta::folder(DocumentId::parse("Projects").unwrap())]);
        assert!(index.is_empty());
        assert!(index.search("projects").is_empty());
    }

    #[test]
    fn test_limit_and_disabled_fuzzy() {
        let mut index = SearchIndex::with_options(SearchOptions {
            fuzzy: 0.0,
            limit: Some(1),
            ..SearchOptions::default()
        });
        index.rebuild(&[meta("Plan A", &[]), meta("Plan B", &[])]);
        assert_eq!(index.search("plan").len(), 1);
        assert!(index.search("plam").is_empty());
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("geting", "getting"), 1);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }
}
