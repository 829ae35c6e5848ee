//! Path utilities for turning user-supplied titles into file names.
//!
//! Titles become the last segment of a document id, so they have to be safe on
//! every filesystem the workspace may be checked out on.

use std::path::Path;

/// Name used when a title sanitizes to nothing
pub const UNTITLED: &str = "Untitled";

/// Join marker used when flattening an id into a single trash file name
pub const TRASH_JOIN: &str = "__";

/// Marker before the number of a trash collision copy (`a__b__~2`)
pub const TRASH_COPY: &str = "__~";

const RESERVED: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Turn a free-form title into a filesystem-safe name.
///
/// # Example
/// ```
/// use folia_core::path_utils::sanitize_title;
///
/// assert_eq!(sanitize_title("  What?  Now: / later.. "), "What Now later");
/// assert_eq!(sanitize_title("..."), "Untitled");
/// ```
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !c.is_control() && !RESERVED.contains(c))
        .collect();

    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches('.').trim();

    if trimmed.is_empty() {
        UNTITLED.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Name with a collision suffix: `name` for n <= 1, otherwise `name (n)`.
pub fn numbered_name(name: &str, n: u32) -> String {
    if n <= 1 {
        name.to_string()
    } else {
        format!("{} ({})", name, n)
    }
}

/// Flatten a `/`-separated id into a single file stem.
pub fn flatten_id(id: &str) -> String {
    id.replace('/', TRASH_JOIN)
}

/// Trash file stem for the `n`th document flattening to `stem`.
///
/// The copy marker starts with the join marker, so an ordinary ` (n)` in a
/// title is never mistaken for a trash collision suffix.
pub fn trash_name(stem: &str, n: u32) -> String {
    if n <= 1 {
        stem.to_string()
    } else {
        format!("{}{}{}", stem, TRASH_COPY, n)
    }
}

/// Reverse of [`flatten_id`], ignoring any collision marker added in the trash.
///
/// Titles that themselves contain the join marker cannot be told apart from
/// nested ids; they restore as nested paths.
pub fn unflatten_name(stem: &str) -> String {
    let base = strip_trash_copy(stem);
    base.split(TRASH_JOIN)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

fn strip_trash_copy(stem: &str) -> &str {
    if let Some(at) = stem.rfind(TRASH_COPY) {
        let digits = &stem[at + TRASH_COPY.len()..];
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            return &stem[..at];
        }
    }
    stem
}

/// File stem of a path as an owned string (`a/b/Note.md` -> `Note`).
pub fn file_stem_string(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().to_string())
}

/// Whether a directory entry name is hidden or reserved (`.git`, `.trash`, dotfiles).
pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_reserved_and_control() {
        assert_eq!(sanitize_title("a/b\\c:d*e?f\"g<h>i|j"), "abcdefghij");
        assert_eq!(sanitize_title("tab\there\u{7}"), "tab here");
    }

    #[test]
    fn test_sanitize_collapses_and_trims() {
        assert_eq!(sanitize_title("  many    spaces  "), "many spaces");
        assert_eq!(sanitize_title(".hidden."), "hidden");
        assert_eq!(sanitize_title("v1.2 notes"), "v1.2 notes");
    }

    #[test]
    fn test_sanitize_empty_falls_back() {
        assert_eq!(sanitize_title(""), UNTITLED);
        assert_eq!(sanitize_title("///"), UNTITLED);
        assert_eq!(sanitize_title(" . . "), UNTITLED);
    }

    #[test]
    fn test_numbered_name() {
        assert_eq!(numbered_name("Note", 1), "Note");
        assert_eq!(numbered_name("Note", 2), "Note (2)");
    }

    #[test]
    fn test_flatten_round_trip() {
        assert_eq!(flatten_id("a/b/Note"), "a__b__Note");
        assert_eq!(unflatten_name("a__b__Note"), "a/b/Note");
        assert_eq!(unflatten_name("a__b__Note__~3"), "a/b/Note");
        assert_eq!(unflatten_name("Plain"), "Plain");
    }

    #[test]
    fn test_numbered_titles_survive_the_trash() {
        assert_eq!(trash_name("Plan (2)", 1), "Plan (2)");
        assert_eq!(unflatten_name("Plan (2)"), "Plan (2)");
        assert_eq!(unflatten_name(&trash_name("Plan (2)", 3)), "Plan (2)");
        assert_eq!(unflatten_name("Plan__~x"), "Plan/~x");
    }
}
