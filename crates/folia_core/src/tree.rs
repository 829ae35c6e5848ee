//! Tree building over a flat document listing.
//!
//! These are pure, synchronous transformations: cheap enough to run wholesale
//! after every mutation. Hierarchy comes from each entry's `parent` field; a
//! parent missing from the listing makes the entry a root, and manufactured
//! parent cycles are broken instead of looping.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use ts_rs::TS;

use crate::document::{DocumentId, DocumentMeta};

/// A node in the workspace tree
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TreeNode {
    /// Listing metadata of this node
    pub meta: DocumentMeta,
    /// Child nodes, folders first then by title
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Number of nodes in this subtree, including `self`
    pub fn count(&self) -> usize {
        let mut total = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            total += 1;
            stack.extend(node.children.iter());
        }
        total
    }
}

fn sibling_order(a: &DocumentMeta, b: &DocumentMeta) -> Ordering {
    b.is_folder()
        .cmp(&a.is_folder())
        .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
        .then_with(|| a.id.cmp(&b.id))
}

struct Builder<'a> {
    children: HashMap<&'a DocumentId, Vec<&'a DocumentMeta>>,
    placed: HashSet<&'a DocumentId>,
}

/// A node whose children are still being built
struct Frame<'a> {
    meta: &'a DocumentMeta,
    pending: std::vec::IntoIter<&'a DocumentMeta>,
    children: Vec<TreeNode>,
}

impl Frame<'_> {
    fn finish(self) -> TreeNode {
        TreeNode {
            meta: self.meta.clone(),
            children: self.children,
        }
    }
}

impl<'a> Builder<'a> {
    fn enter(&mut self, meta: &'a DocumentMeta) -> Frame<'a> {
        self.placed.insert(&meta.id);
        let kids = self.children.get(&meta.id).cloned().unwrap_or_default();
        Frame {
            meta,
            pending: kids.into_iter(),
            children: Vec::new(),
        }
    }

    /// Build the subtree under `root` depth-first with an explicit stack, so
    /// long parent chains cannot exhaust the call stack.
    fn node(&mut self, root: &'a DocumentMeta) -> TreeNode {
        let mut root = self.enter(root);
        let mut stack: Vec<Frame<'a>> = Vec::new();

        loop {
            let current = stack.last_mut().unwrap_or(&mut root);
            match current.pending.next() {
                // Already placed means a duplicate id or a cycle back up the walk
                Some(child) if self.placed.contains(&child.id) => {}
                Some(child) => {
                    let frame = self.enter(child);
                    stack.push(frame);
                }
                None => match stack.pop() {
                    Some(done) => {
                        let node = done.finish();
                        stack.last_mut().unwrap_or(&mut root).children.push(node);
                    }
                    None => return root.finish(),
                },
            }
        }
    }
}

/// Walk up from `meta` until an id repeats; that id is a member of the cycle.
fn cycle_entry<'a>(
    by_id: &BTreeMap<&'a DocumentId, &'a DocumentMeta>,
    meta: &'a DocumentMeta,
) -> &'a DocumentMeta {
    let mut seen: HashSet<&DocumentId> = HashSet::new();
    let mut current = meta;
    while seen.insert(&current.id) {
        match current.parent.as_ref().and_then(|p| by_id.get(p).copied()) {
            Some(parent) => current = parent,
            None => break,
        }
    }
    current
}

/// Build a forest from a flat listing.
///
/// Every id appears in exactly one node. Entries whose parent is `None` or not in
/// the listing become roots; a parent cycle is cut at the member reached first
/// when walking up from it, and that member becomes a root.
pub fn build_tree(metas: &[DocumentMeta]) -> Vec<TreeNode> {
    let mut by_id: BTreeMap<&DocumentId, &DocumentMeta> = BTreeMap::new();
    for meta in metas {
        by_id.entry(&meta.id).or_insert(meta);
    }

    let mut children: HashMap<&DocumentId, Vec<&DocumentMeta>> = HashMap::new();
    let mut roots: Vec<&DocumentMeta> = Vec::new();
    for meta in by_id.values().copied() {
        match &meta.parent {
            Some(parent) if parent != &meta.id && by_id.contains_key(parent) => {
                children.entry(parent).or_default().push(meta);
            }
            _ => roots.push(meta),
        }
    }
    for list in children.values_mut() {
        list.sort_by(|a, b| sibling_order(a, b));
    }
    roots.sort_by(|a, b| sibling_order(a, b));

    let mut builder = Builder {
        children,
        placed: HashSet::new(),
    };

    let mut forest: Vec<TreeNode> = roots.into_iter().map(|m| builder.node(m)).collect();

    // Whatever is left is only reachable through a cycle
    let stranded: Vec<&DocumentMeta> = by_id
        .values()
        .filter(|m| !builder.placed.contains(&m.id))
        .copied()
        .collect();
    for meta in stranded {
        if builder.placed.contains(&meta.id) {
            continue;
        }
        let entry = cycle_entry(&by_id, meta);
        log::debug!("Breaking parent cycle at {}", entry.id);
        forest.push(builder.node(entry));
    }

    forest
}

/// Ancestors of `id`, nearest first, following `parent` fields.
///
/// Stops at a parent missing from the listing, and at the first repeated id.
pub fn get_ancestors(metas: &[DocumentMeta], id: &DocumentId) -> Vec<DocumentMeta> {
    let by_id: HashMap<&DocumentId, &DocumentMeta> = metas.iter().map(|m| (&m.id, m)).collect();
    let mut seen: HashSet<&DocumentId> = HashSet::from([id]);
    let mut ancestors = Vec::new();

    let mut current = by_id.get(id).and_then(|m| m.parent.as_ref());
    while let Some(parent_id) = current {
        if !seen.insert(parent_id) {
            break;
        }
        let Some(parent) = by_id.get(parent_id) else {
            break;
        };
        ancestors.push((*parent).clone());
        current = parent.parent.as_ref();
    }
    ancestors
}

/// Find the node for `id` anywhere in a forest.
pub fn find_node<'a>(forest: &'a [TreeNode], id: &DocumentId) -> Option<&'a TreeNode> {
    let mut stack: Vec<&TreeNode> = forest.iter().collect();
    while let Some(node) = stack.pop() {
        if &node.meta.id == id {
            return Some(node);
        }
        stack.extend(node.children.iter());
    }
    None
}

/// Entries carrying `tag`, plus all of their ancestors so the result still forms
/// a connected tree. Sorted by id.
pub fn filter_by_tag(metas: &[DocumentMeta], tag: &str) -> Vec<DocumentMeta> {
    let mut kept: BTreeMap<DocumentId, DocumentMeta> = BTreeMap::new();
    for meta in metas.iter().filter(|m| m.has_tag(tag)) {
        for ancestor in get_ancestors(metas, &meta.id) {
            kept.entry(ancestor.id.clone()).or_insert(ancestor);
        }
        kept.entry(meta.id.clone()).or_insert_with(|| meta.clone());
    }
    kept.into_values().collect()
}

/// Every tag in use with the number of entries carrying it, sorted by tag.
pub fn collect_tags(metas: &[DocumentMeta]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for meta in metas {
        for tag in &meta.tags {
            *counts.entry(tag.clone()).or_default() += 1;
        }
    }
    counts.into_iter().collect()
}

/// Render a forest as plain text with box-drawing connectors.
pub fn format_tree(forest: &[TreeNode]) -> String {
    let mut out = String::new();
    // (node, text before its title, prefix for its children's lines)
    let mut stack: Vec<(&TreeNode, String, String)> = forest
        .iter()
        .rev()
        .map(|node| (node, String::new(), String::new()))
        .collect();

    while let Some((node, lead, prefix)) = stack.pop() {
        out.push_str(&lead);
        out.push_str(&node.meta.title);
        if node.meta.is_folder() {
            out.push('/');
        } else if !node.meta.tags.is_empty() {
            out.push_str(" [");
            out.push_str(&node.meta.tags.join(", "));
            out.push(']');
        }
        out.push('\n');

        let child_count = node.children.len();
        for (i, child) in node.children.iter().enumerate().rev() {
            let is_last_child = i + 1 == child_count;
            let (connector, child_prefix) = if is_last_child {
                ("└── ", "    ")
            } else {
                ("├── ", "│   ")
            };
            stack.push((
                child,
                format!("{}{}", prefix, connector),
                format!("{}{}", prefix, child_prefix),
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::NodeKind;

    fn id(raw: &str) -> DocumentId {
        DocumentId::parse(raw).unwrap()
    }

    fn doc(raw: &str, tags: &[&str]) -> DocumentMeta {
        DocumentMeta::document(id(raw), tags.iter().map(|t| t.to_string()).collect())
    }

    fn with_parent(raw: &str, parent: &str) -> DocumentMeta {
        let mut meta = doc(raw, &[]);
        meta.parent = Some(id(parent));
        meta
    }

    fn all_ids(forest: &[TreeNode]) -> Vec<String> {
        let mut ids = Vec::new();
        let mut stack: Vec<&TreeNode> = forest.iter().collect();
        while let Some(node) = stack.pop() {
            ids.push(node.meta.id.to_string());
            stack.extend(node.children.iter());
        }
        ids.sort();
        ids
    }

    #[test]
    fn test_build_tree_nests_by_parent() {
        let metas = vec![
            doc("b", &[]),
            DocumentMeta::folder(id("a")),
            doc("a/z", &[]),
            DocumentMeta::folder(id("a/Y")),
            doc("a/Y/leaf", &[]),
        ];
        let forest = build_tree(&metas);

        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].meta.id, id("a"));
        assert_eq!(forest[0].children[0].meta.id, id("a/Y"));
        assert_eq!(forest[0].children[0].meta.kind, NodeKind::FolderPlaceholder);
        assert_eq!(forest[0].children[1].meta.id, id("a/z"));
        assert_eq!(forest.iter().map(TreeNode::count).sum::<usize>(), 5);
    }

    #[test]
    fn test_dangling_parent_becomes_root() {
        let forest = build_tree(&[doc("missing/child", &[])]);
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].meta.id, id("missing/child"));
    }

    #[test]
    fn test_manufactured_cycle_places_every_id_once() {
        let metas = vec![
            with_parent("x", "z"),
            with_parent("y", "x"),
            with_parent("z", "y"),
            with_parent("self", "self"),
            doc("root", &[]),
            with_parent("under", "x"),
        ];
        let forest = build_tree(&metas);
        assert_eq!(
            all_ids(&forest),
            vec!["root", "self", "under", "x", "y", "z"]
        );

        let ancestors = get_ancestors(&metas, &id("y"));
        let ids: Vec<&str> = ancestors.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "z"]);
    }

    #[test]
    fn test_long_parent_chain_builds_without_recursion() {
        const DEPTH: usize = 3_000;
        let mut metas = vec![doc("n0", &[])];
        for i in 1..DEPTH {
            metas.push(with_parent(&format!("n{}", i), &format!("n{}", i - 1)));
        }

        let forest = build_tree(&metas);
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].count(), DEPTH);

        let mut node = &forest[0];
        let mut depth = 1;
        while let Some(child) = node.children.first() {
            node = child;
            depth += 1;
        }
        assert_eq!(depth, DEPTH);
        assert_eq!(node.meta.id, id(&format!("n{}", DEPTH - 1)));
        assert_eq!(format_tree(&forest).lines().count(), DEPTH);
    }

    #[test]
    fn test_get_ancestors_nearest_first() {
        let metas = vec![
            DocumentMeta::folder(id("a")),
            DocumentMeta::folder(id("a/b")),
            doc("a/b/c", &[]),
        ];
        let ids: Vec<DocumentId> = get_ancestors(&metas, &id("a/b/c"))
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![id("a/b"), id("a")]);
    }

    #[test]
    fn test_find_node() {
        let metas = vec![DocumentMeta::folder(id("a")), doc("a/b", &[])];
        let forest = build_tree(&metas);
        assert_eq!(find_node(&forest, &id("a/b")).unwrap().meta.title, "b");
        assert!(find_node(&forest, &id("nope")).is_none());
    }

    #[test]
    fn test_filter_by_tag_keeps_ancestors() {
        let metas = vec![
            DocumentMeta::folder(id("a")),
            doc("a/tagged", &["Guide"]),
            doc("a/other", &[]),
            doc("b", &["guide"]),
        ];
        let filtered = filter_by_tag(&metas, "guide");
        let ids: Vec<&str> = filtered.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "a/tagged", "b"]);
    }

    #[test]
    fn test_collect_tags_counts() {
        let metas = vec![doc("a", &["x", "y"]), doc("b", &["x"])];
        assert_eq!(
            collect_tags(&metas),
            vec![("x".to_string(), 2), ("y".to_string(), 1)]
        );
    }

    #[test]
    fn test_format_tree() {
        let metas = vec![
            DocumentMeta::folder(id("a")),
            doc("a/one", &["t"]),
            doc("a/two", &[]),
        ];
        let text = format_tree(&build_tree(&metas));
        assert_eq!(text, "a/\n├── one [t]\n└── two\n");
    }
}
