//! Document outline (bookmarks).
//!
//! Entries arrive flat, in document order, each with a nesting level. Nothing
//! is linked until the document closes: the list is then resolved into an
//! arena of nodes with index links, ids are reserved for every node, and the
//! nodes are written in one forward pass.

use crate::error::Result;
use crate::object::{Object, ObjectRef};
use crate::writer::annotation_builder::xyz_destination;
use crate::writer::object_serializer::ObjectSerializer;
use crate::writer::ObjectSink;
use std::collections::HashMap;

/// Outline level for a table-of-contents kind.
///
/// `toc-strong-1` and `toc-strong-2` are levels 1 and 2, `toc-1` to `toc-5`
/// are levels 3 to 7, anything else is a top-level entry.
pub fn toc_level(kind: &str) -> i32 {
    if let Some(n) = kind.strip_prefix("toc-strong-") {
        return match n {
            "1" => 1,
            "2" => 2,
            _ => 1,
        };
    }
    match kind.strip_prefix("toc-").and_then(|n| n.parse::<i32>().ok()) {
        Some(n @ 1..=5) => n + 2,
        _ => 1,
    }
}

/// Encode a title as a PDF text string: ASCII as is, anything else UTF-16BE
/// with a byte order mark.
pub fn text_string(title: &str) -> Object {
    if title.is_ascii() {
        return Object::String(title.as_bytes().to_vec());
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in title.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes)
}

/// One recorded outline entry.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineEntry {
    /// Bookmark text
    pub title: String,
    /// Target page
    pub page: ObjectRef,
    /// Target position in default user space
    pub x: f64,
    /// Target position in default user space
    pub y: f64,
    /// Nesting level, 1 for top-level entries
    pub level: i32,
}

/// A resolved node. Links are arena indices.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineNode {
    /// The entry this node was built from
    pub entry: OutlineEntry,
    /// Parent node; `None` for top-level nodes
    pub parent: Option<usize>,
    /// First child
    pub first: Option<usize>,
    /// Last child
    pub last: Option<usize>,
    /// Previous sibling
    pub prev: Option<usize>,
    /// Next sibling
    pub next: Option<usize>,
    /// Number of transitive descendants
    pub descendants: usize,
}

/// The resolved outline: nodes in document order plus the top-level indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutlineTree {
    /// All nodes, parents before their children
    pub nodes: Vec<OutlineNode>,
    /// Top-level nodes in order
    pub roots: Vec<usize>,
}

impl OutlineTree {
    /// Children of `node` in order.
    pub fn children(&self, node: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut cursor = self.nodes[node].first;
        while let Some(i) = cursor {
            out.push(i);
            cursor = self.nodes[i].next;
        }
        out
    }
}

/// Collects outline entries and writes the outline tree.
#[derive(Debug, Clone, Default)]
pub struct OutlineBuilder {
    entries: Vec<OutlineEntry>,
}

impl OutlineBuilder {
    /// Create an empty outline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry.
    pub fn add_entry(&mut self, entry: OutlineEntry) {
        self.entries.push(entry);
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether any entry has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Link the recorded entries into a tree.
    pub fn resolve(&self) -> OutlineTree {
        let mut tree = OutlineTree::default();
        let mut pos = 0;
        tree.roots = resolve_children(&self.entries, &mut pos, None, i32::MIN, &mut tree.nodes);

        // preorder: children always follow their parent
        for i in (0..tree.nodes.len()).rev() {
            if let Some(p) = tree.nodes[i].parent {
                tree.nodes[p].descendants += 1 + tree.nodes[i].descendants;
            }
        }
        tree
    }

    /// Write the outline and return the id of its root, or `None` when
    /// there are no entries.
    pub fn flush(&self, sink: &mut dyn ObjectSink, open: bool) -> Result<Option<ObjectRef>> {
        if self.entries.is_empty() {
            return Ok(None);
        }
        let tree = self.resolve();
        let root_id = sink.allocate()?;
        let ids = tree
            .nodes
            .iter()
            .map(|_| sink.allocate())
            .collect::<Result<Vec<_>>>()?;

        let mut root = HashMap::new();
        root.insert("Type".to_string(), ObjectSerializer::name("Outlines"));
        if let (Some(&first), Some(&last)) = (tree.roots.first(), tree.roots.last()) {
            root.insert("First".to_string(), Object::Reference(ids[first]));
            root.insert("Last".to_string(), Object::Reference(ids[last]));
        }
        root.insert("Count".to_string(), Object::Integer(tree.roots.len() as i64));
        sink.write_object(root_id, &Object::Dictionary(root))?;

        for (i, node) in tree.nodes.iter().enumerate() {
            let mut dict = HashMap::new();
            dict.insert("Title".to_string(), text_string(&node.entry.title));
            let parent = node.parent.map_or(root_id, |p| ids[p]);
            dict.insert("Parent".to_string(), Object::Reference(parent));
            if let Some(prev) = node.prev {
                dict.insert("Prev".to_string(), Object::Reference(ids[prev]));
            }
            if let Some(next) = node.next {
                dict.insert("Next".to_string(), Object::Reference(ids[next]));
            }
            if let (Some(first), Some(last)) = (node.first, node.last) {
                dict.insert("First".to_string(), Object::Reference(ids[first]));
                dict.insert("Last".to_string(), Object::Reference(ids[last]));
                let count = node.descendants as i64;
                dict.insert("Count".to_string(), Object::Integer(if open { count } else { -count }));
            }
            dict.insert(
                "Dest".to_string(),
                xyz_destination(node.entry.page, node.entry.x, node.entry.y),
            );
            sink.write_object(ids[i], &Object::Dictionary(dict))?;
        }
        log::debug!("Wrote outline with {} entries", tree.nodes.len());
        Ok(Some(root_id))
    }
}

/// Take entries deeper than `parent_level` as siblings; each one adopts the
/// run of deeper entries that follows it.
fn resolve_children(
    entries: &[OutlineEntry],
    pos: &mut usize,
    parent: Option<usize>,
    parent_level: i32,
    nodes: &mut Vec<OutlineNode>,
) -> Vec<usize> {
    let mut siblings: Vec<usize> = Vec::new();
    while let Some(entry) = entries.get(*pos).filter(|e| e.level > parent_level) {
        let index = nodes.len();
        nodes.push(OutlineNode {
            entry: entry.clone(),
            parent,
            first: None,
            last: None,
            prev: siblings.last().copied(),
            next: None,
            descendants: 0,
        });
        if let Some(&prev) = siblings.last() {
            nodes[prev].next = Some(index);
        }
        *pos += 1;

        let children = resolve_children(entries, pos, Some(index), entry.level, nodes);
        nodes[index].first = children.first().copied();
        nodes[index].last = children.last().copied();
        siblings.push(index);
    }
    siblings
}
