//! The document tree.
//!
//! [`Document`] owns the root's children and offers path-based access and mutation. It does not
//! enforce the schema on its own; [`crate::schema`] validates and normalizes, and the command
//! engine is the only code that mutates a live document.

use crate::node::{Node, NodeId, NodeKind};
use crate::path::Path;
use crate::schema;
use thiserror::Error;

/// Errors for path-based tree access.
#[derive(Debug, Error)]
pub enum TreeError {
    /// No node exists at the path.
    #[error("no node at path {0}")]
    InvalidPath(Path),
    /// The root itself cannot be inserted, removed or replaced.
    #[error("operation not allowed on the document root")]
    Root,
    /// The persisted JSON form could not be encoded or decoded.
    #[error("invalid persisted tree: {0}")]
    Json(#[from] serde_json::Error),
}

/// A document: the root's ordered block children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    children: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::empty()
    }
}

impl Document {
    /// Create a document from top-level blocks, without normalization.
    pub fn new(children: Vec<Node>) -> Self {
        Self { children }
    }

    /// The empty document: one empty paragraph.
    pub fn empty() -> Self {
        Self::new(vec![Node::empty_paragraph()])
    }

    /// Top-level blocks.
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Mutable top-level blocks.
    pub fn children_mut(&mut self) -> &mut Vec<Node> {
        &mut self.children
    }

    /// Consume the document, returning its blocks.
    pub fn into_children(self) -> Vec<Node> {
        self.children
    }

    /// Node at `path`.
    pub fn get(&self, path: &Path) -> Option<&Node> {
        let (first, rest) = path.indices().split_first()?;
        let mut node = self.children.get(*first)?;
        for index in rest {
            node = node.children.get(*index)?;
        }
        Some(node)
    }

    /// Mutable node at `path`.
    pub fn get_mut(&mut self, path: &Path) -> Option<&mut Node> {
        let (first, rest) = path.indices().split_first()?;
        let mut node = self.children.get_mut(*first)?;
        for index in rest {
            node = node.children.get_mut(*index)?;
        }
        Some(node)
    }

    /// Kind of the node at `path`.
    pub fn kind(&self, path: &Path) -> Option<&NodeKind> {
        self.get(path).map(|node| &node.kind)
    }

    /// Children of the node at `parent` (the root's children for the root path).
    pub fn children_of(&self, parent: &Path) -> Option<&Vec<Node>> {
        if parent.is_root() {
            return Some(&self.children);
        }
        self.get(parent).map(|node| &node.children)
    }

    /// Mutable children of the node at `parent`.
    pub fn children_of_mut(&mut self, parent: &Path) -> Option<&mut Vec<Node>> {
        if parent.is_root() {
            return Some(&mut self.children);
        }
        self.get_mut(parent).map(|node| &mut node.children)
    }

    /// Insert `node` so that it ends up at `path`.
    pub fn insert(&mut self, path: &Path, node: Node) -> Result<(), TreeError> {
        let parent = path.parent().ok_or(TreeError::Root)?;
        let index = path.last_index().ok_or(TreeError::Root)?;
        let siblings = self
            .children_of_mut(&parent)
            .ok_or_else(|| TreeError::InvalidPath(path.clone()))?;
        if index > siblings.len() {
            return Err(TreeError::InvalidPath(path.clone()));
        }
        siblings.insert(index, node);
        Ok(())
    }

    /// Remove and return the node at `path`.
    pub fn remove(&mut self, path: &Path) -> Result<Node, TreeError> {
        let parent = path.parent().ok_or(TreeError::Root)?;
        let index = path.last_index().ok_or(TreeError::Root)?;
        let siblings = self
            .children_of_mut(&parent)
            .ok_or_else(|| TreeError::InvalidPath(path.clone()))?;
        if index >= siblings.len() {
            return Err(TreeError::InvalidPath(path.clone()));
        }
        Ok(siblings.remove(index))
    }

    /// Replace the node at `path`, returning the old one.
    pub fn replace(&mut self, path: &Path, node: Node) -> Result<Node, TreeError> {
        if path.is_root() {
            return Err(TreeError::Root);
        }
        let slot = self
            .get_mut(path)
            .ok_or_else(|| TreeError::InvalidPath(path.clone()))?;
        Ok(std::mem::replace(slot, node))
    }

    /// Visit every node in document order with its path.
    pub fn walk(&self, mut f: impl FnMut(&Path, &Node)) {
        fn visit(node: &Node, path: &mut Vec<usize>, f: &mut impl FnMut(&Path, &Node)) {
            f(&Path::from(path.as_slice()), node);
            for (i, child) in node.children.iter().enumerate() {
                path.push(i);
                visit(child, path, f);
                path.pop();
            }
        }
        let mut path = Vec::new();
        for (i, child) in self.children.iter().enumerate() {
            path.push(i);
            visit(child, &mut path, &mut f);
            path.pop();
        }
    }

    /// Path of the node with identity `id`.
    pub fn find_path(&self, id: NodeId) -> Option<Path> {
        fn search(nodes: &[Node], id: NodeId, path: &mut Vec<usize>) -> bool {
            for (i, node) in nodes.iter().enumerate() {
                path.push(i);
                if node.id == id || search(&node.children, id, path) {
                    return true;
                }
                path.pop();
            }
            false
        }
        let mut path = Vec::new();
        search(&self.children, id, &mut path).then(|| Path::new(path))
    }

    /// Paths of all text blocks in document order.
    pub fn text_blocks(&self) -> Vec<Path> {
        let mut out = Vec::new();
        self.walk(|path, node| {
            if node.is_text_block() {
                out.push(path.clone());
            }
        });
        out
    }

    /// Path of the first text block inside (or at) `path`.
    pub fn first_text_block_in(&self, path: &Path) -> Option<Path> {
        let mut current = path.clone();
        loop {
            let node = self.get(&current)?;
            if node.is_text_block() {
                return Some(current);
            }
            let index = node.children.iter().position(|child| !child.is_inline())?;
            current = current.child(index);
        }
    }

    /// Path of the last text block inside (or at) `path`.
    pub fn last_text_block_in(&self, path: &Path) -> Option<Path> {
        let mut current = path.clone();
        loop {
            let node = self.get(&current)?;
            if node.is_text_block() {
                return Some(current);
            }
            let index = node.children.iter().rposition(|child| !child.is_inline())?;
            current = current.child(index);
        }
    }

    /// The text block following the one at `path` in document order.
    pub fn next_text_block(&self, path: &Path) -> Option<Path> {
        let mut current = path.clone();
        loop {
            let next = current.next_sibling()?;
            if self.get(&next).is_some() {
                if let Some(found) = self.first_text_block_in(&next) {
                    return Some(found);
                }
                current = next;
                continue;
            }
            current = current.parent().filter(|p| !p.is_root())?;
        }
    }

    /// The text block preceding the one at `path` in document order.
    pub fn prev_text_block(&self, path: &Path) -> Option<Path> {
        let mut current = path.clone();
        loop {
            match current.prev_sibling() {
                Some(prev) => {
                    if let Some(found) = self.last_text_block_in(&prev) {
                        return Some(found);
                    }
                    current = prev;
                }
                None => current = current.parent().filter(|p| !p.is_root())?,
            }
        }
    }

    /// `path` itself or its nearest ancestor whose kind satisfies `pred`.
    pub fn closest(&self, path: &Path, pred: impl Fn(&NodeKind) -> bool) -> Option<Path> {
        let mut current = path.clone();
        while !current.is_root() {
            if pred(self.kind(&current)?) {
                return Some(current);
            }
            current = current.parent()?;
        }
        None
    }

    /// Kinds of the ancestors of `path`, outermost first (excluding the node itself).
    pub fn ancestor_kinds(&self, path: &Path) -> Vec<&NodeKind> {
        (1..path.len())
            .filter_map(|depth| self.kind(&path.truncated(depth)))
            .collect()
    }

    /// Export the persisted JSON form (an array of nodes).
    pub fn to_json(&self) -> Result<String, TreeError> {
        Ok(serde_json::to_string(&self.children)?)
    }

    /// Import the persisted JSON form; the result is normalized.
    pub fn from_json(json: &str) -> Result<Self, TreeError> {
        let children: Vec<Node> = serde_json::from_str(json)?;
        let mut document = Self::new(children);
        schema::normalize(&mut document);
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document::new(vec![
            Node::paragraph_text("one"),
            Node::blockquote(vec![Node::paragraph_text("two"), Node::paragraph_text("three")]),
            Node::code(None, &["a", "b"]),
        ])
    }

    #[test]
    fn test_text_block_navigation() {
        let doc = sample();
        assert_eq!(doc.next_text_block(&Path::from([0])), Some(Path::from([1, 0])));
        assert_eq!(doc.next_text_block(&Path::from([1, 1])), Some(Path::from([2, 0])));
        assert_eq!(doc.prev_text_block(&Path::from([2, 0])), Some(Path::from([1, 1])));
        assert_eq!(doc.prev_text_block(&Path::from([0])), None);
        assert_eq!(doc.next_text_block(&Path::from([2, 1])), None);
    }

    #[test]
    fn test_find_path_by_id() {
        let doc = sample();
        let id = doc.get(&Path::from([1, 1])).unwrap().id;
        assert_eq!(doc.find_path(id), Some(Path::from([1, 1])));
    }

    #[test]
    fn test_insert_remove() {
        let mut doc = sample();
        doc.insert(&Path::from([1, 0]), Node::paragraph_text("zero")).unwrap();
        assert_eq!(doc.get(&Path::from([1, 2])).unwrap().plain_text(), "three");
        let removed = doc.remove(&Path::from([0])).unwrap();
        assert_eq!(removed.plain_text(), "one");
        assert!(doc.remove(&Path::from([9])).is_err());
        assert!(matches!(doc.remove(&Path::root()), Err(TreeError::Root)));
    }

    #[test]
    fn test_json_round_trip() {
        let doc = sample();
        let json = doc.to_json().unwrap();
        assert!(json.starts_with("[{\"type\":\"paragraph\""));
        assert_eq!(Document::from_json(&json).unwrap(), doc);
    }

    #[test]
    fn test_malformed_json_keeps_decoder_error() {
        use std::error::Error as _;

        let err = Document::from_json("[{\"type\":").unwrap_err();
        assert!(matches!(err, TreeError::Json(_)));
        let source = err.source().unwrap();
        assert!(source.downcast_ref::<serde_json::Error>().unwrap().is_eof());
        assert!(err.to_string().starts_with("invalid persisted tree: "));
    }
}
