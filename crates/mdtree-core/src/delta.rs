//! Structured change notifications.
//!
//! Instead of letting derived caches observe the tree, the command engine reports which nodes a
//! committed intent touched. Consumers (the memoizing serializer, the decoration cache, a host's
//! renderer) drop exactly the entries keyed by those ids.
//!
//! A touched node always comes with all of its ancestors, so a cache keyed by a top-level block
//! or by a code block sees the change even when only a leaf deep inside was edited.

use crate::document::Document;
use crate::node::NodeId;
use crate::path::Path;
use std::collections::HashSet;

/// The set of nodes changed by one or more committed intents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Ids of touched nodes (including ancestors and removed subtrees).
    pub nodes: HashSet<NodeId>,
    /// Everything may have changed (undo/redo, document replacement).
    pub full: bool,
}

impl ChangeSet {
    /// An empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// A change set that invalidates everything.
    pub fn full() -> Self {
        Self {
            nodes: HashSet::new(),
            full: true,
        }
    }

    /// Returns `true` if nothing changed.
    pub fn is_empty(&self) -> bool {
        !self.full && self.nodes.is_empty()
    }

    /// Returns `true` if `id` may have changed.
    pub fn contains(&self, id: NodeId) -> bool {
        self.full || self.nodes.contains(&id)
    }

    /// Record a single id.
    pub fn insert(&mut self, id: NodeId) {
        self.nodes.insert(id);
    }

    /// Record the node at `path` and all of its ancestors.
    pub fn touch(&mut self, document: &Document, path: &Path) {
        for depth in 1..=path.len() {
            if let Some(node) = document.get(&path.truncated(depth)) {
                self.nodes.insert(node.id);
            }
        }
    }

    /// Merge another change set into this one.
    pub fn merge(&mut self, other: ChangeSet) {
        self.full |= other.full;
        self.nodes.extend(other.nodes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    #[test]
    fn test_touch_records_ancestors() {
        let doc = Document::new(vec![Node::blockquote(vec![Node::paragraph_text("x")])]);
        let mut changes = ChangeSet::new();
        changes.touch(&doc, &Path::from([0, 0]));
        assert!(changes.contains(doc.children()[0].id));
        assert!(changes.contains(doc.children()[0].children[0].id));
        assert!(!changes.contains(doc.children()[0].children[0].children[0].id));
        assert!(ChangeSet::full().contains(NodeId::fresh()));
    }
}
