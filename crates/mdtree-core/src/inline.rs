//! Offset-based editing of a text block's inline content.
//!
//! Offsets count chars of text leaves plus one per inline void. Every mutating helper leaves the
//! block's children normalized (see [`normalize_inlines`]).

use crate::node::{Marks, Node, NodeKind};
use crate::schema::normalize_inlines;
use crate::text::char_to_byte;

/// Split the leaf that straddles `offset` so a child boundary falls exactly there.
///
/// Returns the index of the first child at or after `offset`.
pub(crate) fn split_children_at(children: &mut Vec<Node>, offset: usize) -> usize {
    let mut pos = 0;
    for i in 0..children.len() {
        if offset <= pos {
            return i;
        }
        let len = children[i].inline_len();
        if offset < pos + len
            && let NodeKind::Text { text, marks } = &mut children[i].kind
        {
            let tail = text.split_off(char_to_byte(text, offset - pos));
            let marks = marks.clone();
            children.insert(i + 1, Node::marked_text(tail, marks));
            return i + 1;
        }
        pos += len;
    }
    children.len()
}

/// `(start, end)` caret span of each child.
pub fn child_spans(block: &Node) -> Vec<(usize, usize)> {
    let mut pos = 0;
    block
        .children
        .iter()
        .map(|child| {
            let start = pos;
            pos += child.inline_len();
            (start, pos)
        })
        .collect()
}

/// Index of the child covering the char just before `offset`.
pub fn child_before(block: &Node, offset: usize) -> Option<usize> {
    if offset == 0 {
        return None;
    }
    child_spans(block)
        .iter()
        .position(|(start, end)| *start < offset && offset <= *end)
}

/// Index of the child covering the char at `offset`.
pub fn child_after(block: &Node, offset: usize) -> Option<usize> {
    child_spans(block)
        .iter()
        .position(|(start, end)| *start <= offset && offset < *end)
}

/// Marks that text typed at `offset` should carry.
pub fn marks_at(block: &Node, offset: usize) -> Marks {
    let index = child_before(block, offset).or_else(|| child_after(block, offset));
    index
        .and_then(|i| block.children[i].marks())
        .map(Marks::for_continuation)
        .unwrap_or_default()
}

/// Insert `text` at `offset` with `marks`.
pub fn insert_text(block: &mut Node, offset: usize, text: &str, marks: Marks) {
    if text.is_empty() {
        return;
    }
    insert_inline(block, offset, Node::marked_text(text, marks));
}

/// Insert an inline node (text leaf or void) at `offset`.
pub fn insert_inline(block: &mut Node, offset: usize, node: Node) {
    let mut children = std::mem::take(&mut block.children);
    let index = split_children_at(&mut children, offset);
    children.insert(index, node);
    block.children = normalize_inlines(children);
}

/// Remove `[start, end)` and return the removed inline nodes.
pub fn delete_range(block: &mut Node, start: usize, end: usize) -> Vec<Node> {
    if start >= end {
        return Vec::new();
    }
    let mut children = std::mem::take(&mut block.children);
    let from = split_children_at(&mut children, start);
    let to = split_children_at(&mut children, end);
    let removed: Vec<Node> = children.drain(from..to).collect();
    block.children = normalize_inlines(children);
    removed
}

/// Cut everything from `offset` on, returning it as a normalized inline list.
pub fn split_off(block: &mut Node, offset: usize) -> Vec<Node> {
    let mut children = std::mem::take(&mut block.children);
    let index = split_children_at(&mut children, offset);
    let tail = children.split_off(index);
    block.children = normalize_inlines(children);
    normalize_inlines(tail)
}

/// Append inline nodes to the end of the block.
pub fn append(block: &mut Node, inlines: Vec<Node>) {
    let mut children = std::mem::take(&mut block.children);
    children.extend(inlines);
    block.children = normalize_inlines(children);
}

/// Apply `f` to the marks of every text leaf within `[start, end)`.
pub fn update_marks(block: &mut Node, start: usize, end: usize, f: impl Fn(&mut Marks)) {
    if start >= end {
        return;
    }
    let mut children = std::mem::take(&mut block.children);
    let from = split_children_at(&mut children, start);
    let to = split_children_at(&mut children, end);
    for child in &mut children[from..to] {
        if let NodeKind::Text { marks, .. } = &mut child.kind {
            f(marks);
        }
    }
    block.children = normalize_inlines(children);
}

/// Start offset of the run of same-mark text that ends at `offset`, with the run's marks.
///
/// A run is the part of a single text leaf before the caret. Returns `(offset, plain)` when the
/// caret follows a void or sits at the block start.
pub fn run_before(block: &Node, offset: usize) -> (usize, Marks) {
    let spans = child_spans(block);
    match child_before(block, offset) {
        Some(i) => match block.children[i].marks() {
            Some(marks) => (spans[i].0, marks.clone()),
            None => (offset, Marks::plain()),
        },
        None => (offset, Marks::plain()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Mark;

    fn bold(text: &str) -> Node {
        Node::marked_text(text, Marks::plain().with(Mark::Bold))
    }

    #[test]
    fn test_insert_merges_with_neighbour() {
        let mut p = Node::paragraph_text("helo");
        insert_text(&mut p, 3, "l", Marks::plain());
        assert_eq!(p.children.len(), 1);
        assert_eq!(p.plain_text(), "hello");
    }

    #[test]
    fn test_insert_with_marks_splits_leaf() {
        let mut p = Node::paragraph_text("ab");
        insert_text(&mut p, 1, "X", Marks::plain().with(Mark::Bold));
        assert_eq!(p.children.len(), 3);
        assert_eq!(p.children[1], bold("X"));
    }

    #[test]
    fn test_delete_across_leaves() {
        let mut p = Node::paragraph(vec![Node::text("ab"), bold("cd"), Node::text("ef")]);
        let removed = delete_range(&mut p, 1, 5);
        assert_eq!(removed.len(), 3);
        assert_eq!(p.children, vec![Node::text("af")]);
    }

    #[test]
    fn test_split_off_keeps_at_least_one_child() {
        let mut p = Node::paragraph(vec![Node::text("ab"), bold("cd")]);
        let tail = split_off(&mut p, 0);
        assert_eq!(p.children, vec![Node::text("")]);
        assert_eq!(tail.len(), 2);
    }

    #[test]
    fn test_marks_at_and_run_before() {
        let p = Node::paragraph(vec![Node::text("ab"), bold("cd")]);
        assert!(marks_at(&p, 4).bold);
        assert!(!marks_at(&p, 2).bold);
        assert!(!marks_at(&p, 0).bold);
        assert_eq!(run_before(&p, 3).0, 2);
    }
}
