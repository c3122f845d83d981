//! Structural invariants of the document tree.
//!
//! [`validate`] reports the first violated invariant; [`normalize`] deterministically repairs a
//! tree into a valid one. The parser and JSON import always normalize; the command engine
//! normalizes the blocks an intent touched and then validates them, rejecting the intent if
//! anything is still wrong.
//!
//! Allowed parent/child pairs:
//!
//! | parent | children |
//! |---|---|
//! | root, `Blockquote`, `ListItem`, `TableCell` | flow blocks |
//! | `List` | `ListItem` |
//! | `Table` | `TableRow` |
//! | `TableRow` | `TableCell` |
//! | `Code` | `CodeLine` |
//! | `Paragraph`, `Heading` | text leaves and inline voids |
//! | `CodeLine` | unmarked text leaves |

use crate::document::Document;
use crate::node::{Node, NodeKind};
use crate::path::Path;
use thiserror::Error;

/// A violated tree invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaViolation {
    /// The root has no children.
    #[error("document has no blocks")]
    EmptyDocument,
    /// A node appears under a parent that does not accept it.
    #[error("{child} is not allowed inside {parent} (at {path})")]
    InvalidChild {
        /// Path of the offending child.
        path: Path,
        /// Parent kind name (`"root"` for the document).
        parent: &'static str,
        /// Child kind name.
        child: &'static str,
    },
    /// A container or text block has no children.
    #[error("{kind} at {path} has no children")]
    MissingChildren {
        /// Path of the node.
        path: Path,
        /// Kind name.
        kind: &'static str,
    },
    /// A leaf has children.
    #[error("leaf {kind} at {path} has children")]
    LeafWithChildren {
        /// Path of the node.
        path: Path,
        /// Kind name.
        kind: &'static str,
    },
    /// A cell of the first table row is not flagged `title`.
    #[error("header cell at {0} is not a title cell")]
    UntitledHeaderCell(Path),
    /// Two adjacent text leaves carry identical marks.
    #[error("adjacent text leaves with identical marks at {0}")]
    UnmergedText(Path),
    /// Heading level outside `1..=5`.
    #[error("heading level {level} at {path} is out of range")]
    HeadingLevel {
        /// Path of the heading.
        path: Path,
        /// The level found.
        level: u8,
    },
    /// A code line holds marked text.
    #[error("code line text at {0} carries marks")]
    MarkedCodeText(Path),
}

fn allowed_child(parent: Option<&NodeKind>, child: &NodeKind) -> bool {
    match parent {
        None => child.is_flow_block(),
        Some(parent) if parent.is_flow_container() => child.is_flow_block(),
        Some(NodeKind::List { .. }) => matches!(child, NodeKind::ListItem { .. }),
        Some(NodeKind::Table) => matches!(child, NodeKind::TableRow),
        Some(NodeKind::TableRow) => matches!(child, NodeKind::TableCell { .. }),
        Some(NodeKind::Code { .. }) => matches!(child, NodeKind::CodeLine),
        Some(NodeKind::Paragraph | NodeKind::Heading { .. }) => child.is_inline(),
        Some(NodeKind::CodeLine) => matches!(child, NodeKind::Text { .. }),
        Some(_) => false,
    }
}

fn requires_children(kind: &NodeKind) -> bool {
    !kind.is_leaf()
}

/// Check every invariant of the whole document.
pub fn validate(document: &Document) -> Result<(), SchemaViolation> {
    if document.children().is_empty() {
        return Err(SchemaViolation::EmptyDocument);
    }
    for index in 0..document.children().len() {
        validate_block(document, index)?;
    }
    Ok(())
}

/// Check the invariants of one top-level block and its subtree.
pub fn validate_block(document: &Document, index: usize) -> Result<(), SchemaViolation> {
    let Some(block) = document.children().get(index) else {
        return Ok(());
    };
    validate_node(None, block, &mut vec![index])
}

fn validate_node(
    parent: Option<&NodeKind>,
    node: &Node,
    path: &mut Vec<usize>,
) -> Result<(), SchemaViolation> {
    let here = || Path::from(path.as_slice());

    if !allowed_child(parent, &node.kind) {
        return Err(SchemaViolation::InvalidChild {
            path: here(),
            parent: parent.map_or("root", NodeKind::name),
            child: node.kind.name(),
        });
    }
    if node.kind.is_leaf() && !node.children.is_empty() {
        return Err(SchemaViolation::LeafWithChildren {
            path: here(),
            kind: node.kind.name(),
        });
    }
    if requires_children(&node.kind) && node.children.is_empty() {
        return Err(SchemaViolation::MissingChildren {
            path: here(),
            kind: node.kind.name(),
        });
    }

    match &node.kind {
        NodeKind::Heading { level } if !(1..=5).contains(level) => {
            return Err(SchemaViolation::HeadingLevel {
                path: here(),
                level: *level,
            });
        }
        NodeKind::Table => {
            if let Some(header) = node.children.first() {
                for (c, cell) in header.children.iter().enumerate() {
                    if !matches!(cell.kind, NodeKind::TableCell { title: true, .. }) {
                        let mut cell_path = path.clone();
                        cell_path.extend([0, c]);
                        return Err(SchemaViolation::UntitledHeaderCell(Path::new(cell_path)));
                    }
                }
            }
        }
        NodeKind::CodeLine => {
            if node.children.iter().any(|c| c.marks().is_some_and(|m| !m.is_plain())) {
                return Err(SchemaViolation::MarkedCodeText(here()));
            }
        }
        _ => {}
    }

    if node.is_text_block() {
        for pair in node.children.windows(2) {
            if let (Some(a), Some(b)) = (pair[0].marks(), pair[1].marks())
                && a == b
            {
                return Err(SchemaViolation::UnmergedText(here()));
            }
        }
    }

    for (i, child) in node.children.iter().enumerate() {
        path.push(i);
        let result = validate_node(Some(&node.kind), child, path);
        path.pop();
        result?;
    }
    Ok(())
}

/// Repair the whole document.
pub fn normalize(document: &mut Document) {
    let children = std::mem::take(document.children_mut());
    *document.children_mut() = normalize_flow(children);
    if document.children().is_empty() {
        document.children_mut().push(Node::empty_paragraph());
    }
}

/// Normalize one top-level block; the result may be empty or hold several blocks.
pub fn normalize_block(block: Node) -> Vec<Node> {
    normalize_flow(vec![block])
}

/// Normalize the children of a flow container.
pub(crate) fn normalize_flow(children: Vec<Node>) -> Vec<Node> {
    let mut out = Vec::with_capacity(children.len());
    let mut inlines: Vec<Node> = Vec::new();

    let flush = |inlines: &mut Vec<Node>, out: &mut Vec<Node>| {
        if !inlines.is_empty() {
            out.push(Node::paragraph(normalize_inlines(std::mem::take(inlines))));
        }
    };

    for child in children {
        if child.is_inline() {
            inlines.push(child);
            continue;
        }
        flush(&mut inlines, &mut out);
        if child.kind.is_flow_block() {
            out.extend(normalize_node(child));
            continue;
        }
        match child.kind {
            NodeKind::CodeLine => out.extend(normalize_node(Node {
                kind: NodeKind::Paragraph,
                ..child
            })),
            NodeKind::ListItem { .. } => out.extend(normalize_node(Node::list(false, vec![child]))),
            _ => {
                tracing::debug!(kind = child.kind.name(), "unwrapping misplaced node");
                out.extend(normalize_flow(child.children));
            }
        }
    }
    flush(&mut inlines, &mut out);
    out
}

fn non_empty_flow(children: Vec<Node>) -> Vec<Node> {
    let mut children = normalize_flow(children);
    if children.is_empty() {
        children.push(Node::empty_paragraph());
    }
    children
}

fn normalize_node(mut node: Node) -> Option<Node> {
    let children = std::mem::take(&mut node.children);
    match &mut node.kind {
        NodeKind::Paragraph => node.children = normalize_inlines(children),
        NodeKind::Heading { level } => {
            *level = (*level).clamp(1, 5);
            node.children = normalize_inlines(children);
        }
        NodeKind::CodeLine => node.children = normalize_code_line(children),
        NodeKind::Code { .. } => {
            node.children = children
                .into_iter()
                .map(|child| match child.kind {
                    NodeKind::CodeLine => Node {
                        children: normalize_code_line(child.children),
                        ..child
                    },
                    _ => Node::code_line(child.plain_text()),
                })
                .collect();
            if node.children.is_empty() {
                node.children.push(Node::code_line(""));
            }
        }
        NodeKind::List { .. } => {
            node.children = children
                .into_iter()
                .map(|child| match child.kind {
                    NodeKind::ListItem { .. } => Node {
                        children: non_empty_flow(child.children),
                        ..child
                    },
                    _ => Node::list_item(non_empty_flow(vec![child])),
                })
                .collect();
            if node.children.is_empty() {
                return None;
            }
        }
        NodeKind::ListItem { .. } | NodeKind::Blockquote | NodeKind::TableCell { .. } => {
            node.children = non_empty_flow(children);
        }
        NodeKind::Table => {
            node.children = normalize_rows(children);
            if node.children.is_empty() {
                return None;
            }
        }
        NodeKind::TableRow => {
            node.children = normalize_cells(children);
            if node.children.is_empty() {
                return None;
            }
        }
        _ => {}
    }
    Some(node)
}

fn normalize_rows(children: Vec<Node>) -> Vec<Node> {
    let mut rows: Vec<Node> = Vec::with_capacity(children.len());
    for child in children {
        let row = match child.kind {
            NodeKind::TableRow => child,
            NodeKind::TableCell { .. } => Node::new(NodeKind::TableRow, vec![child]),
            _ => {
                tracing::debug!(kind = child.kind.name(), "dropping non-row table child");
                continue;
            }
        };
        rows.extend(normalize_node(row));
    }
    for (r, row) in rows.iter_mut().enumerate() {
        for cell in &mut row.children {
            if let NodeKind::TableCell { title, .. } = &mut cell.kind {
                *title = r == 0;
            }
        }
    }
    rows
}

fn normalize_cells(children: Vec<Node>) -> Vec<Node> {
    children
        .into_iter()
        .map(|child| match child.kind {
            NodeKind::TableCell { .. } => Node {
                children: non_empty_flow(child.children),
                ..child
            },
            _ => Node::new(
                NodeKind::TableCell {
                    title: false,
                    align: None,
                },
                non_empty_flow(vec![child]),
            ),
        })
        .collect()
}

fn normalize_code_line(children: Vec<Node>) -> Vec<Node> {
    if let [only] = children.as_slice()
        && only.marks().is_some_and(|m| m.is_plain())
    {
        return children;
    }
    let text: String = children.iter().map(Node::plain_text).collect();
    vec![Node::text(text)]
}

/// Merge same-mark text neighbours, drop redundant empty leaves and flatten stray blocks.
///
/// The result always holds at least one child.
pub fn normalize_inlines(children: Vec<Node>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::with_capacity(children.len());
    for mut child in children {
        if !child.is_inline() {
            child = Node::text(child.plain_text());
        }
        child.children.clear();
        if let NodeKind::Text { text, marks } = &child.kind {
            if text.is_empty() {
                continue;
            }
            if let Some(NodeKind::Text {
                text: prev_text,
                marks: prev_marks,
            }) = out.last_mut().map(|prev| &mut prev.kind)
                && prev_marks == marks
            {
                prev_text.push_str(text);
                continue;
            }
        }
        out.push(child);
    }
    if out.is_empty() {
        out.push(Node::text(""));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Mark, Marks};

    #[test]
    fn test_normalize_merges_and_seeds() {
        let mut doc = Document::new(vec![Node::paragraph(vec![
            Node::text("a"),
            Node::text(""),
            Node::text("b"),
            Node::marked_text("c", Marks::plain().with(Mark::Bold)),
        ])]);
        normalize(&mut doc);
        assert_eq!(doc.children()[0].children.len(), 2);
        assert_eq!(doc.children()[0].children[0].as_text(), Some("ab"));
        validate(&doc).unwrap();

        let mut empty = Document::new(Vec::new());
        assert_eq!(validate(&empty), Err(SchemaViolation::EmptyDocument));
        normalize(&mut empty);
        assert_eq!(empty, Document::empty());
    }

    #[test]
    fn test_stray_inline_is_wrapped() {
        let mut doc = Document::new(vec![Node::text("loose"), Node::leaf(NodeKind::Break)]);
        assert!(matches!(
            validate(&doc),
            Err(SchemaViolation::InvalidChild { parent: "root", .. })
        ));
        normalize(&mut doc);
        assert_eq!(doc.children().len(), 1);
        assert!(matches!(doc.children()[0].kind, NodeKind::Paragraph));
        validate(&doc).unwrap();
    }

    #[test]
    fn test_table_title_flags_forced() {
        let mut table = Node::table(&[vec!["a", "b"], vec!["c", "d"]], &[]);
        if let NodeKind::TableCell { title, .. } = &mut table.children[0].children[1].kind {
            *title = false;
        }
        let mut doc = Document::new(vec![table]);
        assert_eq!(
            validate(&doc),
            Err(SchemaViolation::UntitledHeaderCell(Path::from([0, 0, 1])))
        );
        normalize(&mut doc);
        validate(&doc).unwrap();
    }

    #[test]
    fn test_code_children_become_lines() {
        let code = Node::new(
            NodeKind::Code {
                language: None,
                katex: false,
                render: false,
                frontmatter: false,
            },
            vec![Node::paragraph_text("x = 1")],
        );
        let mut doc = Document::new(vec![code]);
        normalize(&mut doc);
        let code = &doc.children()[0];
        assert!(matches!(code.children[0].kind, NodeKind::CodeLine));
        assert_eq!(code.children[0].plain_text(), "x = 1");
    }
}
