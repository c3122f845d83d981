//! Arrow-key caret movement.

use super::{ArrowKey, CommandError, CommandResult, EditorCore, index_of, next_sibling, parent_of};
use crate::inline;
use crate::node::{Node, NodeKind};
use crate::path::{Path, Point, Selection};
use crate::text::{next_grapheme_boundary, prev_grapheme_boundary};

/// Inline children the caret steps over in one move.
fn is_atomic(child: &Node) -> bool {
    child.is_inline_void() || child.marks().is_some_and(|marks| marks.footnote_ref)
}

impl EditorCore {
    pub(super) fn arrow(&mut self, key: ArrowKey, extend: bool) -> Result<CommandResult, CommandError> {
        self.pending_marks = None;
        if !self.selection.is_collapsed() && !extend {
            let (start, end) = self.selection.ordered();
            let point = match key {
                ArrowKey::Left | ArrowKey::Up => start.clone(),
                ArrowKey::Right | ArrowKey::Down => end.clone(),
            };
            self.selection = Selection::caret(point);
            return Ok(CommandResult::Success);
        }

        let focus = self.selection.focus.clone();
        self.check_point(&focus)?;
        let target = match key {
            ArrowKey::Left => self.step_left(&focus)?,
            ArrowKey::Right => self.step_right(&focus)?,
            ArrowKey::Up => self.step_vertical(&focus, false)?,
            ArrowKey::Down => self.step_vertical(&focus, true)?,
        };
        let Some(target) = target else {
            return Ok(CommandResult::Noop);
        };
        if extend {
            self.selection.focus = target;
        } else {
            self.selection = Selection::caret(target);
        }
        Ok(CommandResult::Success)
    }

    fn end_of(&self, path: Path) -> Result<Point, CommandError> {
        let offset = self.node(&path)?.content_len();
        Ok(Point { path, offset })
    }

    fn step_left(&self, point: &Point) -> Result<Option<Point>, CommandError> {
        let block = self.text_block(&point.path)?;
        let Some(index) = inline::child_before(block, point.offset) else {
            return self
                .document
                .prev_text_block(&point.path)
                .map(|path| self.end_of(path))
                .transpose();
        };
        let (start, _) = inline::child_spans(block)[index];
        let child = &block.children[index];
        let offset = match child.as_text() {
            Some(text) if !is_atomic(child) => {
                start + prev_grapheme_boundary(text, point.offset - start)
            }
            _ => start,
        };
        Ok(Some(Point::new(point.path.clone(), offset)))
    }

    fn step_right(&self, point: &Point) -> Result<Option<Point>, CommandError> {
        let block = self.text_block(&point.path)?;
        let Some(index) = inline::child_after(block, point.offset) else {
            return Ok(self
                .document
                .next_text_block(&point.path)
                .map(|path| Point { path, offset: 0 }));
        };
        let (start, end) = inline::child_spans(block)[index];
        let child = &block.children[index];
        let offset = match child.as_text() {
            Some(text) if !is_atomic(child) => {
                start + next_grapheme_boundary(text, point.offset - start)
            }
            _ => end,
        };
        Ok(Some(Point::new(point.path.clone(), offset)))
    }

    /// Up/Down: same column in tables, otherwise the neighbouring text block.
    fn step_vertical(&mut self, point: &Point, down: bool) -> Result<Option<Point>, CommandError> {
        let clamp = |this: &Self, path: Path| -> Result<Point, CommandError> {
            let len = this.node(&path)?.content_len();
            Ok(Point {
                path,
                offset: point.offset.min(len),
            })
        };

        let neighbour = match self
            .document
            .closest(&point.path, |kind| matches!(kind, NodeKind::TableCell { .. }))
        {
            Some(cell) => self.vertical_in_table(point, &cell, down)?,
            None if down => self.document.next_text_block(&point.path),
            None => self.document.prev_text_block(&point.path),
        };
        if let Some(path) = neighbour {
            return clamp(self, path).map(Some);
        }

        let top = point.path.truncated(1);
        let enterable = matches!(
            self.kind(&top),
            Some(NodeKind::Paragraph | NodeKind::Heading { .. })
        );
        if down && !enterable {
            // Code blocks and tables at the end of the document get a paragraph to escape into.
            let after = next_sibling(&top)?;
            self.insert_node(&after, Node::empty_paragraph())?;
            return Ok(Some(Point { path: after, offset: 0 }));
        }

        let edge = if down {
            self.end_of(point.path.clone())?
        } else {
            Point::new(point.path.clone(), 0)
        };
        Ok((edge != *point).then_some(edge))
    }

    fn vertical_in_table(
        &self,
        point: &Point,
        cell: &Path,
        down: bool,
    ) -> Result<Option<Path>, CommandError> {
        let within_cell = if down {
            self.document.next_text_block(&point.path)
        } else {
            self.document.prev_text_block(&point.path)
        }
        .filter(|path| cell.is_ancestor_of(path));
        if within_cell.is_some() {
            return Ok(within_cell);
        }

        let row = parent_of(cell)?;
        let table = parent_of(&row)?;
        let column = index_of(cell)?;
        let row_index = index_of(&row)?;
        let rows = self.document.children_of(&table).map_or(0, Vec::len);
        let target_row = if down {
            (row_index + 1 < rows).then(|| row_index + 1)
        } else {
            row_index.checked_sub(1)
        };

        Ok(match target_row {
            Some(target) => {
                let row = table.child(target);
                let columns = self.document.children_of(&row).map_or(0, Vec::len);
                let cell = row.child(column.min(columns.saturating_sub(1)));
                if down {
                    self.document.first_text_block_in(&cell)
                } else {
                    self.document.last_text_block_in(&cell)
                }
            }
            None if down => self.document.next_text_block(&table),
            None => self.document.prev_text_block(&table),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::{ArrowKey, Command, CommandExecutor, CursorCommand};
    use crate::config::EngineConfig;
    use crate::document::Document;
    use crate::node::{Marks, Node, NodeKind};
    use crate::path::{Point, Selection};

    fn at(blocks: Vec<Node>, point: Point) -> CommandExecutor {
        let mut ex = CommandExecutor::new(Document::new(blocks), EngineConfig::default());
        ex.execute(Command::Cursor(CursorCommand::SetSelection {
            selection: Selection::caret(point),
        }))
        .unwrap();
        ex
    }

    fn press(ex: &mut CommandExecutor, key: ArrowKey) {
        ex.execute(Command::Cursor(CursorCommand::Arrow { key, extend: false }))
            .unwrap();
    }

    #[test]
    fn test_steps_over_voids_and_footnotes() {
        let footnote = Marks {
            footnote_ref: true,
            ..Marks::plain()
        };
        let paragraph = Node::paragraph(vec![
            Node::text("a"),
            Node::leaf(NodeKind::InlineMath {
                value: "x".to_string(),
            }),
            Node::marked_text("note", footnote),
        ]);
        let mut ex = at(vec![paragraph], Point::new([0], 1));
        press(&mut ex, ArrowKey::Right);
        assert_eq!(ex.editor().caret(), &Point::new([0], 2));
        press(&mut ex, ArrowKey::Right);
        assert_eq!(ex.editor().caret(), &Point::new([0], 6));
        press(&mut ex, ArrowKey::Left);
        assert_eq!(ex.editor().caret(), &Point::new([0], 2));
    }

    #[test]
    fn test_down_from_trailing_code_adds_paragraph() {
        let mut ex = at(vec![Node::code(None, &["x"])], Point::new([0, 0], 1));
        press(&mut ex, ArrowKey::Down);
        assert_eq!(ex.document().children().len(), 2);
        assert_eq!(ex.editor().caret(), &Point::new([1], 0));
    }

    #[test]
    fn test_up_down_keep_table_column() {
        let table = Node::table(&[vec!["ab", "cd"], vec!["e", "f"]], &[]);
        let mut ex = at(vec![table], Point::new([0, 0, 1, 0], 2));
        press(&mut ex, ArrowKey::Down);
        assert_eq!(ex.editor().caret(), &Point::new([0, 1, 1, 0], 1));
        press(&mut ex, ArrowKey::Up);
        assert_eq!(ex.editor().caret(), &Point::new([0, 0, 1, 0], 1));
    }
}
