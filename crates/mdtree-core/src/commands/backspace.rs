//! Backspace: delete backwards, merge with the previous block or lift out of a container.

use super::{CaretContext, CommandError, CommandResult, EditorCore, index_of, next_sibling, parent_of};
use crate::inline;
use crate::node::{Node, NodeKind};
use crate::path::{Path, Point};
use crate::text::prev_grapheme_boundary;

impl EditorCore {
    pub(super) fn backspace(&mut self) -> Result<CommandResult, CommandError> {
        if !self.selection.is_collapsed() {
            self.delete_selection()?;
            return Ok(CommandResult::Success);
        }
        self.pending_marks = None;
        let caret = self.caret().clone();
        if caret.offset > 0 {
            return self.delete_backward(&caret);
        }

        match self.caret_context()? {
            CaretContext::TableCell => {
                let cell = self
                    .document
                    .closest(&caret.path, |kind| matches!(kind, NodeKind::TableCell { .. }));
                let first = cell.and_then(|cell| self.document.first_text_block_in(&cell));
                if first.as_ref() == Some(&caret.path) {
                    return Ok(CommandResult::Noop);
                }
                self.merge_with_previous(&caret.path)
            }
            CaretContext::Heading => {
                self.node_mut(&caret.path)?.kind = NodeKind::Paragraph;
                Ok(CommandResult::Success)
            }
            CaretContext::CodeLine => self.backspace_code_line(&caret.path),
            CaretContext::ListItem if caret.path.last_index() == Some(0) => {
                self.lift_list_item(&parent_of(&caret.path)?)
            }
            CaretContext::Blockquote if caret.path.last_index() == Some(0) => {
                self.lift_out_of_quote(&caret.path)
            }
            _ => self.merge_with_previous(&caret.path),
        }
    }

    /// Delete the grapheme (or atomic inline) before the caret.
    fn delete_backward(&mut self, caret: &Point) -> Result<CommandResult, CommandError> {
        let block = self.text_block(&caret.path)?;
        let Some(index) = inline::child_before(block, caret.offset) else {
            return Ok(CommandResult::Noop);
        };
        let (span_start, span_end) = inline::child_spans(block)[index];
        let child = &block.children[index];
        let atomic = child.is_inline_void() || child.marks().is_some_and(|m| m.footnote_ref);
        let (start, end) = match child.as_text() {
            Some(text) if !atomic => (
                span_start + prev_grapheme_boundary(text, caret.offset - span_start),
                caret.offset,
            ),
            _ => (span_start, span_end),
        };
        inline::delete_range(self.node_mut(&caret.path)?, start, end);
        self.set_caret(caret.path.clone(), start);
        Ok(CommandResult::Success)
    }

    fn backspace_code_line(&mut self, path: &Path) -> Result<CommandResult, CommandError> {
        let code = parent_of(path)?;
        let index = index_of(path)?;
        if index > 0 {
            let prev = code.child(index - 1);
            let offset = self.node(&prev)?.content_len();
            let line = self.remove_node(path)?;
            self.append_block_content(&prev, line)?;
            self.set_caret(prev, offset);
            return Ok(CommandResult::Success);
        }

        let all_empty = self
            .node(&code)?
            .children
            .iter()
            .all(|line| line.content_len() == 0);
        if !all_empty {
            return Ok(CommandResult::Noop);
        }
        self.replace_node(&code, Node::empty_paragraph())?;
        self.set_caret(code, 0);
        Ok(CommandResult::Success)
    }

    /// Move the list item at `item` one level out.
    ///
    /// A nested item becomes an item of the parent list right after the enclosing item, taking
    /// its following siblings along as a sublist. A top-level item is dissolved: its blocks land
    /// between the items before it and a new list holding the items after it.
    pub(super) fn lift_list_item(&mut self, item: &Path) -> Result<CommandResult, CommandError> {
        let saved = self.save_selection();
        let list = parent_of(item)?;
        let index = index_of(item)?;
        let (ordered, start) = match self.kind(&list) {
            Some(NodeKind::List { ordered, start }) => (*ordered, *start),
            _ => return Err(CommandError::InvalidPath(list)),
        };
        let outer = parent_of(&list)?;
        let nested = matches!(self.kind(&outer), Some(NodeKind::ListItem { .. }));

        let count = self.document.children_of(&list).map_or(0, Vec::len);
        let mut later = Vec::with_capacity(count.saturating_sub(index + 1));
        for _ in index + 1..count {
            later.push(self.remove_node(&list.child(index + 1))?);
        }
        let removed = self.remove_node(item)?;
        let list_is_empty = self.document.children_of(&list).is_some_and(Vec::is_empty);

        if nested {
            let mut children = removed.children;
            if !later.is_empty() {
                children.push(Node::new(NodeKind::List { ordered, start: None }, later));
            }
            if list_is_empty {
                self.remove_node(&list)?;
            }
            let after = next_sibling(&outer)?;
            self.insert_node(&after, Node::new(removed.kind, children))?;
        } else {
            let mut insert_at = next_sibling(&list)?;
            if list_is_empty {
                self.remove_node(&list)?;
                insert_at = list.clone();
            }
            let lifted = removed.children.len();
            for block in removed.children.into_iter().rev() {
                self.insert_node(&insert_at, block)?;
            }
            if !later.is_empty() {
                let start = ordered
                    .then(|| start.unwrap_or(1) + index as u64 + 1)
                    .filter(|start| *start != 1);
                let rest_at = insert_at
                    .with_last(insert_at.last_index().unwrap_or(0) + lifted)
                    .ok_or_else(|| CommandError::InvalidPath(insert_at.clone()))?;
                self.insert_node(&rest_at, Node::new(NodeKind::List { ordered, start }, later))?;
            }
        }
        self.restore_selection(saved);
        Ok(CommandResult::Success)
    }

    /// Move the first child of a blockquote in front of it; an emptied quote disappears.
    fn lift_out_of_quote(&mut self, path: &Path) -> Result<CommandResult, CommandError> {
        let quote = parent_of(path)?;
        let block = self.remove_node(path)?;
        if self.document.children_of(&quote).is_some_and(Vec::is_empty) {
            self.remove_node(&quote)?;
        }
        self.insert_node(&quote, block)?;
        self.set_caret(quote, 0);
        Ok(CommandResult::Success)
    }

    /// Join the block at `path` with whatever precedes it.
    fn merge_with_previous(&mut self, path: &Path) -> Result<CommandResult, CommandError> {
        let Some(prev) = path.prev_sibling() else {
            return Ok(CommandResult::Noop);
        };
        let Some(prev_kind) = self.kind(&prev).cloned() else {
            return Ok(CommandResult::Noop);
        };

        match prev_kind {
            NodeKind::Paragraph | NodeKind::Heading { .. } => {
                let offset = self.node(&prev)?.content_len();
                let block = self.remove_node(path)?;
                self.append_block_content(&prev, block)?;
                self.set_caret(prev, offset);
            }
            kind if kind.is_block_void() => {
                self.remove_node(&prev)?;
                self.set_caret(prev, 0);
            }
            _ => {
                let Some(target) = self.document.last_text_block_in(&prev) else {
                    return Ok(CommandResult::Noop);
                };
                let offset = self.node(&target)?.content_len();
                let block = self.remove_node(path)?;
                if block.content_len() > 0 {
                    self.append_block_content(&target, block)?;
                }
                self.set_caret(target, offset);
            }
        }
        Ok(CommandResult::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Command, CommandExecutor, CommandResult, CursorCommand, EditCommand};
    use crate::config::EngineConfig;
    use crate::document::Document;
    use crate::node::Node;
    use crate::path::{Point, Selection};

    fn backspace_at(blocks: Vec<Node>, point: Point) -> (CommandExecutor, CommandResult) {
        let mut ex = CommandExecutor::new(Document::new(blocks), EngineConfig::default());
        ex.execute(Command::Cursor(CursorCommand::SetSelection {
            selection: Selection::caret(point),
        }))
        .unwrap();
        let result = ex.execute(Command::Edit(EditCommand::Backspace)).unwrap();
        (ex, result)
    }

    #[test]
    fn test_deletes_whole_grapheme() {
        let (ex, _) = backspace_at(vec![Node::paragraph_text("ae\u{301}")], Point::new([0], 3));
        assert_eq!(ex.document().children()[0].block_text(), "a");
        assert_eq!(ex.editor().caret(), &Point::new([0], 1));
    }

    #[test]
    fn test_merges_into_previous_paragraph() {
        let (ex, _) = backspace_at(
            vec![Node::paragraph_text("one"), Node::paragraph_text("two")],
            Point::new([1], 0),
        );
        assert_eq!(ex.document().children(), &[Node::paragraph_text("onetwo")]);
        assert_eq!(ex.editor().caret(), &Point::new([0], 3));
    }

    #[test]
    fn test_first_cell_block_is_noop() {
        let table = Node::table(&[vec!["a", "b"]], &[]);
        let (ex, result) = backspace_at(vec![table.clone()], Point::new([0, 0, 1, 0], 0));
        assert_eq!(result, CommandResult::Noop);
        assert_eq!(ex.document().children(), &[table]);
    }
}
