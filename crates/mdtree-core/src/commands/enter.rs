//! Enter: split, continue or escape the enclosing block.

use super::{CaretContext, CommandError, CommandResult, EditorCore, index_of, next_sibling, parent_of};
use crate::inline;
use crate::node::{Node, NodeKind};
use crate::path::{Path, Point};
use crate::text::{char_prefix, leading_whitespace};
use mdtree_lang::language_config;

impl EditorCore {
    pub(super) fn enter(&mut self, mod_key: bool) -> Result<CommandResult, CommandError> {
        if !self.selection.is_collapsed() {
            self.delete_selection()?;
        }
        self.pending_marks = None;
        let caret = self.caret().clone();
        match self.caret_context()? {
            CaretContext::CodeLine if mod_key => self.leave_code_block(&caret),
            CaretContext::CodeLine => self.enter_code_line(&caret),
            CaretContext::TableCell if mod_key => self.insert_break(&caret),
            CaretContext::TableCell => self.enter_table_cell(&caret),
            CaretContext::Heading => self.enter_heading(&caret),
            _ if mod_key => self.insert_break(&caret),
            CaretContext::ListItem => self.enter_list_item(&caret),
            CaretContext::Blockquote => self.enter_blockquote(&caret),
            CaretContext::Paragraph => self.split_block(&caret),
        }
    }

    fn insert_break(&mut self, caret: &Point) -> Result<CommandResult, CommandError> {
        let block = self.node_mut(&caret.path)?;
        inline::insert_inline(block, caret.offset, Node::leaf(NodeKind::Break));
        self.set_caret(caret.path.clone(), caret.offset + 1);
        Ok(CommandResult::Success)
    }

    /// Move everything after the caret into a new paragraph.
    fn split_block(&mut self, caret: &Point) -> Result<CommandResult, CommandError> {
        let tail = inline::split_off(self.node_mut(&caret.path)?, caret.offset);
        let after = next_sibling(&caret.path)?;
        self.insert_node(&after, Node::paragraph(tail))?;
        self.set_caret(after, 0);
        Ok(CommandResult::Success)
    }

    fn leave_code_block(&mut self, caret: &Point) -> Result<CommandResult, CommandError> {
        let code = parent_of(&caret.path)?;
        let after = next_sibling(&code)?;
        self.insert_node(&after, Node::empty_paragraph())?;
        self.set_caret(after, 0);
        Ok(CommandResult::Success)
    }

    fn enter_code_line(&mut self, caret: &Point) -> Result<CommandResult, CommandError> {
        let code = parent_of(&caret.path)?;
        let language = match self.kind(&code) {
            Some(NodeKind::Code { language, .. }) => language.clone(),
            _ => None,
        };
        let lang = language_config(language.as_deref());

        let line = self.node(&caret.path)?.block_text();
        let before = char_prefix(&line, caret.offset);
        let mut indent = leading_whitespace(before).to_string();
        if before
            .trim_end()
            .chars()
            .next_back()
            .is_some_and(|ch| lang.is_open_bracket(ch))
        {
            indent.push_str(&self.config.indent_unit);
        }

        let tail = inline::split_off(self.node_mut(&caret.path)?, caret.offset);
        let mut new_line = Node::code_line(indent.clone());
        inline::append(&mut new_line, tail);
        let after = next_sibling(&caret.path)?;
        self.insert_node(&after, new_line)?;
        self.set_caret(after, indent.chars().count());
        Ok(CommandResult::Success)
    }

    fn enter_table_cell(&mut self, caret: &Point) -> Result<CommandResult, CommandError> {
        let cell = self
            .document
            .closest(&caret.path, |kind| matches!(kind, NodeKind::TableCell { .. }))
            .ok_or_else(|| CommandError::InvalidPath(caret.path.clone()))?;
        let row = parent_of(&cell)?;
        let table = parent_of(&row)?;
        let column = index_of(&cell)?;
        let row_index = index_of(&row)?;
        let row_count = self.document.children_of(&table).map_or(0, Vec::len);

        if row_index + 1 < row_count {
            let next_row = table.child(row_index + 1);
            return self.move_into_cell(&next_row, column);
        }

        let last_row = self.node(&row)?;
        if row_index > 0 && last_row.children.iter().all(is_blank) {
            self.remove_node(&row)?;
            let after = next_sibling(&table)?;
            self.insert_node(&after, Node::empty_paragraph())?;
            self.set_caret(after, 0);
            return Ok(CommandResult::Success);
        }

        let aligns: Vec<_> = self
            .document
            .get(&table.child(0))
            .map(|header| {
                header
                    .children
                    .iter()
                    .map(|cell| match cell.kind {
                        NodeKind::TableCell { align, .. } => align,
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let cells = aligns
            .iter()
            .map(|align| Node::table_cell("", false, *align))
            .collect();
        let new_row = next_sibling(&row)?;
        self.insert_node(&new_row, Node::new(NodeKind::TableRow, cells))?;
        self.move_into_cell(&new_row, column)
    }

    /// Put the caret at the end of the first text block of the `column`-th cell of `row`.
    pub(super) fn move_into_cell(
        &mut self,
        row: &Path,
        column: usize,
    ) -> Result<CommandResult, CommandError> {
        let cells = self.document.children_of(row).map_or(0, Vec::len);
        let cell = row.child(column.min(cells.saturating_sub(1)));
        let block = self
            .document
            .first_text_block_in(&cell)
            .ok_or_else(|| CommandError::InvalidPath(cell.clone()))?;
        let offset = self.node(&block)?.content_len();
        self.set_caret(block, offset);
        Ok(CommandResult::Success)
    }

    fn enter_heading(&mut self, caret: &Point) -> Result<CommandResult, CommandError> {
        if caret.offset == 0 && self.node(&caret.path)?.content_len() > 0 {
            self.insert_node(&caret.path, Node::empty_paragraph())?;
            self.set_caret(next_sibling(&caret.path)?, 0);
            return Ok(CommandResult::Success);
        }
        self.split_block(caret)
    }

    fn enter_list_item(&mut self, caret: &Point) -> Result<CommandResult, CommandError> {
        let item = parent_of(&caret.path)?;
        let item_node = self.node(&item)?;
        let sole_empty = item_node.children.len() == 1
            && self.node(&caret.path)?.is_empty_text_block();
        if sole_empty {
            return self.lift_list_item(&item);
        }
        if caret.path.last_index() != Some(0) {
            return self.split_block(caret);
        }

        let checked = match item_node.kind {
            NodeKind::ListItem { checked: Some(_) } => Some(false),
            _ => None,
        };
        let tail = inline::split_off(self.node_mut(&caret.path)?, caret.offset);
        let new_item = Node::new(NodeKind::ListItem { checked }, vec![Node::paragraph(tail)]);
        let after = next_sibling(&item)?;
        self.insert_node(&after, new_item)?;
        self.set_caret(after.child(0), 0);
        Ok(CommandResult::Success)
    }

    fn enter_blockquote(&mut self, caret: &Point) -> Result<CommandResult, CommandError> {
        if !self.node(&caret.path)?.is_empty_text_block() {
            return self.split_block(caret);
        }
        let quote = parent_of(&caret.path)?;
        let index = index_of(&caret.path)?;
        let count = self.document.children_of(&quote).map_or(0, Vec::len);
        let mut later = Vec::with_capacity(count.saturating_sub(index + 1));
        for _ in index + 1..count {
            later.push(self.remove_node(&quote.child(index + 1))?);
        }
        let paragraph = self.remove_node(&caret.path)?;

        let mut insert_at = next_sibling(&quote)?;
        if self.document.children_of(&quote).is_some_and(Vec::is_empty) {
            self.remove_node(&quote)?;
            insert_at = quote.clone();
        }
        self.insert_node(&insert_at, paragraph)?;
        if !later.is_empty() {
            self.insert_node(&next_sibling(&insert_at)?, Node::blockquote(later))?;
        }
        self.set_caret(insert_at, 0);
        Ok(CommandResult::Success)
    }
}

/// A subtree whose text blocks are all empty.
pub(super) fn is_blank(node: &Node) -> bool {
    if node.is_text_block() {
        return node.content_len() == 0;
    }
    if node.kind.is_leaf() {
        return false;
    }
    node.children.iter().all(is_blank)
}

#[cfg(test)]
mod tests {
    use super::super::{Command, CommandExecutor, CursorCommand, EditCommand};
    use crate::config::EngineConfig;
    use crate::document::Document;
    use crate::node::{Node, NodeKind};
    use crate::path::{Point, Selection};

    fn executor(blocks: Vec<Node>, point: Point) -> CommandExecutor {
        let mut executor = CommandExecutor::new(Document::new(blocks), EngineConfig::default());
        executor
            .execute(Command::Cursor(CursorCommand::SetSelection {
                selection: Selection::caret(point),
            }))
            .unwrap();
        executor
    }

    fn enter(executor: &mut CommandExecutor) {
        executor
            .execute(Command::Edit(EditCommand::Enter { mod_key: false }))
            .unwrap();
    }

    #[test]
    fn test_code_line_indents_after_open_bracket() {
        let mut ex = executor(
            vec![Node::code(Some("rust"), &["    foo[bar]"])],
            Point::new([0, 0], 8),
        );
        enter(&mut ex);
        let code = &ex.document().children()[0];
        assert_eq!(code.children[0].block_text(), "    foo[");
        assert_eq!(code.children[1].block_text(), "    \tbar]");
        assert_eq!(ex.editor().caret(), &Point::new([0, 1], 5));
    }

    #[test]
    fn test_empty_last_item_escapes_list() {
        let list = Node::list(
            false,
            vec![
                Node::list_item(vec![Node::paragraph_text("a")]),
                Node::list_item(vec![Node::empty_paragraph()]),
            ],
        );
        let mut ex = executor(vec![list], Point::new([0, 1, 0], 0));
        enter(&mut ex);
        let children = ex.document().children();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].children.len(), 1);
        assert_eq!(children[1], Node::empty_paragraph());
        assert_eq!(ex.editor().caret(), &Point::new([1], 0));
    }

    #[test]
    fn test_enter_in_last_table_row_appends_row() {
        let table = Node::table(&[vec!["a", "b"], vec!["c", "d"]], &[]);
        let mut ex = executor(vec![table], Point::new([0, 1, 1, 0], 1));
        enter(&mut ex);
        let table = &ex.document().children()[0];
        assert_eq!(table.children.len(), 3);
        assert!(matches!(
            table.children[2].children[1].kind,
            NodeKind::TableCell { title: false, .. }
        ));
        assert_eq!(ex.editor().caret(), &Point::new([0, 2, 1, 0], 0));

        // A second Enter in the empty row leaves the table.
        enter(&mut ex);
        let children = ex.document().children();
        assert_eq!(children[0].children.len(), 2);
        assert_eq!(children[1], Node::empty_paragraph());
    }
}
