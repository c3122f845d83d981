//! Tab and Shift+Tab.

use super::{CaretContext, CommandError, CommandResult, EditorCore, index_of, parent_of};
use crate::inline;
use crate::node::{Node, NodeKind};
use crate::path::{Path, Point};

/// Leading spaces Shift+Tab removes from a code line indented with spaces.
const SPACE_TAB_STOP: usize = 4;

impl EditorCore {
    pub(super) fn tab(&mut self, shift: bool) -> Result<CommandResult, CommandError> {
        if !self.selection.is_collapsed() {
            if shift {
                return Ok(CommandResult::Noop);
            }
            tracing::debug!("tab over a selection, inserting a literal tab");
            self.delete_selection()?;
            return self.insert_plain("\t");
        }

        let caret = self.caret().clone();
        match self.caret_context()? {
            CaretContext::TableCell => self.tab_table_cell(&caret, shift),
            CaretContext::CodeLine if shift => self.outdent_code_line(&caret),
            CaretContext::ListItem if caret.path.last_index() == Some(0) => {
                let item = parent_of(&caret.path)?;
                if shift {
                    self.lift_list_item(&item)
                } else {
                    self.indent_list_item(&item)
                }
            }
            _ if shift => Ok(CommandResult::Noop),
            _ => self.insert_plain("\t"),
        }
    }

    fn tab_table_cell(&mut self, caret: &Point, shift: bool) -> Result<CommandResult, CommandError> {
        let cell = self
            .document
            .closest(&caret.path, |kind| matches!(kind, NodeKind::TableCell { .. }))
            .ok_or_else(|| CommandError::InvalidPath(caret.path.clone()))?;
        let row = parent_of(&cell)?;
        let table = parent_of(&row)?;
        let column = index_of(&cell)?;
        let row_index = index_of(&row)?;
        let columns = self.document.children_of(&row).map_or(0, Vec::len);
        let rows = self.document.children_of(&table).map_or(0, Vec::len);

        if shift {
            if column > 0 {
                return self.move_into_cell(&row, column - 1);
            }
            if row_index == 0 {
                return Ok(CommandResult::Noop);
            }
            return self.move_into_cell(&table.child(row_index - 1), usize::MAX);
        }
        if column + 1 < columns {
            return self.move_into_cell(&row, column + 1);
        }
        if row_index + 1 < rows {
            return self.move_into_cell(&table.child(row_index + 1), 0);
        }
        self.insert_plain("\t")
    }

    fn outdent_code_line(&mut self, caret: &Point) -> Result<CommandResult, CommandError> {
        let line = self.node(&caret.path)?.block_text();
        let unit = self.config.indent_unit.as_str();
        let remove = if line.starts_with(unit) {
            unit.chars().count()
        } else if line.starts_with('\t') {
            1
        } else {
            line.chars().take(SPACE_TAB_STOP).take_while(|ch| *ch == ' ').count()
        };
        if remove == 0 {
            return Ok(CommandResult::Noop);
        }
        inline::delete_range(self.node_mut(&caret.path)?, 0, remove);
        self.set_caret(caret.path.clone(), caret.offset.saturating_sub(remove));
        Ok(CommandResult::Success)
    }

    /// Move the item at `item` into the sublist of its previous sibling.
    fn indent_list_item(&mut self, item: &Path) -> Result<CommandResult, CommandError> {
        let index = index_of(item)?;
        if index == 0 {
            return Ok(CommandResult::Noop);
        }
        let list = parent_of(item)?;
        let ordered = matches!(self.kind(&list), Some(NodeKind::List { ordered: true, .. }));
        let prev = list.child(index - 1);

        let saved = self.save_selection();
        let moved = self.remove_node(item)?;
        let prev_children = &self.node(&prev)?.children;
        let count = prev_children.len();
        let reusable = prev_children.last().is_some_and(
            |child| matches!(child.kind, NodeKind::List { ordered: o, .. } if o == ordered),
        );
        if reusable {
            let sublist = prev.child(count - 1);
            let end = self.document.children_of(&sublist).map_or(0, Vec::len);
            self.insert_node(&sublist.child(end), moved)?;
        } else {
            let sublist = Node::new(NodeKind::List { ordered, start: None }, vec![moved]);
            self.insert_node(&prev.child(count), sublist)?;
        }
        self.restore_selection(saved);
        Ok(CommandResult::Success)
    }
}
