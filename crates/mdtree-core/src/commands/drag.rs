//! Drag-reorder of blocks and list items.

use super::{CommandError, CommandResult, DropEdge, EditorCore, next_sibling, parent_of};
use crate::node::NodeKind;
use crate::path::Path;

impl EditorCore {
    pub(super) fn drag_move(
        &mut self,
        source: &Path,
        target: &Path,
        edge: DropEdge,
    ) -> Result<CommandResult, CommandError> {
        let source_kind = self.node(source)?.kind.clone();
        self.node(target)?;
        if !self.config.drag.allows(&source_kind) {
            tracing::debug!(kind = source_kind.name(), "node kind is not draggable");
            return Ok(CommandResult::Noop);
        }

        let Some(anchor) = self.drop_anchor(&source_kind, target)? else {
            return Ok(CommandResult::Noop);
        };
        if source.contains(&anchor) {
            return Ok(CommandResult::Noop);
        }
        let insert_at = match edge {
            DropEdge::Before => anchor,
            DropEdge::After => next_sibling(&anchor)?,
        };
        if insert_at == *source || source.next_sibling().as_ref() == Some(&insert_at) {
            return Ok(CommandResult::Noop);
        }

        let saved = self.save_selection();
        let moved = self.remove_node(source)?;
        let mut removed = source.clone();
        let parent = parent_of(source)?;
        let emptied = !parent.is_root()
            && matches!(self.kind(&parent), Some(NodeKind::List { .. } | NodeKind::Blockquote))
            && self.document.children_of(&parent).is_some_and(Vec::is_empty);
        if emptied {
            self.remove_node(&parent)?;
            removed = parent;
        }
        let insert_at = insert_at
            .transform_after_remove(&removed)
            .ok_or_else(|| CommandError::InvalidPath(insert_at.clone()))?;
        self.insert_node(&insert_at, moved)?;
        self.restore_selection(saved);
        Ok(CommandResult::Success)
    }

    /// The node the dragged one is dropped next to.
    ///
    /// List items only land among list items. Other blocks land next to the nearest ancestor
    /// of the target that lives in a flow position (the root, a blockquote or a list item).
    fn drop_anchor(&self, source_kind: &NodeKind, target: &Path) -> Result<Option<Path>, CommandError> {
        if matches!(source_kind, NodeKind::ListItem { .. }) {
            return Ok(self
                .document
                .closest(target, |kind| matches!(kind, NodeKind::ListItem { .. })));
        }
        let mut current = target.clone();
        loop {
            let parent = parent_of(&current)?;
            let flow_parent = parent.is_root()
                || matches!(
                    self.kind(&parent),
                    Some(NodeKind::Blockquote | NodeKind::ListItem { .. })
                );
            if flow_parent {
                return Ok(Some(current));
            }
            current = parent;
        }
    }
}
