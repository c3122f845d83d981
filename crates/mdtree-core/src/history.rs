//! Undo/redo over structural snapshots.
//!
//! Every undo step holds a whole [`Document`]. While the step sits on the undo stack the snapshot
//! is the tree *before* the step; undoing swaps it with the live tree, so on the redo stack the
//! same slot holds the tree *after* the step. Consecutive coalescible steps (plain typing) are
//! folded into the open step instead of pushing new snapshots.

use crate::document::Document;
use crate::path::Selection;

#[derive(Debug, Clone)]
struct UndoStep {
    group_id: usize,
    document: Document,
    before_selection: Selection,
    after_selection: Selection,
}

/// Bounded, grouped undo/redo stacks with a clean point.
#[derive(Debug)]
pub struct History {
    undo_stack: Vec<UndoStep>,
    redo_stack: Vec<UndoStep>,
    max_undo: usize,
    /// Clean point as an `undo_stack.len()`; may exceed it while redo steps exist.
    clean_index: Option<usize>,
    next_group_id: usize,
    open_group_id: Option<usize>,
}

impl History {
    /// Keep at most `max_undo` steps.
    pub fn new(max_undo: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_undo,
            clean_index: Some(0),
            next_group_id: 0,
            open_group_id: None,
        }
    }

    /// Whether there is a step to undo.
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Whether there is a step to redo.
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Number of undo steps.
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    /// Number of redo steps.
    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// The group typing currently coalesces into.
    pub fn current_group_id(&self) -> Option<usize> {
        self.open_group_id
    }

    /// Whether the live tree matches the last clean point.
    pub fn is_clean(&self) -> bool {
        self.clean_index == Some(self.undo_stack.len())
    }

    /// Mark the live tree as clean (after a save).
    pub fn mark_clean(&mut self) {
        self.clean_index = Some(self.undo_stack.len());
        self.end_group();
    }

    /// Stop coalescing into the open group.
    pub fn end_group(&mut self) {
        self.open_group_id = None;
    }

    fn clear_redo_and_adjust_clean(&mut self) {
        if self.redo_stack.is_empty() {
            return;
        }
        if let Some(clean_index) = self.clean_index
            && clean_index > self.undo_stack.len()
        {
            self.clean_index = None;
        }
        self.redo_stack.clear();
    }

    /// Record a committed intent.
    ///
    /// `before` is the tree before the intent. With `coalescible` set and a group open, the
    /// intent joins the open step; otherwise a new step starts.
    pub fn record(
        &mut self,
        before: Document,
        before_selection: Selection,
        after_selection: Selection,
        coalescible: bool,
    ) {
        self.clear_redo_and_adjust_clean();

        let reuse_open_group = coalescible
            && self.open_group_id.is_some()
            && self.clean_index != Some(self.undo_stack.len());
        if reuse_open_group
            && let Some(last) = self.undo_stack.last_mut()
            && Some(last.group_id) == self.open_group_id
        {
            last.after_selection = after_selection;
            return;
        }

        if self.max_undo == 0 {
            self.clean_index = None;
            return;
        }
        if self.undo_stack.len() >= self.max_undo {
            self.undo_stack.remove(0);
            self.clean_index = match self.clean_index {
                Some(0) | None => None,
                Some(index) => Some(index - 1),
            };
        }

        let group_id = self.next_group_id;
        self.next_group_id = self.next_group_id.wrapping_add(1);
        self.open_group_id = coalescible.then_some(group_id);
        self.undo_stack.push(UndoStep {
            group_id,
            document: before,
            before_selection,
            after_selection,
        });
    }

    /// Undo the last step into `document`; returns the selection to restore.
    pub fn undo(&mut self, document: &mut Document) -> Option<Selection> {
        self.end_group();
        let mut step = self.undo_stack.pop()?;
        std::mem::swap(document, &mut step.document);
        let selection = step.before_selection.clone();
        self.redo_stack.push(step);
        Some(selection)
    }

    /// Redo the last undone step into `document`; returns the selection to restore.
    pub fn redo(&mut self, document: &mut Document) -> Option<Selection> {
        self.end_group();
        let mut step = self.redo_stack.pop()?;
        std::mem::swap(document, &mut step.document);
        let selection = step.after_selection.clone();
        self.undo_stack.push(step);
        Some(selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::path::Point;

    fn doc(text: &str) -> Document {
        Document::new(vec![Node::paragraph_text(text)])
    }

    fn caret(offset: usize) -> Selection {
        Selection::caret(Point::new([0], offset))
    }

    #[test]
    fn test_coalesced_typing_undoes_at_once() {
        let mut history = History::new(10);
        let mut live = doc("abc");
        history.record(doc(""), caret(0), caret(1), true);
        history.record(doc("a"), caret(1), caret(2), true);
        history.record(doc("ab"), caret(2), caret(3), true);
        assert_eq!(history.undo_depth(), 1);

        assert_eq!(history.undo(&mut live), Some(caret(0)));
        assert_eq!(live, doc(""));
        assert_eq!(history.redo(&mut live), Some(caret(3)));
        assert_eq!(live, doc("abc"));
    }

    #[test]
    fn test_clean_point_and_trimming() {
        let mut history = History::new(2);
        let mut live = doc("c");
        history.record(doc(""), caret(0), caret(0), false);
        history.mark_clean();
        assert!(history.is_clean());
        history.record(doc("a"), caret(0), caret(0), false);
        history.record(doc("b"), caret(0), caret(0), false);
        assert_eq!(history.undo_depth(), 2);
        assert!(!history.is_clean());

        history.undo(&mut live);
        history.undo(&mut live);
        assert!(history.undo(&mut live).is_none());
        // The trimmed history still knows "a" was the saved state.
        assert_eq!(live, doc("a"));
        assert!(history.is_clean());
    }

    #[test]
    fn test_new_step_clears_redo() {
        let mut history = History::new(10);
        let mut live = doc("a");
        history.record(doc(""), caret(0), caret(1), false);
        history.undo(&mut live);
        assert!(history.can_redo());
        history.record(doc(""), caret(0), caret(1), false);
        assert!(!history.can_redo());
    }
}
