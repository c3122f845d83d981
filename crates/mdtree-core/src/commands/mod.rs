//! Command interface: the structural editing engine.
//!
//! # Overview
//!
//! The host delivers discrete intents as [`Command`]s; [`CommandExecutor::execute`] interprets
//! them against the tree. Interpretation is keyed by the [`CaretContext`] (the lowest enclosing
//! node kind at the caret), so the same key does different things in a code line, a table cell
//! or a list item.
//!
//! Every intent is all-or-nothing:
//!
//! - the executor snapshots the tree, applies the intent, then normalizes and validates every
//!   top-level block the intent touched;
//! - a schema violation restores the snapshot and the intent reports [`CommandResult::Noop`];
//! - committed intents land in the undo [`History`] and their dirty node set is available
//!   through [`CommandExecutor::take_last_change`].
//!
//! # Example
//!
//! ```rust
//! use mdtree_core::{Command, CommandExecutor, EditCommand, EngineConfig};
//!
//! let mut executor = CommandExecutor::from_markdown("", EngineConfig::default());
//! for ch in "# Title".chars() {
//!     executor
//!         .execute(Command::Edit(EditCommand::InsertText { text: ch.to_string() }))
//!         .unwrap();
//! }
//! assert_eq!(executor.to_markdown(), "# Title");
//! ```

mod arrow;
mod backspace;
mod drag;
mod edit;
mod enter;
mod tab;

use crate::autoformat::AutoformatMatcher;
use crate::config::EngineConfig;
use crate::delta::ChangeSet;
use crate::document::{Document, TreeError};
use crate::history::History;
use crate::markdown;
use crate::node::{Mark, Marks, Node, NodeId, NodeKind};
use crate::path::{Path, Point, Selection};
use crate::schema::{self, SchemaViolation};
use thiserror::Error;

/// Arrow keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrowKey {
    /// Left.
    Left,
    /// Right.
    Right,
    /// Up.
    Up,
    /// Down.
    Down,
}

/// Which side of the drop target a dragged node lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropEdge {
    /// Before the target.
    Before,
    /// After the target.
    After,
}

/// Text editing intents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditCommand {
    /// Type or insert text at the caret (replacing the selection).
    ///
    /// A single typed character may fire an autoformat shortcut instead of being inserted.
    InsertText {
        /// Text to insert.
        text: String,
    },
    /// Paste a tree fragment at the caret.
    InsertFragment {
        /// Blocks (or inline nodes) to paste.
        nodes: Vec<Node>,
    },
    /// Enter.
    Enter {
        /// Ctrl/Cmd held: line break in cells and paragraphs, leave a code block.
        mod_key: bool,
    },
    /// Backspace.
    Backspace,
    /// Tab.
    Tab {
        /// Shift held.
        shift: bool,
    },
    /// Delete the selection.
    DeleteSelection,
    /// Toggle a mark over the selection (or for the next typed text).
    ToggleMark {
        /// Mark to toggle.
        mark: Mark,
    },
    /// Undo the last step.
    Undo,
    /// Redo the last undone step.
    Redo,
    /// Close the current typing group so the next insert starts a new undo step.
    EndUndoGroup,
}

/// Caret and selection intents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorCommand {
    /// An arrow key.
    Arrow {
        /// Direction.
        key: ArrowKey,
        /// Shift held: move the focus only.
        extend: bool,
    },
    /// Replace the selection.
    SetSelection {
        /// New selection; both ends must address text blocks.
        selection: Selection,
    },
    /// Collapse the selection to a point.
    MoveTo {
        /// New caret; must address a text block.
        point: Point,
    },
}

/// Tree reordering intents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureCommand {
    /// Move the node at `source` next to the node at `target`.
    DragMove {
        /// Node being dragged.
        source: Path,
        /// Node under the pointer.
        target: Path,
        /// Side of the target.
        edge: DropEdge,
    },
}

/// Unified command enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Edit commands.
    Edit(EditCommand),
    /// Cursor commands.
    Cursor(CursorCommand),
    /// Structure commands.
    Structure(StructureCommand),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Edit(edit) => match edit {
                EditCommand::InsertText { .. } => "insert-text",
                EditCommand::InsertFragment { .. } => "insert-fragment",
                EditCommand::Enter { .. } => "enter",
                EditCommand::Backspace => "backspace",
                EditCommand::Tab { .. } => "tab",
                EditCommand::DeleteSelection => "delete-selection",
                EditCommand::ToggleMark { .. } => "toggle-mark",
                EditCommand::Undo => "undo",
                EditCommand::Redo => "redo",
                EditCommand::EndUndoGroup => "end-undo-group",
            },
            Command::Cursor(cursor) => match cursor {
                CursorCommand::Arrow { .. } => "arrow",
                CursorCommand::SetSelection { .. } => "set-selection",
                CursorCommand::MoveTo { .. } => "move-to",
            },
            Command::Structure(StructureCommand::DragMove { .. }) => "drag-move",
        }
    }
}

/// Command execution result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// The intent was applied.
    Success,
    /// The intent did not apply here (or would have broken the schema); nothing changed.
    Noop,
    /// A typed character fired an autoformat rule.
    Autoformat {
        /// Name of the rule.
        rule: &'static str,
    },
}

/// Command errors: caller mistakes, never schema problems.
#[derive(Debug, Error)]
pub enum CommandError {
    /// No node at the path.
    #[error("no node at path {0}")]
    InvalidPath(Path),
    /// A caret must sit in a paragraph, heading or code line.
    #[error("node at {0} is not a text block")]
    NotATextBlock(Path),
    /// The offset is past the end of the block.
    #[error("offset {offset} is out of range for the text block at {path}")]
    InvalidOffset {
        /// Text block.
        path: Path,
        /// Offending offset.
        offset: usize,
    },
    /// The undo stack is empty.
    #[error("nothing to undo")]
    NothingToUndo,
    /// The redo stack is empty.
    #[error("nothing to redo")]
    NothingToRedo,
    /// Tree access failed.
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// The lowest enclosing node kind at the caret, which selects the intent handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaretContext {
    /// A paragraph outside lists, quotes and tables.
    Paragraph,
    /// A heading.
    Heading,
    /// A line of a code block.
    CodeLine,
    /// Any text block inside a table cell.
    TableCell,
    /// A paragraph directly inside a list item.
    ListItem,
    /// A paragraph directly inside a blockquote.
    Blockquote,
}

impl CaretContext {
    /// Name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            CaretContext::Paragraph => "paragraph",
            CaretContext::Heading => "heading",
            CaretContext::CodeLine => "code-line",
            CaretContext::TableCell => "table-cell",
            CaretContext::ListItem => "list-item",
            CaretContext::Blockquote => "blockquote",
        }
    }
}

/// Selection ends remembered by node identity across structural edits.
#[derive(Debug, Clone, Copy)]
struct SavedSelection {
    anchor: (NodeId, usize),
    focus: (NodeId, usize),
}

/// Editor state: the tree, the selection and pending marks.
///
/// Only the command engine mutates it; hosts read it through the accessors.
#[derive(Debug)]
pub struct EditorCore {
    document: Document,
    selection: Selection,
    pending_marks: Option<Marks>,
    config: EngineConfig,
    autoformat: AutoformatMatcher,
    changes: ChangeSet,
}

impl EditorCore {
    /// Create an editor over `document` with the caret at the start of its first text block.
    pub fn new(document: Document, config: EngineConfig) -> Self {
        let mut document = document;
        schema::normalize(&mut document);
        ensure_text_block(&mut document);
        let first = document.text_blocks().into_iter().next().unwrap_or_else(|| Path::from([0]));
        Self {
            document,
            selection: Selection::caret(Point { path: first, offset: 0 }),
            pending_marks: None,
            config,
            autoformat: AutoformatMatcher::new(),
            changes: ChangeSet::new(),
        }
    }

    /// The document tree.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// The selection.
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// The caret (the selection focus).
    pub fn caret(&self) -> &Point {
        &self.selection.focus
    }

    /// Marks the next typed text will carry, when they differ from the text before the caret.
    pub fn pending_marks(&self) -> Option<&Marks> {
        self.pending_marks.as_ref()
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The handler context at the caret.
    pub fn caret_context(&self) -> Result<CaretContext, CommandError> {
        let path = &self.caret().path;
        let block = self.text_block(path)?;
        let parent = path.parent().and_then(|p| self.document.kind(&p));
        let in_cell = self
            .document
            .ancestor_kinds(path)
            .iter()
            .any(|kind| matches!(kind, NodeKind::TableCell { .. }));
        Ok(match (&block.kind, parent) {
            (NodeKind::CodeLine, _) => CaretContext::CodeLine,
            _ if in_cell => CaretContext::TableCell,
            (NodeKind::Heading { .. }, _) => CaretContext::Heading,
            (_, Some(NodeKind::ListItem { .. })) => CaretContext::ListItem,
            (_, Some(NodeKind::Blockquote)) => CaretContext::Blockquote,
            _ => CaretContext::Paragraph,
        })
    }

    fn node(&self, path: &Path) -> Result<&Node, CommandError> {
        self.document
            .get(path)
            .ok_or_else(|| CommandError::InvalidPath(path.clone()))
    }

    fn text_block(&self, path: &Path) -> Result<&Node, CommandError> {
        let node = self.node(path)?;
        if !node.is_text_block() {
            return Err(CommandError::NotATextBlock(path.clone()));
        }
        Ok(node)
    }

    fn kind(&self, path: &Path) -> Option<&NodeKind> {
        self.document.kind(path)
    }

    /// Mutable access to a node; records it (and its ancestors) as changed.
    fn node_mut(&mut self, path: &Path) -> Result<&mut Node, CommandError> {
        self.changes.touch(&self.document, path);
        self.document
            .get_mut(path)
            .ok_or_else(|| CommandError::InvalidPath(path.clone()))
    }

    fn insert_node(&mut self, path: &Path, node: Node) -> Result<(), CommandError> {
        self.document.insert(path, node)?;
        self.changes.touch(&self.document, path);
        Ok(())
    }

    fn remove_node(&mut self, path: &Path) -> Result<Node, CommandError> {
        self.changes.touch(&self.document, path);
        let removed = self.document.remove(path)?;
        removed.for_each_id(&mut |id| self.changes.insert(id));
        Ok(removed)
    }

    fn replace_node(&mut self, path: &Path, node: Node) -> Result<Node, CommandError> {
        self.changes.touch(&self.document, path);
        let old = self.document.replace(path, node)?;
        old.for_each_id(&mut |id| self.changes.insert(id));
        self.changes.touch(&self.document, path);
        Ok(old)
    }

    fn set_caret(&mut self, path: Path, offset: usize) {
        self.selection = Selection::caret(Point { path, offset });
    }

    fn check_point(&self, point: &Point) -> Result<(), CommandError> {
        let block = self.text_block(&point.path)?;
        if point.offset > block.content_len() {
            return Err(CommandError::InvalidOffset {
                path: point.path.clone(),
                offset: point.offset,
            });
        }
        Ok(())
    }

    fn save_selection(&self) -> Option<SavedSelection> {
        let id = |point: &Point| self.document.get(&point.path).map(|node| (node.id, point.offset));
        Some(SavedSelection {
            anchor: id(&self.selection.anchor)?,
            focus: id(&self.selection.focus)?,
        })
    }

    fn restore_selection(&mut self, saved: Option<SavedSelection>) {
        if let Some(saved) = saved {
            let point = |(id, offset): (NodeId, usize)| {
                self.document
                    .find_path(id)
                    .map(|path| Point { path, offset })
            };
            if let (Some(anchor), Some(focus)) = (point(saved.anchor), point(saved.focus)) {
                self.selection = Selection { anchor, focus };
            }
        }
        self.repair_selection();
    }

    /// Clamp the selection onto existing text blocks.
    fn repair_selection(&mut self) {
        let anchor = self.repair_point(&self.selection.anchor);
        let focus = self.repair_point(&self.selection.focus);
        self.selection = Selection { anchor, focus };
    }

    fn repair_point(&self, point: &Point) -> Point {
        if let Some(block) = self.document.get(&point.path)
            && block.is_text_block()
        {
            return Point {
                path: point.path.clone(),
                offset: point.offset.min(block.content_len()),
            };
        }
        let top = point
            .path
            .indices()
            .first()
            .copied()
            .unwrap_or(0)
            .min(self.document.children().len().saturating_sub(1));
        let fallback = self
            .document
            .first_text_block_in(&Path::from([top]))
            .or_else(|| self.document.text_blocks().into_iter().next())
            .unwrap_or_else(|| Path::from([0]));
        Point {
            path: fallback,
            offset: 0,
        }
    }

    /// Normalize and validate every top-level block in `changes`.
    fn normalize_changed(&mut self, changes: &mut ChangeSet) -> Result<(), SchemaViolation> {
        let saved = self.save_selection();
        let blocks = std::mem::take(self.document.children_mut());
        let mut normalized = Vec::with_capacity(blocks.len());
        for block in blocks {
            if changes.contains(block.id) {
                for fixed in schema::normalize_block(block) {
                    changes.insert(fixed.id);
                    normalized.push(fixed);
                }
            } else {
                normalized.push(block);
            }
        }
        *self.document.children_mut() = normalized;
        if ensure_text_block(&mut self.document) {
            if let Some(last) = self.document.children().last() {
                changes.insert(last.id);
            }
        }

        if self.document.children().is_empty() {
            return Err(SchemaViolation::EmptyDocument);
        }
        for (index, block) in self.document.children().iter().enumerate() {
            if changes.contains(block.id) {
                schema::validate_block(&self.document, index)?;
            }
        }
        self.restore_selection(saved);
        Ok(())
    }

    fn execute_edit(&mut self, command: EditCommand) -> Result<CommandResult, CommandError> {
        match command {
            EditCommand::InsertText { text } => self.insert_text(&text),
            EditCommand::InsertFragment { nodes } => self.insert_fragment(nodes),
            EditCommand::Enter { mod_key } => self.enter(mod_key),
            EditCommand::Backspace => self.backspace(),
            EditCommand::Tab { shift } => self.tab(shift),
            EditCommand::DeleteSelection => self.delete_selection_command(),
            EditCommand::ToggleMark { mark } => self.toggle_mark(mark),
            // History commands are handled by the executor.
            EditCommand::Undo | EditCommand::Redo | EditCommand::EndUndoGroup => {
                Ok(CommandResult::Noop)
            }
        }
    }

    fn execute_cursor(&mut self, command: CursorCommand) -> Result<CommandResult, CommandError> {
        match command {
            CursorCommand::Arrow { key, extend } => self.arrow(key, extend),
            CursorCommand::SetSelection { selection } => {
                self.check_point(&selection.anchor)?;
                self.check_point(&selection.focus)?;
                self.selection = selection;
                self.pending_marks = None;
                Ok(CommandResult::Success)
            }
            CursorCommand::MoveTo { point } => {
                self.check_point(&point)?;
                self.selection = Selection::caret(point);
                self.pending_marks = None;
                Ok(CommandResult::Success)
            }
        }
    }

    fn execute_structure(
        &mut self,
        command: StructureCommand,
    ) -> Result<CommandResult, CommandError> {
        match command {
            StructureCommand::DragMove {
                source,
                target,
                edge,
            } => self.drag_move(&source, &target, edge),
        }
    }
}

/// Append an empty paragraph when no caret position exists; returns `true` if it did.
fn ensure_text_block(document: &mut Document) -> bool {
    let mut has_text_block = false;
    document.walk(|_, node| has_text_block |= node.is_text_block());
    if !has_text_block {
        document.children_mut().push(Node::empty_paragraph());
    }
    !has_text_block
}

/// Applies commands to an [`EditorCore`] with undo/redo and change tracking.
///
/// # Example
///
/// ```rust
/// use mdtree_core::{ArrowKey, Command, CommandExecutor, CursorCommand, EditCommand, EngineConfig};
///
/// let mut executor = CommandExecutor::from_markdown("one\n\ntwo", EngineConfig::default());
/// executor
///     .execute(Command::Cursor(CursorCommand::Arrow { key: ArrowKey::Down, extend: false }))
///     .unwrap();
/// executor.execute(Command::Edit(EditCommand::Backspace)).unwrap();
/// assert_eq!(executor.to_markdown(), "onetwo");
/// ```
#[derive(Debug)]
pub struct CommandExecutor {
    editor: EditorCore,
    history: History,
    last_change: Option<ChangeSet>,
}

impl CommandExecutor {
    /// Create an executor over `document`.
    pub fn new(document: Document, config: EngineConfig) -> Self {
        let history = History::new(config.undo_levels);
        Self {
            editor: EditorCore::new(document, config),
            history,
            last_change: None,
        }
    }

    /// Parse `markdown` (with the configured blank-line threshold) and edit it.
    pub fn from_markdown(markdown: &str, config: EngineConfig) -> Self {
        let parsed = markdown::parse_with_threshold(markdown, config.blank_line_threshold);
        Self::new(parsed.document, config)
    }

    /// An executor over the empty document.
    pub fn empty() -> Self {
        Self::new(Document::empty(), EngineConfig::default())
    }

    /// Execute a command.
    pub fn execute(&mut self, command: Command) -> Result<CommandResult, CommandError> {
        self.last_change = None;
        tracing::debug!(
            intent = command.name(),
            state = self.editor.caret_context().map_or("invalid", CaretContext::name),
            "dispatching intent"
        );

        match command {
            Command::Edit(EditCommand::Undo) => self.undo(),
            Command::Edit(EditCommand::Redo) => self.redo(),
            Command::Edit(EditCommand::EndUndoGroup) => {
                self.history.end_group();
                Ok(CommandResult::Success)
            }
            Command::Edit(edit) => {
                let coalescible = matches!(edit, EditCommand::InsertText { .. })
                    && self.editor.selection.is_collapsed();
                if !coalescible {
                    self.history.end_group();
                }
                self.commit(coalescible, |editor| editor.execute_edit(edit))
            }
            Command::Cursor(cursor) => {
                self.history.end_group();
                self.commit(false, |editor| editor.execute_cursor(cursor))
            }
            Command::Structure(structure) => {
                self.history.end_group();
                self.commit(false, |editor| editor.execute_structure(structure))
            }
        }
    }

    /// Execute commands in order, stopping at the first error.
    pub fn execute_batch(
        &mut self,
        commands: Vec<Command>,
    ) -> Result<Vec<CommandResult>, CommandError> {
        let mut results = Vec::with_capacity(commands.len());
        let mut changes = ChangeSet::new();
        for command in commands {
            results.push(self.execute(command)?);
            if let Some(last) = self.last_change.take() {
                changes.merge(last);
            }
        }
        self.last_change = (!changes.is_empty()).then_some(changes);
        Ok(results)
    }

    fn commit(
        &mut self,
        coalescible: bool,
        apply: impl FnOnce(&mut EditorCore) -> Result<CommandResult, CommandError>,
    ) -> Result<CommandResult, CommandError> {
        let before = self.editor.document.clone();
        let before_selection = self.editor.selection.clone();
        let before_pending = self.editor.pending_marks.clone();
        self.editor.changes = ChangeSet::new();

        let restore = |editor: &mut EditorCore, document: Document| {
            editor.document = document;
            editor.selection = before_selection.clone();
            editor.pending_marks = before_pending.clone();
            editor.changes = ChangeSet::new();
        };

        let result = match apply(&mut self.editor) {
            Ok(result) => result,
            Err(err) => {
                restore(&mut self.editor, before);
                return Err(err);
            }
        };

        let mut changes = std::mem::take(&mut self.editor.changes);
        if changes.is_empty() {
            return Ok(result);
        }
        if let Err(violation) = self.editor.normalize_changed(&mut changes) {
            tracing::debug!(%violation, "intent would break the schema, ignoring it");
            restore(&mut self.editor, before);
            return Ok(CommandResult::Noop);
        }

        let coalescible = coalescible && result == CommandResult::Success;
        self.history.record(
            before,
            before_selection.clone(),
            self.editor.selection.clone(),
            coalescible,
        );
        self.last_change = Some(changes);
        Ok(result)
    }

    fn undo(&mut self) -> Result<CommandResult, CommandError> {
        let selection = self
            .history
            .undo(&mut self.editor.document)
            .ok_or(CommandError::NothingToUndo)?;
        self.after_history_step(selection);
        Ok(CommandResult::Success)
    }

    fn redo(&mut self) -> Result<CommandResult, CommandError> {
        let selection = self
            .history
            .redo(&mut self.editor.document)
            .ok_or(CommandError::NothingToRedo)?;
        self.after_history_step(selection);
        Ok(CommandResult::Success)
    }

    fn after_history_step(&mut self, selection: Selection) {
        self.editor.selection = selection;
        self.editor.pending_marks = None;
        self.editor.repair_selection();
        self.last_change = Some(ChangeSet::full());
    }

    /// The dirty set of the last `execute` call, if it changed the tree.
    pub fn last_change(&self) -> Option<&ChangeSet> {
        self.last_change.as_ref()
    }

    /// Take the dirty set of the last `execute` call.
    pub fn take_last_change(&mut self) -> Option<ChangeSet> {
        self.last_change.take()
    }

    /// Replace the whole document (e.g. after an external reload); clears history.
    pub fn replace_document(&mut self, document: Document) {
        let config = self.editor.config.clone();
        self.history = History::new(config.undo_levels);
        self.editor = EditorCore::new(document, config);
        self.last_change = Some(ChangeSet::full());
    }

    /// Whether undo is possible.
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    /// Whether redo is possible.
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Undo stack depth.
    pub fn undo_depth(&self) -> usize {
        self.history.undo_depth()
    }

    /// Redo stack depth.
    pub fn redo_depth(&self) -> usize {
        self.history.redo_depth()
    }

    /// Whether the tree is at the last clean point.
    pub fn is_clean(&self) -> bool {
        self.history.is_clean()
    }

    /// Mark the current tree as clean (call after saving).
    pub fn mark_clean(&mut self) {
        self.history.mark_clean();
    }

    /// The editor state.
    pub fn editor(&self) -> &EditorCore {
        &self.editor
    }

    /// The document tree.
    pub fn document(&self) -> &Document {
        &self.editor.document
    }

    /// Serialize the document with the configured blank-line threshold.
    pub fn to_markdown(&self) -> String {
        markdown::serialize_with_threshold(
            &self.editor.document,
            self.editor.config.blank_line_threshold,
        )
    }
}

fn next_sibling(path: &Path) -> Result<Path, CommandError> {
    path.next_sibling()
        .ok_or_else(|| CommandError::InvalidPath(path.clone()))
}

fn parent_of(path: &Path) -> Result<Path, CommandError> {
    path.parent()
        .ok_or_else(|| CommandError::InvalidPath(path.clone()))
}

fn index_of(path: &Path) -> Result<usize, CommandError> {
    path.last_index()
        .ok_or_else(|| CommandError::InvalidPath(path.clone()))
}
