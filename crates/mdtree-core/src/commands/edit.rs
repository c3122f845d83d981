//! Text insertion, autoformat application, selection deletion, paste and mark toggling.

use super::{CaretContext, CommandError, CommandResult, EditorCore, next_sibling, parent_of};
use crate::autoformat::{AutoformatAction, AutoformatContext, AutoformatMatch};
use crate::inline;
use crate::node::{Mark, Marks, Node, NodeKind};
use crate::path::{Path, Point, Selection};
use crate::schema;
use crate::text::char_prefix;

impl EditorCore {
    pub(super) fn insert_text(&mut self, text: &str) -> Result<CommandResult, CommandError> {
        if !self.selection.is_collapsed() {
            self.delete_selection()?;
        }
        let mut chars = text.chars();
        if let (Some(typed), None) = (chars.next(), chars.next())
            && let Some((found, run_marks)) = self.find_autoformat(typed)?
        {
            tracing::debug!(rule = found.rule, "autoformat fired");
            let rule = found.rule;
            self.apply_autoformat(found, run_marks)?;
            return Ok(CommandResult::Autoformat { rule });
        }
        self.insert_plain(text)
    }

    /// The rule fired by typing `typed` at the caret, with the marks of the run it rewrites.
    fn find_autoformat(
        &self,
        typed: char,
    ) -> Result<Option<(AutoformatMatch, Marks)>, CommandError> {
        let caret = self.caret();
        let block = self.text_block(&caret.path)?;
        let text = block.block_text();
        let text_before = char_prefix(&text, caret.offset).to_string();
        let text_after: String = text.chars().skip(caret.offset).collect();

        let typing_marks = self
            .pending_marks
            .clone()
            .unwrap_or_else(|| inline::marks_at(block, caret.offset));
        let (leaf_start, leaf_marks) = inline::run_before(block, caret.offset);
        // Typing with other marks than the leaf before the caret starts a fresh run.
        let (run_start, run_marks, marks_before_run) =
            if typing_marks != leaf_marks.for_continuation() {
                (caret.offset, typing_marks, leaf_marks)
            } else {
                let before = inline::child_before(block, leaf_start)
                    .and_then(|i| block.children[i].marks().cloned())
                    .unwrap_or_default();
                (leaf_start, leaf_marks, before)
            };
        let run_text: String = text
            .chars()
            .skip(run_start)
            .take(caret.offset - run_start)
            .collect();

        let ctx = AutoformatContext {
            block: &block.kind,
            ancestors: self.document.ancestor_kinds(&caret.path),
            is_top_level: caret.path.len() == 1,
            is_first_child: caret.path.last_index() == Some(0),
            text_before,
            text_after,
            run_text,
            run_marks,
            marks_before_run,
        };
        Ok(self
            .autoformat
            .find(&ctx, typed)
            .map(|found| (found, ctx.run_marks.clone())))
    }

    fn apply_autoformat(
        &mut self,
        found: AutoformatMatch,
        run_marks: Marks,
    ) -> Result<(), CommandError> {
        let caret = self.caret().clone();
        let path = caret.path.clone();
        if found.action.is_block() {
            inline::delete_range(self.node_mut(&path)?, 0, caret.offset);
            return self.apply_block_autoformat(&path, found.action);
        }

        let block = self.node_mut(&path)?;
        inline::delete_range(block, found.start, caret.offset);
        let mut offset = found.start;
        match found.action {
            AutoformatAction::Mark { mark, text } => {
                inline::insert_text(block, offset, &text, run_marks.clone().with(mark));
                offset += text.chars().count();
            }
            AutoformatAction::Link { text, url } => {
                inline::insert_text(block, offset, &text, run_marks.clone().with_link(url));
                offset += text.chars().count();
            }
            AutoformatAction::Image { alt, url } => {
                let media = NodeKind::Media {
                    url,
                    alt,
                    width: None,
                    height: None,
                };
                inline::insert_inline(block, offset, Node::leaf(media));
                offset += 1;
            }
            AutoformatAction::WikiLink(target) => {
                inline::insert_inline(block, offset, Node::leaf(NodeKind::WikiLink { target }));
                offset += 1;
            }
            AutoformatAction::InlineMath(value) => {
                inline::insert_inline(block, offset, Node::leaf(NodeKind::InlineMath { value }));
                offset += 1;
            }
            _ => {}
        }
        self.pending_marks = Some(run_marks);
        self.set_caret(path, offset);
        Ok(())
    }

    /// Rewrite the (already emptied up to the caret) block at `path`.
    fn apply_block_autoformat(
        &mut self,
        path: &Path,
        action: AutoformatAction,
    ) -> Result<(), CommandError> {
        self.pending_marks = None;
        match action {
            AutoformatAction::Heading(level) => {
                self.node_mut(path)?.kind = NodeKind::Heading { level };
                self.set_caret(path.clone(), 0);
            }
            AutoformatAction::Blockquote => {
                let paragraph = self.remove_node(path)?;
                self.insert_node(path, Node::blockquote(vec![paragraph]))?;
                self.set_caret(path.child(0), 0);
            }
            AutoformatAction::List {
                ordered,
                start,
                checked,
            } => {
                let paragraph = self.remove_node(path)?;
                let item = Node::new(NodeKind::ListItem { checked }, vec![paragraph]);
                self.insert_node(path, Node::new(NodeKind::List { ordered, start }, vec![item]))?;
                self.set_caret(path.child(0).child(0), 0);
            }
            AutoformatAction::TaskItem(state) => {
                let item = parent_of(path)?;
                if let NodeKind::ListItem { checked } = &mut self.node_mut(&item)?.kind {
                    *checked = Some(state);
                }
                self.set_caret(path.clone(), 0);
            }
            AutoformatAction::ThematicBreak => {
                self.replace_node(path, Node::leaf(NodeKind::ThematicBreak))?;
                let after = next_sibling(path)?;
                self.insert_node(&after, Node::empty_paragraph())?;
                self.set_caret(after, 0);
            }
            AutoformatAction::CodeFence(language) => {
                let tail = self.node(path)?.plain_text();
                let code = Node::code(language.as_deref(), &[tail.as_str()]);
                self.replace_node(path, code)?;
                self.set_caret(path.child(0), 0);
            }
            AutoformatAction::DisplayMath => {
                let tail = self.node(path)?.plain_text();
                let math = Node::new(
                    NodeKind::Code {
                        language: Some("latex".to_string()),
                        katex: true,
                        render: false,
                        frontmatter: false,
                    },
                    vec![Node::code_line(tail)],
                );
                self.replace_node(path, math)?;
                self.set_caret(path.child(0), 0);
            }
            AutoformatAction::Table(cells) => {
                let header: Vec<&str> = cells.iter().map(String::as_str).collect();
                let body = vec![""; header.len()];
                self.replace_node(path, Node::table(&[header, body], &[]))?;
                self.set_caret(path.child(1).child(0).child(0), 0);
            }
            _ => {}
        }
        Ok(())
    }

    /// Insert `text` at the caret without autoformatting.
    pub(super) fn insert_plain(&mut self, text: &str) -> Result<CommandResult, CommandError> {
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        if text.is_empty() {
            return Ok(CommandResult::Noop);
        }
        let caret = self.caret().clone();
        let context = self.caret_context()?;
        let pending = self.pending_marks.take();
        let marks = match pending {
            Some(marks) => marks,
            None => inline::marks_at(self.text_block(&caret.path)?, caret.offset),
        };

        match context {
            CaretContext::CodeLine => self.insert_code_text(&caret, &text)?,
            CaretContext::Heading => {
                let text = text.replace('\n', " ");
                inline::insert_text(self.node_mut(&caret.path)?, caret.offset, &text, marks);
                self.set_caret(caret.path, caret.offset + text.chars().count());
            }
            _ => {
                let block = self.node_mut(&caret.path)?;
                let mut offset = caret.offset;
                for (i, segment) in text.split('\n').enumerate() {
                    if i > 0 {
                        inline::insert_inline(block, offset, Node::leaf(NodeKind::Break));
                        offset += 1;
                    }
                    inline::insert_text(block, offset, segment, marks.clone());
                    offset += segment.chars().count();
                }
                self.set_caret(caret.path, offset);
            }
        }
        Ok(CommandResult::Success)
    }

    /// Insert possibly multi-line text into a code line, splitting it into new lines.
    fn insert_code_text(&mut self, caret: &Point, text: &str) -> Result<(), CommandError> {
        let mut lines = text.split('\n');
        let first = lines.next().unwrap_or_default();
        let block = self.node_mut(&caret.path)?;
        let tail = inline::split_off(block, caret.offset);
        inline::insert_text(block, caret.offset, first, Marks::plain());

        let mut current = caret.path.clone();
        let mut offset = caret.offset + first.chars().count();
        for line in lines {
            current = next_sibling(&current)?;
            self.insert_node(&current, Node::code_line(line))?;
            offset = line.chars().count();
        }
        inline::append(self.node_mut(&current)?, tail);
        self.set_caret(current, offset);
        Ok(())
    }

    pub(super) fn delete_selection_command(&mut self) -> Result<CommandResult, CommandError> {
        if self.selection.is_collapsed() {
            return Ok(CommandResult::Noop);
        }
        self.delete_selection()?;
        Ok(CommandResult::Success)
    }

    /// Delete the selection and collapse the caret to its start.
    pub(super) fn delete_selection(&mut self) -> Result<(), CommandError> {
        let (start, end) = {
            let (start, end) = self.selection.ordered();
            (start.clone(), end.clone())
        };
        self.check_point(&start)?;
        self.check_point(&end)?;
        self.pending_marks = None;

        if start.path == end.path {
            inline::delete_range(self.node_mut(&start.path)?, start.offset, end.offset);
            self.set_caret(start.path, start.offset);
            return Ok(());
        }

        let start_id = self.node(&start.path)?.id;
        let end_id = self.node(&end.path)?.id;
        let start_len = self.node(&start.path)?.content_len();
        inline::delete_range(self.node_mut(&start.path)?, start.offset, start_len);
        inline::delete_range(self.node_mut(&end.path)?, 0, end.offset);

        let mut covered = self.covered_between(&start.path, &end.path);
        covered.sort();
        for path in covered.into_iter().rev() {
            let parent = parent_of(&path)?;
            let in_table = matches!(
                self.kind(&parent),
                Some(NodeKind::Table | NodeKind::TableRow)
            );
            if in_table {
                self.clear_text_blocks(&path)?;
            } else {
                self.remove_node(&path)?;
            }
        }

        let start_path = self
            .document
            .find_path(start_id)
            .ok_or_else(|| CommandError::InvalidPath(start.path.clone()))?;
        if let Some(end_path) = self.document.find_path(end_id) {
            let in_cell = |path: &Path| {
                self.document
                    .closest(path, |kind| matches!(kind, NodeKind::TableCell { .. }))
                    .is_some()
            };
            if !in_cell(&start_path) && !in_cell(&end_path) {
                let end_block = self.remove_pruning(&end_path)?;
                self.append_block_content(&start_path, end_block)?;
            }
        }
        self.set_caret(start_path, start.offset);
        Ok(())
    }

    /// Nodes lying entirely between two text blocks in document order.
    fn covered_between(&self, start: &Path, end: &Path) -> Vec<Path> {
        let common = start.common_ancestor(end);
        let depth = common.len();
        let mut covered = Vec::new();

        let (first, last) = (start.indices()[depth], end.indices()[depth]);
        covered.extend((first + 1..last).map(|i| common.child(i)));
        for len in depth + 2..=start.len() {
            let node = start.truncated(len);
            let parent = start.truncated(len - 1);
            let count = self.document.children_of(&parent).map_or(0, Vec::len);
            let index = node.last_index().unwrap_or(0);
            covered.extend((index + 1..count).map(|i| parent.child(i)));
        }
        for len in depth + 2..=end.len() {
            let node = end.truncated(len);
            let parent = end.truncated(len - 1);
            let index = node.last_index().unwrap_or(0);
            covered.extend((0..index).map(|i| parent.child(i)));
        }
        covered
    }

    fn clear_text_blocks(&mut self, path: &Path) -> Result<(), CommandError> {
        let mut blocks = Vec::new();
        if let Some(node) = self.document.get(path) {
            collect_text_blocks(node, path, &mut blocks);
        }
        for block in blocks {
            let node = self.node_mut(&block)?;
            let len = node.content_len();
            inline::delete_range(node, 0, len);
        }
        Ok(())
    }

    /// Remove the node at `path` and every ancestor container it leaves empty.
    pub(super) fn remove_pruning(&mut self, path: &Path) -> Result<Node, CommandError> {
        let removed = self.remove_node(path)?;
        let mut parent = parent_of(path)?;
        while !parent.is_root() && self.document.children_of(&parent).is_some_and(Vec::is_empty) {
            self.remove_node(&parent)?;
            parent = parent_of(&parent)?;
        }
        Ok(removed)
    }

    /// Append the inline content of `source` to the text block at `target`.
    pub(super) fn append_block_content(
        &mut self,
        target: &Path,
        source: Node,
    ) -> Result<(), CommandError> {
        let block = self.node_mut(target)?;
        if matches!(block.kind, NodeKind::CodeLine) {
            let len = block.content_len();
            inline::insert_text(block, len, &source.plain_text(), Marks::plain());
        } else {
            inline::append(block, source.children);
        }
        Ok(())
    }

    pub(super) fn insert_fragment(
        &mut self,
        nodes: Vec<Node>,
    ) -> Result<CommandResult, CommandError> {
        if nodes.is_empty() {
            return Ok(CommandResult::Noop);
        }
        if !self.selection.is_collapsed() {
            self.delete_selection()?;
        }
        self.pending_marks = None;
        let fresh: Vec<Node> = nodes.iter().map(Node::deep_clone_fresh).collect();
        let blocks = schema::normalize_flow(fresh);
        let caret = self.caret().clone();

        match self.caret_context()? {
            CaretContext::CodeLine => {
                let text = blocks
                    .iter()
                    .map(Node::plain_text)
                    .collect::<Vec<_>>()
                    .join("\n");
                return self.insert_plain(&text);
            }
            CaretContext::TableCell => {
                let mut inlines = Vec::new();
                for (i, block) in blocks.into_iter().enumerate() {
                    if i > 0 {
                        inlines.push(Node::leaf(NodeKind::Break));
                    }
                    inlines.extend(fragment_inlines(block));
                }
                let offset = self.insert_inlines(&caret.path, caret.offset, inlines)?;
                self.set_caret(caret.path, offset);
                return Ok(CommandResult::Success);
            }
            _ => {}
        }

        if let [only] = blocks.as_slice()
            && matches!(only.kind, NodeKind::Paragraph)
        {
            let inlines = blocks.into_iter().flat_map(|block| block.children).collect();
            let offset = self.insert_inlines(&caret.path, caret.offset, inlines)?;
            self.set_caret(caret.path, offset);
            return Ok(CommandResult::Success);
        }

        let head = caret.path.clone();
        let tail = inline::split_off(self.node_mut(&head)?, caret.offset);
        let mut blocks = blocks.into_iter().peekable();
        let merged_head = match blocks.next_if(|block| matches!(block.kind, NodeKind::Paragraph)) {
            Some(first) => {
                inline::append(self.node_mut(&head)?, first.children);
                true
            }
            None => false,
        };

        let mut last = head.clone();
        let mut insert_at = next_sibling(&head)?;
        for block in blocks {
            self.insert_node(&insert_at, block)?;
            last = insert_at.clone();
            insert_at = next_sibling(&insert_at)?;
        }

        let mut caret = match self.kind(&last) {
            Some(NodeKind::Paragraph) if last != head || merged_head => {
                let offset = self.node(&last)?.content_len();
                inline::append(self.node_mut(&last)?, tail);
                Point {
                    path: last,
                    offset,
                }
            }
            _ => {
                self.insert_node(&insert_at, Node::paragraph(tail))?;
                Point {
                    path: insert_at,
                    offset: 0,
                }
            }
        };

        if !merged_head && self.node(&head)?.is_empty_text_block() {
            self.remove_node(&head)?;
            if let Some(path) = caret.path.transform_after_remove(&head) {
                caret.path = path;
            }
        }
        self.selection = Selection::caret(caret);
        Ok(CommandResult::Success)
    }

    /// Insert inline nodes one after another; returns the offset after the last one.
    fn insert_inlines(
        &mut self,
        path: &Path,
        offset: usize,
        inlines: Vec<Node>,
    ) -> Result<usize, CommandError> {
        let block = self.node_mut(path)?;
        let code_line = matches!(block.kind, NodeKind::CodeLine);
        let mut offset = offset;
        for node in inlines {
            let node = if code_line && !matches!(node.marks(), Some(marks) if marks.is_plain()) {
                Node::text(node.plain_text())
            } else {
                node
            };
            let len = node.inline_len();
            inline::insert_inline(block, offset, node);
            offset += len;
        }
        Ok(offset)
    }

    pub(super) fn toggle_mark(&mut self, mark: Mark) -> Result<CommandResult, CommandError> {
        if self.selection.is_collapsed() {
            let caret = self.caret();
            let block = self.text_block(&caret.path)?;
            if matches!(block.kind, NodeKind::CodeLine) {
                return Ok(CommandResult::Noop);
            }
            let mut marks = self
                .pending_marks
                .clone()
                .unwrap_or_else(|| inline::marks_at(block, caret.offset));
            marks.set(mark, !marks.has(mark));
            self.pending_marks = Some(marks);
            return Ok(CommandResult::Success);
        }

        let (start, end) = {
            let (start, end) = self.selection.ordered();
            (start.clone(), end.clone())
        };
        if start.path != end.path {
            return Ok(CommandResult::Noop);
        }
        let block = self.text_block(&start.path)?;
        if matches!(block.kind, NodeKind::CodeLine) {
            return Ok(CommandResult::Noop);
        }
        let all_marked = block
            .children
            .iter()
            .zip(inline::child_spans(block))
            .filter(|(_, (from, to))| *from < end.offset && *to > start.offset)
            .filter_map(|(child, _)| child.marks())
            .all(|marks| marks.has(mark));
        inline::update_marks(
            self.node_mut(&start.path)?,
            start.offset,
            end.offset,
            |marks| marks.set(mark, !all_marked),
        );
        Ok(CommandResult::Success)
    }
}

/// Inline content a pasted block contributes to a single text block.
fn fragment_inlines(block: Node) -> Vec<Node> {
    match block.kind {
        NodeKind::Paragraph | NodeKind::Heading { .. } => block.children,
        _ => vec![Node::text(block.plain_text())],
    }
}

fn collect_text_blocks(node: &Node, path: &Path, out: &mut Vec<Path>) {
    if node.is_text_block() {
        out.push(path.clone());
        return;
    }
    for (i, child) in node.children.iter().enumerate() {
        collect_text_blocks(child, &path.child(i), out);
    }
}
