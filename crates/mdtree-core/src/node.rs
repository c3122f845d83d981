//! Node schema.
//!
//! The document is a tree of [`Node`]s. Every node carries an opaque [`NodeId`] that stays
//! stable across edits of unrelated siblings (caches and undo snapshots key on it) and a
//! [`NodeKind`] from a closed set of variants. Children live in `Node::children`; leaves
//! (text and voids) never have children.
//!
//! # Text blocks
//!
//! Only [`NodeKind::Paragraph`], [`NodeKind::Heading`] and [`NodeKind::CodeLine`] hold inline
//! content. They are the only nodes a caret can sit in. Inline content is made of text leaves
//! and inline voids (`Media`, `InlineMath`, `Break`, `WikiLink`); a void counts as one
//! character when measuring offsets.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Character used in place of an inline void when a text block is flattened to a string.
pub const OBJECT_REPLACEMENT: char = '\u{FFFC}';

/// Opaque node identity.
///
/// Ids are allocated from a process-wide counter and are never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Allocate a new, never-before-seen id.
    pub fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Table column alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    /// `:---`
    Left,
    /// `:---:`
    Center,
    /// `---:`
    Right,
}

/// A toggleable boolean text mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mark {
    /// `**bold**`
    Bold,
    /// `*italic*`
    Italic,
    /// `~~strikethrough~~`
    Strikethrough,
    /// `` `code` ``
    Code,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Orthogonal attributes of a text leaf.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Marks {
    /// Strong emphasis.
    #[serde(skip_serializing_if = "is_false")]
    pub bold: bool,
    /// Emphasis.
    #[serde(skip_serializing_if = "is_false")]
    pub italic: bool,
    /// Strikethrough.
    #[serde(skip_serializing_if = "is_false")]
    pub strikethrough: bool,
    /// Inline code.
    #[serde(skip_serializing_if = "is_false")]
    pub code: bool,
    /// Highlight color (a CSS color string).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
    /// Link target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// The leaf text is a footnote label referenced with `[^label]`.
    #[serde(skip_serializing_if = "is_false")]
    pub footnote_ref: bool,
    /// The leaf text is the label of a footnote definition (`[^label]: ...`).
    #[serde(skip_serializing_if = "is_false")]
    pub footnote_def: bool,
}

impl Marks {
    /// Marks with nothing set.
    pub fn plain() -> Self {
        Self::default()
    }

    /// Returns `true` if no mark is set.
    pub fn is_plain(&self) -> bool {
        *self == Self::default()
    }

    /// Returns `true` if `mark` is set.
    pub fn has(&self, mark: Mark) -> bool {
        match mark {
            Mark::Bold => self.bold,
            Mark::Italic => self.italic,
            Mark::Strikethrough => self.strikethrough,
            Mark::Code => self.code,
        }
    }

    /// Set or clear `mark`.
    pub fn set(&mut self, mark: Mark, on: bool) {
        match mark {
            Mark::Bold => self.bold = on,
            Mark::Italic => self.italic = on,
            Mark::Strikethrough => self.strikethrough = on,
            Mark::Code => self.code = on,
        }
    }

    /// Builder-style [`Marks::set`] with `on = true`.
    pub fn with(mut self, mark: Mark) -> Self {
        self.set(mark, true);
        self
    }

    /// Builder-style link setter.
    pub fn with_link(mut self, url: impl Into<String>) -> Self {
        self.link = Some(url.into());
        self
    }

    /// Marks that typing continues with when the caret sits after a leaf with these marks.
    ///
    /// Footnote labels are never extended by typing.
    pub fn for_continuation(&self) -> Self {
        let mut marks = self.clone();
        marks.footnote_ref = false;
        marks.footnote_def = false;
        marks
    }
}

/// The closed set of node variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NodeKind {
    /// A paragraph (text block).
    Paragraph,
    /// An ATX/setext heading (text block), level `1..=5`.
    Heading {
        /// Heading level.
        level: u8,
    },
    /// A bullet or ordered list; children are `ListItem`s.
    List {
        /// `true` for `1.` lists.
        ordered: bool,
        /// First number of an ordered list when it is not 1.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start: Option<u64>,
    },
    /// A list item; children are blocks.
    ListItem {
        /// Task state: `None` for a plain item.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checked: Option<bool>,
    },
    /// A block quote; children are blocks.
    Blockquote,
    /// A table; children are `TableRow`s.
    Table,
    /// A table row; children are `TableCell`s.
    TableRow,
    /// A table cell; children are blocks.
    TableCell {
        /// Header-row cell.
        #[serde(default, skip_serializing_if = "is_false")]
        title: bool,
        /// Column alignment.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        align: Option<Align>,
    },
    /// A code block; children are `CodeLine`s.
    Code {
        /// Fence language, verbatim.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        /// Display math (`$$ ... $$`), always with `language == "latex"`.
        #[serde(default, skip_serializing_if = "is_false")]
        katex: bool,
        /// Live-rendered block (fence meta `render`, or raw HTML).
        #[serde(default, skip_serializing_if = "is_false")]
        render: bool,
        /// YAML frontmatter delimited by `---`.
        #[serde(default, skip_serializing_if = "is_false")]
        frontmatter: bool,
    },
    /// One line of a code block (text block holding plain text).
    CodeLine,
    /// An image (inline void).
    Media {
        /// Image source.
        url: String,
        /// Alternative text.
        #[serde(default)]
        alt: String,
        /// Width in pixels.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        /// Height in pixels.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
    },
    /// A file attachment (block void).
    Attachment {
        /// File location.
        url: String,
        /// Display name.
        name: String,
        /// Size in bytes.
        #[serde(default)]
        size: u64,
    },
    /// `---` (block void).
    ThematicBreak,
    /// A hard line break (inline void).
    Break,
    /// `$...$` math (inline void).
    InlineMath {
        /// LaTeX source.
        value: String,
    },
    /// `[[target]]` (inline void).
    WikiLink {
        /// Link target / label.
        target: String,
    },
    /// A text leaf.
    Text {
        /// Text content.
        text: String,
        /// Marks applied to the whole leaf.
        #[serde(default, skip_serializing_if = "Marks::is_plain")]
        marks: Marks,
    },
}

impl NodeKind {
    /// Paragraph, heading or code line.
    pub fn is_text_block(&self) -> bool {
        matches!(
            self,
            NodeKind::Paragraph | NodeKind::Heading { .. } | NodeKind::CodeLine
        )
    }

    /// Text leaf or inline void.
    pub fn is_inline(&self) -> bool {
        matches!(self, NodeKind::Text { .. }) || self.is_inline_void()
    }

    /// `Media`, `InlineMath`, `Break` or `WikiLink`.
    pub fn is_inline_void(&self) -> bool {
        matches!(
            self,
            NodeKind::Media { .. }
                | NodeKind::InlineMath { .. }
                | NodeKind::Break
                | NodeKind::WikiLink { .. }
        )
    }

    /// `ThematicBreak` or `Attachment`.
    pub fn is_block_void(&self) -> bool {
        matches!(self, NodeKind::ThematicBreak | NodeKind::Attachment { .. })
    }

    /// Nodes that may appear as children of the root, a blockquote, a list item or a table
    /// cell.
    pub fn is_flow_block(&self) -> bool {
        matches!(
            self,
            NodeKind::Paragraph
                | NodeKind::Heading { .. }
                | NodeKind::List { .. }
                | NodeKind::Blockquote
                | NodeKind::Table
                | NodeKind::Code { .. }
                | NodeKind::ThematicBreak
                | NodeKind::Attachment { .. }
        )
    }

    /// Nodes whose children are flow blocks.
    pub fn is_flow_container(&self) -> bool {
        matches!(
            self,
            NodeKind::Blockquote | NodeKind::ListItem { .. } | NodeKind::TableCell { .. }
        )
    }

    /// Leaves never have children.
    pub fn is_leaf(&self) -> bool {
        self.is_inline() || self.is_block_void()
    }

    /// A short, stable name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Paragraph => "paragraph",
            NodeKind::Heading { .. } => "heading",
            NodeKind::List { .. } => "list",
            NodeKind::ListItem { .. } => "list-item",
            NodeKind::Blockquote => "blockquote",
            NodeKind::Table => "table",
            NodeKind::TableRow => "table-row",
            NodeKind::TableCell { .. } => "table-cell",
            NodeKind::Code { .. } => "code",
            NodeKind::CodeLine => "code-line",
            NodeKind::Media { .. } => "media",
            NodeKind::Attachment { .. } => "attachment",
            NodeKind::ThematicBreak => "thematic-break",
            NodeKind::Break => "break",
            NodeKind::InlineMath { .. } => "inline-math",
            NodeKind::WikiLink { .. } => "wiki-link",
            NodeKind::Text { .. } => "text",
        }
    }
}

/// A document tree node.
///
/// Equality is structural: ids are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Identity; not part of the persisted form.
    #[serde(skip, default = "NodeId::fresh")]
    pub id: NodeId,
    /// Variant and attributes.
    #[serde(flatten)]
    pub kind: NodeKind,
    /// Children (empty for leaves).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.children == other.children
    }
}

impl Eq for Node {}

impl Node {
    /// Create a node with a fresh id.
    pub fn new(kind: NodeKind, children: Vec<Node>) -> Self {
        Self {
            id: NodeId::fresh(),
            kind,
            children,
        }
    }

    /// Create a childless node.
    pub fn leaf(kind: NodeKind) -> Self {
        Self::new(kind, Vec::new())
    }

    /// An unmarked text leaf.
    pub fn text(text: impl Into<String>) -> Self {
        Self::marked_text(text, Marks::plain())
    }

    /// A text leaf with marks.
    pub fn marked_text(text: impl Into<String>, marks: Marks) -> Self {
        Self::leaf(NodeKind::Text {
            text: text.into(),
            marks,
        })
    }

    /// A paragraph with the given inline children.
    pub fn paragraph(children: Vec<Node>) -> Self {
        Self::new(NodeKind::Paragraph, children)
    }

    /// A paragraph holding one unmarked text leaf.
    pub fn paragraph_text(text: impl Into<String>) -> Self {
        Self::paragraph(vec![Self::text(text)])
    }

    /// An empty paragraph.
    pub fn empty_paragraph() -> Self {
        Self::paragraph_text("")
    }

    /// A heading holding one unmarked text leaf.
    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Self::new(NodeKind::Heading { level }, vec![Self::text(text)])
    }

    /// A code line.
    pub fn code_line(text: impl Into<String>) -> Self {
        Self::new(NodeKind::CodeLine, vec![Self::text(text)])
    }

    /// A plain code block (no katex/render/frontmatter flags).
    pub fn code(language: Option<&str>, lines: &[&str]) -> Self {
        let mut children: Vec<Node> = lines.iter().map(|l| Self::code_line(*l)).collect();
        if children.is_empty() {
            children.push(Self::code_line(""));
        }
        Self::new(
            NodeKind::Code {
                language: language.map(str::to_string),
                katex: false,
                render: false,
                frontmatter: false,
            },
            children,
        )
    }

    /// A list.
    pub fn list(ordered: bool, items: Vec<Node>) -> Self {
        Self::new(
            NodeKind::List {
                ordered,
                start: None,
            },
            items,
        )
    }

    /// A plain list item.
    pub fn list_item(children: Vec<Node>) -> Self {
        Self::new(NodeKind::ListItem { checked: None }, children)
    }

    /// A block quote.
    pub fn blockquote(children: Vec<Node>) -> Self {
        Self::new(NodeKind::Blockquote, children)
    }

    /// A table cell holding a single paragraph with `text`.
    pub fn table_cell(text: impl Into<String>, title: bool, align: Option<Align>) -> Self {
        Self::new(
            NodeKind::TableCell { title, align },
            vec![Self::paragraph_text(text)],
        )
    }

    /// A table built from rows of cell texts; row 0 is the title row.
    pub fn table(rows: &[Vec<&str>], aligns: &[Option<Align>]) -> Self {
        let rows = rows
            .iter()
            .enumerate()
            .map(|(r, cells)| {
                let cells = cells
                    .iter()
                    .enumerate()
                    .map(|(c, text)| Self::table_cell(*text, r == 0, aligns.get(c).copied().flatten()))
                    .collect();
                Self::new(NodeKind::TableRow, cells)
            })
            .collect();
        Self::new(NodeKind::Table, rows)
    }

    /// Shorthand for `self.kind.is_text_block()`.
    pub fn is_text_block(&self) -> bool {
        self.kind.is_text_block()
    }

    /// Shorthand for `self.kind.is_inline()`.
    pub fn is_inline(&self) -> bool {
        self.kind.is_inline()
    }

    /// Shorthand for `self.kind.is_inline_void()`.
    pub fn is_inline_void(&self) -> bool {
        self.kind.is_inline_void()
    }

    /// Text of a text leaf.
    pub fn as_text(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Marks of a text leaf.
    pub fn marks(&self) -> Option<&Marks> {
        match &self.kind {
            NodeKind::Text { marks, .. } => Some(marks),
            _ => None,
        }
    }

    /// Length of this inline node in caret positions.
    ///
    /// Text counts chars, voids count one; anything else counts zero.
    pub fn inline_len(&self) -> usize {
        match &self.kind {
            NodeKind::Text { text, .. } => text.chars().count(),
            kind if kind.is_inline_void() => 1,
            _ => 0,
        }
    }

    /// Total caret length of a text block's inline content.
    pub fn content_len(&self) -> usize {
        self.children.iter().map(Node::inline_len).sum()
    }

    /// Inline content of a text block flattened to a string; voids become
    /// [`OBJECT_REPLACEMENT`], so char offsets match caret offsets.
    pub fn block_text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match &child.kind {
                NodeKind::Text { text, .. } => out.push_str(text),
                kind if kind.is_inline_void() => out.push(OBJECT_REPLACEMENT),
                _ => {}
            }
        }
        out
    }

    /// Human-readable text of the subtree (voids contribute their textual payload).
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.collect_plain_text(&mut out);
        out
    }

    fn collect_plain_text(&self, out: &mut String) {
        match &self.kind {
            NodeKind::Text { text, .. } => out.push_str(text),
            NodeKind::InlineMath { value } => out.push_str(value),
            NodeKind::WikiLink { target } => out.push_str(target),
            NodeKind::Media { alt, .. } => out.push_str(alt),
            NodeKind::Break => out.push('\n'),
            _ => {
                for (i, child) in self.children.iter().enumerate() {
                    if i > 0 && !child.is_inline() && !matches!(self.kind, NodeKind::Text { .. })
                    {
                        out.push('\n');
                    }
                    child.collect_plain_text(out);
                }
            }
        }
    }

    /// Returns `true` for a text block with no content.
    pub fn is_empty_text_block(&self) -> bool {
        self.is_text_block() && self.content_len() == 0
    }

    /// Clone the subtree, allocating fresh ids for every node.
    pub fn deep_clone_fresh(&self) -> Self {
        Self {
            id: NodeId::fresh(),
            kind: self.kind.clone(),
            children: self.children.iter().map(Node::deep_clone_fresh).collect(),
        }
    }

    /// Visit every id in the subtree (pre-order).
    pub fn for_each_id(&self, f: &mut impl FnMut(NodeId)) {
        f(self.id);
        for child in &self.children {
            child.for_each_id(f);
        }
    }
}
