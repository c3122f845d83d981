#![warn(missing_docs)]
//! mdtree Core - Headless Structured Markdown Engine
//!
//! # Overview
//!
//! `mdtree-core` keeps a markdown document as a typed node tree and edits it through discrete
//! structural intents (typing, Enter, Backspace, Tab, arrows, drag-reorder). It does not render;
//! hosts draw the tree and feed key presses back in as [`Command`]s.
//!
//! # Core Features
//!
//! - **Node schema**: paragraphs, headings, lists and task items, blockquotes, tables, code
//!   blocks, math, media, wiki links, footnotes, with schema validation and normalization
//! - **Markdown round-tripping**: a tolerant parser (never fails) and a memoizing serializer
//! - **Autoformat**: markdown shortcuts like `# `, `- [ ] `, `**bold**` rewrite the tree as you type
//! - **Structural commands**: context-sensitive key handling, all-or-nothing with grouped undo
//! - **Change sets**: every committed intent reports the node ids it touched
//! - **Decorations**: lazily computed syntax colors and search highlights keyed by node id
//! - **Sessions**: debounced autosave with explicit flush on close and focus loss
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Session (autosave, subscribers)            │  ← Host API
//! ├─────────────────────────────────────────────┤
//! │  Command Engine + Undo History              │  ← Intents
//! ├─────────────────────────────────────────────┤
//! │  Decoration Cache      │  Markdown I/O      │  ← Derived data
//! ├─────────────────────────────────────────────┤
//! │  Autoformat Matcher    │  Schema            │  ← Rules
//! ├─────────────────────────────────────────────┤
//! │  Document Tree (Node, Path, Selection)      │  ← Storage
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use mdtree_core::{ArrowKey, Command, CommandExecutor, CursorCommand, EditCommand, EngineConfig};
//!
//! let mut executor = CommandExecutor::from_markdown("- one", EngineConfig::default());
//!
//! // The caret starts in the first text block; move to its end and add an item.
//! for _ in 0..3 {
//!     executor
//!         .execute(Command::Cursor(CursorCommand::Arrow { key: ArrowKey::Right, extend: false }))
//!         .unwrap();
//! }
//! executor
//!     .execute(Command::Edit(EditCommand::Enter { mod_key: false }))
//!     .unwrap();
//! executor
//!     .execute(Command::Edit(EditCommand::InsertText { text: "two".to_string() }))
//!     .unwrap();
//!
//! assert_eq!(executor.to_markdown(), "- one\n- two");
//! ```
//!
//! # Module Description
//!
//! - [`node`] - node kinds, inline marks and node identity
//! - [`path`] - child-index paths, points and selections
//! - [`document`] - the tree and its structural queries
//! - [`schema`] - validation and normalization
//! - [`markdown`] - parser and serializer
//! - [`autoformat`] - markdown shortcut rules
//! - [`commands`] - the structural command engine
//! - [`history`] - grouped snapshot undo/redo
//! - [`delta`] - change sets
//! - [`decorations`] - syntax and search decorations
//! - [`search`] - char-offset text search
//! - [`session`] - document session and autosave
//! - [`config`] - engine configuration
//!
//! # Unicode Support
//!
//! - Offsets inside text blocks are in chars (Unicode scalar values)
//! - Caret movement and deletion step over whole grapheme clusters
//! - [`text`] provides display widths for CJK double-width characters

pub mod autoformat;
pub mod commands;
pub mod config;
pub mod decorations;
pub mod delta;
pub mod document;
pub mod history;
pub mod inline;
pub mod markdown;
pub mod node;
pub mod path;
pub mod schema;
pub mod search;
pub mod session;
pub mod text;

pub use autoformat::{AutoformatAction, AutoformatMatch, AutoformatMatcher};
pub use commands::{
    ArrowKey, CaretContext, Command, CommandError, CommandExecutor, CommandResult,
    CursorCommand, DropEdge, EditCommand, EditorCore, StructureCommand,
};
pub use config::{ConfigError, DragPolicy, EngineConfig};
pub use decorations::{
    ColorRange, Decoration, DecorationCache, DecorationKind, HighlightWorker, Highlighter,
    SEARCH_MATCH_STYLE_ID, StyleId,
};
pub use delta::ChangeSet;
pub use document::{Document, TreeError};
pub use history::History;
pub use markdown::{MarkdownSerializer, ParseOutput, parse, serialize};
pub use node::{Align, Mark, Marks, Node, NodeId, NodeKind};
pub use path::{Path, Point, Selection};
pub use schema::SchemaViolation;
pub use search::{SearchError, SearchMatch, SearchOptions, SearchQuery};
pub use session::{
    AutosaveScheduler, DocumentSession, DocumentSink, MemorySink, SessionChange,
    SessionChangeType, SessionError,
};
