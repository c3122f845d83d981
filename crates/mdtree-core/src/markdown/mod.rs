//! Markdown text ⇄ document tree.
//!
//! - [`parse`] lowers CommonMark + GFM tables/task lists + `$`/`$$` math + YAML frontmatter into
//!   a [`Document`](crate::Document). It never fails.
//! - [`serialize`] writes a tree back out; [`MarkdownSerializer`] memoizes per top-level block.

mod html;
mod parser;
mod serializer;

pub use parser::{DEFAULT_BLANK_LINE_THRESHOLD, ParseOutput, parse, parse_with_threshold};
pub use serializer::{MarkdownSerializer, serialize, serialize_with_threshold};
