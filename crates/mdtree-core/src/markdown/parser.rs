//! Markdown text → document tree.
//!
//! Parsing is delegated to `pulldown-cmark`; this module lowers its event stream into
//! [`Node`]s with a stack of open frames. Inline content arriving directly inside a container
//! (tight list items, table cells) opens an implicit paragraph frame that is closed as soon as a
//! block starts or the container ends.
//!
//! The parser never fails: markup it cannot lower is kept as literal text.

use super::html::{self, HtmlPiece};
use crate::document::Document;
use crate::node::{Align, Marks, Node, NodeId, NodeKind};
use crate::schema::{self, normalize_inlines};
use pulldown_cmark::{Alignment, CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use regex::Regex;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::OnceLock;

/// Default blank-line-run threshold (see [`parse_with_threshold`]).
pub const DEFAULT_BLANK_LINE_THRESHOLD: usize = 4;

/// Result of [`parse`].
#[derive(Debug, Clone)]
pub struct ParseOutput {
    /// The parsed, normalized document.
    pub document: Document,
    /// Source byte range of every block node that came from the input.
    pub source_map: HashMap<NodeId, Range<usize>>,
}

/// Parse markdown with the default blank-line threshold.
pub fn parse(markdown: &str) -> ParseOutput {
    parse_with_threshold(markdown, DEFAULT_BLANK_LINE_THRESHOLD)
}

/// Parse markdown.
///
/// Between two top-level blocks separated by `n >= threshold` blank lines,
/// `n - (threshold - 1)` empty paragraphs are inserted. This is a deliberate, non-CommonMark
/// heuristic that keeps the vertical spacing an author typed; it never applies inside
/// containers.
pub fn parse_with_threshold(markdown: &str, threshold: usize) -> ParseOutput {
    let mut lowering = Lowering::new(markdown);
    let parser = Parser::new_ext(markdown, options());
    for (event, range) in parser.into_offset_iter() {
        lowering.event(event, range);
    }
    lowering.finish(threshold.max(2))
}

fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_MATH
        | Options::ENABLE_YAML_STYLE_METADATA_BLOCKS
}

fn wiki_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[([^\[\]\n]+)\]\]").expect("valid wiki link regex"))
}

#[derive(Debug)]
enum FrameKind {
    Root,
    Block(NodeKind),
    Footnote(String),
    HtmlBlock,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    children: Vec<Node>,
    /// Raw text of code, metadata and HTML blocks.
    text: String,
    range: Range<usize>,
    implicit: bool,
    display_math: bool,
    attachment: Option<(String, u64)>,
}

impl Frame {
    fn new(kind: FrameKind, range: Range<usize>) -> Self {
        Self {
            kind,
            children: Vec::new(),
            text: String::new(),
            range,
            implicit: false,
            display_math: false,
            attachment: None,
        }
    }

    fn accepts_blocks(&self) -> bool {
        match &self.kind {
            FrameKind::Root | FrameKind::Footnote(_) => true,
            FrameKind::Block(kind) => kind.is_flow_container(),
            FrameKind::HtmlBlock => false,
        }
    }

    fn collects_text(&self) -> bool {
        matches!(
            self.kind,
            FrameKind::HtmlBlock | FrameKind::Block(NodeKind::Code { .. })
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkSource {
    Markdown,
    Html,
}

struct Image {
    url: String,
    alt: String,
}

struct Lowering<'a> {
    source: &'a str,
    frames: Vec<Frame>,
    top_ranges: Vec<Range<usize>>,
    source_map: HashMap<NodeId, Range<usize>>,
    marks: Marks,
    mark_stack: Vec<(MarkSource, String, Marks)>,
    table_aligns: Vec<Vec<Option<Align>>>,
    in_table_head: bool,
    image: Option<Image>,
}

impl<'a> Lowering<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            frames: vec![Frame::new(FrameKind::Root, 0..source.len())],
            top_ranges: Vec::new(),
            source_map: HashMap::new(),
            marks: Marks::plain(),
            mark_stack: Vec::new(),
            table_aligns: Vec::new(),
            in_table_head: false,
            image: None,
        }
    }

    fn top(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn event(&mut self, event: Event<'_>, range: Range<usize>) {
        if self.image.is_some() {
            self.image_event(event);
            return;
        }
        match event {
            Event::Start(tag) => self.start(tag, range),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => self.text(&text, range),
            Event::Code(code) => {
                let marks = Marks {
                    code: true,
                    ..self.marks.clone()
                };
                self.push_inline(Node::marked_text(code.into_string(), marks), range);
            }
            Event::InlineMath(value) => self.push_inline(
                Node::leaf(NodeKind::InlineMath {
                    value: value.into_string(),
                }),
                range,
            ),
            Event::DisplayMath(value) => {
                self.push_inline(
                    Node::leaf(NodeKind::InlineMath {
                        value: value.into_string(),
                    }),
                    range,
                );
                self.top().display_math = true;
            }
            Event::Html(raw) => {
                if self.top().collects_text() {
                    self.top().text.push_str(&raw);
                } else {
                    self.inline_html(&raw, range);
                }
            }
            Event::InlineHtml(raw) => self.inline_html(&raw, range),
            Event::FootnoteReference(label) => {
                let marks = Marks {
                    footnote_ref: true,
                    ..self.marks.clone()
                };
                self.push_inline(Node::marked_text(label.into_string(), marks), range);
            }
            Event::SoftBreak => {
                let in_heading = matches!(self.top().kind, FrameKind::Block(NodeKind::Heading { .. }));
                let text = if in_heading { " " } else { "\n" };
                self.push_inline(Node::marked_text(text, self.marks.clone()), range);
            }
            Event::HardBreak => self.push_inline(Node::leaf(NodeKind::Break), range),
            Event::Rule => {
                self.close_implicit();
                self.push_block(Node::leaf(NodeKind::ThematicBreak), range);
            }
            Event::TaskListMarker(checked) => {
                if let Some(frame) = self
                    .frames
                    .iter_mut()
                    .rev()
                    .find(|f| matches!(f.kind, FrameKind::Block(NodeKind::ListItem { .. })))
                    && let FrameKind::Block(NodeKind::ListItem { checked: slot }) = &mut frame.kind
                {
                    *slot = Some(checked);
                }
            }
        }
    }

    fn image_event(&mut self, event: Event<'_>) {
        let Some(image) = self.image.as_mut() else {
            return;
        };
        match event {
            Event::Text(text) | Event::Code(text) => image.alt.push_str(&text),
            Event::End(TagEnd::Image) => {
                if let Some(image) = self.image.take() {
                    let node = Node::leaf(NodeKind::Media {
                        url: image.url,
                        alt: image.alt,
                        width: None,
                        height: None,
                    });
                    let end = self.top().range.end;
                    self.push_inline(node, end..end);
                }
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>, range: Range<usize>) {
        let kind = match tag {
            Tag::Paragraph => NodeKind::Paragraph,
            Tag::Heading { level, .. } => NodeKind::Heading {
                level: (level as u8).min(5),
            },
            Tag::BlockQuote(_) => NodeKind::Blockquote,
            Tag::CodeBlock(kind) => {
                let (language, render) = match kind {
                    CodeBlockKind::Fenced(info) => fence_info(&info),
                    CodeBlockKind::Indented => (None, false),
                };
                NodeKind::Code {
                    language,
                    katex: false,
                    render,
                    frontmatter: false,
                }
            }
            Tag::MetadataBlock(_) => NodeKind::Code {
                language: Some("yaml".to_string()),
                katex: false,
                render: false,
                frontmatter: true,
            },
            Tag::HtmlBlock => {
                self.open(FrameKind::HtmlBlock, range);
                return;
            }
            Tag::List(start) => NodeKind::List {
                ordered: start.is_some(),
                start: start.filter(|n| *n != 1),
            },
            Tag::Item => NodeKind::ListItem { checked: None },
            Tag::FootnoteDefinition(label) => {
                self.open(FrameKind::Footnote(label.into_string()), range);
                return;
            }
            Tag::Table(aligns) => {
                self.table_aligns
                    .push(aligns.into_iter().map(convert_alignment).collect());
                NodeKind::Table
            }
            Tag::TableHead => {
                self.in_table_head = true;
                NodeKind::TableRow
            }
            Tag::TableRow => NodeKind::TableRow,
            Tag::TableCell => {
                let column = self.top().children.len();
                let align = self
                    .table_aligns
                    .last()
                    .and_then(|aligns| aligns.get(column).copied().flatten());
                NodeKind::TableCell {
                    title: self.in_table_head,
                    align,
                }
            }
            Tag::Emphasis => return self.push_marks(MarkSource::Markdown, "em", |m| m.italic = true),
            Tag::Strong => return self.push_marks(MarkSource::Markdown, "strong", |m| m.bold = true),
            Tag::Strikethrough => {
                return self.push_marks(MarkSource::Markdown, "del", |m| m.strikethrough = true);
            }
            Tag::Link {
                dest_url, title, ..
            } => {
                if let Some(size) = title.strip_prefix("attachment:") {
                    let size = size.trim().parse().unwrap_or(0);
                    self.ensure_inline_frame(range.clone());
                    self.top().attachment = Some((dest_url.to_string(), size));
                }
                let url = dest_url.into_string();
                return self.push_marks(MarkSource::Markdown, "a", move |m| m.link = Some(url));
            }
            Tag::Image { dest_url, .. } => {
                self.image = Some(Image {
                    url: dest_url.into_string(),
                    alt: String::new(),
                });
                return;
            }
            _ => return,
        };
        self.open(FrameKind::Block(kind), range);
    }

    fn open(&mut self, kind: FrameKind, range: Range<usize>) {
        self.close_implicit();
        self.frames.push(Frame::new(kind, range));
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link => {
                self.pop_marks(MarkSource::Markdown, None);
            }
            TagEnd::Image => {}
            TagEnd::Paragraph
            | TagEnd::Heading(_)
            | TagEnd::BlockQuote(_)
            | TagEnd::CodeBlock
            | TagEnd::MetadataBlock(_)
            | TagEnd::HtmlBlock
            | TagEnd::List(_)
            | TagEnd::Item
            | TagEnd::FootnoteDefinition
            | TagEnd::Table
            | TagEnd::TableHead
            | TagEnd::TableRow
            | TagEnd::TableCell => {
                self.close_implicit();
                if self.frames.len() > 1 {
                    self.close_top();
                }
                match tag {
                    TagEnd::TableHead => self.in_table_head = false,
                    TagEnd::Table => {
                        self.table_aligns.pop();
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str, range: Range<usize>) {
        if self.top().collects_text() {
            self.top().text.push_str(text);
            return;
        }
        self.push_inline(Node::marked_text(text, self.marks.clone()), range);
    }

    fn push_marks(&mut self, source: MarkSource, name: &str, apply: impl FnOnce(&mut Marks)) {
        self.mark_stack
            .push((source, name.to_string(), self.marks.clone()));
        apply(&mut self.marks);
    }

    fn pop_marks(&mut self, source: MarkSource, name: Option<&str>) -> bool {
        let Some(index) = self
            .mark_stack
            .iter()
            .rposition(|(s, n, _)| *s == source && name.is_none_or(|name| n.as_str() == name))
        else {
            return false;
        };
        let (_, _, previous) = self.mark_stack.swap_remove(index);
        self.mark_stack.truncate(index);
        self.marks = previous;
        true
    }

    fn inline_html(&mut self, raw: &str, range: Range<usize>) {
        for piece in html::split_pieces(raw) {
            match piece {
                HtmlPiece::Text(text) => {
                    if !text.is_empty() {
                        self.push_inline(Node::marked_text(text, self.marks.clone()), range.clone());
                    }
                }
                HtmlPiece::Tag(raw_tag) => self.inline_tag(raw_tag, range.clone()),
            }
        }
    }

    fn inline_tag(&mut self, raw: &str, range: Range<usize>) {
        let Some(tag) = html::parse_tag(raw) else {
            self.literal_html(raw, range);
            return;
        };
        match tag.name.as_str() {
            "br" => self.push_inline(Node::leaf(NodeKind::Break), range),
            "img" => match html::media_from_img(&tag) {
                Some(media) => self.push_inline(Node::leaf(media), range),
                None => self.literal_html(raw, range),
            },
            name if html::is_mark_tag(name) => {
                if tag.closing {
                    if !self.pop_marks(MarkSource::Html, Some(name)) {
                        self.literal_html(raw, range);
                    }
                    return;
                }
                let mut marks = self.marks.clone();
                if html::apply_mark_tag(&tag, &mut marks) {
                    self.mark_stack
                        .push((MarkSource::Html, tag.name.clone(), std::mem::replace(&mut self.marks, marks)));
                } else {
                    self.literal_html(raw, range);
                }
            }
            _ => self.literal_html(raw, range),
        }
    }

    fn literal_html(&mut self, raw: &str, range: Range<usize>) {
        tracing::warn!(html = raw, "keeping unsupported inline html as literal text");
        self.push_inline(Node::marked_text(raw, self.marks.clone()), range);
    }

    fn ensure_inline_frame(&mut self, range: Range<usize>) {
        if self.top().accepts_blocks() {
            let mut frame = Frame::new(FrameKind::Block(NodeKind::Paragraph), range);
            frame.implicit = true;
            self.frames.push(frame);
        }
    }

    fn push_inline(&mut self, node: Node, range: Range<usize>) {
        self.ensure_inline_frame(range.clone());
        let top = self.top();
        if top.implicit {
            top.range.end = top.range.end.max(range.end);
        }
        top.children.push(node);
    }

    fn push_block(&mut self, node: Node, range: Range<usize>) {
        self.source_map.insert(node.id, range.clone());
        if self.frames.len() == 1 {
            self.top_ranges.push(range);
        }
        self.top().children.push(node);
    }

    fn close_implicit(&mut self) {
        if self.top().implicit {
            self.close_top();
        }
    }

    fn close_top(&mut self) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        let range = frame.range.clone();
        match frame.kind {
            FrameKind::Root => {}
            FrameKind::Footnote(label) => {
                let mut children = frame.children;
                let label_leaf = Node::marked_text(
                    label,
                    Marks {
                        footnote_def: true,
                        ..Marks::plain()
                    },
                );
                match children.first_mut() {
                    Some(first) if matches!(first.kind, NodeKind::Paragraph) => {
                        first.children.insert(0, label_leaf);
                    }
                    _ => children.insert(0, Node::paragraph(vec![label_leaf])),
                }
                for child in children {
                    self.push_block(child, range.clone());
                }
            }
            FrameKind::HtmlBlock => {
                let node = lower_html_block(&frame.text);
                self.push_block(node, range);
            }
            FrameKind::Block(kind) => {
                let node = finish_block(kind, frame.children, frame.text, frame.display_math, frame.attachment);
                self.push_block(node, range);
            }
        }
    }

    fn finish(mut self, threshold: usize) -> ParseOutput {
        while self.frames.len() > 1 {
            tracing::warn!("closing unterminated markdown block");
            self.close_implicit();
            if self.frames.len() > 1 {
                self.close_top();
            }
        }
        let root = self.frames.pop().map(|f| f.children).unwrap_or_default();

        let mut blocks = Vec::with_capacity(root.len());
        for (i, block) in root.into_iter().enumerate() {
            if i > 0
                && let (Some(prev), Some(next)) = (self.top_ranges.get(i - 1), self.top_ranges.get(i))
            {
                let blank = blank_lines_between(self.source, prev.end, next.start);
                if blank >= threshold {
                    for _ in 0..blank - (threshold - 1) {
                        blocks.push(Node::empty_paragraph());
                    }
                }
            }
            blocks.push(block);
        }

        let mut document = Document::new(blocks);
        schema::normalize(&mut document);
        ParseOutput {
            document,
            source_map: self.source_map,
        }
    }
}

fn convert_alignment(alignment: Alignment) -> Option<Align> {
    match alignment {
        Alignment::None => None,
        Alignment::Left => Some(Align::Left),
        Alignment::Center => Some(Align::Center),
        Alignment::Right => Some(Align::Right),
    }
}

/// Split fence info into `(language, render)`; a trailing `render` word sets the flag.
fn fence_info(info: &str) -> (Option<String>, bool) {
    let info = info.trim();
    let (language, render) = match info.rsplit_once(char::is_whitespace) {
        Some((language, "render")) => (language.trim(), true),
        _ => (info, false),
    };
    let language = (!language.is_empty()).then(|| language.to_string());
    (language, render)
}

/// Number of blank lines between the last non-blank byte before `prev_end` and `next_start`.
fn blank_lines_between(source: &str, prev_end: usize, next_start: usize) -> usize {
    if next_start <= prev_end || next_start > source.len() {
        return 0;
    }
    let content_end = source[..prev_end]
        .rfind(|c: char| !c.is_whitespace())
        .map_or(0, |i| i + 1);
    let gap = &source[content_end..next_start];
    let tail = gap
        .rfind(|c: char| !c.is_whitespace())
        .map_or(gap, |i| &gap[i + 1..]);
    tail.matches('\n').count().saturating_sub(1)
}

fn code_lines(text: &str) -> Vec<Node> {
    let text = text.strip_suffix('\n').unwrap_or(text);
    text.split('\n')
        .map(|line| Node::code_line(line.strip_suffix('\r').unwrap_or(line)))
        .collect()
}

fn finish_block(
    kind: NodeKind,
    children: Vec<Node>,
    text: String,
    display_math: bool,
    attachment: Option<(String, u64)>,
) -> Node {
    match kind {
        NodeKind::Code { .. } => Node::new(kind, code_lines(&text)),
        NodeKind::Paragraph => {
            let children = split_wiki_links(normalize_inlines(children));
            if display_math && let Some(value) = sole_math(&children) {
                return katex_block(&value);
            }
            if let Some((url, size)) = attachment
                && children
                    .iter()
                    .all(|c| c.marks().is_some_and(|m| m.link.as_deref() == Some(url.as_str())))
            {
                let name: String = children.iter().map(Node::plain_text).collect();
                return Node::leaf(NodeKind::Attachment { url, name, size });
            }
            Node::new(kind, children)
        }
        NodeKind::Heading { .. } => Node::new(kind, split_wiki_links(normalize_inlines(children))),
        NodeKind::ListItem { checked: None } => {
            let mut children = children;
            let checked = strip_task_marker(&mut children);
            Node::new(NodeKind::ListItem { checked }, children)
        }
        _ => Node::new(kind, children),
    }
}

fn sole_math(children: &[Node]) -> Option<String> {
    let mut value = None;
    for child in children {
        match &child.kind {
            NodeKind::InlineMath { value: v } if value.is_none() => value = Some(v.clone()),
            NodeKind::Text { text, .. } if text.trim().is_empty() => {}
            _ => return None,
        }
    }
    value
}

fn katex_block(value: &str) -> Node {
    let value = value.strip_prefix('\n').unwrap_or(value);
    let value = value.strip_suffix('\n').unwrap_or(value);
    Node::new(
        NodeKind::Code {
            language: Some("latex".to_string()),
            katex: true,
            render: false,
            frontmatter: false,
        },
        code_lines(value),
    )
}

/// Fallback for `[ ]`/`[x]` markers the task-list extension did not consume.
fn strip_task_marker(children: &mut [Node]) -> Option<bool> {
    let paragraph = children.first_mut()?;
    if !matches!(paragraph.kind, NodeKind::Paragraph) {
        return None;
    }
    let first = paragraph.children.first_mut()?;
    let NodeKind::Text { text, marks } = &mut first.kind else {
        return None;
    };
    if !marks.is_plain() {
        return None;
    }
    let checked = if text.starts_with("[ ] ") {
        false
    } else if text.starts_with("[x] ") || text.starts_with("[X] ") {
        true
    } else {
        return None;
    };
    text.replace_range(..4, "");
    Some(checked)
}

fn split_wiki_links(children: Vec<Node>) -> Vec<Node> {
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        let splittable = match &child.kind {
            NodeKind::Text { text, marks } => {
                !marks.code && marks.link.is_none() && wiki_regex().is_match(text)
            }
            _ => false,
        };
        if !splittable {
            out.push(child);
            continue;
        }
        let NodeKind::Text { text, marks } = child.kind else {
            continue;
        };
        let mut last = 0;
        for caps in wiki_regex().captures_iter(&text) {
            let (Some(whole), Some(target)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > last {
                out.push(Node::marked_text(&text[last..whole.start()], marks.clone()));
            }
            out.push(Node::leaf(NodeKind::WikiLink {
                target: target.as_str().to_string(),
            }));
            last = whole.end();
        }
        if last < text.len() {
            out.push(Node::marked_text(&text[last..], marks));
        }
    }
    normalize_inlines(out)
}

fn lower_html_block(raw: &str) -> Node {
    let trimmed = raw.trim();
    if let Some(media) = html::img_only(trimmed) {
        return Node::paragraph(vec![Node::leaf(media)]);
    }
    if html::only_inline_tags(trimmed) {
        let mut lowering = Lowering::new(trimmed);
        lowering.inline_html(trimmed, 0..trimmed.len());
        lowering.close_implicit();
        if let Some(paragraph) = lowering.frames.last_mut().and_then(|root| root.children.pop()) {
            return paragraph;
        }
    }
    Node::new(
        NodeKind::Code {
            language: Some("html".to_string()),
            katex: false,
            render: true,
            frontmatter: false,
        },
        code_lines(raw.trim_end_matches('\n')),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_info() {
        assert_eq!(fence_info("js render"), (Some("js".to_string()), true));
        assert_eq!(fence_info("rust"), (Some("rust".to_string()), false));
        assert_eq!(fence_info(""), (None, false));
        assert_eq!(
            fence_info("python {linenos}"),
            (Some("python {linenos}".to_string()), false)
        );
    }

    #[test]
    fn test_blank_lines_between() {
        let src = "a\n\n\n\n\nb";
        assert_eq!(blank_lines_between(src, 1, 6), 4);
        assert_eq!(blank_lines_between("a\n\nb", 2, 3), 1);
    }

    #[test]
    fn test_wiki_split() {
        let out = split_wiki_links(vec![Node::text("see [[Home]] now")]);
        assert_eq!(out.len(), 3);
        assert!(matches!(&out[1].kind, NodeKind::WikiLink { target } if target == "Home"));
    }
}
