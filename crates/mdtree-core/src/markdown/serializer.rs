//! Document tree → markdown text.
//!
//! The serializer is the parser's near-inverse: for trees the parser produces,
//! `parse(serialize(tree))` is structurally equal to `tree` up to whitespace normalization.
//! Output is a pure function of each top-level block (plus whether it must use the alternate
//! list marker), so [`MarkdownSerializer`] memoizes blocks by [`NodeId`].

use super::html;
use super::parser::DEFAULT_BLANK_LINE_THRESHOLD;
use crate::delta::ChangeSet;
use crate::document::Document;
use crate::node::{Align, Marks, Node, NodeId, NodeKind};
use crate::text::str_width;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Serialize with the default blank-line threshold.
pub fn serialize(document: &Document) -> String {
    serialize_with_threshold(document, DEFAULT_BLANK_LINE_THRESHOLD)
}

/// Serialize; runs of `k` empty top-level paragraphs become `k + threshold - 1` blank lines.
pub fn serialize_with_threshold(document: &Document, threshold: usize) -> String {
    join_top_level(document, threshold, |block, alternate| {
        block_markdown(block, alternate)
    })
}

/// Memoizing serializer: caches the output of each top-level block by node identity.
#[derive(Debug, Default)]
pub struct MarkdownSerializer {
    threshold: usize,
    cache: HashMap<(NodeId, bool), String>,
}

impl MarkdownSerializer {
    /// Create a serializer using `threshold` for empty-paragraph spacing.
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(2),
            cache: HashMap::new(),
        }
    }

    /// Serialize `document`, reusing cached output for unchanged blocks.
    pub fn serialize(&mut self, document: &Document) -> String {
        let cache = &mut self.cache;
        join_top_level(document, self.threshold, |block, alternate| {
            cache
                .entry((block.id, alternate))
                .or_insert_with(|| block_markdown(block, alternate))
                .clone()
        })
    }

    /// Drop cached output for every block in `changes`.
    pub fn invalidate(&mut self, changes: &ChangeSet) {
        if changes.full {
            self.cache.clear();
        } else {
            self.cache.retain(|(id, _), _| !changes.nodes.contains(id));
        }
    }

    /// Number of cached blocks.
    pub fn cached_blocks(&self) -> usize {
        self.cache.len()
    }
}

fn is_empty_paragraph(node: &Node) -> bool {
    matches!(node.kind, NodeKind::Paragraph) && node.content_len() == 0
}

fn join_top_level(
    document: &Document,
    threshold: usize,
    mut render: impl FnMut(&Node, bool) -> String,
) -> String {
    let blocks = document.children();
    let first = blocks.iter().position(|b| !is_empty_paragraph(b));
    let last = blocks.iter().rposition(|b| !is_empty_paragraph(b));
    let (Some(first), Some(last)) = (first, last) else {
        return String::new();
    };

    let mut out = String::new();
    let mut previous: Option<&Node> = None;
    let mut alternate = false;
    let mut empties = 0usize;
    for (i, block) in blocks[first..=last].iter().enumerate() {
        if is_empty_paragraph(block) {
            empties += 1;
            continue;
        }
        if i > 0 {
            let blank_lines = if empties > 0 {
                empties + threshold - 1
            } else {
                1
            };
            out.push_str(&"\n".repeat(blank_lines + 1));
        }
        alternate = next_alternate(previous, block, alternate);
        let frontmatter_allowed = i == 0;
        if !frontmatter_allowed && is_frontmatter(block) {
            out.push_str(&code_markdown(block, false));
        } else {
            out.push_str(&render(block, alternate));
        }
        previous = Some(block);
        empties = 0;
    }
    out
}

fn is_frontmatter(node: &Node) -> bool {
    matches!(
        node.kind,
        NodeKind::Code {
            frontmatter: true,
            ..
        }
    )
}

/// Same-kind lists next to each other alternate markers so they stay separate.
fn next_alternate(previous: Option<&Node>, block: &Node, alternate: bool) -> bool {
    match (previous.map(|p| &p.kind), &block.kind) {
        (
            Some(NodeKind::List { ordered: a, .. }),
            NodeKind::List { ordered: b, .. },
        ) if a == b => !alternate,
        _ => false,
    }
}

/// Markdown for one block (no trailing newline).
fn block_markdown(node: &Node, alternate: bool) -> String {
    match &node.kind {
        NodeKind::Paragraph => paragraph_markdown(node),
        NodeKind::Heading { level } => {
            let text = inline_markdown(&node.children, InlineContext::Heading);
            let hashes = "#".repeat((*level).clamp(1, 5) as usize);
            if text.is_empty() {
                hashes
            } else {
                format!("{hashes} {text}")
            }
        }
        NodeKind::List { ordered, start } => list_markdown(node, *ordered, *start, alternate),
        NodeKind::Blockquote => {
            let inner = blocks_markdown(&node.children, "\n\n");
            prefix_lines(&inner, "> ", ">")
        }
        NodeKind::Table => table_markdown(node),
        NodeKind::Code { .. } => code_markdown(node, true),
        NodeKind::ThematicBreak => "---".to_string(),
        NodeKind::Attachment { url, name, size } => format!(
            "[{}]({} \"attachment:{size}\")",
            escape_text(name, InlineContext::Paragraph),
            link_destination(url)
        ),
        // Stray nodes are normalized away before serialization; render their text.
        _ => escape_text(&node.plain_text(), InlineContext::Paragraph),
    }
}

/// Markdown for a sequence of sibling blocks inside a container.
fn blocks_markdown(children: &[Node], separator: &str) -> String {
    let mut out = String::new();
    let mut previous: Option<&Node> = None;
    let mut alternate = false;
    for child in children {
        if previous.is_some() {
            out.push_str(separator);
        }
        alternate = next_alternate(previous, child, alternate);
        out.push_str(&block_markdown(child, alternate));
        previous = Some(child);
    }
    out
}

fn prefix_lines(text: &str, prefix: &str, empty_prefix: &str) -> String {
    text.split('\n')
        .map(|line| {
            if line.is_empty() {
                empty_prefix.to_string()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn paragraph_markdown(node: &Node) -> String {
    if let [only] = node.children.as_slice()
        && let NodeKind::Media {
            url,
            alt,
            width,
            height,
        } = &only.kind
        && (width.is_some() || height.is_some())
    {
        return html::img_tag(url, alt, *width, *height);
    }
    escape_line_starts(&inline_markdown(&node.children, InlineContext::Paragraph))
}

fn list_markdown(node: &Node, ordered: bool, start: Option<u64>, alternate: bool) -> String {
    let first_number = start.unwrap_or(1);
    let mut items = Vec::with_capacity(node.children.len());
    for (i, item) in node.children.iter().enumerate() {
        let marker = if ordered {
            let delimiter = if alternate { ')' } else { '.' };
            format!("{}{delimiter} ", first_number + i as u64)
        } else if alternate {
            "* ".to_string()
        } else {
            "- ".to_string()
        };
        let task = match item.kind {
            NodeKind::ListItem {
                checked: Some(true),
            } => "[x] ",
            NodeKind::ListItem {
                checked: Some(false),
            } => "[ ] ",
            _ => "",
        };
        let body = item_body(&item.children);
        let indent = " ".repeat(marker.len());
        let mut lines = body.split('\n');
        let first_line = lines.next().unwrap_or_default();
        let mut text = if first_line.is_empty() && task.is_empty() {
            marker.trim_end().to_string()
        } else {
            format!("{marker}{task}{first_line}")
        };
        for line in lines {
            text.push('\n');
            if !line.is_empty() {
                text.push_str(&indent);
                text.push_str(line);
            }
        }
        items.push(text);
    }
    items.join("\n")
}

fn item_body(children: &[Node]) -> String {
    let mut out = String::new();
    let mut previous: Option<&Node> = None;
    let mut alternate = false;
    for child in children {
        if previous.is_some() {
            let separator = if matches!(child.kind, NodeKind::List { .. }) {
                "\n"
            } else {
                "\n\n"
            };
            out.push_str(separator);
        }
        alternate = next_alternate(previous, child, alternate);
        out.push_str(&block_markdown(child, alternate));
        previous = Some(child);
    }
    out
}

fn longest_run(text: &str, ch: char) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == ch {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

fn code_markdown(node: &Node, frontmatter_allowed: bool) -> String {
    let NodeKind::Code {
        language,
        katex,
        render,
        frontmatter,
    } = &node.kind
    else {
        return String::new();
    };
    let lines: Vec<String> = node.children.iter().map(Node::plain_text).collect();
    let body = lines.join("\n");

    if *katex {
        return format!("$$\n{body}\n$$");
    }
    if *frontmatter && frontmatter_allowed {
        return format!("---\n{body}\n---");
    }
    if *render
        && language
            .as_deref()
            .is_some_and(|l| l.eq_ignore_ascii_case("html"))
        && lines.first().is_some_and(|l| html::opens_html_block(l))
        && !lines.iter().any(|l| l.trim().is_empty())
    {
        return body;
    }

    let fence = "`".repeat(longest_run(&body, '`').max(2) + 1);
    let mut info = language.clone().unwrap_or_default();
    if *render {
        info.push_str(" render");
    }
    format!("{fence}{info}\n{body}\n{fence}")
}

fn table_markdown(node: &Node) -> String {
    let columns = node
        .children
        .iter()
        .map(|row| row.children.len())
        .max()
        .unwrap_or(0);
    if columns == 0 {
        return String::new();
    }

    let cells: Vec<Vec<String>> = node
        .children
        .iter()
        .map(|row| {
            let mut texts: Vec<String> = row.children.iter().map(cell_markdown).collect();
            texts.resize(columns, String::new());
            texts
        })
        .collect();

    let aligns: Vec<Option<Align>> = (0..columns)
        .map(|c| {
            node.children.iter().find_map(|row| match row.children.get(c).map(|cell| &cell.kind) {
                Some(NodeKind::TableCell { align, .. }) => *align,
                _ => None,
            })
        })
        .collect();

    let widths: Vec<usize> = (0..columns)
        .map(|c| cells.iter().map(|row| str_width(&row[c])).max().unwrap_or(0))
        .collect();

    let mut lines = Vec::with_capacity(cells.len() + 1);
    for (r, row) in cells.iter().enumerate() {
        let padded: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(c, text)| pad_cell(text, widths[c], aligns[c]))
            .collect();
        lines.push(format!("| {} |", padded.join(" | ")));
        if r == 0 {
            let separators: Vec<String> = (0..columns)
                .map(|c| separator_cell(widths[c], aligns[c]))
                .collect();
            lines.push(format!("| {} |", separators.join(" | ")));
        }
    }
    lines.join("\n")
}

fn pad_cell(text: &str, width: usize, align: Option<Align>) -> String {
    let missing = width.saturating_sub(str_width(text));
    match align {
        Some(Align::Right) => format!("{}{text}", " ".repeat(missing)),
        Some(Align::Center) => {
            let left = missing / 2;
            format!("{}{text}{}", " ".repeat(left), " ".repeat(missing - left))
        }
        _ => format!("{text}{}", " ".repeat(missing)),
    }
}

fn separator_cell(width: usize, align: Option<Align>) -> String {
    let colons = match align {
        Some(Align::Center) => 2,
        Some(_) => 1,
        None => 0,
    };
    let dashes = "-".repeat(width.saturating_sub(colons).max(2));
    match align {
        Some(Align::Left) => format!(":{dashes}"),
        Some(Align::Right) => format!("{dashes}:"),
        Some(Align::Center) => format!(":{dashes}:"),
        None => dashes,
    }
}

fn cell_markdown(cell: &Node) -> String {
    cell.children
        .iter()
        .map(|block| match block.kind {
            NodeKind::Paragraph | NodeKind::Heading { .. } => {
                inline_markdown(&block.children, InlineContext::TableCell)
            }
            _ => escape_text(&block.plain_text().replace('\n', " "), InlineContext::TableCell),
        })
        .collect::<Vec<_>>()
        .join("<br>")
}

/// Where inline content is being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InlineContext {
    Paragraph,
    Heading,
    TableCell,
}

fn entity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^&(?:#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[A-Za-z][A-Za-z0-9]{1,31});").expect("valid entity regex"))
}

fn escape_text(text: &str, context: InlineContext) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, ch) in text.char_indices() {
        match ch {
            '\\' | '*' | '_' | '`' | '[' | ']' | '<' | '~' | '$' | '|' => {
                out.push('\\');
                out.push(ch);
            }
            '&' if entity_regex().is_match(&text[i..]) => out.push_str("\\&"),
            '\n' => match context {
                InlineContext::Paragraph => out.push('\n'),
                InlineContext::Heading | InlineContext::TableCell => out.push(' '),
            },
            _ => out.push(ch),
        }
    }
    out
}

fn ordered_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^( {0,3})([0-9]{1,9})([.)])").expect("valid ordered marker regex"))
}

/// Neutralise block syntax at the start of every line of a paragraph.
fn escape_line_starts(text: &str) -> String {
    text.split('\n')
        .map(escape_line_start)
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_line_start(line: &str) -> String {
    let rest = line.trim_start_matches([' ', '\t']);
    if rest.len() < line.len() {
        // Leading whitespace would be stripped or start an indented code block.
        let lead: String = line[..line.len() - rest.len()]
            .chars()
            .map(|ch| if ch == '\t' { "&#9;" } else { "&#32;" })
            .collect();
        return format!("{lead}{rest}");
    }
    let mut chars = rest.chars();
    let first = chars.next();
    let second = chars.next();
    let needs_escape = match first {
        Some('#' | '>' | '=') => true,
        Some('-' | '+') => {
            matches!(second, None | Some(' ' | '\t'))
                || rest.chars().all(|c| c == '-' || c == ' ')
        }
        _ => false,
    };
    if needs_escape {
        return format!("\\{rest}");
    }
    if let Some(caps) = ordered_marker_regex().captures(line) {
        let after = &line[caps[0].len()..];
        if after.is_empty() || after.starts_with([' ', '\t']) {
            return format!("{}{}\\{}{}", &caps[1], &caps[2], &caps[3], after);
        }
    }
    line.to_string()
}

fn code_span(text: &str) -> String {
    let fence = "`".repeat(longest_run(text, '`') + 1);
    let pad = text.starts_with('`')
        || text.ends_with('`')
        || (text.starts_with(' ') && text.ends_with(' ') && !text.trim().is_empty());
    if pad {
        format!("{fence} {text} {fence}")
    } else {
        format!("{fence}{text}{fence}")
    }
}

/// Wrap `body` in `open`/`close`, keeping leading and trailing whitespace outside the markers.
fn wrap_hoisted(body: &str, open: &str, close: &str) -> String {
    let start = body.len() - body.trim_start().len();
    let end = body.trim_end().len();
    if start >= end {
        return body.to_string();
    }
    format!(
        "{}{open}{}{close}{}",
        &body[..start],
        &body[start..end],
        &body[end..]
    )
}

fn uses_delimiters(marks: &Marks) -> bool {
    (marks.bold || marks.italic || marks.strikethrough)
        && !(marks.strikethrough && (marks.bold || marks.italic))
}

fn leaf_markdown(text: &str, marks: &Marks, context: InlineContext) -> String {
    if marks.footnote_ref {
        return format!("[^{text}]");
    }
    if marks.footnote_def {
        return format!("[^{text}]: ");
    }
    let mut body = if marks.code {
        let span = code_span(text);
        if context == InlineContext::TableCell {
            span.replace('|', "\\|")
        } else {
            span
        }
    } else {
        escape_text(text, context)
    };

    if marks.strikethrough && (marks.bold || marks.italic) {
        let (mut open, mut close) = ("<del>".to_string(), "</del>".to_string());
        if marks.bold {
            open.push_str("<b>");
            close.insert_str(0, "</b>");
        }
        if marks.italic {
            open.push_str("<i>");
            close.insert_str(0, "</i>");
        }
        body = wrap_hoisted(&body, &open, &close);
    } else {
        if marks.bold {
            body = wrap_hoisted(&body, "**", "**");
        }
        if marks.strikethrough {
            body = wrap_hoisted(&body, "~~", "~~");
        }
        if marks.italic {
            body = wrap_hoisted(&body, "*", "*");
        }
    }
    if let Some(color) = &marks.highlight {
        body = wrap_hoisted(
            &body,
            &format!("<span style=\"color: {}\">", html::escape_attr(color)),
            "</span>",
        );
    }
    body
}

fn link_destination(url: &str) -> String {
    if url.is_empty() || url.contains([' ', '(', ')', '<', '>']) {
        format!("<{}>", url.replace('<', "%3C").replace('>', "%3E"))
    } else {
        url.to_string()
    }
}

fn void_markdown(node: &Node, context: InlineContext) -> String {
    match &node.kind {
        NodeKind::Break => match context {
            InlineContext::Paragraph => "\\\n".to_string(),
            InlineContext::Heading => " ".to_string(),
            InlineContext::TableCell => "<br>".to_string(),
        },
        NodeKind::InlineMath { value } => format!("${value}$"),
        NodeKind::WikiLink { target } => format!("[[{target}]]"),
        NodeKind::Media {
            url,
            alt,
            width,
            height,
        } => {
            if width.is_some() || height.is_some() {
                html::img_tag(url, alt, *width, *height)
            } else {
                format!(
                    "![{}]({})",
                    escape_text(alt, InlineContext::Heading),
                    link_destination(url)
                )
            }
        }
        _ => String::new(),
    }
}

/// Markdown for inline content.
fn inline_markdown(children: &[Node], context: InlineContext) -> String {
    let mut out = String::new();
    let mut previous_delimited: Option<&Marks> = None;
    let mut i = 0;
    while i < children.len() {
        let child = &children[i];
        let Some(marks) = child.marks() else {
            out.push_str(&void_markdown(child, context));
            previous_delimited = None;
            i += 1;
            continue;
        };

        if let Some(url) = marks.link.as_deref() {
            let mut end = i + 1;
            while end < children.len()
                && children[end]
                    .marks()
                    .is_some_and(|m| m.link.as_deref() == Some(url))
            {
                end += 1;
            }
            let inner: String = children[i..end]
                .iter()
                .filter_map(|leaf| {
                    let text = leaf.as_text()?;
                    let marks = Marks {
                        link: None,
                        ..leaf.marks()?.clone()
                    };
                    Some(leaf_markdown(text, &marks, context))
                })
                .collect();
            out.push_str(&format!("[{inner}]({})", link_destination(url)));
            previous_delimited = None;
            i = end;
            continue;
        }

        let text = child.as_text().unwrap_or_default();
        if let Some(previous) = previous_delimited
            && uses_delimiters(marks)
            && previous != marks
            && !out.ends_with(char::is_whitespace)
            && !text.starts_with(char::is_whitespace)
        {
            out.push(' ');
        }
        out.push_str(&leaf_markdown(text, marks, context));
        previous_delimited = uses_delimiters(marks).then_some(marks);
        i += 1;
    }

    if context == InlineContext::Heading && out.ends_with('#') {
        out.pop();
        out.push_str("\\#");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Mark;

    #[test]
    fn test_hoists_whitespace() {
        assert_eq!(wrap_hoisted("  bold ", "**", "**"), "  **bold** ");
        assert_eq!(wrap_hoisted("   ", "**", "**"), "   ");
    }

    #[test]
    fn test_mixed_strike_uses_html() {
        let marks = Marks::plain().with(Mark::Strikethrough).with(Mark::Bold);
        assert_eq!(
            leaf_markdown("x", &marks, InlineContext::Paragraph),
            "<del><b>x</b></del>"
        );
    }

    #[test]
    fn test_space_between_adjacent_marked_leaves() {
        let children = vec![
            Node::marked_text("a", Marks::plain().with(Mark::Bold)),
            Node::marked_text("b", Marks::plain().with(Mark::Italic)),
        ];
        assert_eq!(inline_markdown(&children, InlineContext::Paragraph), "**a** *b*");
    }

    #[test]
    fn test_line_start_escapes() {
        assert_eq!(escape_line_start("# not a heading"), "\\# not a heading");
        assert_eq!(escape_line_start("1. one"), "1\\. one");
        assert_eq!(escape_line_start("- item"), "\\- item");
        assert_eq!(escape_line_start("---"), "\\---");
        assert_eq!(escape_line_start("-dash"), "-dash");
        assert_eq!(escape_line_start("2024 was"), "2024 was");
    }

    #[test]
    fn test_code_span_fences() {
        assert_eq!(code_span("a`b"), "``a`b``");
        assert_eq!(code_span("`x"), "`` `x ``");
    }

    #[test]
    fn test_entity_escape() {
        assert_eq!(escape_text("a &amp; b & c", InlineContext::Paragraph), "a \\&amp; b & c");
    }
}
