//! The small subset of HTML the markdown layer understands.
//!
//! Inline tags that map onto marks (`<b>`, `<i>`, `<del>`, `<code>`, `<span style="color:…">`,
//! `<a href>`), `<br>` and `<img>` are recognised; everything else is treated as opaque markup.

use crate::node::{Marks, NodeKind};
use regex::Regex;
use std::sync::OnceLock;

/// One piece of an HTML fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HtmlPiece<'a> {
    /// A tag, including its angle brackets.
    Tag(&'a str),
    /// Text between tags.
    Text(&'a str),
}

/// A parsed tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HtmlTag {
    /// Lowercase tag name.
    pub name: String,
    /// `</name>`.
    pub closing: bool,
    /// Raw attribute text.
    pub attrs: String,
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^<(/?)([A-Za-z][A-Za-z0-9-]*)((?:\s[^>]*)?)/?>$").expect("valid tag regex")
    })
}

fn attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#)
            .expect("valid attribute regex")
    })
}

fn color_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:^|;)\s*color\s*:\s*([^;]+?)\s*(?:;|$)").expect("valid color regex")
    })
}

/// Parse a single tag such as `<a href="x">` or `</b>`.
pub(crate) fn parse_tag(raw: &str) -> Option<HtmlTag> {
    let caps = tag_regex().captures(raw.trim())?;
    Some(HtmlTag {
        name: caps[2].to_ascii_lowercase(),
        closing: !caps[1].is_empty(),
        attrs: caps[3].trim().trim_end_matches('/').trim().to_string(),
    })
}

/// Value of attribute `name` in raw attribute text.
pub(crate) fn attr(attrs: &str, name: &str) -> Option<String> {
    attr_regex().captures_iter(attrs).find_map(|caps| {
        caps[1].eq_ignore_ascii_case(name).then(|| {
            caps.get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map_or(String::new(), |m| m.as_str().to_string())
        })
    })
}

/// Split an HTML fragment into tags and text.
pub(crate) fn split_pieces(html: &str) -> Vec<HtmlPiece<'_>> {
    let mut pieces = Vec::new();
    let mut rest = html;
    while !rest.is_empty() {
        match rest.find('<') {
            Some(0) => match rest.find('>') {
                Some(end) => {
                    pieces.push(HtmlPiece::Tag(&rest[..=end]));
                    rest = &rest[end + 1..];
                }
                None => {
                    pieces.push(HtmlPiece::Text(rest));
                    rest = "";
                }
            },
            Some(start) => {
                pieces.push(HtmlPiece::Text(&rest[..start]));
                rest = &rest[start..];
            }
            None => {
                pieces.push(HtmlPiece::Text(rest));
                rest = "";
            }
        }
    }
    pieces
}

/// Tags that change marks.
pub(crate) fn is_mark_tag(name: &str) -> bool {
    matches!(
        name,
        "b" | "strong" | "i" | "em" | "del" | "s" | "strike" | "code" | "span" | "a"
    )
}

/// Tags the inline reinterpretation understands.
pub(crate) fn is_inline_tag(name: &str) -> bool {
    is_mark_tag(name) || matches!(name, "br" | "img")
}

/// Returns `true` when every tag of `html` is a well-formed inline tag.
pub(crate) fn only_inline_tags(html: &str) -> bool {
    let pieces = split_pieces(html);
    pieces.iter().any(|p| matches!(p, HtmlPiece::Tag(_)))
        && pieces.iter().all(|piece| match piece {
            HtmlPiece::Tag(raw) => parse_tag(raw).is_some_and(|tag| is_inline_tag(&tag.name)),
            HtmlPiece::Text(_) => true,
        })
}

/// Apply an opening mark tag to `marks`. Returns `false` for tags that carry no mark.
pub(crate) fn apply_mark_tag(tag: &HtmlTag, marks: &mut Marks) -> bool {
    match tag.name.as_str() {
        "b" | "strong" => marks.bold = true,
        "i" | "em" => marks.italic = true,
        "del" | "s" | "strike" => marks.strikethrough = true,
        "code" => marks.code = true,
        "span" => match attr(&tag.attrs, "style").as_deref().and_then(style_color) {
            Some(color) => marks.highlight = Some(color),
            None => return false,
        },
        "a" => match attr(&tag.attrs, "href") {
            Some(href) => marks.link = Some(href),
            None => return false,
        },
        _ => return false,
    }
    true
}

/// `color` declaration of an inline style.
pub(crate) fn style_color(style: &str) -> Option<String> {
    color_regex()
        .captures(style)
        .map(|caps| caps[1].trim().to_string())
        .filter(|color| !color.is_empty())
}

/// `Media` for an `<img>` tag.
pub(crate) fn media_from_img(tag: &HtmlTag) -> Option<NodeKind> {
    let url = attr(&tag.attrs, "src")?;
    let dimension = |name: &str| {
        attr(&tag.attrs, name).and_then(|v| v.trim_end_matches("px").trim().parse::<u32>().ok())
    };
    Some(NodeKind::Media {
        url,
        alt: attr(&tag.attrs, "alt").unwrap_or_default(),
        width: dimension("width"),
        height: dimension("height"),
    })
}

/// If `html` is nothing but a single `<img>` tag, its media node.
pub(crate) fn img_only(html: &str) -> Option<NodeKind> {
    let tag = parse_tag(html.trim())?;
    if tag.name != "img" || tag.closing {
        return None;
    }
    media_from_img(&tag)
}

/// Render an `<img>` tag.
pub(crate) fn img_tag(url: &str, alt: &str, width: Option<u32>, height: Option<u32>) -> String {
    let mut out = format!("<img src=\"{}\"", escape_attr(url));
    if !alt.is_empty() {
        out.push_str(&format!(" alt=\"{}\"", escape_attr(alt)));
    }
    if let Some(width) = width {
        out.push_str(&format!(" width=\"{width}\""));
    }
    if let Some(height) = height {
        out.push_str(&format!(" height=\"{height}\""));
    }
    out.push('>');
    out
}

/// Escape an attribute value for double quotes.
pub(crate) fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

const BLOCK_LEVEL_TAGS: &[&str] = &[
    "address", "article", "aside", "base", "basefont", "blockquote", "body", "caption",
    "center", "col", "colgroup", "dd", "details", "dialog", "dir", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "frame", "frameset", "h1", "h2", "h3",
    "h4", "h5", "h6", "head", "header", "hr", "html", "iframe", "legend", "li", "link", "main",
    "menu", "menuitem", "nav", "noframes", "ol", "optgroup", "option", "p", "param", "search",
    "section", "summary", "table", "tbody", "td", "tfoot", "th", "thead", "title", "tr",
    "track", "ul", "pre", "script", "style", "textarea",
];

/// Returns `true` when `line` starts a CommonMark HTML block by itself (a block-level tag).
pub(crate) fn opens_html_block(line: &str) -> bool {
    if line.starts_with(' ') || line.starts_with('\t') {
        return false;
    }
    let Some(rest) = line.strip_prefix('<') else {
        return false;
    };
    let rest = rest.strip_prefix('/').unwrap_or(rest);
    let name: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    let after = rest[name.len()..].chars().next();
    BLOCK_LEVEL_TAGS.contains(&name.as_str())
        && matches!(after, None | Some(' ' | '\t' | '>' | '/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag() {
        let tag = parse_tag(r#"<a href="https://x.y">"#).unwrap();
        assert_eq!(tag.name, "a");
        assert!(!tag.closing);
        assert_eq!(attr(&tag.attrs, "href").as_deref(), Some("https://x.y"));

        assert!(parse_tag("</B>").unwrap().closing);
        assert_eq!(parse_tag("<br/>").unwrap().name, "br");
        assert!(parse_tag("<!-- c -->").is_none());
    }

    #[test]
    fn test_span_color() {
        let mut marks = Marks::plain();
        let tag = parse_tag(r#"<span style="font-weight: 1; color: #f00">"#).unwrap();
        assert!(apply_mark_tag(&tag, &mut marks));
        assert_eq!(marks.highlight.as_deref(), Some("#f00"));
    }

    #[test]
    fn test_inline_only_detection() {
        assert!(only_inline_tags("<b>x</b> and <i>y</i>"));
        assert!(!only_inline_tags("<div>x</div>"));
        assert!(!only_inline_tags("plain"));
        assert!(img_only(r#"<img src="a.png" width="20">"#).is_some());
    }

    #[test]
    fn test_block_level_detection() {
        assert!(opens_html_block("<div class=\"x\">"));
        assert!(opens_html_block("</table>"));
        assert!(!opens_html_block("<b>"));
        assert!(!opens_html_block("<divx>"));
        assert!(!opens_html_block("  <div>"));
    }
}
