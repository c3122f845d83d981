//! `mdtree-highlight-simple` - Simple (regex-based) syntax highlighting for `mdtree` code blocks.
//!
//! Grammars are derived from [`mdtree_lang::LanguageConfig`]: comments, strings, numbers and the
//! language's keyword list. That is good enough for readable colors in a notes app; it is *not*
//! a parser.

use mdtree_core::decorations::{ColorRange, Highlighter, StyleId};
use mdtree_lang::{LanguageConfig, language_config};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A single regex highlighting rule.
#[derive(Debug, Clone)]
pub struct RegexRule {
    regex: Regex,
    style_id: StyleId,
    capture_group: Option<usize>,
}

impl RegexRule {
    /// Compile a rule coloring whole matches of `pattern`.
    pub fn new(pattern: &str, style_id: StyleId) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            style_id,
            capture_group: None,
        })
    }

    /// Highlight only a capture group of each match.
    ///
    /// Example (INI key):
    /// - pattern: `^\\s*([^=\\s]+)\\s*=`
    /// - capture_group: `1` (the key)
    pub fn with_capture_group(mut self, group: usize) -> Self {
        self.capture_group = Some(group);
        self
    }

    /// Style applied to matches.
    pub fn style_id(&self) -> StyleId {
        self.style_id
    }
}

/// A simple regex-based syntax highlighter.
///
/// Rules are tried in order; a match overlapping a range claimed by an earlier rule is dropped,
/// so comments and strings listed first win over keywords inside them.
#[derive(Debug, Clone)]
pub struct RegexHighlighter {
    rules: Vec<RegexRule>,
}

impl RegexHighlighter {
    /// Create a highlighter from ordered rules.
    pub fn new(rules: Vec<RegexRule>) -> Self {
        Self { rules }
    }

    /// The rules, in priority order.
    pub fn rules(&self) -> &[RegexRule] {
        &self.rules
    }

    /// Run all rules over `code` and return color ranges (char offsets), ordered by start.
    pub fn highlight(&self, code: &str) -> Vec<ColorRange> {
        let mut claimed: Vec<ColorRange> = Vec::new();
        for rule in &self.rules {
            let matches: Vec<(usize, usize)> = match rule.capture_group {
                Some(group) => rule
                    .regex
                    .captures_iter(code)
                    .filter_map(|caps| caps.get(group))
                    .map(|m| (m.start(), m.end()))
                    .collect(),
                None => rule
                    .regex
                    .find_iter(code)
                    .map(|m| (m.start(), m.end()))
                    .collect(),
            };
            let mut found: Vec<ColorRange> = matches
                .into_iter()
                .filter_map(|(start, end)| range_from_match(code, start, end, rule.style_id))
                .filter(|range| {
                    !claimed
                        .iter()
                        .any(|taken| range.start < taken.end && taken.start < range.end)
                })
                .collect();
            claimed.append(&mut found);
        }
        claimed.sort_by_key(|range| range.start);
        claimed
    }

    /// A grammar built from a language configuration.
    ///
    /// Returns `None` for [`LanguageConfig::plain`], which has nothing worth coloring.
    pub fn for_language(
        config: &LanguageConfig,
        styles: SimpleCodeStyles,
    ) -> Result<Option<Self>, regex::Error> {
        match config.id {
            "plain" => return Ok(None),
            "json" => return Self::json_default(SimpleJsonStyles::default()).map(Some),
            "ini" => return Self::ini_default(SimpleIniStyles::default()).map(Some),
            _ => {}
        }

        let mut rules = Vec::new();
        if let (Some(start), Some(end)) = (&config.comment.block_start, &config.comment.block_end)
            && config.comment.has_block()
        {
            let pattern = format!("(?s){}.*?{}", regex::escape(start), regex::escape(end));
            rules.push(RegexRule::new(&pattern, styles.comment)?);
        }
        if let Some(line) = &config.comment.line
            && config.comment.has_line()
        {
            let pattern = format!("(?m){}.*$", regex::escape(line));
            rules.push(RegexRule::new(&pattern, styles.comment)?);
        }
        rules.push(RegexRule::new(
            r#""(?:\\.|[^"\\\n])*"|'(?:\\.|[^'\\\n])*'"#,
            styles.string,
        )?);
        rules.push(RegexRule::new(
            r"\b(?:0[xX][0-9a-fA-F_]+|\d[\d_]*(?:\.\d+)?(?:[eE][+-]?\d+)?)\b",
            styles.number,
        )?);
        if !config.keywords.is_empty() {
            let words: Vec<String> = config.keywords.iter().map(|w| regex::escape(w)).collect();
            let pattern = format!(r"\b(?:{})\b", words.join("|"));
            rules.push(RegexRule::new(&pattern, styles.keyword)?);
        }
        Ok(Some(Self::new(rules)))
    }

    /// A small default JSON grammar (strings, numbers, booleans, null).
    pub fn json_default(styles: SimpleJsonStyles) -> Result<Self, regex::Error> {
        Ok(Self::new(vec![
            // JSON string (single-line, handles escapes)
            RegexRule::new(r#""(?:\\.|[^"\\\n])*""#, styles.string)?,
            RegexRule::new(
                r#"-?(?:0|[1-9]\d*)(?:\.\d+)?(?:[eE][+-]?\d+)?"#,
                styles.number,
            )?,
            RegexRule::new(r#"\b(?:true|false)\b"#, styles.boolean)?,
            RegexRule::new(r#"\bnull\b"#, styles.null)?,
        ]))
    }

    /// A small default INI grammar (section, key, comment).
    pub fn ini_default(styles: SimpleIniStyles) -> Result<Self, regex::Error> {
        Ok(Self::new(vec![
            RegexRule::new(r#"(?m)^[ \t]*[;#].*$"#, styles.comment)?,
            RegexRule::new(r#"(?m)^[ \t]*\[([^\]\n]+)\][ \t]*$"#, styles.section)?
                .with_capture_group(1),
            RegexRule::new(r#"(?m)^[ \t]*([^=\s]+)[ \t]*="#, styles.key)?.with_capture_group(1),
        ]))
    }
}

/// [`Highlighter`] for `mdtree-core` that builds one [`RegexHighlighter`] per language on
/// first use.
#[derive(Debug, Default)]
pub struct SimpleHighlighter {
    styles: SimpleCodeStyles,
    grammars: Mutex<HashMap<String, Option<Arc<RegexHighlighter>>>>,
}

impl SimpleHighlighter {
    /// Create a highlighter using `styles` for code grammars.
    pub fn new(styles: SimpleCodeStyles) -> Self {
        Self {
            styles,
            grammars: Mutex::new(HashMap::new()),
        }
    }

    fn grammar(&self, language: &str) -> Option<Arc<RegexHighlighter>> {
        let mut grammars = match self.grammars.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        grammars
            .entry(language.to_string())
            .or_insert_with(|| {
                let config = language_config(Some(language));
                RegexHighlighter::for_language(&config, self.styles)
                    .ok()
                    .flatten()
                    .map(Arc::new)
            })
            .clone()
    }
}

impl Highlighter for SimpleHighlighter {
    fn highlight(&self, language: &str, code: &str) -> Option<Vec<ColorRange>> {
        Some(self.grammar(language)?.highlight(code))
    }
}

/// Styles for grammars derived from a [`LanguageConfig`].
#[derive(Debug, Clone, Copy)]
pub struct SimpleCodeStyles {
    /// Keywords.
    pub keyword: StyleId,
    /// String literals.
    pub string: StyleId,
    /// Numeric literals.
    pub number: StyleId,
    /// Comments.
    pub comment: StyleId,
}

impl Default for SimpleCodeStyles {
    fn default() -> Self {
        Self {
            keyword: SIMPLE_STYLE_KEYWORD,
            string: SIMPLE_STYLE_STRING,
            number: SIMPLE_STYLE_NUMBER,
            comment: SIMPLE_STYLE_COMMENT,
        }
    }
}

/// Styles for [`RegexHighlighter::json_default`].
#[derive(Debug, Clone, Copy)]
pub struct SimpleJsonStyles {
    /// Strings.
    pub string: StyleId,
    /// Numbers.
    pub number: StyleId,
    /// `true` / `false`.
    pub boolean: StyleId,
    /// `null`.
    pub null: StyleId,
}

impl Default for SimpleJsonStyles {
    fn default() -> Self {
        Self {
            string: SIMPLE_STYLE_STRING,
            number: SIMPLE_STYLE_NUMBER,
            boolean: SIMPLE_STYLE_BOOLEAN,
            null: SIMPLE_STYLE_NULL,
        }
    }
}

/// Styles for [`RegexHighlighter::ini_default`].
#[derive(Debug, Clone, Copy)]
pub struct SimpleIniStyles {
    /// `[section]` names.
    pub section: StyleId,
    /// Keys.
    pub key: StyleId,
    /// Comment lines.
    pub comment: StyleId,
}

impl Default for SimpleIniStyles {
    fn default() -> Self {
        Self {
            section: SIMPLE_STYLE_SECTION,
            key: SIMPLE_STYLE_KEY,
            comment: SIMPLE_STYLE_COMMENT,
        }
    }
}

// Default `StyleId`s; hosts map them to colors.

/// String literal style.
pub const SIMPLE_STYLE_STRING: StyleId = 0x0200_0001;
/// Number style.
pub const SIMPLE_STYLE_NUMBER: StyleId = 0x0200_0002;
/// Boolean style.
pub const SIMPLE_STYLE_BOOLEAN: StyleId = 0x0200_0003;
/// Null style.
pub const SIMPLE_STYLE_NULL: StyleId = 0x0200_0004;
/// Keyword style.
pub const SIMPLE_STYLE_KEYWORD: StyleId = 0x0200_0005;
/// Section style.
pub const SIMPLE_STYLE_SECTION: StyleId = 0x0200_0010;
/// Key style.
pub const SIMPLE_STYLE_KEY: StyleId = 0x0200_0011;
/// Comment style.
pub const SIMPLE_STYLE_COMMENT: StyleId = 0x0200_0012;

fn range_from_match(
    code: &str,
    match_start_byte: usize,
    match_end_byte: usize,
    style_id: StyleId,
) -> Option<ColorRange> {
    if match_start_byte >= match_end_byte || match_end_byte > code.len() {
        return None;
    }

    let start = code[..match_start_byte].chars().count();
    let end = start + code[match_start_byte..match_end_byte].chars().count();
    Some(ColorRange::new(start, end, style_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn styled(ranges: &[ColorRange], code: &str, style: StyleId) -> Vec<String> {
        let chars: Vec<char> = code.chars().collect();
        ranges
            .iter()
            .filter(|r| r.style_id == style)
            .map(|r| chars[r.start..r.end].iter().collect())
            .collect()
    }

    #[test]
    fn test_json_strings_use_char_offsets() {
        let text = r#"{ "key": "值", "n": 12, "ok": true, "x": null }"#;
        let highlighter = RegexHighlighter::json_default(SimpleJsonStyles::default()).unwrap();
        let ranges = highlighter.highlight(text);

        assert_eq!(
            styled(&ranges, text, SIMPLE_STYLE_STRING),
            ["\"key\"", "\"值\"", "\"n\"", "\"ok\"", "\"x\""]
        );
        assert_eq!(styled(&ranges, text, SIMPLE_STYLE_NUMBER), ["12"]);
        assert!(ranges.iter().any(|r| r.style_id == SIMPLE_STYLE_NULL));
    }

    #[test]
    fn test_ini_capture_groups() {
        let text = "[core]\nname = mdtree\n;comment\n";
        let highlighter = RegexHighlighter::ini_default(SimpleIniStyles::default()).unwrap();
        let ranges = highlighter.highlight(text);

        assert_eq!(styled(&ranges, text, SIMPLE_STYLE_SECTION), ["core"]);
        assert_eq!(styled(&ranges, text, SIMPLE_STYLE_KEY), ["name"]);
        assert_eq!(styled(&ranges, text, SIMPLE_STYLE_COMMENT), [";comment"]);
    }

    #[test]
    fn test_keywords_inside_comments_and_strings_are_not_colored() {
        let code = "fn main() {\n    // let x\n    let s = \"fn\"; /* if\n */ 42\n}";
        let ranges = SimpleHighlighter::default().highlight("rs", code).unwrap();

        assert_eq!(styled(&ranges, code, SIMPLE_STYLE_KEYWORD), ["fn", "let"]);
        assert_eq!(
            styled(&ranges, code, SIMPLE_STYLE_COMMENT),
            ["// let x", "/* if\n */"]
        );
        assert_eq!(styled(&ranges, code, SIMPLE_STYLE_STRING), ["\"fn\""]);
        assert_eq!(styled(&ranges, code, SIMPLE_STYLE_NUMBER), ["42"]);
    }

    #[test]
    fn test_unknown_language_has_no_grammar() {
        let highlighter = SimpleHighlighter::default();
        assert!(highlighter.highlight("brainfuck", "+++").is_none());
        assert!(highlighter.highlight("python", "# hi").is_some());
    }
}
