#![warn(missing_docs)]
//! `mdtree-lang` - data-driven language configuration helpers for `mdtree-core`.
//!
//! This crate intentionally stays lightweight and does **not** depend on any parsing or
//! highlighting systems. It maps the language tag of a fenced code block (```` ```js ````) to a
//! small [`LanguageConfig`] that the engine uses for code-line auto indentation and that
//! highlighters use to build comment rules.

/// Comment tokens/config for a given language.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommentConfig {
    /// Line comment token (e.g. `//`, `#`).
    pub line: Option<String>,
    /// Block comment start token (e.g. `/*`).
    pub block_start: Option<String>,
    /// Block comment end token (e.g. `*/`).
    pub block_end: Option<String>,
}

impl CommentConfig {
    /// Create a config that supports only line comments.
    pub fn line(token: impl Into<String>) -> Self {
        Self {
            line: Some(token.into()),
            block_start: None,
            block_end: None,
        }
    }

    /// Create a config that supports only block comments.
    pub fn block(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            line: None,
            block_start: Some(start.into()),
            block_end: Some(end.into()),
        }
    }

    /// Create a config that supports both line and block comments.
    pub fn line_and_block(
        line: impl Into<String>,
        block_start: impl Into<String>,
        block_end: impl Into<String>,
    ) -> Self {
        Self {
            line: Some(line.into()),
            block_start: Some(block_start.into()),
            block_end: Some(block_end.into()),
        }
    }

    /// Returns `true` if a line comment token is configured.
    pub fn has_line(&self) -> bool {
        self.line.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Returns `true` if both block comment tokens are configured.
    pub fn has_block(&self) -> bool {
        self.block_start.as_deref().is_some_and(|s| !s.is_empty())
            && self.block_end.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Brackets that trigger one extra indent level when Enter is pressed right after them.
pub const DEFAULT_OPEN_BRACKETS: &[char] = &['(', '[', '{'];

/// Per-language editing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageConfig {
    /// Canonical language id (lowercase, e.g. `javascript`).
    pub id: &'static str,
    /// Comment tokens.
    pub comment: CommentConfig,
    /// Opening brackets that increase indentation on the next line.
    pub open_brackets: Vec<char>,
    /// Keywords, used by simple highlighters. May be empty.
    pub keywords: &'static [&'static str],
}

impl LanguageConfig {
    /// Configuration used for unknown languages and untagged fences.
    pub fn plain() -> Self {
        Self {
            id: "plain",
            comment: CommentConfig::default(),
            open_brackets: DEFAULT_OPEN_BRACKETS.to_vec(),
            keywords: &[],
        }
    }

    /// Returns `true` if `ch` is an opening bracket for this language.
    pub fn is_open_bracket(&self, ch: char) -> bool {
        self.open_brackets.contains(&ch)
    }
}

const ALIASES: &[(&str, &str)] = &[
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("mjs", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("rs", "rust"),
    ("py", "python"),
    ("sh", "shell"),
    ("bash", "shell"),
    ("zsh", "shell"),
    ("yml", "yaml"),
    ("tex", "latex"),
    ("c++", "cpp"),
    ("cc", "cpp"),
    ("h", "c"),
    ("golang", "go"),
    ("md", "markdown"),
    ("htm", "html"),
];

const RUST_KEYWORDS: &[&str] = &[
    "as", "break", "const", "continue", "crate", "else", "enum", "extern", "false", "fn", "for",
    "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref", "return",
    "self", "Self", "static", "struct", "super", "trait", "true", "type", "unsafe", "use",
    "where", "while", "async", "await", "dyn",
];

const JS_KEYWORDS: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "default", "delete", "do", "else",
    "export", "extends", "false", "finally", "for", "function", "if", "import", "in",
    "instanceof", "let", "new", "null", "return", "super", "switch", "this", "throw", "true",
    "try", "typeof", "undefined", "var", "void", "while", "yield", "async", "await",
];

const TS_KEYWORDS: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "default", "do", "else", "enum",
    "export", "extends", "false", "for", "function", "if", "implements", "import", "interface",
    "let", "new", "null", "private", "public", "readonly", "return", "this", "throw", "true",
    "try", "type", "typeof", "var", "while", "async", "await",
];

const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

const GO_KEYWORDS: &[&str] = &[
    "break", "case", "chan", "const", "continue", "default", "defer", "else", "fallthrough",
    "for", "func", "go", "goto", "if", "import", "interface", "map", "package", "range",
    "return", "select", "struct", "switch", "type", "var",
];

const C_KEYWORDS: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "int", "long", "register", "return",
    "short", "signed", "sizeof", "static", "struct", "switch", "typedef", "union", "unsigned",
    "void", "volatile", "while", "class", "namespace", "template", "public", "private",
];

const SHELL_KEYWORDS: &[&str] = &[
    "if", "then", "else", "elif", "fi", "case", "esac", "for", "while", "until", "do", "done",
    "in", "function", "return", "export", "local",
];

/// Resolve a fence language tag (case-insensitive, aliases allowed) to its canonical id.
///
/// Only the first whitespace-separated word of `tag` is considered, so fence info strings
/// like `"js render"` resolve too. Returns `None` for an empty tag.
pub fn canonical_language(tag: &str) -> Option<String> {
    let word = tag.split_whitespace().next()?;
    let lower = word.to_ascii_lowercase();
    let resolved = ALIASES
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map(|(_, id)| (*id).to_string())
        .unwrap_or(lower);
    Some(resolved)
}

/// Look up the configuration for a fence language tag.
///
/// Unknown (or missing) languages get [`LanguageConfig::plain`].
pub fn language_config(tag: Option<&str>) -> LanguageConfig {
    let Some(id) = tag.and_then(canonical_language) else {
        return LanguageConfig::plain();
    };

    let (id, comment, keywords): (&'static str, CommentConfig, &'static [&'static str]) =
        match id.as_str() {
            "rust" => (
                "rust",
                CommentConfig::line_and_block("//", "/*", "*/"),
                RUST_KEYWORDS,
            ),
            "javascript" => (
                "javascript",
                CommentConfig::line_and_block("//", "/*", "*/"),
                JS_KEYWORDS,
            ),
            "typescript" => (
                "typescript",
                CommentConfig::line_and_block("//", "/*", "*/"),
                TS_KEYWORDS,
            ),
            "c" => ("c", CommentConfig::line_and_block("//", "/*", "*/"), C_KEYWORDS),
            "cpp" => (
                "cpp",
                CommentConfig::line_and_block("//", "/*", "*/"),
                C_KEYWORDS,
            ),
            "go" => ("go", CommentConfig::line_and_block("//", "/*", "*/"), GO_KEYWORDS),
            "python" => ("python", CommentConfig::line("#"), PYTHON_KEYWORDS),
            "shell" => ("shell", CommentConfig::line("#"), SHELL_KEYWORDS),
            "yaml" => ("yaml", CommentConfig::line("#"), &[]),
            "toml" => ("toml", CommentConfig::line("#"), &[]),
            "ini" => ("ini", CommentConfig::line(";"), &[]),
            "json" => ("json", CommentConfig::default(), &[]),
            "html" => ("html", CommentConfig::block("<!--", "-->"), &[]),
            "css" => ("css", CommentConfig::block("/*", "*/"), &[]),
            "latex" => ("latex", CommentConfig::line("%"), &[]),
            "sql" => ("sql", CommentConfig::line_and_block("--", "/*", "*/"), &[]),
            "markdown" => ("markdown", CommentConfig::block("<!--", "-->"), &[]),
            _ => return LanguageConfig::plain(),
        };

    LanguageConfig {
        id,
        comment,
        open_brackets: DEFAULT_OPEN_BRACKETS.to_vec(),
        keywords,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_resolve_case_insensitively() {
        assert_eq!(canonical_language("JS").as_deref(), Some("javascript"));
        assert_eq!(canonical_language("rs").as_deref(), Some("rust"));
        assert_eq!(canonical_language("html render").as_deref(), Some("html"));
        assert_eq!(canonical_language("   "), None);
    }

    #[test]
    fn test_unknown_language_is_plain() {
        let config = language_config(Some("brainfuck"));
        assert_eq!(config.id, "plain");
        assert!(config.is_open_bracket('{'));
        assert!(!config.comment.has_line());
    }

    #[test]
    fn test_comment_tokens() {
        let py = language_config(Some("py"));
        assert_eq!(py.comment.line.as_deref(), Some("#"));
        assert!(!py.comment.has_block());

        let rust = language_config(Some("rust"));
        assert!(rust.comment.has_line());
        assert!(rust.comment.has_block());
        assert!(rust.keywords.contains(&"fn"));
    }
}
