//! Char-offset search over text blocks.
//!
//! A [`SearchQuery`] runs over the flattened text of a text block ([`Node::block_text`]), so
//! match offsets line up with caret offsets. Inline voids flatten to a single
//! object-replacement character and never match ordinary queries.
//!
//! [`Node::block_text`]: crate::node::Node::block_text

use crate::document::Document;
use crate::path::{Path, Point};
use regex::{Regex, RegexBuilder};
use thiserror::Error;

/// How a query matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Match case exactly.
    pub case_sensitive: bool,
    /// Only match runs not touching other word characters (alphanumerics and `_`).
    pub whole_word: bool,
    /// The query is a regex pattern instead of literal text.
    pub regex: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            whole_word: false,
            regex: false,
        }
    }
}

/// Half-open char range `[start, end)` of one match inside a text block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchMatch {
    /// First char.
    pub start: usize,
    /// One past the last char.
    pub end: usize,
}

impl SearchMatch {
    /// Length in chars.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Whether the range is empty.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Search errors.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The regex query does not compile.
    #[error("invalid regex: {0}")]
    InvalidRegex(#[from] regex::Error),
}

/// A compiled query, reusable across text blocks.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    regex: Regex,
    options: SearchOptions,
}

impl SearchQuery {
    /// Compile `query`; an empty query yields `Ok(None)`.
    pub fn new(query: &str, options: SearchOptions) -> Result<Option<Self>, SearchError> {
        if query.is_empty() {
            return Ok(None);
        }
        let pattern = if options.regex {
            query.to_string()
        } else {
            regex::escape(query)
        };
        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(!options.case_sensitive)
            .build()?;
        Ok(Some(Self { regex, options }))
    }

    /// Options the query was compiled with.
    pub fn options(&self) -> SearchOptions {
        self.options
    }

    /// Non-empty matches in `text`, in order.
    pub fn find_all(&self, text: &str) -> Vec<SearchMatch> {
        let chars: Vec<char> = text.chars().collect();
        let mut byte_to_char = Vec::with_capacity(text.len() + 1);
        for (i, ch) in chars.iter().enumerate() {
            byte_to_char.extend(std::iter::repeat_n(i, ch.len_utf8()));
        }
        byte_to_char.push(chars.len());

        self.regex
            .find_iter(text)
            .map(|m| SearchMatch {
                start: byte_to_char[m.start()],
                end: byte_to_char[m.end()],
            })
            .filter(|m| !m.is_empty())
            .filter(|m| !self.options.whole_word || bounded_by_non_word(&chars, *m))
            .collect()
    }

    /// Every match in the document, per text block in document order.
    pub fn find_in(&self, document: &Document) -> Vec<(Path, SearchMatch)> {
        let mut out = Vec::new();
        for path in document.text_blocks() {
            if let Some(block) = document.get(&path) {
                let text = block.block_text();
                out.extend(self.find_all(&text).into_iter().map(|m| (path.clone(), m)));
            }
        }
        out
    }

    /// First match starting at or after `from`, wrapping to the top of the document.
    pub fn next_from(&self, document: &Document, from: &Point) -> Option<(Path, SearchMatch)> {
        let all = self.find_in(document);
        let blocks = document.text_blocks();
        let key = |path: &Path| blocks.iter().position(|p| p == path);
        let from_key = (key(&from.path), from.offset);
        all.iter()
            .find(|(path, m)| (key(path), m.start) >= from_key)
            .or_else(|| all.first())
            .cloned()
    }

    /// Last match ending at or before `from`, wrapping to the bottom of the document.
    pub fn prev_from(&self, document: &Document, from: &Point) -> Option<(Path, SearchMatch)> {
        let all = self.find_in(document);
        let blocks = document.text_blocks();
        let key = |path: &Path| blocks.iter().position(|p| p == path);
        let from_key = (key(&from.path), from.offset);
        all.iter()
            .rev()
            .find(|(path, m)| (key(path), m.end) <= from_key)
            .or_else(|| all.last())
            .cloned()
    }
}

fn is_word_char(ch: char) -> bool {
    ch == '_' || ch.is_alphanumeric()
}

fn bounded_by_non_word(chars: &[char], m: SearchMatch) -> bool {
    let before = m.start.checked_sub(1).and_then(|i| chars.get(i));
    let after = chars.get(m.end);
    !before.is_some_and(|ch| is_word_char(*ch)) && !after.is_some_and(|ch| is_word_char(*ch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    fn query(text: &str, options: SearchOptions) -> SearchQuery {
        SearchQuery::new(text, options).unwrap().unwrap()
    }

    #[test]
    fn test_offsets_are_chars() {
        let found = query("wörld", SearchOptions::default()).find_all("héllo wörld wörld");
        assert_eq!(
            found,
            vec![SearchMatch { start: 6, end: 11 }, SearchMatch { start: 12, end: 17 }]
        );
    }

    #[test]
    fn test_whole_word_ignoring_case() {
        let options = SearchOptions {
            case_sensitive: false,
            whole_word: true,
            regex: false,
        };
        let found = query("cat", options).find_all("Cat catalog cat");
        assert_eq!(found, vec![SearchMatch { start: 0, end: 3 }, SearchMatch { start: 12, end: 15 }]);
    }

    #[test]
    fn test_invalid_regex_and_empty_query() {
        let options = SearchOptions {
            regex: true,
            ..SearchOptions::default()
        };
        assert!(matches!(SearchQuery::new("(", options), Err(SearchError::InvalidRegex(_))));
        assert!(SearchQuery::new("", options).unwrap().is_none());
    }

    #[test]
    fn test_next_and_prev_wrap_around_the_document() {
        let doc = Document::new(vec![
            Node::paragraph_text("one fish"),
            Node::heading(2, "two"),
            Node::paragraph_text("red fish"),
        ]);
        let fish = query("fish", SearchOptions::default());

        let next = fish.next_from(&doc, &Point::new([0], 5)).unwrap();
        assert_eq!(next, (Path::from([2]), SearchMatch { start: 4, end: 8 }));
        let wrapped = fish.next_from(&doc, &Point::new([2], 5)).unwrap();
        assert_eq!(wrapped.0, Path::from([0]));

        let prev = fish.prev_from(&doc, &Point::new([2], 4)).unwrap();
        assert_eq!(prev, (Path::from([0]), SearchMatch { start: 4, end: 8 }));
        let wrapped = fish.prev_from(&doc, &Point::new([0], 0)).unwrap();
        assert_eq!(wrapped.0, Path::from([2]));
    }
}
