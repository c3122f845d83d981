//! Character, grapheme and display-width helpers shared by the serializer and the command engine.

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthChar;

/// Display width of a character in terminal cells (UAX #11); unknown widths count as 1.
pub fn char_width(ch: char) -> usize {
    UnicodeWidthChar::width(ch).unwrap_or(1)
}

/// Display width of a string, used for table column padding.
pub fn str_width(s: &str) -> usize {
    s.chars().map(char_width).sum()
}

/// Byte index of the `char_offset`-th character (clamped to `s.len()`).
pub(crate) fn char_to_byte(s: &str, char_offset: usize) -> usize {
    s.char_indices()
        .nth(char_offset)
        .map(|(byte, _)| byte)
        .unwrap_or(s.len())
}

/// The first `n` characters of `s`.
pub(crate) fn char_prefix(s: &str, n: usize) -> &str {
    &s[..char_to_byte(s, n)]
}

/// Char offset of the grapheme boundary before `offset` (0 when already at the start).
pub(crate) fn prev_grapheme_boundary(s: &str, offset: usize) -> usize {
    let byte = char_to_byte(s, offset);
    let mut prev = 0;
    for (start, _) in s.grapheme_indices(true) {
        if start >= byte {
            break;
        }
        prev = start;
    }
    s[..prev].chars().count()
}

/// Char offset of the grapheme boundary after `offset` (the char count when already at the end).
pub(crate) fn next_grapheme_boundary(s: &str, offset: usize) -> usize {
    let byte = char_to_byte(s, offset);
    for (start, grapheme) in s.grapheme_indices(true) {
        let end = start + grapheme.len();
        if end > byte {
            return s[..end].chars().count();
        }
    }
    s.chars().count()
}

/// Leading spaces and tabs of `line`.
pub(crate) fn leading_whitespace(line: &str) -> &str {
    let trimmed = line.trim_start_matches([' ', '\t']);
    &line[..line.len() - trimmed.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cjk_width() {
        assert_eq!(str_width("abc"), 3);
        assert_eq!(str_width("你好"), 4);
    }

    #[test]
    fn test_grapheme_boundaries() {
        // "e" + combining acute accent is one grapheme made of two chars.
        let s = "ae\u{301}b";
        assert_eq!(next_grapheme_boundary(s, 1), 3);
        assert_eq!(prev_grapheme_boundary(s, 3), 1);
        assert_eq!(prev_grapheme_boundary(s, 0), 0);
        assert_eq!(next_grapheme_boundary(s, 4), 4);
    }

    #[test]
    fn test_leading_whitespace() {
        assert_eq!(leading_whitespace("\t  foo"), "\t  ");
        assert_eq!(leading_whitespace("foo"), "");
    }
}
