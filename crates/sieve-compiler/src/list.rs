//! Value list parser
//!
//! Parses separator-delimited value lists such as `example.com,~example.org`
//! (cosmetic domain lists) or `a.com|~b.com` (`$domain`, `$app`, `$method`).
//! A leading `~` marks an exception item. A separator preceded by a backslash
//! belongs to the value. Whitespace around items is ignored.

use sieve_core::error::{Span, SyntaxError, SyntaxErrorKind, SyntaxResult};

const NEGATION_MARKER: u8 = b'~';
const ESCAPE_CHARACTER: u8 = b'\\';

/// List item separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    Comma,
    Pipe,
}

impl Separator {
    #[inline]
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Comma => b',',
            Self::Pipe => b'|',
        }
    }

    #[inline]
    pub fn as_char(self) -> char {
        self.as_byte() as char
    }
}

/// One list value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    pub value: String,
    pub exception: bool,
    /// Location of `value` (without the exception marker)
    pub span: Span,
}

#[inline]
fn is_whitespace(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// Index after skipping whitespace forward from `pos`.
fn skip_ws(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && is_whitespace(bytes[pos]) {
        pos += 1;
    }
    pos
}

/// Exclusive end of `bytes[..end]` once trailing whitespace is dropped.
fn trim_ws_back(bytes: &[u8], mut end: usize) -> usize {
    while end > 0 && is_whitespace(bytes[end - 1]) {
        end -= 1;
    }
    end
}

/// Next `target` at or after `from` that is not preceded by a backslash.
pub(crate) fn find_unescaped(bytes: &[u8], target: u8, from: usize) -> Option<usize> {
    (from..bytes.len()).find(|&i| bytes[i] == target && (i == 0 || bytes[i - 1] != ESCAPE_CHARACTER))
}

/// Parse a value list. Spans are relative to `raw`.
pub fn parse_list(raw: &str, separator: Separator) -> SyntaxResult<Vec<ListItem>> {
    parse_list_at(raw, separator, 0)
}

/// Parse a value list found at byte offset `base` of a larger text.
pub fn parse_list_at(raw: &str, separator: Separator, base: usize) -> SyntaxResult<Vec<ListItem>> {
    let bytes = raw.as_bytes();
    let sep = separator.as_byte();
    let err = |kind: SyntaxErrorKind, start: usize, end: usize| SyntaxError::at(kind, base + start, base + end);

    let real_end = trim_ws_back(bytes, bytes.len());
    if real_end > 0 && bytes[real_end - 1] == sep {
        return Err(err(SyntaxErrorKind::SeparatorAtEnd, real_end - 1, real_end));
    }

    let mut items = Vec::new();
    let mut offset = skip_ws(bytes, 0);

    while offset < bytes.len() {
        offset = skip_ws(bytes, offset);

        let mut item_start = offset;
        let separator_pos = find_unescaped(bytes, sep, offset);
        let item_end = match separator_pos {
            Some(pos) => trim_ws_back(bytes, pos),
            None => real_end,
        };

        let exception = bytes.get(item_start) == Some(&NEGATION_MARKER);
        if exception {
            item_start += 1;

            match bytes.get(item_start) {
                Some(&NEGATION_MARKER) => {
                    return Err(err(SyntaxErrorKind::MultipleNegation, item_start, item_start + 1));
                }
                Some(&b) if b == sep => {
                    return Err(err(SyntaxErrorKind::SeparatorAfterNegation, item_start, item_start + 1));
                }
                Some(&b) if is_whitespace(b) => {
                    return Err(err(SyntaxErrorKind::WhitespaceAfterNegation, item_start, item_start + 1));
                }
                _ => {}
            }
        }

        if item_start >= item_end {
            return Err(err(SyntaxErrorKind::EmptyItem, item_start, bytes.len()));
        }

        items.push(ListItem {
            value: raw[item_start..item_end].to_string(),
            exception,
            span: Span::new(base + item_start, base + item_end),
        });

        offset = match separator_pos {
            Some(pos) => pos + 1,
            None => bytes.len(),
        };
    }

    Ok(items)
}

/// Serialize items back into list syntax.
pub fn join_list(items: &[ListItem], separator: Separator) -> String {
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(separator.as_char());
        }
        if item.exception {
            out.push('~');
        }
        out.push_str(&item.value);
    }
    out
}

/// Split items into (permitted, restricted) values.
pub fn partition_items(items: Vec<ListItem>) -> (Vec<String>, Vec<String>) {
    let mut permitted = Vec::new();
    let mut restricted = Vec::new();
    for item in items {
        if item.exception {
            restricted.push(item.value);
        } else {
            permitted.push(item.value);
        }
    }
    (permitted, restricted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn values(items: &[ListItem]) -> Vec<(&str, bool)> {
        items.iter().map(|i| (i.value.as_str(), i.exception)).collect()
    }

    #[test]
    fn test_comma_list_with_exception() {
        let items = parse_list("example.com,~example.org", Separator::Comma).unwrap();
        assert_eq!(values(&items), vec![("example.com", false), ("example.org", true)]);
        assert_eq!(items[0].span, Span::new(0, 11));
        assert_eq!(items[1].span, Span::new(13, 24));
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        let items = parse_list("  a.com ,\t~b.com  ", Separator::Comma).unwrap();
        assert_eq!(values(&items), vec![("a.com", false), ("b.com", true)]);
        assert_eq!(items[0].span, Span::new(2, 7));
    }

    #[test]
    fn test_escaped_separator_stays_in_value() {
        let items = parse_list(r"exa\,mple.com,b.com", Separator::Comma).unwrap();
        assert_eq!(values(&items), vec![(r"exa\,mple.com", false), ("b.com", false)]);

        let items = parse_list("a.com,b.com", Separator::Pipe).unwrap();
        assert_eq!(values(&items), vec![("a.com,b.com", false)]);
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_list("", Separator::Comma).unwrap().is_empty());
        assert!(parse_list("   ", Separator::Pipe).unwrap().is_empty());
    }

    #[test]
    fn test_trailing_separator() {
        let err = parse_list("a,", Separator::Comma).unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::SeparatorAtEnd);
        assert_eq!(err.span, Span::new(1, 2));

        let err = parse_list("a|b| ", Separator::Pipe).unwrap_err();
        assert_eq!(err.span, Span::new(3, 4));
    }

    #[test]
    fn test_negation_misuse() {
        let err = parse_list("~~a", Separator::Comma).unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::MultipleNegation);
        assert_eq!(err.span, Span::new(1, 2));

        let err = parse_list("a,~,b", Separator::Comma).unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::SeparatorAfterNegation);
        assert_eq!(err.span, Span::new(3, 4));

        let err = parse_list("~ a", Separator::Comma).unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::WhitespaceAfterNegation);
        assert_eq!(err.span, Span::new(1, 2));
    }

    #[test]
    fn test_empty_items() {
        let err = parse_list("a,,b", Separator::Comma).unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::EmptyItem);
        assert_eq!(err.span, Span::new(2, 4));

        let err = parse_list("a, ,b", Separator::Comma).unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::EmptyItem);

        let err = parse_list("~", Separator::Comma).unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::EmptyItem);
        assert_eq!(err.span, Span::new(1, 1));
    }

    #[test]
    fn test_base_offset() {
        let err = parse_list_at("a|", Separator::Pipe, 10).unwrap_err();
        assert_eq!(err.span, Span::new(11, 12));

        let items = parse_list_at("a|~b", Separator::Pipe, 10).unwrap();
        assert_eq!(items[1].span, Span::new(13, 14));
    }

    #[test]
    fn test_partition() {
        let items = parse_list("a.com|~b.com|c.com", Separator::Pipe).unwrap();
        let (permitted, restricted) = partition_items(items);
        assert_eq!(permitted, vec!["a.com", "c.com"]);
        assert_eq!(restricted, vec!["b.com"]);
    }

    fn separator() -> impl Strategy<Value = Separator> {
        prop_oneof![Just(Separator::Comma), Just(Separator::Pipe)]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn list_round_trips(
            entries in prop::collection::vec(("[a-z0-9][a-z0-9.\\-]{0,15}", any::<bool>()), 1..8),
            padding in " {0,2}",
            sep in separator(),
        ) {
            let raw = entries
                .iter()
                .map(|(value, exception)| format!("{padding}{}{value}{padding}", if *exception { "~" } else { "" }))
                .collect::<Vec<_>>()
                .join(&sep.as_char().to_string());

            let parsed = parse_list(&raw, sep).unwrap();
            let reparsed = parse_list(&join_list(&parsed, sep), sep).unwrap();

            prop_assert_eq!(values(&parsed), values(&reparsed));
            let expected: Vec<(&str, bool)> = entries.iter().map(|(v, e)| (v.as_str(), *e)).collect();
            prop_assert_eq!(values(&parsed), expected);
        }
    }
}
