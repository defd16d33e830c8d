//! Cosmetic rule parser
//!
//! A cosmetic rule is `[pattern]marker content`, where the optional pattern is
//! either a plain domain list (`example.org,~shop.example.org`) or a bracketed
//! modifier block followed by an optional domain list
//! (`[$path=/page,domain=example.org]`).

use sieve_core::config::DuplicateModifierPolicy;
use sieve_core::error::{SyntaxError, SyntaxErrorKind, SyntaxResult};
use sieve_core::rule::{CosmeticMarker, CosmeticRule, RuleId, SCRIPTLET_MASK};
use sieve_core::scriptlet::parse_scriptlet_call;

use crate::list::{find_unescaped, parse_list_at, partition_items, Separator};
use crate::modifiers::{parse_modifiers, ModifierKind, ModifierMap, RuleKinds};

const MODIFIERS_OPEN: &str = "[$";
const WILDCARD_DOMAIN: &str = "*";

/// A rule split around its marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerSplit<'a> {
    pub pattern: Option<&'a str>,
    pub marker: CosmeticMarker,
    pub content: &'a str,
    /// Offset of `content` in the rule text
    pub content_offset: usize,
}

/// Pattern split into its modifier block and domain list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatternText<'a> {
    pub domains_text: Option<&'a str>,
    pub domains_offset: usize,
    pub modifiers_text: Option<&'a str>,
    pub modifiers_offset: usize,
}

/// Everything a pattern contributes to a rule.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedPattern {
    pub permitted_domains: Vec<String>,
    pub restricted_domains: Vec<String>,
    pub path: Option<String>,
    pub url: Option<String>,
    pub raw_modifiers: Option<String>,
}

/// Split rule text at the first cosmetic marker.
pub fn parse_rule_text_by_marker(text: &str) -> SyntaxResult<MarkerSplit<'_>> {
    let (marker_pos, marker) = CosmeticMarker::find(text)
        .ok_or_else(|| SyntaxError::at(SyntaxErrorKind::NotCosmetic, 0, text.len()))?;

    let after_marker = marker_pos + marker.as_str().len();
    let rest = &text[after_marker..];
    let content = rest.trim();
    if content.is_empty() {
        return Err(SyntaxError::at(SyntaxErrorKind::EmptyContent, after_marker, text.len()));
    }

    let pattern = &text[..marker_pos];
    Ok(MarkerSplit {
        pattern: if pattern.is_empty() { None } else { Some(pattern) },
        marker,
        content,
        content_offset: after_marker + (rest.len() - rest.trim_start().len()),
    })
}

/// Detect a leading `[$...]` modifier block. `base` is the pattern's offset
/// in the rule text.
pub fn parse_rule_pattern_text(pattern: &str, base: usize) -> SyntaxResult<PatternText<'_>> {
    if !pattern.starts_with(MODIFIERS_OPEN) {
        return Ok(PatternText {
            domains_text: if pattern.is_empty() { None } else { Some(pattern) },
            domains_offset: base,
            ..PatternText::default()
        });
    }

    let close = find_unescaped(pattern.as_bytes(), b']', MODIFIERS_OPEN.len()).ok_or_else(|| {
        SyntaxError::at(SyntaxErrorKind::UnterminatedModifiers, base, base + pattern.len())
    })?;

    let modifiers_text = &pattern[MODIFIERS_OPEN.len()..close];
    if modifiers_text.is_empty() {
        return Err(SyntaxError::at(SyntaxErrorKind::EmptyModifiers, base, base + close + 1));
    }

    let domains_text = &pattern[close + 1..];
    Ok(PatternText {
        domains_text: if domains_text.is_empty() { None } else { Some(domains_text) },
        domains_offset: base + close + 1,
        modifiers_text: Some(modifiers_text),
        modifiers_offset: base + MODIFIERS_OPEN.len(),
    })
}

/// Parse the inside of a modifier block. `None` for an empty string.
pub fn parse_rule_modifiers(
    text: &str,
    base: usize,
    policy: DuplicateModifierPolicy,
) -> SyntaxResult<Option<ModifierMap>> {
    if text.is_empty() {
        return Ok(None);
    }
    parse_modifiers(text, base, RuleKinds::COSMETIC, policy).map(Some)
}

/// Decode the escapes allowed in `$path` values.
pub fn unescape_path(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(&next) = chars.peek() {
                if matches!(next, ']' | '[' | ',' | '\\') {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(ch);
    }
    out
}

/// Parse a full rule pattern.
pub fn parse_rule_pattern(pattern: &str, base: usize, policy: DuplicateModifierPolicy) -> SyntaxResult<ParsedPattern> {
    let text = parse_rule_pattern_text(pattern, base)?;

    let modifiers = match text.modifiers_text {
        Some(modifiers_text) => parse_rule_modifiers(modifiers_text, text.modifiers_offset, policy)?,
        None => None,
    };

    let mut parsed = ParsedPattern {
        raw_modifiers: text.modifiers_text.map(str::to_string),
        ..ParsedPattern::default()
    };

    let domain_modifier = modifiers.as_ref().and_then(|m| m.get(ModifierKind::Domain));

    let domain_list = match (domain_modifier, text.domains_text) {
        (Some(modifier), Some(_)) => {
            return Err(SyntaxError::new(SyntaxErrorKind::DomainModifierConflict, modifier.span));
        }
        (Some(modifier), None) => {
            let value_start = modifier.value_span.map_or(modifier.span.start, |s| s.start);
            modifier
                .value
                .as_deref()
                .map(|value| (value, Separator::Pipe, value_start))
        }
        (None, Some(domains)) => Some((domains, Separator::Comma, text.domains_offset)),
        (None, None) => None,
    };

    if let Some((raw, separator, offset)) = domain_list {
        if raw.trim() != WILDCARD_DOMAIN {
            let items = parse_list_at(raw, separator, offset)?;
            let (permitted, restricted) = partition_items(items);
            parsed.permitted_domains = permitted
                .into_iter()
                .filter(|domain| domain != WILDCARD_DOMAIN)
                .collect();
            parsed.restricted_domains = restricted;
        }
    }

    if let Some(modifiers) = &modifiers {
        parsed.path = modifiers.value(ModifierKind::Path).map(unescape_path);
        parsed.url = modifiers.value(ModifierKind::Url).map(str::to_string);
    }

    Ok(parsed)
}

/// Build a cosmetic rule from (trimmed) rule text.
pub fn parse_cosmetic_rule(text: &str, id: RuleId, policy: DuplicateModifierPolicy) -> SyntaxResult<CosmeticRule> {
    let split = parse_rule_text_by_marker(text)?;

    let pattern = match split.pattern {
        Some(pattern) => parse_rule_pattern(pattern, 0, policy)?,
        None => ParsedPattern::default(),
    };

    if split.marker.is_js() {
        if let Some(call) = split.content.strip_prefix(SCRIPTLET_MASK) {
            let call_offset = split.content_offset + SCRIPTLET_MASK.len();
            parse_scriptlet_call(call).map_err(|e| e.shifted(call_offset))?;
        }
    }

    Ok(CosmeticRule {
        id,
        text: text.to_string(),
        marker: split.marker,
        content: split.content.to_string(),
        permitted_domains: pattern.permitted_domains,
        restricted_domains: pattern.restricted_domains,
        path: pattern.path,
        url: pattern.url,
    })
}

/// Whether the text contains a cosmetic marker at all.
pub fn is_cosmetic(text: &str) -> bool {
    CosmeticMarker::find(text).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sieve_core::error::Span;

    const POLICY: DuplicateModifierPolicy = DuplicateModifierPolicy::LastWins;

    #[test]
    fn test_split_by_marker() {
        let split = parse_rule_text_by_marker("example.org##.banner").unwrap();
        assert_eq!(split.pattern, Some("example.org"));
        assert_eq!(split.marker, CosmeticMarker::ElementHiding);
        assert_eq!(split.content, ".banner");
        assert_eq!(split.content_offset, 13);

        let split = parse_rule_text_by_marker("*##.banner").unwrap();
        assert_eq!(split.pattern, Some("*"));

        let split = parse_rule_text_by_marker("#@#.banner").unwrap();
        assert_eq!(split.pattern, None);
        assert_eq!(split.marker, CosmeticMarker::ElementHidingException);
    }

    #[test]
    fn test_split_errors() {
        let err = parse_rule_text_by_marker("||example.org^").unwrap_err();
        assert_eq!(err.to_string(), "Not a cosmetic rule");

        let err = parse_rule_text_by_marker("example.org##").unwrap_err();
        assert_eq!(err.to_string(), "Rule content is empty");
        assert_eq!(err.span, Span::new(13, 13));
    }

    #[test]
    fn test_pattern_text() {
        let text = parse_rule_pattern_text("[$path=/page]example.org,another.com", 0).unwrap();
        assert_eq!(text.modifiers_text, Some("path=/page"));
        assert_eq!(text.modifiers_offset, 2);
        assert_eq!(text.domains_text, Some("example.org,another.com"));
        assert_eq!(text.domains_offset, 13);

        let text = parse_rule_pattern_text("example.org", 0).unwrap();
        assert_eq!(text.modifiers_text, None);
        assert_eq!(text.domains_text, Some("example.org"));
    }

    #[test]
    fn test_pattern_text_errors() {
        let err = parse_rule_pattern_text("[$path=/pageexample.org", 0).unwrap_err();
        assert_eq!(err.to_string(), "Can't parse modifiers list");

        let err = parse_rule_pattern_text("[$]", 0).unwrap_err();
        assert_eq!(err.to_string(), "Modifiers list can't be empty");
        assert_eq!(err.span, Span::new(0, 3));
    }

    #[test]
    fn test_rule_modifiers() {
        assert!(parse_rule_modifiers("", 0, POLICY).unwrap().is_none());
        let map = parse_rule_modifiers(r"path=/page,domain=exa\,mple.com,", 0, POLICY).unwrap().unwrap();
        assert_eq!(map.value(ModifierKind::Path), Some("/page"));
        assert_eq!(map.value(ModifierKind::Domain), Some(r"exa\,mple.com"));
    }

    #[test]
    fn test_pattern_domains() {
        let parsed = parse_rule_pattern("example.org,~another.com", 0, POLICY).unwrap();
        assert_eq!(parsed.permitted_domains, vec!["example.org"]);
        assert_eq!(parsed.restricted_domains, vec!["another.com"]);

        let parsed = parse_rule_pattern("*", 0, POLICY).unwrap();
        assert_eq!(parsed, ParsedPattern::default());
    }

    #[test]
    fn test_pattern_with_modifier_block() {
        let parsed = parse_rule_pattern("[$path=/page,domain=example.org|~another.com]", 0, POLICY).unwrap();
        assert_eq!(parsed.permitted_domains, vec!["example.org"]);
        assert_eq!(parsed.restricted_domains, vec!["another.com"]);
        assert_eq!(parsed.path.as_deref(), Some("/page"));
        assert_eq!(parsed.raw_modifiers.as_deref(), Some("path=/page,domain=example.org|~another.com"));
    }

    #[test]
    fn test_escaped_path() {
        let parsed = parse_rule_pattern(r"[$path=/\[^a|b|c|\,|d|\\]\]werty\\?=qwe/]", 0, POLICY).unwrap();
        assert_eq!(parsed.path.as_deref(), Some(r"/[^a|b|c|,|d|\]]werty\?=qwe/"));
    }

    #[test]
    fn test_domain_conflict() {
        let err = parse_rule_pattern("[$path=/page,domain=example.org]~another.com", 0, POLICY).unwrap_err();
        assert_eq!(err.to_string(), "The $domain modifier is not allowed in a domain-specific rule");
        assert_eq!(err.span, Span::new(13, 31));
    }

    #[test]
    fn test_domain_list_error_offsets() {
        let err = parse_rule_pattern("[$domain=a.com|]", 0, POLICY).unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::SeparatorAtEnd);
        assert_eq!(err.span, Span::new(14, 15));

        let err = parse_cosmetic_rule("a.com,,b.com##.ad", RuleId::new(0, 0), POLICY).unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::EmptyItem);
        assert_eq!(err.span.start, 6);
    }

    #[test]
    fn test_cosmetic_rule() {
        let rule = parse_cosmetic_rule("example.org,~shop.example.org##.banner", RuleId::new(3, 9), POLICY).unwrap();
        assert_eq!(rule.id, RuleId::new(3, 9));
        assert_eq!(rule.content, ".banner");
        assert!(!rule.is_generic());
        assert!(!rule.is_allowlist());
        assert_eq!(rule.restricted_domains, vec!["shop.example.org"]);

        let rule = parse_cosmetic_rule("#@#.banner", RuleId::new(3, 10), POLICY).unwrap();
        assert!(rule.is_generic());
        assert!(rule.is_allowlist());
    }

    #[test]
    fn test_scriptlet_validated_on_construction() {
        let rule = parse_cosmetic_rule("example.org#%#//scriptlet('set-constant', 'ads', 'false')", RuleId::new(0, 0), POLICY);
        assert!(rule.unwrap().is_scriptlet());

        let err = parse_cosmetic_rule("example.org#%#//scriptlet('set-constant'", RuleId::new(0, 0), POLICY).unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::InvalidScriptlet("('set-constant'".into()));
        assert_eq!(err.span, Span::new(25, 40));

        let err = parse_cosmetic_rule("#%#//scriptlet(set)", RuleId::new(0, 0), POLICY).unwrap_err();
        assert_eq!(err.span, Span::new(15, 16));
    }
}
