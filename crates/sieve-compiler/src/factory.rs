//! Rule factory
//!
//! Dispatches a line of filter-list text to the cosmetic or network parser.

use sieve_core::config::{DuplicateModifierPolicy, ParserConfig};
use sieve_core::error::SyntaxResult;
use sieve_core::rule::{CosmeticMarker, Rule, RuleId};

use crate::cosmetic::parse_cosmetic_rule;
use crate::network::parse_network_rule;

/// Comment line check. `#` and `[` only start a comment when the line has no
/// cosmetic marker, so `##.ad` and `[$path=/x]##.ad` stay rules.
pub fn is_comment(line: &str) -> bool {
    if line.starts_with('!') {
        return true;
    }
    (line.starts_with('#') || line.starts_with('[')) && CosmeticMarker::find(line).is_none()
}

/// Builds rules from text.
#[derive(Debug, Clone, Default)]
pub struct RuleFactory {
    policy: DuplicateModifierPolicy,
}

impl RuleFactory {
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            policy: config.duplicate_modifiers,
        }
    }

    /// `None` for blank and comment lines. Error spans point into `text`
    /// as given, surrounding whitespace included.
    pub fn create_rule(&self, text: &str, filter_list_id: u32, index: u32) -> SyntaxResult<Option<Rule>> {
        let line = text.trim();
        if line.is_empty() || is_comment(line) {
            return Ok(None);
        }
        let indent = text.len() - text.trim_start().len();

        let id = RuleId::new(filter_list_id, index);
        let rule = if CosmeticMarker::find(line).is_some() {
            parse_cosmetic_rule(line, id, self.policy).map(Rule::Cosmetic)
        } else {
            parse_network_rule(line, id, self.policy).map(Rule::Network)
        };
        rule.map(Some).map_err(|e| e.shifted(indent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sieve_core::error::Span;

    #[test]
    fn test_comments() {
        assert!(is_comment("! Title: test"));
        assert!(is_comment("# hosts comment"));
        assert!(is_comment("[Adblock Plus 2.0]"));
        assert!(!is_comment("##.banner"));
        assert!(!is_comment("[$path=/page]##.banner"));
        assert!(!is_comment("||example.org^"));
    }

    #[test]
    fn test_dispatch() {
        let factory = RuleFactory::default();
        assert!(factory.create_rule("   ", 1, 0).unwrap().is_none());
        assert!(factory.create_rule("! comment", 1, 1).unwrap().is_none());

        let rule = factory.create_rule("example.org##.banner", 1, 2).unwrap().unwrap();
        assert!(rule.as_cosmetic().is_some());
        assert_eq!(rule.id(), RuleId::new(1, 2));

        let rule = factory.create_rule("  @@||example.org^  ", 1, 3).unwrap().unwrap();
        let network = rule.as_network().unwrap();
        assert!(network.is_allowlist());
        assert_eq!(network.text, "@@||example.org^");
    }

    #[test]
    fn test_error_span_counts_indent() {
        let factory = RuleFactory::default();
        let err = factory.create_rule("||x^$unknown", 1, 0).unwrap_err();
        assert_eq!(err.span, Span::new(5, 12));

        let err = factory.create_rule("\t  ||x^$unknown  ", 1, 0).unwrap_err();
        assert_eq!(err.span, Span::new(8, 15));
    }

    #[test]
    fn test_duplicate_policy() {
        let config = ParserConfig {
            duplicate_modifiers: DuplicateModifierPolicy::Reject,
            ..ParserConfig::default()
        };
        let factory = RuleFactory::new(&config);
        assert!(factory.create_rule("||x^$script,script", 1, 0).is_err());
        assert!(RuleFactory::default().create_rule("||x^$script,script", 1, 0).is_ok());
    }
}
