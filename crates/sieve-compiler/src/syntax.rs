//! Rule syntax helpers for callers that only hold rule text.

use sieve_core::psl::get_etld1;
use sieve_core::url::extract_host;

use crate::factory::RuleFactory;

/// Whether the rule in `text` is restricted to `domain` (or a parent of it).
/// Invalid rules and comments are never domain rules.
pub fn is_rule_for_domain(text: &str, domain: &str) -> bool {
    match RuleFactory::default().create_rule(text, 0, 0) {
        Ok(Some(rule)) => rule.matches_permitted_domains(domain),
        _ => false,
    }
}

/// Like [`is_rule_for_domain`], with the registrable domain of `url`.
pub fn is_rule_for_url(text: &str, url: &str) -> bool {
    match extract_host(url) {
        Some(host) if !host.is_empty() => is_rule_for_domain(text, &get_etld1(host)),
        _ => false,
    }
}
