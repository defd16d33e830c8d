//! Network rule parser
//!
//! `[@@]pattern[$modifiers]`. The modifier block starts after the last
//! unescaped `$`; regex patterns (`/.../`) without a block keep their `$`.

use sieve_core::config::DuplicateModifierPolicy;
use sieve_core::error::{SyntaxError, SyntaxErrorKind, SyntaxResult};
use sieve_core::rule::{NetworkRule, RuleId};
use sieve_core::types::{NetworkRuleOption, RequestType};

use crate::list::{parse_list_at, partition_items, Separator};
use crate::modifiers::{parse_modifiers, Modifier, ModifierKind, ModifierMap, RuleKinds};

const ALLOWLIST_PREFIX: &str = "@@";
const ESCAPE_CHARACTER: u8 = b'\\';

/// Build a network rule from (trimmed) rule text.
pub fn parse_network_rule(text: &str, id: RuleId, policy: DuplicateModifierPolicy) -> SyntaxResult<NetworkRule> {
    let (allowlist, body, body_start) = match text.strip_prefix(ALLOWLIST_PREFIX) {
        Some(rest) => (true, rest, ALLOWLIST_PREFIX.len()),
        None => (false, text, 0),
    };

    let (pattern, modifiers) = match find_options_start(body) {
        Some(pos) => {
            let rule_kind = if allowlist {
                RuleKinds::NETWORK_ALLOW
            } else {
                RuleKinds::NETWORK_BLOCK
            };
            let options_start = body_start + pos + 1;
            let map = parse_modifiers(&body[pos + 1..], options_start, rule_kind, policy)?;
            (&body[..pos], map)
        }
        None => (body, ModifierMap::default()),
    };

    if pattern.is_empty() && !modifiers.contains(ModifierKind::Domain) {
        return Err(SyntaxError::at(SyntaxErrorKind::EmptyPattern, 0, text.len()));
    }

    let mut rule = NetworkRule::new(id, text, pattern, allowlist);
    for modifier in modifiers.iter() {
        apply_modifier(&mut rule, modifier)?;
    }

    Ok(rule)
}

/// Position of the `$` that opens the modifier block.
fn find_options_start(body: &str) -> Option<usize> {
    if body.len() > 1 && body.starts_with('/') && body.ends_with('/') {
        return None;
    }
    let bytes = body.as_bytes();
    (0..bytes.len())
        .rev()
        .find(|&i| bytes[i] == b'$' && (i == 0 || bytes[i - 1] != ESCAPE_CHARACTER))
}

fn request_type(kind: ModifierKind) -> Option<RequestType> {
    let t = match kind {
        ModifierKind::Document => RequestType::DOCUMENT,
        ModifierKind::Subdocument => RequestType::SUBDOCUMENT,
        ModifierKind::Script => RequestType::SCRIPT,
        ModifierKind::Stylesheet => RequestType::STYLESHEET,
        ModifierKind::Object => RequestType::OBJECT,
        ModifierKind::Image => RequestType::IMAGE,
        ModifierKind::XmlHttpRequest => RequestType::XMLHTTPREQUEST,
        ModifierKind::Media => RequestType::MEDIA,
        ModifierKind::Font => RequestType::FONT,
        ModifierKind::Websocket => RequestType::WEBSOCKET,
        ModifierKind::Ping => RequestType::PING,
        ModifierKind::CspReport => RequestType::CSP_REPORT,
        ModifierKind::Other => RequestType::OTHER,
        _ => return None,
    };
    Some(t)
}

fn flag_option(kind: ModifierKind) -> Option<NetworkRuleOption> {
    let option = match kind {
        ModifierKind::Important => NetworkRuleOption::IMPORTANT,
        ModifierKind::MatchCase => NetworkRuleOption::MATCH_CASE,
        ModifierKind::Popup => NetworkRuleOption::POPUP,
        ModifierKind::Badfilter => NetworkRuleOption::BADFILTER,
        ModifierKind::Elemhide => NetworkRuleOption::ELEMHIDE,
        ModifierKind::Generichide => NetworkRuleOption::GENERICHIDE,
        ModifierKind::Specifichide => NetworkRuleOption::SPECIFICHIDE,
        ModifierKind::Jsinject => NetworkRuleOption::JSINJECT,
        ModifierKind::Content => NetworkRuleOption::CONTENT,
        ModifierKind::Urlblock => NetworkRuleOption::URLBLOCK,
        ModifierKind::Genericblock => NetworkRuleOption::GENERICBLOCK,
        _ => return None,
    };
    Some(option)
}

/// Parse a pipe-separated modifier value into (permitted, restricted).
fn value_list(modifier: &Modifier) -> SyntaxResult<(Vec<String>, Vec<String>)> {
    let value = modifier.value.as_deref().unwrap_or_default();
    let start = modifier.value_span.map_or(modifier.span.end, |s| s.start);
    parse_list_at(value, Separator::Pipe, start).map(partition_items)
}

fn apply_modifier(rule: &mut NetworkRule, modifier: &Modifier) -> SyntaxResult<()> {
    if let Some(t) = request_type(modifier.kind) {
        if modifier.negated {
            rule.restricted_request_types |= t;
        } else {
            rule.permitted_request_types |= t;
            if rule.allowlist && modifier.kind == ModifierKind::Document {
                rule.options |= NetworkRuleOption::DOCUMENT;
            }
        }
        return Ok(());
    }

    if let Some(option) = flag_option(modifier.kind) {
        rule.options |= option;
        return Ok(());
    }

    match modifier.kind {
        ModifierKind::All => {
            rule.permitted_request_types = RequestType::all();
            rule.options |= NetworkRuleOption::POPUP;
        }
        ModifierKind::ThirdParty | ModifierKind::FirstParty => {
            let third = (modifier.kind == ModifierKind::ThirdParty) != modifier.negated;
            rule.options |= if third {
                NetworkRuleOption::THIRD_PARTY
            } else {
                NetworkRuleOption::FIRST_PARTY
            };
        }
        ModifierKind::Domain => {
            (rule.permitted_domains, rule.restricted_domains) = value_list(modifier)?;
        }
        ModifierKind::App => {
            (rule.permitted_apps, rule.restricted_apps) = value_list(modifier)?;
        }
        ModifierKind::Method => {
            (rule.permitted_methods, rule.restricted_methods) = value_list(modifier)?;
        }
        ModifierKind::Redirect => {
            rule.options |= NetworkRuleOption::REDIRECT;
            rule.advanced_modifier = modifier.value.clone();
        }
        ModifierKind::RedirectRule => {
            rule.options |= NetworkRuleOption::REDIRECT | NetworkRuleOption::REDIRECT_RULE;
            rule.advanced_modifier = modifier.value.clone();
        }
        ModifierKind::Replace => {
            let value = modifier.value.as_deref().filter(|v| !v.is_empty());
            if value.is_none() && !rule.allowlist {
                return Err(SyntaxError::new(
                    SyntaxErrorKind::ModifierValueRequired(modifier.name.clone()),
                    modifier.span,
                ));
            }
            rule.options |= NetworkRuleOption::REPLACE;
            rule.advanced_modifier = value.map(str::to_string);
        }
        // Cosmetic-only kinds are rejected by the tokenizer
        _ => {}
    }

    Ok(())
}
