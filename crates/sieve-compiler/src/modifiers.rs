//! Modifier registry and tokenizer
//!
//! Every modifier the compiler understands is listed in [`REGISTRY`] together
//! with its value requirement and the rule kinds it may appear in. Names
//! outside the table are rejected.

use sieve_core::config::DuplicateModifierPolicy;
use sieve_core::error::{Span, SyntaxError, SyntaxErrorKind, SyntaxResult};

use crate::list::find_unescaped;

// =============================================================================
// Registry
// =============================================================================

/// Every recognized modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModifierKind {
    // Request types
    Document,
    Subdocument,
    Script,
    Stylesheet,
    Object,
    Image,
    XmlHttpRequest,
    Media,
    Font,
    Websocket,
    Ping,
    CspReport,
    Other,
    All,
    // Party
    ThirdParty,
    FirstParty,
    // Flags
    Important,
    MatchCase,
    Popup,
    Badfilter,
    // Allowlist-only flags
    Elemhide,
    Generichide,
    Specifichide,
    Jsinject,
    Content,
    Urlblock,
    Genericblock,
    // Valued
    Domain,
    App,
    Method,
    Redirect,
    RedirectRule,
    Replace,
    Path,
    Url,
}

/// Whether a modifier takes `=value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueRequirement {
    Forbidden,
    Required,
    Optional,
}

bitflags::bitflags! {
    /// Rule kinds a modifier may appear in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RuleKinds: u8 {
        const NETWORK_BLOCK = 1 << 0;
        const NETWORK_ALLOW = 1 << 1;
        const COSMETIC = 1 << 2;
        const NETWORK = Self::NETWORK_BLOCK.bits() | Self::NETWORK_ALLOW.bits();
    }
}

/// Registry entry.
#[derive(Debug, Clone, Copy)]
pub struct ModifierSpec {
    pub kind: ModifierKind,
    pub names: &'static [&'static str],
    pub value: ValueRequirement,
    pub rule_kinds: RuleKinds,
    pub negatable: bool,
}

const fn flag(kind: ModifierKind, names: &'static [&'static str], rule_kinds: RuleKinds, negatable: bool) -> ModifierSpec {
    ModifierSpec {
        kind,
        names,
        value: ValueRequirement::Forbidden,
        rule_kinds,
        negatable,
    }
}

const fn valued(kind: ModifierKind, names: &'static [&'static str], value: ValueRequirement, rule_kinds: RuleKinds) -> ModifierSpec {
    ModifierSpec {
        kind,
        names,
        value,
        rule_kinds,
        negatable: false,
    }
}

use ModifierKind as K;

/// The closed set of modifiers.
pub static REGISTRY: &[ModifierSpec] = &[
    flag(K::Document, &["document", "doc"], RuleKinds::NETWORK, true),
    flag(K::Subdocument, &["subdocument", "frame"], RuleKinds::NETWORK, true),
    flag(K::Script, &["script"], RuleKinds::NETWORK, true),
    flag(K::Stylesheet, &["stylesheet", "css"], RuleKinds::NETWORK, true),
    flag(K::Object, &["object"], RuleKinds::NETWORK, true),
    flag(K::Image, &["image"], RuleKinds::NETWORK, true),
    flag(K::XmlHttpRequest, &["xmlhttprequest", "xhr"], RuleKinds::NETWORK, true),
    flag(K::Media, &["media"], RuleKinds::NETWORK, true),
    flag(K::Font, &["font"], RuleKinds::NETWORK, true),
    flag(K::Websocket, &["websocket"], RuleKinds::NETWORK, true),
    flag(K::Ping, &["ping"], RuleKinds::NETWORK, true),
    flag(K::CspReport, &["csp_report"], RuleKinds::NETWORK, true),
    flag(K::Other, &["other"], RuleKinds::NETWORK, true),
    flag(K::All, &["all"], RuleKinds::NETWORK_BLOCK, false),
    flag(K::ThirdParty, &["third-party", "3p"], RuleKinds::NETWORK, true),
    flag(K::FirstParty, &["first-party", "1p"], RuleKinds::NETWORK, true),
    flag(K::Important, &["important"], RuleKinds::NETWORK, false),
    flag(K::MatchCase, &["match-case"], RuleKinds::NETWORK, false),
    flag(K::Popup, &["popup"], RuleKinds::NETWORK, false),
    flag(K::Badfilter, &["badfilter"], RuleKinds::NETWORK, false),
    flag(K::Elemhide, &["elemhide", "ehide"], RuleKinds::NETWORK_ALLOW, false),
    flag(K::Generichide, &["generichide", "ghide"], RuleKinds::NETWORK_ALLOW, false),
    flag(K::Specifichide, &["specifichide", "shide"], RuleKinds::NETWORK_ALLOW, false),
    flag(K::Jsinject, &["jsinject"], RuleKinds::NETWORK_ALLOW, false),
    flag(K::Content, &["content"], RuleKinds::NETWORK_ALLOW, false),
    flag(K::Urlblock, &["urlblock"], RuleKinds::NETWORK_ALLOW, false),
    flag(K::Genericblock, &["genericblock"], RuleKinds::NETWORK_ALLOW, false),
    valued(K::Domain, &["domain"], ValueRequirement::Required, RuleKinds::all()),
    valued(K::App, &["app"], ValueRequirement::Required, RuleKinds::NETWORK),
    valued(K::Method, &["method"], ValueRequirement::Required, RuleKinds::NETWORK),
    valued(K::Redirect, &["redirect"], ValueRequirement::Required, RuleKinds::NETWORK),
    valued(K::RedirectRule, &["redirect-rule"], ValueRequirement::Required, RuleKinds::NETWORK),
    // Value may only be omitted on allowlist rules; checked by the network parser
    valued(K::Replace, &["replace"], ValueRequirement::Optional, RuleKinds::NETWORK),
    valued(K::Path, &["path"], ValueRequirement::Required, RuleKinds::COSMETIC),
    valued(K::Url, &["url"], ValueRequirement::Required, RuleKinds::COSMETIC),
];

/// Look a modifier up by name (ASCII case-insensitive).
pub fn lookup(name: &str) -> Option<&'static ModifierSpec> {
    REGISTRY
        .iter()
        .find(|spec| spec.names.iter().any(|n| n.eq_ignore_ascii_case(name)))
}

// =============================================================================
// Modifier Map
// =============================================================================

/// A validated modifier occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modifier {
    pub kind: ModifierKind,
    /// Name as written
    pub name: String,
    /// Raw value, escapes preserved
    pub value: Option<String>,
    pub negated: bool,
    /// Location of the whole `~name=value` token
    pub span: Span,
    /// Location of the value, if any
    pub value_span: Option<Span>,
}

/// Modifiers of one rule in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifierMap {
    entries: Vec<Modifier>,
}

impl ModifierMap {
    pub fn get(&self, kind: ModifierKind) -> Option<&Modifier> {
        self.entries.iter().find(|m| m.kind == kind)
    }

    pub fn value(&self, kind: ModifierKind) -> Option<&str> {
        self.get(kind)?.value.as_deref()
    }

    pub fn contains(&self, kind: ModifierKind) -> bool {
        self.get(kind).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Modifier> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, modifier: Modifier, policy: DuplicateModifierPolicy) -> SyntaxResult<()> {
        match self.entries.iter().position(|m| m.kind == modifier.kind) {
            Some(_) if policy == DuplicateModifierPolicy::Reject => Err(SyntaxError::new(
                SyntaxErrorKind::DuplicateModifier(modifier.name.clone()),
                modifier.span,
            )),
            Some(pos) => {
                self.entries[pos] = modifier;
                Ok(())
            }
            None => {
                self.entries.push(modifier);
                Ok(())
            }
        }
    }
}

// =============================================================================
// Tokenizer
// =============================================================================

/// Parse a comma-separated modifier list for a rule of kind `rule_kind`.
///
/// Empty tokens (leading, trailing or doubled commas) are skipped. `base` is
/// the offset of `text` inside the rule, so spans point into the rule text.
pub fn parse_modifiers(
    text: &str,
    base: usize,
    rule_kind: RuleKinds,
    policy: DuplicateModifierPolicy,
) -> SyntaxResult<ModifierMap> {
    let bytes = text.as_bytes();
    let mut map = ModifierMap::default();
    let mut offset = 0;

    while offset < bytes.len() {
        let token_end = find_unescaped(bytes, b',', offset).unwrap_or(bytes.len());
        let raw = &text[offset..token_end];
        let token = raw.trim();

        if !token.is_empty() {
            let token_start = offset + (raw.len() - raw.trim_start().len());
            let modifier = parse_token(token, base + token_start, rule_kind)?;
            map.insert(modifier, policy)?;
        }

        offset = token_end + 1;
    }

    Ok(map)
}

fn parse_token(token: &str, start: usize, rule_kind: RuleKinds) -> SyntaxResult<Modifier> {
    let span = Span::new(start, start + token.len());

    let (negated, body, body_start) = match token.strip_prefix('~') {
        Some(rest) => (true, rest, start + 1),
        None => (false, token, start),
    };

    let (name, value, value_span) = match body.find('=') {
        Some(eq) => {
            let value_start = body_start + eq + 1;
            (
                body[..eq].trim_end(),
                Some(&body[eq + 1..]),
                Some(Span::new(value_start, value_start + body.len() - eq - 1)),
            )
        }
        None => (body, None, None),
    };

    let spec = lookup(name)
        .ok_or_else(|| SyntaxError::new(SyntaxErrorKind::UnknownModifier(name.to_string()), span))?;

    if !spec.rule_kinds.intersects(rule_kind) {
        return Err(SyntaxError::new(SyntaxErrorKind::ModifierNotPermitted(name.to_string()), span));
    }

    if negated && (!spec.negatable || value.is_some()) {
        return Err(SyntaxError::new(SyntaxErrorKind::NegatedModifier(name.to_string()), span));
    }

    match (spec.value, value) {
        (ValueRequirement::Required, None) | (ValueRequirement::Required, Some("")) => {
            return Err(SyntaxError::new(
                SyntaxErrorKind::ModifierValueRequired(name.to_string()),
                span,
            ));
        }
        (ValueRequirement::Forbidden, Some(_)) => {
            return Err(SyntaxError::new(
                SyntaxErrorKind::ModifierValueForbidden(name.to_string()),
                span,
            ));
        }
        _ => {}
    }

    Ok(Modifier {
        kind: spec.kind,
        name: name.to_string(),
        value: value.map(str::to_string),
        negated,
        span,
        value_span,
    })
}
