//! Parsed rule representations.
//!
//! Rules are immutable once built. Derived data (materialized scripts) lives
//! outside the rule, keyed by [`RuleId`].

use std::fmt;

use serde::Serialize;

use crate::types::{NetworkRuleOption, RequestType};

/// Scriptlet calls in JS cosmetic rules start with this mask.
pub const SCRIPTLET_MASK: &str = "//scriptlet";

// =============================================================================
// Rule Identity
// =============================================================================

/// Identity of a rule: its filter list and its key inside that list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RuleId {
    pub filter_list_id: u32,
    pub index: u32,
}

impl RuleId {
    pub const fn new(filter_list_id: u32, index: u32) -> Self {
        Self { filter_list_id, index }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.filter_list_id, self.index)
    }
}

// =============================================================================
// Network Rules
// =============================================================================

/// A URL blocking, redirecting or exception rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRule {
    pub id: RuleId,
    pub text: String,
    pub allowlist: bool,
    /// URL pattern with the `@@` prefix and the modifier block stripped
    pub pattern: String,
    pub options: NetworkRuleOption,
    /// Empty unless the rule names request types explicitly
    pub permitted_request_types: RequestType,
    pub restricted_request_types: RequestType,
    pub permitted_domains: Vec<String>,
    pub restricted_domains: Vec<String>,
    pub permitted_apps: Vec<String>,
    pub restricted_apps: Vec<String>,
    pub permitted_methods: Vec<String>,
    pub restricted_methods: Vec<String>,
    /// Value of $redirect, $redirect-rule or $replace
    pub advanced_modifier: Option<String>,
}

impl NetworkRule {
    /// Rule with no options, used by the compiler as a starting point.
    pub fn new(id: RuleId, text: impl Into<String>, pattern: impl Into<String>, allowlist: bool) -> Self {
        Self {
            id,
            text: text.into(),
            allowlist,
            pattern: pattern.into(),
            options: NetworkRuleOption::empty(),
            permitted_request_types: RequestType::empty(),
            restricted_request_types: RequestType::empty(),
            permitted_domains: Vec::new(),
            restricted_domains: Vec::new(),
            permitted_apps: Vec::new(),
            restricted_apps: Vec::new(),
            permitted_methods: Vec::new(),
            restricted_methods: Vec::new(),
            advanced_modifier: None,
        }
    }

    #[inline]
    pub fn is_allowlist(&self) -> bool {
        self.allowlist
    }

    #[inline]
    pub fn is_option_enabled(&self, option: NetworkRuleOption) -> bool {
        self.options.contains(option)
    }

    #[inline]
    pub fn is_important(&self) -> bool {
        self.options.contains(NetworkRuleOption::IMPORTANT)
    }

    /// Allowlist rule that disables filtering for a whole page.
    pub fn is_document_level_allowlist(&self) -> bool {
        self.allowlist
            && self
                .options
                .intersects(NetworkRuleOption::DOCUMENT | NetworkRuleOption::URLBLOCK)
    }

    pub fn advanced_modifier_value(&self) -> Option<&str> {
        self.advanced_modifier.as_deref()
    }

    /// Whether `domain` is one of the permitted domains or a subdomain of one.
    pub fn matches_permitted_domains(&self, domain: &str) -> bool {
        is_domain_or_subdomain_of_any(domain, &self.permitted_domains)
    }
}

// =============================================================================
// Cosmetic Rules
// =============================================================================

/// Separator between the domain pattern and the content of a cosmetic rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CosmeticMarker {
    ElementHiding,
    ElementHidingException,
    ElementHidingExtCss,
    ElementHidingExtCssException,
    Css,
    CssException,
    CssExtCss,
    CssExtCssException,
    Js,
    JsException,
    Html,
    HtmlException,
}

impl CosmeticMarker {
    /// Every marker, longest first so prefix overlaps resolve correctly.
    pub const ALL: [CosmeticMarker; 12] = [
        Self::CssExtCssException,
        Self::JsException,
        Self::ElementHidingExtCssException,
        Self::CssException,
        Self::CssExtCss,
        Self::ElementHidingException,
        Self::ElementHidingExtCss,
        Self::Css,
        Self::Js,
        Self::HtmlException,
        Self::ElementHiding,
        Self::Html,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ElementHiding => "##",
            Self::ElementHidingException => "#@#",
            Self::ElementHidingExtCss => "#?#",
            Self::ElementHidingExtCssException => "#@?#",
            Self::Css => "#$#",
            Self::CssException => "#@$#",
            Self::CssExtCss => "#$?#",
            Self::CssExtCssException => "#@$?#",
            Self::Js => "#%#",
            Self::JsException => "#@%#",
            Self::Html => "$$",
            Self::HtmlException => "$@$",
        }
    }

    pub fn is_exception(self) -> bool {
        matches!(
            self,
            Self::ElementHidingException
                | Self::ElementHidingExtCssException
                | Self::CssException
                | Self::CssExtCssException
                | Self::JsException
                | Self::HtmlException
        )
    }

    pub fn is_js(self) -> bool {
        matches!(self, Self::Js | Self::JsException)
    }

    /// Find the first marker in `text`, returning it with its byte offset.
    pub fn find(text: &str) -> Option<(usize, CosmeticMarker)> {
        let bytes = text.as_bytes();
        for (pos, &b) in bytes.iter().enumerate() {
            if b != b'#' && b != b'$' {
                continue;
            }
            let rest = &text[pos..];
            if let Some(marker) = Self::ALL.iter().find(|m| rest.starts_with(m.as_str())) {
                return Some((pos, *marker));
            }
        }
        None
    }
}

impl fmt::Display for CosmeticMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Element hiding, CSS injection, script injection or HTML filtering rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CosmeticRule {
    pub id: RuleId,
    pub text: String,
    pub marker: CosmeticMarker,
    pub content: String,
    pub permitted_domains: Vec<String>,
    pub restricted_domains: Vec<String>,
    pub path: Option<String>,
    pub url: Option<String>,
}

impl CosmeticRule {
    #[inline]
    pub fn is_allowlist(&self) -> bool {
        self.marker.is_exception()
    }

    /// A generic rule applies on every site not explicitly restricted.
    #[inline]
    pub fn is_generic(&self) -> bool {
        self.permitted_domains.is_empty()
    }

    /// JS rule whose content is a scriptlet call rather than raw code.
    pub fn is_scriptlet(&self) -> bool {
        self.marker.is_js() && self.content.starts_with(SCRIPTLET_MASK)
    }

    /// The `(...)` call part of a scriptlet rule.
    pub fn scriptlet_call(&self) -> Option<&str> {
        if !self.marker.is_js() {
            return None;
        }
        self.content.strip_prefix(SCRIPTLET_MASK)
    }

    /// Whether the rule applies to pages on `domain`.
    pub fn matches_domain(&self, domain: &str) -> bool {
        if is_domain_or_subdomain_of_any(domain, &self.restricted_domains) {
            return false;
        }
        self.is_generic() || is_domain_or_subdomain_of_any(domain, &self.permitted_domains)
    }

    pub fn matches_permitted_domains(&self, domain: &str) -> bool {
        is_domain_or_subdomain_of_any(domain, &self.permitted_domains)
    }
}

// =============================================================================
// Rule
// =============================================================================

/// Any rule kept in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Network(NetworkRule),
    Cosmetic(CosmeticRule),
}

impl Rule {
    pub fn id(&self) -> RuleId {
        match self {
            Self::Network(rule) => rule.id,
            Self::Cosmetic(rule) => rule.id,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Network(rule) => &rule.text,
            Self::Cosmetic(rule) => &rule.text,
        }
    }

    pub fn is_allowlist(&self) -> bool {
        match self {
            Self::Network(rule) => rule.is_allowlist(),
            Self::Cosmetic(rule) => rule.is_allowlist(),
        }
    }

    pub fn as_network(&self) -> Option<&NetworkRule> {
        match self {
            Self::Network(rule) => Some(rule),
            Self::Cosmetic(_) => None,
        }
    }

    pub fn as_cosmetic(&self) -> Option<&CosmeticRule> {
        match self {
            Self::Cosmetic(rule) => Some(rule),
            Self::Network(_) => None,
        }
    }

    /// Whether `domain` falls under the rule's permitted domains.
    pub fn matches_permitted_domains(&self, domain: &str) -> bool {
        match self {
            Self::Network(rule) => rule.matches_permitted_domains(domain),
            Self::Cosmetic(rule) => rule.matches_permitted_domains(domain),
        }
    }
}

impl From<NetworkRule> for Rule {
    fn from(rule: NetworkRule) -> Self {
        Self::Network(rule)
    }
}

impl From<CosmeticRule> for Rule {
    fn from(rule: CosmeticRule) -> Self {
        Self::Cosmetic(rule)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// `domain` equals `parent` or is a subdomain of it (ASCII case-insensitive).
pub fn is_domain_or_subdomain(domain: &str, parent: &str) -> bool {
    if parent.is_empty() || domain.len() < parent.len() {
        return false;
    }
    let split = domain.len() - parent.len();
    if !domain.is_char_boundary(split) || !domain[split..].eq_ignore_ascii_case(parent) {
        return false;
    }
    split == 0 || domain.as_bytes()[split - 1] == b'.'
}

fn is_domain_or_subdomain_of_any(domain: &str, parents: &[String]) -> bool {
    parents.iter().any(|parent| is_domain_or_subdomain(domain, parent))
}
