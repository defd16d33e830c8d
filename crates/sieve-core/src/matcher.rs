//! Request decision engine
//!
//! The external index hands over the candidate rules for a request;
//! [`MatchingResult`] picks the effective one and [`Matcher::decide`] turns it
//! into the [`Action`] the host enforces. Decisions never fail: a missing rule
//! or an unmet condition degrades to [`Action::NoAction`] or [`Action::Cancel`].

use crate::rule::{NetworkRule, Rule};
use crate::types::{Action, ContentType, NetworkRuleOption, RequestContext, RequestType};

// =============================================================================
// Collaborators
// =============================================================================

/// Builds the URL of a surrogate resource for `$redirect` rules.
pub trait RedirectResolver {
    /// `value` is the rule's redirect modifier value.
    fn create_redirect_url(&self, value: Option<&str>, request_url: &str) -> Option<String>;
}

impl<F> RedirectResolver for F
where
    F: Fn(Option<&str>, &str) -> Option<String>,
{
    fn create_redirect_url(&self, value: Option<&str>, request_url: &str) -> Option<String> {
        self(value, request_url)
    }
}

/// Knows which tabs were just opened as popups.
pub trait TabRegistry {
    fn is_new_popup_tab(&self, tab_id: i32) -> bool;
}

impl<F> TabRegistry for F
where
    F: Fn(i32) -> bool,
{
    fn is_new_popup_tab(&self, tab_id: i32) -> bool {
        self(tab_id)
    }
}

/// Event published whenever a rule is applied to a request.
#[derive(Debug, Clone)]
pub struct FilteringEvent<'a> {
    pub rule: &'a NetworkRule,
    pub action: &'a Action,
    pub tab_id: i32,
    pub event_id: &'a str,
    pub content_type: ContentType,
    pub frame_url: &'a str,
    pub request_url: &'a str,
}

/// Sink for filtering events. Publishing cannot fail or alter a decision.
pub trait FilteringLog {
    fn publish_event(&self, event: &FilteringEvent<'_>);
}

/// Forwards filtering events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFilteringLog;

impl FilteringLog for LogFilteringLog {
    fn publish_event(&self, event: &FilteringEvent<'_>) {
        log::info!(
            "[tab {} event {}] {} {:?} {} (frame {}) by rule {} '{}'",
            event.tab_id,
            event.event_id,
            event.action,
            event.content_type,
            event.request_url,
            event.frame_url,
            event.rule.id,
            event.rule.text,
        );
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullFilteringLog;

impl FilteringLog for NullFilteringLog {
    fn publish_event(&self, _event: &FilteringEvent<'_>) {}
}

// =============================================================================
// Matcher
// =============================================================================

/// Turns the winning rule for a request into an action.
pub struct Matcher<'a> {
    redirects: &'a dyn RedirectResolver,
    tabs: &'a dyn TabRegistry,
    filtering_log: &'a dyn FilteringLog,
}

impl<'a> Matcher<'a> {
    pub fn new(
        redirects: &'a dyn RedirectResolver,
        tabs: &'a dyn TabRegistry,
        filtering_log: &'a dyn FilteringLog,
    ) -> Self {
        Self {
            redirects,
            tabs,
            filtering_log,
        }
    }

    /// Decide what to do with a request given its winning rule.
    pub fn decide(&self, rule: Option<&NetworkRule>, ctx: &RequestContext<'_>) -> Action {
        let rule = match rule {
            Some(rule) => rule,
            None => return Action::NoAction,
        };

        // Allowlist always wins; upstream precedence already made sure of it
        if rule.is_allowlist() {
            return self.apply(rule, ctx, Action::NoAction);
        }

        if rule.is_option_enabled(NetworkRuleOption::POPUP) {
            if self.tabs.is_new_popup_tab(ctx.tab_id) {
                return self.apply(rule, ctx, Action::ClosePopupTab);
            }

            // $popup alone carries no request types, so only $all (or
            // $document,popup spanning every type) reaches the page itself
            if is_document_request(ctx) && rule.permitted_request_types.is_all() {
                return self.apply(rule, ctx, Action::ShowBlockingPage);
            }

            return Action::NoAction;
        }

        if rule.is_option_enabled(NetworkRuleOption::REDIRECT) {
            let redirect_url = self
                .redirects
                .create_redirect_url(rule.advanced_modifier_value(), ctx.request_url);
            if let Some(url) = redirect_url {
                return self.apply(rule, ctx, Action::Redirect(url));
            }
        }

        // Basic rules never block top-level navigation unless scoped to $document
        if is_document_request(ctx) {
            if rule.permitted_request_types == RequestType::DOCUMENT {
                return self.apply(rule, ctx, Action::ShowBlockingPage);
            }
            return Action::NoAction;
        }

        self.apply(rule, ctx, Action::Cancel)
    }

    fn apply(&self, rule: &NetworkRule, ctx: &RequestContext<'_>, action: Action) -> Action {
        self.filtering_log.publish_event(&FilteringEvent {
            rule,
            action: &action,
            tab_id: ctx.tab_id,
            event_id: ctx.event_id,
            content_type: ctx.content_type,
            frame_url: ctx.referrer_url,
            request_url: ctx.request_url,
        });
        action
    }
}

#[inline]
fn is_document_request(ctx: &RequestContext<'_>) -> bool {
    ctx.request_type == RequestType::DOCUMENT
}

/// Whether applying `rule` ends with the request being dropped.
pub fn is_request_blocked_by_rule(rule: Option<&NetworkRule>) -> bool {
    match rule {
        Some(rule) => {
            !rule.is_allowlist()
                && !rule.is_option_enabled(NetworkRuleOption::REPLACE)
                && !rule.is_option_enabled(NetworkRuleOption::REDIRECT)
        }
        None => false,
    }
}

// =============================================================================
// Matching Result
// =============================================================================

/// Allowlist options that only switch off cosmetic filtering.
const COSMETIC_EXCEPTION_OPTIONS: NetworkRuleOption = NetworkRuleOption::ELEMHIDE
    .union(NetworkRuleOption::GENERICHIDE)
    .union(NetworkRuleOption::SPECIFICHIDE)
    .union(NetworkRuleOption::JSINJECT)
    .union(NetworkRuleOption::CONTENT)
    .union(NetworkRuleOption::GENERICBLOCK);

/// Rules selected for one request.
#[derive(Debug, Clone, Default)]
pub struct MatchingResult<'a> {
    pub basic_rule: Option<&'a NetworkRule>,
    pub host_rules: Vec<&'a Rule>,
    pub document_rule: Option<&'a NetworkRule>,
}

impl<'a> MatchingResult<'a> {
    /// Classify network candidates, in the order the index produced them.
    pub fn from_candidates<I>(candidates: I, host_rules: Vec<&'a Rule>) -> Self
    where
        I: IntoIterator<Item = &'a NetworkRule>,
    {
        let mut best_important_allow: Option<&NetworkRule> = None;
        let mut best_important_block: Option<&NetworkRule> = None;
        let mut best_allow: Option<&NetworkRule> = None;
        let mut best_block: Option<&NetworkRule> = None;
        let mut document_rule: Option<&NetworkRule> = None;

        for rule in candidates {
            if rule.is_option_enabled(NetworkRuleOption::BADFILTER) {
                continue;
            }

            if rule.is_allowlist() {
                if rule.is_document_level_allowlist() {
                    document_rule.get_or_insert(rule);
                    continue;
                }
                if rule.options.intersects(COSMETIC_EXCEPTION_OPTIONS) {
                    continue;
                }
                let slot = if rule.is_important() {
                    &mut best_important_allow
                } else {
                    &mut best_allow
                };
                slot.get_or_insert(rule);
            } else {
                let slot = if rule.is_important() {
                    &mut best_important_block
                } else {
                    &mut best_block
                };
                slot.get_or_insert(rule);
            }
        }

        // 1. IMPORTANT ALLOW beats everything
        // 2. IMPORTANT BLOCK wins over regular exceptions
        // 3. ALLOW overrides normal block
        // 4. Normal BLOCK
        let basic_rule = best_important_allow
            .or(best_important_block)
            .or(best_allow)
            .or(best_block);

        Self {
            basic_rule,
            host_rules,
            document_rule,
        }
    }

    /// The rule the decision engine should act on.
    pub fn basic_result(&self) -> Option<&'a NetworkRule> {
        self.document_rule.or(self.basic_rule)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::rule::RuleId;

    #[derive(Default)]
    struct RecordingLog {
        events: RefCell<Vec<(String, String, String)>>,
    }

    impl FilteringLog for RecordingLog {
        fn publish_event(&self, event: &FilteringEvent<'_>) {
            self.events.borrow_mut().push((
                event.action.to_string(),
                event.request_url.to_string(),
                event.event_id.to_string(),
            ));
        }
    }

    fn redirect_to_resource(value: Option<&str>, _request_url: &str) -> Option<String> {
        value.map(|name| format!("/redirects/{name}"))
    }

    fn no_popups(_tab_id: i32) -> bool {
        false
    }

    fn every_tab_is_popup(_tab_id: i32) -> bool {
        true
    }

    fn rule(text: &str, allowlist: bool) -> NetworkRule {
        NetworkRule::new(RuleId::new(1, 0), text, text, allowlist)
    }

    fn ctx(request_type: RequestType) -> RequestContext<'static> {
        RequestContext::new("https://ads.example.com/a.js", "https://example.com/", request_type, 7, "ev-1")
    }

    #[test]
    fn test_no_rule_is_no_action() {
        let log = RecordingLog::default();
        let matcher = Matcher::new(&redirect_to_resource, &no_popups, &log);
        assert_eq!(matcher.decide(None, &ctx(RequestType::SCRIPT)), Action::NoAction);
        assert!(log.events.borrow().is_empty());
    }

    #[test]
    fn test_allowlist_wins_regardless_of_options() {
        let log = RecordingLog::default();
        let matcher = Matcher::new(&redirect_to_resource, &every_tab_is_popup, &log);
        let mut allow = rule("@@||ads.example.com^$popup,redirect=noopjs", true);
        allow.options = NetworkRuleOption::POPUP | NetworkRuleOption::REDIRECT | NetworkRuleOption::IMPORTANT;
        allow.advanced_modifier = Some("noopjs".into());

        assert_eq!(matcher.decide(Some(&allow), &ctx(RequestType::SCRIPT)), Action::NoAction);
        assert_eq!(matcher.decide(Some(&allow), &ctx(RequestType::DOCUMENT)), Action::NoAction);
        // The exemption is still logged
        assert_eq!(log.events.borrow().len(), 2);
    }

    #[test]
    fn test_popup_on_new_tab_closes_it() {
        let log = RecordingLog::default();
        let matcher = Matcher::new(&redirect_to_resource, &every_tab_is_popup, &log);
        let mut popup = rule("||ads.example.com^$popup", false);
        popup.options = NetworkRuleOption::POPUP;

        assert_eq!(matcher.decide(Some(&popup), &ctx(RequestType::DOCUMENT)), Action::ClosePopupTab);
        assert_eq!(log.events.borrow()[0].0, "close-popup-tab");
    }

    #[test]
    fn test_popup_on_regular_tab_never_cancels_subresources() {
        let log = RecordingLog::default();
        let matcher = Matcher::new(&redirect_to_resource, &no_popups, &log);
        let mut popup = rule("||ads.example.com^$popup", false);
        popup.options = NetworkRuleOption::POPUP;

        assert_eq!(matcher.decide(Some(&popup), &ctx(RequestType::SCRIPT)), Action::NoAction);
        assert_eq!(matcher.decide(Some(&popup), &ctx(RequestType::DOCUMENT)), Action::NoAction);
        assert!(log.events.borrow().is_empty());
    }

    #[test]
    fn test_popup_with_all_types_shows_blocking_page() {
        let log = RecordingLog::default();
        let matcher = Matcher::new(&redirect_to_resource, &no_popups, &log);
        let mut popup = rule("||ads.example.com^$all", false);
        popup.options = NetworkRuleOption::POPUP;
        popup.permitted_request_types = RequestType::all();

        assert_eq!(matcher.decide(Some(&popup), &ctx(RequestType::DOCUMENT)), Action::ShowBlockingPage);
        assert_eq!(matcher.decide(Some(&popup), &ctx(RequestType::IMAGE)), Action::NoAction);
    }

    #[test]
    fn test_redirect() {
        let log = RecordingLog::default();
        let matcher = Matcher::new(&redirect_to_resource, &no_popups, &log);
        let mut redirect = rule("||ads.example.com^$redirect=noopjs", false);
        redirect.options = NetworkRuleOption::REDIRECT;
        redirect.advanced_modifier = Some("noopjs".into());

        assert_eq!(
            matcher.decide(Some(&redirect), &ctx(RequestType::SCRIPT)),
            Action::Redirect("/redirects/noopjs".into())
        );
        let events = log.events.borrow();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1, "https://ads.example.com/a.js");
        assert_eq!(events[0].2, "ev-1");
    }

    #[test]
    fn test_unresolved_redirect_falls_through_to_cancel() {
        fn unresolved(_value: Option<&str>, _request_url: &str) -> Option<String> {
            None
        }

        let log = NullFilteringLog;
        let matcher = Matcher::new(&unresolved, &no_popups, &log);
        let mut redirect = rule("||ads.example.com^$redirect=missing", false);
        redirect.options = NetworkRuleOption::REDIRECT;

        assert_eq!(matcher.decide(Some(&redirect), &ctx(RequestType::SCRIPT)), Action::Cancel);
        assert_eq!(matcher.decide(Some(&redirect), &ctx(RequestType::DOCUMENT)), Action::NoAction);
    }

    #[test]
    fn test_document_scoped_rule() {
        let log = RecordingLog::default();
        let matcher = Matcher::new(&redirect_to_resource, &no_popups, &log);
        let mut document = rule("||example.com^$document", false);
        document.permitted_request_types = RequestType::DOCUMENT;

        assert_eq!(matcher.decide(Some(&document), &ctx(RequestType::DOCUMENT)), Action::ShowBlockingPage);
        assert_eq!(matcher.decide(Some(&document), &ctx(RequestType::SCRIPT)), Action::Cancel);
        assert_eq!(log.events.borrow().len(), 2);
    }

    #[test]
    fn test_basic_rule_does_not_block_navigation() {
        let log = RecordingLog::default();
        let matcher = Matcher::new(&redirect_to_resource, &no_popups, &log);
        let basic = rule("||example.com^", false);

        assert_eq!(matcher.decide(Some(&basic), &ctx(RequestType::DOCUMENT)), Action::NoAction);
        assert_eq!(matcher.decide(Some(&basic), &ctx(RequestType::IMAGE)), Action::Cancel);
        assert_eq!(log.events.borrow().len(), 1);
    }

    #[test]
    fn test_is_request_blocked_by_rule() {
        assert!(!is_request_blocked_by_rule(None));
        assert!(is_request_blocked_by_rule(Some(&rule("||a.com^", false))));
        assert!(!is_request_blocked_by_rule(Some(&rule("@@||a.com^", true))));

        let mut redirect = rule("||a.com^$redirect=noopjs", false);
        redirect.options = NetworkRuleOption::REDIRECT;
        assert!(!is_request_blocked_by_rule(Some(&redirect)));

        let mut replace = rule("||a.com^$replace=/a/b/", false);
        replace.options = NetworkRuleOption::REPLACE;
        assert!(!is_request_blocked_by_rule(Some(&replace)));
    }

    #[test]
    fn test_matching_result_precedence() {
        let block = rule("||a.com^", false);
        let allow = rule("@@||a.com^", true);
        let mut important_block = rule("||a.com^$important", false);
        important_block.options = NetworkRuleOption::IMPORTANT;
        let mut important_allow = rule("@@||a.com^$important", true);
        important_allow.options = NetworkRuleOption::IMPORTANT;

        let result = MatchingResult::from_candidates([&block], Vec::new());
        assert_eq!(result.basic_result().map(|r| r.text.as_str()), Some("||a.com^"));

        let result = MatchingResult::from_candidates([&block, &allow], Vec::new());
        assert_eq!(result.basic_result().map(|r| r.text.as_str()), Some("@@||a.com^"));

        let result = MatchingResult::from_candidates([&allow, &important_block], Vec::new());
        assert_eq!(result.basic_result().map(|r| r.text.as_str()), Some("||a.com^$important"));

        let result = MatchingResult::from_candidates([&important_block, &important_allow], Vec::new());
        assert_eq!(result.basic_result().map(|r| r.text.as_str()), Some("@@||a.com^$important"));
    }

    #[test]
    fn test_matching_result_document_rule() {
        let mut important_block = rule("||a.com^$important", false);
        important_block.options = NetworkRuleOption::IMPORTANT;
        let mut document = rule("@@||a.com^$document", true);
        document.options = NetworkRuleOption::DOCUMENT;
        let mut elemhide = rule("@@||a.com^$elemhide", true);
        elemhide.options = NetworkRuleOption::ELEMHIDE;

        let result = MatchingResult::from_candidates([&important_block, &document], Vec::new());
        assert_eq!(result.document_rule.map(|r| r.text.as_str()), Some("@@||a.com^$document"));
        assert_eq!(result.basic_rule.map(|r| r.text.as_str()), Some("||a.com^$important"));
        assert_eq!(result.basic_result().map(|r| r.text.as_str()), Some("@@||a.com^$document"));

        let result = MatchingResult::from_candidates([&elemhide], Vec::new());
        assert!(result.basic_result().is_none());
    }
}
