//! Load lists, store them, decide requests and collect cosmetic scripts.

use std::cell::Cell;

use sieve_compiler::{load_storage, RuleFactory};
use sieve_core::cosmetic::{ScriptCache, ScriptMaterializer, ScriptRequest, ScriptletInvocation};
use sieve_core::matcher::NullFilteringLog;
use sieve_core::rule::Rule;
use sieve_core::storage::SharedStorage;
use sieve_core::{
    Action, CosmeticScriptsResult, EngineConfig, Matcher, MatchingResult, NetworkRule, RequestContext, RequestType,
};

const ADS: &str = "! Ads
||ads.example.com^
||ads.example.com/top.js$script,redirect=noopjs
||tracker.net^$document
||popunder.net^$popup
@@||ads.example.com/allowed/*
||ads.example.com/allowed/forced.gif$important
example.org,news.example.com#%#//scriptlet('set-constant', 'adsEnabled', 'false')
#%#window.__sieve = true;
";

const ALLOW: &str = "@@||trusted.example.com^$document
||broken^$unknown
";

fn no_redirect(_value: Option<&str>, _url: &str) -> Option<String> {
    None
}

fn redirect(value: Option<&str>, _url: &str) -> Option<String> {
    value.map(|name| format!("/redirects/{name}"))
}

fn never_popup(_tab: i32) -> bool {
    false
}

/// Stand-in for the external index: every rule whose pattern mentions `host`.
fn candidates<'a>(rules: impl Iterator<Item = &'a NetworkRule>, host: &str) -> Vec<&'a NetworkRule> {
    rules.filter(|rule| rule.pattern.contains(host)).collect()
}

#[test]
fn test_load_and_decide() {
    let config = EngineConfig::default();
    let (storage, errors) = load_storage(&[(1, ADS), (2, ALLOW)], &config);
    assert_eq!(storage.rules_count(), 9);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, 2);

    let shared = SharedStorage::new(storage);
    let storage = shared.snapshot();
    let log = NullFilteringLog;
    let matcher = Matcher::new(&redirect, &never_popup, &log);

    // Plain block
    let ctx = RequestContext::new("https://ads.example.com/banner.gif", "https://site.com/", RequestType::IMAGE, 1, "e1");
    let result = MatchingResult::from_candidates(candidates(storage.network_rules(), "ads.example.com^"), Vec::new());
    assert_eq!(matcher.decide(result.basic_result(), &ctx), Action::Cancel);

    // Redirect rule
    let rule = storage.retrieve_network_rule(1, 2);
    let ctx = RequestContext::new("https://ads.example.com/top.js", "https://site.com/", RequestType::SCRIPT, 1, "e2");
    assert_eq!(matcher.decide(rule, &ctx), Action::Redirect("/redirects/noopjs".into()));

    // Without a resolvable surrogate the redirect rule just blocks
    let plain = Matcher::new(&no_redirect, &never_popup, &log);
    assert_eq!(plain.decide(rule, &ctx), Action::Cancel);

    // Document-scoped rule blocks navigation
    let rule = storage.retrieve_network_rule(1, 3);
    let ctx = RequestContext::new("https://tracker.net/", "", RequestType::DOCUMENT, 1, "e3");
    assert_eq!(matcher.decide(rule, &ctx), Action::ShowBlockingPage);

    // Popup rule on an ordinary tab does nothing
    let rule = storage.retrieve_network_rule(1, 4);
    let ctx = RequestContext::new("https://popunder.net/x.js", "https://site.com/", RequestType::SCRIPT, 1, "e4");
    assert_eq!(matcher.decide(rule, &ctx), Action::NoAction);
}

#[test]
fn test_precedence_across_lists() {
    let (storage, _) = load_storage(&[(1, ADS), (2, ALLOW)], &EngineConfig::default());

    let exception = storage.retrieve_network_rule(1, 5).unwrap();
    let important = storage.retrieve_network_rule(1, 6).unwrap();
    let block = storage.retrieve_network_rule(1, 1).unwrap();

    let result = MatchingResult::from_candidates([block, exception], Vec::new());
    assert_eq!(result.basic_result().map(|r| r.id), Some(exception.id));

    let result = MatchingResult::from_candidates([block, exception, important], Vec::new());
    assert_eq!(result.basic_result().map(|r| r.id), Some(important.id));

    let document = storage.retrieve_network_rule(2, 0).unwrap();
    let result = MatchingResult::from_candidates([important, document], Vec::new());
    assert_eq!(result.basic_result().map(|r| r.id), Some(document.id));
}

#[test]
fn test_cosmetic_scripts() {
    let (storage, _) = load_storage(&[(1, ADS)], &EngineConfig::default());

    let calls = Cell::new(0);
    let resolver = |invocation: &ScriptletInvocation<'_>| {
        calls.set(calls.get() + 1);
        format!("{}({})", invocation.name, invocation.args.join(","))
    };
    let cache = ScriptCache::new();
    let materializer = ScriptMaterializer::new(&cache, &resolver, "extension", "test");

    let request = ScriptRequest::from_url("https://news.example.com/article").unwrap();
    let mut result = CosmeticScriptsResult::new(&materializer);
    for rule in storage.cosmetic_rules().filter(|r| r.is_generic() || r.matches_domain(request.domain)) {
        result.append(rule, Some(&request));
        result.append(rule, Some(&request));
    }

    assert_eq!(result.len(), 2);
    assert_eq!(result.generic().len(), 1);
    assert_eq!(result.specific().len(), 1);
    assert_eq!(
        result.scripts(false),
        vec!["window.__sieve = true;", "set-constant(adsEnabled,false)"]
    );
    assert_eq!(calls.get(), 2);
}

#[test]
fn test_all_modifier_blocks_navigation_and_popups() {
    let factory = RuleFactory::default();
    let rule = match factory.create_rule("||evil.com^$all", 1, 0) {
        Ok(Some(Rule::Network(rule))) => rule,
        other => panic!("expected a network rule, got {other:?}"),
    };
    let log = NullFilteringLog;

    let ctx = RequestContext::new("https://evil.com/", "", RequestType::DOCUMENT, 1, "e1");
    let matcher = Matcher::new(&no_redirect, &never_popup, &log);
    assert_eq!(matcher.decide(Some(&rule), &ctx), Action::ShowBlockingPage);

    let new_popup = |_tab: i32| true;
    let matcher = Matcher::new(&no_redirect, &new_popup, &log);
    assert_eq!(matcher.decide(Some(&rule), &ctx), Action::ClosePopupTab);
}
