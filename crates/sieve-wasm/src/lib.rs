//! WebAssembly bindings for sieve
//!
//! The host extension owns request interception, the rule index and the
//! scriptlet library. It hands candidate rule ids and callbacks to [`Engine`],
//! which answers with decisions and script payloads.

use wasm_bindgen::prelude::*;

use sieve_compiler::{load_storage, RuleValidator};
use sieve_core::cosmetic::{ScriptCache, ScriptMaterializer, ScriptRequest, ScriptletInvocation, ScriptletResolver};
use sieve_core::matcher::{FilteringEvent, FilteringLog, RedirectResolver};
use sieve_core::storage::{RuleStorage, SharedStorage};
use sieve_core::{
    parse_scriptlet_call, Action, CosmeticScriptsResult, EngineConfig, Matcher, MatchingResult, NetworkRule,
    RequestContext, RequestType,
};

// =============================================================================
// Host Callbacks
// =============================================================================

/// `(value, requestUrl) => string | undefined`
struct JsRedirectResolver<'a>(&'a js_sys::Function);

impl RedirectResolver for JsRedirectResolver<'_> {
    fn create_redirect_url(&self, value: Option<&str>, request_url: &str) -> Option<String> {
        let value = value.map(JsValue::from_str).unwrap_or(JsValue::UNDEFINED);
        self.0
            .call2(&JsValue::NULL, &value, &JsValue::from_str(request_url))
            .ok()?
            .as_string()
    }
}

/// `(invocation) => string`
struct JsScriptletResolver<'a>(&'a js_sys::Function);

impl ScriptletResolver for JsScriptletResolver<'_> {
    fn invoke(&self, invocation: &ScriptletInvocation<'_>) -> String {
        let args = js_sys::Array::new();
        for arg in invocation.args {
            args.push(&JsValue::from_str(arg));
        }

        let source = js_sys::Object::new();
        let _ = js_sys::Reflect::set(&source, &"name".into(), &JsValue::from_str(invocation.name));
        let _ = js_sys::Reflect::set(&source, &"args".into(), &args);
        let _ = js_sys::Reflect::set(&source, &"engine".into(), &JsValue::from_str(invocation.engine));
        let _ = js_sys::Reflect::set(&source, &"version".into(), &JsValue::from_str(invocation.version));
        let _ = js_sys::Reflect::set(&source, &"ruleText".into(), &JsValue::from_str(invocation.rule_text));
        let _ = js_sys::Reflect::set(&source, &"verbose".into(), &JsValue::from(invocation.verbose));
        if let Some(domain) = invocation.domain_name {
            let _ = js_sys::Reflect::set(&source, &"domainName".into(), &JsValue::from_str(domain));
        }

        match self.0.call1(&JsValue::NULL, &source) {
            Ok(code) => code.as_string().unwrap_or_default(),
            Err(_) => {
                web_sys::console::warn_1(&JsValue::from_str(&format!(
                    "[sieve] scriptlet '{}' failed to resolve",
                    invocation.name
                )));
                String::new()
            }
        }
    }
}

/// Writes filtering events to the browser console.
struct ConsoleFilteringLog;

impl FilteringLog for ConsoleFilteringLog {
    fn publish_event(&self, event: &FilteringEvent<'_>) {
        web_sys::console::debug_1(&JsValue::from_str(&format!(
            "[sieve] tab {} event {}: {} {} by {} '{}'",
            event.tab_id, event.event_id, event.action, event.request_url, event.rule.id, event.rule.text
        )));
    }
}

// =============================================================================
// Stateless Helpers
// =============================================================================

#[wasm_bindgen]
pub fn validate_rule(text: &str) -> JsValue {
    let validation = RuleValidator::validate(text);
    let result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&result, &"result".into(), &JsValue::from(validation.result));
    if let Some(error) = validation.error {
        let _ = js_sys::Reflect::set(&result, &"error".into(), &JsValue::from_str(&error));
    }
    result.into()
}

#[wasm_bindgen]
pub fn parse_scriptlet(call: &str) -> Result<JsValue, JsValue> {
    let spec = parse_scriptlet_call(call).map_err(|e| JsValue::from_str(&format!("{} at {}", e, e.span)))?;

    let args = js_sys::Array::new();
    for arg in &spec.args {
        args.push(&JsValue::from_str(arg));
    }
    let result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&result, &"name".into(), &JsValue::from_str(&spec.name));
    let _ = js_sys::Reflect::set(&result, &"args".into(), &args);
    Ok(result.into())
}

// =============================================================================
// Engine
// =============================================================================

#[wasm_bindgen]
pub struct Engine {
    config: EngineConfig,
    storage: SharedStorage,
    scripts: ScriptCache,
}

#[wasm_bindgen]
impl Engine {
    /// `config_json` follows the engine configuration schema; omitted fields
    /// take their defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<Engine, JsValue> {
        let config = match config_json {
            Some(json) => EngineConfig::from_json_str(&json).map_err(|e| JsValue::from_str(&e.to_string()))?,
            None => EngineConfig::default(),
        };
        Ok(Self {
            config,
            storage: SharedStorage::new(RuleStorage::new()),
            scripts: ScriptCache::new(),
        })
    }

    /// Replace every loaded list. `lists` is an array of list texts; the
    /// array index is the list id.
    pub fn load_lists(&self, lists: JsValue) -> Result<JsValue, JsValue> {
        let list_array = js_sys::Array::from(&lists);
        let mut texts = Vec::with_capacity(list_array.length() as usize);
        for value in list_array.iter() {
            texts.push(
                value
                    .as_string()
                    .ok_or_else(|| JsValue::from_str("List text must be a string"))?,
            );
        }

        let lists: Vec<(u32, &str)> = texts
            .iter()
            .enumerate()
            .map(|(id, text)| (id as u32, text.as_str()))
            .collect();
        let (storage, errors) = load_storage(&lists, &self.config);
        let rules = storage.rules_count();

        self.storage.replace(storage);
        self.scripts.clear();

        let js_errors = js_sys::Array::new();
        for (list_id, error) in &errors {
            let item = js_sys::Object::new();
            let _ = js_sys::Reflect::set(&item, &"listId".into(), &JsValue::from(*list_id));
            let _ = js_sys::Reflect::set(&item, &"line".into(), &JsValue::from(error.line));
            let _ = js_sys::Reflect::set(&item, &"start".into(), &JsValue::from(error.span.start as u32));
            let _ = js_sys::Reflect::set(&item, &"end".into(), &JsValue::from(error.span.end as u32));
            let _ = js_sys::Reflect::set(&item, &"message".into(), &JsValue::from_str(&error.message));
            js_errors.push(&item);
        }

        let result = js_sys::Object::new();
        let _ = js_sys::Reflect::set(&result, &"rules".into(), &JsValue::from(rules as u32));
        let _ = js_sys::Reflect::set(&result, &"errors".into(), &js_errors);
        Ok(result.into())
    }

    pub fn rules_count(&self) -> u32 {
        self.storage.snapshot().rules_count() as u32
    }

    /// Decide a request. `candidates` is an array of `[listId, ruleKey]`
    /// pairs in index order.
    #[allow(clippy::too_many_arguments)]
    pub fn decide(
        &self,
        candidates: JsValue,
        url: &str,
        referrer: &str,
        request_type: &str,
        tab_id: i32,
        event_id: &str,
        is_popup_tab: bool,
        redirect_resolver: &js_sys::Function,
    ) -> JsValue {
        let storage = self.storage.snapshot();
        let rules = network_candidates(&storage, &candidates);
        let result = MatchingResult::from_candidates(rules, Vec::new());

        let ctx = RequestContext::new(url, referrer, RequestType::from_browser_type(request_type), tab_id, event_id);
        let redirects = JsRedirectResolver(redirect_resolver);
        let tabs = move |_tab: i32| is_popup_tab;
        let log = ConsoleFilteringLog;
        let matcher = Matcher::new(&redirects, &tabs, &log);

        let action = matcher.decide(result.basic_result(), &ctx);

        let js_result = js_sys::Object::new();
        let name = match &action {
            Action::Redirect(_) => "redirect".to_string(),
            other => other.to_string(),
        };
        let _ = js_sys::Reflect::set(&js_result, &"action".into(), &JsValue::from_str(&name));
        if let Action::Redirect(redirect_url) = &action {
            let _ = js_sys::Reflect::set(&js_result, &"redirectUrl".into(), &JsValue::from_str(redirect_url));
        }
        if let Some(rule) = result.basic_result() {
            let _ = js_sys::Reflect::set(&js_result, &"listId".into(), &JsValue::from(rule.id.filter_list_id));
            let _ = js_sys::Reflect::set(&js_result, &"ruleId".into(), &JsValue::from(rule.id.index));
        }
        js_result.into()
    }

    /// Scripts for the cosmetic rules in `candidates` (`[listId, ruleKey]`
    /// pairs) on the page at `url`.
    pub fn scripts(
        &self,
        candidates: JsValue,
        url: &str,
        verbose: bool,
        scriptlet_resolver: &js_sys::Function,
    ) -> Result<JsValue, JsValue> {
        let storage = self.storage.snapshot();
        let request = ScriptRequest::from_url(url).ok_or_else(|| JsValue::from_str("URL has no host"))?;

        let resolver = JsScriptletResolver(scriptlet_resolver);
        let materializer = ScriptMaterializer::new(&self.scripts, &resolver, &self.config.engine, &self.config.version);
        let mut result = CosmeticScriptsResult::new(&materializer);

        for (list_id, key) in rule_keys(&candidates) {
            if let Some(rule) = storage.retrieve_cosmetic_rule(list_id, key) {
                if rule.marker.is_js() && !rule.is_allowlist() {
                    result.append(rule, Some(&request));
                }
            }
        }

        let generic = js_sys::Array::new();
        let specific = js_sys::Array::new();
        for (target, entries) in [(&generic, result.generic()), (&specific, result.specific())] {
            for entry in entries {
                let script = if verbose {
                    &entry.script.script_verbose
                } else {
                    &entry.script.script
                };
                target.push(&JsValue::from_str(script));
            }
        }

        let js_result = js_sys::Object::new();
        let _ = js_sys::Reflect::set(&js_result, &"generic".into(), &generic);
        let _ = js_sys::Reflect::set(&js_result, &"specific".into(), &specific);
        Ok(js_result.into())
    }
}

fn rule_keys(candidates: &JsValue) -> Vec<(u32, u32)> {
    js_sys::Array::from(candidates)
        .iter()
        .filter_map(|pair| {
            let pair = js_sys::Array::from(&pair);
            Some((to_key(pair.get(0).as_f64()?)?, to_key(pair.get(1).as_f64()?)?))
        })
        .collect()
}

/// A host number usable as a list id or rule key: a finite, non-negative
/// integer within `u32`.
fn to_key(value: f64) -> Option<u32> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= f64::from(u32::MAX) {
        Some(value as u32)
    } else {
        None
    }
}



fn network_candidates<'a>(storage: &'a RuleStorage, candidates: &JsValue) -> Vec<&'a NetworkRule> {
    rule_keys(candidates)
        .into_iter()
        .filter_map(|(list_id, key)| storage.retrieve_network_rule(list_id, key))
        .collect()
}
