//! Stand-ins for the host runtime: redirect surrogates, scriptlet code and
//! the filtering log.

use serde_json::json;

use sieve_core::cosmetic::ScriptletInvocation;
use sieve_core::matcher::{FilteringEvent, FilteringLog};

/// Path of the surrogate resource named by a `$redirect` value.
pub fn redirect_resource_path(name: &str) -> String {
    if name.starts_with('/') || name.starts_with("data:") || name.contains("://") {
        return name.to_string();
    }
    if name == "noopjs" {
        return "/redirects/noop.js".to_string();
    }
    if name.starts_with("redirects/") {
        return format!("/{name}");
    }
    format!("/redirects/{name}")
}

pub fn create_redirect_url(value: Option<&str>, _request_url: &str) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(redirect_resource_path)
}

/// Wraps a scriptlet call into a self-contained snippet.
pub fn scriptlet_code(invocation: &ScriptletInvocation<'_>) -> String {
    let name = json!(invocation.name);
    let args = json!(invocation.args);
    let call = format!("try {{ window.scriptlets[{name}].apply(null, {args}); }} catch (e) {{ console.error(e); }}");

    if !invocation.verbose {
        return format!("(function () {{ {call} }})();");
    }

    let source = json!({
        "engine": invocation.engine,
        "version": invocation.version,
        "ruleText": invocation.rule_text,
        "domainName": invocation.domain_name,
    });
    format!("(function () {{ console.log('[sieve] scriptlet', {source}); {call} }})();")
}

/// Prints filtering events as JSON lines on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFilteringLog;

impl FilteringLog for JsonFilteringLog {
    fn publish_event(&self, event: &FilteringEvent<'_>) {
        let line = json!({
            "tabId": event.tab_id,
            "eventId": event.event_id,
            "requestUrl": event.request_url,
            "frameUrl": event.frame_url,
            "contentType": event.content_type,
            "action": event.action,
            "rule": {
                "filterListId": event.rule.id.filter_list_id,
                "ruleIndex": event.rule.id.index,
                "text": event.rule.text,
            },
        });
        eprintln!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_paths() {
        assert_eq!(redirect_resource_path("noopjs"), "/redirects/noop.js");
        assert_eq!(redirect_resource_path("1x1.gif"), "/redirects/1x1.gif");
        assert_eq!(redirect_resource_path("redirects/x.js"), "/redirects/x.js");
        assert_eq!(redirect_resource_path("https://cdn/x.js"), "https://cdn/x.js");
        assert_eq!(create_redirect_url(Some(""), "https://a.com/"), None);
        assert_eq!(create_redirect_url(None, "https://a.com/"), None);
    }

    #[test]
    fn test_scriptlet_code() {
        let args = vec!["ads".to_string(), "it's".to_string()];
        let mut invocation = ScriptletInvocation {
            name: "set-constant",
            args: &args,
            engine: "extension",
            version: "0.2.0",
            rule_text: "example.org#%#//scriptlet('set-constant', 'ads', \"it's\")",
            verbose: false,
            domain_name: None,
        };
        let code = scriptlet_code(&invocation);
        assert!(code.contains(r#"window.scriptlets["set-constant"].apply(null, ["ads","it's"])"#));
        assert!(!code.contains("console.log"));

        invocation.verbose = true;
        invocation.domain_name = Some("example.org");
        let code = scriptlet_code(&invocation);
        assert!(code.contains(r#""domainName":"example.org""#));
    }
}
