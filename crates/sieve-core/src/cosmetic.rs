//! Cosmetic script aggregation
//!
//! Splits the JS cosmetic rules matched for a page into generic and
//! site-specific buckets, and materializes the script text of each rule on
//! first use. Scriptlet rules are resolved through an external
//! [`ScriptletResolver`]; the resulting text is memoized in a [`ScriptCache`]
//! keyed by rule identity, so the rules themselves stay immutable.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::SyntaxResult;
use crate::rule::{CosmeticRule, RuleId};
use crate::scriptlet::parse_scriptlet_call;
use crate::url::extract_host;

// =============================================================================
// Scriptlet Resolver
// =============================================================================

/// Everything the resolver needs to produce the code of one scriptlet call.
#[derive(Debug, Clone, Copy)]
pub struct ScriptletInvocation<'a> {
    pub name: &'a str,
    pub args: &'a [String],
    pub engine: &'a str,
    pub version: &'a str,
    pub rule_text: &'a str,
    pub verbose: bool,
    pub domain_name: Option<&'a str>,
}

/// Turns a scriptlet call into executable text.
pub trait ScriptletResolver {
    fn invoke(&self, invocation: &ScriptletInvocation<'_>) -> String;
}

impl<F> ScriptletResolver for F
where
    F: Fn(&ScriptletInvocation<'_>) -> String,
{
    fn invoke(&self, invocation: &ScriptletInvocation<'_>) -> String {
        self(invocation)
    }
}

// =============================================================================
// Script Cache
// =============================================================================

/// Script text of one rule, in both verbosity modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedScript {
    pub script: String,
    pub script_verbose: String,
    /// Domain the verbose variant was annotated with
    pub domain: Option<String>,
}

/// Memo of materialized scripts, shared by every aggregation.
#[derive(Debug, Default)]
pub struct ScriptCache {
    entries: RwLock<HashMap<RuleId, Arc<MaterializedScript>>>,
}

impl ScriptCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: RuleId) -> Option<Arc<MaterializedScript>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&id).cloned()
    }

    pub fn insert(&self, id: RuleId, script: Arc<MaterializedScript>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(id, script);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry, e.g. after the rule storage was replaced.
    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

// =============================================================================
// Materializer
// =============================================================================

/// Page the scripts are collected for.
#[derive(Debug, Clone, Copy)]
pub struct ScriptRequest<'a> {
    pub url: &'a str,
    pub domain: &'a str,
}

impl<'a> ScriptRequest<'a> {
    pub fn from_url(url: &'a str) -> Option<Self> {
        let domain = extract_host(url).filter(|host| !host.is_empty())?;
        Some(Self { url, domain })
    }
}

/// Produces and memoizes rule scripts.
pub struct ScriptMaterializer<'a> {
    cache: &'a ScriptCache,
    resolver: &'a dyn ScriptletResolver,
    engine: &'a str,
    version: &'a str,
}

impl<'a> ScriptMaterializer<'a> {
    pub fn new(cache: &'a ScriptCache, resolver: &'a dyn ScriptletResolver, engine: &'a str, version: &'a str) -> Self {
        Self {
            cache,
            resolver,
            engine,
            version,
        }
    }

    /// Script text for `rule`, computed on first use.
    ///
    /// A cached entry is reused unless the rule is a scriptlet and the
    /// request's domain differs from the one its verbose variant was built
    /// for; both variants are then rebuilt together.
    pub fn materialize_script(
        &self,
        rule: &CosmeticRule,
        request: Option<&ScriptRequest<'_>>,
    ) -> SyntaxResult<Arc<MaterializedScript>> {
        let call = match rule.scriptlet_call() {
            Some(call) => call,
            None => return Ok(self.raw_script(rule)),
        };

        let domain = request.map(|r| r.domain);
        if let Some(cached) = self.cache.get(rule.id) {
            if domain.is_none() || cached.domain.as_deref() == domain {
                return Ok(cached);
            }
        }

        let spec = parse_scriptlet_call(call)?;
        let mut invocation = ScriptletInvocation {
            name: &spec.name,
            args: &spec.args,
            engine: self.engine,
            version: self.version,
            rule_text: &rule.text,
            verbose: false,
            domain_name: None,
        };
        let script = self.resolver.invoke(&invocation);

        invocation.verbose = true;
        invocation.domain_name = domain;
        let script_verbose = self.resolver.invoke(&invocation);

        log::debug!("Materialized scriptlet '{}' for rule {}", spec.name, rule.id);

        let materialized = Arc::new(MaterializedScript {
            script,
            script_verbose,
            domain: domain.map(str::to_string),
        });
        self.cache.insert(rule.id, Arc::clone(&materialized));
        Ok(materialized)
    }

    fn raw_script(&self, rule: &CosmeticRule) -> Arc<MaterializedScript> {
        if let Some(cached) = self.cache.get(rule.id) {
            return cached;
        }
        let materialized = Arc::new(MaterializedScript {
            script: rule.content.clone(),
            script_verbose: rule.content.clone(),
            domain: None,
        });
        self.cache.insert(rule.id, Arc::clone(&materialized));
        materialized
    }
}

// =============================================================================
// Cosmetic Scripts Result
// =============================================================================

/// A rule together with its script.
#[derive(Debug, Clone)]
pub struct ScriptEntry<'a> {
    pub rule: &'a CosmeticRule,
    pub script: Arc<MaterializedScript>,
}

/// JS rules matched for one page, split into generic and specific.
pub struct CosmeticScriptsResult<'a> {
    materializer: &'a ScriptMaterializer<'a>,
    generic: Vec<ScriptEntry<'a>>,
    specific: Vec<ScriptEntry<'a>>,
    seen: HashSet<RuleId>,
}

impl<'a> CosmeticScriptsResult<'a> {
    pub fn new(materializer: &'a ScriptMaterializer<'a>) -> Self {
        Self {
            materializer,
            generic: Vec::new(),
            specific: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Materialize the rule's script and add it to its bucket. A rule already
    /// in this result is ignored.
    pub fn append(&mut self, rule: &'a CosmeticRule, request: Option<&ScriptRequest<'_>>) {
        if self.seen.contains(&rule.id) {
            return;
        }

        let script = match self.materializer.materialize_script(rule, request) {
            Ok(script) => script,
            Err(e) => {
                log::warn!("Skipping rule {} '{}': {}", rule.id, rule.text, e);
                return;
            }
        };

        self.seen.insert(rule.id);
        let entry = ScriptEntry { rule, script };
        if rule.is_generic() {
            self.generic.push(entry);
        } else {
            self.specific.push(entry);
        }
    }

    pub fn generic(&self) -> &[ScriptEntry<'a>] {
        &self.generic
    }

    pub fn specific(&self) -> &[ScriptEntry<'a>] {
        &self.specific
    }

    /// Generic rules first, then specific ones.
    pub fn rules(&self) -> Vec<&'a CosmeticRule> {
        self.entries().map(|entry| entry.rule).collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ScriptEntry<'a>> {
        self.generic.iter().chain(self.specific.iter())
    }

    /// Script texts in rule order.
    pub fn scripts(&self, verbose: bool) -> Vec<&str> {
        self.entries()
            .map(|entry| {
                if verbose {
                    entry.script.script_verbose.as_str()
                } else {
                    entry.script.script.as_str()
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.generic.len() + self.specific.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
