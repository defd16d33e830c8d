//! Rule storage keyed by `(filter list id, rule key)`.
//!
//! Each [`FilterList`] is the arena that owns its rules; the key of a rule is
//! assigned by the loader (its line number) and stays stable for the lifetime
//! of the loaded list. Storage is built once, then only read. Reloading builds
//! a fresh [`RuleStorage`] and swaps it into a [`SharedStorage`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use crate::rule::{CosmeticRule, NetworkRule, Rule};

// =============================================================================
// List Cache
// =============================================================================

/// Memoizing map from rule key to the shared rule.
#[derive(Debug, Default, Clone)]
pub struct ListCache {
    rules: HashMap<u32, Arc<Rule>>,
}

impl ListCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: u32) -> Option<&Arc<Rule>> {
        self.rules.get(&key)
    }

    /// Store `rule` under `key`, replacing any previous rule for that key.
    pub fn set(&mut self, key: u32, rule: Arc<Rule>) {
        self.rules.insert(key, rule);
    }

    /// Number of distinct keys stored.
    pub fn size(&self) -> usize {
        self.rules.len()
    }
}

// =============================================================================
// Filter List
// =============================================================================

/// Rules loaded from one filter list, in load order.
#[derive(Debug, Clone)]
pub struct FilterList {
    id: u32,
    rules: Vec<Arc<Rule>>,
    cache: ListCache,
}

impl FilterList {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            rules: Vec::new(),
            cache: ListCache::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Add a rule under its own key. A rule with an existing key replaces the
    /// old one in place.
    pub fn insert(&mut self, rule: Rule) {
        let key = rule.id().index;
        let rule = Arc::new(rule);

        match self.cache.get(key) {
            Some(_) => {
                if let Some(slot) = self.rules.iter_mut().find(|r| r.id().index == key) {
                    *slot = Arc::clone(&rule);
                }
            }
            None => self.rules.push(Arc::clone(&rule)),
        }

        self.cache.set(key, rule);
    }

    pub fn get(&self, key: u32) -> Option<&Arc<Rule>> {
        self.cache.get(key)
    }

    pub fn len(&self) -> usize {
        self.cache.size()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.iter()
    }
}

// =============================================================================
// Rule Storage
// =============================================================================

/// All loaded filter lists.
#[derive(Debug, Default, Clone)]
pub struct RuleStorage {
    lists: BTreeMap<u32, FilterList>,
}

impl RuleStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a whole list.
    pub fn add_list(&mut self, list: FilterList) {
        log::debug!("Storing filter list {} with {} rules", list.id(), list.len());
        self.lists.insert(list.id(), list);
    }

    pub fn list(&self, filter_list_id: u32) -> Option<&FilterList> {
        self.lists.get(&filter_list_id)
    }

    pub fn lists(&self) -> impl Iterator<Item = &FilterList> {
        self.lists.values()
    }

    pub fn retrieve_rule(&self, filter_list_id: u32, key: u32) -> Option<&Arc<Rule>> {
        self.lists.get(&filter_list_id)?.get(key)
    }

    pub fn retrieve_network_rule(&self, filter_list_id: u32, key: u32) -> Option<&NetworkRule> {
        self.retrieve_rule(filter_list_id, key)?.as_network()
    }

    pub fn retrieve_cosmetic_rule(&self, filter_list_id: u32, key: u32) -> Option<&CosmeticRule> {
        self.retrieve_rule(filter_list_id, key)?.as_cosmetic()
    }

    pub fn rules_count(&self) -> usize {
        self.lists.values().map(FilterList::len).sum()
    }

    /// Every rule, list by list in id order.
    pub fn rules(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.lists.values().flat_map(FilterList::rules)
    }

    pub fn network_rules(&self) -> impl Iterator<Item = &NetworkRule> {
        self.rules().filter_map(|rule| rule.as_network())
    }

    pub fn cosmetic_rules(&self) -> impl Iterator<Item = &CosmeticRule> {
        self.rules().filter_map(|rule| rule.as_cosmetic())
    }
}

// =============================================================================
// Shared Storage
// =============================================================================

/// Live storage handle. Readers take a snapshot; reloads swap the whole value.
#[derive(Debug, Default)]
pub struct SharedStorage {
    current: RwLock<Arc<RuleStorage>>,
}

impl SharedStorage {
    pub fn new(storage: RuleStorage) -> Self {
        Self {
            current: RwLock::new(Arc::new(storage)),
        }
    }

    /// Storage as of now. Later swaps do not affect the returned value.
    pub fn snapshot(&self) -> Arc<RuleStorage> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Install `storage` and return the one it replaced.
    pub fn replace(&self, storage: RuleStorage) -> Arc<RuleStorage> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        log::info!("Swapping rule storage ({} rules)", storage.rules_count());
        std::mem::replace(&mut *guard, Arc::new(storage))
    }
}
