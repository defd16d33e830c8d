//! Filter list loader
//!
//! Turns list text into a [`FilterList`]. The key of each rule is its
//! zero-based line number, so keys are monotonic and survive reloads of
//! unchanged text. Loading can be driven in chunks of `loader.chunk_size`
//! lines ([`ListLoader::step`]) to yield to a cooperative scheduler; the
//! result is the same as a single [`ListLoader::load_all`] pass.

use std::iter::{Enumerate, Peekable};
use std::str::Lines;

use sieve_core::config::EngineConfig;
use sieve_core::error::Span;
use sieve_core::storage::{FilterList, RuleStorage};

use crate::factory::RuleFactory;

/// A line that was skipped because it failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct LineError {
    /// Zero-based line number (also the rule key it would have had)
    pub line: u32,
    /// Location inside the line
    pub span: Span,
    pub message: String,
}

/// Incremental loader for one filter list.
pub struct ListLoader<'a> {
    list: FilterList,
    lines: Peekable<Enumerate<Lines<'a>>>,
    factory: RuleFactory,
    chunk_size: usize,
    errors: Vec<LineError>,
}

impl<'a> ListLoader<'a> {
    pub fn new(filter_list_id: u32, text: &'a str, config: &EngineConfig) -> Self {
        Self {
            list: FilterList::new(filter_list_id),
            lines: text.lines().enumerate().peekable(),
            factory: RuleFactory::new(&config.parser),
            chunk_size: config.loader.chunk_size.max(1),
            errors: Vec::new(),
        }
    }

    /// Parse the next chunk. Returns `false` once every line is consumed.
    pub fn step(&mut self) -> bool {
        for _ in 0..self.chunk_size {
            let Some((line_no, text)) = self.lines.next() else {
                break;
            };
            self.load_line(line_no, text);
        }
        self.lines.peek().is_some()
    }

    /// Parse everything that is left.
    pub fn load_all(mut self) -> (FilterList, Vec<LineError>) {
        while self.step() {}
        self.finish()
    }

    /// Rules and errors gathered so far.
    pub fn finish(self) -> (FilterList, Vec<LineError>) {
        log::info!(
            "Loaded filter list {}: {} rules, {} invalid lines",
            self.list.id(),
            self.list.len(),
            self.errors.len()
        );
        (self.list, self.errors)
    }

    fn load_line(&mut self, line_no: usize, text: &str) {
        let Ok(key) = u32::try_from(line_no) else {
            log::warn!("Filter list {} exceeds the rule key range", self.list.id());
            return;
        };

        match self.factory.create_rule(text, self.list.id(), key) {
            Ok(Some(rule)) => self.list.insert(rule),
            Ok(None) => {}
            Err(e) => {
                log::warn!("Skipping rule at {}:{}: {e}", self.list.id(), key);
                self.errors.push(LineError {
                    line: key,
                    span: e.span,
                    message: e.to_string(),
                });
            }
        }
    }
}

/// Load one list in a single pass.
pub fn load_list(filter_list_id: u32, text: &str, config: &EngineConfig) -> (FilterList, Vec<LineError>) {
    ListLoader::new(filter_list_id, text, config).load_all()
}

/// Build a storage from `(list id, text)` pairs. Errors are tagged with
/// their list id.
pub fn load_storage(lists: &[(u32, &str)], config: &EngineConfig) -> (RuleStorage, Vec<(u32, LineError)>) {
    #[cfg(feature = "parallel")]
    let loaded: Vec<(FilterList, Vec<LineError>)> = {
        use rayon::prelude::*;
        lists
            .par_iter()
            .map(|&(id, text)| load_list(id, text, config))
            .collect()
    };

    #[cfg(not(feature = "parallel"))]
    let loaded: Vec<(FilterList, Vec<LineError>)> = lists
        .iter()
        .map(|&(id, text)| load_list(id, text, config))
        .collect();

    let mut storage = RuleStorage::new();
    let mut errors = Vec::new();
    for (list, list_errors) in loaded {
        let id = list.id();
        errors.extend(list_errors.into_iter().map(|e| (id, e)));
        storage.add_list(list);
    }
    (storage, errors)
}
