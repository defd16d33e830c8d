//! sieve filter list compiler
//!
//! This crate turns filter-list text into the rules defined in `sieve-core`:
//! value lists, the modifier registry, cosmetic and network rule grammars,
//! validation and (optionally parallel) list loading.

pub mod cosmetic;
pub mod factory;
pub mod list;
pub mod loader;
pub mod modifiers;
pub mod network;
pub mod syntax;
pub mod validator;

pub use cosmetic::{
    parse_cosmetic_rule, parse_rule_modifiers, parse_rule_pattern, parse_rule_pattern_text,
    parse_rule_text_by_marker, ParsedPattern,
};
pub use factory::{is_comment, RuleFactory};
pub use list::{parse_list, ListItem, Separator};
pub use loader::{load_list, load_storage, LineError, ListLoader};
pub use modifiers::{ModifierKind, ModifierMap};
pub use network::parse_network_rule;
pub use syntax::{is_rule_for_domain, is_rule_for_url};
pub use validator::{RuleValidator, ValidationResult};
