//! sieve core library
//!
//! Rule model and runtime half of the sieve content filter. The compiler crate
//! turns filter-list text into the rules defined here; this crate stores them
//! and decides what happens to each request.
//!
//! # Architecture
//!
//! Rules are parsed once at load time into immutable values and kept in a
//! [`RuleStorage`] keyed by `(filter list id, rule key)`. An external index
//! narrows a request down to candidate rules; [`MatchingResult`] applies
//! precedence to them and [`Matcher`] turns the winner into an [`Action`].
//! Cosmetic JS rules go through [`CosmeticScriptsResult`], which materializes
//! their scripts lazily and memoizes them outside the rules.
//!
//! # Modules
//!
//! - `error`: Located syntax errors shared by every parser
//! - `types`: Request/option bitsets, request context and actions
//! - `rule`: Network and cosmetic rule representations
//! - `storage`: Rule cache, filter lists and swappable storage
//! - `scriptlet`: Scriptlet call parser
//! - `matcher`: Decision engine and candidate precedence
//! - `cosmetic`: Cosmetic script aggregation
//! - `config`: Engine configuration
//! - `url` / `psl`: Host and registrable-domain helpers

pub mod config;
pub mod cosmetic;
pub mod error;
pub mod matcher;
pub mod psl;
pub mod rule;
pub mod scriptlet;
pub mod storage;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use config::{ConfigError, DuplicateModifierPolicy, EngineConfig};
pub use cosmetic::{CosmeticScriptsResult, ScriptCache, ScriptMaterializer, ScriptletInvocation, ScriptletResolver};
pub use error::{Span, SyntaxError, SyntaxErrorKind, SyntaxResult};
pub use matcher::{FilteringLog, Matcher, MatchingResult, RedirectResolver, TabRegistry};
pub use rule::{CosmeticMarker, CosmeticRule, NetworkRule, Rule, RuleId};
pub use scriptlet::{parse_scriptlet_call, ScriptletSpec};
pub use storage::{FilterList, ListCache, RuleStorage, SharedStorage};
pub use types::{Action, ContentType, NetworkRuleOption, RequestContext, RequestType};
