//! Rule validator
//!
//! Batch-validation entry point. Parse failures are turned into a
//! [`ValidationResult`] instead of being returned as errors.

use sieve_core::config::ParserConfig;

use crate::factory::{is_comment, RuleFactory};

/// Outcome of validating one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub result: bool,
    pub error: Option<String>,
}

impl ValidationResult {
    fn valid() -> Self {
        Self { result: true, error: None }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self {
            result: false,
            error: Some(message.into()),
        }
    }
}

pub struct RuleValidator;

impl RuleValidator {
    /// Validate with the default parser configuration.
    pub fn validate(raw: &str) -> ValidationResult {
        Self::validate_with(raw, &ParserConfig::default())
    }

    pub fn validate_with(raw: &str, config: &ParserConfig) -> ValidationResult {
        let rule = raw.trim();

        if rule.len() < config.min_rule_length {
            return ValidationResult::invalid(format!("Rule is too short: {rule}"));
        }

        if is_comment(rule) {
            return ValidationResult::valid();
        }

        match RuleFactory::new(config).create_rule(rule, 0, 0) {
            Ok(_) => ValidationResult::valid(),
            Err(e) => {
                log::debug!("Invalid rule {rule:?} at {}: {e}", e.span);
                ValidationResult::invalid(e.to_string())
            }
        }
    }
}
