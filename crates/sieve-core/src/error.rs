//! Syntax error catalogue shared by every rule parser.
//!
//! All parsers report failures as a [`SyntaxError`]: a fixed message from
//! [`SyntaxErrorKind`] plus the byte range of the offending input. Spans are
//! half-open (`start..end`) byte offsets into the string the caller handed to
//! the outermost parser, so nested parsers shift their spans by the offset of
//! the fragment they were given.

use std::fmt;

/// Half-open byte range into the parsed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Single-byte span at `offset`.
    pub const fn point(offset: usize) -> Self {
        Self { start: offset, end: offset + 1 }
    }

    /// Move the span right by `base` bytes.
    pub const fn shift(self, base: usize) -> Self {
        Self {
            start: self.start + base,
            end: self.end + base,
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Every way rule text can be rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyntaxErrorKind {
    // List values
    #[error("Empty value specified in the list")]
    EmptyItem,
    #[error("Exception marker cannot be followed by another exception marker")]
    MultipleNegation,
    #[error("Exception marker cannot be followed by a separator")]
    SeparatorAfterNegation,
    #[error("Exception marker cannot be followed by whitespace")]
    WhitespaceAfterNegation,
    #[error("Value list cannot end with a separator")]
    SeparatorAtEnd,

    // Cosmetic rule layout
    #[error("Not a cosmetic rule")]
    NotCosmetic,
    #[error("Rule content is empty")]
    EmptyContent,
    #[error("Can't parse modifiers list")]
    UnterminatedModifiers,
    #[error("Modifiers list can't be empty")]
    EmptyModifiers,

    // Modifiers
    #[error("Modifier must have assigned value")]
    ModifierValueRequired(String),
    #[error("'{0}' modifier does not accept a value")]
    ModifierValueForbidden(String),
    #[error("'{0}' is not valid modifier")]
    UnknownModifier(String),
    #[error("'{0}' modifier is not allowed in this rule")]
    ModifierNotPermitted(String),
    #[error("'{0}' modifier cannot be negated")]
    NegatedModifier(String),
    #[error("'{0}' modifier is specified more than once")]
    DuplicateModifier(String),
    #[error("The $domain modifier is not allowed in a domain-specific rule")]
    DomainModifierConflict,

    // Scriptlets
    #[error("Invalid scriptlet {0}")]
    InvalidScriptlet(String),
    #[error("Scriptlet name is missing in {0}")]
    MissingScriptletName(String),

    // Network rules
    #[error("Network rule pattern is empty")]
    EmptyPattern,
}

/// A located syntax error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}")]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    pub span: Span,
}

impl SyntaxError {
    pub fn new(kind: SyntaxErrorKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn at(kind: SyntaxErrorKind, start: usize, end: usize) -> Self {
        Self::new(kind, Span::new(start, end))
    }

    /// Re-anchor an error produced on a fragment that starts at `base`.
    pub fn shifted(self, base: usize) -> Self {
        Self {
            kind: self.kind,
            span: self.span.shift(base),
        }
    }
}

pub type SyntaxResult<T> = Result<T, SyntaxError>;
