//! Scriptlet call parser
//!
//! Extracts the scriptlet name and its quoted arguments from the call part of
//! a scriptlet rule, e.g. `('set-constant', 'ads', 'false')`.
//!
//! The scan is a three-state machine driven one character at a time:
//!
//! - `Opened`: between tokens. Spaces, `(` and `,` are skipped, a quote opens
//!   an argument, `)` closes the call only when it is the final character.
//! - `Param`: inside a quoted argument. The opening quote, unless preceded by
//!   a backslash, ends the argument; everything else is kept verbatim.
//! - `Closed`: terminal.

use serde::Serialize;

use crate::error::{Span, SyntaxError, SyntaxErrorKind, SyntaxResult};

/// Parsed scriptlet call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ScriptletSpec {
    pub name: String,
    pub args: Vec<String>,
}

impl ScriptletSpec {
    /// The `()` form, which allowlists every scriptlet.
    pub fn is_allow_all(&self) -> bool {
        self.name.is_empty() && self.args.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Opened,
    Param,
    Closed,
}

#[derive(Debug, Default)]
struct Accumulator {
    current: String,
    collected: Vec<String>,
    quote: Option<char>,
    previous: Option<char>,
}

/// One transition. `None` means the character is not allowed in this state.
fn step(state: State, ch: char, is_last: bool, mut acc: Accumulator) -> Option<(State, Accumulator)> {
    let next = match state {
        State::Opened => match ch {
            ' ' | '(' | ',' => State::Opened,
            '\'' | '"' => {
                acc.quote = Some(ch);
                State::Param
            }
            ')' if is_last => State::Closed,
            ')' => State::Opened,
            _ => return None,
        },
        State::Param => {
            if Some(ch) == acc.quote && acc.previous != Some('\\') {
                acc.quote = None;
                acc.collected.push(std::mem::take(&mut acc.current));
                State::Opened
            } else {
                acc.current.push(ch);
                State::Param
            }
        }
        State::Closed => return None,
    };

    acc.previous = Some(ch);
    Some((next, acc))
}

/// Parse the call part of a scriptlet rule.
pub fn parse_scriptlet_call(content: &str) -> SyntaxResult<ScriptletSpec> {
    if content == "()" {
        return Ok(ScriptletSpec::default());
    }

    let invalid = |span: Span| SyntaxError::new(SyntaxErrorKind::InvalidScriptlet(content.to_string()), span);

    let mut state = State::Opened;
    let mut acc = Accumulator::default();

    for (pos, ch) in content.char_indices() {
        let is_last = pos + ch.len_utf8() == content.len();
        match step(state, ch, is_last, acc) {
            Some((next, next_acc)) => {
                state = next;
                acc = next_acc;
            }
            None => return Err(invalid(Span::new(pos, pos + ch.len_utf8()))),
        }
    }

    if state != State::Closed {
        return Err(invalid(Span::new(0, content.len())));
    }

    let mut tokens = acc.collected.into_iter();
    match tokens.next() {
        Some(name) if !name.is_empty() => Ok(ScriptletSpec {
            name,
            args: tokens.collect(),
        }),
        _ => Err(SyntaxError::new(
            SyntaxErrorKind::MissingScriptletName(content.to_string()),
            Span::new(0, content.len()),
        )),
    }
}
