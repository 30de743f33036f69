// peggen. A PEG parser compiler
// Copyright (c) 2024 peggen contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! # peggen_vm
//!
//! Reference interpreter for [`CompiledGrammar`] plans: the executable
//! embodiment of the runtime contract backends must reproduce. It walks the
//! compiled matcher sequences directly, driving a [`ParserState`] over a
//! caller-supplied token sequence — the concrete tokenizer stays with the
//! host, exactly as it does for generated parsers.
//!
//! Grammar actions stay opaque: an optional [`action handler`](Vm::with_actions)
//! receives the action's expression text and the alternative's bound values
//! and builds whatever result it likes; without a handler, custom actions
//! degrade to the default sequence result.

use log::trace;

use peggen::{ParseOutcome, ParseResult, ParserState, RuleId, SyntaxError, Token, TokenKind};
use peggen_meta::compiler::{ActionPlan, CompiledAlternative, CompiledGrammar, Matcher};

mod macros;
pub mod value;

pub use crate::value::{BoundValue, Value};

/// Evaluates a custom grammar action from its opaque expression text and the
/// alternative's bound values.
pub type ActionHandler = Box<dyn Fn(&str, &[BoundValue]) -> Value>;

/// How one alternative trial ended: a result, or a failure that may have
/// passed a `~` and thus commits the enclosing choice.
enum AltOutcome {
    Matched(Value),
    Failed { committed: bool },
}

pub struct Vm {
    grammar: CompiledGrammar,
    actions: Option<ActionHandler>,
}

impl Vm {
    pub fn new(grammar: CompiledGrammar) -> Vm {
        Vm {
            grammar,
            actions: None,
        }
    }

    /// Installs the handler custom actions are dispatched to.
    pub fn with_actions(mut self, handler: impl Fn(&str, &[BoundValue]) -> Value + 'static) -> Vm {
        self.actions = Some(Box::new(handler));
        self
    }

    pub fn grammar(&self) -> &CompiledGrammar {
        &self.grammar
    }

    /// Parses `tokens` from the named rule with a fresh parser state, hence
    /// a fresh memo table: caches never outlive one parse of one input.
    pub fn parse(&self, rule: &str, tokens: &[Token]) -> ParseResult<Value> {
        let id = match self.grammar.resolve(rule) {
            Some(id) => id,
            None => panic!("undefined rule {}", rule),
        };
        let mut state = ParserState::new(tokens);
        let outcome = self.parse_rule(id, &mut state)?;
        trace!(
            "parse {}: memo {} hits / {} misses",
            rule,
            state.memo().hits(),
            state.memo().misses()
        );
        Ok(outcome)
    }

    fn parse_rule(&self, id: RuleId, state: &mut ParserState<'_, Value>) -> ParseResult<Value> {
        let rule = &self.grammar[id];
        trace!("rule {} at {}", rule.name, state.mark());
        state.rule(id, rule.memoize, rule.leader, |state| {
            self.parse_alternatives(&rule.alternatives, state)
        })
    }

    /// Ordered choice: alternatives are tried in declaration order from the
    /// same start position; the first match wins. A committed failure stops
    /// the trials instead of falling through to the next sibling.
    fn parse_alternatives(
        &self,
        alternatives: &[CompiledAlternative],
        state: &mut ParserState<'_, Value>,
    ) -> ParseResult<Value> {
        let start = state.mark();
        for alternative in alternatives {
            state.reset(start);
            match self.parse_alternative(alternative, state)? {
                AltOutcome::Matched(value) => {
                    return Ok(ParseOutcome::Matched(value, state.mark()));
                }
                AltOutcome::Failed { committed: true } => break,
                AltOutcome::Failed { committed: false } => {}
            }
        }
        state.reset(start);
        Ok(ParseOutcome::NotMatched)
    }

    fn parse_alternative(
        &self,
        alternative: &CompiledAlternative,
        state: &mut ParserState<'_, Value>,
    ) -> Result<AltOutcome, SyntaxError> {
        let mut committed = false;
        let mut values: Vec<BoundValue> = Vec::new();

        for bound in &alternative.matchers {
            if let Matcher::Cut = bound.matcher {
                committed = true;
                continue;
            }
            match self.parse_matcher(&bound.matcher, state)? {
                ParseOutcome::Matched(value, _) => {
                    if bound.matcher.produces_value() {
                        values.push(BoundValue {
                            name: bound.binding.clone(),
                            value,
                        });
                    }
                }
                ParseOutcome::NotMatched => return Ok(AltOutcome::Failed { committed }),
            }
        }

        Ok(AltOutcome::Matched(self.action_value(
            &alternative.action,
            values,
        )))
    }

    fn parse_matcher(
        &self,
        matcher: &Matcher,
        state: &mut ParserState<'_, Value>,
    ) -> ParseResult<Value> {
        match matcher {
            Matcher::Exact(text) => Ok(take_if(state, |token| {
                matches!(token.kind, TokenKind::Name | TokenKind::Op) && token.text == *text
            })),
            Matcher::SoftKeyword(text) => Ok(take_if(state, |token| {
                token.kind == TokenKind::Name && token.text == *text
            })),
            Matcher::Token(kind) => Ok(take_if(state, |token| {
                token.kind == *kind
                    && !(*kind == TokenKind::Name && self.grammar.is_hard_keyword(&token.text))
            })),
            Matcher::Rule(id) => self.parse_rule(*id, state),
            Matcher::Group(alternatives) => self.parse_alternatives(alternatives, state),
            Matcher::Opt(inner) => {
                let start = state.mark();
                match self.parse_matcher(inner, state)? {
                    matched @ ParseOutcome::Matched(..) => Ok(matched),
                    ParseOutcome::NotMatched => {
                        state.reset(start);
                        Ok(ParseOutcome::Matched(Value::Empty, start))
                    }
                }
            }
            Matcher::Repeat0(inner) => self.parse_repeat(inner, false, state),
            Matcher::Repeat1(inner) => self.parse_repeat(inner, true, state),
            Matcher::Gather { sep, elem } => self.parse_gather(sep, elem, state),
            Matcher::Lookahead { positive, inner } => {
                let start = state.mark();
                let matched = self.parse_matcher(inner, state)?.is_matched();
                state.reset(start);
                if matched == *positive {
                    Ok(ParseOutcome::Matched(Value::Empty, start))
                } else {
                    Ok(ParseOutcome::NotMatched)
                }
            }
            Matcher::Cut => Ok(ParseOutcome::Matched(Value::Empty, state.mark())),
            Matcher::Forced { inner, expected } => match self.parse_matcher(inner, state)? {
                matched @ ParseOutcome::Matched(..) => Ok(matched),
                ParseOutcome::NotMatched => Err(SyntaxError::new(state.mark(), expected.clone())),
            },
        }
    }

    fn parse_repeat(
        &self,
        inner: &Matcher,
        at_least_one: bool,
        state: &mut ParserState<'_, Value>,
    ) -> ParseResult<Value> {
        let start = state.mark();
        let mut values = Vec::new();

        loop {
            let mark = state.mark();
            match self.parse_matcher(inner, state)? {
                ParseOutcome::Matched(value, end) => {
                    values.push(value);
                    // A zero-width inner match would repeat forever.
                    if end == mark {
                        break;
                    }
                }
                ParseOutcome::NotMatched => {
                    state.reset(mark);
                    break;
                }
            }
        }

        if at_least_one && values.is_empty() {
            state.reset(start);
            return Ok(ParseOutcome::NotMatched);
        }
        Ok(ParseOutcome::Matched(Value::Seq(values), state.mark()))
    }

    /// `sep.elem+`: keeps only the element results; separators are matched
    /// and discarded. A separator without a following element is left
    /// unconsumed.
    fn parse_gather(
        &self,
        sep: &Matcher,
        elem: &Matcher,
        state: &mut ParserState<'_, Value>,
    ) -> ParseResult<Value> {
        let start = state.mark();
        let first = match self.parse_matcher(elem, state)? {
            ParseOutcome::Matched(value, _) => value,
            ParseOutcome::NotMatched => {
                state.reset(start);
                return Ok(ParseOutcome::NotMatched);
            }
        };

        let mut values = vec![first];
        loop {
            let mark = state.mark();
            if !self.parse_matcher(sep, state)?.is_matched() {
                state.reset(mark);
                break;
            }
            match self.parse_matcher(elem, state)? {
                ParseOutcome::Matched(value, _) => values.push(value),
                ParseOutcome::NotMatched => {
                    state.reset(mark);
                    break;
                }
            }
        }
        Ok(ParseOutcome::Matched(Value::Seq(values), state.mark()))
    }

    fn action_value(&self, plan: &ActionPlan, values: Vec<BoundValue>) -> Value {
        match plan {
            ActionPlan::Custom(expr) => match &self.actions {
                Some(handler) => handler(expr, &values),
                None => sequence_value(values),
            },
            ActionPlan::SingleItem => values
                .into_iter()
                .next()
                .map(|bound| bound.value)
                .unwrap_or(Value::Empty),
            ActionPlan::Sequence => sequence_value(values),
        }
    }
}

fn sequence_value(values: Vec<BoundValue>) -> Value {
    Value::Seq(values.into_iter().map(|bound| bound.value).collect())
}

fn take_if<F>(state: &mut ParserState<'_, Value>, pred: F) -> ParseOutcome<Value>
where
    F: Fn(&Token) -> bool,
{
    match state.peek() {
        Some(token) if pred(token) => {
            let token = token.clone();
            state.next_token();
            ParseOutcome::Matched(Value::Token(token), state.mark())
        }
        _ => ParseOutcome::NotMatched,
    }
}
