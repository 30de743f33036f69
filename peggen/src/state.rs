// peggen. A PEG parser compiler
// Copyright (c) 2024 peggen contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! The per-parse parsing state and the memoized rule invocation discipline.

use log::{error, trace};

use crate::memo::{MemoEntry, MemoTable, RuleId};
use crate::outcome::{ParseOutcome, ParseResult};
use crate::token::Token;

/// The complete mutable state of one in-progress parse: a cursor over the
/// token sequence and the memo table.
///
/// One `ParserState` serves exactly one parse of one input. Concurrent
/// parses — even of the same compiled grammar — each allocate their own
/// state; nothing here is shared or global.
#[derive(Debug)]
pub struct ParserState<'t, V> {
    tokens: &'t [Token],
    pos: usize,
    memo: MemoTable<V>,
}

impl<'t, V: Clone> ParserState<'t, V> {
    pub fn new(tokens: &'t [Token]) -> ParserState<'t, V> {
        ParserState {
            tokens,
            pos: 0,
            memo: MemoTable::new(),
        }
    }

    /// Current position, for later [`reset`](Self::reset).
    pub fn mark(&self) -> usize {
        self.pos
    }

    /// Rewinds (or fast-forwards) the cursor to a previously marked position.
    pub fn reset(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// The token under the cursor, if any.
    pub fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    /// Consumes and returns the token under the cursor.
    pub fn next_token(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    pub fn tokens(&self) -> &'t [Token] {
        self.tokens
    }

    /// The memo table, for cache statistics.
    pub fn memo(&self) -> &MemoTable<V> {
        &self.memo
    }

    /// Invokes a rule body at the current position under the memoization
    /// contract.
    ///
    /// For memoized rules the table is consulted first and each (rule,
    /// position) pair is evaluated at most once along any non-left-recursive
    /// path. Leader rules additionally run the seed-growing loop, so a
    /// left-recursive body sees its own previous best result — initially the
    /// failure seed — whenever it recurses back to the same position.
    ///
    /// A hard error from the body propagates out unchanged; the cursor and
    /// the table are left as the aborted parse had them.
    pub fn rule<F>(&mut self, rule: RuleId, memoize: bool, leader: bool, mut body: F) -> ParseResult<V>
    where
        F: FnMut(&mut Self) -> ParseResult<V>,
    {
        if leader {
            return self.grow(rule, body);
        }
        if !memoize {
            return body(self);
        }

        let start = self.pos;
        if let Some(outcome) = self.cached(rule, start) {
            return Ok(outcome);
        }

        self.memo.insert(rule, start, MemoEntry::InProgress);
        let result = body(self);
        match &result {
            Ok(ParseOutcome::Matched(value, end)) => {
                self.memo
                    .insert(rule, start, MemoEntry::Matched(value.clone(), *end));
            }
            Ok(ParseOutcome::NotMatched) => {
                self.memo.insert(rule, start, MemoEntry::NotMatched);
                self.pos = start;
            }
            // Hard error: the parse is over and the table dies with it.
            Err(_) => {}
        }
        result
    }

    fn cached(&mut self, rule: RuleId, start: usize) -> Option<ParseOutcome<V>> {
        match self.memo.get(rule, start)? {
            MemoEntry::Matched(value, end) => {
                let (value, end) = (value.clone(), *end);
                self.pos = end;
                Some(ParseOutcome::Matched(value, end))
            }
            MemoEntry::NotMatched => {
                self.pos = start;
                Some(ParseOutcome::NotMatched)
            }
            MemoEntry::InProgress => {
                // Only reachable when a rule re-enters itself at one position
                // without having been classified left-recursive.
                error!("rule {:?} re-entered at {} without a seed", rule, start);
                debug_assert!(false, "unseeded re-entry of rule {:?} at {}", rule, start);
                self.pos = start;
                Some(ParseOutcome::NotMatched)
            }
        }
    }

    /// The seed-growing loop for leader rules.
    ///
    /// Seeds the memo entry with `NotMatched` so the first evaluation finds
    /// the smallest, non-recursive expansion, then re-evaluates the body
    /// while each round strictly advances the end position, keeping the last
    /// grown result. A success that fails to advance past the previous round
    /// (including a zero-width first success) stops the loop.
    fn grow<F>(&mut self, rule: RuleId, mut body: F) -> ParseResult<V>
    where
        F: FnMut(&mut Self) -> ParseResult<V>,
    {
        let start = self.pos;
        if let Some(outcome) = self.cached(rule, start) {
            return Ok(outcome);
        }

        self.memo.insert(rule, start, MemoEntry::NotMatched);
        let mut best: Option<(V, usize)> = None;

        loop {
            self.pos = start;
            let (value, end) = match body(self)? {
                ParseOutcome::Matched(value, end) => (value, end),
                ParseOutcome::NotMatched => break,
            };
            let last_end = best.as_ref().map_or(start, |&(_, end)| end);
            if end <= last_end {
                break;
            }
            trace!("rule {:?} at {}: grew to {}", rule, start, end);
            self.memo
                .insert(rule, start, MemoEntry::Matched(value.clone(), end));
            best = Some((value, end));
        }

        Ok(match best {
            Some((value, end)) => {
                self.pos = end;
                ParseOutcome::Matched(value, end)
            }
            None => {
                self.pos = start;
                ParseOutcome::NotMatched
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyntaxError;
    use crate::token::TokenKind;

    fn take_number(state: &mut ParserState<'_, String>) -> Option<String> {
        let token = state.peek()?;
        if token.kind != TokenKind::Number {
            return None;
        }
        let text = token.text.clone();
        state.next_token();
        Some(text)
    }

    // expr: expr '+' NUMBER | NUMBER
    fn expr(state: &mut ParserState<'_, String>) -> ParseResult<String> {
        state.rule(RuleId::new(0), true, true, expr_body)
    }

    fn expr_body(state: &mut ParserState<'_, String>) -> ParseResult<String> {
        let start = state.mark();

        if let ParseOutcome::Matched(lhs, _) = expr(state)? {
            if state.peek().map_or(false, |t| t.text == "+") {
                state.next_token();
                if let Some(rhs) = take_number(state) {
                    let value = format!("({}+{})", lhs, rhs);
                    return Ok(ParseOutcome::Matched(value, state.mark()));
                }
            }
        }
        state.reset(start);

        match take_number(state) {
            Some(value) => Ok(ParseOutcome::Matched(value, state.mark())),
            None => {
                state.reset(start);
                Ok(ParseOutcome::NotMatched)
            }
        }
    }

    #[test]
    fn memoized_rule_evaluates_once_per_position() {
        let tokens = vec![Token::number("1")];
        let mut state: ParserState<'_, u32> = ParserState::new(&tokens);
        let mut calls = 0;

        for _ in 0..2 {
            let outcome = state
                .rule(RuleId::new(0), true, false, |s| {
                    calls += 1;
                    s.next_token();
                    Ok(ParseOutcome::Matched(1, s.mark()))
                })
                .unwrap();
            assert_eq!(outcome, ParseOutcome::Matched(1, 1));
            state.reset(0);
        }

        assert_eq!(calls, 1);
        assert_eq!(state.memo().hits(), 1);
    }

    #[test]
    fn cached_failure_rewinds_to_the_start() {
        let tokens = vec![Token::op("+")];
        let mut state: ParserState<'_, u32> = ParserState::new(&tokens);

        for _ in 0..2 {
            let outcome = state
                .rule(RuleId::new(0), true, false, |s| {
                    s.next_token();
                    Ok(ParseOutcome::NotMatched)
                })
                .unwrap();
            assert_eq!(outcome, ParseOutcome::NotMatched);
            assert_eq!(state.mark(), 0);
        }
    }

    #[test]
    fn seed_growing_is_left_associative() {
        let tokens = vec![
            Token::number("1"),
            Token::op("+"),
            Token::number("2"),
            Token::op("+"),
            Token::number("3"),
        ];
        let mut state = ParserState::new(&tokens);

        let outcome = expr(&mut state).unwrap();
        assert_eq!(
            outcome,
            ParseOutcome::Matched("((1+2)+3)".to_owned(), 5)
        );
        assert_eq!(state.mark(), 5);
    }

    #[test]
    fn growth_stops_at_the_longest_expansion() {
        // Trailing '+' with no operand: growth keeps "(1+2)" and leaves the
        // dangling operator unconsumed.
        let tokens = vec![
            Token::number("1"),
            Token::op("+"),
            Token::number("2"),
            Token::op("+"),
        ];
        let mut state = ParserState::new(&tokens);

        let outcome = expr(&mut state).unwrap();
        assert_eq!(outcome, ParseOutcome::Matched("(1+2)".to_owned(), 3));
    }

    #[test]
    fn zero_width_leader_success_does_not_beat_the_seed() {
        let tokens = vec![Token::number("1")];
        let mut state: ParserState<'_, u32> = ParserState::new(&tokens);

        let outcome = state
            .rule(RuleId::new(0), true, true, |s| {
                Ok(ParseOutcome::Matched(0, s.mark()))
            })
            .unwrap();
        assert_eq!(outcome, ParseOutcome::NotMatched);
        assert_eq!(state.mark(), 0);
    }

    #[test]
    fn hard_errors_pass_through_the_memo_layer() {
        let tokens = vec![Token::number("1")];
        let mut state: ParserState<'_, u32> = ParserState::new(&tokens);

        let result = state.rule(RuleId::new(0), true, false, |s| {
            Err(SyntaxError::new(s.mark(), "':'"))
        });
        assert_eq!(result, Err(SyntaxError::new(0, "':'")));
    }
}
