// peggen. A PEG parser compiler
// Copyright (c) 2024 peggen contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! The packrat memo table.
//!
//! One table serves exactly one parse of one input and is dropped with its
//! [`ParserState`](crate::state::ParserState); it is never reused across
//! inputs.

use rustc_hash::FxHashMap;

/// Stable index of a rule inside a compiled grammar.
///
/// Rules live in a flat table and reference each other through these
/// indices, never through owning links, so mutually recursive grammars need
/// no cyclic ownership.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RuleId(usize);

impl RuleId {
    pub fn new(index: usize) -> RuleId {
        RuleId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// State of one (rule, position) pair in the table.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum MemoEntry<V> {
    /// The rule is currently being evaluated at this position.
    InProgress,
    /// The rule matched, producing `V` and ending at the given position.
    Matched(V, usize),
    /// The rule did not match here. Also the initial seed a leader rule
    /// plants before growing a left-recursive match.
    NotMatched,
}

/// Memoization cache keyed by (rule, input position).
#[derive(Debug)]
pub struct MemoTable<V> {
    entries: FxHashMap<(RuleId, usize), MemoEntry<V>>,
    hits: u64,
    misses: u64,
}

impl<V> Default for MemoTable<V> {
    fn default() -> Self {
        MemoTable {
            entries: FxHashMap::default(),
            hits: 0,
            misses: 0,
        }
    }
}

impl<V> MemoTable<V> {
    pub fn new() -> MemoTable<V> {
        MemoTable::default()
    }

    pub fn get(&mut self, rule: RuleId, pos: usize) -> Option<&MemoEntry<V>> {
        let entry = self.entries.get(&(rule, pos));
        match entry {
            Some(_) => self.hits += 1,
            None => self.misses += 1,
        }
        entry
    }

    pub fn insert(&mut self, rule: RuleId, pos: usize, entry: MemoEntry<V>) {
        self.entries.insert((rule, pos), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookups that found an entry.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Lookups that found nothing and fell through to evaluation.
    pub fn misses(&self) -> u64 {
        self.misses
    }
}
