// peggen. A PEG parser compiler
// Copyright (c) 2024 peggen contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! The grammar intermediate representation.
//!
//! Pure data: rules, alternatives, items. A front-end builds this IR from
//! grammar source, the analyzer annotates it in place, and the rule compiler
//! reads it — nothing here evaluates anything.

use core::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use peggen::RuleId;

use crate::validator;
use crate::GrammarError;

/// A whole grammar: an ordered sequence of rules (the first is the start
/// symbol), the declared hard and soft keyword sets, and grammar-level
/// directives (`@class`, `@header`, ...) passed through verbatim to
/// backends.
///
/// Rules live in a flat table and reference each other by name; the name
/// index built at construction makes resolution O(1) and is the only thing
/// that ever "links" two rules, so cyclic grammars need no cyclic
/// ownership.
#[derive(Clone, Debug, PartialEq)]
pub struct Grammar {
    rules: Vec<Rule>,
    index: FxHashMap<String, RuleId>,
    hard_keywords: FxHashSet<String>,
    soft_keywords: FxHashSet<String>,
    metas: Vec<(String, Option<String>)>,
}

impl Grammar {
    /// Builds a grammar from its rules and keyword sets.
    ///
    /// Rejects duplicate rule definitions and any reference to a name that
    /// is neither a defined rule nor a built-in token category — the only
    /// error classes the IR layer itself can raise.
    pub fn new(
        rules: Vec<Rule>,
        hard_keywords: &[&str],
        soft_keywords: &[&str],
    ) -> Result<Grammar, GrammarError> {
        validator::check_duplicates(&rules)?;

        let index = rules
            .iter()
            .enumerate()
            .map(|(i, rule)| (rule.name.clone(), RuleId::new(i)))
            .collect();
        let grammar = Grammar {
            rules,
            index,
            hard_keywords: hard_keywords.iter().map(|s| (*s).to_owned()).collect(),
            soft_keywords: soft_keywords.iter().map(|s| (*s).to_owned()).collect(),
            metas: Vec::new(),
        };
        validator::check_references(&grammar)?;

        Ok(grammar)
    }

    /// Attaches a grammar-level directive, e.g. `@class` or `@header`.
    pub fn with_meta(mut self, name: impl Into<String>, value: Option<&str>) -> Grammar {
        self.metas.push((name.into(), value.map(str::to_owned)));
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub(crate) fn rules_mut(&mut self) -> &mut [Rule] {
        &mut self.rules
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.index()]
    }

    /// Resolves a rule name to its stable index.
    pub fn resolve(&self, name: &str) -> Option<RuleId> {
        self.index.get(name).copied()
    }

    /// The start symbol: the first declared rule.
    pub fn start(&self) -> Option<RuleId> {
        if self.rules.is_empty() {
            None
        } else {
            Some(RuleId::new(0))
        }
    }

    pub fn is_hard_keyword(&self, text: &str) -> bool {
        self.hard_keywords.contains(text)
    }

    pub fn is_soft_keyword(&self, text: &str) -> bool {
        self.soft_keywords.contains(text)
    }

    pub fn hard_keywords(&self) -> &FxHashSet<String> {
        &self.hard_keywords
    }

    pub fn soft_keywords(&self) -> &FxHashSet<String> {
        &self.soft_keywords
    }

    pub fn metas(&self) -> &[(String, Option<String>)] {
        &self.metas
    }
}

/// One named rule and its analysis annotations.
#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    pub name: String,
    /// Declared result type, opaque to the core; only backends read it.
    pub result_type: Option<String>,
    pub alternatives: Vec<Alternative>,
    /// Author hint: `false` asks to skip caching for a trivially cheap rule.
    /// The analyzer may override it; see [`Rule::memoize`].
    pub memo: bool,
    /// Whether some alternative matches the empty input. Analyzer output.
    pub nullable: bool,
    /// Whether the rule can re-enter itself before consuming input.
    /// Analyzer output.
    pub left_recursive: bool,
    /// Whether this rule drives the seed-growing loop for its cluster of
    /// mutually left-recursive rules. Analyzer output.
    pub leader: bool,
    /// Final memoization decision: the author hint constrained by the
    /// left-recursion classification. Analyzer output.
    pub memoize: bool,
}

impl Rule {
    pub fn new(name: impl Into<String>, alternatives: Vec<Alternative>) -> Rule {
        Rule {
            name: name.into(),
            result_type: None,
            alternatives,
            memo: true,
            nullable: false,
            left_recursive: false,
            leader: false,
            memoize: true,
        }
    }

    pub fn with_type(mut self, result_type: impl Into<String>) -> Rule {
        self.result_type = Some(result_type.into());
        self
    }

    pub fn without_memo(mut self) -> Rule {
        self.memo = false;
        self
    }
}

/// One alternative: a sequence of items and an optional action.
///
/// A `~` commit marker is an ordinary [`Item::Cut`] in the sequence; the
/// compiler derives the per-alternative commit flag from it.
#[derive(Clone, Debug, PartialEq)]
pub struct Alternative {
    pub items: Vec<NamedItem>,
    /// Opaque expression evaluated by the backend when the alternative
    /// matches; `None` selects the default result.
    pub action: Option<String>,
}

impl Alternative {
    pub fn new(items: Vec<NamedItem>) -> Alternative {
        Alternative {
            items,
            action: None,
        }
    }

    pub fn with_action(items: Vec<NamedItem>, action: impl Into<String>) -> Alternative {
        Alternative {
            items,
            action: Some(action.into()),
        }
    }
}

/// An item with its optional `name=` binding.
#[derive(Clone, Debug, PartialEq)]
pub struct NamedItem {
    pub name: Option<String>,
    pub item: Item,
}

impl NamedItem {
    pub fn unnamed(item: Item) -> NamedItem {
        NamedItem { name: None, item }
    }

    pub fn named(name: impl Into<String>, item: Item) -> NamedItem {
        NamedItem {
            name: Some(name.into()),
            item,
        }
    }
}

/// A parsing expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Item {
    /// A hard keyword, operator, or declared soft keyword, e.g. `'if'`.
    Literal(String),
    /// Reference to another rule by name, e.g. `expr`.
    RuleRef(String),
    /// Reference to a lexical token category, e.g. `NAME`.
    TokenRef(String),
    /// Parenthesized sub-choice, e.g. `(a | b)`.
    Group(Vec<Alternative>),
    /// `[e]` / `e?`: optionally matches an expression.
    Opt(Box<Item>),
    /// `e*`: matches an expression zero or more times.
    Repeat0(Box<Item>),
    /// `e+`: matches an expression one or more times.
    Repeat1(Box<Item>),
    /// `s.e+`: `e` separated by `s`, keeping only the `e` results.
    Gather { sep: Box<Item>, elem: Box<Item> },
    /// `&e` / `!e`: zero-width predicate.
    Lookahead { positive: bool, inner: Box<Item> },
    /// `~`: commits the parser to the current alternative.
    Cut,
    /// `&&e`: failure of `e` is a hard syntax error, not a non-match.
    Forced(Box<Item>),
}

impl Item {
    pub fn literal(text: impl Into<String>) -> Item {
        Item::Literal(text.into())
    }

    pub fn rule_ref(name: impl Into<String>) -> Item {
        Item::RuleRef(name.into())
    }

    pub fn token_ref(name: impl Into<String>) -> Item {
        Item::TokenRef(name.into())
    }

    pub fn group(alternatives: Vec<Alternative>) -> Item {
        Item::Group(alternatives)
    }

    pub fn opt(item: Item) -> Item {
        Item::Opt(Box::new(item))
    }

    pub fn repeat0(item: Item) -> Item {
        Item::Repeat0(Box::new(item))
    }

    pub fn repeat1(item: Item) -> Item {
        Item::Repeat1(Box::new(item))
    }

    pub fn gather(sep: Item, elem: Item) -> Item {
        Item::Gather {
            sep: Box::new(sep),
            elem: Box::new(elem),
        }
    }

    pub fn pos_lookahead(item: Item) -> Item {
        Item::Lookahead {
            positive: true,
            inner: Box::new(item),
        }
    }

    pub fn neg_lookahead(item: Item) -> Item {
        Item::Lookahead {
            positive: false,
            inner: Box::new(item),
        }
    }

    pub fn forced(item: Item) -> Item {
        Item::Forced(Box::new(item))
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Literal(text) => write!(f, "'{}'", text),
            Item::RuleRef(name) | Item::TokenRef(name) => f.write_str(name),
            Item::Group(alternatives) => {
                f.write_str("(")?;
                for (i, alternative) in alternatives.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{}", alternative)?;
                }
                f.write_str(")")
            }
            Item::Opt(inner) => write!(f, "[{}]", inner),
            Item::Repeat0(inner) => write!(f, "{}*", inner),
            Item::Repeat1(inner) => write!(f, "{}+", inner),
            Item::Gather { sep, elem } => write!(f, "{}.{}+", sep, elem),
            Item::Lookahead {
                positive: true,
                inner,
            } => write!(f, "&{}", inner),
            Item::Lookahead {
                positive: false,
                inner,
            } => write!(f, "!{}", inner),
            Item::Cut => f.write_str("~"),
            Item::Forced(inner) => write!(f, "&&{}", inner),
        }
    }
}

impl fmt::Display for NamedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}={}", name, self.item),
            None => write!(f, "{}", self.item),
        }
    }
}

impl fmt::Display for Alternative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", item)?;
        }
        if let Some(action) = &self.action {
            if !self.items.is_empty() {
                f.write_str(" ")?;
            }
            write!(f, "{{ {} }}", action)?;
        }
        Ok(())
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result_type {
            Some(ty) => write!(f, "{}[{}]:", self.name, ty)?,
            None => write!(f, "{}:", self.name)?,
        }
        for (i, alternative) in self.alternatives.iter().enumerate() {
            if i > 0 {
                f.write_str(" |")?;
            }
            write!(f, " {}", alternative)?;
        }
        Ok(())
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.metas {
            match value {
                Some(value) => writeln!(f, "@{} {}", name, value)?,
                None => writeln!(f, "@{}", name)?,
            }
        }
        for rule in &self.rules {
            writeln!(f, "{}", rule)?;
        }
        Ok(())
    }
}
