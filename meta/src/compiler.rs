// peggen. A PEG parser compiler
// Copyright (c) 2024 peggen contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! The rule compiler.
//!
//! Lowers an analyzed [`Grammar`] into a [`CompiledGrammar`]: per rule, an
//! ordered trial list of alternatives whose matchers reference rules by
//! stable index, with binding names for actions, per-alternative commit
//! flags and the classification flags backends must honor. The compiled
//! plan is immutable; backends (and `peggen_vm`) only read it.

use core::ops::Index;

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use peggen::{RuleId, TokenKind};

use crate::ast::{Alternative, Grammar, Item, NamedItem, Rule};
use crate::GrammarError;

/// Compiled plan for a whole grammar.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledGrammar {
    rules: Vec<CompiledRule>,
    index: FxHashMap<String, RuleId>,
    hard_keywords: FxHashSet<String>,
    soft_keywords: FxHashSet<String>,
    metas: Vec<(String, Option<String>)>,
}

impl CompiledGrammar {
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// The start symbol: the first declared rule.
    pub fn start(&self) -> Option<RuleId> {
        if self.rules.is_empty() {
            None
        } else {
            Some(RuleId::new(0))
        }
    }

    pub fn resolve(&self, name: &str) -> Option<RuleId> {
        self.index.get(name).copied()
    }

    /// Hard keywords are reserved: a NAME-category match must reject them.
    pub fn is_hard_keyword(&self, text: &str) -> bool {
        self.hard_keywords.contains(text)
    }

    pub fn is_soft_keyword(&self, text: &str) -> bool {
        self.soft_keywords.contains(text)
    }

    /// Grammar-level directives, verbatim for the backend.
    pub fn metas(&self) -> &[(String, Option<String>)] {
        &self.metas
    }
}

impl Index<RuleId> for CompiledGrammar {
    type Output = CompiledRule;

    fn index(&self, id: RuleId) -> &CompiledRule {
        &self.rules[id.index()]
    }
}

/// Compiled plan for one rule.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledRule {
    pub name: String,
    /// Declared result type, opaque; only backends read it.
    pub result_type: Option<String>,
    pub alternatives: Vec<CompiledAlternative>,
    pub nullable: bool,
    pub left_recursive: bool,
    /// Whether invocations must run the seed-growing loop.
    pub leader: bool,
    /// Whether invocations go through the memo table.
    pub memoize: bool,
}

/// One ordered-choice trial: a matcher sequence, its action plan, and
/// whether a `~` commits the enclosing choice.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledAlternative {
    pub matchers: Vec<BoundMatcher>,
    pub action: ActionPlan,
    pub commits: bool,
}

/// A matcher with the binding name its value is visible under, if any.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundMatcher {
    pub binding: Option<String>,
    pub matcher: Matcher,
}

/// How an alternative's result is produced once it matches.
#[derive(Clone, Debug, PartialEq)]
pub enum ActionPlan {
    /// No action and exactly one value-producing item: its value.
    SingleItem,
    /// No action: the ordered sequence of value-producing item results.
    Sequence,
    /// Grammar-supplied expression; the backend gives it meaning, the core
    /// only threads the bound values through.
    Custom(String),
}

/// A compiled parsing expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Matcher {
    /// Hard keyword or operator token, matched by text.
    Exact(String),
    /// Soft keyword: a NAME token with this exact text. Never reserved —
    /// NAME alternatives can still match the same text.
    SoftKeyword(String),
    /// A lexical token category.
    Token(TokenKind),
    /// Invocation of another rule through the memo engine.
    Rule(RuleId),
    /// Nested ordered choice.
    Group(Vec<CompiledAlternative>),
    Opt(Box<Matcher>),
    Repeat0(Box<Matcher>),
    Repeat1(Box<Matcher>),
    Gather { sep: Box<Matcher>, elem: Box<Matcher> },
    /// Zero-width predicate; binds no value.
    Lookahead { positive: bool, inner: Box<Matcher> },
    /// Zero-width commit marker; binds no value.
    Cut,
    /// Failure of `inner` raises a hard error carrying `expected`.
    Forced { inner: Box<Matcher>, expected: String },
}

impl Matcher {
    /// Whether a successful match binds a value an action can see.
    pub fn produces_value(&self) -> bool {
        !matches!(self, Matcher::Lookahead { .. } | Matcher::Cut)
    }
}

/// Lowers every rule of an analyzed grammar.
pub fn compile(grammar: &Grammar) -> Result<CompiledGrammar, GrammarError> {
    let mut rules = Vec::with_capacity(grammar.rules().len());
    for rule in grammar.rules() {
        let compiled = compile_rule(rule, grammar)?;
        debug!(
            "compiled {}: {} alternatives",
            compiled.name,
            compiled.alternatives.len()
        );
        rules.push(compiled);
    }

    Ok(CompiledGrammar {
        index: rules
            .iter()
            .enumerate()
            .map(|(i, rule)| (rule.name.clone(), RuleId::new(i)))
            .collect(),
        rules,
        hard_keywords: grammar.hard_keywords().clone(),
        soft_keywords: grammar.soft_keywords().clone(),
        metas: grammar.metas().to_vec(),
    })
}

fn compile_rule(rule: &Rule, grammar: &Grammar) -> Result<CompiledRule, GrammarError> {
    let alternatives = rule
        .alternatives
        .iter()
        .map(|alternative| compile_alternative(alternative, rule, grammar))
        .collect::<Result<_, _>>()?;

    Ok(CompiledRule {
        name: rule.name.clone(),
        result_type: rule.result_type.clone(),
        alternatives,
        nullable: rule.nullable,
        left_recursive: rule.left_recursive,
        leader: rule.leader,
        memoize: rule.memoize,
    })
}

fn compile_alternative(
    alternative: &Alternative,
    rule: &Rule,
    grammar: &Grammar,
) -> Result<CompiledAlternative, GrammarError> {
    let mut used: FxHashMap<String, usize> = FxHashMap::default();
    let mut matchers = Vec::with_capacity(alternative.items.len());

    for named in &alternative.items {
        let matcher = compile_item(&named.item, rule, grammar)?;
        let binding = if matcher.produces_value() {
            binding_name(named, &mut used)
        } else {
            None
        };
        matchers.push(BoundMatcher { binding, matcher });
    }

    let commits = matchers
        .iter()
        .any(|bound| matches!(bound.matcher, Matcher::Cut));
    let producing = matchers
        .iter()
        .filter(|bound| bound.matcher.produces_value())
        .count();
    let action = match &alternative.action {
        Some(expr) => ActionPlan::Custom(expr.clone()),
        None if producing == 1 => ActionPlan::SingleItem,
        None => ActionPlan::Sequence,
    };

    Ok(CompiledAlternative {
        matchers,
        action,
        commits,
    })
}

/// The name an action sees this item's value under: the explicit `name=`
/// binding, or a name derived from the referenced rule or token category,
/// deduplicated with numeric suffixes within one alternative.
fn binding_name(named: &NamedItem, used: &mut FxHashMap<String, usize>) -> Option<String> {
    let base = match &named.name {
        Some(name) => name.clone(),
        None => match &named.item {
            Item::RuleRef(name) => name.clone(),
            Item::TokenRef(category) => category.to_lowercase(),
            _ => return None,
        },
    };

    let count = used.entry(base.clone()).or_insert(0);
    let name = if *count == 0 {
        base
    } else {
        format!("{}_{}", base, count)
    };
    *count += 1;
    Some(name)
}

fn compile_item(item: &Item, rule: &Rule, grammar: &Grammar) -> Result<Matcher, GrammarError> {
    Ok(match item {
        Item::Literal(text) => {
            if grammar.is_soft_keyword(text) {
                Matcher::SoftKeyword(text.clone())
            } else {
                Matcher::Exact(text.clone())
            }
        }
        Item::RuleRef(name) => match grammar.resolve(name) {
            Some(id) => Matcher::Rule(id),
            None => return Err(unknown(rule, name)),
        },
        Item::TokenRef(name) => match TokenKind::from_name(name) {
            Some(kind) => Matcher::Token(kind),
            None => return Err(unknown(rule, name)),
        },
        Item::Group(alternatives) => Matcher::Group(
            alternatives
                .iter()
                .map(|alternative| compile_alternative(alternative, rule, grammar))
                .collect::<Result<_, _>>()?,
        ),
        Item::Opt(inner) => Matcher::Opt(Box::new(compile_item(inner, rule, grammar)?)),
        Item::Repeat0(inner) => Matcher::Repeat0(Box::new(compile_item(inner, rule, grammar)?)),
        Item::Repeat1(inner) => Matcher::Repeat1(Box::new(compile_item(inner, rule, grammar)?)),
        Item::Gather { sep, elem } => Matcher::Gather {
            sep: Box::new(compile_item(sep, rule, grammar)?),
            elem: Box::new(compile_item(elem, rule, grammar)?),
        },
        Item::Lookahead { positive, inner } => Matcher::Lookahead {
            positive: *positive,
            inner: Box::new(compile_item(inner, rule, grammar)?),
        },
        Item::Cut => Matcher::Cut,
        Item::Forced(inner) => Matcher::Forced {
            expected: inner.to_string(),
            inner: Box::new(compile_item(inner, rule, grammar)?),
        },
    })
}

fn unknown(rule: &Rule, name: &str) -> GrammarError {
    GrammarError::UnknownRuleOrToken {
        rule: rule.name.clone(),
        name: name.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled(rules: Vec<Rule>, hard: &[&str], soft: &[&str]) -> CompiledGrammar {
        crate::compile(Grammar::new(rules, hard, soft).unwrap()).unwrap()
    }

    fn unnamed(items: Vec<Item>) -> Alternative {
        Alternative::new(items.into_iter().map(NamedItem::unnamed).collect())
    }

    #[test]
    fn literals_classify_by_keyword_set() {
        let grammar = compiled(
            vec![Rule::new(
                "stmt",
                vec![unnamed(vec![
                    Item::literal("if"),
                    Item::literal("match"),
                    Item::literal("+"),
                ])],
            )],
            &["if"],
            &["match"],
        );

        let matchers = &grammar.rules()[0].alternatives[0].matchers;
        assert_eq!(matchers[0].matcher, Matcher::Exact("if".to_owned()));
        assert_eq!(matchers[1].matcher, Matcher::SoftKeyword("match".to_owned()));
        assert_eq!(matchers[2].matcher, Matcher::Exact("+".to_owned()));
    }

    #[test]
    fn rule_references_resolve_to_stable_indices() {
        let grammar = compiled(
            vec![
                Rule::new("a", vec![unnamed(vec![Item::rule_ref("b")])]),
                Rule::new("b", vec![unnamed(vec![Item::token_ref("NUMBER")])]),
            ],
            &[],
            &[],
        );

        assert_eq!(
            grammar.rules()[0].alternatives[0].matchers[0].matcher,
            Matcher::Rule(grammar.resolve("b").unwrap())
        );
        assert_eq!(
            grammar.rules()[1].alternatives[0].matchers[0].matcher,
            Matcher::Token(TokenKind::Number)
        );
    }

    #[test]
    fn default_action_depends_on_value_producing_items() {
        let grammar = compiled(
            vec![
                Rule::new("single", vec![unnamed(vec![Item::token_ref("NUMBER")])]),
                Rule::new(
                    "pair",
                    vec![unnamed(vec![
                        Item::token_ref("NUMBER"),
                        Item::token_ref("NUMBER"),
                    ])],
                ),
                Rule::new(
                    "guarded",
                    vec![unnamed(vec![
                        Item::neg_lookahead(Item::literal("-")),
                        Item::token_ref("NUMBER"),
                    ])],
                ),
                Rule::new(
                    "acted",
                    vec![Alternative::with_action(
                        vec![NamedItem::unnamed(Item::token_ref("NUMBER"))],
                        "int(number)",
                    )],
                ),
            ],
            &[],
            &[],
        );

        assert_eq!(grammar.rules()[0].alternatives[0].action, ActionPlan::SingleItem);
        assert_eq!(grammar.rules()[1].alternatives[0].action, ActionPlan::Sequence);
        // The lookahead binds no value, so one producing item remains.
        assert_eq!(grammar.rules()[2].alternatives[0].action, ActionPlan::SingleItem);
        assert_eq!(
            grammar.rules()[3].alternatives[0].action,
            ActionPlan::Custom("int(number)".to_owned())
        );
    }

    #[test]
    fn bindings_derive_from_names_and_deduplicate() {
        let grammar = compiled(
            vec![
                Rule::new(
                    "binop",
                    vec![Alternative::new(vec![
                        NamedItem::unnamed(Item::rule_ref("expr")),
                        NamedItem::unnamed(Item::literal("+")),
                        NamedItem::unnamed(Item::rule_ref("expr")),
                        NamedItem::named("tail", Item::token_ref("NUMBER")),
                        NamedItem::unnamed(Item::token_ref("NUMBER")),
                    ])],
                ),
                Rule::new("expr", vec![unnamed(vec![Item::token_ref("NUMBER")])]),
            ],
            &[],
            &[],
        );

        let bindings: Vec<Option<&str>> = grammar.rules()[0].alternatives[0]
            .matchers
            .iter()
            .map(|bound| bound.binding.as_deref())
            .collect();
        assert_eq!(
            bindings,
            vec![
                Some("expr"),
                None,
                Some("expr_1"),
                Some("tail"),
                Some("number"),
            ]
        );
    }

    #[test]
    fn cut_sets_the_commit_flag_and_binds_nothing() {
        let grammar = compiled(
            vec![Rule::new(
                "stmt",
                vec![
                    unnamed(vec![
                        Item::literal("("),
                        Item::Cut,
                        Item::token_ref("NUMBER"),
                        Item::literal(")"),
                    ]),
                    unnamed(vec![Item::token_ref("NAME")]),
                ],
            )],
            &[],
            &[],
        );

        let alternatives = &grammar.rules()[0].alternatives;
        assert!(alternatives[0].commits);
        assert!(!alternatives[1].commits);
        assert_eq!(alternatives[0].matchers[1].binding, None);
    }

    #[test]
    fn forced_matchers_carry_their_expectation_text() {
        let grammar = compiled(
            vec![Rule::new(
                "block",
                vec![unnamed(vec![
                    Item::token_ref("NAME"),
                    Item::forced(Item::literal(":")),
                ])],
            )],
            &[],
            &[],
        );

        match &grammar.rules()[0].alternatives[0].matchers[1].matcher {
            Matcher::Forced { expected, .. } => assert_eq!(expected, "':'"),
            other => panic!("expected a forced matcher, got {:?}", other),
        }
    }

    #[test]
    fn classification_flags_reach_the_compiled_plan() {
        let grammar = compiled(
            vec![
                Rule::new(
                    "expr",
                    vec![
                        unnamed(vec![
                            Item::rule_ref("expr"),
                            Item::literal("+"),
                            Item::rule_ref("term"),
                        ]),
                        unnamed(vec![Item::rule_ref("term")]),
                    ],
                ),
                Rule::new("term", vec![unnamed(vec![Item::token_ref("NUMBER")])]),
            ],
            &[],
            &[],
        );

        let expr = &grammar[grammar.resolve("expr").unwrap()];
        assert!(expr.left_recursive && expr.leader && expr.memoize);
        let term = &grammar[grammar.resolve("term").unwrap()];
        assert!(!term.left_recursive && !term.leader && term.memoize);
    }

    #[test]
    fn metas_pass_through_verbatim() {
        let grammar = Grammar::new(
            vec![Rule::new(
                "start",
                vec![unnamed(vec![Item::token_ref("ENDMARKER")])],
            )],
            &[],
            &[],
        )
        .unwrap()
        .with_meta("class", Some("MyParser"))
        .with_meta("trailer", None);

        let compiled = crate::compile(grammar).unwrap();
        assert_eq!(
            compiled.metas(),
            &[
                ("class".to_owned(), Some("MyParser".to_owned())),
                ("trailer".to_owned(), None),
            ]
        );
    }
}
