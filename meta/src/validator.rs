// peggen. A PEG parser compiler
// Copyright (c) 2024 peggen contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Reference validation for freshly built grammars.
//!
//! Runs once at IR construction: every `RuleRef` must name a defined rule,
//! every `TokenRef` a built-in token category, and no rule may be defined
//! twice. Cycles through `RuleRef` are expected (that is the left-recursion
//! case) and are never rejected here.

use std::collections::HashSet;

use once_cell::sync::Lazy;

use crate::ast::{Alternative, Grammar, Item, Rule};
use crate::GrammarError;

/// Token categories a grammar may reference without defining them.
static BUILTIN_CATEGORIES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "NAME",
        "NUMBER",
        "STRING",
        "OP",
        "NEWLINE",
        "INDENT",
        "DEDENT",
        "ENDMARKER",
    ]
    .iter()
    .cloned()
    .collect()
});

pub fn is_builtin_category(name: &str) -> bool {
    BUILTIN_CATEGORIES.contains(name)
}

pub(crate) fn check_duplicates(rules: &[Rule]) -> Result<(), GrammarError> {
    let mut defined = HashSet::new();
    for rule in rules {
        if !defined.insert(rule.name.as_str()) {
            return Err(GrammarError::DuplicateRule {
                name: rule.name.clone(),
            });
        }
    }
    Ok(())
}

pub(crate) fn check_references(grammar: &Grammar) -> Result<(), GrammarError> {
    for rule in grammar.rules() {
        for alternative in &rule.alternatives {
            check_alternative(alternative, rule, grammar)?;
        }
    }
    Ok(())
}

fn check_alternative(
    alternative: &Alternative,
    rule: &Rule,
    grammar: &Grammar,
) -> Result<(), GrammarError> {
    for named in &alternative.items {
        check_item(&named.item, rule, grammar)?;
    }
    Ok(())
}

fn check_item(item: &Item, rule: &Rule, grammar: &Grammar) -> Result<(), GrammarError> {
    match item {
        Item::Literal(_) | Item::Cut => Ok(()),
        Item::RuleRef(name) => {
            if grammar.resolve(name).is_some() {
                Ok(())
            } else {
                Err(unknown(rule, name))
            }
        }
        Item::TokenRef(name) => {
            if is_builtin_category(name) {
                Ok(())
            } else {
                Err(unknown(rule, name))
            }
        }
        Item::Group(alternatives) => {
            for alternative in alternatives {
                check_alternative(alternative, rule, grammar)?;
            }
            Ok(())
        }
        Item::Opt(inner) | Item::Repeat0(inner) | Item::Repeat1(inner) | Item::Forced(inner) => {
            check_item(inner, rule, grammar)
        }
        Item::Gather { sep, elem } => {
            check_item(sep, rule, grammar)?;
            check_item(elem, rule, grammar)
        }
        Item::Lookahead { inner, .. } => check_item(inner, rule, grammar),
    }
}

fn unknown(rule: &Rule, name: &str) -> GrammarError {
    GrammarError::UnknownRuleOrToken {
        rule: rule.name.clone(),
        name: name.to_owned(),
    }
}
