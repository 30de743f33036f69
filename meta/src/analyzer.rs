// peggen. A PEG parser compiler
// Copyright (c) 2024 peggen contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Static analysis: classifies every rule before compilation.
//!
//! Three passes over the IR, each writing its annotations in place:
//!
//! 1. nullability, by fixpoint iteration over the item trees;
//! 2. left recursion, by reachability over the leftmost-caller relation
//!    (which rules can be entered first, following only nullable prefixes),
//!    including leader election per cluster of mutually recursive rules;
//! 3. the final memoization decision, constraining author hints by the
//!    left-recursion classification.

use log::debug;
use rustc_hash::FxHashSet;

use crate::ast::{Alternative, Grammar, Item};
use crate::GrammarError;

/// Annotates every rule of the grammar. Re-running on an already annotated
/// grammar recomputes the same flags.
pub fn analyze(grammar: &mut Grammar) -> Result<(), GrammarError> {
    compute_nullables(grammar);
    classify_left_recursion(grammar)?;
    decide_memoization(grammar);

    for rule in grammar.rules() {
        debug!(
            "rule {}: nullable={} left_recursive={} leader={} memoize={}",
            rule.name, rule.nullable, rule.left_recursive, rule.leader, rule.memoize
        );
    }
    Ok(())
}

fn compute_nullables(grammar: &mut Grammar) {
    let mut nullable = vec![false; grammar.rules().len()];

    loop {
        let mut changed = false;
        for (i, rule) in grammar.rules().iter().enumerate() {
            if nullable[i] {
                continue;
            }
            let is_nullable = rule
                .alternatives
                .iter()
                .any(|alternative| alternative_nullable(alternative, grammar, &nullable));
            if is_nullable {
                nullable[i] = true;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    for (rule, flag) in grammar.rules_mut().iter_mut().zip(nullable) {
        rule.nullable = flag;
    }
}

fn alternative_nullable(alternative: &Alternative, grammar: &Grammar, nullable: &[bool]) -> bool {
    alternative
        .items
        .iter()
        .all(|named| item_nullable(&named.item, grammar, nullable))
}

fn item_nullable(item: &Item, grammar: &Grammar, nullable: &[bool]) -> bool {
    match item {
        Item::Literal(_) | Item::TokenRef(_) => false,
        Item::RuleRef(name) => grammar
            .resolve(name)
            .map_or(false, |id| nullable[id.index()]),
        Item::Group(alternatives) => alternatives
            .iter()
            .any(|alternative| alternative_nullable(alternative, grammar, nullable)),
        Item::Opt(_) | Item::Repeat0(_) | Item::Lookahead { .. } | Item::Cut => true,
        Item::Repeat1(inner) | Item::Forced(inner) => item_nullable(inner, grammar, nullable),
        Item::Gather { elem, .. } => item_nullable(elem, grammar, nullable),
    }
}

fn classify_left_recursion(grammar: &mut Grammar) -> Result<(), GrammarError> {
    let n = grammar.rules().len();
    let nullable: Vec<bool> = grammar.rules().iter().map(|rule| rule.nullable).collect();

    // Leftmost-caller graph: edges[i] holds every rule that can be entered
    // at the same position a parse of rule i starts at.
    let edges: Vec<FxHashSet<usize>> = grammar
        .rules()
        .iter()
        .map(|rule| {
            let mut leading = FxHashSet::default();
            for alternative in &rule.alternatives {
                alternative_leading(alternative, grammar, &nullable, &mut leading);
            }
            leading
        })
        .collect();

    let reach: Vec<FxHashSet<usize>> = (0..n).map(|i| reachable(i, &edges)).collect();
    let left_recursive: Vec<bool> = (0..n).map(|i| reach[i].contains(&i)).collect();

    let mut leader = vec![false; n];
    let mut assigned = vec![false; n];
    for i in 0..n {
        if !left_recursive[i] || assigned[i] {
            continue;
        }
        let component: Vec<usize> = (i..n)
            .filter(|&j| left_recursive[j] && reach[i].contains(&j) && reach[j].contains(&i))
            .collect();
        for &member in &component {
            assigned[member] = true;
        }
        let entry = component
            .iter()
            .copied()
            .find(|&m| !has_cycle(&component, &edges, m))
            .ok_or_else(|| GrammarError::AmbiguousLeftRecursion {
                names: component
                    .iter()
                    .map(|&m| grammar.rules()[m].name.clone())
                    .collect(),
            })?;
        leader[entry] = true;
    }

    for (i, rule) in grammar.rules_mut().iter_mut().enumerate() {
        rule.left_recursive = left_recursive[i];
        rule.leader = leader[i];
    }
    Ok(())
}

/// Adds to `out` every rule that can start a match of this alternative:
/// each item's leading rules, walking past items only while they are
/// nullable.
fn alternative_leading(
    alternative: &Alternative,
    grammar: &Grammar,
    nullable: &[bool],
    out: &mut FxHashSet<usize>,
) {
    for named in &alternative.items {
        item_leading(&named.item, grammar, nullable, out);
        if !item_nullable(&named.item, grammar, nullable) {
            break;
        }
    }
}

fn item_leading(item: &Item, grammar: &Grammar, nullable: &[bool], out: &mut FxHashSet<usize>) {
    match item {
        Item::Literal(_) | Item::TokenRef(_) | Item::Cut => {}
        Item::RuleRef(name) => {
            if let Some(id) = grammar.resolve(name) {
                out.insert(id.index());
            }
        }
        Item::Group(alternatives) => {
            for alternative in alternatives {
                alternative_leading(alternative, grammar, nullable, out);
            }
        }
        Item::Opt(inner) | Item::Repeat0(inner) | Item::Repeat1(inner) | Item::Forced(inner) => {
            item_leading(inner, grammar, nullable, out);
        }
        Item::Gather { sep, elem } => {
            item_leading(elem, grammar, nullable, out);
            if item_nullable(elem, grammar, nullable) {
                item_leading(sep, grammar, nullable, out);
            }
        }
        // A predicate consumes nothing but still enters the rule it tests.
        Item::Lookahead { inner, .. } => item_leading(inner, grammar, nullable, out),
    }
}

fn reachable(start: usize, edges: &[FxHashSet<usize>]) -> FxHashSet<usize> {
    let mut seen = FxHashSet::default();
    let mut stack: Vec<usize> = edges[start].iter().copied().collect();
    while let Some(node) = stack.pop() {
        if seen.insert(node) {
            stack.extend(edges[node].iter().copied());
        }
    }
    seen
}

/// Whether the component subgraph still has a cycle once `exclude` is
/// removed. A member whose removal breaks every cycle can serve as the
/// component's growth entry.
fn has_cycle(component: &[usize], edges: &[FxHashSet<usize>], exclude: usize) -> bool {
    const UNSEEN: u8 = 0;
    const ON_STACK: u8 = 1;
    const DONE: u8 = 2;

    let members: FxHashSet<usize> = component
        .iter()
        .copied()
        .filter(|&m| m != exclude)
        .collect();
    let mut color = vec![UNSEEN; edges.len()];

    fn visit(
        node: usize,
        members: &FxHashSet<usize>,
        edges: &[FxHashSet<usize>],
        color: &mut [u8],
    ) -> bool {
        color[node] = ON_STACK;
        for &next in &edges[node] {
            if !members.contains(&next) {
                continue;
            }
            if color[next] == ON_STACK {
                return true;
            }
            if color[next] == UNSEEN && visit(next, members, edges, color) {
                return true;
            }
        }
        color[node] = DONE;
        false
    }

    members
        .iter()
        .any(|&m| color[m] == UNSEEN && visit(m, &members, edges, &mut color))
}

fn decide_memoization(grammar: &mut Grammar) {
    for rule in grammar.rules_mut() {
        rule.memoize = if rule.leader {
            // The growth loop owns this rule's memo entry.
            if !rule.memo {
                debug!("rule {}: no-memo hint ignored for left recursion", rule.name);
            }
            true
        } else if rule.left_recursive {
            // A plainly cached result computed under an in-flight seed goes
            // stale between growth iterations.
            false
        } else {
            rule.memo
        };
    }
}
