// peggen. A PEG parser compiler
// Copyright (c) 2024 peggen contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use peggen::Token;

/// Semantic values the interpreter threads through rules and actions.
///
/// The core never interprets these beyond constructing them: tokens come
/// from consumed input, sequences from repetitions and default actions, and
/// nodes from whatever an action handler decides to build.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Value {
    /// Zero-width result: a missed optional or an empty default sequence
    /// context.
    Empty,
    /// A single consumed token.
    Token(Token),
    /// Ordered sequence from repetitions, gathers and default actions.
    Seq(Vec<Value>),
    /// Labeled node built by an action handler.
    Node {
        label: String,
        children: Vec<Value>,
    },
}

impl Value {
    pub fn node(label: impl Into<String>, children: Vec<Value>) -> Value {
        Value::Node {
            label: label.into(),
            children,
        }
    }

    /// The token behind a [`Value::Token`].
    pub fn as_token(&self) -> Option<&Token> {
        match self {
            Value::Token(token) => Some(token),
            _ => None,
        }
    }
}

/// A value paired with the binding name the alternative's action sees.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BoundValue {
    pub name: Option<String>,
    pub value: Value,
}

impl BoundValue {
    /// Looks a binding up by name in an action's argument list.
    pub fn find<'a>(values: &'a [BoundValue], name: &str) -> Option<&'a Value> {
        values
            .iter()
            .find(|bound| bound.name.as_deref() == Some(name))
            .map(|bound| &bound.value)
    }
}
