// peggen. A PEG parser compiler
// Copyright (c) 2024 peggen contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use thiserror::Error;

/// Hard, non-backtrackable syntax error raised by a forced match (`&&e`)
/// whose inner expression failed.
///
/// Ordinary alternative failure is not an error — it is the `NotMatched`
/// outcome consumed internally by ordered choice. A `SyntaxError` is the one
/// runtime condition that bypasses backtracking entirely: it unwinds through
/// every enclosing rule frame to the top-level caller, which renders a
/// diagnostic and aborts the parse.
#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
#[error("syntax error at token {position}: expected {expected}")]
pub struct SyntaxError {
    /// Index of the token the parse stopped at.
    pub position: usize,
    /// Rendered form of the expression that was required here.
    pub expected: String,
}

impl SyntaxError {
    pub fn new(position: usize, expected: impl Into<String>) -> SyntaxError {
        SyntaxError {
            position,
            expected: expected.into(),
        }
    }
}
