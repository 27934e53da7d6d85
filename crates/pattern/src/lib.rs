// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The `${name}` pattern and template language shared by target patterns,
//! prerequisite templates and recipes.

use std::collections::HashMap;

use thiserror::Error;

pub use self::pattern::Pattern;
pub use self::template::{Piece, Template};

mod pattern;
mod template;
mod token;

/// Values captured from a pattern match, later extended with per-rule
/// attribute labels during planning.
pub type Binding = HashMap<String, String>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unclosed brace at offset {0}")]
    UnclosedBrace(usize),

    #[error("bare `$` at offset {0}, use `$$` for a literal dollar")]
    BareDollar(usize),

    #[error("empty `${{}}` at offset {0}")]
    EmptyHole(usize),

    #[error("`{0}` is not a valid hole name")]
    InvalidHole(String),

    #[error("invalid regex: {0}")]
    Regex(#[from] regex::Error),
}

/// Hole names are restricted so they cannot be confused with embedded
/// expressions.
fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
