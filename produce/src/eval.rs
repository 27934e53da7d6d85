// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Expansion of templates against a binding. Embedded expressions are
//! delegated to a pluggable [`Evaluator`] so embedders can wire in a real
//! expression language; the engine itself only knows variable lookup.

use pattern::{Binding, Piece, Template};
use thiserror::Error;

/// Resolves the embedded expressions a build file may carry inside
/// `${…}` holes.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, expr: &str, binding: &Binding) -> Result<String, Error>;
}

/// The built-in evaluator: identifiers resolve through the binding,
/// anything richer is rejected.
#[derive(Debug, Default)]
pub struct VarLookup;

impl Evaluator for VarLookup {
    fn evaluate(&self, expr: &str, binding: &Binding) -> Result<String, Error> {
        let name = expr.trim();
        binding
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnsupportedExpression(expr.to_owned()))
    }
}

/// Expand `template` with pattern holes and labels from `binding`,
/// delegating expressions to `evaluator`.
pub fn expand(template: &Template, binding: &Binding, evaluator: &dyn Evaluator) -> Result<String, ExpandError> {
    template
        .expand(|piece| match piece {
            Piece::Var(name) => binding
                .get(name)
                .cloned()
                .ok_or_else(|| Error::UnknownVariable(name.clone())),
            Piece::Expr(expr) => evaluator.evaluate(expr, binding),
            Piece::Literal(_) => unreachable!("literals need no resolution"),
        })
        .map_err(|cause| ExpandError {
            template: template.source().to_owned(),
            cause,
        })
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    #[error("unsupported expression `{0}`")]
    UnsupportedExpression(String),

    #[error("{0}")]
    Evaluator(String),
}

#[derive(Debug, Error)]
#[error("cannot expand `{template}`: {cause}")]
pub struct ExpandError {
    pub template: String,
    #[source]
    pub cause: Error,
}
