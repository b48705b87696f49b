//! Regression formula construction for per-feature count models.

use crate::data::GroupIndex;
use serde::{Deserialize, Serialize};

/// Response variable name used in every per-feature formula.
pub const RESPONSE: &str = "expr";

/// Name of the library-size column in the per-feature dataset.
pub const LIB_SIZE: &str = "libSize";

/// Name of the subject grouping column in the per-feature dataset.
pub const GROUPING: &str = "ID";

/// A term in a model formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Term {
    /// Main effect of a covariate.
    Main(String),
    /// Fixed-coefficient offset `offset(log(var))`.
    LogOffset(String),
    /// Random intercept `(1 | group)`.
    RandomIntercept(String),
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Term::Main(v) => write!(f, "{}", v),
            Term::LogOffset(v) => write!(f, "offset(log({}))", v),
            Term::RandomIntercept(g) => write!(f, "(1 | {})", g),
        }
    }
}

/// Regression specification `expr ~ c1 + ... + ck [+ offset] [+ (1 | ID)]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFormula {
    /// Response variable.
    pub response: String,
    /// Terms in order: covariates, then offset, then random intercept.
    pub terms: Vec<Term>,
}

impl ModelFormula {
    /// Build the per-feature formula.
    ///
    /// The library-size offset is dropped when every library size is equal,
    /// so a constant offset never enters the model. A random intercept by
    /// `ID` is appended when any ID repeats.
    pub fn build(covariates: &[String], lib_size: &[f64], ids: &[String]) -> Self {
        let mut terms: Vec<Term> = covariates.iter().cloned().map(Term::Main).collect();

        if has_varying_values(lib_size) {
            terms.push(Term::LogOffset(LIB_SIZE.to_string()));
        }
        if has_repeated_ids(ids) {
            terms.push(Term::RandomIntercept(GROUPING.to_string()));
        }

        Self {
            response: RESPONSE.to_string(),
            terms,
        }
    }

    /// Covariate names in order.
    pub fn covariates(&self) -> Vec<&str> {
        self.terms
            .iter()
            .filter_map(|t| match t {
                Term::Main(v) => Some(v.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Whether the library-size offset is part of the model.
    pub fn has_offset(&self) -> bool {
        self.terms.iter().any(|t| matches!(t, Term::LogOffset(_)))
    }

    /// Whether the formula carries a random intercept.
    pub fn has_random_intercept(&self) -> bool {
        self.terms.iter().any(|t| matches!(t, Term::RandomIntercept(_)))
    }
}

impl std::fmt::Display for ModelFormula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let term_strs: Vec<String> = self.terms.iter().map(|t| t.to_string()).collect();
        write!(f, "{} ~ {}", self.response, term_strs.join(" + "))
    }
}

/// True when the slice holds more than one distinct value.
pub fn has_varying_values(values: &[f64]) -> bool {
    match values.first() {
        Some(first) => values.iter().any(|v| v != first),
        None => false,
    }
}

/// True when at least one ID occurs more than once.
pub fn has_repeated_ids(ids: &[String]) -> bool {
    !GroupIndex::from_ids(ids).all_distinct()
}
