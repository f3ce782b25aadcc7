//! Filter compilation and the escape tables (§4.1, §6).
//!
//! A [`Filter`] is the normalized AST; [`Filter::compile`] is a pure
//! function of that AST, so `compile(parse(f)) == compile(parse(compile(parse(f))))`
//! holds by construction — there is no hidden mutable state threaded
//! through compilation.

use crate::error::{Error, Result};

/// Characters escaped with a preceding backslash in tag values and BM25
/// query text (§6's escape table). Applies to both escapers; the spec
/// leaves the exact subset split between the tag and full-text escaper
/// undocumented, so both escapers use the same full set here (documented
/// in DESIGN.md).
const ESCAPED_CHARS: &[char] = &[
    ',', '.', '<', '>', '{', '}', '"', '\'', ':', ';', '!', '@', '#', '$', '%', '^', '&', '*', '(',
    ')', '-', '+', '=', '~', '[', ']', '|', '/', ' ', '\\',
];

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ESCAPED_CHARS.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Escapes a value used inside a `@field:{value}` tag match.
#[must_use]
pub fn escape_tag(value: &str) -> String {
    escape(value)
}

/// Escapes free text used inside a `@__content:(text)` BM25 match.
#[must_use]
pub fn escape_query(value: &str) -> String {
    escape(value)
}

/// One filter condition over a declared field.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterCondition {
    /// Exact match against a tag field.
    Tag {
        /// Declared field name.
        name: String,
        /// Value to match.
        value: String,
    },
    /// Set-membership match against a tag field.
    TagIn {
        /// Declared field name.
        name: String,
        /// Candidate values (OR'd together).
        values: Vec<String>,
    },
    /// Range match against a numeric field. At most one of `gt`/`gte` and
    /// one of `lt`/`lte` may be set (validated at compile time).
    NumericRange {
        /// Declared field name.
        name: String,
        /// Exclusive lower bound.
        gt: Option<f64>,
        /// Inclusive lower bound.
        gte: Option<f64>,
        /// Exclusive upper bound.
        lt: Option<f64>,
        /// Inclusive upper bound.
        lte: Option<f64>,
    },
}

impl FilterCondition {
    fn compile(&self) -> Result<String> {
        match self {
            Self::Tag { name, value } => Ok(format!("@{name}:{{{}}}", escape_tag(value))),
            Self::TagIn { name, values } => {
                let joined = values
                    .iter()
                    .map(|v| escape_tag(v))
                    .collect::<Vec<_>>()
                    .join("|");
                Ok(format!("@{name}:{{{joined}}}"))
            }
            Self::NumericRange {
                name,
                gt,
                gte,
                lt,
                lte,
            } => {
                if gt.is_some() && gte.is_some() {
                    return Err(Error::InvalidSchema(format!(
                        "numeric filter on '{name}' sets both gt and gte"
                    )));
                }
                if lt.is_some() && lte.is_some() {
                    return Err(Error::InvalidSchema(format!(
                        "numeric filter on '{name}' sets both lt and lte"
                    )));
                }
                let min = match (gt, gte) {
                    (Some(v), None) => format!("({v}"),
                    (None, Some(v)) => format!("{v}"),
                    (None, None) => "-inf".to_string(),
                    (Some(_), Some(_)) => unreachable!("checked above"),
                };
                let max = match (lt, lte) {
                    (Some(v), None) => format!("({v}"),
                    (None, Some(v)) => format!("{v}"),
                    (None, None) => "+inf".to_string(),
                    (Some(_), Some(_)) => unreachable!("checked above"),
                };
                Ok(format!("@{name}:[{min} {max}]"))
            }
        }
    }
}

/// A normalized filter AST: `must` conditions are ANDed, `should`
/// conditions are ORed as a single group, `must_not` conditions are each
/// negated (§4.1).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    /// Conditions that must all match.
    pub must: Vec<FilterCondition>,
    /// Conditions where at least one must match.
    pub should: Vec<FilterCondition>,
    /// Conditions that must not match.
    pub must_not: Vec<FilterCondition>,
}

impl Filter {
    /// True if the filter has no conditions at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.should.is_empty() && self.must_not.is_empty()
    }

    /// Compiles the filter to the engine's query-string syntax. An empty
    /// filter compiles to `*` (match everything).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchema`] if a numeric condition sets both
    /// bounds on the same side (`gt` and `gte`, or `lt` and `lte`).
    pub fn compile(&self) -> Result<String> {
        if self.is_empty() {
            return Ok("*".to_string());
        }

        let mut parts = Vec::new();
        for cond in &self.must {
            parts.push(cond.compile()?);
        }
        if !self.should.is_empty() {
            let mut should_parts = Vec::with_capacity(self.should.len());
            for cond in &self.should {
                should_parts.push(cond.compile()?);
            }
            parts.push(format!("({})", should_parts.join(" | ")));
        }
        for cond in &self.must_not {
            parts.push(format!("-{}", cond.compile()?));
        }
        Ok(parts.join(" "))
    }
}

/// Compiles the KNN query string: `([<filter>])=>[KNN k @vector $BLOB]`.
#[must_use]
pub fn compile_knn_query(filter: &str, k: usize) -> String {
    format!("({filter})=>[KNN {k} @vector $BLOB]")
}

/// Compiles the BM25 query string: the escaped query wrapped as
/// `@__content:(<escaped>)`, combined with the filter string.
#[must_use]
pub fn compile_bm25_query(filter: &str, query: &str) -> String {
    let escaped = escape_query(query);
    if filter == "*" {
        format!("@__content:({escaped})")
    } else {
        format!("{filter} @__content:({escaped})")
    }
}
