//! Operator registry and built-in operators.
//!
//! Operators are resolved once at rule-compile time; the registry maps the
//! rule-language name to a constructor through a perfect-hash table.

mod comparison;
mod network;
mod pattern;
mod traits;
mod validation;

pub use comparison::{
    BeginsWith, Contains, EndsWith, Eq, Ge, Gt, Le, Lt, Ne, Streq, Within,
};
pub use network::IpMatch;
pub use pattern::{Pm, Rx};
pub use traits::Operator;
pub use validation::{ValidateUrlEncoding, ValidateUtf8Encoding};

use crate::engine::Transaction;
use crate::error::{Error, Result};
use phf::phf_map;
use std::sync::Arc;

/// Operator constructors known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperatorKind {
    Rx,
    Pm,
    Streq,
    Contains,
    Within,
    BeginsWith,
    EndsWith,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    IpMatch,
    ValidateUrlEncoding,
    ValidateUtf8Encoding,
    UnconditionalMatch,
    NoMatch,
}

/// Perfect hash map for O(1) operator name lookup (names are matched
/// case-insensitively against their lowercase form).
static OPERATOR_MAP: phf::Map<&'static str, OperatorKind> = phf_map! {
    "rx" => OperatorKind::Rx,
    "pm" => OperatorKind::Pm,
    "streq" => OperatorKind::Streq,
    "contains" => OperatorKind::Contains,
    "within" => OperatorKind::Within,
    "beginswith" => OperatorKind::BeginsWith,
    "endswith" => OperatorKind::EndsWith,
    "eq" => OperatorKind::Eq,
    "ne" => OperatorKind::Ne,
    "gt" => OperatorKind::Gt,
    "ge" => OperatorKind::Ge,
    "lt" => OperatorKind::Lt,
    "le" => OperatorKind::Le,
    "ipmatch" => OperatorKind::IpMatch,
    "validateurlencoding" => OperatorKind::ValidateUrlEncoding,
    "validateutf8encoding" => OperatorKind::ValidateUtf8Encoding,
    "unconditionalmatch" => OperatorKind::UnconditionalMatch,
    "nomatch" => OperatorKind::NoMatch,
};

/// Create an operator from its registry name and compile-time argument.
///
/// The argument is captured verbatim; operators that accept macros expand
/// them against the transaction at evaluation time.
pub fn create_operator(name: &str, argument: &str) -> Result<Arc<dyn Operator>> {
    let lower = name.to_ascii_lowercase();
    let kind = OPERATOR_MAP
        .get(lower.as_str())
        .copied()
        .ok_or_else(|| Error::UnknownOperator {
            name: name.to_string(),
        })?;

    Ok(match kind {
        OperatorKind::Rx => Arc::new(Rx::new(argument)?),
        OperatorKind::Pm => Arc::new(Pm::new(argument)?),
        OperatorKind::Streq => Arc::new(Streq::new(argument)),
        OperatorKind::Contains => Arc::new(Contains::new(argument)),
        OperatorKind::Within => Arc::new(Within::new(argument)),
        OperatorKind::BeginsWith => Arc::new(BeginsWith::new(argument)),
        OperatorKind::EndsWith => Arc::new(EndsWith::new(argument)),
        OperatorKind::Eq => Arc::new(Eq::new(argument)),
        OperatorKind::Ne => Arc::new(Ne::new(argument)),
        OperatorKind::Gt => Arc::new(Gt::new(argument)),
        OperatorKind::Ge => Arc::new(Ge::new(argument)),
        OperatorKind::Lt => Arc::new(Lt::new(argument)),
        OperatorKind::Le => Arc::new(Le::new(argument)),
        OperatorKind::IpMatch => Arc::new(IpMatch::new(argument)?),
        OperatorKind::ValidateUrlEncoding => Arc::new(ValidateUrlEncoding),
        OperatorKind::ValidateUtf8Encoding => Arc::new(ValidateUtf8Encoding),
        OperatorKind::UnconditionalMatch => Arc::new(UnconditionalMatch),
        OperatorKind::NoMatch => Arc::new(NoMatch),
    })
}

/// Operator that always matches. Used for action-only rules.
pub struct UnconditionalMatch;

impl Operator for UnconditionalMatch {
    fn evaluate(&self, _tx: &mut Transaction, _value: &str) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "unconditionalMatch"
    }
}

/// Operator that never matches.
pub struct NoMatch;

impl Operator for NoMatch {
    fn evaluate(&self, _tx: &mut Transaction, _value: &str) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "noMatch"
    }
}
