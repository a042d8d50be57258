//! String and numeric comparison operators.
//!
//! All of these accept `%{...}` macros in their argument, expanded against
//! the transaction on every evaluation.

use super::traits::Operator;
use crate::engine::Transaction;
use tracing::debug;

/// String equality (@streq).
pub struct Streq {
    arg: String,
}

impl Streq {
    /// Create with the expected string.
    pub fn new(arg: &str) -> Self {
        Self {
            arg: arg.to_string(),
        }
    }
}

impl Operator for Streq {
    fn evaluate(&self, tx: &mut Transaction, value: &str) -> bool {
        tx.macro_expand(&self.arg) == value
    }

    fn name(&self) -> &'static str {
        "streq"
    }
}

/// Substring search (@contains).
pub struct Contains {
    arg: String,
}

impl Contains {
    /// Create with the needle to search for.
    pub fn new(arg: &str) -> Self {
        Self {
            arg: arg.to_string(),
        }
    }
}

impl Operator for Contains {
    fn evaluate(&self, tx: &mut Transaction, value: &str) -> bool {
        value.contains(&tx.macro_expand(&self.arg))
    }

    fn name(&self) -> &'static str {
        "contains"
    }
}

/// Reverse containment (@within): the value appears inside the argument.
pub struct Within {
    arg: String,
}

impl Within {
    /// Create with the haystack set.
    pub fn new(arg: &str) -> Self {
        Self {
            arg: arg.to_string(),
        }
    }
}

impl Operator for Within {
    fn evaluate(&self, tx: &mut Transaction, value: &str) -> bool {
        !value.is_empty() && tx.macro_expand(&self.arg).contains(value)
    }

    fn name(&self) -> &'static str {
        "within"
    }
}

/// Prefix match (@beginsWith).
pub struct BeginsWith {
    arg: String,
}

impl BeginsWith {
    /// Create with the expected prefix.
    pub fn new(arg: &str) -> Self {
        Self {
            arg: arg.to_string(),
        }
    }
}

impl Operator for BeginsWith {
    fn evaluate(&self, tx: &mut Transaction, value: &str) -> bool {
        value.starts_with(&tx.macro_expand(&self.arg))
    }

    fn name(&self) -> &'static str {
        "beginsWith"
    }
}

/// Suffix match (@endsWith).
pub struct EndsWith {
    arg: String,
}

impl EndsWith {
    /// Create with the expected suffix.
    pub fn new(arg: &str) -> Self {
        Self {
            arg: arg.to_string(),
        }
    }
}

impl Operator for EndsWith {
    fn evaluate(&self, tx: &mut Transaction, value: &str) -> bool {
        value.ends_with(&tx.macro_expand(&self.arg))
    }

    fn name(&self) -> &'static str {
        "endsWith"
    }
}

/// Shared numeric evaluation: expand macros in the argument, parse both
/// sides as i64, and compare. A non-numeric side means no match.
fn numeric_compare(
    tx: &mut Transaction,
    arg: &str,
    value: &str,
    op_name: &'static str,
    cmp: fn(i64, i64) -> bool,
) -> bool {
    let expanded = tx.macro_expand(arg);
    let target: i64 = match expanded.parse() {
        Ok(n) => n,
        Err(_) => {
            debug!(operator = op_name, argument = %expanded, "non-numeric operator argument");
            return false;
        }
    };
    match value.parse::<i64>() {
        Ok(n) => cmp(n, target),
        Err(_) => false,
    }
}

macro_rules! numeric_operator {
    ($(#[$doc:meta])* $name:ident, $op_name:literal, $cmp:expr) => {
        $(#[$doc])*
        pub struct $name {
            arg: String,
        }

        impl $name {
            /// Create with the numeric argument (may be a macro).
            pub fn new(arg: &str) -> Self {
                Self {
                    arg: arg.to_string(),
                }
            }
        }

        impl Operator for $name {
            fn evaluate(&self, tx: &mut Transaction, value: &str) -> bool {
                numeric_compare(tx, &self.arg, value, $op_name, $cmp)
            }

            fn name(&self) -> &'static str {
                $op_name
            }
        }
    };
}

numeric_operator!(
    /// Numeric equality (@eq).
    Eq, "eq", |n, t| n == t
);
numeric_operator!(
    /// Numeric inequality (@ne).
    Ne, "ne", |n, t| n != t
);
numeric_operator!(
    /// Greater than (@gt).
    Gt, "gt", |n, t| n > t
);
numeric_operator!(
    /// Greater than or equal (@ge).
    Ge, "ge", |n, t| n >= t
);
numeric_operator!(
    /// Less than (@lt).
    Lt, "lt", |n, t| n < t
);
numeric_operator!(
    /// Less than or equal (@le).
    Le, "le", |n, t| n <= t
);
