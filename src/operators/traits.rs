//! Operator trait definition.

use crate::engine::Transaction;

/// A named predicate comparing a transformed value against the operator's
/// compile-time argument.
///
/// Operators may consult the transaction — to expand macros in their
/// argument or to register capture groups — but must not mutate collections
/// directly. Negation is applied per argument in the rule layer, and an
/// evaluation error degrades to "did not match".
pub trait Operator: Send + Sync {
    /// Evaluate the operator against a single transformed value.
    fn evaluate(&self, tx: &mut Transaction, value: &str) -> bool;

    /// Registry name of the operator.
    fn name(&self) -> &'static str;

    /// Whether this operator can produce capture groups.
    fn supports_capture(&self) -> bool {
        false
    }
}
