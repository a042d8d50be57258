//! Encoding validation operators.
//!
//! These match when the value is *invalid*, so rules can block malformed
//! encodings.

use super::traits::Operator;
use crate::engine::Transaction;

/// Matches values containing broken percent-encoding (@validateUrlEncoding).
pub struct ValidateUrlEncoding;

impl Operator for ValidateUrlEncoding {
    fn evaluate(&self, _tx: &mut Transaction, value: &str) -> bool {
        !url_encoding_is_valid(value)
    }

    fn name(&self) -> &'static str {
        "validateUrlEncoding"
    }
}

/// Matches values containing byte sequences a strict UTF-8 decoder would
/// reject (@validateUtf8Encoding).
pub struct ValidateUtf8Encoding;

impl Operator for ValidateUtf8Encoding {
    fn evaluate(&self, _tx: &mut Transaction, value: &str) -> bool {
        !utf8_is_clean(value)
    }

    fn name(&self) -> &'static str {
        "validateUtf8Encoding"
    }
}

fn url_encoding_is_valid(s: &str) -> bool {
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            continue;
        }
        match (chars.next(), chars.next()) {
            (Some(h), Some(l)) if h.is_ascii_hexdigit() && l.is_ascii_hexdigit() => {}
            _ => return false,
        }
    }
    true
}

fn utf8_is_clean(s: &str) -> bool {
    // A &str is already valid UTF-8; what remains detectable are NUL bytes
    // and lead bytes that only occur in overlong or out-of-range sequences
    // smuggled through a lossy decode.
    if s.contains('\0') {
        return false;
    }
    s.bytes().all(|b| b != 0xC0 && b != 0xC1 && b < 0xF5)
}
