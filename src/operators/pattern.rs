//! Pattern matching operators (@rx, @pm).

use super::traits::Operator;
use crate::engine::Transaction;
use crate::error::{Error, Result};
use aho_corasick::AhoCorasick;
use regex::Regex;

/// Regular expression operator (@rx).
///
/// When the transaction is capturable, a match registers the full match and
/// its groups into the `tx:0`..`tx:9` capture slots.
pub struct Rx {
    pattern: Regex,
}

impl Rx {
    /// Compile the pattern.
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| Error::RegexCompile {
            pattern: pattern.to_string(),
            source: e,
        })?;
        Ok(Self { pattern })
    }
}

impl Operator for Rx {
    fn evaluate(&self, tx: &mut Transaction, value: &str) -> bool {
        let Some(caps) = self.pattern.captures(value) else {
            return false;
        };
        if tx.is_capturable() {
            for (slot, group) in caps.iter().take(10).enumerate() {
                if let Some(m) = group {
                    tx.capture_field(slot, m.as_str());
                }
            }
        }
        true
    }

    fn name(&self) -> &'static str {
        "rx"
    }

    fn supports_capture(&self) -> bool {
        true
    }
}

/// Phrase match operator (@pm): case-insensitive multi-pattern search.
pub struct Pm {
    automaton: AhoCorasick,
}

impl Pm {
    /// Build the automaton from a space-separated phrase list.
    pub fn new(phrases: &str) -> Result<Self> {
        let patterns: Vec<&str> = phrases.split_whitespace().collect();
        if patterns.is_empty() {
            return Err(Error::PatternSet {
                message: "empty phrase list".to_string(),
            });
        }
        let automaton = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(&patterns)
            .map_err(|e| Error::PatternSet {
                message: e.to_string(),
            })?;
        Ok(Self { automaton })
    }
}

impl Operator for Pm {
    fn evaluate(&self, _tx: &mut Transaction, value: &str) -> bool {
        self.automaton.is_match(value)
    }

    fn name(&self) -> &'static str {
        "pm"
    }
}
