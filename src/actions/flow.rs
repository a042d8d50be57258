//! Flow actions: adjust the phase driver's skip state.
//!
//! The driver consumes these hooks; both reset at phase entry.

use super::{Action, ActionKind};
use crate::engine::rule::Rule;
use crate::engine::Transaction;
use crate::error::{Error, Result};

/// `skip:<n>` — skip the next n rules in the current phase.
#[derive(Default)]
pub struct Skip {
    count: u32,
}

impl Action for Skip {
    fn name(&self) -> &'static str {
        "skip"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Flow
    }

    fn init(&mut self, _rule: &mut Rule, param: &str) -> Result<()> {
        self.count = param
            .trim()
            .parse()
            .map_err(|_| Error::InvalidActionArgument {
                action: "skip".to_string(),
                message: format!("not a count: {param}"),
            })?;
        Ok(())
    }

    fn evaluate(&self, _rule: &Rule, tx: &mut Transaction) {
        tx.set_skip(self.count);
    }
}

/// `skipAfter:<marker>` — jump past the named marker within the current
/// phase.
#[derive(Default)]
pub struct SkipAfter {
    marker: String,
}

impl Action for SkipAfter {
    fn name(&self) -> &'static str {
        "skipAfter"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Flow
    }

    fn init(&mut self, _rule: &mut Rule, param: &str) -> Result<()> {
        if param.trim().is_empty() {
            return Err(Error::InvalidActionArgument {
                action: "skipAfter".to_string(),
                message: "empty marker".to_string(),
            });
        }
        self.marker = param.trim().to_string();
        Ok(())
    }

    fn evaluate(&self, _rule: &Rule, tx: &mut Transaction) {
        tx.set_skip_after(&self.marker);
    }
}
