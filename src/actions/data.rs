//! Data actions: compute a value at match time and attach it to the match
//! record.

use super::{Action, ActionKind};
use crate::engine::rule::Rule;
use crate::engine::Transaction;
use crate::error::Result;

/// `logdata:<text>` — macro-expanded at match time and attached to the
/// transaction's next match record.
#[derive(Default)]
pub struct LogData {
    data: String,
}

impl Action for LogData {
    fn name(&self) -> &'static str {
        "logdata"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Data
    }

    fn init(&mut self, _rule: &mut Rule, param: &str) -> Result<()> {
        self.data = param.to_string();
        Ok(())
    }

    fn evaluate(&self, _rule: &Rule, tx: &mut Transaction) {
        let expanded = tx.macro_expand(&self.data);
        tx.set_logdata(expanded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Ruleset, Waf};

    #[test]
    fn test_logdata_expands_macros() {
        let mut tx = Waf::new(Ruleset::new()).transaction();
        tx.get_collection("tx").set("blocked", "1.2.3.4");
        let mut action = LogData::default();
        let mut rule = Rule::default();
        action.init(&mut rule, "client %{tx.blocked}").unwrap();
        action.evaluate(&rule, &mut tx);
        assert_eq!(tx.take_logdata(), Some("client 1.2.3.4".to_string()));
    }
}
