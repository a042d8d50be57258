//! Non-disruptive actions: mutate transaction state, never interrupt.

use super::{Action, ActionKind};
use crate::engine::rule::Rule;
use crate::engine::Transaction;
use crate::error::{Error, Result};

fn bad_arg(action: &'static str, message: impl Into<String>) -> Error {
    Error::InvalidActionArgument {
        action: action.to_string(),
        message: message.into(),
    }
}

/// How a `setvar` mutates its target.
#[derive(Debug, Clone, Default)]
enum SetVarOp {
    /// Assign the (macro-expanded) value.
    #[default]
    Set,
    /// Add the numeric value to the current one.
    Increment,
    /// Subtract the numeric value.
    Decrement,
    /// Remove the key.
    Delete,
}

/// `setvar:tx.score=+5` — set, increment, decrement or delete a collection
/// entry. Key and value are macro-expanded per transaction.
#[derive(Default)]
pub struct SetVar {
    collection: String,
    key: String,
    value: String,
    op: SetVarOp,
}

impl Action for SetVar {
    fn name(&self) -> &'static str {
        "setvar"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::NonDisruptive
    }

    fn init(&mut self, _rule: &mut Rule, param: &str) -> Result<()> {
        let param = param.trim();
        let (target, value) = match param.strip_prefix('!') {
            Some(target) => {
                self.op = SetVarOp::Delete;
                (target, "")
            }
            None => {
                let (target, value) = param
                    .split_once('=')
                    .ok_or_else(|| bad_arg("setvar", format!("missing '=': {param}")))?;
                if let Some(v) = value.strip_prefix('+') {
                    self.op = SetVarOp::Increment;
                    (target, v)
                } else if let Some(v) = value.strip_prefix('-') {
                    self.op = SetVarOp::Decrement;
                    (target, v)
                } else {
                    self.op = SetVarOp::Set;
                    (target, value)
                }
            }
        };
        let (collection, key) = target
            .split_once('.')
            .ok_or_else(|| bad_arg("setvar", format!("target must be collection.key: {target}")))?;
        self.collection = collection.to_ascii_lowercase();
        self.key = key.to_string();
        self.value = value.to_string();
        Ok(())
    }

    fn evaluate(&self, _rule: &Rule, tx: &mut Transaction) {
        let key = tx.macro_expand(&self.key);
        match self.op {
            SetVarOp::Set => {
                let value = tx.macro_expand(&self.value);
                tx.get_collection(&self.collection).set(key, value);
            }
            SetVarOp::Increment => {
                let amount = tx.macro_expand(&self.value).parse().unwrap_or(0);
                tx.get_collection(&self.collection).increment(&key, amount);
            }
            SetVarOp::Decrement => {
                let amount: i64 = tx.macro_expand(&self.value).parse().unwrap_or(0);
                tx.get_collection(&self.collection).increment(&key, -amount);
            }
            SetVarOp::Delete => {
                tx.get_collection(&self.collection).remove(&key);
            }
        }
    }
}

/// `capture` — lets this rule's operator fill the `tx:0`..`tx:9` slots.
pub struct Capture;

impl Action for Capture {
    fn name(&self) -> &'static str {
        "capture"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::NonDisruptive
    }

    fn init(&mut self, rule: &mut Rule, _param: &str) -> Result<()> {
        rule.capture = true;
        Ok(())
    }
}

/// Parsed `ctl` operation.
#[derive(Debug, Clone, Default)]
pub enum CtlOp {
    /// No-op placeholder before `init`.
    #[default]
    None,
    /// `ctl:ruleRemoveById=<id>` — skip the rule for the rest of the
    /// transaction.
    RuleRemoveById(u64),
    /// `ctl:ruleRemoveTargetById=<id>;<collection>:<key>` — exclude a target
    /// from the rule for the rest of the transaction.
    RuleRemoveTargetById {
        /// Rule the exclusion applies to.
        id: u64,
        /// Collection name (lowercase).
        collection: String,
        /// Key to subtract.
        key: String,
    },
    /// `ctl:auditEngine=On|Off` — toggle auditing for this transaction.
    AuditEngine(bool),
}

/// `ctl:<option>=<value>` — per-transaction engine control.
#[derive(Default)]
pub struct Ctl {
    op: CtlOp,
}

impl Action for Ctl {
    fn name(&self) -> &'static str {
        "ctl"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::NonDisruptive
    }

    fn init(&mut self, _rule: &mut Rule, param: &str) -> Result<()> {
        let (option, value) = param
            .split_once('=')
            .ok_or_else(|| bad_arg("ctl", format!("missing '=': {param}")))?;
        self.op = match option.trim().to_ascii_lowercase().as_str() {
            "ruleremovebyid" => CtlOp::RuleRemoveById(
                value
                    .trim()
                    .parse()
                    .map_err(|_| bad_arg("ctl", format!("not a rule id: {value}")))?,
            ),
            "ruleremovetargetbyid" => {
                let (id, target) = value
                    .split_once(';')
                    .ok_or_else(|| bad_arg("ctl", format!("missing ';<target>': {value}")))?;
                let id = id
                    .trim()
                    .parse()
                    .map_err(|_| bad_arg("ctl", format!("not a rule id: {id}")))?;
                let (collection, key) = target
                    .split_once(':')
                    .ok_or_else(|| bad_arg("ctl", format!("target must be collection:key: {target}")))?;
                CtlOp::RuleRemoveTargetById {
                    id,
                    collection: collection.trim().to_ascii_lowercase(),
                    key: key.trim().to_string(),
                }
            }
            "auditengine" => CtlOp::AuditEngine(value.trim().eq_ignore_ascii_case("on")),
            other => return Err(bad_arg("ctl", format!("unknown option: {other}"))),
        };
        Ok(())
    }

    fn evaluate(&self, _rule: &Rule, tx: &mut Transaction) {
        match &self.op {
            CtlOp::None => {}
            CtlOp::RuleRemoveById(id) => tx.remove_rule(*id),
            CtlOp::RuleRemoveTargetById {
                id,
                collection,
                key,
            } => tx.remove_target(*id, collection, key),
            CtlOp::AuditEngine(on) => tx.set_audit(*on),
        }
    }
}

/// `log` — record the rule in `matched_rules` on match.
pub struct Log;

impl Action for Log {
    fn name(&self) -> &'static str {
        "log"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::NonDisruptive
    }

    fn init(&mut self, rule: &mut Rule, _param: &str) -> Result<()> {
        rule.log = true;
        Ok(())
    }
}

/// `nolog` — suppress the `matched_rules` record.
pub struct NoLog;

impl Action for NoLog {
    fn name(&self) -> &'static str {
        "nolog"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::NonDisruptive
    }

    fn init(&mut self, rule: &mut Rule, _param: &str) -> Result<()> {
        rule.log = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Ruleset, Waf};

    fn tx() -> Transaction {
        Waf::new(Ruleset::new()).transaction()
    }

    fn setvar(param: &str) -> SetVar {
        let mut action = SetVar::default();
        action.init(&mut Rule::default(), param).unwrap();
        action
    }

    #[test]
    fn test_setvar_set_and_delete() {
        let mut tx = tx();
        let rule = Rule::default();
        setvar("tx.logged=1").evaluate(&rule, &mut tx);
        assert_eq!(tx.get_collection("tx").first_string("logged"), "1");
        setvar("!tx.logged").evaluate(&rule, &mut tx);
        assert_eq!(tx.get_collection("tx").first_string("logged"), "");
    }

    #[test]
    fn test_setvar_arithmetic() {
        let mut tx = tx();
        let rule = Rule::default();
        setvar("tx.score=+5").evaluate(&rule, &mut tx);
        setvar("tx.score=+3").evaluate(&rule, &mut tx);
        setvar("tx.score=-2").evaluate(&rule, &mut tx);
        assert_eq!(tx.get_collection("tx").first_int("score"), 6);
    }

    #[test]
    fn test_setvar_macro_value() {
        let mut tx = tx();
        tx.get_collection("tx").set("base", "7");
        setvar("tx.copy=%{tx.base}").evaluate(&Rule::default(), &mut tx);
        assert_eq!(tx.get_collection("tx").first_string("copy"), "7");
    }

    #[test]
    fn test_setvar_bad_params() {
        let mut rule = Rule::default();
        assert!(SetVar::default().init(&mut rule, "noequals").is_err());
        assert!(SetVar::default().init(&mut rule, "nodot=1").is_err());
    }

    #[test]
    fn test_ctl_rule_remove_by_id() {
        let mut tx = tx();
        let mut action = Ctl::default();
        action.init(&mut Rule::default(), "ruleRemoveById=100").unwrap();
        action.evaluate(&Rule::default(), &mut tx);
        assert!(tx.rule_removed(100));
    }

    #[test]
    fn test_ctl_rule_remove_target() {
        let mut tx = tx();
        let mut action = Ctl::default();
        action
            .init(&mut Rule::default(), "ruleRemoveTargetById=200;ARGS:pw")
            .unwrap();
        action.evaluate(&Rule::default(), &mut tx);
        assert_eq!(tx.removed_targets_for(200, "args"), vec!["pw".to_string()]);
        assert!(tx.removed_targets_for(200, "request_headers").is_empty());
    }

    #[test]
    fn test_log_flags() {
        let mut rule = Rule::default();
        Log.init(&mut rule, "").unwrap();
        assert!(rule.log);
        NoLog.init(&mut rule, "").unwrap();
        assert!(!rule.log);
    }
}
