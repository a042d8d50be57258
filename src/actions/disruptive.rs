//! Disruptive actions: latch the transaction's interruption.
//!
//! Only the head rule of a fully matched chain executes these. The first
//! interruption wins; later attempts are silently ignored.

use super::{Action, ActionKind};
use crate::engine::interruption::DisruptionKind;
use crate::engine::rule::Rule;
use crate::engine::Transaction;
use crate::error::{Error, Result};

/// `deny` — refuse the request with the rule's status (403 by default).
pub struct Deny;

impl Action for Deny {
    fn name(&self) -> &'static str {
        "deny"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Disruptive
    }

    fn init(&mut self, rule: &mut Rule, _param: &str) -> Result<()> {
        rule.disruptive_action = DisruptionKind::Deny;
        Ok(())
    }

    fn evaluate(&self, rule: &Rule, tx: &mut Transaction) {
        let status = if rule.status != 0 { rule.status } else { 403 };
        tx.interrupt(DisruptionKind::Deny, status, "", rule.id);
    }
}

/// `drop` — close the connection without a response.
pub struct Drop;

impl Action for Drop {
    fn name(&self) -> &'static str {
        "drop"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Disruptive
    }

    fn init(&mut self, rule: &mut Rule, _param: &str) -> Result<()> {
        rule.disruptive_action = DisruptionKind::Drop;
        Ok(())
    }

    fn evaluate(&self, rule: &Rule, tx: &mut Transaction) {
        let status = if rule.status != 0 { rule.status } else { 444 };
        tx.interrupt(DisruptionKind::Drop, status, "", rule.id);
    }
}

/// `block` — disrupt with the engine's configured default status.
pub struct Block;

impl Action for Block {
    fn name(&self) -> &'static str {
        "block"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Disruptive
    }

    fn init(&mut self, rule: &mut Rule, _param: &str) -> Result<()> {
        rule.disruptive_action = DisruptionKind::Block;
        Ok(())
    }

    fn evaluate(&self, rule: &Rule, tx: &mut Transaction) {
        let status = tx.default_status();
        tx.interrupt(DisruptionKind::Block, status, "", rule.id);
    }
}

/// Scope of an `allow` clearance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllowScope {
    /// The whole transaction (phases 1-4).
    #[default]
    Transaction,
    /// The current phase only.
    Phase,
    /// The remaining request phases.
    Request,
}

/// `allow[:phase|request]` — let the transaction through, scoped by
/// parameter.
#[derive(Default)]
pub struct Allow {
    scope: AllowScope,
}

impl Action for Allow {
    fn name(&self) -> &'static str {
        "allow"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Disruptive
    }

    fn init(&mut self, rule: &mut Rule, param: &str) -> Result<()> {
        rule.disruptive_action = DisruptionKind::Allow;
        self.scope = match param.trim() {
            "" => AllowScope::Transaction,
            "phase" => AllowScope::Phase,
            "request" => AllowScope::Request,
            other => {
                return Err(Error::InvalidActionArgument {
                    action: "allow".to_string(),
                    message: format!("unknown scope: {other}"),
                })
            }
        };
        Ok(())
    }

    fn evaluate(&self, rule: &Rule, tx: &mut Transaction) {
        match self.scope {
            AllowScope::Transaction => {
                tx.interrupt(DisruptionKind::Allow, 0, "", rule.id);
            }
            AllowScope::Phase => tx.allow_current_phase(),
            AllowScope::Request => tx.allow_request_phases(),
        }
    }
}

/// `redirect:<url>` — answer with a redirect; the URL is macro-expanded.
#[derive(Default)]
pub struct Redirect {
    target: String,
}

impl Action for Redirect {
    fn name(&self) -> &'static str {
        "redirect"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Disruptive
    }

    fn init(&mut self, rule: &mut Rule, param: &str) -> Result<()> {
        rule.disruptive_action = DisruptionKind::Redirect;
        self.target = param.to_string();
        Ok(())
    }

    fn evaluate(&self, rule: &Rule, tx: &mut Transaction) {
        let status = if rule.status != 0 { rule.status } else { 302 };
        let url = tx.macro_expand(&self.target);
        tx.interrupt(DisruptionKind::Redirect, status, url, rule.id);
    }
}

/// `pass` — the rule matched but processing continues.
pub struct Pass;

impl Action for Pass {
    fn name(&self) -> &'static str {
        "pass"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Disruptive
    }

    fn init(&mut self, rule: &mut Rule, _param: &str) -> Result<()> {
        rule.disruptive_action = DisruptionKind::Pass;
        Ok(())
    }
}

/// `proxy:<backend>` — hand the request to another backend.
#[derive(Default)]
pub struct Proxy {
    target: String,
}

impl Action for Proxy {
    fn name(&self) -> &'static str {
        "proxy"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Disruptive
    }

    fn init(&mut self, rule: &mut Rule, param: &str) -> Result<()> {
        rule.disruptive_action = DisruptionKind::Proxy;
        self.target = param.to_string();
        Ok(())
    }

    fn evaluate(&self, rule: &Rule, tx: &mut Transaction) {
        let target = tx.macro_expand(&self.target);
        tx.interrupt(DisruptionKind::Proxy, 0, target, rule.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Ruleset, Waf};

    fn tx() -> Transaction {
        Waf::new(Ruleset::new()).transaction()
    }

    fn rule_with_id(id: u64) -> Rule {
        let mut rule = Rule::default();
        rule.id = id;
        rule
    }

    #[test]
    fn test_deny_default_status() {
        let mut tx = tx();
        Deny.evaluate(&rule_with_id(7), &mut tx);
        let i = tx.interruption().unwrap();
        assert_eq!(i.action, DisruptionKind::Deny);
        assert_eq!(i.status, 403);
        assert_eq!(i.rule_id, 7);
    }

    #[test]
    fn test_deny_honors_rule_status() {
        let mut tx = tx();
        let mut rule = rule_with_id(7);
        rule.status = 429;
        Deny.evaluate(&rule, &mut tx);
        assert_eq!(tx.interruption().unwrap().status, 429);
    }

    #[test]
    fn test_interruption_is_latched() {
        let mut tx = tx();
        Deny.evaluate(&rule_with_id(1), &mut tx);
        Drop.evaluate(&rule_with_id(2), &mut tx);
        let i = tx.interruption().unwrap();
        assert_eq!(i.action, DisruptionKind::Deny);
        assert_eq!(i.rule_id, 1);
    }

    #[test]
    fn test_redirect_expands_macros() {
        let mut tx = tx();
        tx.get_collection("tx").set("dest", "/blocked");
        let mut action = Redirect::default();
        let mut rule = rule_with_id(3);
        action.init(&mut rule, "https://example.com%{tx.dest}").unwrap();
        action.evaluate(&rule, &mut tx);
        let i = tx.interruption().unwrap();
        assert_eq!(i.status, 302);
        assert_eq!(i.data, "https://example.com/blocked");
    }

    #[test]
    fn test_pass_does_not_interrupt() {
        let mut tx = tx();
        Pass.evaluate(&rule_with_id(4), &mut tx);
        assert!(tx.interruption().is_none());
    }

    #[test]
    fn test_allow_scopes() {
        let mut rule = rule_with_id(5);
        let mut action = Allow::default();
        action.init(&mut rule, "").unwrap();
        let mut tx1 = tx();
        action.evaluate(&rule, &mut tx1);
        assert_eq!(tx1.interruption().unwrap().action, DisruptionKind::Allow);

        let mut action = Allow::default();
        assert!(action.init(&mut rule, "bogus").is_err());
        action.init(&mut rule, "phase").unwrap();
        let mut tx = tx();
        action.evaluate(&rule, &mut tx);
        assert!(tx.interruption().is_none());
    }
}
