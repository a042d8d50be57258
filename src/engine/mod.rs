//! Rule-evaluation engine: ruleset, transaction, phases, interruption.

pub mod interruption;
pub mod phase;
pub mod rule;
pub mod ruleset;
pub mod transaction;

pub use interruption::{DisruptionKind, Interruption};
pub use phase::Phase;
pub use rule::{Rule, RuleBuilder, RuleOperator, RuleVariable};
pub use ruleset::Ruleset;
pub use transaction::{MatchedRule, Transaction};

use crate::audit::AuditLogger;
use crate::error::Result;
use std::sync::Arc;

/// Engine root: owns the shared ruleset and the audit configuration, and
/// mints transactions.
///
/// The compiled ruleset is immutable once the engine is built and is shared
/// by reference across concurrent transactions.
pub struct Waf {
    ruleset: Arc<Ruleset>,
    default_status: u16,
    audit_by_default: bool,
    audit_logger: Option<Arc<AuditLogger>>,
}

impl Waf {
    /// Create an engine over a compiled ruleset.
    pub fn new(ruleset: Ruleset) -> Self {
        Self {
            ruleset: Arc::new(ruleset),
            default_status: 403,
            audit_by_default: false,
            audit_logger: None,
        }
    }

    /// Status code used by the `block` action.
    pub fn set_default_status(&mut self, status: u16) {
        self.default_status = status;
    }

    /// Attach an audit logger and enable auditing for new transactions.
    pub fn set_audit_logger(&mut self, logger: Arc<AuditLogger>) {
        self.audit_logger = Some(logger);
        self.audit_by_default = true;
    }

    /// Toggle whether new transactions are audited (per-transaction `ctl`
    /// can still override).
    pub fn enable_audit(&mut self, enabled: bool) {
        self.audit_by_default = enabled;
    }

    /// Create a transaction with a fresh id and timestamp.
    pub fn transaction(&self) -> Transaction {
        Transaction::new(
            Arc::clone(&self.ruleset),
            self.default_status,
            self.audit_by_default,
        )
    }

    /// Write the audit record for a finished transaction. Returns whether a
    /// record was written (false when auditing is off for this transaction
    /// or no logger is attached).
    pub fn write_audit(&self, tx: &Transaction) -> Result<bool> {
        match &self.audit_logger {
            Some(logger) if tx.audit_enabled() => {
                logger.write_audit(tx)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// The shared ruleset.
    pub fn ruleset(&self) -> &Ruleset {
        &self.ruleset
    }

    /// Number of head rules.
    pub fn rule_count(&self) -> usize {
        self.ruleset.len()
    }
}

impl std::fmt::Debug for Waf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waf")
            .field("rule_count", &self.ruleset.len())
            .field("default_status", &self.default_status)
            .field("audit", &self.audit_by_default)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waf(rules: Vec<Rule>) -> Waf {
        let mut ruleset = Ruleset::new();
        for rule in rules {
            ruleset.add(rule).unwrap();
        }
        Waf::new(ruleset)
    }

    #[test]
    fn test_simple_deny() {
        let rule = Rule::builder()
            .variable("REQUEST_HEADERS", "User-Agent")
            .operator("streq", "badbot")
            .action("id", "100")
            .action("phase", "1")
            .action("deny", "")
            .action("status", "403")
            .build()
            .unwrap();
        let waf = waf(vec![rule]);

        let mut tx = waf.transaction();
        tx.set_request_line("GET", "/", "HTTP/1.1");
        tx.add_request_header("User-Agent", "badbot");
        tx.execute_phase(Phase::RequestHeaders);

        let i = tx.interruption().expect("interruption expected");
        assert_eq!(i.action, DisruptionKind::Deny);
        assert_eq!(i.status, 403);
        assert_eq!(i.rule_id, 100);
        assert_eq!(tx.matched_rules().len(), 1);
    }

    #[test]
    fn test_chain_failure_runs_nondisruptive_actions() {
        let rule = Rule::builder()
            .variable("REQUEST_URI", "")
            .operator("rx", "/admin")
            .action("id", "200")
            .action("phase", "1")
            .action("setvar", "tx.probed=1")
            .action("deny", "")
            .chain(
                Rule::builder()
                    .variable("REQUEST_METHOD", "")
                    .operator("streq", "POST"),
            )
            .build()
            .unwrap();
        let waf = waf(vec![rule]);

        let mut tx = waf.transaction();
        tx.set_request_line("GET", "/admin", "HTTP/1.1");
        tx.execute_phase(Phase::RequestHeaders);

        assert!(tx.interruption().is_none());
        assert!(tx.matched_rules().is_empty());
        // The head's non-disruptive actions ran before the chain failed.
        assert_eq!(tx.first_value("tx", "probed"), "1");
    }

    #[test]
    fn test_multi_match_transformations() {
        let rule = Rule::builder()
            .variable("ARGS", "q")
            .operator("contains", "drop table")
            .transformation("lowercase")
            .transformation("removeWhitespace")
            .multi_match()
            .action("id", "300")
            .action("phase", "1")
            .action("pass", "")
            .build()
            .unwrap();
        let waf = waf(vec![rule]);

        let mut tx = waf.transaction();
        tx.set_request_line("GET", "/?q=DROP%20TABLE%20users", "HTTP/1.1");
        tx.execute_phase(Phase::RequestHeaders);

        assert_eq!(tx.matched_rules().len(), 1);
        let record = &tx.matched_rules()[0];
        assert_eq!(record.data.len(), 1);
        // The match was observed on the lowercased intermediate value.
        assert_eq!(record.data[0].value, "drop table users");
    }

    #[test]
    fn test_count_variable() {
        let rule = Rule::builder()
            .count_variable("ARGS", "")
            .operator("gt", "10")
            .action("id", "400")
            .action("phase", "1")
            .action("pass", "")
            .build()
            .unwrap();
        let waf = waf(vec![rule]);

        let mut tx = waf.transaction();
        let query: Vec<String> = (0..11).map(|i| format!("a{i}={i}")).collect();
        tx.set_request_line("GET", &format!("/?{}", query.join("&")), "HTTP/1.1");
        tx.execute_phase(Phase::RequestHeaders);

        assert_eq!(tx.matched_rules().len(), 1);
        let record = &tx.matched_rules()[0];
        assert_eq!(record.data.len(), 1);
        assert_eq!(record.data[0].value, "11");
        assert_eq!(record.data[0].key, "");
    }

    #[test]
    fn test_phase_five_always_runs() {
        let deny = Rule::builder()
            .variable("REQUEST_BODY", "")
            .operator("contains", "attack")
            .action("id", "500")
            .action("phase", "2")
            .action("deny", "")
            .build()
            .unwrap();
        let log = Rule::builder()
            .action("id", "501")
            .action("phase", "5")
            .action("setvar", "tx.logged=1")
            .action("pass", "")
            .build()
            .unwrap();
        let waf = waf(vec![deny, log]);

        let mut tx = waf.transaction();
        tx.set_request_line("POST", "/submit", "HTTP/1.1");
        tx.append_request_body(b"attack payload");
        tx.execute_phase(Phase::RequestBody);
        assert!(tx.interruption().is_some());
        assert_eq!(tx.phase_cursor(), 2);

        tx.execute_phase(Phase::Logging);
        assert_eq!(tx.phase_cursor(), 5);
        assert_eq!(tx.first_value("tx", "logged"), "1");
    }

    #[test]
    fn test_removed_target_excludes_key() {
        let ctl = Rule::builder()
            .action("id", "600")
            .action("phase", "1")
            .action("ctl", "ruleRemoveTargetById=601;ARGS:pw")
            .action("pass", "")
            .action("nolog", "")
            .build()
            .unwrap();
        let target = Rule::builder()
            .variable("ARGS", "")
            .operator("unconditionalMatch", "")
            .action("id", "601")
            .action("phase", "2")
            .action("pass", "")
            .build()
            .unwrap();
        let waf = waf(vec![ctl, target]);

        let mut tx = waf.transaction();
        tx.set_request_line("GET", "/?pw=secret", "HTTP/1.1");
        tx.execute_phase(Phase::RequestBody);

        // pw was the only argument, so rule 601 saw an empty value list and
        // matched on absence.
        assert_eq!(tx.matched_rules().len(), 1);
        let record = &tx.matched_rules()[0];
        assert_eq!(record.rule_id, 601);
        assert_eq!(record.data.len(), 1);
        assert!(record.data[0].is_empty());
    }

    #[test]
    fn test_interruption_skips_following_phases() {
        let deny = Rule::builder()
            .action("id", "700")
            .action("phase", "1")
            .action("deny", "")
            .build()
            .unwrap();
        let later = Rule::builder()
            .action("id", "701")
            .action("phase", "3")
            .action("setvar", "tx.phase3=1")
            .action("pass", "")
            .build()
            .unwrap();
        let waf = waf(vec![deny, later]);

        let mut tx = waf.transaction();
        tx.execute_phase(Phase::ResponseBody);
        assert!(tx.interrupted());
        assert_eq!(tx.phase_cursor(), 4);
        assert_eq!(tx.first_value("tx", "phase3"), "");
    }

    #[test]
    fn test_skip_after_marker() {
        let jumper = Rule::builder()
            .action("id", "800")
            .action("phase", "1")
            .action("skipAfter", "END_CHECKS")
            .action("pass", "")
            .build()
            .unwrap();
        let skipped = Rule::builder()
            .action("id", "801")
            .action("phase", "1")
            .action("setvar", "tx.skipped=1")
            .action("pass", "")
            .build()
            .unwrap();
        let reached = Rule::builder()
            .action("id", "802")
            .action("phase", "1")
            .action("setvar", "tx.reached=1")
            .action("pass", "")
            .build()
            .unwrap();

        let mut ruleset = Ruleset::new();
        ruleset.add(jumper).unwrap();
        ruleset.add(skipped).unwrap();
        ruleset.add_marker("END_CHECKS");
        ruleset.add(reached).unwrap();
        let waf = Waf::new(ruleset);

        let mut tx = waf.transaction();
        tx.execute_phase(Phase::RequestHeaders);
        assert_eq!(tx.first_value("tx", "skipped"), "");
        assert_eq!(tx.first_value("tx", "reached"), "1");
    }

    #[test]
    fn test_skip_count() {
        let skipper = Rule::builder()
            .action("id", "810")
            .action("phase", "1")
            .action("skip", "1")
            .action("pass", "")
            .build()
            .unwrap();
        let skipped = Rule::builder()
            .action("id", "811")
            .action("phase", "1")
            .action("setvar", "tx.skipped=1")
            .action("pass", "")
            .build()
            .unwrap();
        let reached = Rule::builder()
            .action("id", "812")
            .action("phase", "1")
            .action("setvar", "tx.reached=1")
            .action("pass", "")
            .build()
            .unwrap();
        let waf = waf(vec![skipper, skipped, reached]);

        let mut tx = waf.transaction();
        tx.execute_phase(Phase::RequestHeaders);
        assert_eq!(tx.first_value("tx", "skipped"), "");
        assert_eq!(tx.first_value("tx", "reached"), "1");
    }

    #[test]
    fn test_rule_remove_by_id_mid_transaction() {
        let ctl = Rule::builder()
            .action("id", "820")
            .action("phase", "1")
            .action("ctl", "ruleRemoveById=821")
            .action("pass", "")
            .build()
            .unwrap();
        let removed = Rule::builder()
            .action("id", "821")
            .action("phase", "2")
            .action("deny", "")
            .build()
            .unwrap();
        let waf = waf(vec![ctl, removed]);

        let mut tx = waf.transaction();
        tx.execute_phase(Phase::RequestBody);
        assert!(tx.interruption().is_none());
    }

    #[test]
    fn test_allow_phase_scope_stops_current_phase_only() {
        let allow = Rule::builder()
            .action("id", "830")
            .action("phase", "1")
            .action("allow", "phase")
            .build()
            .unwrap();
        let same_phase = Rule::builder()
            .action("id", "831")
            .action("phase", "1")
            .action("setvar", "tx.p1=1")
            .action("pass", "")
            .build()
            .unwrap();
        let next_phase = Rule::builder()
            .action("id", "832")
            .action("phase", "2")
            .action("setvar", "tx.p2=1")
            .action("pass", "")
            .build()
            .unwrap();
        let waf = waf(vec![allow, same_phase, next_phase]);

        let mut tx = waf.transaction();
        tx.execute_phase(Phase::RequestBody);
        assert!(tx.interruption().is_none());
        assert_eq!(tx.first_value("tx", "p1"), "");
        assert_eq!(tx.first_value("tx", "p2"), "1");
    }

    #[test]
    fn test_negated_operator_per_argument() {
        let rule = Rule::builder()
            .variable("ARGS", "")
            .negated_operator("streq", "safe")
            .action("id", "840")
            .action("phase", "1")
            .action("pass", "")
            .build()
            .unwrap();
        let waf = waf(vec![rule]);

        let mut tx = waf.transaction();
        tx.set_request_line("GET", "/?a=safe&b=evil", "HTTP/1.1");
        tx.execute_phase(Phase::RequestHeaders);

        // Only the argument that failed the underlying operator matches.
        assert_eq!(tx.matched_rules().len(), 1);
        let record = &tx.matched_rules()[0];
        assert_eq!(record.data.len(), 1);
        assert_eq!(record.data[0].key, "b");
    }

    #[test]
    fn test_capture_fills_tx_slots() {
        let rule = Rule::builder()
            .variable("REQUEST_URI", "")
            .operator("rx", r"id=(\d+)")
            .action("id", "850")
            .action("phase", "1")
            .action("capture", "")
            .action("pass", "")
            .build()
            .unwrap();
        let waf = waf(vec![rule]);

        let mut tx = waf.transaction();
        tx.set_request_line("GET", "/?id=42", "HTTP/1.1");
        tx.execute_phase(Phase::RequestHeaders);

        assert_eq!(tx.first_value("tx", "0"), "id=42");
        assert_eq!(tx.first_value("tx", "1"), "42");
        assert!(!tx.is_capturable());
    }

    #[test]
    fn test_chain_match_collects_messages_and_interrupts() {
        let rule = Rule::builder()
            .variable("REQUEST_URI", "")
            .operator("rx", "/admin")
            .action("id", "860")
            .action("phase", "1")
            .action("msg", "admin access")
            .action("deny", "")
            .chain(
                Rule::builder()
                    .variable("REQUEST_METHOD", "")
                    .operator("streq", "POST")
                    .action("msg", "method %{request_method}"),
            )
            .build()
            .unwrap();
        let waf = waf(vec![rule]);

        let mut tx = waf.transaction();
        tx.set_request_line("POST", "/admin", "HTTP/1.1");
        tx.execute_phase(Phase::RequestHeaders);

        assert!(tx.interrupted());
        let record = &tx.matched_rules()[0];
        assert_eq!(record.messages, vec!["admin access", "method POST"]);
        assert_eq!(record.data.len(), 2);
    }
}
