//! Action system: side-effecting directives attached to rules.
//!
//! Actions are bound at rule-compile time with their parameter string.
//! Metadata actions fold into the [`Rule`] record during `init` and do
//! nothing at runtime; data and non-disruptive actions run on every
//! successful variable match; disruptive and flow actions run only for the
//! head rule of a fully matched chain.

mod data;
mod disruptive;
mod flow;
mod metadata;
mod nondisruptive;

pub use data::LogData;
pub use disruptive::{Allow, AllowScope, Block, Deny, Drop, Pass, Proxy, Redirect};
pub use flow::{Skip, SkipAfter};
pub use metadata::{Id, Maturity, Msg, PhaseMeta, Rev, Severity, Status, Tag, Ver};
pub use nondisruptive::{Capture, Ctl, CtlOp, Log, NoLog, SetVar};

use crate::engine::rule::Rule;
use crate::engine::Transaction;
use crate::error::{Error, Result};
use std::sync::Arc;

/// Classification of an action's effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Folded into the rule record at compile time; no runtime behavior.
    Metadata,
    /// Computes a value at match time and attaches it to the match record.
    Data,
    /// Mutates transaction state; must not interrupt.
    NonDisruptive,
    /// May latch the transaction's interruption.
    Disruptive,
    /// Adjusts the phase driver's cursor or skip counters.
    Flow,
}

/// A named, side-effecting rule action.
pub trait Action: Send + Sync {
    /// Registry name.
    fn name(&self) -> &'static str;

    /// The action's kind.
    fn kind(&self) -> ActionKind;

    /// Bind the action to its rule at compile time. Metadata actions write
    /// into the rule record here; others parse and store their parameter.
    fn init(&mut self, rule: &mut Rule, param: &str) -> Result<()> {
        let _ = (rule, param);
        Ok(())
    }

    /// Execute the action at match time.
    fn evaluate(&self, rule: &Rule, tx: &mut Transaction) {
        let _ = (rule, tx);
    }
}

/// An action bound to its parameter, as carried by a compiled rule.
#[derive(Clone)]
pub struct ActionEntry {
    /// Registry name the action was bound under.
    pub name: String,
    /// Raw parameter string from the rule source.
    pub param: String,
    /// The bound action.
    pub action: Arc<dyn Action>,
}

impl std::fmt::Debug for ActionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionEntry")
            .field("name", &self.name)
            .field("param", &self.param)
            .finish()
    }
}

/// Create an unbound action by registry name (case-insensitive). The caller
/// is expected to `init` it against its rule.
pub fn create_action(name: &str) -> Result<Box<dyn Action>> {
    Ok(match name.to_ascii_lowercase().as_str() {
        // Metadata
        "id" => Box::new(Id),
        "phase" => Box::new(PhaseMeta),
        "msg" => Box::new(Msg),
        "tag" => Box::new(Tag),
        "severity" => Box::new(Severity),
        "rev" => Box::new(Rev),
        "ver" => Box::new(Ver),
        "maturity" => Box::new(Maturity),
        "status" => Box::new(Status),

        // Data
        "logdata" => Box::new(LogData::default()),

        // Non-disruptive
        "setvar" => Box::new(SetVar::default()),
        "capture" => Box::new(Capture),
        "ctl" => Box::new(Ctl::default()),
        "log" => Box::new(Log),
        "nolog" => Box::new(NoLog),

        // Disruptive
        "deny" => Box::new(Deny),
        "drop" => Box::new(Drop),
        "block" => Box::new(Block),
        "allow" => Box::new(Allow::default()),
        "redirect" => Box::new(Redirect::default()),
        "pass" => Box::new(Pass),
        "proxy" => Box::new(Proxy::default()),

        // Flow
        "skip" => Box::new(Skip::default()),
        "skipafter" => Box::new(SkipAfter::default()),

        _ => {
            return Err(Error::UnknownAction {
                name: name.to_string(),
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_kinds() {
        assert_eq!(create_action("id").unwrap().kind(), ActionKind::Metadata);
        assert_eq!(create_action("logdata").unwrap().kind(), ActionKind::Data);
        assert_eq!(
            create_action("setvar").unwrap().kind(),
            ActionKind::NonDisruptive
        );
        assert_eq!(create_action("deny").unwrap().kind(), ActionKind::Disruptive);
        assert_eq!(create_action("skipAfter").unwrap().kind(), ActionKind::Flow);
    }

    #[test]
    fn test_unknown_action() {
        assert!(matches!(
            create_action("exec"),
            Err(Error::UnknownAction { .. })
        ));
    }
}
