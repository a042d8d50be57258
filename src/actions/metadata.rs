//! Metadata actions: applied into the rule record at compile time.

use super::{Action, ActionKind};
use crate::engine::phase::Phase;
use crate::engine::rule::Rule;
use crate::error::{Error, Result};

fn bad_arg(action: &'static str, message: impl Into<String>) -> Error {
    Error::InvalidActionArgument {
        action: action.to_string(),
        message: message.into(),
    }
}

/// `id:<n>` — the rule's unique identifier.
pub struct Id;

impl Action for Id {
    fn name(&self) -> &'static str {
        "id"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Metadata
    }

    fn init(&mut self, rule: &mut Rule, param: &str) -> Result<()> {
        rule.id = param
            .trim()
            .parse()
            .map_err(|_| bad_arg("id", format!("not an integer: {param}")))?;
        Ok(())
    }
}

/// `phase:<1-5>` — the phase the rule (and its chain) runs in.
pub struct PhaseMeta;

impl Action for PhaseMeta {
    fn name(&self) -> &'static str {
        "phase"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Metadata
    }

    fn init(&mut self, rule: &mut Rule, param: &str) -> Result<()> {
        let n: u8 = param
            .trim()
            .parse()
            .map_err(|_| bad_arg("phase", format!("not a number: {param}")))?;
        rule.phase =
            Phase::from_number(n).ok_or_else(|| bad_arg("phase", format!("out of range: {n}")))?;
        Ok(())
    }
}

/// `msg:<text>` — message attached to matches, macro-expanded at match time.
pub struct Msg;

impl Action for Msg {
    fn name(&self) -> &'static str {
        "msg"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Metadata
    }

    fn init(&mut self, rule: &mut Rule, param: &str) -> Result<()> {
        rule.msg = param.to_string();
        Ok(())
    }
}

/// `tag:<text>` — may appear multiple times.
pub struct Tag;

impl Action for Tag {
    fn name(&self) -> &'static str {
        "tag"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Metadata
    }

    fn init(&mut self, rule: &mut Rule, param: &str) -> Result<()> {
        rule.tags.push(param.to_string());
        Ok(())
    }
}

/// `severity:<0-7 or name>`.
pub struct Severity;

impl Action for Severity {
    fn name(&self) -> &'static str {
        "severity"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Metadata
    }

    fn init(&mut self, rule: &mut Rule, param: &str) -> Result<()> {
        let level = match param.trim().to_ascii_uppercase().as_str() {
            "EMERGENCY" => 0,
            "ALERT" => 1,
            "CRITICAL" => 2,
            "ERROR" => 3,
            "WARNING" => 4,
            "NOTICE" => 5,
            "INFO" => 6,
            "DEBUG" => 7,
            other => other
                .parse()
                .ok()
                .filter(|n| *n <= 7)
                .ok_or_else(|| bad_arg("severity", format!("unknown level: {param}")))?,
        };
        rule.severity = Some(level);
        Ok(())
    }
}

/// `rev:<text>` — rule revision.
pub struct Rev;

impl Action for Rev {
    fn name(&self) -> &'static str {
        "rev"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Metadata
    }

    fn init(&mut self, rule: &mut Rule, param: &str) -> Result<()> {
        rule.rev = param.to_string();
        Ok(())
    }
}

/// `ver:<text>` — rule set version.
pub struct Ver;

impl Action for Ver {
    fn name(&self) -> &'static str {
        "ver"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Metadata
    }

    fn init(&mut self, rule: &mut Rule, param: &str) -> Result<()> {
        rule.version = param.to_string();
        Ok(())
    }
}

/// `maturity:<text>`.
pub struct Maturity;

impl Action for Maturity {
    fn name(&self) -> &'static str {
        "maturity"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Metadata
    }

    fn init(&mut self, rule: &mut Rule, param: &str) -> Result<()> {
        rule.maturity = param.to_string();
        Ok(())
    }
}

/// `status:<code>` — status used by the rule's disruption.
pub struct Status;

impl Action for Status {
    fn name(&self) -> &'static str {
        "status"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Metadata
    }

    fn init(&mut self, rule: &mut Rule, param: &str) -> Result<()> {
        rule.status = param
            .trim()
            .parse()
            .map_err(|_| bad_arg("status", format!("not a status code: {param}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_and_phase() {
        let mut rule = Rule::default();
        Id.init(&mut rule, "942100").unwrap();
        PhaseMeta.init(&mut rule, "1").unwrap();
        assert_eq!(rule.id, 942100);
        assert_eq!(rule.phase, Phase::RequestHeaders);
        assert!(Id.init(&mut rule, "abc").is_err());
        assert!(PhaseMeta.init(&mut rule, "6").is_err());
    }

    #[test]
    fn test_severity_names_and_numbers() {
        let mut rule = Rule::default();
        Severity.init(&mut rule, "CRITICAL").unwrap();
        assert_eq!(rule.severity, Some(2));
        Severity.init(&mut rule, "5").unwrap();
        assert_eq!(rule.severity, Some(5));
        assert!(Severity.init(&mut rule, "9").is_err());
    }

    #[test]
    fn test_tags_accumulate() {
        let mut rule = Rule::default();
        Tag.init(&mut rule, "attack-sqli").unwrap();
        Tag.init(&mut rule, "OWASP_CRS").unwrap();
        assert_eq!(rule.tags, vec!["attack-sqli", "OWASP_CRS"]);
    }
}
