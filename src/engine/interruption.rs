//! Interruption: the latched decision to disrupt a transaction.

use serde::Serialize;

/// The disruption a rule requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisruptionKind {
    /// Continue processing; the rule only matched.
    Pass,
    /// Close the connection without a response.
    Drop,
    /// Apply the configured default disruption.
    Block,
    /// Refuse the request with a status code.
    Deny,
    /// Let the transaction through, skipping further inspection.
    Allow,
    /// Forward the request to another backend.
    Proxy,
    /// Answer with a redirect.
    Redirect,
}

impl DisruptionKind {
    /// Stable lowercase name used in audit output.
    pub fn as_str(&self) -> &'static str {
        match self {
            DisruptionKind::Pass => "pass",
            DisruptionKind::Drop => "drop",
            DisruptionKind::Block => "block",
            DisruptionKind::Deny => "deny",
            DisruptionKind::Allow => "allow",
            DisruptionKind::Proxy => "proxy",
            DisruptionKind::Redirect => "redirect",
        }
    }
}

impl std::fmt::Display for DisruptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A latched disruption decision. At most one per transaction; the first
/// rule to interrupt wins and later attempts are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interruption {
    /// Which disruption was requested.
    pub action: DisruptionKind,
    /// HTTP status the host should render (0 when not applicable).
    pub status: u16,
    /// Action payload: redirect URL, proxy target, allow scope.
    pub data: String,
    /// The head rule that triggered the disruption.
    pub rule_id: u64,
}

impl Interruption {
    /// Create an interruption record.
    pub fn new(action: DisruptionKind, status: u16, data: impl Into<String>, rule_id: u64) -> Self {
        Self {
            action,
            status,
            data: data.into(),
            rule_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(DisruptionKind::Deny.as_str(), "deny");
        assert_eq!(DisruptionKind::Redirect.to_string(), "redirect");
    }

    #[test]
    fn test_serialized_action_is_lowercase() {
        let i = Interruption::new(DisruptionKind::Deny, 403, "", 100);
        let json = serde_json::to_value(&i).unwrap();
        assert_eq!(json["action"], "deny");
        assert_eq!(json["status"], 403);
        assert_eq!(json["rule_id"], 100);
    }
}
