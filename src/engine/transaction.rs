//! Per-request transaction state: the collection store, phase driver,
//! capture slots, match log and interruption latch.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::DateTime;
use once_cell::sync::Lazy;
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::collections::{Collection, KeySelector, MatchData};
use crate::engine::interruption::{DisruptionKind, Interruption};
use crate::engine::phase::Phase;
use crate::engine::rule::Rule;
use crate::engine::ruleset::Ruleset;

static MACRO_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%\{([^{}]+)\}").unwrap());

/// One entry in the transaction's matched-rules log.
#[derive(Debug, Clone, Serialize)]
pub struct MatchedRule {
    /// Id of the head rule.
    pub rule_id: u64,
    /// Severity copied from the rule.
    pub severity: Option<u8>,
    /// Tags copied from the rule.
    pub tags: Vec<String>,
    /// Macro-expanded messages: the head's, then each chain link's.
    pub messages: Vec<String>,
    /// Macro-expanded `logdata` attached at match time, if any.
    pub logdata: Option<String>,
    /// The match data accumulated across the chain.
    pub data: Vec<MatchData>,
}

/// Evaluation context for one HTTP transaction.
///
/// Not safe for concurrent use; the host confines a transaction to one
/// logical worker. The shared ruleset is never mutated (the rules stay
/// observationally immutable across any number of transactions).
pub struct Transaction {
    id: String,
    timestamp: i64,
    ruleset: Arc<Ruleset>,
    collections: HashMap<String, Collection>,
    matched_rules: Vec<MatchedRule>,
    removed_rule_ids: Vec<u64>,
    removed_targets: HashMap<u64, Vec<(String, String)>>,
    interruption: Option<Interruption>,
    capturable: bool,
    logdata: Option<String>,
    audit: bool,
    default_status: u16,
    phase_cursor: u8,
    skip_rules: u32,
    skip_after: Option<String>,
    allow_phase: bool,
    allow_request: bool,
    request_body: Vec<u8>,
    response_body: Vec<u8>,
}

impl Transaction {
    pub(crate) fn new(ruleset: Arc<Ruleset>, default_status: u16, audit: bool) -> Self {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(24)
            .map(char::from)
            .collect();
        let timestamp = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        Self {
            id,
            timestamp,
            ruleset,
            collections: HashMap::new(),
            matched_rules: Vec::new(),
            removed_rule_ids: Vec::new(),
            removed_targets: HashMap::new(),
            interruption: None,
            capturable: false,
            logdata: None,
            audit,
            default_status,
            phase_cursor: 0,
            skip_rules: 0,
            skip_after: None,
            allow_phase: false,
            allow_request: false,
            request_body: Vec::new(),
            response_body: Vec::new(),
        }
    }

    /// Opaque transaction id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Creation time, nanoseconds since epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Last completed phase (0 before phase 1 has run).
    pub fn phase_cursor(&self) -> u8 {
        self.phase_cursor
    }

    /// The engine's default block status, used by `block`.
    pub fn default_status(&self) -> u16 {
        self.default_status
    }

    // ------------------------------------------------------------------
    // Collection store
    // ------------------------------------------------------------------

    /// The named collection, created empty on first access.
    pub fn get_collection(&mut self, name: &str) -> &mut Collection {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| Collection::new(name))
    }

    /// Read-only access to a collection, if it exists.
    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    /// First value of a collection entry, or "" when absent.
    pub fn first_value(&self, collection: &str, key: &str) -> &str {
        self.collections
            .get(collection)
            .map(|c| c.first_string(key))
            .unwrap_or("")
    }

    /// Resolve a variable selector against a collection, subtracting
    /// `exceptions`. Macros in an exact key selector are expanded first.
    pub fn get_field(
        &self,
        collection: &str,
        selector: &KeySelector,
        exceptions: &[String],
    ) -> Vec<MatchData> {
        let expanded;
        let selector = match selector {
            KeySelector::Exact(key) if key.contains("%{") => {
                expanded = KeySelector::Exact(self.macro_expand(key));
                &expanded
            }
            other => other,
        };
        match self.collections.get(collection) {
            Some(c) => c.find(selector, exceptions),
            None => Vec::new(),
        }
    }

    /// Expand `%{collection.key}` macros to the first value of that entry,
    /// or "" when absent. A dot-less name addresses the whole collection.
    /// Text without `%{}` sequences comes back unchanged.
    pub fn macro_expand(&self, text: &str) -> String {
        if !text.contains("%{") {
            return text.to_string();
        }
        MACRO_PATTERN
            .replace_all(text, |caps: &regex::Captures<'_>| {
                let name = &caps[1];
                let (collection, key) = match name.split_once('.') {
                    Some((c, k)) => (c, k),
                    None => (name, ""),
                };
                self.first_value(&collection.to_ascii_lowercase(), key)
                    .to_string()
            })
            .into_owned()
    }

    // ------------------------------------------------------------------
    // Match state
    // ------------------------------------------------------------------

    /// Refresh the `matched_var(s)` collections from a rule's matches.
    pub fn match_vars(&mut self, matches: &[MatchData]) {
        let entries: Vec<(String, String, String)> = matches
            .iter()
            .map(|m| {
                let name = if m.key.is_empty() {
                    m.collection.clone()
                } else {
                    format!("{}:{}", m.collection, m.key)
                };
                (m.key.clone(), m.value.clone(), name)
            })
            .collect();

        let vars = self.get_collection("matched_vars");
        vars.clear();
        for (key, value, _) in &entries {
            vars.add(key.clone(), value.clone());
        }
        let names = self.get_collection("matched_vars_names");
        names.clear();
        for (key, _, name) in &entries {
            names.add(key.clone(), name.clone());
        }
        if let Some((_, value, name)) = entries.last() {
            let value = value.clone();
            let name = name.clone();
            self.get_collection("matched_var").set("", value);
            self.get_collection("matched_var_name").set("", name);
        }
    }

    /// Append to the matched-rules log and refresh the `rule` collection
    /// for later macro expansion.
    pub fn match_rule(&mut self, rule: &Rule, messages: Vec<String>, matches: Vec<MatchData>) {
        debug!(rule_id = rule.id, matches = matches.len(), "rule matched");
        let first_message = messages.first().cloned().unwrap_or_default();
        let logdata = self.logdata.take();
        self.matched_rules.push(MatchedRule {
            rule_id: rule.id,
            severity: rule.severity,
            tags: rule.tags.clone(),
            messages,
            logdata,
            data: matches,
        });

        let severity = rule.severity.map(|s| s.to_string()).unwrap_or_default();
        let (rev, ver, maturity) = (rule.rev.clone(), rule.version.clone(), rule.maturity.clone());
        let id = rule.id.to_string();
        let col = self.get_collection("rule");
        col.set("id", id);
        col.set("msg", first_message);
        col.set("rev", rev);
        col.set("severity", severity);
        col.set("ver", ver);
        col.set("maturity", maturity);
    }

    /// The matched-rules log.
    pub fn matched_rules(&self) -> &[MatchedRule] {
        &self.matched_rules
    }

    // ------------------------------------------------------------------
    // Captures
    // ------------------------------------------------------------------

    /// Toggle whether the next operator match fills the capture slots.
    pub fn set_capturable(&mut self, capturable: bool) {
        self.capturable = capturable;
    }

    /// Whether captures are currently accepted.
    pub fn is_capturable(&self) -> bool {
        self.capturable
    }

    /// Store a capture group into `tx:0`..`tx:9`. Ignored while captures
    /// are not accepted or the slot is out of range.
    pub fn capture_field(&mut self, slot: usize, value: &str) {
        if !self.capturable || slot > 9 {
            return;
        }
        let value = value.to_string();
        self.get_collection("tx").set(slot.to_string(), value);
    }

    // ------------------------------------------------------------------
    // Interruption and per-transaction exceptions
    // ------------------------------------------------------------------

    /// Latch an interruption. The first one wins; later calls are ignored.
    pub fn interrupt(&mut self, action: DisruptionKind, status: u16, data: impl Into<String>, rule_id: u64) {
        if self.interruption.is_some() {
            return;
        }
        debug!(action = action.as_str(), rule_id, "transaction interrupted");
        self.interruption = Some(Interruption::new(action, status, data, rule_id));
    }

    /// The latched interruption, if any.
    pub fn interruption(&self) -> Option<&Interruption> {
        self.interruption.as_ref()
    }

    /// Whether an interruption is latched.
    pub fn interrupted(&self) -> bool {
        self.interruption.is_some()
    }

    /// Skip a rule id for the rest of the transaction.
    pub fn remove_rule(&mut self, id: u64) {
        if !self.removed_rule_ids.contains(&id) {
            self.removed_rule_ids.push(id);
        }
    }

    /// Whether a rule id is excluded from evaluation.
    pub fn rule_removed(&self, id: u64) -> bool {
        self.removed_rule_ids.contains(&id)
    }

    /// Exclude a collection key from a rule for the rest of the transaction.
    pub fn remove_target(&mut self, rule_id: u64, collection: &str, key: &str) {
        self.removed_targets
            .entry(rule_id)
            .or_default()
            .push((collection.to_string(), key.to_string()));
    }

    /// Keys removed for a rule id within one collection.
    pub fn removed_targets_for(&self, rule_id: u64, collection: &str) -> Vec<String> {
        self.removed_targets
            .get(&rule_id)
            .map(|targets| {
                targets
                    .iter()
                    .filter(|(c, _)| c == collection)
                    .map(|(_, k)| k.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Flow hooks and audit toggles
    // ------------------------------------------------------------------

    /// Skip the next `count` rules in the current phase.
    pub fn set_skip(&mut self, count: u32) {
        self.skip_rules = count;
    }

    /// Jump past the named marker within the current phase.
    pub fn set_skip_after(&mut self, marker: &str) {
        self.skip_after = Some(marker.to_string());
    }

    /// Stop evaluating the remainder of the current phase.
    pub fn allow_current_phase(&mut self) {
        self.allow_phase = true;
    }

    /// Stop evaluating the remaining request phases.
    pub fn allow_request_phases(&mut self) {
        self.allow_request = true;
    }

    /// Toggle audit logging for this transaction.
    pub fn set_audit(&mut self, enabled: bool) {
        self.audit = enabled;
    }

    /// Whether this transaction should be audited.
    pub fn audit_enabled(&self) -> bool {
        self.audit
    }

    /// Attach data-action output to the next match record.
    pub fn set_logdata(&mut self, data: String) {
        self.logdata = Some(data);
    }

    /// Take the pending data-action output.
    pub fn take_logdata(&mut self) -> Option<String> {
        self.logdata.take()
    }

    // ------------------------------------------------------------------
    // Host setters
    // ------------------------------------------------------------------

    /// Record the client address and port.
    pub fn set_remote_addr(&mut self, addr: &str, port: u16) {
        let addr = addr.to_string();
        self.get_collection("remote_addr").set("", addr);
        self.get_collection("remote_port").set("", port.to_string());
    }

    /// Record the request line and parse the query string into `args` /
    /// `args_get`.
    pub fn set_request_line(&mut self, method: &str, uri: &str, protocol: &str) {
        let line = format!("{} {} {}", method, uri, protocol);
        self.get_collection("request_line").set("", line);
        self.get_collection("request_method").set("", method);
        self.get_collection("request_protocol").set("", protocol);
        self.get_collection("request_uri").set("", uri);
        self.get_collection("request_uri_raw").set("", uri);

        let (path, query) = match uri.split_once('?') {
            Some((p, q)) => (p, q),
            None => (uri, ""),
        };
        let basename = path.rsplit('/').next().unwrap_or("").to_string();
        self.get_collection("request_filename").set("", path);
        self.get_collection("request_basename").set("", basename);
        self.get_collection("query_string").set("", query);

        for (key, value) in parse_urlencoded(query) {
            self.get_collection("args_get").add(key.clone(), value.clone());
            self.get_collection("args").add(key, value);
        }
    }

    /// Record one request header. Header names are lowercased; `Cookie` is
    /// parsed into `request_cookies` and `Host` fills `server_name`.
    pub fn add_request_header(&mut self, name: &str, value: &str) {
        let lname = name.to_ascii_lowercase();
        self.get_collection("request_headers")
            .add(lname.clone(), value);
        match lname.as_str() {
            "cookie" => {
                for pair in value.split(';') {
                    if let Some((k, v)) = pair.split_once('=') {
                        self.get_collection("request_cookies")
                            .add(k.trim(), v.trim());
                    }
                }
            }
            "host" => {
                self.get_collection("server_name").set("", value);
            }
            _ => {}
        }
    }

    /// Append request body bytes and refresh the body collections.
    pub fn append_request_body(&mut self, data: &[u8]) {
        self.request_body.extend_from_slice(data);
        let text = String::from_utf8_lossy(&self.request_body).into_owned();
        let len = self.request_body.len().to_string();
        self.get_collection("request_body").set("", text);
        self.get_collection("request_body_length").set("", len);
    }

    /// Parse an urlencoded request body into `args` / `args_post`. Called
    /// by the host once the body is complete, before phase 2.
    pub fn parse_form_body(&mut self) {
        let content_type = self
            .first_value("request_headers", "content-type")
            .to_ascii_lowercase();
        if !content_type.starts_with("application/x-www-form-urlencoded") {
            return;
        }
        let body = String::from_utf8_lossy(&self.request_body).into_owned();
        for (key, value) in parse_urlencoded(&body) {
            self.get_collection("args_post").add(key.clone(), value.clone());
            self.get_collection("args").add(key, value);
        }
    }

    /// Record the response status.
    pub fn set_response_status(&mut self, status: u16) {
        self.get_collection("response_status")
            .set("", status.to_string());
    }

    /// Record one response header.
    pub fn add_response_header(&mut self, name: &str, value: &str) {
        let lname = name.to_ascii_lowercase();
        self.get_collection("response_headers")
            .add(lname.clone(), value);
        match lname.as_str() {
            "content-length" => {
                self.get_collection("response_content_length").set("", value);
            }
            "content-type" => {
                self.get_collection("response_content_type").set("", value);
            }
            _ => {}
        }
    }

    /// Append response body bytes and refresh the body collections.
    pub fn append_response_body(&mut self, data: &[u8]) {
        self.response_body.extend_from_slice(data);
        let text = String::from_utf8_lossy(&self.response_body).into_owned();
        let len = self.response_body.len().to_string();
        self.get_collection("response_body").set("", text);
        self.get_collection("response_content_length").set("", len);
    }

    // ------------------------------------------------------------------
    // Phase driver
    // ------------------------------------------------------------------

    /// Advance the phase cursor up to and including `target`, evaluating
    /// each phase's rules in ruleset order.
    ///
    /// A no-op when `target` is at or behind the cursor. Once an
    /// interruption is latched, rule evaluation is skipped for the
    /// remaining phases 1-4; phase 5 always runs.
    pub fn execute_phase(&mut self, target: Phase) {
        while self.phase_cursor < target.number() {
            let next = self.phase_cursor + 1;
            self.phase_cursor = next;
            let Some(phase) = Phase::from_number(next) else {
                break;
            };
            if phase != Phase::Logging && self.interruption.is_some() {
                continue;
            }
            self.run_phase(phase);
        }
    }

    fn run_phase(&mut self, phase: Phase) {
        self.skip_rules = 0;
        self.skip_after = None;
        self.allow_phase = false;
        if self.allow_request && phase.is_request_phase() {
            return;
        }
        debug!(phase = phase.name(), "executing phase");

        let rules = self.ruleset.phase_rules(phase);
        for (position, rule) in rules {
            if phase != Phase::Logging && self.interruption.is_some() {
                break;
            }
            if self.allow_phase {
                break;
            }
            if self.allow_request && phase.is_request_phase() {
                break;
            }
            if let Some(marker) = self.skip_after.clone() {
                match self.ruleset.marker(&marker) {
                    Some(marker_position) if position >= marker_position => {
                        self.skip_after = None;
                    }
                    // Before the marker, or the marker does not exist in
                    // this ruleset: keep skipping.
                    _ => continue,
                }
            }
            if self.skip_rules > 0 {
                self.skip_rules -= 1;
                continue;
            }
            if self.rule_removed(rule.id) {
                continue;
            }
            rule.evaluate(self);
        }
    }

    /// Directory and filename of this transaction's audit document,
    /// relative to the audit logger's base directory.
    pub fn audit_path(&self) -> (String, String) {
        let ts = DateTime::from_timestamp_nanos(self.timestamp);
        let day = ts.format("%Y%m%d");
        let directory = format!("{}/{}-{}", day, day, ts.format("%H%M"));
        let filename = format!("{}-{}-{}", day, ts.format("%H%M%S"), self.id);
        (directory, filename)
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("phase_cursor", &self.phase_cursor)
            .field("interrupted", &self.interruption.is_some())
            .field("matched_rules", &self.matched_rules.len())
            .finish()
    }
}

fn parse_urlencoded(input: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for pair in input.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = percent_encoding::percent_decode_str(key)
            .decode_utf8_lossy()
            .into_owned();
        let value = percent_encoding::percent_decode_str(value)
            .decode_utf8_lossy()
            .into_owned();
        pairs.push((key, value));
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Waf;

    fn tx() -> Transaction {
        Waf::new(Ruleset::new()).transaction()
    }

    #[test]
    fn test_request_line_populates_collections() {
        let mut tx = tx();
        tx.set_request_line("GET", "/index.php?id=1&user=bob", "HTTP/1.1");
        assert_eq!(
            tx.first_value("request_line", ""),
            "GET /index.php?id=1&user=bob HTTP/1.1"
        );
        assert_eq!(tx.first_value("request_method", ""), "GET");
        assert_eq!(tx.first_value("request_filename", ""), "/index.php");
        assert_eq!(tx.first_value("request_basename", ""), "index.php");
        assert_eq!(tx.first_value("query_string", ""), "id=1&user=bob");
        assert_eq!(tx.first_value("args", "id"), "1");
        assert_eq!(tx.first_value("args_get", "user"), "bob");
    }

    #[test]
    fn test_headers_lowercased_and_cookies_parsed() {
        let mut tx = tx();
        tx.add_request_header("User-Agent", "curl/8.0");
        tx.add_request_header("Cookie", "session=abc; theme=dark");
        tx.add_request_header("Host", "example.com");
        assert_eq!(tx.first_value("request_headers", "user-agent"), "curl/8.0");
        assert_eq!(tx.first_value("request_cookies", "session"), "abc");
        assert_eq!(tx.first_value("request_cookies", "theme"), "dark");
        assert_eq!(tx.first_value("server_name", ""), "example.com");
    }

    #[test]
    fn test_form_body_requires_content_type() {
        let mut plain = tx();
        plain.append_request_body(b"a=1&b=2");
        plain.parse_form_body();
        assert_eq!(plain.first_value("args_post", "a"), "");

        let mut form = tx();
        form.add_request_header("Content-Type", "application/x-www-form-urlencoded");
        form.append_request_body(b"a=1&b=%20x");
        form.parse_form_body();
        assert_eq!(form.first_value("args_post", "a"), "1");
        assert_eq!(form.first_value("args_post", "b"), " x");
        assert_eq!(form.first_value("args", "b"), " x");
        assert_eq!(form.first_value("request_body_length", ""), "10");
    }

    #[test]
    fn test_macro_expand() {
        let mut tx = tx();
        tx.get_collection("tx").set("score", "5");
        tx.set_remote_addr("1.2.3.4", 4711);
        assert_eq!(tx.macro_expand("score=%{tx.score}"), "score=5");
        assert_eq!(tx.macro_expand("ip=%{remote_addr}"), "ip=1.2.3.4");
        assert_eq!(tx.macro_expand("%{tx.missing}"), "");
        // Idempotent on macro-free text.
        assert_eq!(tx.macro_expand("plain 100% text"), "plain 100% text");
    }

    #[test]
    fn test_get_field_expands_macro_selector() {
        let mut tx = tx();
        tx.get_collection("tx").set("target", "id");
        tx.get_collection("args").add("id", "42");
        let found = tx.get_field(
            "args",
            &KeySelector::Exact("%{tx.target}".to_string()),
            &[],
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value, "42");
    }

    #[test]
    fn test_interrupt_latches_first() {
        let mut tx = tx();
        tx.interrupt(DisruptionKind::Deny, 403, "", 1);
        tx.interrupt(DisruptionKind::Redirect, 302, "/x", 2);
        let i = tx.interruption().unwrap();
        assert_eq!(i.action, DisruptionKind::Deny);
        assert_eq!(i.rule_id, 1);
    }

    #[test]
    fn test_capture_requires_flag_and_slot_range(){
        let mut tx = tx();
        tx.capture_field(0, "nope");
        assert_eq!(tx.first_value("tx", "0"), "");
        tx.set_capturable(true);
        tx.capture_field(0, "yes");
        tx.capture_field(10, "out of range");
        assert_eq!(tx.first_value("tx", "0"), "yes");
        assert_eq!(tx.first_value("tx", "10"), "");
    }

    #[test]
    fn test_match_vars_tracks_last_match() {
        let mut tx = tx();
        let matches = vec![
            MatchData {
                collection: "args".to_string(),
                key: "a".to_string(),
                value: "1".to_string(),
            },
            MatchData {
                collection: "args".to_string(),
                key: "b".to_string(),
                value: "2".to_string(),
            },
        ];
        tx.match_vars(&matches);
        assert_eq!(tx.first_value("matched_var", ""), "2");
        assert_eq!(tx.first_value("matched_var_name", ""), "args:b");
        assert_eq!(tx.collection("matched_vars").unwrap().len(), 2);
        // The next rule's matches replace the previous set.
        tx.match_vars(&matches[..1]);
        assert_eq!(tx.collection("matched_vars").unwrap().len(), 1);
    }

    #[test]
    fn test_removed_targets_scoped_by_rule_and_collection() {
        let mut tx = tx();
        tx.remove_target(7, "args", "pw");
        assert_eq!(tx.removed_targets_for(7, "args"), vec!["pw".to_string()]);
        assert!(tx.removed_targets_for(7, "request_headers").is_empty());
        assert!(tx.removed_targets_for(8, "args").is_empty());
    }

    #[test]
    fn test_audit_path_layout() {
        let tx = tx();
        let (dir, file) = tx.audit_path();
        // <yyyymmdd>/<yyyymmdd>-<hhmm> and <yyyymmdd>-<hhmmss>-<id>
        assert_eq!(dir.len(), 8 + 1 + 8 + 1 + 4);
        assert!(file.ends_with(tx.id()));
    }
}
