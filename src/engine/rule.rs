//! Compiled rules and the per-rule evaluation pipeline.
//!
//! A rule selects variables, pushes each value through its transformation
//! pipeline, tests the operator against every resulting argument, and on
//! success dispatches its actions. Chained rules are stored as a contiguous
//! vector of links under the head rule; every link must match for the head's
//! disruptive actions to fire.

use std::sync::Arc;

use tracing::debug;

use crate::actions::{create_action, Action, ActionEntry, ActionKind};
use crate::collections::{KeySelector, MatchData};
use crate::engine::interruption::DisruptionKind;
use crate::engine::phase::Phase;
use crate::engine::transaction::Transaction;
use crate::error::{Error, Result};
use crate::operators::{create_operator, Operator, UnconditionalMatch};
use crate::transformations::TransformationPipeline;

/// A variable selector: one collection, an optional key selector, and keys
/// to subtract.
#[derive(Debug, Clone)]
pub struct RuleVariable {
    /// Replace the value list with its count.
    pub count: bool,
    /// Collection name (lowercase).
    pub collection: String,
    /// Key selection within the collection.
    pub key: KeySelector,
    /// Keys excluded from this variable.
    pub exceptions: Vec<String>,
}

/// The rule's operator together with its compile-time binding.
#[derive(Clone)]
pub struct RuleOperator {
    /// Registry name, preserved for audit reproduction.
    pub name: String,
    /// Raw argument string; may contain macros expanded per transaction.
    pub argument: String,
    /// Invert the operator's result, per argument.
    pub negated: bool,
    /// The resolved operator.
    pub operator: Arc<dyn Operator>,
}

impl std::fmt::Debug for RuleOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleOperator")
            .field("name", &self.name)
            .field("argument", &self.argument)
            .field("negated", &self.negated)
            .finish()
    }
}

/// A compiled rule directive.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Unique rule id. Chained children carry the head's id in `parent_id`.
    pub id: u64,
    /// 0 for head rules, the head's id for chained children.
    pub parent_id: u64,
    /// Execution phase. A child's own phase is ignored; the head governs.
    pub phase: Phase,
    /// Rule tags.
    pub tags: Vec<String>,
    /// Message, macro-expanded when the rule matches.
    pub msg: String,
    /// Severity 0 (emergency) - 7 (debug).
    pub severity: Option<u8>,
    /// Rule revision.
    pub rev: String,
    /// Rule set version.
    pub version: String,
    /// Maturity index.
    pub maturity: String,
    /// Raw rule source, preserved for audit reproduction.
    pub raw: String,
    /// Target variables, in declaration order.
    pub variables: Vec<RuleVariable>,
    /// Ordered transformation pipeline.
    pub transformations: TransformationPipeline,
    /// The rule's single operator.
    pub operator: RuleOperator,
    /// Bound actions, in declaration order.
    pub actions: Vec<ActionEntry>,
    /// Evaluate the operator against every intermediate transformation value.
    pub multi_match: bool,
    /// Allow the operator to fill the `tx:0`..`tx:9` capture slots.
    pub capture: bool,
    /// Record matches in the transaction's matched-rules log.
    pub log: bool,
    /// Status code for disruptions (0 = kind default).
    pub status: u16,
    /// Resolved default disruption kind.
    pub disruptive_action: DisruptionKind,
    /// Chained child rules, flattened under the head in chain order.
    pub chain: Vec<Rule>,
}

impl Default for Rule {
    fn default() -> Self {
        Self {
            id: 0,
            parent_id: 0,
            phase: Phase::default(),
            tags: Vec::new(),
            msg: String::new(),
            severity: None,
            rev: String::new(),
            version: String::new(),
            maturity: String::new(),
            raw: String::new(),
            variables: Vec::new(),
            transformations: TransformationPipeline::new(),
            operator: RuleOperator {
                name: "unconditionalMatch".to_string(),
                argument: String::new(),
                negated: false,
                operator: Arc::new(UnconditionalMatch),
            },
            actions: Vec::new(),
            multi_match: false,
            capture: false,
            log: true,
            status: 0,
            disruptive_action: DisruptionKind::Pass,
            chain: Vec::new(),
        }
    }
}

impl Rule {
    /// Start building a rule.
    pub fn builder() -> RuleBuilder {
        RuleBuilder::new()
    }

    /// Evaluate this rule (and its chain) against a transaction.
    ///
    /// Returns the accumulated match data; an empty list means the rule did
    /// not match or its chain failed. Side effects: collection mutation via
    /// actions, capture slots, the matched-rules log, and the transaction's
    /// interruption.
    pub fn evaluate(&self, tx: &mut Transaction) -> Vec<MatchData> {
        if tx.rule_removed(self.id) {
            return Vec::new();
        }
        if self.capture {
            tx.set_capturable(true);
        }

        let mut matched = Vec::new();
        if self.variables.is_empty() {
            // Action-only rule: the operator gets the empty string once.
            if self.run_operator(tx, "") {
                matched.push(MatchData::empty());
            }
        }
        for variable in &self.variables {
            let mut exceptions = variable.exceptions.clone();
            exceptions.extend(tx.removed_targets_for(self.id, &variable.collection));

            let mut values = tx.get_field(&variable.collection, &variable.key, &exceptions);
            if variable.count {
                values = self.count_values(variable, values);
            }

            if values.is_empty() {
                // Operator gets one shot at the empty string; a hit records
                // a match on absence.
                if self.run_operator(tx, "") {
                    matched.push(MatchData::empty());
                }
                continue;
            }

            for data in values {
                let arguments = if self.multi_match {
                    self.transformations.expand(&data.value)
                } else {
                    vec![self.transformations.apply(&data.value).into_owned()]
                };
                debug!(rule_id = self.id, count = arguments.len(), "transformed arguments");
                for argument in arguments {
                    if self.run_operator(tx, &argument) {
                        matched.push(MatchData {
                            collection: data.collection.clone(),
                            key: data.key.clone(),
                            value: argument,
                        });
                    }
                }
            }
        }

        if matched.is_empty() {
            return matched;
        }
        tx.match_vars(&matched);

        // Non-disruptive and data actions run even if the chain fails below.
        for entry in &self.actions {
            if matches!(
                entry.action.kind(),
                ActionKind::NonDisruptive | ActionKind::Data
            ) {
                entry.action.evaluate(self, tx);
            }
        }
        tx.set_capturable(false);

        let mut messages = vec![tx.macro_expand(&self.msg)];
        for link in &self.chain {
            let link_matches = link.evaluate(tx);
            if link_matches.is_empty() {
                // One broken link fails the whole chain.
                return Vec::new();
            }
            messages.push(tx.macro_expand(&link.msg));
            matched.extend(link_matches);
        }

        if self.parent_id == 0 {
            for entry in &self.actions {
                if matches!(entry.action.kind(), ActionKind::Disruptive | ActionKind::Flow) {
                    entry.action.evaluate(self, tx);
                }
            }
            if self.log {
                tx.match_rule(self, messages, matched.clone());
            }
        }
        matched
    }

    /// Count semantics: with an exact key and exactly one hit, the value
    /// becomes that entry's string length; otherwise the total hit count.
    fn count_values(&self, variable: &RuleVariable, values: Vec<MatchData>) -> Vec<MatchData> {
        if let (Some(key), true) = (variable.key.exact(), values.len() == 1) {
            return vec![MatchData {
                collection: variable.collection.clone(),
                key: key.to_string(),
                value: values[0].value.len().to_string(),
            }];
        }
        vec![MatchData {
            collection: variable.collection.clone(),
            key: variable.key.exact().unwrap_or("").to_string(),
            value: values.len().to_string(),
        }]
    }

    fn run_operator(&self, tx: &mut Transaction, argument: &str) -> bool {
        let result = self.operator.operator.evaluate(tx, argument);
        if self.operator.negated {
            !result
        } else {
            result
        }
    }
}

/// Builder for compiled rules: the compiler-boundary surface.
///
/// Resolves operator, transformation and action names through the
/// registries, folds metadata actions into the record, and establishes
/// chain links.
#[derive(Default)]
pub struct RuleBuilder {
    raw: String,
    variables: Vec<(bool, String, String)>,
    exceptions: Vec<(String, String)>,
    operator: Option<(String, String, bool)>,
    transformations: Vec<String>,
    actions: Vec<(String, String)>,
    multi_match: bool,
    chain: Vec<RuleBuilder>,
}

impl RuleBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preserve the raw rule source.
    pub fn raw(mut self, source: &str) -> Self {
        self.raw = source.to_string();
        self
    }

    /// Add a target variable. An empty key selects the whole collection; a
    /// `/regex/` key selects matching keys; anything else is an exact key
    /// (macros allowed).
    pub fn variable(mut self, collection: &str, key: &str) -> Self {
        self.variables
            .push((false, collection.to_string(), key.to_string()));
        self
    }

    /// Add a counting variable (`&ARGS` style).
    pub fn count_variable(mut self, collection: &str, key: &str) -> Self {
        self.variables
            .push((true, collection.to_string(), key.to_string()));
        self
    }

    /// Exclude a key from the variable already declared for `collection`.
    pub fn except(mut self, collection: &str, key: &str) -> Self {
        self.exceptions
            .push((collection.to_string(), key.to_string()));
        self
    }

    /// Set the operator by registry name.
    pub fn operator(mut self, name: &str, argument: &str) -> Self {
        self.operator = Some((name.to_string(), argument.to_string(), false));
        self
    }

    /// Set a negated operator.
    pub fn negated_operator(mut self, name: &str, argument: &str) -> Self {
        self.operator = Some((name.to_string(), argument.to_string(), true));
        self
    }

    /// Append a transformation by registry name.
    pub fn transformation(mut self, name: &str) -> Self {
        self.transformations.push(name.to_string());
        self
    }

    /// Evaluate the operator against every intermediate transformation
    /// value instead of only the final one.
    pub fn multi_match(mut self) -> Self {
        self.multi_match = true;
        self
    }

    /// Append an action by registry name.
    pub fn action(mut self, name: &str, param: &str) -> Self {
        self.actions.push((name.to_string(), param.to_string()));
        self
    }

    /// Chain a child rule. The child's phase is ignored; the head governs.
    pub fn chain(mut self, child: RuleBuilder) -> Self {
        self.chain.push(child);
        self
    }

    /// Compile the rule.
    pub fn build(self) -> Result<Rule> {
        let mut rule = Rule {
            raw: self.raw,
            multi_match: self.multi_match,
            ..Rule::default()
        };

        for (count, collection, key) in self.variables {
            rule.variables.push(RuleVariable {
                count,
                collection: collection.to_ascii_lowercase(),
                key: parse_selector(&key)?,
                exceptions: Vec::new(),
            });
        }
        for (collection, key) in self.exceptions {
            let collection = collection.to_ascii_lowercase();
            for variable in rule.variables.iter_mut().rev() {
                if variable.collection == collection {
                    variable.exceptions.push(key);
                    break;
                }
            }
        }

        rule.transformations = TransformationPipeline::from_names(&self.transformations)?;

        let (op_name, op_arg, negated) = self
            .operator
            .unwrap_or_else(|| ("unconditionalMatch".to_string(), String::new(), false));
        rule.operator = RuleOperator {
            operator: create_operator(&op_name, &op_arg)?,
            name: op_name,
            argument: op_arg,
            negated,
        };

        for (name, param) in self.actions {
            let mut action: Box<dyn Action> = create_action(&name)?;
            action.init(&mut rule, &param)?;
            rule.actions.push(ActionEntry {
                name,
                param,
                action: Arc::from(action),
            });
        }

        // Flatten nested chains into one contiguous vector of links, all
        // owned by the head and stamped with its id and phase.
        let mut links: Vec<Rule> = Vec::new();
        for child in self.chain {
            let mut child = child.build()?;
            let grandchildren = std::mem::take(&mut child.chain);
            links.push(child);
            links.extend(grandchildren);
        }
        for link in &mut links {
            link.parent_id = rule.id;
            link.phase = rule.phase;
        }
        rule.chain = links;

        Ok(rule)
    }
}

fn parse_selector(key: &str) -> Result<KeySelector> {
    if key.is_empty() || key == "*" {
        return Ok(KeySelector::Entire);
    }
    if let Some(inner) = key.strip_prefix('/').and_then(|k| k.strip_suffix('/')) {
        let pattern = regex::Regex::new(inner).map_err(|e| Error::InvalidVariable {
            selector: key.to_string(),
            message: e.to_string(),
        })?;
        return Ok(KeySelector::Pattern(pattern));
    }
    Ok(KeySelector::Exact(key.to_string()))
}
