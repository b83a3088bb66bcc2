//! Rule documents
//!
//! A validated rule is a mapping with `trigger`, optional `condition`,
//! `action`, `mode` and `max`. This module lifts such a document (and lists
//! of them, the usual file layout) into fully classified [`RuleConfig`]
//! values.

use serde_json::Value;
use tracing::debug;

use rulec_core::ExecutionMode;

use crate::action::{classify_sequence, ActionNode};
use crate::condition::{classify_children, ConditionNode};
use crate::error::{GrammarError, GrammarResult};
use crate::trigger::TriggerSpec;

fn default_max() -> usize {
    10
}

/// One classified rule
#[derive(Debug, Clone, PartialEq)]
pub struct RuleConfig {
    /// Rule name (alias, id, or generated)
    pub name: String,

    /// Triggers, in declaration order
    pub triggers: Vec<TriggerSpec>,

    /// Optional condition tree; absent means always-true
    pub condition: Option<ConditionNode>,

    /// Action list, in declaration order
    pub actions: Vec<ActionNode>,

    /// Execution mode
    pub mode: ExecutionMode,

    /// Maximum concurrent instances
    pub max: usize,
}

impl RuleConfig {
    /// Classify one rule document
    pub fn from_value(value: &Value) -> GrammarResult<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| GrammarError::Document("rule must be a mapping".to_string()))?;

        let name = map
            .get("alias")
            .or_else(|| map.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| ulid::Ulid::new().to_string());

        let triggers = match map.get("trigger").or_else(|| map.get("triggers")) {
            Some(Value::Array(items)) => items
                .iter()
                .map(TriggerSpec::classify)
                .collect::<GrammarResult<Vec<_>>>()?,
            Some(single @ Value::Object(_)) => vec![TriggerSpec::classify(single)?],
            Some(_) => {
                return Err(GrammarError::Document(
                    "\"trigger\" must be a mapping or a list of mappings".to_string(),
                ))
            }
            None => Vec::new(),
        };

        // A bare condition list means AND over its members.
        let condition = match map.get("condition").or_else(|| map.get("conditions")) {
            Some(found @ Value::Array(_)) => {
                Some(ConditionNode::And(classify_children(found, "condition")?))
            }
            Some(found @ Value::Object(_)) => Some(ConditionNode::classify(found)?),
            Some(_) => {
                return Err(GrammarError::Document(
                    "\"condition\" must be a mapping or a list of mappings".to_string(),
                ))
            }
            None => None,
        };

        let actions = match map.get("action").or_else(|| map.get("actions")) {
            Some(found) => classify_sequence(found, "action")?,
            None => Vec::new(),
        };

        let mode = match map.get("mode") {
            Some(found) => {
                serde_json::from_value(found.clone()).map_err(|source| GrammarError::Malformed {
                    shape: "mode".to_string(),
                    source,
                })?
            }
            None => ExecutionMode::default(),
        };

        let max = map
            .get("max")
            .and_then(Value::as_u64)
            .map(|m| m as usize)
            .unwrap_or_else(default_max);

        debug!(
            rule = %name,
            triggers = triggers.len(),
            actions = actions.len(),
            "classified rule document"
        );

        Ok(RuleConfig {
            name,
            triggers,
            condition,
            actions,
            mode,
            max,
        })
    }

    /// Classify a YAML document holding one rule or a list of rules
    pub fn from_yaml(text: &str) -> GrammarResult<Vec<Self>> {
        let yaml: serde_yaml::Value = serde_yaml::from_str(text)
            .map_err(|e| GrammarError::Document(format!("YAML parse failure: {e}")))?;
        let json = serde_json::to_value(yaml)
            .map_err(|e| GrammarError::Document(format!("non-JSON YAML structure: {e}")))?;
        Self::from_document(&json)
    }

    /// Classify a JSON value holding one rule or a list of rules
    pub fn from_document(value: &Value) -> GrammarResult<Vec<Self>> {
        match value {
            Value::Array(items) => items.iter().map(Self::from_value).collect(),
            Value::Object(_) => Ok(vec![Self::from_value(value)?]),
            _ => Err(GrammarError::Document(
                "rule document must be a mapping or a list of mappings".to_string(),
            )),
        }
    }
}
