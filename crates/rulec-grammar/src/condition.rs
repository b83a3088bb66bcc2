//! Condition shapes
//!
//! A condition tree has no discriminator field. Nodes are recognized by key
//! presence through a fixed, ordered candidate scan - `and`, `or`, `not`,
//! then `condition` - with first match winning, which reproduces the
//! source's implicit priority. The classic `{"condition": "and",
//! "conditions": [...]}` spelling lands on the same variants as the
//! shorthand keys.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GrammarError, GrammarResult};
use crate::trigger::{parse, require, EntityIdSpec, NumericValue, OneOrMany, StateMatch, SunEvent};

/// Candidate keys, scanned in order; first match wins
const CANDIDATE_KEYS: [&str; 4] = ["and", "or", "not", "condition"];

/// Condition tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConditionNode {
    /// All children must pass
    And(Vec<ConditionNode>),

    /// Any child must pass
    Or(Vec<ConditionNode>),

    /// No child may pass
    Not(Vec<ConditionNode>),

    /// A single test
    Leaf(ConditionLeaf),
}

/// Leaf condition, one variant per supported kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConditionLeaf {
    State(StateCondition),
    NumericState(NumericStateCondition),
    Device(DeviceCondition),
    Time(TimeCondition),
    Sun(SunCondition),
    Template(TemplateCondition),
    Trigger(TriggerRefCondition),
    Zone(ZoneCondition),
}

/// State match condition
///
/// The state set may contain entity references; those become comparison
/// partners during dissection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateCondition {
    pub entity_id: EntityIdSpec,

    pub state: StateMatch,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#for: Option<Value>,
}

/// Numeric range condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStateCondition {
    pub entity_id: EntityIdSpec,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub above: Option<NumericValue>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub below: Option<NumericValue>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_template: Option<String>,
}

/// Device capability condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCondition {
    pub device_id: String,

    pub domain: String,

    pub r#type: String,
}

/// Scheduled time / weekday condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeCondition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub weekday: Vec<String>,
}

/// Sun-relative time condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SunCondition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<SunEvent>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_offset: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<SunEvent>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_offset: Option<String>,
}

/// Templated condition; the expression stays an opaque blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateCondition {
    pub value_template: String,
}

/// "Did trigger X fire" condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRefCondition {
    pub id: OneOrMany<String>,
}

/// Zone membership condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneCondition {
    /// Subjects that must all be inside the zone
    pub entity_id: EntityIdSpec,

    pub zone: String,
}

impl ConditionNode {
    /// Classify one condition node via the ordered candidate-key scan
    pub fn classify(value: &Value) -> GrammarResult<Self> {
        let map = value.as_object().ok_or(GrammarError::NotAMapping {
            grammar: "condition",
        })?;

        for key in CANDIDATE_KEYS {
            let Some(found) = map.get(key) else {
                continue;
            };

            return match key {
                "and" => Ok(ConditionNode::And(classify_children(found, "and")?)),
                "or" => Ok(ConditionNode::Or(classify_children(found, "or")?)),
                "not" => Ok(ConditionNode::Not(classify_children(found, "not")?)),
                "condition" => Self::classify_tagged(value, map, found),
                _ => unreachable!(),
            };
        }

        Err(GrammarError::UnknownShape {
            grammar: "condition",
            detail: format!(
                "no candidate key among {:?} present",
                CANDIDATE_KEYS
            ),
        })
    }

    /// Classic spelling: the `condition` key names the kind
    fn classify_tagged(
        value: &Value,
        map: &serde_json::Map<String, Value>,
        kind: &Value,
    ) -> GrammarResult<Self> {
        let kind = kind.as_str().ok_or_else(|| GrammarError::Invalid {
            shape: "condition".to_string(),
            reason: "\"condition\" key must be a string".to_string(),
        })?;

        let leaf = match kind {
            "and" | "or" | "not" => {
                let children = map
                    .get("conditions")
                    .ok_or_else(|| GrammarError::missing(kind, "conditions"))?;
                let children = classify_children(children, "conditions")?;
                return Ok(match kind {
                    "and" => ConditionNode::And(children),
                    "or" => ConditionNode::Or(children),
                    _ => ConditionNode::Not(children),
                });
            }
            "state" => {
                require(map, "state", &["entity_id", "state"])?;
                ConditionLeaf::State(parse(value, "state")?)
            }
            "numeric_state" => {
                require(map, "numeric_state", &["entity_id"])?;
                let leaf: NumericStateCondition = parse(value, "numeric_state")?;
                if leaf.above.is_none() && leaf.below.is_none() {
                    return Err(GrammarError::Invalid {
                        shape: "numeric_state".to_string(),
                        reason: "requires at least one of \"above\"/\"below\"".to_string(),
                    });
                }
                ConditionLeaf::NumericState(leaf)
            }
            "device" => {
                require(map, "device", &["device_id", "domain", "type"])?;
                ConditionLeaf::Device(parse(value, "device")?)
            }
            "time" => {
                let leaf: TimeCondition = parse(value, "time")?;
                if leaf.after.is_none() && leaf.before.is_none() && leaf.weekday.is_empty() {
                    return Err(GrammarError::Invalid {
                        shape: "time".to_string(),
                        reason: "requires at least one of \"after\"/\"before\"/\"weekday\""
                            .to_string(),
                    });
                }
                ConditionLeaf::Time(leaf)
            }
            "sun" => {
                let leaf: SunCondition = parse(value, "sun")?;
                if leaf.after.is_none() && leaf.before.is_none() {
                    return Err(GrammarError::Invalid {
                        shape: "sun".to_string(),
                        reason: "requires at least one of \"after\"/\"before\"".to_string(),
                    });
                }
                ConditionLeaf::Sun(leaf)
            }
            "template" => {
                require(map, "template", &["value_template"])?;
                ConditionLeaf::Template(parse(value, "template")?)
            }
            "trigger" => {
                require(map, "trigger", &["id"])?;
                ConditionLeaf::Trigger(parse(value, "trigger")?)
            }
            "zone" => {
                require(map, "zone", &["entity_id", "zone"])?;
                ConditionLeaf::Zone(parse(value, "zone")?)
            }
            other => {
                return Err(GrammarError::UnknownShape {
                    grammar: "condition",
                    detail: other.to_string(),
                })
            }
        };

        Ok(ConditionNode::Leaf(leaf))
    }
}

/// Classify a child list (or a single child mapping) into nodes
pub(crate) fn classify_children(value: &Value, shape: &'static str) -> GrammarResult<Vec<ConditionNode>> {
    match value {
        Value::Array(items) => items.iter().map(ConditionNode::classify).collect(),
        Value::Object(_) => Ok(vec![ConditionNode::classify(value)?]),
        _ => Err(GrammarError::Invalid {
            shape: shape.to_string(),
            reason: "children must be a mapping or a list of mappings".to_string(),
        }),
    }
}
