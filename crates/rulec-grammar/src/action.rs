//! Action shapes
//!
//! Action nodes are pure key-presence grammar: `{"choose": ...}` is a
//! multi-branch, `{"repeat": ...}` a loop, `{"service": ...}` a call. The
//! classifier scans a fixed, ordered candidate-key list and the first match
//! wins, reproducing the source's implicit dispatch priority. Variable
//! assignment and wait-for-expression are recognized but deliberately carry
//! no semantics; they classify into [`ActionNode::Unsupported`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::condition::{classify_children, ConditionNode};
use crate::error::{GrammarError, GrammarResult};
use crate::trigger::{EntityIdSpec, OneOrMany, TriggerSpec};

/// Candidate keys, scanned in order; first match wins
const CANDIDATE_KEYS: [&str; 13] = [
    "choose",
    "repeat",
    "parallel",
    "if",
    "sequence",
    "wait_for_trigger",
    "wait_template",
    "variables",
    "event",
    "service",
    "device_id",
    "stop",
    "condition",
];

/// Action-list node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionNode {
    /// Multi-branch choose with optional default
    Choose(ChooseAction),

    /// Repetition (count / for-each / while / until)
    Repeat(RepeatSpec),

    /// Parallel fan-out
    Parallel(Vec<ActionNode>),

    /// Conditional if/then/else
    If(IfAction),

    /// Plain nested sequence
    Sequence(Vec<ActionNode>),

    /// Wait for one of N sub-triggers, with optional timeout
    WaitForTrigger(WaitForTriggerAction),

    /// Bare assertion halting the action list when false
    Guard(ConditionNode),

    /// Terminal effect: fire an event
    Event(EventAction),

    /// Terminal effect: call a capability
    Service(ServiceAction),

    /// Terminal effect: toggle a device capability
    Device(DeviceAction),

    /// Explicit stop
    Stop(StopAction),

    /// Recognized shape with deliberately absent semantics
    Unsupported(UnsupportedKind),
}

/// Shapes the source recognized but never implemented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsupportedKind {
    /// Variable assignment (`variables`)
    Variables,

    /// Wait-for-expression (`wait_template`)
    WaitTemplate,
}

/// Multi-branch choose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChooseAction {
    /// Branches in declaration order
    pub branches: Vec<ChooseBranch>,

    /// Trailing else, when declared
    pub default: Option<Vec<ActionNode>>,
}

/// One choose branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChooseBranch {
    /// Guard clauses, AND-combined
    pub conditions: Vec<ConditionNode>,

    /// Branch body
    pub sequence: Vec<ActionNode>,
}

/// Conditional if/then/else
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfAction {
    /// Guard clauses, AND-combined
    pub conditions: Vec<ConditionNode>,

    pub then: Vec<ActionNode>,

    /// Else branch; `Some(vec![])` is a declared-but-empty branch
    pub r#else: Option<Vec<ActionNode>>,
}

/// Repetition kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RepeatSpec {
    /// Fixed iteration count
    Count {
        count: u64,
        sequence: Vec<ActionNode>,
    },

    /// Iterate a literal item list
    ForEach {
        items: Vec<Value>,
        sequence: Vec<ActionNode>,
    },

    /// Loop while the guard holds
    While {
        conditions: Vec<ConditionNode>,
        sequence: Vec<ActionNode>,
    },

    /// Loop until the guard holds
    Until {
        conditions: Vec<ConditionNode>,
        sequence: Vec<ActionNode>,
    },
}

/// Wait for one of N sub-triggers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitForTriggerAction {
    /// Candidate triggers, OR-combined
    pub triggers: Vec<TriggerSpec>,

    /// Opaque timeout spec
    pub timeout: Option<Value>,

    /// Continue past a timeout instead of halting
    pub continue_on_timeout: bool,
}

/// Fire-event effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAction {
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_data: Option<Value>,
}

/// Capability-call effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceAction {
    /// Capability to call, e.g. "light.turn_on"
    pub service: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,

    /// Legacy top-level target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityIdSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ServiceAction {
    /// The entity the effect record is keyed by: first targeted entity id,
    /// falling back to the capability name for target-less calls
    pub fn primary_target(&self) -> &str {
        if let Some(target) = &self.target {
            if let Some(spec) = &target.entity_id {
                if let Some(first) = spec.ids().first() {
                    return first;
                }
            }
        }
        if let Some(spec) = &self.entity_id {
            if let Some(first) = spec.ids().first() {
                return first;
            }
        }
        &self.service
    }
}

/// Service-call target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Target {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityIdSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<OneOrMany<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_id: Option<OneOrMany<String>>,
}

/// Device-capability effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceAction {
    pub device_id: String,

    pub domain: String,

    pub r#type: String,
}

/// Explicit stop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopAction {
    /// Stop reason
    pub stop: String,
}

impl ActionNode {
    /// Classify one action node via the ordered candidate-key scan
    pub fn classify(value: &Value) -> GrammarResult<Self> {
        let map = value
            .as_object()
            .ok_or(GrammarError::NotAMapping { grammar: "action" })?;

        for key in CANDIDATE_KEYS {
            let Some(found) = map.get(key) else {
                continue;
            };

            return match key {
                "choose" => classify_choose(map, found),
                "repeat" => classify_repeat(found),
                "parallel" => Ok(ActionNode::Parallel(classify_sequence(found, "parallel")?)),
                "if" => classify_if(map, found),
                "sequence" => Ok(ActionNode::Sequence(classify_sequence(found, "sequence")?)),
                "wait_for_trigger" => classify_wait(map, found),
                "wait_template" => Ok(ActionNode::Unsupported(UnsupportedKind::WaitTemplate)),
                "variables" => Ok(ActionNode::Unsupported(UnsupportedKind::Variables)),
                "event" => {
                    let action: EventAction = crate::trigger::parse(value, "event")?;
                    Ok(ActionNode::Event(action))
                }
                "service" => {
                    let action: ServiceAction = crate::trigger::parse(value, "service")?;
                    Ok(ActionNode::Service(action))
                }
                "device_id" => {
                    crate::trigger::require(map, "device", &["device_id", "domain", "type"])?;
                    let action: DeviceAction = crate::trigger::parse(value, "device")?;
                    Ok(ActionNode::Device(action))
                }
                "stop" => {
                    let reason = found.as_str().ok_or_else(|| GrammarError::Invalid {
                        shape: "stop".to_string(),
                        reason: "\"stop\" key must carry a reason string".to_string(),
                    })?;
                    Ok(ActionNode::Stop(StopAction {
                        stop: reason.to_string(),
                    }))
                }
                "condition" => Ok(ActionNode::Guard(ConditionNode::classify(value)?)),
                _ => unreachable!(),
            };
        }

        Err(GrammarError::UnknownShape {
            grammar: "action",
            detail: format!("no candidate key among {:?} present", CANDIDATE_KEYS),
        })
    }
}

/// Classify a body sequence (list of action nodes, or one bare node)
pub(crate) fn classify_sequence(value: &Value, shape: &'static str) -> GrammarResult<Vec<ActionNode>> {
    match value {
        Value::Array(items) => items.iter().map(ActionNode::classify).collect(),
        Value::Object(_) => Ok(vec![ActionNode::classify(value)?]),
        _ => Err(GrammarError::Invalid {
            shape: shape.to_string(),
            reason: "sequence must be a mapping or a list of mappings".to_string(),
        }),
    }
}

fn classify_choose(map: &Map<String, Value>, branches: &Value) -> GrammarResult<ActionNode> {
    let branches = branches
        .as_array()
        .ok_or_else(|| GrammarError::Invalid {
            shape: "choose".to_string(),
            reason: "\"choose\" must be a list of branches".to_string(),
        })?
        .iter()
        .map(|branch| {
            let branch_map = branch
                .as_object()
                .ok_or(GrammarError::NotAMapping { grammar: "action" })?;

            let conditions = match branch_map.get("conditions") {
                Some(found) => classify_children(found, "choose")?,
                None => Vec::new(),
            };
            let sequence = branch_map
                .get("sequence")
                .ok_or_else(|| GrammarError::missing("choose", "sequence"))?;

            Ok(ChooseBranch {
                conditions,
                sequence: classify_sequence(sequence, "choose")?,
            })
        })
        .collect::<GrammarResult<Vec<_>>>()?;

    let default = match map.get("default") {
        Some(found) => Some(classify_sequence(found, "choose")?),
        None => None,
    };

    Ok(ActionNode::Choose(ChooseAction { branches, default }))
}

fn classify_repeat(value: &Value) -> GrammarResult<ActionNode> {
    let map = value
        .as_object()
        .ok_or(GrammarError::NotAMapping { grammar: "action" })?;

    let sequence = map
        .get("sequence")
        .ok_or_else(|| GrammarError::missing("repeat", "sequence"))?;
    let sequence = classify_sequence(sequence, "repeat")?;

    // Inner kind scan, ordered, first match wins.
    for key in ["count", "for_each", "while", "until"] {
        let Some(found) = map.get(key) else {
            continue;
        };

        let spec = match key {
            "count" => {
                let count = found.as_u64().ok_or_else(|| GrammarError::Invalid {
                    shape: "repeat".to_string(),
                    reason: "\"count\" must be a non-negative number".to_string(),
                })?;
                RepeatSpec::Count { count, sequence }
            }
            "for_each" => {
                let items = match found {
                    Value::Array(items) => items.clone(),
                    other => vec![other.clone()],
                };
                RepeatSpec::ForEach { items, sequence }
            }
            "while" => RepeatSpec::While {
                conditions: classify_children(found, "repeat")?,
                sequence,
            },
            _ => RepeatSpec::Until {
                conditions: classify_children(found, "repeat")?,
                sequence,
            },
        };
        return Ok(ActionNode::Repeat(spec));
    }

    Err(GrammarError::UnknownShape {
        grammar: "action",
        detail: "repeat requires one of \"count\"/\"for_each\"/\"while\"/\"until\"".to_string(),
    })
}

fn classify_if(map: &Map<String, Value>, guard: &Value) -> GrammarResult<ActionNode> {
    let then = map
        .get("then")
        .ok_or_else(|| GrammarError::missing("if", "then"))?;

    let r#else = match map.get("else") {
        Some(found) => Some(classify_sequence(found, "if")?),
        None => None,
    };

    Ok(ActionNode::If(IfAction {
        conditions: classify_children(guard, "if")?,
        then: classify_sequence(then, "if")?,
        r#else,
    }))
}

fn classify_wait(map: &Map<String, Value>, triggers: &Value) -> GrammarResult<ActionNode> {
    let triggers = match triggers {
        Value::Array(items) => items
            .iter()
            .map(TriggerSpec::classify)
            .collect::<GrammarResult<Vec<_>>>()?,
        Value::Object(_) => vec![TriggerSpec::classify(triggers)?],
        _ => {
            return Err(GrammarError::Invalid {
                shape: "wait_for_trigger".to_string(),
                reason: "candidates must be a mapping or a list of mappings".to_string(),
            })
        }
    };

    let continue_on_timeout = map
        .get("continue_on_timeout")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    Ok(ActionNode::WaitForTrigger(WaitForTriggerAction {
        triggers,
        timeout: map.get("timeout").cloned(),
        continue_on_timeout,
    }))
}
