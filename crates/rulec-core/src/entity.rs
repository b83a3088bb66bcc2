//! Entity records
//!
//! An entity is one flattened, positionally-addressable external value a rule
//! references: a sensor reading, a zone, a service target. Dissection produces
//! them in tree order; persistence and test-case enumeration consume them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Core record errors
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("expected value for entity '{0}' is present but empty")]
    EmptyExpectedValue(String),
}

/// Result type for core record operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Role an entity plays in the emitted decision program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterRole {
    /// Read by the trigger section
    Start,

    /// Read by the condition or action section
    Input,

    /// Written by a terminal effect; never read from an input array
    Output,
}

/// Constraint on the value an entity is compared against
///
/// Test enumeration draws candidate vectors from this; persistence stores it
/// verbatim. An `ExpectedValue` is never empty: constructors return `None`
/// instead of an empty set or an unbounded range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedValue {
    /// A single literal the input slot is compared to
    Literal(Value),

    /// A set of equivalent literals (membership comparison)
    OneOf(Vec<Value>),

    /// A numeric bound pair; at least one bound is present
    Range {
        #[serde(skip_serializing_if = "Option::is_none")]
        above: Option<f64>,

        #[serde(skip_serializing_if = "Option::is_none")]
        below: Option<f64>,
    },

    /// A reference to another entity's namespace-qualified name
    EntityName(String),
}

impl ExpectedValue {
    /// Build a `OneOf`, or `None` for an empty candidate set
    pub fn one_of(values: Vec<Value>) -> Option<Self> {
        if values.is_empty() {
            None
        } else {
            Some(ExpectedValue::OneOf(values))
        }
    }

    /// Build a `Range`, or `None` when both bounds are absent
    pub fn range(above: Option<f64>, below: Option<f64>) -> Option<Self> {
        if above.is_none() && below.is_none() {
            None
        } else {
            Some(ExpectedValue::Range { above, below })
        }
    }

    /// True when the constraint carries no usable content
    ///
    /// The entity invariant is "present-and-non-empty or entirely absent";
    /// the orchestrator re-checks this over the final list.
    pub fn is_empty(&self) -> bool {
        match self {
            ExpectedValue::Literal(_) => false,
            ExpectedValue::OneOf(values) => values.is_empty(),
            ExpectedValue::Range { above, below } => above.is_none() && below.is_none(),
            ExpectedValue::EntityName(name) => name.is_empty(),
        }
    }
}

/// One flattened external value a rule references
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Source-kind namespace (`sensor`, `light`, `zone`, `group`, ...)
    pub domain: String,

    /// Namespace-qualified name (`sensor.outdoor_temp`)
    pub name: String,

    /// Role in the emitted decision program
    pub role: ParameterRole,

    /// Tree-shape back-reference to another entity's `position`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<usize>,

    /// Index in the full entity+grouping tree of one section
    pub position: usize,

    /// Expected-value constraint; present-and-non-empty or absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<ExpectedValue>,
}

impl Entity {
    /// Whether this entity occupies a slot in the flat input array
    ///
    /// Grouping parents, zone meta-entities and id-only trigger references
    /// advance `position` only; everything else is read through an array
    /// index by the emitted program.
    pub fn occupies_slot(&self) -> bool {
        if self.role == ParameterRole::Output {
            return false;
        }
        !matches!(self.domain.as_str(), "group" | "zone" | "trigger")
    }

    /// Validate the expected-value invariant
    pub fn validate(&self) -> CoreResult<()> {
        match &self.expected {
            Some(expected) if expected.is_empty() => {
                Err(CoreError::EmptyExpectedValue(self.name.clone()))
            }
            _ => Ok(()),
        }
    }
}

/// Deduplicate entities by namespace-qualified name, keeping first occurrence
///
/// Persistence stores one row per name; dissection may reference the same
/// external value from several sections.
pub fn dedup_by_name(entities: &[Entity]) -> Vec<&Entity> {
    let mut seen = indexmap::IndexSet::new();
    entities
        .iter()
        .filter(|e| seen.insert(e.name.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(name: &str, domain: &str, role: ParameterRole) -> Entity {
        Entity {
            domain: domain.to_string(),
            name: name.to_string(),
            role,
            parent: None,
            position: 0,
            expected: None,
        }
    }

    #[test]
    fn test_one_of_rejects_empty() {
        assert!(ExpectedValue::one_of(vec![]).is_none());
        assert!(ExpectedValue::one_of(vec![json!("on")]).is_some());
    }

    #[test]
    fn test_range_rejects_unbounded() {
        assert!(ExpectedValue::range(None, None).is_none());
        let range = ExpectedValue::range(Some(10.0), None).unwrap();
        assert!(!range.is_empty());
    }

    #[test]
    fn test_occupies_slot() {
        assert!(entity("sensor.temp", "sensor", ParameterRole::Start).occupies_slot());
        assert!(!entity("group.0", "group", ParameterRole::Start).occupies_slot());
        assert!(!entity("zone.home", "zone", ParameterRole::Input).occupies_slot());
        assert!(!entity("trigger.motion", "trigger", ParameterRole::Input).occupies_slot());
        assert!(!entity("light.kitchen", "light", ParameterRole::Output).occupies_slot());
    }

    #[test]
    fn test_validate_rejects_empty_expected() {
        let mut e = entity("sensor.temp", "sensor", ParameterRole::Start);
        e.expected = Some(ExpectedValue::OneOf(vec![]));
        assert!(e.validate().is_err());

        e.expected = Some(ExpectedValue::Literal(json!("on")));
        assert!(e.validate().is_ok());

        e.expected = None;
        assert!(e.validate().is_ok());
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let mut a = entity("sensor.temp", "sensor", ParameterRole::Start);
        a.expected = Some(ExpectedValue::Literal(json!(1)));
        let b = entity("light.kitchen", "light", ParameterRole::Output);
        let c = entity("sensor.temp", "sensor", ParameterRole::Input);

        let binding = [a.clone(), b, c];
        let deduped = dedup_by_name(&binding);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].role, ParameterRole::Start);
    }

    #[test]
    fn test_entity_serde_round_trip() {
        let e = Entity {
            domain: "sensor".to_string(),
            name: "sensor.temp".to_string(),
            role: ParameterRole::Start,
            parent: Some(2),
            position: 3,
            expected: Some(ExpectedValue::Range {
                above: Some(10.0),
                below: Some(50.0),
            }),
        };

        let value = serde_json::to_value(&e).unwrap();
        assert_eq!(value["role"], "start");
        let back: Entity = serde_json::from_value(value).unwrap();
        assert_eq!(back, e);
    }
}
