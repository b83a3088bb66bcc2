//! Trigger shapes
//!
//! Triggers describe the external occurrences that can start a rule. Unlike
//! condition and action nodes they carry a real discriminator: the `platform`
//! key. Classification still goes through one explicit dispatch table so that
//! an unknown platform or a missing required key fails with a precise error.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{GrammarError, GrammarResult};

/// Entity ID specification (single or list)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityIdSpec {
    Single(String),
    List(Vec<String>),
}

impl EntityIdSpec {
    /// Get all entity IDs
    pub fn ids(&self) -> Vec<&str> {
        match self {
            EntityIdSpec::Single(id) => vec![id.as_str()],
            EntityIdSpec::List(ids) => ids.iter().map(|s| s.as_str()).collect(),
        }
    }
}

/// State match specification (single value or list of equivalent values)
///
/// `List` is tried first: a bare `Value` matches anything, including arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateMatch {
    List(Vec<Value>),
    Single(Value),
}

impl StateMatch {
    /// Get all candidate values
    pub fn values(&self) -> Vec<&Value> {
        match self {
            StateMatch::Single(v) => vec![v],
            StateMatch::List(vs) => vs.iter().collect(),
        }
    }
}

/// Numeric bound (literal or reference to another entity)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericValue {
    Literal(f64),
    Entity(String),
}

/// One-or-many wrapper for keys that accept a scalar or a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// Get all values
    pub fn values(&self) -> Vec<&T> {
        match self {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(vs) => vs.iter().collect(),
        }
    }
}

/// Zone crossing direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneEvent {
    Enter,
    Leave,
}

/// Sun event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SunEvent {
    Sunrise,
    Sunset,
}

/// Calendar event edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarEvent {
    Start,
    End,
}

/// Runtime lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Start,
    Shutdown,
}

/// Trigger specification, one variant per supported platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TriggerSpec {
    /// State change of one or more entities
    State(StateTrigger),

    /// Numeric value crossing a bound pair
    NumericState(NumericStateTrigger),

    /// A fired event with optional payload match
    Event(EventTrigger),

    /// A fixed clock time (or a datetime entity)
    Time(TimeTrigger),

    /// A cron-like time pattern
    TimePattern(TimePatternTrigger),

    /// Sunrise/sunset with optional offset
    Sun(SunTrigger),

    /// A scanned tag
    Tag(TagTrigger),

    /// A templated expression turning true
    Template(TemplateTrigger),

    /// A notification record updating
    Notification(NotificationTrigger),

    /// An inbound webhook call
    Webhook(WebhookTrigger),

    /// A subject entering or leaving a zone
    Zone(ZoneTrigger),

    /// A geo-location source entering or leaving a zone
    GeoLocation(GeoLocationTrigger),

    /// A device capability event
    Device(DeviceTrigger),

    /// A calendar event starting or ending
    Calendar(CalendarTrigger),

    /// A spoken command
    Conversation(ConversationTrigger),

    /// A message-bus delivery on a topic
    Mqtt(MqttTrigger),

    /// A runtime lifecycle event
    Lifecycle(LifecycleTrigger),
}

/// State change trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTrigger {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Entity IDs to monitor; a list means equivalent alternatives
    pub entity_id: EntityIdSpec,

    /// Previous state to match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<StateMatch>,

    /// New state to match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<StateMatch>,

    /// Attribute to monitor instead of the state itself
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,

    /// Hold duration; opaque to the decision logic
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#for: Option<Value>,
}

/// Numeric range trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStateTrigger {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub entity_id: EntityIdSpec,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,

    /// Lower bound (exclusive); literal or entity reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub above: Option<NumericValue>,

    /// Upper bound (exclusive); literal or entity reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub below: Option<NumericValue>,

    /// Value-extraction template; opaque blob
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_template: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#for: Option<Value>,
}

/// Fired event trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTrigger {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Event types; a list means equivalent alternatives
    pub event_type: OneOrMany<String>,

    /// Payload to match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_data: Option<Value>,
}

/// Clock time trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeTrigger {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// HH:MM:SS strings or datetime entity ids; a list means alternatives
    pub at: OneOrMany<String>,
}

/// Time pattern trigger (cron-like)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimePatternTrigger {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds: Option<String>,
}

/// Sun event trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SunTrigger {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub event: SunEvent,

    /// Offset from the event, e.g. "-00:30:00"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
}

/// Tag scan trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagTrigger {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Tag ids; a list means equivalent alternatives
    pub tag_id: OneOrMany<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<OneOrMany<String>>,
}

/// Template trigger; the expression stays an opaque blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateTrigger {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub value_template: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#for: Option<Value>,
}

/// Notification update trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationTrigger {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_type: Option<OneOrMany<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<String>,
}

/// Webhook call trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookTrigger {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub webhook_id: String,

    /// Allowed HTTP methods; defaults applied at dissection time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_methods: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_only: Option<bool>,
}

/// Zone enter/leave trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneTrigger {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Tracked subjects (person/device_tracker)
    pub entity_id: EntityIdSpec,

    /// Zone entity
    pub zone: String,

    pub event: ZoneEvent,
}

/// Geo-location trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocationTrigger {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Geo-location source attribute value
    pub source: String,

    pub zone: String,

    pub event: ZoneEvent,
}

/// Device capability event trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceTrigger {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub device_id: String,

    pub domain: String,

    pub r#type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
}

/// Calendar event trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarTrigger {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub event: CalendarEvent,

    pub entity_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
}

/// Spoken command trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTrigger {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Command phrases; a list means equivalent alternatives
    pub command: OneOrMany<String>,
}

/// Message-bus delivery trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttTrigger {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub topic: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

/// Runtime lifecycle trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleTrigger {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub event: LifecycleEvent,
}

impl TriggerSpec {
    /// Get the trigger's declared id, if any
    pub fn id(&self) -> Option<&str> {
        match self {
            TriggerSpec::State(t) => t.id.as_deref(),
            TriggerSpec::NumericState(t) => t.id.as_deref(),
            TriggerSpec::Event(t) => t.id.as_deref(),
            TriggerSpec::Time(t) => t.id.as_deref(),
            TriggerSpec::TimePattern(t) => t.id.as_deref(),
            TriggerSpec::Sun(t) => t.id.as_deref(),
            TriggerSpec::Tag(t) => t.id.as_deref(),
            TriggerSpec::Template(t) => t.id.as_deref(),
            TriggerSpec::Notification(t) => t.id.as_deref(),
            TriggerSpec::Webhook(t) => t.id.as_deref(),
            TriggerSpec::Zone(t) => t.id.as_deref(),
            TriggerSpec::GeoLocation(t) => t.id.as_deref(),
            TriggerSpec::Device(t) => t.id.as_deref(),
            TriggerSpec::Calendar(t) => t.id.as_deref(),
            TriggerSpec::Conversation(t) => t.id.as_deref(),
            TriggerSpec::Mqtt(t) => t.id.as_deref(),
            TriggerSpec::Lifecycle(t) => t.id.as_deref(),
        }
    }

    /// Get the platform name
    pub fn platform(&self) -> &'static str {
        match self {
            TriggerSpec::State(_) => "state",
            TriggerSpec::NumericState(_) => "numeric_state",
            TriggerSpec::Event(_) => "event",
            TriggerSpec::Time(_) => "time",
            TriggerSpec::TimePattern(_) => "time_pattern",
            TriggerSpec::Sun(_) => "sun",
            TriggerSpec::Tag(_) => "tag",
            TriggerSpec::Template(_) => "template",
            TriggerSpec::Notification(_) => "persistent_notification",
            TriggerSpec::Webhook(_) => "webhook",
            TriggerSpec::Zone(_) => "zone",
            TriggerSpec::GeoLocation(_) => "geo_location",
            TriggerSpec::Device(_) => "device",
            TriggerSpec::Calendar(_) => "calendar",
            TriggerSpec::Conversation(_) => "conversation",
            TriggerSpec::Mqtt(_) => "mqtt",
            TriggerSpec::Lifecycle(_) => "homeassistant",
        }
    }

    /// Classify one trigger node by its `platform` discriminator
    pub fn classify(value: &Value) -> GrammarResult<Self> {
        let map = value
            .as_object()
            .ok_or(GrammarError::NotAMapping { grammar: "trigger" })?;

        let platform = map
            .get("platform")
            .and_then(Value::as_str)
            .ok_or_else(|| GrammarError::missing("trigger", "platform"))?;

        let spec = match platform {
            "state" => {
                require(map, "state", &["entity_id"])?;
                TriggerSpec::State(parse(value, "state")?)
            }
            "numeric_state" => {
                require(map, "numeric_state", &["entity_id"])?;
                let trigger: NumericStateTrigger = parse(value, "numeric_state")?;
                if trigger.above.is_none() && trigger.below.is_none() {
                    return Err(GrammarError::Invalid {
                        shape: "numeric_state".to_string(),
                        reason: "requires at least one of \"above\"/\"below\"".to_string(),
                    });
                }
                TriggerSpec::NumericState(trigger)
            }
            "event" => {
                require(map, "event", &["event_type"])?;
                TriggerSpec::Event(parse(value, "event")?)
            }
            "time" => {
                require(map, "time", &["at"])?;
                TriggerSpec::Time(parse(value, "time")?)
            }
            "time_pattern" => {
                let trigger: TimePatternTrigger = parse(value, "time_pattern")?;
                if trigger.hours.is_none() && trigger.minutes.is_none() && trigger.seconds.is_none()
                {
                    return Err(GrammarError::Invalid {
                        shape: "time_pattern".to_string(),
                        reason: "requires at least one of \"hours\"/\"minutes\"/\"seconds\""
                            .to_string(),
                    });
                }
                TriggerSpec::TimePattern(trigger)
            }
            "sun" => {
                require(map, "sun", &["event"])?;
                TriggerSpec::Sun(parse(value, "sun")?)
            }
            "tag" => {
                require(map, "tag", &["tag_id"])?;
                TriggerSpec::Tag(parse(value, "tag")?)
            }
            "template" => {
                require(map, "template", &["value_template"])?;
                TriggerSpec::Template(parse(value, "template")?)
            }
            "persistent_notification" => {
                TriggerSpec::Notification(parse(value, "persistent_notification")?)
            }
            "webhook" => {
                require(map, "webhook", &["webhook_id"])?;
                TriggerSpec::Webhook(parse(value, "webhook")?)
            }
            "zone" => {
                require(map, "zone", &["entity_id", "zone", "event"])?;
                TriggerSpec::Zone(parse(value, "zone")?)
            }
            "geo_location" => {
                require(map, "geo_location", &["source", "zone", "event"])?;
                TriggerSpec::GeoLocation(parse(value, "geo_location")?)
            }
            "device" => {
                require(map, "device", &["device_id", "domain", "type"])?;
                TriggerSpec::Device(parse(value, "device")?)
            }
            "calendar" => {
                require(map, "calendar", &["event", "entity_id"])?;
                TriggerSpec::Calendar(parse(value, "calendar")?)
            }
            "conversation" => {
                require(map, "conversation", &["command"])?;
                TriggerSpec::Conversation(parse(value, "conversation")?)
            }
            "mqtt" => {
                require(map, "mqtt", &["topic"])?;
                TriggerSpec::Mqtt(parse(value, "mqtt")?)
            }
            "homeassistant" => {
                require(map, "homeassistant", &["event"])?;
                TriggerSpec::Lifecycle(parse(value, "homeassistant")?)
            }
            other => {
                return Err(GrammarError::UnknownShape {
                    grammar: "trigger",
                    detail: other.to_string(),
                })
            }
        };

        Ok(spec)
    }
}

/// Check that every required key is present before deserializing
pub(crate) fn require(
    map: &Map<String, Value>,
    shape: &'static str,
    keys: &[&'static str],
) -> GrammarResult<()> {
    for key in keys {
        if !map.contains_key(*key) {
            return Err(GrammarError::missing(shape, *key));
        }
    }
    Ok(())
}

/// Deserialize a recognized shape, reporting the shape name on failure
pub(crate) fn parse<T: DeserializeOwned>(value: &Value, shape: &'static str) -> GrammarResult<T> {
    serde_json::from_value(value.clone()).map_err(|source| GrammarError::Malformed {
        shape: shape.to_string(),
        source,
    })
}
