//! Input grammar for the rule compiler
//!
//! A validated rule document arrives as plain JSON/YAML. Its node "types" are
//! not explicit discriminators: triggers carry a `platform` key, while
//! condition and action nodes are recognized by *which* keys are present.
//! This crate turns that ambiguous surface into three closed tagged unions -
//! [`TriggerSpec`], [`ConditionNode`] and [`ActionNode`] - via explicit,
//! ordered candidate-key scans with first-match-wins priority, so dissection
//! downstream is an exhaustive `match` instead of a key-probing chain.
//!
//! Shapes the source recognized but never implemented (variable assignment,
//! wait-for-expression) classify into [`ActionNode::Unsupported`]; that
//! boundary is deliberate and no semantics are invented for it.

pub mod action;
pub mod condition;
pub mod error;
pub mod rule;
pub mod trigger;

pub use action::{
    ActionNode, ChooseAction, ChooseBranch, DeviceAction, EventAction, IfAction, RepeatSpec,
    ServiceAction, StopAction, Target, UnsupportedKind, WaitForTriggerAction,
};
pub use condition::{
    ConditionLeaf, ConditionNode, DeviceCondition, NumericStateCondition, StateCondition,
    SunCondition, TemplateCondition, TimeCondition, TriggerRefCondition, ZoneCondition,
};
pub use error::{GrammarError, GrammarResult};
pub use rule::RuleConfig;
pub use trigger::{
    CalendarEvent, CalendarTrigger, ConversationTrigger, DeviceTrigger, EntityIdSpec,
    EventTrigger, GeoLocationTrigger, LifecycleEvent, LifecycleTrigger, MqttTrigger,
    NotificationTrigger, NumericStateTrigger, NumericValue, OneOrMany, StateMatch, StateTrigger,
    SunEvent, SunTrigger, TagTrigger, TemplateTrigger, TimePatternTrigger, TimeTrigger,
    TriggerSpec, WebhookTrigger, ZoneEvent, ZoneTrigger,
};
