//! Trigger dissection
//!
//! Walks the trigger list, allocating one entity per referenced external
//! value (one grouping parent plus one sibling per equivalent alternative)
//! and emitting the OR-combined boolean evaluator. Each trigger renders as
//! its own guarded block returning `(True, <id>)`, so the first satisfied
//! spec wins and reports its declared id.

use serde::Serialize;
use serde_json::{json, Value};

use rulec_core::ExpectedValue;
use rulec_emitter::{py_literal, slugify, ScriptEmitter};
use rulec_grammar::{
    ConversationTrigger, DeviceTrigger, EventTrigger, GeoLocationTrigger, LifecycleTrigger,
    MqttTrigger, NotificationTrigger, NumericStateTrigger, StateTrigger, SunTrigger, TagTrigger,
    TemplateTrigger, TimePatternTrigger, TimeTrigger, TriggerSpec, WebhookTrigger, ZoneEvent,
    ZoneTrigger,
};

use crate::comparison::{
    domain_of, guarded_eq, guarded_neq, is_entity_reference, join_or, layout_numeric, membership,
    not_null, numeric_range, qualify, template_truthy,
};
use crate::context::SectionCtx;
use crate::error::CompileResult;

/// Default allowed methods when a webhook spec names none
const WEBHOOK_DEFAULT_METHODS: [&str; 2] = ["POST", "PUT"];

fn enum_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

pub struct TriggerDissector;

impl TriggerDissector {
    /// Emit one trigger's guarded block in the trigger section
    pub fn dissect(
        spec: &TriggerSpec,
        ctx: &mut SectionCtx,
        emitter: &mut ScriptEmitter,
    ) -> CompileResult<()> {
        let expr = Self::expression(spec, ctx)?;
        emitter.open_block(true, false)?;
        emitter.append(&expr)?;
        emitter.close_block()?;
        match spec.id() {
            Some(id) => emitter.line(&format!(
                "return True, {}",
                py_literal(&Value::String(id.to_string()))
            ))?,
            None => emitter.line("return True, None")?,
        }
        emitter.end_block()?;
        Ok(())
    }

    /// Build one trigger's boolean expression, allocating its entities
    ///
    /// Also used for wait-for-trigger candidates in the action section; the
    /// context's source decides the input array and entity role.
    pub fn expression(spec: &TriggerSpec, ctx: &mut SectionCtx) -> CompileResult<String> {
        match spec {
            TriggerSpec::State(t) => state_expression(t, ctx),
            TriggerSpec::NumericState(t) => numeric_expression(t, ctx),
            TriggerSpec::Event(t) => event_expression(t, ctx),
            TriggerSpec::Time(t) => time_expression(t, ctx),
            TriggerSpec::TimePattern(t) => time_pattern_expression(t, ctx),
            TriggerSpec::Sun(t) => sun_expression(t, ctx),
            TriggerSpec::Tag(t) => tag_expression(t, ctx),
            TriggerSpec::Template(t) => template_expression(t, ctx),
            TriggerSpec::Notification(t) => notification_expression(t, ctx),
            TriggerSpec::Webhook(t) => webhook_expression(t, ctx),
            TriggerSpec::Zone(t) => zone_expression(t, ctx),
            TriggerSpec::GeoLocation(t) => geo_location_expression(t, ctx),
            TriggerSpec::Device(t) => device_expression(t, ctx),
            TriggerSpec::Calendar(t) => {
                let array = ctx.source.array_var();
                let event = enum_value(&t.event);
                let slot = ctx.alloc(
                    domain_of(&t.entity_id),
                    t.entity_id.clone(),
                    Some(ExpectedValue::Literal(event.clone())),
                );
                Ok(guarded_eq(array, slot.real_position, &event))
            }
            TriggerSpec::Conversation(t) => conversation_expression(t, ctx),
            TriggerSpec::Mqtt(t) => mqtt_expression(t, ctx),
            TriggerSpec::Lifecycle(t) => lifecycle_expression(t, ctx),
        }
    }
}

fn state_expression(t: &StateTrigger, ctx: &mut SectionCtx) -> CompileResult<String> {
    let array = ctx.source.array_var();
    let ids = t.entity_id.ids();
    let values: Vec<Value> = t
        .to
        .as_ref()
        .map(|m| m.values().into_iter().cloned().collect())
        .unwrap_or_default();
    let expected = ExpectedValue::one_of(values.clone());

    let grouped = ids.len() > 1;
    if grouped {
        let group = ctx.alloc_group();
        ctx.push_parent(group);
    }

    let mut clauses = Vec::with_capacity(ids.len());
    for id in &ids {
        let name = qualify(id, t.attribute.as_deref());
        let slot = ctx.alloc(domain_of(id), name, expected.clone());
        clauses.push(match values.as_slice() {
            [] => not_null(array, slot.real_position),
            [single] => guarded_eq(array, slot.real_position, single),
            many => membership(array, slot.real_position, many),
        });
    }

    if grouped {
        ctx.pop_parent();
    }
    Ok(join_or(&clauses))
}

fn numeric_expression(t: &NumericStateTrigger, ctx: &mut SectionCtx) -> CompileResult<String> {
    let array = ctx.source.array_var();
    let names: Vec<(String, String)> = t
        .entity_id
        .ids()
        .iter()
        .map(|id| (domain_of(id), qualify(id, t.attribute.as_deref())))
        .collect();

    let layout = layout_numeric(ctx, &names, &t.above, &t.below)?;
    let clauses: Vec<String> = layout
        .owners
        .iter()
        .map(|(_, slot)| numeric_range(array, slot.real_position, layout.above, layout.below))
        .collect();
    Ok(join_or(&clauses))
}

fn event_expression(t: &EventTrigger, ctx: &mut SectionCtx) -> CompileResult<String> {
    let array = ctx.source.array_var();
    let types = t.event_type.values();
    let expected = t.event_data.clone().map(ExpectedValue::Literal);

    let grouped = types.len() > 1;
    if grouped {
        let group = ctx.alloc_group();
        ctx.push_parent(group);
    }

    let mut clauses = Vec::with_capacity(types.len());
    for event_type in &types {
        let slot = ctx.alloc("event", format!("event.{event_type}"), expected.clone());
        clauses.push(match &t.event_data {
            Some(payload) => guarded_eq(array, slot.real_position, payload),
            None => not_null(array, slot.real_position),
        });
    }

    if grouped {
        ctx.pop_parent();
    }
    Ok(join_or(&clauses))
}

fn time_expression(t: &TimeTrigger, ctx: &mut SectionCtx) -> CompileResult<String> {
    let array = ctx.source.array_var();
    let ats = t.at.values();

    let grouped = ats.len() > 1;
    if grouped {
        let group = ctx.alloc_group();
        ctx.push_parent(group);
    }

    let mut clauses = Vec::with_capacity(ats.len());
    for at in &ats {
        if is_entity_reference(at) {
            // A datetime entity; its moment arriving is a bare presence.
            let slot = ctx.alloc(domain_of(at), at.to_string(), None);
            clauses.push(not_null(array, slot.real_position));
        } else {
            let value = json!(at);
            let slot = ctx.alloc(
                "time",
                format!("time.{at}"),
                Some(ExpectedValue::Literal(value.clone())),
            );
            clauses.push(guarded_eq(array, slot.real_position, &value));
        }
    }

    if grouped {
        ctx.pop_parent();
    }
    Ok(join_or(&clauses))
}

fn time_pattern_expression(t: &TimePatternTrigger, ctx: &mut SectionCtx) -> CompileResult<String> {
    let array = ctx.source.array_var();
    let values: Vec<Value> = [&t.hours, &t.minutes, &t.seconds]
        .into_iter()
        .flatten()
        .map(|pattern| json!(pattern))
        .collect();

    let slot = ctx.alloc(
        "time_pattern",
        "time_pattern.tick",
        ExpectedValue::one_of(values.clone()),
    );
    Ok(match values.as_slice() {
        [single] => guarded_eq(array, slot.real_position, single),
        many => membership(array, slot.real_position, many),
    })
}

fn sun_expression(t: &SunTrigger, ctx: &mut SectionCtx) -> CompileResult<String> {
    let array = ctx.source.array_var();
    let event = enum_value(&t.event);
    let mut values = vec![event.clone()];
    if let Some(offset) = &t.offset {
        values.push(json!(offset));
    }

    let slot = ctx.alloc("sun", "sun.sun", ExpectedValue::one_of(values));
    Ok(guarded_eq(array, slot.real_position, &event))
}

fn tag_expression(t: &TagTrigger, ctx: &mut SectionCtx) -> CompileResult<String> {
    let array = ctx.source.array_var();
    let tags = t.tag_id.values();

    let grouped = tags.len() > 1;
    if grouped {
        let group = ctx.alloc_group();
        ctx.push_parent(group);
    }

    let mut clauses = Vec::with_capacity(tags.len());
    for tag in &tags {
        let value = json!(tag);
        let slot = ctx.alloc(
            "tag",
            format!("tag.{tag}"),
            Some(ExpectedValue::Literal(value.clone())),
        );
        clauses.push(guarded_eq(array, slot.real_position, &value));
    }

    if grouped {
        ctx.pop_parent();
    }
    Ok(join_or(&clauses))
}

fn template_expression(t: &TemplateTrigger, ctx: &mut SectionCtx) -> CompileResult<String> {
    let array = ctx.source.array_var();
    let name = format!("template.{}_{}", ctx.source.name(), ctx.cursor.position);
    let slot = ctx.alloc(
        "template",
        name,
        Some(ExpectedValue::Literal(json!(t.value_template))),
    );
    Ok(template_truthy(array, slot.real_position))
}

fn notification_expression(t: &NotificationTrigger, ctx: &mut SectionCtx) -> CompileResult<String> {
    let array = ctx.source.array_var();
    let name = format!(
        "persistent_notification.{}",
        t.notification_id.as_deref().unwrap_or("any")
    );
    let values: Vec<Value> = t
        .update_type
        .as_ref()
        .map(|types| types.values().into_iter().map(|u| json!(u)).collect())
        .unwrap_or_default();

    let slot = ctx.alloc(
        "persistent_notification",
        name,
        ExpectedValue::one_of(values.clone()),
    );
    Ok(match values.as_slice() {
        [] => not_null(array, slot.real_position),
        [single] => guarded_eq(array, slot.real_position, single),
        many => membership(array, slot.real_position, many),
    })
}

fn webhook_expression(t: &WebhookTrigger, ctx: &mut SectionCtx) -> CompileResult<String> {
    let array = ctx.source.array_var();
    let methods: Vec<Value> = t
        .allowed_methods
        .clone()
        .unwrap_or_else(|| WEBHOOK_DEFAULT_METHODS.map(String::from).to_vec())
        .into_iter()
        .map(Value::String)
        .collect();

    let slot = ctx.alloc(
        "webhook",
        format!("webhook.{}", t.webhook_id),
        ExpectedValue::one_of(methods.clone()),
    );
    Ok(membership(array, slot.real_position, &methods))
}

fn zone_expression(t: &ZoneTrigger, ctx: &mut SectionCtx) -> CompileResult<String> {
    let array = ctx.source.array_var();
    let zone = json!(t.zone);

    // The zone itself is a meta-entity: it parents the subjects but holds no
    // input-array slot.
    let meta = ctx.alloc_meta("zone", t.zone.clone(), None);
    ctx.push_parent(meta);

    let mut clauses = Vec::new();
    for id in t.entity_id.ids() {
        let slot = ctx.alloc(
            domain_of(id),
            id.to_string(),
            Some(ExpectedValue::Literal(zone.clone())),
        );
        clauses.push(match t.event {
            ZoneEvent::Enter => guarded_eq(array, slot.real_position, &zone),
            ZoneEvent::Leave => guarded_neq(array, slot.real_position, &zone),
        });
    }

    ctx.pop_parent();
    Ok(join_or(&clauses))
}

fn geo_location_expression(t: &GeoLocationTrigger, ctx: &mut SectionCtx) -> CompileResult<String> {
    let array = ctx.source.array_var();
    let zone = json!(t.zone);

    let meta = ctx.alloc_meta("zone", t.zone.clone(), None);
    ctx.push_parent(meta);
    let slot = ctx.alloc(
        "geo_location",
        format!("geo_location.{}", t.source),
        Some(ExpectedValue::Literal(zone.clone())),
    );
    ctx.pop_parent();

    Ok(match t.event {
        ZoneEvent::Enter => guarded_eq(array, slot.real_position, &zone),
        ZoneEvent::Leave => guarded_neq(array, slot.real_position, &zone),
    })
}

fn device_expression(t: &DeviceTrigger, ctx: &mut SectionCtx) -> CompileResult<String> {
    let array = ctx.source.array_var();
    let mut values = vec![json!(t.r#type)];
    if let Some(subtype) = &t.subtype {
        values.push(json!(subtype));
    }

    let slot = ctx.alloc(
        t.domain.clone(),
        format!("{}.{}", t.domain, t.device_id),
        ExpectedValue::one_of(values.clone()),
    );
    Ok(match values.as_slice() {
        [single] => guarded_eq(array, slot.real_position, single),
        many => membership(array, slot.real_position, many),
    })
}

fn conversation_expression(t: &ConversationTrigger, ctx: &mut SectionCtx) -> CompileResult<String> {
    let array = ctx.source.array_var();
    let commands = t.command.values();

    let grouped = commands.len() > 1;
    if grouped {
        let group = ctx.alloc_group();
        ctx.push_parent(group);
    }

    let mut clauses = Vec::with_capacity(commands.len());
    for command in &commands {
        let value = json!(command);
        let slot = ctx.alloc(
            "conversation",
            format!("conversation.{}", slugify(command)),
            Some(ExpectedValue::Literal(value.clone())),
        );
        clauses.push(guarded_eq(array, slot.real_position, &value));
    }

    if grouped {
        ctx.pop_parent();
    }
    Ok(join_or(&clauses))
}

fn mqtt_expression(t: &MqttTrigger, ctx: &mut SectionCtx) -> CompileResult<String> {
    let array = ctx.source.array_var();
    let expected = t.payload.clone().map(ExpectedValue::Literal);
    let slot = ctx.alloc("mqtt", format!("mqtt.{}", t.topic), expected);
    Ok(match &t.payload {
        Some(payload) => guarded_eq(array, slot.real_position, payload),
        None => not_null(array, slot.real_position),
    })
}

fn lifecycle_expression(t: &LifecycleTrigger, ctx: &mut SectionCtx) -> CompileResult<String> {
    let array = ctx.source.array_var();
    let event = enum_value(&t.event);
    let slot = ctx.alloc(
        "homeassistant",
        "homeassistant.core",
        Some(ExpectedValue::Literal(event.clone())),
    );
    Ok(guarded_eq(array, slot.real_position, &event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Source;
    use rulec_core::ParameterRole;

    fn classify(value: serde_json::Value) -> TriggerSpec {
        TriggerSpec::classify(&value).unwrap()
    }

    #[test]
    fn test_single_state_trigger() {
        let mut ctx = SectionCtx::new(Source::Trigger);
        let spec = classify(json!({
            "platform": "state",
            "entity_id": "binary_sensor.motion",
            "to": "on"
        }));

        let expr = TriggerDissector::expression(&spec, &mut ctx).unwrap();
        assert_eq!(expr, "t[0] == \"on\"");
        assert_eq!(ctx.entities.len(), 1);
        assert_eq!(ctx.entities[0].role, ParameterRole::Start);
        assert_eq!(ctx.entities[0].name, "binary_sensor.motion");
        assert_eq!(ctx.cursor.real_position, 1);
    }

    #[test]
    fn test_state_alternatives_get_grouping_parent() {
        let mut ctx = SectionCtx::new(Source::Trigger);
        let spec = classify(json!({
            "platform": "state",
            "entity_id": ["light.one", "light.two"],
            "to": ["on", "unavailable"]
        }));

        let expr = TriggerDissector::expression(&spec, &mut ctx).unwrap();
        assert_eq!(
            expr,
            "(t[0] in [\"on\", \"unavailable\"] or t[1] in [\"on\", \"unavailable\"])"
        );
        assert_eq!(ctx.entities.len(), 3);
        assert_eq!(ctx.entities[0].domain, "group");
        assert_eq!(ctx.entities[1].parent, Some(0));
        assert_eq!(ctx.entities[2].parent, Some(0));
        assert_eq!(ctx.cursor.position, 3);
        assert_eq!(ctx.cursor.real_position, 2);
    }

    #[test]
    fn test_numeric_trigger_literal_bounds() {
        let mut ctx = SectionCtx::new(Source::Trigger);
        let spec = classify(json!({
            "platform": "numeric_state",
            "entity_id": "sensor.temperature",
            "above": 10,
            "below": 50
        }));

        let expr = TriggerDissector::expression(&spec, &mut ctx).unwrap();
        assert_eq!(expr, "t[0] is not None and t[0] > 10 and t[0] < 50");
    }

    #[test]
    fn test_numeric_trigger_both_bounds_entity_referenced() {
        let mut ctx = SectionCtx::new(Source::Trigger);
        let spec = classify(json!({
            "platform": "numeric_state",
            "entity_id": "sensor.temperature",
            "above": "sensor.low_mark",
            "below": "sensor.high_mark"
        }));

        let expr = TriggerDissector::expression(&spec, &mut ctx).unwrap();
        assert_eq!(
            expr,
            "t[0] is not None and t[1] is not None and t[2] is not None \
             and t[0] > t[1] and t[0] < t[2]"
        );
        // Partners reference the owner by name.
        assert_eq!(
            ctx.entities[1].expected,
            Some(ExpectedValue::EntityName("sensor.temperature".to_string()))
        );
        assert_eq!(
            ctx.entities[2].expected,
            Some(ExpectedValue::EntityName("sensor.temperature".to_string()))
        );
    }

    #[test]
    fn test_zone_meta_entity_holds_no_slot() {
        let mut ctx = SectionCtx::new(Source::Trigger);
        let spec = classify(json!({
            "platform": "zone",
            "entity_id": ["person.anna", "person.ben"],
            "zone": "zone.home",
            "event": "leave"
        }));

        let expr = TriggerDissector::expression(&spec, &mut ctx).unwrap();
        assert_eq!(
            expr,
            "(t[0] is not None and t[0] != \"zone.home\" or t[1] is not None and t[1] != \"zone.home\")"
        );
        assert_eq!(ctx.entities.len(), 3);
        assert_eq!(ctx.entities[0].domain, "zone");
        assert!(!ctx.entities[0].occupies_slot());
        assert_eq!(ctx.cursor.real_position, 2);
        assert_eq!(ctx.entities[1].parent, Some(0));
    }

    #[test]
    fn test_templated_state_value_gets_null_guard() {
        let mut ctx = SectionCtx::new(Source::Trigger);
        let spec = classify(json!({
            "platform": "state",
            "entity_id": "sensor.mode",
            "to": "{{ states('input_select.mode') }}"
        }));

        let expr = TriggerDissector::expression(&spec, &mut ctx).unwrap();
        assert!(expr.starts_with("t[0] is not None and "));
    }

    #[test]
    fn test_webhook_membership_over_methods() {
        let mut ctx = SectionCtx::new(Source::Trigger);
        let spec = classify(json!({"platform": "webhook", "webhook_id": "hook"}));

        let expr = TriggerDissector::expression(&spec, &mut ctx).unwrap();
        assert_eq!(expr, "t[0] in [\"POST\", \"PUT\"]");
        assert_eq!(
            ctx.entities[0].expected,
            Some(ExpectedValue::OneOf(vec![json!("POST"), json!("PUT")]))
        );
    }

    #[test]
    fn test_trigger_ids_render_in_block() {
        let mut ctx = SectionCtx::new(Source::Trigger);
        let catalog = rulec_emitter::MemoryCatalog::new();
        let mut emitter = ScriptEmitter::new();
        emitter.init("test", &catalog).unwrap();
        emitter.section("trigger_head").unwrap();

        let spec = classify(json!({
            "platform": "state",
            "entity_id": "light.desk",
            "to": "on",
            "id": "desk_on"
        }));
        TriggerDissector::dissect(&spec, &mut ctx, &mut emitter).unwrap();
        emitter.section("trigger_foot").unwrap();

        let source = emitter.finish().unwrap().source;
        assert!(source.contains("    if (t[0] == \"on\"):\n"));
        assert!(source.contains("        return True, \"desk_on\"\n"));
        assert!(source.contains("    return False, None\n"));
    }
}
