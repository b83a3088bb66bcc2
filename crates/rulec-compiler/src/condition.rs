//! Condition dissection
//!
//! Recursive descent over the (possibly nested) AND/OR/NOT tree, reusing the
//! trigger section's comparison and partner mechanics against the condition
//! input array with INPUT-role entities. An empty child list renders as an
//! explicit literal `False` at any nesting depth, never as an omitted
//! expression - including under NOT, which therefore never passes; observed
//! source behavior, preserved as-is.

use serde::Serialize;
use serde_json::{json, Value};

use rulec_core::ExpectedValue;
use rulec_emitter::{py_literal, ScriptEmitter};
use rulec_grammar::{
    ConditionLeaf, ConditionNode, DeviceCondition, NumericStateCondition, StateCondition,
    SunCondition, TemplateCondition, TimeCondition, TriggerRefCondition, ZoneCondition,
};

use crate::comparison::{
    domain_of, guarded_eq, is_entity_reference, join_and, join_or, layout_numeric, membership,
    numeric_range, qualify, string_range, template_truthy,
};
use crate::context::SectionCtx;
use crate::error::{CompileError, CompileResult};

fn enum_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

pub struct ConditionDissector;

impl ConditionDissector {
    /// Emit the condition section body for one tree
    pub fn dissect_section(
        node: &ConditionNode,
        ctx: &mut SectionCtx,
        emitter: &mut ScriptEmitter,
    ) -> CompileResult<()> {
        let expr = Self::expression(node, ctx)?;
        emitter.open_block(true, false)?;
        emitter.append(&expr)?;
        emitter.close_block()?;
        emitter.line("return True")?;
        emitter.end_block()?;
        Ok(())
    }

    /// Build the boolean expression for one node, allocating its entities
    pub fn expression(node: &ConditionNode, ctx: &mut SectionCtx) -> CompileResult<String> {
        match node {
            ConditionNode::And(children) => Self::combine(children, " and ", ctx),
            ConditionNode::Or(children) => Self::combine(children, " or ", ctx),
            ConditionNode::Not(children) => {
                if children.is_empty() {
                    // An empty NOT double-negates into "never pass"; the
                    // source rendered the literal and so do we.
                    return Ok("False".to_string());
                }
                let inner = Self::combine(children, " and ", ctx)?;
                Ok(format!("not ({inner})"))
            }
            ConditionNode::Leaf(leaf) => Self::leaf_expression(leaf, ctx),
        }
    }

    /// Render a guard clause list (AND-combined) for action-section use
    pub fn guard(conditions: &[ConditionNode], ctx: &mut SectionCtx) -> CompileResult<String> {
        Self::combine(conditions, " and ", ctx)
    }

    fn combine(
        children: &[ConditionNode],
        connective: &str,
        ctx: &mut SectionCtx,
    ) -> CompileResult<String> {
        if children.is_empty() {
            return Ok("False".to_string());
        }

        let mut parts = Vec::with_capacity(children.len());
        for child in children {
            let expr = Self::expression(child, ctx)?;
            // Leaf expressions keep Python precedence safe on their own
            // (internal OR joins are pre-parenthesized); combinators are
            // wrapped to survive any surrounding connective.
            parts.push(match child {
                ConditionNode::Leaf(_) => expr,
                _ => format!("({expr})"),
            });
        }
        Ok(parts.join(connective))
    }

    fn leaf_expression(leaf: &ConditionLeaf, ctx: &mut SectionCtx) -> CompileResult<String> {
        match leaf {
            ConditionLeaf::State(c) => state_leaf(c, ctx),
            ConditionLeaf::NumericState(c) => numeric_leaf(c, ctx),
            ConditionLeaf::Device(c) => device_leaf(c, ctx),
            ConditionLeaf::Time(c) => time_leaf(c, ctx),
            ConditionLeaf::Sun(c) => sun_leaf(c, ctx),
            ConditionLeaf::Template(c) => template_leaf(c, ctx),
            ConditionLeaf::Trigger(c) => trigger_leaf(c, ctx),
            ConditionLeaf::Zone(c) => zone_leaf(c, ctx),
        }
    }
}

fn state_leaf(c: &StateCondition, ctx: &mut SectionCtx) -> CompileResult<String> {
    let array = ctx.source.array_var();
    let ids = c.entity_id.ids();

    // Split the match set into plain literals and entity references; the
    // references become comparison partners with their own slots.
    let mut literals = Vec::new();
    let mut references = Vec::new();
    for value in c.state.values() {
        match value.as_str() {
            Some(s) if is_entity_reference(s) => references.push(s.to_string()),
            _ => literals.push(value.clone()),
        }
    }

    let grouped = ids.len() > 1 || !references.is_empty();
    if grouped {
        let group = ctx.alloc_group();
        ctx.push_parent(group);
    }

    let owner_expected = ExpectedValue::one_of(literals.clone());
    let mut owners = Vec::with_capacity(ids.len());
    for id in &ids {
        let name = qualify(id, c.attribute.as_deref());
        let slot = ctx.alloc(domain_of(id), name.clone(), owner_expected.clone());
        owners.push((name, slot));
    }

    let mut partner_slots = Vec::with_capacity(references.len());
    for reference in &references {
        let slot = ctx.alloc(domain_of(reference), reference.clone(), None);
        partner_slots.push(slot);
    }

    if grouped {
        ctx.pop_parent();
    }

    // Deferred reference patch, with the sibling-uniqueness assumption
    // checked instead of inherited.
    if !partner_slots.is_empty() {
        let reference = &owners[0].0;
        if owners.iter().filter(|(name, _)| name == reference).count() > 1 {
            return Err(CompileError::DuplicateEntityName {
                name: reference.clone(),
            });
        }
        for slot in &partner_slots {
            ctx.patch_expected(slot.position, ExpectedValue::EntityName(reference.clone()));
        }
    }

    // Every monitored entity must match one of the candidates.
    let owner_clauses: Vec<String> = owners
        .iter()
        .map(|(_, slot)| {
            let mut alternatives = Vec::new();
            match literals.as_slice() {
                [] => {}
                [single] => alternatives.push(guarded_eq(array, slot.real_position, single)),
                many => alternatives.push(membership(array, slot.real_position, many)),
            }
            for partner in &partner_slots {
                alternatives.push(format!(
                    "{array}[{}] == {array}[{}]",
                    slot.real_position, partner.real_position
                ));
            }
            join_or(&alternatives)
        })
        .collect();

    Ok(join_and(&owner_clauses))
}

fn numeric_leaf(c: &NumericStateCondition, ctx: &mut SectionCtx) -> CompileResult<String> {
    let array = ctx.source.array_var();
    let names: Vec<(String, String)> = c
        .entity_id
        .ids()
        .iter()
        .map(|id| (domain_of(id), qualify(id, c.attribute.as_deref())))
        .collect();

    let layout = layout_numeric(ctx, &names, &c.above, &c.below)?;
    let clauses: Vec<String> = layout
        .owners
        .iter()
        .map(|(_, slot)| numeric_range(array, slot.real_position, layout.above, layout.below))
        .collect();
    Ok(join_and(&clauses))
}

fn device_leaf(c: &DeviceCondition, ctx: &mut SectionCtx) -> CompileResult<String> {
    let array = ctx.source.array_var();
    let value = json!(c.r#type);
    let slot = ctx.alloc(
        c.domain.clone(),
        format!("{}.{}", c.domain, c.device_id),
        Some(ExpectedValue::Literal(value.clone())),
    );
    Ok(guarded_eq(array, slot.real_position, &value))
}

fn time_leaf(c: &TimeCondition, ctx: &mut SectionCtx) -> CompileResult<String> {
    let array = ctx.source.array_var();
    let mut clauses = Vec::new();

    if c.after.is_some() || c.before.is_some() {
        let bounds: Vec<Value> = [&c.after, &c.before]
            .into_iter()
            .flatten()
            .map(|bound| json!(bound))
            .collect();
        let slot = ctx.alloc("time", "time.time", ExpectedValue::one_of(bounds));
        clauses.push(string_range(
            array,
            slot.real_position,
            c.after.as_deref(),
            c.before.as_deref(),
        ));
    }

    if !c.weekday.is_empty() {
        let days: Vec<Value> = c.weekday.iter().map(|d| json!(d)).collect();
        let slot = ctx.alloc("time", "time.weekday", ExpectedValue::one_of(days.clone()));
        clauses.push(membership(array, slot.real_position, &days));
    }

    Ok(join_and(&clauses))
}

fn sun_leaf(c: &SunCondition, ctx: &mut SectionCtx) -> CompileResult<String> {
    let array = ctx.source.array_var();
    let events: Vec<Value> = [&c.after, &c.before]
        .into_iter()
        .flatten()
        .map(enum_value)
        .collect();
    let mut expected = events.clone();
    for offset in [&c.after_offset, &c.before_offset].into_iter().flatten() {
        expected.push(json!(offset));
    }

    let slot = ctx.alloc("sun", "sun.sun", ExpectedValue::one_of(expected));
    Ok(match events.as_slice() {
        [single] => guarded_eq(array, slot.real_position, single),
        many => membership(array, slot.real_position, many),
    })
}

fn template_leaf(c: &TemplateCondition, ctx: &mut SectionCtx) -> CompileResult<String> {
    let array = ctx.source.array_var();
    let name = format!("template.{}_{}", ctx.source.name(), ctx.cursor.position);
    let slot = ctx.alloc(
        "template",
        name,
        Some(ExpectedValue::Literal(json!(c.value_template))),
    );
    Ok(template_truthy(array, slot.real_position))
}

/// "Did trigger X fire": compares the threaded `fired_id`, so the entity is
/// an id-only meta-reference holding no input-array slot
fn trigger_leaf(c: &TriggerRefCondition, ctx: &mut SectionCtx) -> CompileResult<String> {
    let ids = c.id.values();
    for id in &ids {
        ctx.alloc_meta(
            "trigger",
            format!("trigger.{id}"),
            Some(ExpectedValue::Literal(json!(id))),
        );
    }

    Ok(match ids.as_slice() {
        [single] => format!("fired_id == {}", py_literal(&json!(single))),
        many => {
            let values: Vec<Value> = many.iter().map(|id| json!(id)).collect();
            format!("fired_id in {}", py_literal(&Value::Array(values)))
        }
    })
}

fn zone_leaf(c: &ZoneCondition, ctx: &mut SectionCtx) -> CompileResult<String> {
    let array = ctx.source.array_var();
    let zone = json!(c.zone);

    let meta = ctx.alloc_meta("zone", c.zone.clone(), None);
    ctx.push_parent(meta);

    // Membership test: every subject must be inside the zone.
    let mut clauses = Vec::new();
    for id in c.entity_id.ids() {
        let slot = ctx.alloc(
            domain_of(id),
            id.to_string(),
            Some(ExpectedValue::Literal(zone.clone())),
        );
        clauses.push(guarded_eq(array, slot.real_position, &zone));
    }

    ctx.pop_parent();
    Ok(join_and(&clauses))
}
