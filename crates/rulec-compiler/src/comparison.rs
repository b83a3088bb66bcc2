//! Comparison rendering
//!
//! Every dissector renders comparisons of the same shape:
//! `ARRAY[real_position] <cmp> literal | ARRAY[other_real_position]`.
//! A comparison is wrapped in an is-not-null guard whenever the compared
//! value might be an unresolved templated expression (detected conservatively
//! by the `{{` / `{%` / `{#` markers), and unconditionally for ordering
//! comparisons, where an unknown must never satisfy a bound.
//!
//! Numeric ranges whose bounds name entities go through a two-phase layout:
//! phase 1 allocates every sibling slot and records handles, phase 2 patches
//! the partners' `EntityName` references and only then renders text.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use rulec_core::ExpectedValue;
use rulec_emitter::py_literal;
use rulec_grammar::NumericValue;

use crate::context::{SectionCtx, Slot};
use crate::error::{CompileError, CompileResult};

/// Does a string look like a namespace-qualified entity id?
///
/// Used where a value set may mix literals with references to other
/// entities' states (state-condition sets, time specs).
pub fn is_entity_reference(s: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^[a-z_][a-z0-9_]*\.[A-Za-z0-9_]+$").expect("valid regex")
    });
    re.is_match(s)
}

/// Conservative unresolved-template detection
pub fn contains_template(value: &Value) -> bool {
    match value {
        Value::String(s) => s.contains("{{") || s.contains("{%") || s.contains("{#"),
        Value::Array(items) => items.iter().any(contains_template),
        Value::Object(map) => map.values().any(contains_template),
        _ => false,
    }
}

/// `arr[rp]` spelled out
fn slot_ref(array: &str, rp: usize) -> String {
    format!("{array}[{rp}]")
}

/// Equality against a literal, guarded when the literal may be a template
pub fn guarded_eq(array: &str, rp: usize, value: &Value) -> String {
    let slot = slot_ref(array, rp);
    let literal = py_literal(value);
    if contains_template(value) {
        format!("{slot} is not None and {slot} == {literal}")
    } else {
        format!("{slot} == {literal}")
    }
}

/// Inequality against a literal; always guarded, since an unknown must not
/// count as "different"
pub fn guarded_neq(array: &str, rp: usize, value: &Value) -> String {
    let slot = slot_ref(array, rp);
    format!("{slot} is not None and {slot} != {}", py_literal(value))
}

/// Membership in a literal set
pub fn membership(array: &str, rp: usize, values: &[Value]) -> String {
    let slot = slot_ref(array, rp);
    let literal = py_literal(&Value::Array(values.to_vec()));
    if values.iter().any(contains_template) {
        format!("{slot} is not None and {slot} in {literal}")
    } else {
        format!("{slot} in {literal}")
    }
}

/// Bare presence check
pub fn not_null(array: &str, rp: usize) -> String {
    format!("{} is not None", slot_ref(array, rp))
}

/// Truthiness of an opaque rendered template
pub fn template_truthy(array: &str, rp: usize) -> String {
    let slot = slot_ref(array, rp);
    format!("{slot} is not None and {slot} == True")
}

/// Lexical string range (time-of-day comparisons)
pub fn string_range(array: &str, rp: usize, after: Option<&str>, before: Option<&str>) -> String {
    let slot = slot_ref(array, rp);
    let mut clauses = vec![not_null(array, rp)];
    if let Some(after) = after {
        clauses.push(format!("{slot} > {}", py_literal(&Value::String(after.to_string()))));
    }
    if let Some(before) = before {
        clauses.push(format!(
            "{slot} < {}",
            py_literal(&Value::String(before.to_string()))
        ));
    }
    clauses.join(" and ")
}

/// One resolved numeric bound
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumBound {
    Literal(f64),
    /// Real position of a comparison-partner entity
    Slot(usize),
}

/// Render a numeric range comparison for one owner slot
///
/// The owner and every partner slot is null-guarded: a vector carrying null
/// in any compared position never satisfies a bound.
pub fn numeric_range(
    array: &str,
    rp: usize,
    above: Option<NumBound>,
    below: Option<NumBound>,
) -> String {
    let slot = slot_ref(array, rp);
    let mut clauses = vec![not_null(array, rp)];

    for bound in [above, below].into_iter().flatten() {
        if let NumBound::Slot(partner) = bound {
            clauses.push(not_null(array, partner));
        }
    }
    if let Some(bound) = above {
        clauses.push(format!("{slot} > {}", render_bound(array, bound)));
    }
    if let Some(bound) = below {
        clauses.push(format!("{slot} < {}", render_bound(array, bound)));
    }

    clauses.join(" and ")
}

fn render_bound(array: &str, bound: NumBound) -> String {
    match bound {
        // Whole-valued bounds print without the trailing ".0" a bare f64
        // would carry.
        NumBound::Literal(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => {
            format!("{}", n as i64)
        }
        NumBound::Literal(n) => n.to_string(),
        NumBound::Slot(rp) => slot_ref(array, rp),
    }
}

/// Join alternative clauses with OR, self-parenthesized when compound
pub fn join_or(clauses: &[String]) -> String {
    match clauses {
        [] => "False".to_string(),
        [single] => single.clone(),
        many => format!("({})", many.join(" or ")),
    }
}

/// Join required clauses with AND
pub fn join_and(clauses: &[String]) -> String {
    match clauses {
        [] => "False".to_string(),
        [single] => single.clone(),
        many => many.join(" and "),
    }
}

/// Phase-1 result of a numeric-range layout
#[derive(Debug)]
pub struct NumericLayout {
    /// Owner entities: (name, slot), in declaration order
    pub owners: Vec<(String, Slot)>,

    pub above: Option<NumBound>,

    pub below: Option<NumBound>,
}

/// Lay out a numeric-range node: owners, then comparison partners
///
/// Phase 1 allocates every sibling slot; partner entities for entity-valued
/// bounds are created before their reference target's layout is complete, so
/// their `EntityName` expected value is patched in afterwards (phase 2),
/// once every sibling's final name is known. The sibling-name uniqueness the
/// reference relies on is verified here instead of being assumed.
pub fn layout_numeric(
    ctx: &mut SectionCtx,
    names: &[(String, String)],
    above: &Option<NumericValue>,
    below: &Option<NumericValue>,
) -> CompileResult<NumericLayout> {
    let literal_above = match above {
        Some(NumericValue::Literal(n)) => Some(*n),
        _ => None,
    };
    let literal_below = match below {
        Some(NumericValue::Literal(n)) => Some(*n),
        _ => None,
    };
    let owner_expected = ExpectedValue::range(literal_above, literal_below);

    let grouped = names.len() > 1;
    if grouped {
        let group = ctx.alloc_group();
        ctx.push_parent(group);
    }

    let mut owners = Vec::with_capacity(names.len());
    for (domain, name) in names {
        let slot = ctx.alloc(domain.clone(), name.clone(), owner_expected.clone());
        owners.push((name.clone(), slot));
    }

    // Provisional partners; expected values patched below.
    let mut partners = Vec::new();
    let above = resolve_bound(ctx, above, &mut partners);
    let below = resolve_bound(ctx, below, &mut partners);

    if grouped {
        ctx.pop_parent();
    }

    // Phase 2: every deferred reference resolves through the sibling table.
    if !partners.is_empty() {
        let reference = &owners[0].0;
        let matches = owners.iter().filter(|(name, _)| name == reference).count();
        if matches > 1 {
            return Err(CompileError::DuplicateEntityName {
                name: reference.clone(),
            });
        }
        for partner in partners {
            ctx.patch_expected(partner, ExpectedValue::EntityName(reference.clone()));
        }
    }

    Ok(NumericLayout {
        owners,
        above,
        below,
    })
}

fn resolve_bound(
    ctx: &mut SectionCtx,
    bound: &Option<NumericValue>,
    partners: &mut Vec<usize>,
) -> Option<NumBound> {
    match bound {
        Some(NumericValue::Literal(n)) => Some(NumBound::Literal(*n)),
        Some(NumericValue::Entity(id)) => {
            let slot = ctx.alloc(domain_of(id), id.clone(), None);
            partners.push(slot.position);
            Some(NumBound::Slot(slot.real_position))
        }
        None => None,
    }
}

/// Namespace prefix of an entity id
pub fn domain_of(entity_id: &str) -> String {
    entity_id
        .split_once('.')
        .map(|(domain, _)| domain.to_string())
        .unwrap_or_else(|| entity_id.to_string())
}

/// Qualify an entity id with a monitored attribute
pub fn qualify(entity_id: &str, attribute: Option<&str>) -> String {
    match attribute {
        Some(attribute) => format!("{entity_id}.{attribute}"),
        None => entity_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Source;
    use serde_json::json;

    #[test]
    fn test_contains_template_markers() {
        assert!(contains_template(&json!("{{ states('sensor.x') }}")));
        assert!(contains_template(&json!("{% if x %}y{% endif %}")));
        assert!(contains_template(&json!({"msg": "{# note #}"})));
        assert!(!contains_template(&json!("plain {value}")));
    }

    #[test]
    fn test_guarded_eq_only_for_templates() {
        assert_eq!(guarded_eq("t", 0, &json!("on")), "t[0] == \"on\"");
        assert_eq!(
            guarded_eq("t", 1, &json!("{{ x }}")),
            "t[1] is not None and t[1] == \"{{ x }}\""
        );
    }

    #[test]
    fn test_numeric_range_literal_bounds() {
        assert_eq!(
            numeric_range("t", 0, Some(NumBound::Literal(10.0)), Some(NumBound::Literal(50.0))),
            "t[0] is not None and t[0] > 10 and t[0] < 50"
        );
    }

    #[test]
    fn test_numeric_range_partner_bound_is_guarded() {
        assert_eq!(
            numeric_range("c", 0, Some(NumBound::Slot(1)), None),
            "c[0] is not None and c[1] is not None and c[0] > c[1]"
        );
    }

    #[test]
    fn test_layout_patches_partner_reference() {
        let mut ctx = SectionCtx::new(Source::Trigger);
        let layout = layout_numeric(
            &mut ctx,
            &[("sensor".to_string(), "sensor.temp".to_string())],
            &Some(NumericValue::Entity("sensor.low".to_string())),
            &Some(NumericValue::Entity("sensor.high".to_string())),
        )
        .unwrap();

        assert_eq!(layout.owners.len(), 1);
        assert_eq!(layout.above, Some(NumBound::Slot(1)));
        assert_eq!(layout.below, Some(NumBound::Slot(2)));
        assert_eq!(ctx.entities.len(), 3);
        assert_eq!(
            ctx.entities[1].expected,
            Some(ExpectedValue::EntityName("sensor.temp".to_string()))
        );
        assert_eq!(
            ctx.entities[2].expected,
            Some(ExpectedValue::EntityName("sensor.temp".to_string()))
        );
    }

    #[test]
    fn test_layout_groups_alternative_owners() {
        let mut ctx = SectionCtx::new(Source::Trigger);
        let layout = layout_numeric(
            &mut ctx,
            &[
                ("sensor".to_string(), "sensor.front".to_string()),
                ("sensor".to_string(), "sensor.back".to_string()),
            ],
            &Some(NumericValue::Literal(20.0)),
            &None,
        )
        .unwrap();

        assert_eq!(layout.owners.len(), 2);
        // Grouping parent consumed position 0, no slot.
        assert_eq!(ctx.entities[0].domain, "group");
        assert_eq!(layout.owners[0].1.position, 1);
        assert_eq!(layout.owners[0].1.real_position, 0);
        assert_eq!(ctx.entities[1].parent, Some(0));
        assert_eq!(
            ctx.entities[1].expected,
            Some(ExpectedValue::Range {
                above: Some(20.0),
                below: None
            })
        );
    }

    #[test]
    fn test_duplicate_sibling_names_rejected() {
        let mut ctx = SectionCtx::new(Source::Trigger);
        let err = layout_numeric(
            &mut ctx,
            &[
                ("sensor".to_string(), "sensor.same".to_string()),
                ("sensor".to_string(), "sensor.same".to_string()),
            ],
            &Some(NumericValue::Entity("sensor.bound".to_string())),
            &None,
        )
        .unwrap_err();

        assert!(matches!(err, CompileError::DuplicateEntityName { .. }));
    }

    #[test]
    fn test_join_helpers() {
        assert_eq!(join_or(&[]), "False");
        assert_eq!(join_or(&["a == 1".to_string()]), "a == 1");
        assert_eq!(
            join_or(&["a == 1".to_string(), "b == 2".to_string()]),
            "(a == 1 or b == 2)"
        );
        assert_eq!(join_and(&[]), "False");
        assert_eq!(
            join_and(&["x".to_string(), "y".to_string()]),
            "x and y"
        );
    }
}
