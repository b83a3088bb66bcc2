//! End-to-end compilation tests
//!
//! Each test compiles a full rule document and asserts against the two
//! outputs together: the flat entity list and the emitted program text.

use serde_json::json;

use rulec_compiler::{CompilerService, Orchestrator};
use rulec_core::ParameterRole;
use rulec_emitter::MemoryCatalog;
use rulec_grammar::RuleConfig;

fn compile(value: serde_json::Value) -> rulec_compiler::CompiledRule {
    let rule = RuleConfig::from_value(&value).unwrap();
    let catalog = MemoryCatalog::new();
    Orchestrator::new(&catalog).compile(&rule).unwrap()
}

#[test]
fn single_reference_triggers_count_matches_real_position() {
    // For N single-reference triggers with no numeric ranges, the trigger
    // section has exactly N entities, each holding one array slot.
    let compiled = compile(json!({
        "alias": "three plain triggers",
        "trigger": [
            {"platform": "state", "entity_id": "binary_sensor.motion", "to": "on"},
            {"platform": "event", "event_type": "backup_done"},
            {"platform": "mqtt", "topic": "home/door", "payload": "open"}
        ],
        "action": []
    }));

    let starts: Vec<_> = compiled
        .entities
        .iter()
        .filter(|e| e.role == ParameterRole::Start)
        .collect();
    assert_eq!(starts.len(), 3);
    assert!(starts.iter().all(|e| e.occupies_slot()));

    for index in 0..3 {
        assert!(compiled.artifact.source.contains(&format!("t[{index}]")));
    }
    assert!(!compiled.artifact.source.contains("t[3]"));
}

#[test]
fn empty_combinator_trees_render_literal_false() {
    let compiled = compile(json!({
        "alias": "vacuous condition",
        "trigger": [],
        "condition": {"or": [{"and": []}, {"not": [{"or": []}]}]},
        "action": []
    }));

    assert!(compiled
        .artifact
        .source
        .contains("if ((False) or (not ((False)))):"));
    // No condition entity was allocated for the vacuous tree.
    assert!(compiled
        .entities
        .iter()
        .all(|e| e.role != ParameterRole::Input));
}

#[test]
fn numeric_range_vector_semantics() {
    // `above: 10, below: 50` renders a null-guarded range: [25] fires,
    // [5] does not, and [null] can never satisfy a bound.
    let compiled = compile(json!({
        "alias": "temperature band",
        "trigger": [
            {"platform": "numeric_state", "entity_id": "sensor.temperature",
             "above": 10, "below": 50}
        ],
        "action": []
    }));

    assert!(compiled
        .artifact
        .source
        .contains("if (t[0] is not None and t[0] > 10 and t[0] < 50):"));

    let entity = &compiled.entities[0];
    assert_eq!(entity.name, "sensor.temperature");
    assert_eq!(
        entity.expected,
        Some(rulec_core::ExpectedValue::Range {
            above: Some(10.0),
            below: Some(50.0),
        })
    );
}

#[test]
fn unfalsifiable_repeat_guard_marks_effects_infinite() {
    let compiled = compile(json!({
        "alias": "siren loop",
        "trigger": [],
        "action": [
            {
                "repeat": {
                    "until": [{"condition": "template", "value_template": "{{ quiet }}"}],
                    "sequence": [
                        {"service": "siren.turn_on", "target": {"entity_id": "siren.alarm"}}
                    ]
                }
            }
        ]
    }));

    // The template guard allocates a slot, so that loop is falsifiable; an
    // empty guard is not. Compile the empty-guard variant too.
    assert!(compiled.artifact.source.contains("\"count\": counters.get("));

    let infinite = compile(json!({
        "alias": "endless siren",
        "trigger": [],
        "action": [
            {
                "repeat": {
                    "until": [],
                    "sequence": [
                        {"service": "siren.turn_on", "target": {"entity_id": "siren.alarm"}}
                    ]
                }
            }
        ]
    }));

    assert!(infinite
        .artifact
        .source
        .contains("{\"siren.alarm\": {\"outcome\": \"siren.turn_on\", \"count\": \"infinite\"}}"));
    assert!(!infinite.artifact.source.contains("\"count\": counters.get("));
    // Run extrapolation still cuts the loop after one pass.
    assert!(infinite.artifact.source.contains("break"));
}

#[test]
fn or_joined_triggers_report_first_matching_id() {
    let compiled = compile(json!({
        "alias": "two doors",
        "trigger": [
            {"platform": "state", "entity_id": "binary_sensor.front", "to": "open", "id": "front"},
            {"platform": "state", "entity_id": "binary_sensor.back", "to": "open", "id": "back"}
        ],
        "action": []
    }));

    let source = &compiled.artifact.source;
    let first = source.find("if (t[0] == \"open\"):").expect("first trigger block");
    let first_return = source.find("return True, \"front\"").expect("first id");
    let second = source.find("if (t[1] == \"open\"):").expect("second trigger block");
    let second_return = source.find("return True, \"back\"").expect("second id");

    // Sequential blocks: a vector satisfying only the second trigger falls
    // through the first and reports the second declared id.
    assert!(first < first_return);
    assert!(first_return < second);
    assert!(second < second_return);
    assert!(source.contains("return False, None"));
}

#[test]
fn undeclared_trigger_ids_report_none() {
    let compiled = compile(json!({
        "alias": "anonymous",
        "trigger": [
            {"platform": "state", "entity_id": "binary_sensor.motion", "to": "on"}
        ],
        "action": []
    }));

    assert!(compiled.artifact.source.contains("return True, None"));
}

#[test]
fn recompiling_bumps_version_and_keeps_entity_list_stable() {
    let spec = json!({
        "alias": "Stable Rule",
        "trigger": [
            {"platform": "numeric_state", "entity_id": "sensor.power",
             "above": "sensor.baseline"}
        ],
        "condition": [{"condition": "state", "entity_id": "person.anna", "state": "home"}],
        "action": [{"service": "light.turn_on", "target": {"entity_id": "light.desk"}}]
    });

    let catalog = MemoryCatalog::new();
    let service = CompilerService::new();
    let rule = RuleConfig::from_value(&spec).unwrap();

    let first = service.compile_and_publish(&rule, &catalog).unwrap();
    let second = service.compile_and_publish(&rule, &catalog).unwrap();

    assert_eq!(
        second.automation.artifact.version,
        first.automation.artifact.version + 1
    );
    assert_eq!(first.artifact.file_name(), "stable_rule_v1.py");
    assert_eq!(second.artifact.file_name(), "stable_rule_v2.py");
    // Structurally identical entity lists for an unchanged rule.
    assert_eq!(first.entities, second.entities);
}

#[test]
fn comparison_partner_references_owner_by_name() {
    let compiled = compile(json!({
        "alias": "relative threshold",
        "trigger": [
            {"platform": "numeric_state", "entity_id": "sensor.temperature",
             "above": "sensor.low_mark", "below": "sensor.high_mark"}
        ],
        "action": []
    }));

    // Owner plus two partners, all slot-holding START entities.
    assert_eq!(compiled.entities.len(), 3);
    assert!(compiled
        .artifact
        .source
        .contains("t[0] > t[1] and t[0] < t[2]"));

    for partner in &compiled.entities[1..] {
        assert_eq!(
            partner.expected,
            Some(rulec_core::ExpectedValue::EntityName(
                "sensor.temperature".to_string()
            ))
        );
    }
}

#[test]
fn action_section_threads_fired_id_to_guards() {
    let compiled = compile(json!({
        "alias": "trigger routed",
        "trigger": [
            {"platform": "state", "entity_id": "binary_sensor.motion", "to": "on", "id": "motion"}
        ],
        "action": [
            {
                "if": [{"condition": "trigger", "id": "motion"}],
                "then": [{"service": "light.turn_on", "target": {"entity_id": "light.hall"}}]
            }
        ]
    }));

    assert!(compiled.artifact.source.contains("def run_actions(a, fired_id):"));
    assert!(compiled.artifact.source.contains("if (fired_id == \"motion\"):"));

    // The trigger-reference meta-entity consumes no action input slot.
    let metas: Vec<_> = compiled
        .entities
        .iter()
        .filter(|e| e.domain == "trigger")
        .collect();
    assert_eq!(metas.len(), 1);
    assert!(!metas[0].occupies_slot());
}

#[test]
fn kitchen_sink_rule_compiles_consistently() {
    let compiled = compile(json!({
        "alias": "everything at once",
        "mode": "queued",
        "max": 4,
        "trigger": [
            {"platform": "state", "entity_id": ["light.a", "light.b"], "to": ["on", "off"]},
            {"platform": "zone", "entity_id": "person.anna", "zone": "zone.home", "event": "enter"},
            {"platform": "sun", "event": "sunset", "offset": "-00:30:00"},
            {"platform": "webhook", "webhook_id": "hook", "allowed_methods": ["POST"]},
            {"platform": "template", "value_template": "{{ is_state('sun.sun', 'below_horizon') }}"}
        ],
        "condition": {
            "and": [
                {"condition": "time", "after": "07:00:00", "weekday": ["mon", "fri"]},
                {"or": [
                    {"condition": "zone", "entity_id": "person.anna", "zone": "zone.home"},
                    {"condition": "trigger", "id": "late"}
                ]}
            ]
        },
        "action": [
            {"condition": "state", "entity_id": "alarm.house", "state": "disarmed"},
            {
                "choose": [
                    {
                        "conditions": [{"condition": "numeric_state", "entity_id": "sensor.lux", "below": 50}],
                        "sequence": [{"service": "light.turn_on", "target": {"entity_id": "light.hall"}}]
                    }
                ],
                "default": [{"event": "nothing_to_do"}]
            },
            {
                "parallel": [
                    {"service": "notify.phone"},
                    {"device_id": "dev1", "domain": "switch", "type": "toggle"}
                ]
            },
            {
                "repeat": {
                    "count": 2,
                    "sequence": [{"service": "light.toggle", "target": {"entity_id": "light.porch"}}]
                }
            },
            {
                "wait_for_trigger": [
                    {"platform": "state", "entity_id": "binary_sensor.door", "to": "open"}
                ],
                "timeout": "00:01:00"
            },
            {"stop": "done"}
        ]
    }));

    assert_eq!(compiled.automation.mode, rulec_core::ExecutionMode::Queued);
    assert_eq!(compiled.automation.max, 4);

    // Every emitted comparison indexes a consistent array segment; the
    // invariant check inside compile() already proved the counters, so just
    // spot-check shape.
    let source = &compiled.artifact.source;
    assert!(source.contains("def check_triggers(t):"));
    assert!(source.contains("def check_conditions(c, fired_id):"));
    assert!(source.contains("for _step in range(2):"));
    assert!(source.contains("if not (a["));
    assert!(source.contains("return results"));

    // Grouping parents and zone metas never hold slots.
    for entity in compiled
        .entities
        .iter()
        .filter(|e| matches!(e.domain.as_str(), "group" | "zone" | "trigger"))
    {
        assert!(!entity.occupies_slot());
    }

    // OUTPUT entities exist for every terminal effect.
    // choose branch + default + two parallel children + looped toggle.
    let outputs = compiled
        .entities
        .iter()
        .filter(|e| e.role == ParameterRole::Output)
        .count();
    assert_eq!(outputs, 5);
}

#[test]
fn yaml_documents_compile_like_json_ones() {
    let rules = RuleConfig::from_yaml(
        r#"
- alias: yaml rule
  trigger:
    - platform: numeric_state
      entity_id: sensor.humidity
      above: 60
  action:
    - service: fan.turn_on
      target:
        entity_id: fan.bathroom
"#,
    )
    .unwrap();

    let catalog = MemoryCatalog::new();
    let compiled = Orchestrator::new(&catalog).compile(&rules[0]).unwrap();
    assert!(compiled
        .artifact
        .source
        .contains("if (t[0] is not None and t[0] > 60):"));
    assert_eq!(compiled.artifact.file_name(), "yaml_rule_v1.py");
}

#[test]
fn expected_values_are_never_present_and_empty() {
    let compiled = compile(json!({
        "alias": "expectations",
        "trigger": [
            {"platform": "state", "entity_id": "light.a"},
            {"platform": "persistent_notification"}
        ],
        "action": []
    }));

    for entity in &compiled.entities {
        if let Some(expected) = &entity.expected {
            assert!(!expected.is_empty(), "entity {} has empty expected", entity.name);
        }
    }
}
