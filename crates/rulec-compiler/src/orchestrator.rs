//! Orchestration
//!
//! Runs Trigger -> Condition -> Action dissection against one initialized
//! artifact, concatenates the per-section entity lists, and enforces the
//! cross-cutting invariants at each section close. Both counters reset per
//! section: each section targets an independent segment of the input arrays.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info};

use rulec_core::{Automation, Entity};
use rulec_emitter::{Artifact, ArtifactCatalog, ScriptEmitter};
use rulec_grammar::RuleConfig;

use crate::action::ActionDissector;
use crate::condition::ConditionDissector;
use crate::context::{SectionCtx, Source};
use crate::error::{CompileError, CompileResult};
use crate::trigger::TriggerDissector;

/// Everything one compilation pass produces
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// The automation record handed to persistence
    pub automation: Automation,

    /// The flat entity list, trigger/condition/action sections concatenated
    pub entities: Vec<Entity>,

    /// The emitted decision program
    pub artifact: Artifact,

    /// When this pass finished
    pub compiled_at: DateTime<Utc>,
}

/// Runs the three dissectors against one artifact
pub struct Orchestrator<'a> {
    catalog: &'a dyn ArtifactCatalog,
}

impl<'a> Orchestrator<'a> {
    pub fn new(catalog: &'a dyn ArtifactCatalog) -> Self {
        Self { catalog }
    }

    /// Compile one rule
    ///
    /// A failure aborts only this rule; the artifact is never handed out
    /// before its final section has closed.
    pub fn compile(&self, rule: &RuleConfig) -> CompileResult<CompiledRule> {
        let mut emitter = ScriptEmitter::new();
        let artifact_ref = emitter.init(&rule.name, self.catalog)?;
        let mut entities = Vec::new();

        // Trigger section: implicit OR over all specs.
        let mut ctx = SectionCtx::new(Source::Trigger);
        emitter.section("trigger_head")?;
        for spec in &rule.triggers {
            TriggerDissector::dissect(spec, &mut ctx, &mut emitter)?;
        }
        emitter.section("trigger_foot")?;
        self.close_section(&ctx, &mut entities)?;

        // Condition section: absent tree means always-true.
        let mut ctx = SectionCtx::new(Source::Condition);
        emitter.section("condition_head")?;
        match &rule.condition {
            Some(node) => {
                ConditionDissector::dissect_section(node, &mut ctx, &mut emitter)?;
                emitter.section("condition_foot")?;
            }
            None => emitter.section("condition_default")?,
        }
        self.close_section(&ctx, &mut entities)?;

        // Action section.
        let mut ctx = SectionCtx::new(Source::Action);
        emitter.section("action_head")?;
        ActionDissector::new().dissect_all(&rule.actions, &mut ctx, &mut emitter)?;
        emitter.section("action_foot")?;
        self.close_section(&ctx, &mut entities)?;

        // The expected-value invariant holds over the final list:
        // present-and-non-empty or entirely absent.
        for entity in &entities {
            entity
                .validate()
                .map_err(|_| CompileError::EmptyExpectedValue {
                    name: entity.name.clone(),
                })?;
        }

        let artifact = emitter.finish()?;
        info!(
            rule = %rule.name,
            artifact = %artifact.file_name(),
            entities = entities.len(),
            "compiled rule"
        );

        Ok(CompiledRule {
            automation: Automation {
                name: rule.name.clone(),
                mode: rule.mode,
                max: rule.max,
                artifact: artifact_ref,
            },
            entities,
            artifact,
            compiled_at: Utc::now(),
        })
    }

    /// Enforce the section invariant and hand the entities over
    ///
    /// The count of slot-consuming entities in the section's role must equal
    /// the final real position; meta-entities (grouping parents, zone and
    /// trigger references) and OUTPUT effects hold no slot and are excluded.
    fn close_section(&self, ctx: &SectionCtx, entities: &mut Vec<Entity>) -> CompileResult<()> {
        let actual = ctx
            .entities
            .iter()
            .filter(|e| e.role == ctx.source.role() && e.occupies_slot())
            .count();

        if actual != ctx.cursor.real_position {
            return Err(CompileError::Consistency {
                section: ctx.source.name(),
                expected: ctx.cursor.real_position,
                actual,
            });
        }

        debug!(
            section = ctx.source.name(),
            entities = ctx.entities.len(),
            real_position = ctx.cursor.real_position,
            "section closed"
        );
        entities.extend(ctx.entities.iter().cloned());
        Ok(())
    }
}

/// Registry of compiled rules for embedders that compile repeatedly
///
/// Compilation itself stays single-threaded per pass; the registry only
/// shares the finished records.
pub struct CompilerService {
    compiled: DashMap<String, CompiledRule>,
}

impl CompilerService {
    pub fn new() -> Self {
        Self {
            compiled: DashMap::new(),
        }
    }

    /// Compile one rule, publish its artifact, and register the result
    pub fn compile_and_publish(
        &self,
        rule: &RuleConfig,
        catalog: &dyn ArtifactCatalog,
    ) -> CompileResult<CompiledRule> {
        let compiled = Orchestrator::new(catalog).compile(rule)?;
        catalog.publish(&compiled.artifact)?;
        self.compiled.insert(rule.name.clone(), compiled.clone());
        Ok(compiled)
    }

    /// Fetch the latest compiled record for a rule name
    pub fn get(&self, name: &str) -> Option<CompiledRule> {
        self.compiled.get(name).map(|c| c.value().clone())
    }

    /// Number of registered rules
    pub fn count(&self) -> usize {
        self.compiled.len()
    }
}

impl Default for CompilerService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rulec_core::{ExecutionMode, ParameterRole};
    use rulec_emitter::MemoryCatalog;
    use serde_json::json;

    fn rule(value: serde_json::Value) -> RuleConfig {
        RuleConfig::from_value(&value).unwrap()
    }

    #[test]
    fn test_compile_minimal_rule() {
        let catalog = MemoryCatalog::new();
        let compiled = Orchestrator::new(&catalog)
            .compile(&rule(json!({
                "alias": "Hello",
                "trigger": [{"platform": "homeassistant", "event": "start"}],
                "action": [{"event": "hello_world"}]
            })))
            .unwrap();

        assert_eq!(compiled.automation.name, "Hello");
        assert_eq!(compiled.automation.mode, ExecutionMode::Single);
        assert_eq!(compiled.automation.artifact.version, 1);
        assert_eq!(compiled.entities.len(), 2);
        assert!(compiled.artifact.source.contains("def check_triggers(t):"));
        assert!(compiled.artifact.source.contains("    return True\n"));
        assert!(compiled.artifact.source.contains("def run_actions(a, fired_id):"));
    }

    #[test]
    fn test_sections_reset_real_position() {
        let catalog = MemoryCatalog::new();
        let compiled = Orchestrator::new(&catalog)
            .compile(&rule(json!({
                "alias": "both sections",
                "trigger": [{"platform": "state", "entity_id": "light.a", "to": "on"}],
                "condition": [{"condition": "state", "entity_id": "light.b", "state": "on"}],
                "action": []
            })))
            .unwrap();

        // Both sections index their own array segment from zero.
        assert!(compiled.artifact.source.contains("if (t[0] == \"on\")"));
        assert!(compiled.artifact.source.contains("if (c[0] == \"on\")"));

        let roles: Vec<ParameterRole> = compiled.entities.iter().map(|e| e.role).collect();
        assert_eq!(roles, vec![ParameterRole::Start, ParameterRole::Input]);
    }

    #[test]
    fn test_service_registers_and_versions() {
        let catalog = MemoryCatalog::new();
        let service = CompilerService::new();
        let spec = json!({
            "alias": "repeat me",
            "trigger": [{"platform": "state", "entity_id": "light.a", "to": "on"}],
            "action": []
        });

        let first = service.compile_and_publish(&rule(spec.clone()), &catalog).unwrap();
        let second = service.compile_and_publish(&rule(spec), &catalog).unwrap();

        assert_eq!(first.automation.artifact.version, 1);
        assert_eq!(second.automation.artifact.version, 2);
        assert_eq!(service.count(), 1);
        assert_eq!(service.get("repeat me").unwrap().automation.artifact.version, 2);
    }
}
