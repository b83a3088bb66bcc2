//! Action dissection
//!
//! Walks the action list's control-flow tree and emits the statement body of
//! `run_actions`. Guards delegate to the condition dissector and sub-trigger
//! waits to the trigger dissector, both source-tagged "action" so their
//! entities draw from the action input array with INPUT role. Terminal
//! effects allocate exactly one OUTPUT entity and append one structured
//! effect record; inside a repeated block they increment a per-effect
//! counter instead, flushed after the loop closes - with the literal tag
//! "infinite" when the loop's guard could never be falsified by a single
//! test vector.

use serde_json::{json, Value};

use rulec_core::ExpectedValue;
use rulec_emitter::{py_literal, LoopKind, ScriptEmitter};
use rulec_grammar::{ActionNode, ChooseAction, IfAction, RepeatSpec, WaitForTriggerAction};

use crate::comparison::{domain_of, join_or};
use crate::condition::ConditionDissector;
use crate::context::SectionCtx;
use crate::error::CompileResult;
use crate::trigger::TriggerDissector;

/// Effects recorded while inside one repetition, flushed at its close
#[derive(Default)]
struct LoopFrame {
    effects: Vec<EffectFlush>,
    infinite: bool,
}

struct EffectFlush {
    key: String,
    target: String,
    outcome: Value,
}

/// Walks one rule's action list
pub struct ActionDissector {
    frames: Vec<LoopFrame>,
}

impl ActionDissector {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Dissect the whole action list into the current section
    pub fn dissect_all(
        &mut self,
        nodes: &[ActionNode],
        ctx: &mut SectionCtx,
        emitter: &mut ScriptEmitter,
    ) -> CompileResult<()> {
        self.sequence(nodes, ctx, emitter)?;
        Ok(())
    }

    /// Emit a node list in order; returns the number of emitted statements
    fn sequence(
        &mut self,
        nodes: &[ActionNode],
        ctx: &mut SectionCtx,
        emitter: &mut ScriptEmitter,
    ) -> CompileResult<usize> {
        let mut emitted = 0;
        for node in nodes {
            emitted += self.node(node, ctx, emitter)?;
        }
        Ok(emitted)
    }

    /// A branch body; an empty branch still emits a placeholder statement
    fn block_sequence(
        &mut self,
        nodes: &[ActionNode],
        ctx: &mut SectionCtx,
        emitter: &mut ScriptEmitter,
    ) -> CompileResult<()> {
        if self.sequence(nodes, ctx, emitter)? == 0 {
            emitter.line("pass")?;
        }
        Ok(())
    }

    fn node(
        &mut self,
        node: &ActionNode,
        ctx: &mut SectionCtx,
        emitter: &mut ScriptEmitter,
    ) -> CompileResult<usize> {
        match node {
            ActionNode::Service(action) => {
                let target = action.primary_target().to_string();
                self.effect(domain_of(&target), target, json!(action.service), ctx, emitter)
            }
            ActionNode::Event(action) => self.effect(
                "event".to_string(),
                format!("event.{}", action.event),
                action.event_data.clone().unwrap_or_else(|| json!("fired")),
                ctx,
                emitter,
            ),
            ActionNode::Device(action) => self.effect(
                action.domain.clone(),
                format!("{}.{}", action.domain, action.device_id),
                json!(action.r#type),
                ctx,
                emitter,
            ),
            ActionNode::Stop(_) => {
                emitter.line("return results")?;
                Ok(1)
            }
            ActionNode::Guard(condition) => {
                // Rendered negated: the halt path is entered exactly when
                // the guard fails.
                emitter.open_block(true, true)?;
                let expr = ConditionDissector::expression(condition, ctx)?;
                emitter.append(&expr)?;
                emitter.close_block()?;
                emitter.line("return results")?;
                emitter.end_block()?;
                Ok(1)
            }
            ActionNode::If(action) => self.conditional(action, ctx, emitter),
            ActionNode::Choose(action) => self.choose(action, ctx, emitter),
            ActionNode::Parallel(children) => {
                // One shared grouping parent; children thread the counters
                // in order and emit at the same indentation.
                let group = ctx.alloc_group();
                ctx.push_parent(group);
                let emitted = self.sequence(children, ctx, emitter)?;
                ctx.pop_parent();
                Ok(emitted)
            }
            ActionNode::Sequence(children) => self.sequence(children, ctx, emitter),
            ActionNode::WaitForTrigger(action) => self.wait(action, ctx, emitter),
            ActionNode::Repeat(spec) => self.repeat(spec, ctx, emitter),
            ActionNode::Unsupported(kind) => {
                tracing::debug!(?kind, "skipping action shape with no semantics");
                Ok(0)
            }
        }
    }

    fn conditional(
        &mut self,
        action: &IfAction,
        ctx: &mut SectionCtx,
        emitter: &mut ScriptEmitter,
    ) -> CompileResult<usize> {
        let expr = ConditionDissector::guard(&action.conditions, ctx)?;
        emitter.open_block(true, false)?;
        emitter.append(&expr)?;
        emitter.close_block()?;
        self.block_sequence(&action.then, ctx, emitter)?;
        emitter.end_block()?;

        if let Some(else_branch) = &action.r#else {
            emitter.else_block()?;
            self.block_sequence(else_branch, ctx, emitter)?;
            emitter.end_block()?;
        }
        Ok(1)
    }

    fn choose(
        &mut self,
        action: &ChooseAction,
        ctx: &mut SectionCtx,
        emitter: &mut ScriptEmitter,
    ) -> CompileResult<usize> {
        if action.branches.is_empty() {
            // Nothing to branch on; a bare default degenerates to a plain
            // sequence.
            return match &action.default {
                Some(default) => self.sequence(default, ctx, emitter),
                None => Ok(0),
            };
        }

        for (index, branch) in action.branches.iter().enumerate() {
            // A multi-clause guard gets its own grouping parent.
            let expr = if branch.conditions.len() > 1 {
                let group = ctx.alloc_group();
                ctx.push_parent(group);
                let expr = ConditionDissector::guard(&branch.conditions, ctx)?;
                ctx.pop_parent();
                expr
            } else {
                ConditionDissector::guard(&branch.conditions, ctx)?
            };

            emitter.open_block(index == 0, false)?;
            emitter.append(&expr)?;
            emitter.close_block()?;
            self.block_sequence(&branch.sequence, ctx, emitter)?;
            emitter.end_block()?;
        }

        if let Some(default) = &action.default {
            emitter.else_block()?;
            self.block_sequence(default, ctx, emitter)?;
            emitter.end_block()?;
        }
        Ok(1)
    }

    fn wait(
        &mut self,
        action: &WaitForTriggerAction,
        ctx: &mut SectionCtx,
        emitter: &mut ScriptEmitter,
    ) -> CompileResult<usize> {
        let mut clauses = Vec::with_capacity(action.triggers.len());
        for candidate in &action.triggers {
            clauses.push(TriggerDissector::expression(candidate, ctx)?);
        }

        emitter.open_block(true, true)?;
        emitter.append(&join_or(&clauses))?;
        emitter.close_block()?;
        if action.timeout.is_some() && action.continue_on_timeout {
            // Timeout continuation: the wait failed but the list goes on.
            emitter.line("pass")?;
        } else {
            emitter.line("return results")?;
        }
        emitter.end_block()?;
        Ok(1)
    }

    fn repeat(
        &mut self,
        spec: &RepeatSpec,
        ctx: &mut SectionCtx,
        emitter: &mut ScriptEmitter,
    ) -> CompileResult<usize> {
        match spec {
            RepeatSpec::Count { count, sequence } => {
                emitter.open_loop(LoopKind::Count(*count))?;
                self.frames.push(LoopFrame::default());
                self.block_sequence(sequence, ctx, emitter)?;
                let frame = self.frames.pop().unwrap_or_default();
                emitter.close_loop(false)?;
                self.flush(frame, emitter)?;
            }
            RepeatSpec::ForEach { items, sequence } => {
                emitter.open_loop(LoopKind::ForEach(items))?;
                self.frames.push(LoopFrame::default());
                self.block_sequence(sequence, ctx, emitter)?;
                let frame = self.frames.pop().unwrap_or_default();
                emitter.close_loop(false)?;
                self.flush(frame, emitter)?;
            }
            RepeatSpec::While {
                conditions,
                sequence,
            } => self.guarded_loop(false, conditions, sequence, ctx, emitter)?,
            RepeatSpec::Until {
                conditions,
                sequence,
            } => self.guarded_loop(true, conditions, sequence, ctx, emitter)?,
        }
        Ok(1)
    }

    fn guarded_loop(
        &mut self,
        negate: bool,
        conditions: &[rulec_grammar::ConditionNode],
        sequence: &[ActionNode],
        ctx: &mut SectionCtx,
        emitter: &mut ScriptEmitter,
    ) -> CompileResult<()> {
        let rp_before = ctx.cursor.real_position;
        emitter.open_loop(LoopKind::Guard { negate })?;
        let expr = ConditionDissector::guard(conditions, ctx)?;
        emitter.append(&expr)?;
        emitter.close_block()?;

        // A guard that consumed no input slots can never be falsified by a
        // single test vector: the loop is infinite under this harness.
        let infinite = ctx.cursor.real_position == rp_before;
        self.frames.push(LoopFrame {
            effects: Vec::new(),
            infinite,
        });
        self.block_sequence(sequence, ctx, emitter)?;
        let frame = self.frames.pop().unwrap_or_default();

        // Run extrapolation: one pass, then out.
        emitter.close_loop(true)?;
        self.flush(frame, emitter)
    }

    /// One terminal effect: one OUTPUT entity plus one statement
    fn effect(
        &mut self,
        domain: String,
        target: String,
        outcome: Value,
        ctx: &mut SectionCtx,
        emitter: &mut ScriptEmitter,
    ) -> CompileResult<usize> {
        let position = ctx.alloc_output(
            domain,
            target.clone(),
            Some(ExpectedValue::Literal(outcome.clone())),
        );

        if let Some(frame) = self.frames.last_mut() {
            let key = format!("e{position}");
            let key_literal = py_literal(&json!(key));
            emitter.line(&format!(
                "counters[{key_literal}] = counters.get({key_literal}, 0) + 1"
            ))?;
            frame.effects.push(EffectFlush {
                key,
                target,
                outcome,
            });
        } else {
            emitter.line(&format!(
                "results.append({{{}: {{\"outcome\": {}, \"count\": 1}}}})",
                py_literal(&json!(target)),
                py_literal(&outcome)
            ))?;
        }
        Ok(1)
    }

    /// Relabel and append the loop's effect records after its close
    fn flush(&mut self, frame: LoopFrame, emitter: &mut ScriptEmitter) -> CompileResult<()> {
        for effect in frame.effects {
            let count = if frame.infinite {
                "\"infinite\"".to_string()
            } else {
                format!("counters.get({}, 0)", py_literal(&json!(effect.key)))
            };
            emitter.line(&format!(
                "results.append({{{}: {{\"outcome\": {}, \"count\": {count}}}}})",
                py_literal(&json!(effect.target)),
                py_literal(&effect.outcome)
            ))?;
        }
        Ok(())
    }
}

impl Default for ActionDissector {
    fn default() -> Self {
        Self::new()
    }
}
