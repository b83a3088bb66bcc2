//! Section compilation context
//!
//! One `SectionCtx` exists per artifact section. It owns the two coordinated
//! counters the whole dissection threads through: `position` counts every
//! entity in the tree including synthetic grouping parents, `real_position`
//! counts only entities that occupy a slot in the flat input array the
//! emitted program indexes into. The context is owned by the orchestrator
//! and passed `&mut` down the recursion; nothing is threaded by value.

use rulec_core::{Entity, ExpectedValue, ParameterRole};

/// Which section is being dissected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Trigger,
    Condition,
    Action,
}

impl Source {
    /// Input-array variable the section's comparisons index into
    pub fn array_var(self) -> &'static str {
        match self {
            Source::Trigger => "t",
            Source::Condition => "c",
            Source::Action => "a",
        }
    }

    /// Role carried by this section's input entities
    pub fn role(self) -> ParameterRole {
        match self {
            Source::Trigger => ParameterRole::Start,
            Source::Condition | Source::Action => ParameterRole::Input,
        }
    }

    /// Section name for diagnostics
    pub fn name(self) -> &'static str {
        match self {
            Source::Trigger => "trigger",
            Source::Condition => "condition",
            Source::Action => "action",
        }
    }
}

/// The two coordinated counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    /// Size of the full entity+grouping tree
    pub position: usize,

    /// Size of the flat input array
    pub real_position: usize,
}

/// Handle to one allocated array slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Index in the entity+grouping tree
    pub position: usize,

    /// Index in the flat input array
    pub real_position: usize,
}

/// Mutable compilation context for one section
pub struct SectionCtx {
    pub source: Source,
    pub cursor: Cursor,
    pub entities: Vec<Entity>,
    parents: Vec<usize>,
}

impl SectionCtx {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            cursor: Cursor::default(),
            entities: Vec::new(),
            parents: Vec::new(),
        }
    }

    fn current_parent(&self) -> Option<usize> {
        self.parents.last().copied()
    }

    /// Allocate a slot-occupying entity; advances both counters
    pub fn alloc(
        &mut self,
        domain: impl Into<String>,
        name: impl Into<String>,
        expected: Option<ExpectedValue>,
    ) -> Slot {
        let slot = Slot {
            position: self.cursor.position,
            real_position: self.cursor.real_position,
        };
        self.entities.push(Entity {
            domain: domain.into(),
            name: name.into(),
            role: self.source.role(),
            parent: self.current_parent(),
            position: slot.position,
            expected,
        });
        self.cursor.position += 1;
        self.cursor.real_position += 1;
        slot
    }

    /// Allocate a meta-entity that holds no array slot; advances `position` only
    pub fn alloc_meta(
        &mut self,
        domain: impl Into<String>,
        name: impl Into<String>,
        expected: Option<ExpectedValue>,
    ) -> usize {
        let position = self.cursor.position;
        self.entities.push(Entity {
            domain: domain.into(),
            name: name.into(),
            role: self.source.role(),
            parent: self.current_parent(),
            position,
            expected,
        });
        self.cursor.position += 1;
        position
    }

    /// Allocate an OUTPUT entity for a terminal effect; no array slot
    pub fn alloc_output(
        &mut self,
        domain: impl Into<String>,
        name: impl Into<String>,
        expected: Option<ExpectedValue>,
    ) -> usize {
        let position = self.cursor.position;
        self.entities.push(Entity {
            domain: domain.into(),
            name: name.into(),
            role: ParameterRole::Output,
            parent: self.current_parent(),
            position,
            expected,
        });
        self.cursor.position += 1;
        position
    }

    /// Allocate a synthetic grouping parent expressing "these entities are
    /// equivalent alternatives"; returns its position
    pub fn alloc_group(&mut self) -> usize {
        let name = format!("group.{}", self.cursor.position);
        self.alloc_meta("group", name, None)
    }

    /// Make `position` the default parent for subsequent allocations
    pub fn push_parent(&mut self, position: usize) {
        self.parents.push(position);
    }

    pub fn pop_parent(&mut self) {
        self.parents.pop();
    }

    /// Patch a deferred expected value once a sibling's final name is known
    ///
    /// An entity already appended is mutated at most once, and only through
    /// this path.
    pub fn patch_expected(&mut self, position: usize, expected: ExpectedValue) {
        if let Some(entity) = self.entities.iter_mut().find(|e| e.position == position) {
            entity.expected = Some(expected);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rulec_core::ExpectedValue;
    use serde_json::json;

    #[test]
    fn test_alloc_advances_both_counters() {
        let mut ctx = SectionCtx::new(Source::Trigger);
        let a = ctx.alloc("sensor", "sensor.one", None);
        let b = ctx.alloc("sensor", "sensor.two", None);

        assert_eq!((a.position, a.real_position), (0, 0));
        assert_eq!((b.position, b.real_position), (1, 1));
        assert_eq!(ctx.cursor.position, 2);
        assert_eq!(ctx.cursor.real_position, 2);
    }

    #[test]
    fn test_meta_advances_position_only() {
        let mut ctx = SectionCtx::new(Source::Condition);
        ctx.alloc_meta("zone", "zone.home", None);
        let slot = ctx.alloc("person", "person.anna", None);

        assert_eq!(slot.position, 1);
        assert_eq!(slot.real_position, 0);
        assert_eq!(ctx.cursor.position, 2);
        assert_eq!(ctx.cursor.real_position, 1);
    }

    #[test]
    fn test_parent_stack() {
        let mut ctx = SectionCtx::new(Source::Trigger);
        let group = ctx.alloc_group();
        ctx.push_parent(group);
        let child = ctx.alloc("light", "light.one", None);
        ctx.pop_parent();
        let orphan = ctx.alloc("light", "light.two", None);

        assert_eq!(ctx.entities[child.position].parent, Some(group));
        assert_eq!(ctx.entities[orphan.position].parent, None);
        assert!(!ctx.entities[group].occupies_slot());
    }

    #[test]
    fn test_patch_expected() {
        let mut ctx = SectionCtx::new(Source::Trigger);
        let slot = ctx.alloc("sensor", "sensor.threshold", None);
        ctx.patch_expected(
            slot.position,
            ExpectedValue::EntityName("sensor.temp".to_string()),
        );

        assert_eq!(
            ctx.entities[slot.position].expected,
            Some(ExpectedValue::EntityName("sensor.temp".to_string()))
        );
    }

    #[test]
    fn test_output_role() {
        let mut ctx = SectionCtx::new(Source::Action);
        ctx.alloc_output(
            "light",
            "light.kitchen",
            Some(ExpectedValue::Literal(json!("light.turn_on"))),
        );
        assert_eq!(ctx.cursor.real_position, 0);
        assert!(!ctx.entities[0].occupies_slot());
    }
}
