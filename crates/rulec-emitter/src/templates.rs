//! Fragment table
//!
//! The fixed code around the three artifact sections lives here as minijinja
//! templates, registered once in the constructor. Looking up a fragment that
//! is not registered is a `TemplateMissing` failure and aborts the whole
//! compilation pass.

use minijinja::Environment;
use serde::Serialize;

use crate::error::{EmitError, EmitResult};

/// Artifact prologue: header comment plus imports
const PROLOGUE: &str = r#"#!/usr/bin/env python3
# Decision program for rule "{{ name }}" (build {{ version }}).
# Reads one JSON argument carrying the trigger/condition/action input
# arrays and prints the evaluation outcome as a single JSON object.
import json
import sys
"#;

const TRIGGER_HEAD: &str = r#"

def check_triggers(t):
"#;

const TRIGGER_FOOT: &str = r#"    return False, None
"#;

const CONDITION_HEAD: &str = r#"

def check_conditions(c, fired_id):
"#;

/// Body used when the rule declares no condition tree
const CONDITION_DEFAULT: &str = r#"    return True
"#;

const CONDITION_FOOT: &str = r#"    return False
"#;

const ACTION_HEAD: &str = r#"

def run_actions(a, fired_id):
    results = []
    counters = {}
"#;

const ACTION_FOOT: &str = r#"    return results
"#;

const EPILOGUE: &str = r#"

def main():
    payload = json.loads(sys.argv[1])
    fired, trigger_id = check_triggers(payload.get("trigger", []))
    passed = check_conditions(payload.get("condition", []), trigger_id) if fired else False
    results = run_actions(payload.get("action", []), trigger_id) if passed else []
    print(json.dumps({
        "fired": fired,
        "trigger_id": trigger_id,
        "passed": passed,
        "results": results,
    }))


if __name__ == "__main__":
    main()
"#;

const FRAGMENTS: &[(&str, &str)] = &[
    ("prologue", PROLOGUE),
    ("trigger_head", TRIGGER_HEAD),
    ("trigger_foot", TRIGGER_FOOT),
    ("condition_head", CONDITION_HEAD),
    ("condition_default", CONDITION_DEFAULT),
    ("condition_foot", CONDITION_FOOT),
    ("action_head", ACTION_HEAD),
    ("action_foot", ACTION_FOOT),
    ("epilogue", EPILOGUE),
];

/// The registered fragment table
pub struct TemplateSet {
    env: Environment<'static>,
}

impl TemplateSet {
    /// Register every built-in fragment
    pub fn new() -> Self {
        let mut env = Environment::new();
        for &(name, source) in FRAGMENTS {
            env.add_template(name, source)
                .expect("built-in fragments are valid templates");
        }
        Self { env }
    }

    /// Render one fragment with the given context
    pub fn render<S: Serialize>(&self, name: &str, ctx: S) -> EmitResult<String> {
        let template = self
            .env
            .get_template(name)
            .map_err(|_| EmitError::TemplateMissing(name.to_string()))?;

        template.render(ctx).map_err(|source| EmitError::TemplateRender {
            name: name.to_string(),
            source,
        })
    }
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self::new()
    }
}
