//! The append-only script emitter
//!
//! Strictly ordered, append-only writes; one artifact per emitter; no writes
//! at all before `init` has allocated the versioned artifact name.

use minijinja::context;
use serde_json::Value;
use tracing::debug;

use rulec_core::ArtifactRef;

use crate::catalog::{Artifact, ArtifactCatalog};
use crate::error::{EmitError, EmitResult};
use crate::python::{py_literal, slugify};
use crate::templates::TemplateSet;

const INDENT: &str = "    ";

/// Loop header kinds
#[derive(Debug, Clone)]
pub enum LoopKind<'a> {
    /// Bounded count: `for _step in range(n):`
    Count(u64),

    /// For-each over a literal item list
    ForEach(&'a [Value]),

    /// Guard-driven: `while (` / `while not (`; the caller appends the guard
    /// expression and closes with `close_block`
    Guard { negate: bool },
}

/// Append-only accumulator for one artifact
pub struct ScriptEmitter {
    templates: TemplateSet,
    name: Option<ArtifactRef>,
    buf: String,
    indent: usize,
}

impl ScriptEmitter {
    pub fn new() -> Self {
        Self {
            templates: TemplateSet::new(),
            name: None,
            buf: String::new(),
            indent: 0,
        }
    }

    /// Allocate the versioned artifact name and render the prologue
    ///
    /// Scans the catalog for the highest prior version suffix of this rule's
    /// slug and takes the next one; an earlier build is never overwritten.
    pub fn init(&mut self, rule_name: &str, catalog: &dyn ArtifactCatalog) -> EmitResult<ArtifactRef> {
        let slug = slugify(rule_name);
        let version = catalog.versions(&slug).into_iter().max().unwrap_or(0) + 1;
        let name = ArtifactRef { slug, version };

        debug!(artifact = %name.file_name(), "initialized artifact");

        let prologue = self.templates.render(
            "prologue",
            context! { name => rule_name, version => version },
        )?;
        self.name = Some(name.clone());
        self.buf.push_str(&prologue);
        Ok(name)
    }

    fn check_init(&self) -> EmitResult<()> {
        if self.name.is_none() {
            return Err(EmitError::AppendBeforeInit);
        }
        Ok(())
    }

    /// Append raw text at the current write position
    pub fn append(&mut self, text: &str) -> EmitResult<()> {
        self.check_init()?;
        self.buf.push_str(text);
        Ok(())
    }

    /// Append one indented statement line
    pub fn line(&mut self, text: &str) -> EmitResult<()> {
        self.check_init()?;
        for _ in 0..self.indent {
            self.buf.push_str(INDENT);
        }
        self.buf.push_str(text);
        self.buf.push('\n');
        Ok(())
    }

    /// Render a section fragment and reset the indent to the function body
    pub fn section(&mut self, fragment: &str) -> EmitResult<()> {
        self.check_init()?;
        let text = self.templates.render(fragment, context! {})?;
        self.buf.push_str(&text);
        self.indent = 1;
        Ok(())
    }

    /// Open a guarded block: `if (` / `if not (` / `elif (` / `elif not (`
    ///
    /// The caller appends the guard expression, then calls [`close_block`]
    /// to terminate the header and enter the body.
    ///
    /// [`close_block`]: ScriptEmitter::close_block
    pub fn open_block(&mut self, first_branch: bool, negate: bool) -> EmitResult<()> {
        self.check_init()?;
        let keyword = if first_branch { "if" } else { "elif" };
        let header = if negate {
            format!("{keyword} not (")
        } else {
            format!("{keyword} (")
        };
        for _ in 0..self.indent {
            self.buf.push_str(INDENT);
        }
        self.buf.push_str(&header);
        Ok(())
    }

    /// Terminate a block or guard-loop header and enter the body
    pub fn close_block(&mut self) -> EmitResult<()> {
        self.check_init()?;
        self.buf.push_str("):\n");
        self.indent += 1;
        Ok(())
    }

    /// Open the trailing `else:` branch of a block
    pub fn else_block(&mut self) -> EmitResult<()> {
        self.line("else:")?;
        self.indent += 1;
        Ok(())
    }

    /// Leave a block body
    pub fn end_block(&mut self) -> EmitResult<()> {
        self.check_init()?;
        if self.indent == 0 {
            return Err(EmitError::Unbalanced);
        }
        self.indent -= 1;
        Ok(())
    }

    /// Open a loop block
    ///
    /// `Count` and `ForEach` write a complete header and enter the body;
    /// `Guard` writes `while (` / `while not (` and leaves the header open
    /// for the guard expression, terminated by [`close_block`].
    ///
    /// [`close_block`]: ScriptEmitter::close_block
    pub fn open_loop(&mut self, kind: LoopKind<'_>) -> EmitResult<()> {
        self.check_init()?;
        match kind {
            LoopKind::Count(n) => {
                self.line(&format!("for _step in range({n}):"))?;
                self.indent += 1;
            }
            LoopKind::ForEach(items) => {
                let literal = py_literal(&Value::Array(items.to_vec()));
                self.line(&format!("for _item in {literal}:"))?;
                self.indent += 1;
            }
            LoopKind::Guard { negate } => {
                let header = if negate { "while not (" } else { "while (" };
                for _ in 0..self.indent {
                    self.buf.push_str(INDENT);
                }
                self.buf.push_str(header);
            }
        }
        Ok(())
    }

    /// Leave a loop body
    ///
    /// `terminate` emits the run-extrapolation `break`: the artifact
    /// evaluates one synthetic vector, not live state, so a guard that held
    /// once would hold forever and the loop is cut after a single pass.
    pub fn close_loop(&mut self, terminate: bool) -> EmitResult<()> {
        if terminate {
            self.line("break")?;
        }
        self.end_block()
    }

    /// The artifact name allocated by `init`
    pub fn artifact_ref(&self) -> Option<&ArtifactRef> {
        self.name.as_ref()
    }

    /// Render the epilogue and hand over the finished artifact
    pub fn finish(mut self) -> EmitResult<Artifact> {
        let Some(name) = self.name.take() else {
            return Err(EmitError::AppendBeforeInit);
        };
        let epilogue = self.templates.render("epilogue", context! {})?;
        self.buf.push_str(&epilogue);

        Ok(Artifact {
            slug: name.slug,
            version: name.version,
            source: self.buf,
        })
    }
}

impl Default for ScriptEmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;

    #[test]
    fn test_append_before_init_is_fatal() {
        let mut emitter = ScriptEmitter::new();
        assert!(matches!(
            emitter.append("x"),
            Err(EmitError::AppendBeforeInit)
        ));
        assert!(matches!(emitter.line("x"), Err(EmitError::AppendBeforeInit)));
        assert!(matches!(
            emitter.open_block(true, false),
            Err(EmitError::AppendBeforeInit)
        ));
    }

    #[test]
    fn test_versioned_init_never_reuses_suffixes() {
        let catalog = MemoryCatalog::new();

        let mut first = ScriptEmitter::new();
        let name = first.init("Morning Lights", &catalog).unwrap();
        assert_eq!(name.version, 1);
        assert_eq!(name.file_name(), "morning_lights_v1.py");
        catalog.publish(&first.finish().unwrap()).unwrap();

        let mut second = ScriptEmitter::new();
        let name = second.init("Morning Lights", &catalog).unwrap();
        assert_eq!(name.version, 2);
    }

    #[test]
    fn test_block_indentation() {
        let catalog = MemoryCatalog::new();
        let mut emitter = ScriptEmitter::new();
        emitter.init("test", &catalog).unwrap();

        emitter.section("trigger_head").unwrap();
        emitter.open_block(true, false).unwrap();
        emitter.append("t[0] == \"on\"").unwrap();
        emitter.close_block().unwrap();
        emitter.line("return True, None").unwrap();
        emitter.end_block().unwrap();
        emitter.section("trigger_foot").unwrap();

        let artifact = emitter.finish().unwrap();
        assert!(artifact.source.contains("    if (t[0] == \"on\"):\n"));
        assert!(artifact.source.contains("        return True, None\n"));
        assert!(artifact.source.contains("    return False, None\n"));
    }

    #[test]
    fn test_guard_loop_terminates_after_one_pass() {
        let catalog = MemoryCatalog::new();
        let mut emitter = ScriptEmitter::new();
        emitter.init("test", &catalog).unwrap();
        emitter.section("action_head").unwrap();

        emitter.open_loop(LoopKind::Guard { negate: true }).unwrap();
        emitter.append("a[0] == \"closed\"").unwrap();
        emitter.close_block().unwrap();
        emitter.line("counters[\"e0\"] = counters.get(\"e0\", 0) + 1").unwrap();
        emitter.close_loop(true).unwrap();

        let artifact = emitter.finish().unwrap();
        assert!(artifact.source.contains("    while not (a[0] == \"closed\"):\n"));
        assert!(artifact.source.contains("        break\n"));
    }

    #[test]
    fn test_unbalanced_end_block() {
        let catalog = MemoryCatalog::new();
        let mut emitter = ScriptEmitter::new();
        emitter.init("test", &catalog).unwrap();
        emitter.indent = 0;
        assert!(matches!(emitter.end_block(), Err(EmitError::Unbalanced)));
    }
}
