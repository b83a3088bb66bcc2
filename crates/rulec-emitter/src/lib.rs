//! Script emitter
//!
//! One [`ScriptEmitter`] owns one artifact: the small standalone Python
//! program that re-implements a rule's decision logic against positional
//! input arrays. The emitter is an append-only text accumulator with
//! indentation-scoped block and loop primitives; the fixed code fragments
//! around the three sections come from a minijinja-backed fragment table
//! where a missing fragment is fatal to the whole pass.
//!
//! Artifact names are versioned: `init` scans an [`ArtifactCatalog`] for the
//! highest existing version suffix of the rule's slug and allocates the next
//! one, never overwriting a prior build.

pub mod catalog;
pub mod emitter;
pub mod error;
pub mod python;
pub mod templates;

pub use catalog::{Artifact, ArtifactCatalog, DirCatalog, MemoryCatalog};
pub use emitter::{LoopKind, ScriptEmitter};
pub use error::{EmitError, EmitResult};
pub use python::{py_literal, slugify};
pub use templates::TemplateSet;
