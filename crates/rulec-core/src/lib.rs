//! Core records for the rule compiler
//!
//! This crate holds the plain data every other rulec crate exchanges:
//! the flattened [`Entity`] records a compiled rule depends on, the
//! [`Automation`] record describing one compiled rule, and the seams the
//! external persistence collaborator plugs into.
//!
//! # Key Types
//!
//! - [`Entity`] - one positionally-addressed external value
//! - [`ExpectedValue`] - the constraint test enumeration draws candidates from
//! - [`Automation`] - name, execution mode and artifact handle of one rule
//! - [`EntitySink`] - persistence seam (out-of-process collaborator)

pub mod automation;
pub mod entity;
pub mod store;

pub use automation::{Automation, ExecutionMode};
pub use entity::{dedup_by_name, CoreError, CoreResult, Entity, ExpectedValue, ParameterRole};
pub use store::{ArtifactRef, EntitySink};
