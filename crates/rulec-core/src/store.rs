//! Persistence seams
//!
//! Persisting entities and automations to a relational store is an external
//! collaborator's job; the compiler only hands records across this boundary.

use serde::{Deserialize, Serialize};

use crate::automation::Automation;
use crate::entity::Entity;

/// Handle to one emitted artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Slugified rule name
    pub slug: String,

    /// Version suffix; recompiles increment, never overwrite
    pub version: u32,
}

impl ArtifactRef {
    /// File name the artifact is published under
    pub fn file_name(&self) -> String {
        format!("{}_v{}.py", self.slug, self.version)
    }
}

/// Where compiled records go
///
/// Implementations live outside this workspace; the compiler hands over one
/// automation and its full entity list per pass, deduplication by name is the
/// sink's own concern (see [`crate::dedup_by_name`]).
pub trait EntitySink {
    /// Sink error type
    type Error;

    /// Persist one compiled rule's records
    fn persist(&self, automation: &Automation, entities: &[Entity]) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::ExecutionMode;
    use std::cell::RefCell;
    use std::convert::Infallible;

    struct VecSink {
        rows: RefCell<Vec<(String, usize)>>,
    }

    impl EntitySink for VecSink {
        type Error = Infallible;

        fn persist(&self, automation: &Automation, entities: &[Entity]) -> Result<(), Infallible> {
            self.rows
                .borrow_mut()
                .push((automation.name.clone(), entities.len()));
            Ok(())
        }
    }

    #[test]
    fn test_sink_receives_whole_pass() {
        let sink = VecSink {
            rows: RefCell::new(Vec::new()),
        };
        let automation = Automation {
            name: "porch".to_string(),
            mode: ExecutionMode::Single,
            max: 10,
            artifact: ArtifactRef {
                slug: "porch".to_string(),
                version: 1,
            },
        };

        sink.persist(&automation, &[]).unwrap();
        assert_eq!(sink.rows.borrow().as_slice(), &[("porch".to_string(), 0)]);
    }
}
