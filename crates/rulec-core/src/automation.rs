//! Automation records
//!
//! One `Automation` describes one compiled rule: its name, how concurrently
//! the live system may run it, and the artifact that re-implements its
//! decision logic.

use serde::{Deserialize, Serialize};

use crate::store::ArtifactRef;

/// Execution mode for a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Default - ignore new triggers while running
    #[default]
    Single,

    /// Restart from the beginning on a new trigger
    Restart,

    /// Queue triggers (up to max)
    Queued,

    /// Run all simultaneously (up to max)
    Parallel,
}

/// One compiled rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Automation {
    /// Rule name (alias from the rule document, or a generated id)
    pub name: String,

    /// Execution mode
    pub mode: ExecutionMode,

    /// Maximum concurrent instances (queued/parallel modes)
    pub max: usize,

    /// Handle to the emitted decision program
    pub artifact: ArtifactRef,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_mode_serde() {
        let mode: ExecutionMode = serde_json::from_str(r#""queued""#).unwrap();
        assert_eq!(mode, ExecutionMode::Queued);
        assert_eq!(
            serde_json::to_string(&ExecutionMode::Parallel).unwrap(),
            r#""parallel""#
        );
    }

    #[test]
    fn test_automation_round_trip() {
        let automation = Automation {
            name: "morning_lights".to_string(),
            mode: ExecutionMode::Restart,
            max: 10,
            artifact: ArtifactRef {
                slug: "morning_lights".to_string(),
                version: 3,
            },
        };

        let json = serde_json::to_string(&automation).unwrap();
        let back: Automation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, automation);
        assert_eq!(back.artifact.file_name(), "morning_lights_v3.py");
    }
}
