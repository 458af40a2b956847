use crate::error::QuarryError;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Workflow states of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Screening,
    Transforming,
    Retrieving,
    Synthesizing,
    Completed,
}

impl Stage {
    pub const INITIAL: Stage = Stage::Screening;

    pub const ALL: [Stage; 5] = [
        Stage::Screening,
        Stage::Transforming,
        Stage::Retrieving,
        Stage::Synthesizing,
        Stage::Completed,
    ];

    /// Transition table. `safe` only matters when leaving screening:
    /// unsafe input skips straight to synthesis.
    pub fn next(self, safe: bool) -> Stage {
        match (self, safe) {
            (Stage::Screening, true) => Stage::Transforming,
            (Stage::Screening, false) => Stage::Synthesizing,
            (Stage::Transforming, _) => Stage::Retrieving,
            (Stage::Retrieving, _) => Stage::Synthesizing,
            (Stage::Synthesizing, _) => Stage::Completed,
            (Stage::Completed, _) => Stage::Completed,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Stage::Completed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Screening => "screening",
            Stage::Transforming => "transforming",
            Stage::Retrieving => "retrieving",
            Stage::Synthesizing => "synthesizing",
            Stage::Completed => "completed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a stage did not produce its normal output. Recorded on the
/// pipeline state; never aborts the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StageError {
    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },

    #[error("{stage} failed: {reason}")]
    Failed { stage: Stage, reason: String },
}

impl StageError {
    pub fn failed(stage: Stage, reason: impl ToString) -> Self {
        StageError::Failed {
            stage,
            reason: reason.to_string(),
        }
    }

    /// Classify a capability error raised while running `stage`.
    pub fn from_error(stage: Stage, error: &QuarryError) -> Self {
        match error {
            QuarryError::Timeout { after, .. } => StageError::Timeout {
                stage,
                after: *after,
            },
            other => StageError::failed(stage, other),
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            StageError::Timeout { stage, .. } | StageError::Failed { stage, .. } => *stage,
        }
    }
}
