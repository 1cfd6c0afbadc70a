//! Transfer state machine.
//!
//! ```text
//! Idle -> Validating -> BuildingGraph -> UploadingInitial -> Remapping
//!      -> UploadingFinal -> Verifying -> Done
//! ```
//!
//! `BuildingGraph -> Done` is the dry-run shortcut. `Failed` is reachable
//! from every non-terminal state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The state of a transfer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Idle,
    Validating,
    BuildingGraph,
    UploadingInitial,
    Remapping,
    UploadingFinal,
    Verifying,
    Done,
    Failed,
}

impl TransferState {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if the state machine allows moving to `next`.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == Self::Failed {
            return true;
        }
        matches!(
            (self, next),
            (Self::Idle, Self::Validating)
                | (Self::Validating, Self::BuildingGraph)
                | (Self::BuildingGraph, Self::UploadingInitial)
                | (Self::BuildingGraph, Self::Done)
                | (Self::UploadingInitial, Self::Remapping)
                | (Self::Remapping, Self::UploadingFinal)
                | (Self::UploadingFinal, Self::Verifying)
                | (Self::Verifying, Self::Done)
        )
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::BuildingGraph => "building_graph",
            Self::UploadingInitial => "uploading_initial",
            Self::Remapping => "remapping",
            Self::UploadingFinal => "uploading_final",
            Self::Verifying => "verifying",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}
