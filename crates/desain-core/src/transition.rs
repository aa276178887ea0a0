use crate::error::DesainError;
use crate::record::{DesignRecord, RecordPatch, Status};

impl Status {
    /// The edge set `queued -> in_progress -> revision -> done`.
    ///
    /// Staying in the same status is not a transition and returns false.
    pub fn can_transition_to(self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Queued, Status::InProgress)
                | (Status::InProgress, Status::Revision)
                | (Status::Revision, Status::Done)
        )
    }
}

/// Validate `patch` against the record it applies to and add the seen-flag
/// side effects of the edit.
///
/// Rejected patches must never reach remote storage.
pub fn guard_patch(current: &DesignRecord, mut patch: RecordPatch) -> Result<RecordPatch, DesainError> {
    if let Some(next) = patch.status {
        if next == current.status {
            patch.status = None;
        } else if !current.status.can_transition_to(next) {
            return Err(DesainError::IllegalTransition {
                from: current.status,
                to: next,
            });
        }
    }

    if current.status == Status::Revision {
        if patch.touches_briefing() {
            patch.briefing_seen = Some(false);
        }
        if patch.touches_results() {
            patch.result_seen = Some(false);
        }
    }

    Ok(patch)
}
