use desain_core::record::Status;
use desain_core::DesainError;
use thiserror::Error;

/// Failures surfaced to the user. None of them are fatal; the local view is
/// left as it was before the failed call.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to load records: {0}")]
    FetchFailed(String),

    #[error("failed to update record: {0}")]
    UpdateFailed(String),

    #[error("failed to delete record: {0}")]
    DeleteFailed(String),

    #[error("failed to upload {file}: {reason}")]
    UploadFailed { file: String, reason: String },

    #[error("cannot move a record from {from} to {to}")]
    IllegalTransition { from: Status, to: Status },

    #[error("not signed in")]
    Unauthenticated,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),
}

impl From<DesainError> for SyncError {
    fn from(e: DesainError) -> Self {
        match e {
            DesainError::InvalidInput(msg) => SyncError::InvalidInput(msg),
            DesainError::IllegalTransition { from, to } => SyncError::IllegalTransition { from, to },
        }
    }
}
