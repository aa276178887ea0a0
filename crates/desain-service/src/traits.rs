use async_trait::async_trait;
use desain_core::record::{CreateRecord, DesignRecord, RecordFilter, RecordPatch};
use desain_core::session::Session;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// The relational store holding design records (the `desains` collection).
///
/// The sync layer programs against this trait.
/// `SupabaseService` talks to PostgREST over HTTP.
/// `MemoryService` (feature `test-helpers`) keeps rows in memory.
#[async_trait]
pub trait RecordService: Send + Sync {
    /// Rows matching `filter`, newest `created_at` first.
    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<DesignRecord>, ServiceError>;
    async fn get_record(&self, id: &str) -> Result<DesignRecord, ServiceError>;
    async fn create_record(&self, input: &CreateRecord) -> Result<DesignRecord, ServiceError>;
    /// Update exactly the fields present in `patch`.
    async fn update_record(&self, id: &str, patch: &RecordPatch)
        -> Result<DesignRecord, ServiceError>;
    async fn delete_record(&self, id: &str) -> Result<(), ServiceError>;
}

/// The hosted auth provider.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// The session currently held by the client, if any.
    fn current_session(&self) -> Option<Session>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ServiceError>;

    /// Register an account. `None` when the provider requires email
    /// confirmation before issuing a session.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, ServiceError>;

    /// End the session. The local session is dropped even if the provider
    /// call fails.
    async fn sign_out(&self) -> Result<(), ServiceError>;

    /// Exchange the refresh token for a fresh session.
    async fn refresh_session(&self) -> Result<Option<Session>, ServiceError>;
}
