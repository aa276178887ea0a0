use std::sync::Arc;

use desain_core::session::{Session, UserIdentity};
use desain_service::AuthService;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::SyncError;

/// Shortest password the sign-up form accepts.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Who is signed in. Record stores read the identity from here on every
/// call; interested parties watch [`SessionGate::subscribe`] for changes.
pub struct SessionGate {
    auth: Arc<dyn AuthService>,
    identity: watch::Sender<Option<UserIdentity>>,
}

impl SessionGate {
    /// Starts from whatever session the provider already holds.
    pub fn new(auth: Arc<dyn AuthService>) -> Self {
        let current = auth.current_session().map(|s| s.user);
        let (identity, _) = watch::channel(current);
        Self { auth, identity }
    }

    pub fn current_user(&self) -> Option<UserIdentity> {
        self.identity.borrow().clone()
    }

    pub fn require_user(&self) -> Result<UserIdentity, SyncError> {
        self.current_user().ok_or(SyncError::Unauthenticated)
    }

    /// The full provider session, for persisting between runs.
    pub fn session(&self) -> Option<Session> {
        self.auth.current_session()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<UserIdentity>> {
        self.identity.subscribe()
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserIdentity, SyncError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(SyncError::InvalidInput(
                "email and password are required".into(),
            ));
        }
        let session = self
            .auth
            .sign_in(email, password)
            .await
            .map_err(|e| SyncError::AuthFailed(e.to_string()))?;
        info!(user = %session.user.id, "signed in");
        self.publish(Some(session.user.clone()));
        Ok(session.user)
    }

    /// Register an account. Returns `None` when the provider wants the
    /// address confirmed before signing in.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<UserIdentity>, SyncError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(SyncError::InvalidInput("email is required".into()));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(SyncError::InvalidInput(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let session = self
            .auth
            .sign_up(email, password)
            .await
            .map_err(|e| SyncError::AuthFailed(e.to_string()))?;
        let user = session.map(|s| s.user);
        match &user {
            Some(user) => info!(user = %user.id, "registered and signed in"),
            None => info!(email, "registered, confirmation pending"),
        }
        if user.is_some() {
            self.publish(user.clone());
        }
        Ok(user)
    }

    /// Sign out. The identity is cleared even if the provider call fails.
    pub async fn sign_out(&self) -> Result<(), SyncError> {
        let result = self.auth.sign_out().await;
        self.publish(None);
        match result {
            Ok(()) => {
                info!("signed out");
                Ok(())
            }
            Err(e) => {
                warn!("sign out failed at the provider: {e}");
                Err(SyncError::AuthFailed(e.to_string()))
            }
        }
    }

    /// Exchange the refresh token and publish whatever identity results.
    pub async fn refresh(&self) -> Result<Option<UserIdentity>, SyncError> {
        let session = self
            .auth
            .refresh_session()
            .await
            .map_err(|e| SyncError::AuthFailed(e.to_string()))?;
        let user = session.map(|s| s.user);
        self.publish(user.clone());
        Ok(user)
    }

    fn publish(&self, user: Option<UserIdentity>) {
        self.identity.send_if_modified(|current| {
            if *current == user {
                return false;
            }
            *current = user;
            true
        });
    }
}
