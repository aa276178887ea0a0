use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use desain_core::record::{CreateRecord, DesignRecord, RecordFilter, RecordPatch};
use desain_core::session::{Session, UserIdentity};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::storage::SupabaseStorage;
use crate::{AuthService, RecordService, ServiceError};

/// Collection the design records live in.
pub const DEFAULT_TABLE: &str = "desains";

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project URL, e.g. "https://<ref>.supabase.co".
    pub url: String,
    /// Public anon key sent as `apikey` on every request.
    pub anon_key: String,
    pub table: String,
    pub bucket: String,
}

impl SupabaseConfig {
    pub fn new(url: &str, anon_key: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            table: DEFAULT_TABLE.to_string(),
            bucket: desain_store::DEFAULT_BUCKET.to_string(),
        }
    }
}

/// Shared HTTP state: one reqwest client and the session every request
/// authenticates with.
pub(crate) struct SupabaseClient {
    pub(crate) base_url: String,
    anon_key: String,
    client: Client,
    session: RwLock<Option<Session>>,
}

impl SupabaseClient {
    /// A request carrying the anon key and the session token (or the anon
    /// key when signed out).
    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let token = self
            .session()
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.anon_key.clone());
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header("apikey", self.anon_key.as_str())
            .bearer_auth(token)
    }

    fn session(&self) -> Option<Session> {
        self.session.read().ok().and_then(|guard| guard.clone())
    }

    fn set_session(&self, session: Option<Session>) {
        if let Ok(mut guard) = self.session.write() {
            *guard = session;
        }
    }
}

/// PostgREST + GoTrue client for a hosted Supabase project.
pub struct SupabaseService {
    inner: Arc<SupabaseClient>,
    table: String,
    bucket: String,
}

impl SupabaseService {
    pub fn new(config: SupabaseConfig) -> Self {
        let inner = SupabaseClient {
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key,
            client: Client::new(),
            session: RwLock::new(None),
        };
        Self {
            inner: Arc::new(inner),
            table: config.table,
            bucket: config.bucket,
        }
    }

    /// Blob storage sharing this client's session.
    pub fn storage(&self) -> SupabaseStorage {
        SupabaseStorage::new(self.inner.clone(), &self.bucket)
    }

    /// Install a previously persisted session (or clear it).
    pub fn set_session(&self, session: Option<Session>) {
        self.inner.set_session(session);
    }

    /// Check that the auth endpoint is reachable.
    pub async fn health_check(&self) -> Result<(), ServiceError> {
        let resp = send(self.inner.request(Method::GET, "/auth/v1/health")).await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(parse_error(resp).await)
        }
    }

    fn table_path(&self) -> String {
        format!("/rest/v1/{}", self.table)
    }

    async fn token_request(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<Session, ServiceError> {
        let builder = self
            .inner
            .request(Method::POST, "/auth/v1/token")
            .query(&[("grant_type", grant_type)])
            .json(&body);
        let token: TokenResponse = handle_response(send(builder).await?).await?;
        Ok(token.into_session(Utc::now()))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| self.expires_in.map(|secs| now + Duration::seconds(secs)));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: UserIdentity {
                id: self.user.id,
                email: self.user.email,
            },
        }
    }
}

fn status_list(filter: &RecordFilter) -> Option<String> {
    if filter.statuses.is_empty() {
        return None;
    }
    let quoted: Vec<String> = filter
        .statuses
        .iter()
        .map(|s| format!("\"{}\"", s.as_str()))
        .collect();
    Some(format!("in.({})", quoted.join(",")))
}

pub(crate) async fn send(builder: RequestBuilder) -> Result<reqwest::Response, ServiceError> {
    builder
        .send()
        .await
        .map_err(|e| ServiceError::Internal(format!("connection failed: {e}")))
}

async fn handle_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ServiceError> {
    let status = resp.status();
    if status.is_success() {
        resp.json::<T>()
            .await
            .map_err(|e| ServiceError::Internal(format!("json decode: {e}")))
    } else {
        Err(parse_error_with_status(status, resp).await)
    }
}

pub(crate) async fn parse_error(resp: reqwest::Response) -> ServiceError {
    let status = resp.status();
    parse_error_with_status(status, resp).await
}

async fn parse_error_with_status(status: StatusCode, resp: reqwest::Response) -> ServiceError {
    let body = resp.text().await.unwrap_or_default();
    error_for(status, &body)
}

/// Map a failed response onto `ServiceError`, pulling the message out of
/// whichever field PostgREST, GoTrue or Storage put it in.
pub(crate) fn error_for(status: StatusCode, body: &str) -> ServiceError {
    let msg = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|key| v[*key].as_str().map(String::from))
        })
        .unwrap_or_else(|| body.to_string());

    match status {
        StatusCode::NOT_FOUND => ServiceError::NotFound(msg),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ServiceError::InvalidInput(msg)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceError::Unauthorized(msg),
        _ => ServiceError::Internal(msg),
    }
}

#[async_trait]
impl RecordService for SupabaseService {
    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<DesignRecord>, ServiceError> {
        let mut query: Vec<(&str, String)> = vec![
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
        ];
        if let Some(statuses) = status_list(filter) {
            query.push(("status", statuses));
        }
        if let Some(ref owner) = filter.owner_user_id {
            query.push(("user_id", format!("eq.{owner}")));
        }
        debug!(table = %self.table, ?query, "listing records");
        let builder = self.inner.request(Method::GET, &self.table_path()).query(&query);
        handle_response(send(builder).await?).await
    }

    async fn get_record(&self, id: &str) -> Result<DesignRecord, ServiceError> {
        let builder = self
            .inner
            .request(Method::GET, &self.table_path())
            .query(&[("select", "*".to_string()), ("id", format!("eq.{id}"))]);
        let rows: Vec<DesignRecord> = handle_response(send(builder).await?).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ServiceError::NotFound(format!("record {id}")))
    }

    async fn create_record(&self, input: &CreateRecord) -> Result<DesignRecord, ServiceError> {
        let builder = self
            .inner
            .request(Method::POST, &self.table_path())
            .header("Prefer", "return=representation")
            .json(input);
        let rows: Vec<DesignRecord> = handle_response(send(builder).await?).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ServiceError::Internal("insert returned no row".into()))
    }

    async fn update_record(
        &self,
        id: &str,
        patch: &RecordPatch,
    ) -> Result<DesignRecord, ServiceError> {
        let builder = self
            .inner
            .request(Method::PATCH, &self.table_path())
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(patch);
        let rows: Vec<DesignRecord> = handle_response(send(builder).await?).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ServiceError::NotFound(format!("record {id}")))
    }

    async fn delete_record(&self, id: &str) -> Result<(), ServiceError> {
        let builder = self
            .inner
            .request(Method::DELETE, &self.table_path())
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation");
        let rows: Vec<serde_json::Value> = handle_response(send(builder).await?).await?;
        if rows.is_empty() {
            return Err(ServiceError::NotFound(format!("record {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl AuthService for SupabaseService {
    fn current_session(&self) -> Option<Session> {
        self.inner.session()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ServiceError> {
        let session = self
            .token_request(
                "password",
                serde_json::json!({ "email": email, "password": password }),
            )
            .await?;
        self.inner.set_session(Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, ServiceError> {
        let builder = self
            .inner
            .request(Method::POST, "/auth/v1/signup")
            .json(&serde_json::json!({ "email": email, "password": password }));
        let value: serde_json::Value = handle_response(send(builder).await?).await?;
        if value.get("access_token").is_none() {
            // Confirmation email sent; no session until the address is verified.
            return Ok(None);
        }
        let token: TokenResponse = serde_json::from_value(value)
            .map_err(|e| ServiceError::Internal(format!("json decode: {e}")))?;
        let session = token.into_session(Utc::now());
        self.inner.set_session(Some(session.clone()));
        Ok(Some(session))
    }

    async fn sign_out(&self) -> Result<(), ServiceError> {
        if self.inner.session().is_none() {
            return Ok(());
        }
        let result = send(self.inner.request(Method::POST, "/auth/v1/logout")).await;
        self.inner.set_session(None);
        match result {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => {
                let err = parse_error(resp).await;
                warn!("logout request failed, local session dropped anyway: {err}");
                Ok(())
            }
            Err(err) => {
                warn!("logout request failed, local session dropped anyway: {err}");
                Ok(())
            }
        }
    }

    async fn refresh_session(&self) -> Result<Option<Session>, ServiceError> {
        let Some(refresh_token) = self.inner.session().and_then(|s| s.refresh_token) else {
            return Ok(None);
        };
        match self
            .token_request(
                "refresh_token",
                serde_json::json!({ "refresh_token": refresh_token }),
            )
            .await
        {
            Ok(session) => {
                self.inner.set_session(Some(session.clone()));
                Ok(Some(session))
            }
            Err(ServiceError::InvalidInput(msg) | ServiceError::Unauthorized(msg)) => {
                warn!("refresh token rejected, signing out locally: {msg}");
                self.inner.set_session(None);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
