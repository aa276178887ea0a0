//! In-memory backends for tests: a `RecordService` + `AuthService` that
//! enforces row ownership the way the hosted policies do, and an
//! `ObjectStore` with injectable failures.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use desain_core::record::{CreateRecord, DesignRecord, RecordFilter, RecordPatch};
use desain_core::session::{Session, UserIdentity};
use desain_store::{join_public_url, strip_public_base, ObjectStore, StoreError};

use crate::{AuthService, RecordService, ServiceError};

/// Calls that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOp {
    List,
    Get,
    Create,
    Update,
    Delete,
    SignIn,
    SignUp,
    SignOut,
    Refresh,
}

struct Account {
    password: String,
    identity: UserIdentity,
}

#[derive(Default)]
struct Counters {
    list: usize,
    create: usize,
    update: usize,
    delete: usize,
}

struct State {
    records: Vec<DesignRecord>,
    accounts: HashMap<String, Account>,
    session: Option<Session>,
    next_id: u64,
    next_user: u64,
    clock: DateTime<Utc>,
    failing: HashSet<MemoryOp>,
    confirm_email: bool,
    calls: Counters,
}

pub struct MemoryService {
    state: Mutex<State>,
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryService {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                records: Vec::new(),
                accounts: HashMap::new(),
                session: None,
                next_id: 1,
                next_user: 1,
                clock: DateTime::from_timestamp(1_756_684_800, 0).unwrap_or_default(),
                failing: HashSet::new(),
                confirm_email: false,
                calls: Counters::default(),
            }),
        }
    }

    /// Register an account up front.
    pub fn with_user(self, id: &str, email: &str, password: &str) -> Self {
        self.lock().accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                identity: UserIdentity {
                    id: id.to_string(),
                    email: Some(email.to_string()),
                },
            },
        );
        self
    }

    /// Sign-ups return no session until confirmed.
    pub fn require_email_confirmation(self, required: bool) -> Self {
        self.lock().confirm_email = required;
        self
    }

    /// Seed a row, bypassing ownership checks.
    pub fn insert(&self, record: DesignRecord) {
        self.lock().records.push(record);
    }

    pub fn set_session(&self, session: Option<Session>) {
        self.lock().session = session;
    }

    pub fn records(&self) -> Vec<DesignRecord> {
        self.lock().records.clone()
    }

    pub fn record(&self, id: &str) -> Option<DesignRecord> {
        self.lock().records.iter().find(|r| r.id == id).cloned()
    }

    pub fn fail(&self, op: MemoryOp) {
        self.lock().failing.insert(op);
    }

    pub fn heal(&self, op: MemoryOp) {
        self.lock().failing.remove(&op);
    }

    pub fn list_calls(&self) -> usize {
        self.lock().calls.list
    }

    pub fn create_calls(&self) -> usize {
        self.lock().calls.create
    }

    pub fn update_calls(&self) -> usize {
        self.lock().calls.update
    }

    pub fn delete_calls(&self) -> usize {
        self.lock().calls.delete
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl State {
    fn check(&self, op: MemoryOp) -> Result<(), ServiceError> {
        if self.failing.contains(&op) {
            return Err(ServiceError::Internal(format!("injected {op:?} failure")));
        }
        Ok(())
    }

    fn caller(&self) -> Result<String, ServiceError> {
        self.session
            .as_ref()
            .map(|s| s.user.id.clone())
            .ok_or_else(|| ServiceError::Unauthorized("no session".into()))
    }

    fn owned_mut(&mut self, id: &str) -> Result<&mut DesignRecord, ServiceError> {
        let caller = self.caller()?;
        self.records
            .iter_mut()
            .find(|r| r.id == id && r.owner_user_id == caller)
            .ok_or_else(|| ServiceError::NotFound(format!("record {id}")))
    }

    fn issue_session(&mut self, identity: UserIdentity) -> Session {
        let n = self.next_id;
        self.next_id += 1;
        let session = Session {
            access_token: format!("access-{}-{n}", identity.id),
            refresh_token: Some(format!("refresh-{}-{n}", identity.id)),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            user: identity,
        };
        self.session = Some(session.clone());
        session
    }
}

#[async_trait]
impl RecordService for MemoryService {
    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<DesignRecord>, ServiceError> {
        let mut state = self.lock();
        state.calls.list += 1;
        state.check(MemoryOp::List)?;
        let caller = state.caller()?;
        let mut rows: Vec<DesignRecord> = state
            .records
            .iter()
            .filter(|r| r.owner_user_id == caller && filter.matches(r))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn get_record(&self, id: &str) -> Result<DesignRecord, ServiceError> {
        let mut state = self.lock();
        state.check(MemoryOp::Get)?;
        state.owned_mut(id).map(|r| r.clone())
    }

    async fn create_record(&self, input: &CreateRecord) -> Result<DesignRecord, ServiceError> {
        let mut state = self.lock();
        state.calls.create += 1;
        state.check(MemoryOp::Create)?;
        let caller = state.caller()?;
        if input.owner_user_id != caller {
            return Err(ServiceError::Unauthorized(
                "new row violates row-level security policy".into(),
            ));
        }
        let id = state.next_id;
        state.next_id += 1;
        state.clock += Duration::seconds(1);
        let record = DesignRecord {
            id: id.to_string(),
            client_name: input.client_name.clone(),
            briefing_date: input.briefing_date,
            briefing_text: input.briefing_text.clone(),
            reference_files: input.reference_files.clone(),
            result_files: Vec::new(),
            status: input.status,
            briefing_seen: true,
            result_seen: true,
            owner_user_id: input.owner_user_id.clone(),
            created_at: state.clock,
        };
        state.records.push(record.clone());
        Ok(record)
    }

    async fn update_record(
        &self,
        id: &str,
        patch: &RecordPatch,
    ) -> Result<DesignRecord, ServiceError> {
        let mut state = self.lock();
        state.calls.update += 1;
        state.check(MemoryOp::Update)?;
        let record = state.owned_mut(id)?;
        record.apply(patch);
        Ok(record.clone())
    }

    async fn delete_record(&self, id: &str) -> Result<(), ServiceError> {
        let mut state = self.lock();
        state.calls.delete += 1;
        state.check(MemoryOp::Delete)?;
        state.owned_mut(id)?;
        state.records.retain(|r| r.id != id);
        Ok(())
    }
}

#[async_trait]
impl AuthService for MemoryService {
    fn current_session(&self) -> Option<Session> {
        self.lock().session.clone()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ServiceError> {
        let mut state = self.lock();
        state.check(MemoryOp::SignIn)?;
        let identity = match state.accounts.get(email) {
            Some(account) if account.password == password => account.identity.clone(),
            _ => return Err(ServiceError::InvalidInput("Invalid login credentials".into())),
        };
        Ok(state.issue_session(identity))
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, ServiceError> {
        let mut state = self.lock();
        state.check(MemoryOp::SignUp)?;
        if state.accounts.contains_key(email) {
            return Err(ServiceError::InvalidInput("User already registered".into()));
        }
        let n = state.next_user;
        state.next_user += 1;
        let identity = UserIdentity {
            id: format!("user-{n}"),
            email: Some(email.to_string()),
        };
        state.accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                identity: identity.clone(),
            },
        );
        if state.confirm_email {
            return Ok(None);
        }
        Ok(Some(state.issue_session(identity)))
    }

    async fn sign_out(&self) -> Result<(), ServiceError> {
        let mut state = self.lock();
        let result = state.check(MemoryOp::SignOut);
        state.session = None;
        result
    }

    async fn refresh_session(&self) -> Result<Option<Session>, ServiceError> {
        let mut state = self.lock();
        state.check(MemoryOp::Refresh)?;
        match state.session.as_ref().map(|s| s.user.clone()) {
            Some(identity) => Ok(Some(state.issue_session(identity))),
            None => Ok(None),
        }
    }
}

const MEMORY_PUBLIC_BASE: &str = "memory://desain-files";

/// Blob store kept in a map. Uploads whose file name is registered with
/// [`MemoryObjectStore::fail_uploads_named`] fail.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Bytes>>,
    content_types: Mutex<HashMap<String, String>>,
    failing_names: Mutex<HashSet<String>>,
    fail_deletes: AtomicBool,
    puts: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_uploads_named(&self, name: &str) {
        self.failing_names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string());
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    /// Seed an object without counting it as an upload.
    pub fn seed(&self, key: &str, data: impl Into<Bytes>) -> String {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), data.into());
        self.public_url(key)
    }

    /// Content type the key was last uploaded with.
    pub fn content_type(&self, key: &str) -> Option<String> {
        self.content_types
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn put_calls(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let name = key.rsplit('/').next().unwrap_or(key);
        let name = name.split_once('_').map(|(_, n)| n).unwrap_or(name);
        if self
            .failing_names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(name)
        {
            return Err(StoreError::Internal(format!("injected upload failure for {key}")));
        }
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), data);
        self.content_types
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), content_type.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Internal(format!("injected delete failure for {key}")));
        }
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        join_public_url(MEMORY_PUBLIC_BASE, key)
    }

    fn key_for_public_url(&self, url: &str) -> Option<String> {
        strip_public_base(MEMORY_PUBLIC_BASE, url)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use desain_core::record::Status;

    use super::*;

    fn create_for(owner: &str, name: &str) -> CreateRecord {
        CreateRecord {
            client_name: name.into(),
            briefing_date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            briefing_text: String::new(),
            owner_user_id: owner.into(),
            reference_files: Vec::new(),
            status: Status::Queued,
        }
    }

    #[tokio::test]
    async fn rows_are_scoped_to_the_signed_in_owner() {
        let svc = MemoryService::new()
            .with_user("user-a", "a@example.com", "secret1")
            .with_user("user-b", "b@example.com", "secret2");

        svc.sign_in("a@example.com", "secret1").await.unwrap();
        let a1 = svc.create_record(&create_for("user-a", "A1")).await.unwrap();
        let a2 = svc.create_record(&create_for("user-a", "A2")).await.unwrap();
        assert!(a2.created_at > a1.created_at);

        let rows = svc.list_records(&RecordFilter::default()).await.unwrap();
        assert_eq!(rows[0].id, a2.id, "newest first");

        svc.sign_in("b@example.com", "secret2").await.unwrap();
        assert!(svc.list_records(&RecordFilter::default()).await.unwrap().is_empty());
        let err = svc.delete_record(&a1.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        let err = svc.create_record(&create_for("user-a", "X")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn signed_out_calls_are_unauthorized() {
        let svc = MemoryService::new();
        let err = svc.list_records(&RecordFilter::default()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn injected_failures_and_counters() {
        let svc = MemoryService::new().with_user("user-a", "a@example.com", "pw1234");
        svc.sign_in("a@example.com", "pw1234").await.unwrap();
        let rec = svc.create_record(&create_for("user-a", "A")).await.unwrap();

        svc.fail(MemoryOp::Update);
        assert!(svc.update_record(&rec.id, &RecordPatch::default()).await.is_err());
        svc.heal(MemoryOp::Update);
        svc.update_record(&rec.id, &RecordPatch::default()).await.unwrap();
        assert_eq!(svc.update_calls(), 2);
    }

    #[tokio::test]
    async fn object_store_fails_uploads_by_file_name() {
        let store = MemoryObjectStore::new();
        store.fail_uploads_named("b.png");
        store.put("u/1_a.png", Bytes::from("a"), "image/png").await.unwrap();
        assert!(store.put("u/2_b.png", Bytes::from("b"), "image/png").await.is_err());
        assert_eq!(store.keys(), vec!["u/1_a.png".to_string()]);
        assert_eq!(store.content_type("u/1_a.png").as_deref(), Some("image/png"));
        assert_eq!(store.put_calls(), 2);

        let url = store.public_url("u/1_a.png");
        assert_eq!(store.key_for_public_url(&url).as_deref(), Some("u/1_a.png"));
    }
}
