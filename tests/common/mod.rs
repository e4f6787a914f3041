#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use pasetors::claims::Claims;
use pasetors::keys::SymmetricKey;
use pasetors::{local, version4::V4};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use agora::app::audit::{AuditError, AuditStore};
use agora::app::auth::AuthService;
use agora::app::store::{StoreError, VoteStore};
use agora::config::{AppConfig, StoreBackend};
use agora::domain::audit::{AuditEntry, AuditQuery};
use agora::domain::vote::{AppliedVote, Direction, Subject, SubjectKind, SubjectRef, VoteRecord};
use agora::infra::memory::{MemoryAuditStore, MemoryVoteStore};
use agora::AppState;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

// Test-only key, never used outside this harness.
const TEST_PASETO_ACCESS_KEY: [u8; 32] = *b"0123456789abcdef0123456789abcdef";
const TEST_ADMIN_TOKEN: &str = "test-admin-token-12345";

pub fn test_config() -> AppConfig {
    AppConfig {
        http_addr: "127.0.0.1:0".into(),
        store_backend: StoreBackend::Memory,
        database_url: None,
        redis_url: None,
        db_max_connections: 5,
        db_connect_timeout_seconds: 5,
        db_idle_timeout_seconds: 0,
        db_max_lifetime_seconds: 1800,
        admin_token: Some(TEST_ADMIN_TOKEN.into()),
        paseto_access_key: TEST_PASETO_ACCESS_KEY,
        access_ttl_minutes: 15,
        vote_max_attempts: 5,
        audit_snapshot_max_chars: 100,
    }
}

// ---------------------------------------------------------------------------
// TestApp: one fresh in-memory backend per test
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub store: Arc<MemoryVoteStore>,
}

pub struct TestResponse {
    pub status: StatusCode,
    body_bytes: bytes::Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub access_token: String,
}

/// Audit store that rejects every write.
pub struct BrokenAuditStore;

#[async_trait]
impl AuditStore for BrokenAuditStore {
    async fn append(&self, _entry: &AuditEntry) -> Result<(), AuditError> {
        Err(AuditError::Backend(anyhow::anyhow!("audit table unavailable")))
    }

    async fn list(&self, _query: &AuditQuery) -> Result<Vec<AuditEntry>, AuditError> {
        Err(AuditError::Backend(anyhow::anyhow!("audit table unavailable")))
    }
}

/// Vote store whose reads work but whose writes fail with a backend error.
pub struct UnavailableVoteStore {
    inner: Arc<MemoryVoteStore>,
}

#[async_trait]
impl VoteStore for UnavailableVoteStore {
    async fn ping(&self) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("connection refused"))
    }

    async fn find_subject(&self, subject: SubjectRef) -> Result<Option<Subject>, StoreError> {
        self.inner.find_subject(subject).await
    }

    async fn find_vote(
        &self,
        subject: SubjectRef,
        user_id: Uuid,
    ) -> Result<Option<VoteRecord>, StoreError> {
        self.inner.find_vote(subject, user_id).await
    }

    async fn apply_toggle(
        &self,
        _subject: SubjectRef,
        _user_id: Uuid,
        _requested: Direction,
    ) -> Result<AppliedVote, StoreError> {
        Err(StoreError::Backend(anyhow::anyhow!("connection refused")))
    }
}

pub async fn app() -> TestApp {
    TestApp::with_audit(Arc::new(MemoryAuditStore::new()))
}

impl TestApp {
    pub fn with_audit(audit: Arc<dyn AuditStore>) -> Self {
        let store = Arc::new(MemoryVoteStore::new());
        Self::build(store.clone(), store, audit)
    }

    /// Subjects can be seeded through `store`, but every vote write fails.
    pub fn with_unavailable_writes() -> Self {
        let store = Arc::new(MemoryVoteStore::new());
        let failing = Arc::new(UnavailableVoteStore {
            inner: store.clone(),
        });
        Self::build(store, failing, Arc::new(MemoryAuditStore::new()))
    }

    fn build(
        store: Arc<MemoryVoteStore>,
        votes: Arc<dyn VoteStore>,
        audit: Arc<dyn AuditStore>,
    ) -> Self {
        let state = AppState::with_stores(&test_config(), votes, audit, None);
        let router = agora::http::router(state.clone());

        TestApp {
            router,
            state,
            store,
        }
    }

    // ------------------------------------------------------------------
    // Low-level request helper
    // ------------------------------------------------------------------
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");

        for &(key, value) in headers {
            builder = builder.header(key, value);
        }

        let request = builder.body(Body::empty()).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse { status, body_bytes }
    }

    // ------------------------------------------------------------------
    // Convenience HTTP helpers
    // ------------------------------------------------------------------
    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        let auth = token.map(|t| format!("Bearer {}", t));
        let headers: Vec<(&str, &str)> = auth
            .as_deref()
            .map(|value| vec![("Authorization", value)])
            .unwrap_or_default();
        self.request(Method::GET, path, &headers).await
    }

    pub async fn post(&self, path: &str, token: Option<&str>) -> TestResponse {
        let auth = token.map(|t| format!("Bearer {}", t));
        let headers: Vec<(&str, &str)> = auth
            .as_deref()
            .map(|value| vec![("Authorization", value)])
            .unwrap_or_default();
        self.request(Method::POST, path, &headers).await
    }

    /// GET with an admin token in the x-admin-token header.
    pub async fn get_admin(&self, path: &str, admin_token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        if let Some(t) = admin_token {
            headers.push(("x-admin-token", t));
        }
        self.request(Method::GET, path, &headers).await
    }

    /// Vote on a subject through the public route.
    pub async fn vote(
        &self,
        subject: SubjectRef,
        is_upvote: bool,
        user: &TestUser,
    ) -> TestResponse {
        let collection = match subject.kind {
            SubjectKind::Question => "questions",
            SubjectKind::Answer => "answers",
        };
        let path = format!("/{}/{}/vote?is_upvote={}", collection, subject.id, is_upvote);
        self.post(&path, Some(&user.access_token)).await
    }

    // ------------------------------------------------------------------
    // Test data helpers
    // ------------------------------------------------------------------

    /// A user with a freshly minted access token.
    pub fn create_user(&self) -> TestUser {
        let id = Uuid::new_v4();
        let auth = AuthService::new(self.state.paseto_access_key, self.state.access_ttl_minutes);
        let token = auth.issue_access_token(id).expect("issue_access_token failed");
        TestUser {
            id,
            access_token: token.token,
        }
    }

    /// A validly encrypted access token carrying an arbitrary `sub` claim.
    pub fn token_with_subject(&self, subject: &str) -> String {
        let mut claims = Claims::new().expect("claims");
        claims.issuer("agora").expect("issuer");
        claims.audience("agora").expect("audience");
        claims.subject(subject).expect("subject");
        claims.add_additional("typ", "access").expect("typ");
        let key = SymmetricKey::<V4>::from(&self.state.paseto_access_key).expect("key");
        local::encrypt(&key, &claims, None, None).expect("encrypt")
    }

    pub async fn create_question(&self) -> SubjectRef {
        self.store.insert_subject(SubjectKind::Question).await
    }

    pub async fn create_answer(&self) -> SubjectRef {
        self.store.insert_subject(SubjectKind::Answer).await
    }

    pub fn admin_token(&self) -> &str {
        TEST_ADMIN_TOKEN
    }
}
