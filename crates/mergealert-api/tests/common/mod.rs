//! Shared helpers for API integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use serde_json::{Value, json};
use tower::ServiceExt;

use mergealert_api::{AppState, Stores, build_router};
use mergealert_core::config::AppConfig;
use mergealert_core::crypto::token_decryptor;
use mergealert_database::MemoryStore;
use mergealert_gitlab::client::GitLabProject;
use mergealert_gitlab::{GitLabApi, GitLabEndpoint, GitLabError, ProjectHook};

/// Hook URL every test project is expected to point at.
pub const CALLBACK: &str = "https://alerts.example.com/api/v1/webhook/gitlab";

/// In-memory GitLab keyed by numeric project id.
#[derive(Debug, Default)]
pub struct MockGitLab {
    pub hooks: Mutex<BTreeMap<i64, Vec<ProjectHook>>>,
    pub failing: Mutex<HashSet<i64>>,
    pub next_id: AtomicI64,
    /// Token of every hook listing, in call order.
    pub tokens: Mutex<Vec<String>>,
}

impl MockGitLab {
    pub fn add_hook(&self, project_id: i64, hook_id: i64, url: &str) {
        self.hooks
            .lock()
            .unwrap()
            .entry(project_id)
            .or_default()
            .push(hook(hook_id, url));
    }

    pub fn fail_project(&self, project_id: i64) {
        self.failing.lock().unwrap().insert(project_id);
    }

    pub fn hooks_for(&self, project_id: i64) -> Vec<ProjectHook> {
        self.hooks
            .lock()
            .unwrap()
            .get(&project_id)
            .cloned()
            .unwrap_or_default()
    }
}

fn hook(id: i64, url: &str) -> ProjectHook {
    ProjectHook {
        id,
        url: url.to_string(),
        merge_requests_events: true,
        push_events: false,
        issues_events: false,
        enable_ssl_verification: false,
    }
}

#[async_trait]
impl GitLabApi for MockGitLab {
    async fn get_project(
        &self,
        _: &GitLabEndpoint,
        _: &str,
    ) -> Result<GitLabProject, GitLabError> {
        Err(GitLabError::NotFound)
    }

    async fn list_hooks(
        &self,
        endpoint: &GitLabEndpoint,
        project_id: i64,
    ) -> Result<Vec<ProjectHook>, GitLabError> {
        self.tokens.lock().unwrap().push(endpoint.token().to_string());
        if self.failing.lock().unwrap().contains(&project_id) {
            return Err(GitLabError::Status(500));
        }
        Ok(self.hooks_for(project_id))
    }

    async fn create_hook(
        &self,
        _: &GitLabEndpoint,
        project_id: i64,
        url: &str,
    ) -> Result<ProjectHook, GitLabError> {
        let id = 500 + self.next_id.fetch_add(1, Ordering::SeqCst);
        self.add_hook(project_id, id, url);
        Ok(hook(id, url))
    }

    async fn delete_hook(
        &self,
        _: &GitLabEndpoint,
        project_id: i64,
        hook_id: i64,
    ) -> Result<(), GitLabError> {
        let mut hooks = self.hooks.lock().unwrap();
        let list = hooks.entry(project_id).or_default();
        let before = list.len();
        list.retain(|h| h.id != hook_id);
        if list.len() == before {
            Err(GitLabError::NotFound)
        } else {
            Ok(())
        }
    }

    async fn test_connection(&self, _: &GitLabEndpoint) -> Result<(), GitLabError> {
        Ok(())
    }
}

/// Every store backed by the same in-memory tables.
fn memory_stores(store: &MemoryStore) -> Stores {
    Stores {
        projects: Arc::new(store.clone()),
        destinations: Arc::new(store.clone()),
        users: Arc::new(store.clone()),
        notifications: Arc::new(store.clone()),
        quotas: Arc::new(store.clone()),
    }
}

/// Test application context.
pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    pub gitlab: Arc<MockGitLab>,
}

/// Response from a test request.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestApp {
    /// App with an optional GitLab token and hook secret.
    pub fn new(token: Option<&str>, webhook_secret: Option<&str>) -> Self {
        Self::with_encryption_key(token, webhook_secret, None)
    }

    /// App whose stored GitLab token is encrypted under `encryption_key`.
    pub fn with_encryption_key(
        token: Option<&str>,
        webhook_secret: Option<&str>,
        encryption_key: Option<&str>,
    ) -> Self {
        let mut config = AppConfig::from_toml(
            r#"
            [server]
            public_webhook_url = "https://alerts.example.com/"

            [database]
            url = "postgres://alert@localhost/merge_alert_test"

            [logging]
            format = "pretty"
            "#,
        )
        .unwrap();
        config.gitlab.access_token = token.map(str::to_string);
        config.gitlab.webhook_secret = webhook_secret.map(str::to_string);
        config.gitlab.encryption_key = encryption_key.map(str::to_string);
        let decryptor = token_decryptor(&config.gitlab).unwrap();

        let store = MemoryStore::new();
        let gitlab = Arc::new(MockGitLab::default());
        let state = AppState::new(
            config,
            memory_stores(&store),
            gitlab.clone(),
            decryptor,
            None,
        );

        Self {
            router: build_router(state),
            store,
            gitlab,
        }
    }

    /// Make an HTTP request to the test app.
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let body_str = body
            .map(|b| serde_json::to_string(&b).unwrap())
            .unwrap_or_default();

        let mut req = Request::builder()
            .method(method)
            .uri(path)
            .header("Content-Type", "application/json");
        for (name, value) in headers {
            req = req.header(*name, *value);
        }

        let response = self
            .router
            .clone()
            .oneshot(req.body(Body::from(body_str)).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse { status, body }
    }

    /// Wait until background writes reach `count`.
    pub async fn wait_for_state_writes(&self, count: i64) {
        for _ in 0..100 {
            if self.store.webhook_state_writes() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {count} hook state writes, saw {}",
            self.store.webhook_state_writes()
        );
    }
}

/// A chat platform stand-in answering every POST with a fixed reply.
pub struct FakePlatform {
    pub url: String,
    pub hits: Arc<AtomicUsize>,
}

pub async fn spawn_platform(status: StatusCode, reply: Value) -> FakePlatform {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/send",
        post(move || {
            let counter = counter.clone();
            let reply = reply.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                (status, axum::Json(reply))
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakePlatform {
        url: format!("http://{addr}/send?key=test"),
        hits,
    }
}

/// An opened merge-request hook for GitLab project `gitlab_project_id`.
pub fn merge_request_event(gitlab_project_id: i64, state: &str) -> Value {
    json!({
        "object_kind": "merge_request",
        "user": {"name": "Alice", "username": "alice", "email": "alice@example.com"},
        "project": {"id": gitlab_project_id, "name": "app"},
        "object_attributes": {
            "iid": 7,
            "title": "Add feature",
            "state": state,
            "source_branch": "feature/x",
            "target_branch": "main",
            "url": "https://gitlab.example.com/group/app/-/merge_requests/7"
        },
        "assignees": [{"name": "Bob", "username": "bob", "email": "bob@example.com"}]
    })
}
