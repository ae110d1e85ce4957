use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use chrono::Utc;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use langboost::auth::{Authenticator, StoreAuthenticator};
use langboost::server::{AppState, create_router};
use langboost::store::{SqliteStore, Store};
use langboost::types::User;

/// In-process server over a fresh database.
pub struct TestApp {
    _temp: TempDir,
    router: Router,
    store: Arc<dyn Store>,
    authenticator: Arc<StoreAuthenticator>,
}

impl TestApp {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let store: Arc<dyn Store> =
            Arc::new(SqliteStore::new(temp.path().join("test.db")).expect("open store"));
        store.initialize().expect("initialize store");

        let authenticator = Arc::new(StoreAuthenticator::new(store.clone()));
        let state = Arc::new(AppState::new(store.clone(), authenticator.clone()));

        Self {
            _temp: temp,
            router: create_router(state),
            store,
            authenticator,
        }
    }

    /// Creates a user and returns (user_id, token).
    pub fn user(&self, username: &str) -> (String, String) {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            name: username.to_string(),
            username: username.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.store.create_user(&user).expect("create user");
        let token = self.authenticator.issue_token(&user.id).expect("issue token");
        (user.id, token)
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("router is infallible");

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, json)
    }

    pub async fn get(&self, path: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, path, Some(token), None).await
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, path, Some(token), Some(body)).await
    }

    pub async fn patch(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::PATCH, path, Some(token), Some(body)).await
    }

    pub async fn delete(&self, path: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, path, Some(token), None).await
    }
}

pub fn id(value: &Value) -> String {
    value["data"]["id"].as_str().expect("response has data.id").to_string()
}
