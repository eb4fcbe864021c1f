#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use lingo_backend::config::Config;
use lingo_backend::db::DatabaseProxy;
use lingo_backend::services::llm_provider::{LLMConfig, LLMProvider};
use lingo_backend::services::speech::{SpeechAnalyzer, SpeechConfig};
use lingo_backend::state::AppState;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

/// In-memory store with the text and speech providers switched off, so every
/// session gets the built-in content.
pub async fn create_test_app() -> TestApp {
    create_test_app_with_config(Config::for_tests()).await
}

pub async fn create_test_app_with_config(config: Config) -> TestApp {
    let db_proxy = Arc::new(
        DatabaseProxy::connect(&config.database_url)
            .await
            .expect("test store"),
    );
    let state = AppState::new(
        config,
        db_proxy,
        None,
        LLMProvider::new(LLMConfig::disabled()),
        SpeechAnalyzer::new(SpeechConfig::disabled()),
    );
    TestApp {
        router: lingo_backend::create_app_with_state(state.clone()),
        state,
    }
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, Some(token), None).await
    }

    /// Registers a learner and returns `(token, user_id)`.
    pub async fn register(&self, username: &str) -> (String, String) {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/auth/register",
                None,
                Some(serde_json::json!({
                    "email": format!("{username}@example.com"),
                    "username": username,
                    "password": "correct horse battery",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        (
            body["data"]["token"].as_str().unwrap().to_string(),
            body["data"]["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    /// Creates a session in `module` and returns its id and client view.
    pub async fn start_session(&self, module: &str, token: &str, body: Value) -> (String, Value) {
        let (status, json) = self
            .post(&format!("/api/{module}/sessions"), token, body)
            .await;
        assert_eq!(status, StatusCode::CREATED, "create session failed: {json}");
        (json["data"]["id"].as_str().unwrap().to_string(), json["data"].clone())
    }
}
