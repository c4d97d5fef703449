#![allow(dead_code)]

use assessments_api::{config::Config, create_router, services::AppState};
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub const TEACHER_EMAIL: &str = "teacher@example.com";
pub const OTHER_TEACHER_EMAIL: &str = "other@example.com";
pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const PASSWORD: &str = "correct horse battery";

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
}

pub fn test_config() -> Config {
    let mut config = Config::development();
    config.password_hash_cost = 4;
    config.public_base_url = "http://app.test".to_string();
    config
}

/// Router over in-memory backends with a teacher, a second teacher and an admin.
pub async fn create_test_app() -> TestApp {
    create_test_app_with(test_config()).await
}

pub async fn create_test_app_with(config: Config) -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let state = Arc::new(AppState::in_memory(config));

    for (email, is_admin) in [
        (TEACHER_EMAIL, false),
        (OTHER_TEACHER_EMAIL, false),
        (ADMIN_EMAIL, true),
    ] {
        state
            .identity
            .create_user(email, Some(PASSWORD), is_admin)
            .await
            .expect("Failed to seed test user");
    }

    TestApp {
        router: create_router(state.clone()),
        state,
    }
}

impl TestApp {
    /// Signs in through the login route and returns the identity token.
    pub async fn token_for(&self, email: &str) -> String {
        let (status, body) = self
            .post(
                "/api/auth/login",
                None,
                json!({ "data": { "email": email, "password": PASSWORD } }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["data"]["idToken"]
            .as_str()
            .expect("idToken in login response")
            .to_string()
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    /// POST with the `{data: ...}` envelope the web client uses.
    pub async fn call(&self, route: &str, token: &str, data: Value) -> (StatusCode, Value) {
        self.post(&format!("/api/{}", route), Some(token), json!({ "data": data }))
            .await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, body)
    }

    /// Creates an assessment as `token`'s user and returns its id.
    pub async fn create_assessment(&self, token: &str) -> String {
        let (status, body) = self
            .call(
                "create-assessment",
                token,
                json!({
                    "name": "Chan Tai Man",
                    "age": 8,
                    "gender": "male",
                    "grade": "P3",
                    "school": "Sha Tin Primary",
                    "motherTongue": { "language": "cantonese" },
                    "otherLanguages": [{ "language": "english" }]
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {}", body);
        body["data"]["id"].as_str().unwrap().to_string()
    }
}
