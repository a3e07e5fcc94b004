#![allow(dead_code)]

use std::sync::Arc;

use application::SystemClock;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use config::{AuthConfig, ChatConfig};
use infrastructure::Infrastructure;
use serde_json::Value;
use tower::ServiceExt;
use web_api::{router, AppState, JwtService};

pub const PASSWORD: &str = "correct-horse";

pub struct TestApp {
    pub router: Router,
    pub infrastructure: Infrastructure,
}

pub fn build_app() -> TestApp {
    let auth = AuthConfig {
        jwt_secret: "test-secret-key-with-at-least-32-characters".into(),
        expiration_hours: 1,
        bcrypt_cost: Some(4),
        ..AuthConfig::default()
    };
    let infrastructure = Infrastructure::in_memory(ChatConfig::default(), &auth, Arc::new(SystemClock));
    let jwt_service = Arc::new(JwtService::new(
        &auth,
        infrastructure.token_blacklist.clone(),
    ));
    let state = AppState::new(&infrastructure, jwt_service);

    TestApp {
        router: router(state),
        infrastructure,
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
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// 注册并返回 (用户ID, 令牌)
    pub async fn register(&self, email: &str) -> (String, String) {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/v1/auth/register",
                None,
                Some(serde_json::json!({ "email": email, "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        (
            body["user"]["id"].as_str().unwrap().to_string(),
            body["token"].as_str().unwrap().to_string(),
        )
    }
}
