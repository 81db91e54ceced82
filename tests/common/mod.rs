#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use shapes_live::{
    config::Config,
    routes,
    services::{sessions::SessionStore, shapes::MemoryShapeStore, users::MemoryAuthenticator},
    AppState,
};
use tower::ServiceExt;

pub const ADMIN: (&str, &str) = ("admin", "correct horse battery");
pub const VIEWER: (&str, &str) = ("viewer", "viewer password");

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub directory: Arc<MemoryAuthenticator>,
}

pub fn test_config() -> Config {
    Config::new("test-access-secret", "test-refresh-secret")
}

pub fn app() -> TestApp {
    app_with(test_config())
}

pub fn app_with(config: Config) -> TestApp {
    let directory = Arc::new(MemoryAuthenticator::new(4));
    directory.add_user(ADMIN.0, ADMIN.1, true).unwrap();
    directory.add_user(VIEWER.0, VIEWER.1, false).unwrap();

    let state = AppState::new(
        config,
        directory.clone(),
        Arc::new(MemoryShapeStore::new()),
        Arc::new(SessionStore::in_memory()),
    );
    let router = routes::router(state.clone());
    TestApp {
        state,
        router,
        directory,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// Every `Set-Cookie` line on the response.
    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    /// Value of a `refresh_token=` cookie being set (non-empty).
    pub fn refresh_token(&self) -> Option<String> {
        self.set_cookies().iter().find_map(|c| {
            let value = c.strip_prefix("refresh_token=")?.split(';').next()?;
            (!value.is_empty()).then(|| value.to_string())
        })
    }

    pub fn clears_refresh_cookie(&self) -> bool {
        self.set_cookies()
            .iter()
            .any(|c| c.starts_with("refresh_token=;") && c.contains("Max-Age=0"))
    }
}

pub struct RequestBuilder {
    method: Method,
    uri: String,
    headers: Vec<(header::HeaderName, String)>,
    body: Option<Value>,
}

pub fn request(method: Method, uri: &str) -> RequestBuilder {
    RequestBuilder {
        method,
        uri: uri.to_string(),
        headers: Vec::new(),
        body: None,
    }
}

impl RequestBuilder {
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.headers.push((header::AUTHORIZATION, format!("Bearer {token}")));
        self
    }

    pub fn refresh_cookie(mut self, token: &str) -> Self {
        self.headers.push((header::COOKIE, format!("refresh_token={token}")));
        self
    }

    pub fn build(self) -> Request<Body> {
        let mut builder = Request::builder().method(self.method).uri(self.uri);
        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }
        match self.body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    pub async fn send(self, router: &Router) -> TestResponse {
        let response = router.clone().oneshot(self.build()).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }
}

/// Log in as the staff user; returns (access token, refresh token).
pub async fn login_admin(router: &Router) -> (String, String) {
    let res = request(Method::POST, "/api/accounts/login/")
        .json(json!({ "username": ADMIN.0, "password": ADMIN.1 }))
        .send(router)
        .await;
    assert_eq!(res.status, StatusCode::OK, "login failed: {}", res.body);
    let access = res.body["access"].as_str().unwrap().to_string();
    let refresh = res.refresh_token().expect("refresh cookie set");
    (access, refresh)
}
