//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with a scripted process launcher injected, so download streams can be
//! exercised without spotdl or yt-dlp installed.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use audiograb_core::{testing::MockLauncher, Config, DownloadEngine};
use audiograb_server::state::AppState;

/// Re-export fixtures for test convenience
pub use audiograb_core::testing::fixtures;

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "hunter2";

/// Test fixture for E2E testing with a mock launcher.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_download() {
///     let fixture = TestFixture::new();
///     let response = fixture.get_text("/download?spotify_link=x", None).await;
///     assert!(response.body.contains("data: "));
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Shared state behind the router
    pub state: Arc<AppState>,
    /// Scripted launcher - inspect recorded commands
    pub launcher: Arc<MockLauncher>,
    /// Ephemeral download root
    pub base_dir: PathBuf,
    /// Shared admin download directory
    pub admin_dir: PathBuf,
    /// Web page directory served as fallback
    pub web_dir: PathBuf,
    /// Temporary directory holding all of the above
    pub temp_dir: TempDir,
}

/// Response from a test request, body parsed as JSON
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Response from a test request, body kept as text
#[derive(Debug)]
pub struct TextResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TextResponse {
    /// `data:` payloads of an event stream, in order.
    pub fn data_lines(&self) -> Vec<String> {
        self.body
            .lines()
            .filter_map(|line| line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")))
            .map(str::to_string)
            .collect()
    }

    /// Named `event:` lines of an event stream, in order.
    pub fn event_names(&self) -> Vec<String> {
        self.body
            .lines()
            .filter_map(|line| line.strip_prefix("event: ").or_else(|| line.strip_prefix("event:")))
            .map(str::to_string)
            .collect()
    }
}

impl TestFixture {
    /// Create a fixture whose downloads print nothing and produce no files.
    pub fn new() -> Self {
        Self::with_launcher(MockLauncher::silent())
    }

    /// Create a fixture with a custom scripted launcher.
    pub fn with_launcher(launcher: MockLauncher) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base_dir = temp_dir.path().join("downloads");
        let admin_dir = temp_dir.path().join("library");
        let web_dir = temp_dir.path().join("web");
        std::fs::create_dir_all(&web_dir).expect("Failed to create web dir");
        std::fs::write(web_dir.join("index.html"), "<html>audiograb</html>")
            .expect("Failed to write index.html");

        let mut config = Config::default();
        config.server.host = std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);
        config.server.port = 0; // Not used for in-process testing
        config.server.web_dir = web_dir.clone();
        config.storage.base_dir = base_dir.clone();
        config.storage.admin_dir = Some(admin_dir.clone());
        config.admin.username = ADMIN_USERNAME.to_string();
        config.admin.password = ADMIN_PASSWORD.to_string();

        let launcher = Arc::new(launcher);
        let engine = Arc::new(DownloadEngine::new(&config, launcher.clone()));
        let state = Arc::new(AppState::new(config, engine));
        let router = audiograb_server::api::create_router(Arc::clone(&state));

        Self {
            router,
            state,
            launcher,
            base_dir,
            admin_dir,
            web_dir,
            temp_dir,
        }
    }

    /// Log in as admin and return the cookie header value to send back.
    pub async fn login(&self) -> String {
        let response = self
            .post(
                "/login",
                serde_json::json!({ "username": ADMIN_USERNAME, "password": ADMIN_PASSWORD }),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::OK);
        let set_cookie = response
            .headers
            .get(header::SET_COOKIE)
            .expect("login did not set a cookie")
            .to_str()
            .unwrap();
        set_cookie
            .split(';')
            .next()
            .expect("empty cookie")
            .to_string()
    }

    /// Send a GET request and parse the body as JSON.
    pub async fn get(&self, path: &str, cookie: Option<&str>) -> TestResponse {
        self.request("GET", path, None, cookie).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value, cookie: Option<&str>) -> TestResponse {
        self.request("POST", path, Some(body), cookie).await
    }

    /// Send a GET request and keep the body as text (event streams, files).
    pub async fn get_text(&self, path: &str, cookie: Option<&str>) -> TextResponse {
        let (status, headers, bytes) = self.send("GET", path, None, cookie).await;
        TextResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    /// Send a GET request and return the raw body bytes.
    pub async fn get_bytes(&self, path: &str) -> (StatusCode, HeaderMap, Vec<u8>) {
        self.send("GET", path, None, None).await
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        cookie: Option<&str>,
    ) -> TestResponse {
        let (status, headers, bytes) = self.send(method, path, body, cookie).await;

        let body: Value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    async fn send(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        cookie: Option<&str>,
    ) -> (StatusCode, HeaderMap, Vec<u8>) {
        let mut request_builder = Request::builder().method(method).uri(path);

        if let Some(cookie) = cookie {
            request_builder = request_builder.header(header::COOKIE, cookie);
        }

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        (status, headers, bytes.to_vec())
    }
}
