#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::Json;
use axum::Router;
use chrono::Duration;
use dashboard_service::config::{
    AuthConfig, DashboardConfig, EndpointConfig, InferenceConfig, PersistenceBackend,
    PersistenceConfig, StorageConfig,
};
use dashboard_service::models::Principal;
use dashboard_service::services::{InMemoryHistory, Stores, TokenService};
use dashboard_service::startup::Application;
use serde_json::{json, Value};
use service_core::config::Config as CoreConfig;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub const TEST_JWT_SECRET: &str = "integration-test-secret";
pub const TEST_USER_ID: &str = "test_user_123";
pub const TEST_USERNAME: &str = "alice";
pub const IMAGE_HOST: &str = "image-classifier.models.example.com";
pub const TEXT_HOST: &str = "text-summarizer.models.example.com";
pub const MAX_UPLOAD_BYTES: usize = 1024 * 1024;

/// A request as seen by the stub inference server.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub path: String,
    pub host: Option<String>,
    pub content_type: Option<String>,
    pub body: Value,
}

#[derive(Clone, Default)]
struct StubState {
    response: Arc<Mutex<Option<(StatusCode, Value)>>>,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

/// In-process stand-in for the model gateway. Answers every POST with the
/// configured response and records what it received.
pub struct StubInference {
    pub address: String,
    state: StubState,
}

impl StubInference {
    pub async fn spawn() -> Self {
        let state = StubState::default();
        let app = Router::new()
            .fallback(stub_handler)
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind stub inference server");
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            address: format!("http://127.0.0.1:{}", port),
            state,
        }
    }

    pub fn respond_with(&self, status: StatusCode, body: Value) {
        *self.state.response.lock().unwrap() = Some((status, body));
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

async fn stub_handler(
    State(state): State<StubState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let header_str = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    state.requests.lock().unwrap().push(CapturedRequest {
        path: uri.path().to_string(),
        host: header_str(header::HOST),
        content_type: header_str(header::CONTENT_TYPE),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });

    let (status, body) = state
        .response
        .lock()
        .unwrap()
        .clone()
        .unwrap_or((StatusCode::OK, json!({})));
    (status, Json(body))
}

pub struct TestApp {
    pub address: String,
    pub history: InMemoryHistory,
    pub stub: StubInference,
    pub tokens: TokenService,
    pub upload_dir: PathBuf,
    pub client: reqwest::Client,
    _temp: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Spawn on a random port with the in-memory history and a fresh stub.
    /// `customize` may adjust the config before the app is built.
    pub async fn spawn_with(customize: impl FnOnce(&mut DashboardConfig)) -> Self {
        let stub = StubInference::spawn().await;
        let temp = tempfile::tempdir().expect("Failed to create temp dir");
        let upload_dir = temp.path().join("uploads");

        let mut config = test_config(&stub.address, upload_dir.clone());
        customize(&mut config);

        let history = InMemoryHistory::new();
        let app = Application::build_with_stores(config, Stores::in_memory(history.clone()))
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            history,
            stub,
            tokens: TokenService::new(TEST_JWT_SECRET),
            upload_dir,
            client,
            _temp: temp,
        }
    }

    pub fn dashboard_url(&self, path: &str) -> String {
        format!("{}/dashboard{}", self.address, path)
    }

    pub fn token_for(&self, user_id: &str, username: &str) -> String {
        self.tokens
            .issue(&Principal::new(user_id, username), Duration::minutes(10))
            .expect("Failed to issue test token")
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token_for(TEST_USER_ID, TEST_USERNAME))
    }

    pub fn uploaded_files(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(&self.upload_dir) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub async fn post_image(
        &self,
        auth: Option<&str>,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> reqwest::Response {
        let form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string()),
        );
        let mut request = self
            .client
            .post(self.dashboard_url("/image-class"))
            .multipart(form);
        if let Some(auth) = auth {
            request = request.header("Authorization", auth);
        }
        request.send().await.expect("Failed to execute request")
    }

    pub async fn post_text(&self, auth: Option<&str>, body: Value) -> reqwest::Response {
        let mut request = self
            .client
            .post(self.dashboard_url("/text-summary"))
            .json(&body);
        if let Some(auth) = auth {
            request = request.header("Authorization", auth);
        }
        request.send().await.expect("Failed to execute request")
    }
}

pub fn test_config(stub_address: &str, upload_dir: PathBuf) -> DashboardConfig {
    DashboardConfig {
        common: CoreConfig { port: 0 },
        route_prefix: "/dashboard".to_string(),
        inference: InferenceConfig {
            image: EndpointConfig {
                url: format!("{}/v1/models/image-classifier:predict", stub_address),
                host: IMAGE_HOST.to_string(),
            },
            text: EndpointConfig {
                url: format!("{}/v1/models/text-summarizer:predict", stub_address),
                host: TEXT_HOST.to_string(),
            },
            timeout_secs: 5,
        },
        storage: StorageConfig {
            upload_dir,
            max_upload_bytes: MAX_UPLOAD_BYTES,
        },
        persistence: PersistenceConfig {
            backend: PersistenceBackend::Memory,
            mongodb: None,
        },
        auth: AuthConfig {
            jwt_secret: TEST_JWT_SECRET.to_string(),
        },
    }
}

/// A small valid PNG.
pub fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([0, 128, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("Failed to encode PNG");
    out.into_inner()
}

/// An address nothing is listening on.
pub async fn closed_port_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

/// An address that answers with 200 headers and a partial body, then stalls.
pub async fn stalling_server_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 64 * 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 100\r\n\r\n{\"summary\":",
                    )
                    .await;
                tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            });
        }
    });

    format!("http://127.0.0.1:{}", port)
}
