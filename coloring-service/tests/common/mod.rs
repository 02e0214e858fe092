#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Request, Response};
use coloring_service::config::{ColoringConfig, InvokerConfig};
use coloring_service::services::Invoker;
use coloring_service::startup::{build_router, AppState, Application};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;

// PATH is always set, so it stands in for a configured credential.
pub const PRESENT_CREDENTIAL: &str = "PATH";
pub const ABSENT_CREDENTIAL: &str = "COLORING_SERVICE_TEST_MISSING_KEY";

/// A generation script in a temporary directory.
pub struct TestScript {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl TestScript {
    pub fn new(body: &str) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("coloring_script.sh");
        let mut file = std::fs::File::create(&path).expect("Failed to create script");
        writeln!(file, "{}", body).expect("Failed to write script");
        Self { dir, path }
    }

    pub fn invoker_config(&self) -> InvokerConfig {
        invoker_config(self.path.clone(), PRESENT_CREDENTIAL, 30)
    }
}

pub fn invoker_config(script_path: PathBuf, credential_var: &str, timeout_secs: u64) -> InvokerConfig {
    InvokerConfig {
        script_path,
        shell: "bash".to_string(),
        credential_var: credential_var.to_string(),
        timeout_secs,
    }
}

pub fn state(config: &InvokerConfig) -> AppState {
    AppState::new(Invoker::new(config), CancellationToken::new())
}

/// Send one request through the generation router in-process.
pub async fn send(config: &InvokerConfig, request: Request<Body>) -> Response<Body> {
    build_router(state(config))
        .oneshot(request)
        .await
        .expect("Router failed to respond")
}

pub async fn get(config: &InvokerConfig, uri: &str) -> Response<Body> {
    send(
        config,
        Request::builder().uri(uri).body(Body::empty()).unwrap(),
    )
    .await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

pub struct TestApp {
    pub address: String,
    pub ops_address: String,
    pub shutdown: CancellationToken,
}

impl TestApp {
    /// Spawn the full application on random ports.
    pub async fn spawn(invoker: InvokerConfig) -> Self {
        let mut config = ColoringConfig::default();
        config.common.port = 0;
        config.ops_port = 0;
        config.invoker = invoker;

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let address = format!("http://127.0.0.1:{}", app.port());
        let ops_address = format!("http://127.0.0.1:{}", app.ops_port());
        let shutdown = app.shutdown_token();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to accept connections
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", ops_address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            ops_address,
            shutdown,
        }
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
