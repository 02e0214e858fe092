//! Application startup and lifecycle management.
//!
//! Two listeners: the generation router on `port`, where every path answers
//! the generation handler, and an ops router (health/metrics) on `ops_port`.

use crate::config::ColoringConfig;
use crate::handlers;
use crate::services::Invoker;
use axum::{
    http::{header, HeaderValue},
    middleware::from_fn,
    routing::get,
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{metrics::metrics_middleware, tracing::request_id_middleware};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Shared application state. Holds no per-request data.
#[derive(Clone)]
pub struct AppState {
    pub invoker: Arc<Invoker>,
    /// Cancelled on shutdown; each request runs under a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(invoker: Invoker, shutdown: CancellationToken) -> Self {
        Self {
            invoker: Arc::new(invoker),
            shutdown,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    // `get` would also answer HEAD by running the script, so HEAD is routed
    // explicitly; every other method lands on the method fallback.
    let generation = get(handlers::generate)
        .head(handlers::method_not_allowed)
        .fallback(handlers::method_not_allowed);

    with_service_layers(
        Router::new()
            .route("/", generation.clone())
            .route("/*path", generation),
    )
    .with_state(state)
}

/// Middleware stack of the generation listener. Panics are caught inside the
/// CORS layer so 500 responses carry the header too.
pub fn with_service_layers<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(from_fn(metrics_middleware))
        .layer(CatchPanicLayer::custom(handlers::panic_response))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
}

pub fn build_ops_router() -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    ops_port: u16,
    listener: TcpListener,
    ops_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Bind both listeners. Port 0 picks a random port (used by tests).
    pub async fn build(config: ColoringConfig) -> Result<Self, AppError> {
        config.validate()?;

        let invoker = Invoker::new(&config.invoker);
        tracing::info!(
            script = %invoker.script_path().display(),
            shell = %config.invoker.shell,
            credential_var = %invoker.credential_var(),
            timeout_secs = invoker.timeout().as_secs(),
            "Initialized coloring script invoker"
        );

        let state = AppState::new(invoker, CancellationToken::new());

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        let ops_addr = SocketAddr::from(([0, 0, 0, 0], config.ops_port));
        let ops_listener = TcpListener::bind(ops_addr).await.map_err(|e| {
            tracing::error!("Failed to bind ops listener to {}: {}", ops_addr, e);
            AppError::from(e)
        })?;
        let ops_port = ops_listener.local_addr()?.port();

        tracing::info!(port, ops_port, "Listening on all network interfaces");

        Ok(Self {
            port,
            ops_port,
            listener,
            ops_listener,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn ops_port(&self) -> u16 {
        self.ops_port
    }

    pub fn invoker(&self) -> &Invoker {
        &self.state.invoker
    }

    /// Cancelling this token stops both servers and terminates running scripts.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let shutdown = self.state.shutdown.clone();

        let app = axum::serve(self.listener, build_router(self.state))
            .with_graceful_shutdown(shutdown.clone().cancelled_owned());
        let ops = axum::serve(self.ops_listener, build_ops_router())
            .with_graceful_shutdown(shutdown.cancelled_owned());

        tokio::try_join!(app.into_future(), ops.into_future())?;

        tracing::info!("Service shutdown complete");
        Ok(())
    }
}

/// Log where the service can be reached and what it needs to work.
pub async fn log_access_banner(port: u16, invoker: &Invoker) {
    let lan_ip = local_ip()
        .await
        .unwrap_or_else(|| "Unable to determine".to_string());
    let bonjour = bonjour_name();

    tracing::info!(
        local = %format!("http://localhost:{}", port),
        lan = %format!("http://{}:{}", lan_ip, port),
        bonjour = %format!("http://{}:{}", bonjour, port),
        "Starting coloring page HTTP server"
    );
    tracing::info!(
        examples = ?[
            format!("http://{}:{}?idea=dinosaur", bonjour, port),
            format!("http://{}:{}?idea=princess%20castle", bonjour, port),
            format!("http://{}:{}?idea=fire%20truck", bonjour, port),
        ],
        "Example requests"
    );
    tracing::info!(
        credential_var = %invoker.credential_var(),
        script = %invoker.script_path().display(),
        "Make sure the credential variable is set, the script exists, the printer is ready and the firewall allows port {}",
        port
    );
}

/// Address of the interface that routes to the internet. Nothing is sent.
async fn local_ip() -> Option<String> {
    let socket = tokio::net::UdpSocket::bind("0.0.0.0:0").await.ok()?;
    socket.connect("8.8.8.8:80").await.ok()?;
    socket.local_addr().ok().map(|addr| addr.ip().to_string())
}

fn bonjour_name() -> String {
    let host = hostname().unwrap_or_else(|| "localhost".to_string());
    if host.ends_with(".local") {
        host
    } else {
        format!("{}.local", host)
    }
}

#[cfg(unix)]
fn hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let name = String::from_utf8_lossy(&buf[..len]).into_owned();
    (!name.is_empty()).then_some(name)
}

#[cfg(not(unix))]
fn hostname() -> Option<String> {
    std::env::var("COMPUTERNAME").ok()
}
