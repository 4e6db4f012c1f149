//! Axum HTTP server for the medquery API

use axum::{
    extract::{ConnectInfo, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::ai::build_client;
use crate::ai::openai::ImageGenerator;
use crate::answer::{Answer, AnswerService};
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::limit::RouteLimit;
use crate::web::error::ApiError;

/// Prompt used when the image endpoint gets no query
const DEFAULT_IMAGE_QUERY: &str = "medical diagram";

/// Shortest interval between idle-window sweeps
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

// =============================================================================
// STATE
// =============================================================================

#[derive(Clone)]
pub struct AppState {
    pub answers: Arc<AnswerService>,
    pub images: Arc<ImageGenerator>,
    pub answer_limit: Arc<RouteLimit>,
    pub image_limit: Arc<RouteLimit>,
    pub trust_forwarded_for: bool,
}

impl AppState {
    pub fn from_config(config: &Config, client: reqwest::Client) -> Self {
        Self {
            answers: Arc::new(AnswerService::from_config(config, client.clone())),
            images: Arc::new(ImageGenerator::new(client, config.providers.openai.clone())),
            answer_limit: Arc::new(RouteLimit::new(config.limits.instant_answer)),
            image_limit: Arc::new(RouteLimit::new(config.limits.generate_image)),
            trust_forwarded_for: config.server.trust_forwarded_for,
        }
    }

    fn client_id(&self, headers: &HeaderMap, peer: SocketAddr) -> String {
        client_id(headers, peer, self.trust_forwarded_for)
    }

    /// Drop idle rate-limit windows on both limited routes
    fn sweep_limits(&self) -> usize {
        self.answer_limit.sweep() + self.image_limit.sweep()
    }
}

/// Rate-limit key for a request: the peer IP, or the first forwarded hop
/// when the server sits behind a trusted proxy
pub fn client_id(headers: &HeaderMap, peer: SocketAddr, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }
    peer.ip().to_string()
}

fn enforce(limit: &RouteLimit, client: &str) -> std::result::Result<(), ApiError> {
    limit.check(client).map_err(|wait| {
        warn!("Rate limit exceeded for {}", client);
        ApiError::RateLimited {
            retry_after_secs: retry_after_secs(wait),
        }
    })
}

/// Whole seconds to advertise in `Retry-After`, rounded up and never 0
fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

/// Unix time in fractional seconds
fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

// =============================================================================
// API TYPES
// =============================================================================

#[derive(Serialize)]
pub struct HomeResponse {
    pub message: String,
    pub status: String,
    pub timestamp: f64,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: f64,
    pub version: String,
}

#[derive(Deserialize)]
pub struct HelloQuery {
    pub name: Option<String>,
}

#[derive(Serialize)]
pub struct HelloResponse {
    pub message: String,
    pub note: String,
}

#[derive(Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub reply: String,
}

#[derive(Deserialize)]
pub struct QuestionQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Serialize)]
pub struct InstantAnswerResponse {
    pub answer: String,
    /// Absent when the question was rejected before dispatch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub timestamp: f64,
}

#[derive(Serialize)]
pub struct ImageResponse {
    pub image_url: String,
}

// =============================================================================
// HANDLERS
// =============================================================================

/// GET / - Liveness banner
async fn home() -> Json<HomeResponse> {
    Json(HomeResponse {
        message: "Medical AI service is running".to_string(),
        status: "healthy".to_string(),
        timestamp: unix_timestamp(),
    })
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: unix_timestamp(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/hello?name=
async fn hello(Query(query): Query<HelloQuery>) -> Json<HelloResponse> {
    let name = query
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "Guest".to_string());

    Json(HelloResponse {
        message: format!("Hello, {}!", name),
        note: "This is a test API endpoint".to_string(),
    })
}

/// POST /api/chat - Templated acknowledgement of a free-text message
async fn chat(Json(body): Json<ChatRequest>) -> Json<ChatResponse> {
    let message = body.message.trim();
    let reply = if message.is_empty() {
        "Please type a message.".to_string()
    } else {
        format!(
            "You asked: \"{}\". Use the instant answer search for a sourced response.",
            message
        )
    };
    Json(ChatResponse { reply })
}

/// GET /api/instant_answer?q=
async fn instant_answer(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<QuestionQuery>,
) -> std::result::Result<Json<InstantAnswerResponse>, ApiError> {
    let client = state.client_id(&headers, peer);
    enforce(&state.answer_limit, &client)?;

    let response = match state.answers.answer(&query.q).await {
        Answer::Guidance(message) => InstantAnswerResponse {
            answer: message,
            source: None,
            timestamp: unix_timestamp(),
        },
        Answer::Aggregated(result) => InstantAnswerResponse {
            answer: result.answer,
            source: Some(result.source),
            timestamp: unix_timestamp(),
        },
    };
    Ok(Json(response))
}

/// GET /api/generate_image?q= - Empty URL on any failure
async fn generate_image(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<QuestionQuery>,
) -> std::result::Result<Json<ImageResponse>, ApiError> {
    let client = state.client_id(&headers, peer);
    enforce(&state.image_limit, &client)?;

    let prompt = match query.q.trim() {
        "" => DEFAULT_IMAGE_QUERY,
        q => q,
    };
    let image_url = match state.images.generate(prompt).await {
        Ok(url) => url,
        Err(e) => {
            warn!("Image generation failed: {}", e);
            String::new()
        }
    };
    Ok(Json(ImageResponse { image_url }))
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

// =============================================================================
// MIDDLEWARE
// =============================================================================

fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
}

/// Allow browser front-ends on any origin; answer pre-flight directly
async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };
    apply_cors(response.headers_mut());
    response
}

/// Turn a handler panic into a 500 JSON body instead of a dropped connection
async fn catch_panic(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(_) => {
            error!("Handler panicked while serving {}", path);
            ApiError::Internal.into_response()
        }
    }
}

/// Apply the middleware stack shared by every route
pub fn with_middleware(router: Router) -> Router {
    router
        .fallback(not_found)
        .layer(middleware::from_fn(catch_panic))
        .layer(middleware::from_fn(cors))
}

// =============================================================================
// SERVER
// =============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/hello", get(hello))
        .route("/chat", post(chat))
        .route("/instant_answer", get(instant_answer))
        .route("/generate_image", get(generate_image))
        .with_state(state);

    let app = Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .nest("/api", api_routes);

    with_middleware(app)
}

/// Periodically forget clients whose rate-limit windows are empty
fn spawn_sweeper(state: AppState, every: Duration) -> JoinHandle<()> {
    let every = every.max(MIN_SWEEP_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = state.sweep_limits();
            if removed > 0 {
                debug!("Swept {} idle rate-limit windows", removed);
            }
        }
    })
}

async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr).await.map_err(|e| Error::ServerError {
        message: format!("Failed to bind {}: {}", addr, e),
    })
}

/// A server running in a background task (used by tests and embedders)
pub struct Server {
    addr: SocketAddr,
    handle: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl Server {
    /// Bind `addr` (port 0 picks a free port) and serve `state` in the background
    pub async fn start(addr: &str, state: AppState, sweep_every: Duration) -> Result<Self> {
        let listener = bind(addr).await?;
        let addr = listener.local_addr()?;
        let sweeper = spawn_sweeper(state.clone(), sweep_every);
        let app = router(state);

        let handle = tokio::spawn(async move {
            let service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, service).await {
                error!("Server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            handle,
            sweeper,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown(&self) {
        self.handle.abort();
        self.sweeper.abort();
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Run the server in the foreground until Ctrl+C
pub async fn run(config: Config) -> Result<()> {
    let client = build_client()?;
    let state = AppState::from_config(&config, client);
    let listener = bind(&config.bind_addr()).await?;
    let addr = listener.local_addr()?;

    let sweeper = spawn_sweeper(
        state.clone(),
        Duration::from_secs(config.limits.sweep_interval_secs),
    );

    info!(
        chat = config.providers.openai.api_key().is_some(),
        research = config.providers.perplexity.api_key().is_some(),
        search = config.providers.google.credentials().is_some(),
        "Providers configured"
    );
    info!("medquery listening on http://{}", addr);

    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    sweeper.abort();
    served?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
