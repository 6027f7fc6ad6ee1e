//! HTTP gateway for driving and observing sessions.
//!
//! Thin transport over the session engine: start a session, long-poll
//! the event bus, read the live snapshot, fetch final results and the
//! stored engagement history. All session semantics live in the
//! engine; handlers translate to and from JSON.

use crate::bus::{Subscription, NEXT_EVENT_TIMEOUT};
use crate::config::SessionConfig;
use crate::context::SessionContext;
use crate::events::{Event, SessionResult, TickSnapshot};
use crate::session::{start_session, StartStatus};
use crate::store::EngagementRecord;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub host: String,
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Pupil sensor address handed to each session
    pub device_address: String,
}

/// Shared server state
pub struct ServerState {
    ctx: Arc<SessionContext>,
    device_address: String,
    /// Long-poll subscription, created with the server and kept so
    /// queued events survive between polls and nothing published after
    /// startup is missed. One shared queue serves the single
    /// sequential UI poll loop; concurrent `/next-event` callers each
    /// run on their own task but take turns on this queue.
    poll: tokio::sync::Mutex<Option<Subscription>>,
}

impl ServerState {
    pub fn new(ctx: Arc<SessionContext>, device_address: String) -> Self {
        let subscription = ctx.bus.subscribe();
        Self {
            ctx,
            device_address,
            poll: tokio::sync::Mutex::new(Some(subscription)),
        }
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Response from the start endpoint
#[derive(Serialize)]
pub struct StartResponse {
    pub status: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Live status: the latest tick snapshot plus the running flag.
#[derive(Serialize)]
pub struct StatusResponse {
    pub running: bool,
    #[serde(flatten)]
    pub snapshot: TickSnapshot,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// History response: most recent records, oldest first.
#[derive(Serialize)]
pub struct HistoryResponse {
    pub count: usize,
    pub latest: Option<EngagementRecord>,
    pub records: Vec<EngagementRecord>,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /start
///
/// Body is an optional partial `SessionConfig`; omitted fields take
/// their defaults. Rejected with 400 before any state changes if the
/// body is not valid JSON or the timing invariants do not hold.
async fn start(
    State(state): State<Arc<ServerState>>,
    body: String,
) -> Result<Json<StartResponse>, (StatusCode, Json<ErrorResponse>)> {
    let config: SessionConfig = if body.trim().is_empty() {
        SessionConfig::default()
    } else {
        serde_json::from_str(&body).map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("bad json: {e}"),
                }),
            )
        })?
    };

    let status = start_session(
        Arc::clone(&state.ctx),
        config,
        state.device_address.clone(),
    )
    .map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
    })?;

    let status = match status {
        StartStatus::Started => "started",
        StartStatus::AlreadyRunning => "already running",
    };
    Ok(Json(StartResponse {
        status: status.to_string(),
    }))
}

/// GET /next-event
///
/// Long poll: blocks up to 120 s for the next event, off the async
/// runtime. If more events queued up since the last poll they are all
/// delivered at once as a `batch`.
async fn next_event(State(state): State<Arc<ServerState>>) -> Json<Event> {
    let mut slot = state.poll.lock().await;
    let subscription = match slot.take() {
        Some(subscription) => subscription,
        None => state.ctx.bus.subscribe(),
    };

    let ctx = Arc::clone(&state.ctx);
    let joined = tokio::task::spawn_blocking(move || {
        let first = ctx.bus.next(&subscription, NEXT_EVENT_TIMEOUT);
        let mut events = vec![first];
        while let Some(event) = ctx.bus.try_next(&subscription) {
            events.push(event);
        }
        (subscription, events)
    })
    .await;

    match joined {
        Ok((subscription, mut events)) => {
            *slot = Some(subscription);
            if events.len() == 1 {
                Json(events.remove(0))
            } else {
                Json(Event::Batch { events })
            }
        }
        Err(e) => {
            // The blocking task was cancelled or panicked; the
            // subscription is gone, the next poll starts fresh.
            tracing::error!("next-event poll task failed: {e}");
            Json(Event::Timeout)
        }
    }
}

/// GET /status
async fn status(State(state): State<Arc<ServerState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        running: state.ctx.is_running(),
        snapshot: state.ctx.snapshot(),
    })
}

/// GET /results
async fn results(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<SessionResult>, (StatusCode, Json<ErrorResponse>)> {
    match state.ctx.results() {
        Some(results) => Ok(Json(results)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "not ready".to_string(),
            }),
        )),
    }
}

/// GET /api/engagement/history
async fn engagement_history(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let limit = query.limit.unwrap_or(120).clamp(1, 1000);
    let records = state.ctx.store.history(limit);
    Json(HistoryResponse {
        count: records.len(),
        latest: records.last().cloned(),
        records,
    })
}

/// Build the router over shared state. Separate from [`run`] so tests
/// can mount it on an ephemeral port.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/start", post(start))
        .route("/next-event", get(next_event))
        .route("/status", get(status))
        .route("/results", get(results))
        .route("/api/engagement/history", get(engagement_history))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    ctx: Arc<SessionContext>,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(ServerState::new(ctx, config.device_address.clone()));
    let app = router(state);

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("session agent listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("server shutdown signal received");
            })
            .await
        {
            tracing::error!("server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
