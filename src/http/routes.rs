use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::header::{HeaderName, AUTHORIZATION};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use crate::engine::core::{SessionController, SessionEvent, TrainingSnapshot};
use crate::library::{GenreInfo, TrackLibrary};
use crate::managers::BroadcastChannelManager;
use crate::scoring::ScoreCard;
use crate::session::LiveReadouts;
use crate::telemetry::{self, TelemetrySnapshot};

use super::sse;

/// Shared application state for HTTP handlers.
///
/// Handlers never touch the controller itself; they read the library, the
/// broadcast channels and a cached copy of the latest snapshot.
#[derive(Clone)]
pub struct DebugHttpState {
    library: Arc<TrackLibrary>,
    pub(super) broadcasts: BroadcastChannelManager,
    latest: Arc<RwLock<TrainingSnapshot>>,
    last_event: Arc<RwLock<Option<SessionEvent>>>,
    started: Instant,
    token: Arc<String>,
}

impl DebugHttpState {
    pub fn new(controller: &SessionController, token: String) -> Self {
        Self {
            library: Arc::clone(controller.library()),
            broadcasts: controller.broadcasts(),
            latest: Arc::new(RwLock::new(controller.snapshot())),
            last_event: Arc::new(RwLock::new(None)),
            started: Instant::now(),
            token: Arc::new(token),
        }
    }

    fn authorize(
        &self,
        headers: &HeaderMap,
        query_token: Option<&str>,
    ) -> Result<(), HttpServerError> {
        let provided = extract_token(headers, query_token);
        match provided {
            Some(value) if value == *self.token => Ok(()),
            _ => Err(HttpServerError::Unauthorized),
        }
    }

    fn latest(&self) -> TrainingSnapshot {
        read_recovering(&self.latest)
    }

    fn last_event(&self) -> Option<SessionEvent> {
        read_recovering(&self.last_event)
    }

    /// Keep the cached snapshot and last event current until the channels close
    pub fn track_updates(&self) -> tokio::task::JoinHandle<()> {
        let state = self.clone();
        let mut snapshots = self.broadcasts.subscribe_snapshots();
        let mut events = self.broadcasts.subscribe_events();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = snapshots.recv() => match received {
                        Ok(snapshot) => write_recovering(&state.latest, snapshot),
                        Err(RecvError::Lagged(skipped)) => {
                            log::debug!("[DebugHttp] Snapshot cache lagged by {}", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    },
                    received = events.recv() => match received {
                        Ok(event) => write_recovering(&state.last_event, Some(event)),
                        Err(RecvError::Lagged(_)) => {}
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        })
    }
}

fn read_recovering<T: Clone>(lock: &RwLock<T>) -> T {
    match lock.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn write_recovering<T>(lock: &RwLock<T>, value: T) {
    match lock.write() {
        Ok(mut guard) => *guard = value,
        Err(poisoned) => *poisoned.into_inner() = value,
    }
}

/// Query payload for extracting token from URL.
#[derive(Debug, Default, Deserialize)]
pub struct AuthQuery {
    pub token: Option<String>,
}

/// HTTP error variants mapped to JSON responses.
#[derive(Debug)]
pub enum HttpServerError {
    Unauthorized,
}

impl IntoResponse for HttpServerError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "missing or invalid token"),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Health endpoint response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub is_training: bool,
    pub uptime_ms: u64,
    pub snapshot_subscribers: usize,
}

/// Metrics endpoint response payload.
#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub scores: ScoreCard,
    pub readouts: LiveReadouts,
    pub latest_event: Option<SessionEvent>,
    pub diagnostics: TelemetrySnapshot,
}

/// Build the Axum router with all handlers.
pub fn build_router(state: DebugHttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tracks", get(tracks))
        .route("/session", get(session))
        .route("/session-stream", get(session_stream_handler))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Run the HTTP server loop.
pub async fn run_http_server(state: DebugHttpState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("binding debug HTTP listener")?;
    let cache = state.track_updates();
    let router = build_router(state);
    let served = axum::serve(listener, router)
        .await
        .context("serving debug HTTP router");
    cache.abort();
    served
}

pub async fn health(
    State(state): State<DebugHttpState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<Json<HealthResponse>, HttpServerError> {
    state.authorize(&headers, query.token.as_deref())?;

    Ok(Json(HealthResponse {
        status: "ok",
        is_training: state.latest().is_training,
        uptime_ms: state.started.elapsed().as_millis() as u64,
        snapshot_subscribers: state.broadcasts.snapshot_subscribers(),
    }))
}

pub async fn tracks(
    State(state): State<DebugHttpState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<GenreInfo>>, HttpServerError> {
    state.authorize(&headers, query.token.as_deref())?;
    Ok(Json(state.library.genres().map(|genre| genre.info()).collect()))
}

pub async fn session(
    State(state): State<DebugHttpState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<Json<TrainingSnapshot>, HttpServerError> {
    state.authorize(&headers, query.token.as_deref())?;
    Ok(Json(state.latest()))
}

pub async fn metrics(
    State(state): State<DebugHttpState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<Json<MetricsResponse>, HttpServerError> {
    state.authorize(&headers, query.token.as_deref())?;

    let snapshot = state.latest();

    Ok(Json(MetricsResponse {
        scores: snapshot.scores,
        readouts: snapshot.readouts,
        latest_event: state.last_event(),
        diagnostics: telemetry::hub().snapshot(),
    }))
}

pub async fn session_stream_handler(
    State(state): State<DebugHttpState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<sse::SnapshotStream, HttpServerError> {
    state.authorize(&headers, query.token.as_deref())?;
    Ok(sse::snapshots(&state.broadcasts))
}

fn extract_token(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    if let Some(token) = query_token {
        return Some(token.to_string());
    }

    static X_DEBUG_TOKEN: HeaderName = HeaderName::from_static("x-debug-token");

    headers
        .get(&X_DEBUG_TOKEN)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|raw| raw.strip_prefix("Bearer ").map(|v| v.to_string()))
        })
}

#[cfg(all(test, feature = "debug_http"))]
mod tests {
    use super::*;
    use crate::audio::SilentPlayback;
    use crate::config::AppConfig;
    use crate::engine::backend::{SyntheticBackend, SystemTimeSource};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    const TOKEN: &str = "smoke-token";

    fn make_controller() -> SessionController {
        let mut config = AppConfig::default();
        config.audio.background_pump = false;
        SessionController::new(
            config,
            Arc::new(TrackLibrary::builtin().expect("builtin library")),
            Arc::new(SyntheticBackend::new(16_000)),
            Box::new(SilentPlayback::new()),
            Arc::new(SystemTimeSource::default()),
        )
        .expect("controller")
    }

    fn make_router(controller: &SessionController) -> Router {
        build_router(DebugHttpState::new(controller, TOKEN.to_string()))
    }

    async fn get_json(router: Router, uri: String) -> (StatusCode, Value) {
        let response = router
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router call");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body bytes");
        let json = serde_json::from_slice::<Value>(&bytes).expect("JSON body");
        (status, json)
    }

    #[tokio::test]
    async fn health_requires_token() {
        let controller = make_controller();
        let (status, json) = get_json(make_router(&controller), "/health".to_string()).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "missing or invalid token");
    }

    #[tokio::test]
    async fn health_accepts_bearer_token() {
        let controller = make_controller();
        let response = make_router(&controller)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(AUTHORIZATION, format!("Bearer {TOKEN}"))
                    .body(Body::empty())
                    .expect("health request"),
            )
            .await
            .expect("health call");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn tracks_lists_every_genre() {
        let controller = make_controller();
        let (status, json) =
            get_json(make_router(&controller), format!("/tracks?token={TOKEN}")).await;

        assert_eq!(status, StatusCode::OK);
        let genres = json.as_array().expect("genre list");
        assert_eq!(genres.len(), controller.library().genres().count());
        assert!(genres.iter().any(|genre| genre["id"] == "baiju"));
    }

    #[tokio::test]
    async fn session_reports_idle_snapshot() {
        let controller = make_controller();
        let (status, json) =
            get_json(make_router(&controller), format!("/session?token={TOKEN}")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["phase"], "Idle");
        assert_eq!(json["is_training"], false);
        assert_eq!(json["elapsed_text"], "00:00");
    }

    #[tokio::test]
    async fn cache_follows_published_snapshots_and_events() {
        let mut controller = make_controller();
        let state = DebugHttpState::new(&controller, TOKEN.to_string());
        let cache = state.track_updates();
        tokio::task::yield_now().await;

        controller.start().expect("start");
        for _ in 0..50 {
            if state.latest().is_training && state.last_event().is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        assert!(state.latest().is_training);
        assert!(matches!(
            state.last_event().map(|event| event.kind),
            Some(crate::engine::SessionEventKind::Started)
        ));
        controller.stop();
        cache.abort();
    }

    #[tokio::test]
    async fn metrics_succeeds_with_token() {
        let controller = make_controller();
        let (status, json) =
            get_json(make_router(&controller), format!("/metrics?token={TOKEN}")).await;

        assert_eq!(status, StatusCode::OK);
        assert!(json["scores"].is_object());
        assert!(json["diagnostics"].is_object());
    }
}
