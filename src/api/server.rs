use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::route::{load_recording, RouteFileError, RouteRecording};
use crate::session::{HudSummary, Session};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<RwLock<Session>>,
    pub summary: watch::Receiver<Option<HudSummary>>,
    pub routes_dir: Arc<PathBuf>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/summary", get(get_summary))
        .route("/api/stream", get(stream_summaries))
        .route("/api/routes", get(list_routes))
        .route("/api/route", post(load_route))
        .route("/api/timetable", get(get_timetable))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(Any)
                .allow_origin(Any),
        )
        .with_state(state)
}

pub async fn run_server(state: AppState, port: u16) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    info!(%addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(state)).await
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn get_summary(State(state): State<AppState>) -> Response {
    let latest = state.summary.borrow().clone();
    match latest {
        Some(summary) => Json(summary).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "Summary not yet available").into_response(),
    }
}

/// Every published summary, starting with the current one. Ends when the
/// fetcher drops its sender.
fn summary_stream(
    mut rx: watch::Receiver<Option<HudSummary>>,
) -> impl Stream<Item = HudSummary> + Send {
    rx.mark_changed();
    futures::stream::unfold(rx, |mut rx| async move {
        loop {
            rx.changed().await.ok()?;
            let latest = rx.borrow_and_update().clone();
            if let Some(summary) = latest {
                return Some((summary, rx));
            }
        }
    })
}

async fn stream_summaries(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = summary_stream(state.summary.clone()).map(|summary| {
        let event = Event::default().event("summary");
        Ok(match event.json_data(&summary) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Failed to encode summary");
                Event::default().event("summary").data("{}")
            }
        })
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteEntry {
    pub name: String,
    pub path: PathBuf,
}

fn scan_routes(dir: &Path) -> std::io::Result<Vec<RouteEntry>> {
    let mut routes = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        routes.push(RouteEntry { name, path });
    }
    routes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(routes)
}

async fn list_routes(State(state): State<AppState>) -> Response {
    let dir = state.routes_dir.clone();
    let result = tokio::task::spawn_blocking(move || {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        scan_routes(&dir)
    })
    .await;

    match result {
        Ok(Ok(routes)) => Json(routes).into_response(),
        Ok(Err(e)) => {
            error!(error = %e, dir = %state.routes_dir.display(), "Failed to list routes");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to list routes").into_response()
        }
        Err(e) => {
            error!(error = %e, "Route listing task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoadRouteRequest {
    pub path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteLoaded {
    pub route_name: String,
    pub total_points: usize,
    pub total_markers: usize,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Relative paths are taken from the routes directory.
async fn load_route(
    State(state): State<AppState>,
    Json(request): Json<LoadRouteRequest>,
) -> Response {
    let path = state.routes_dir.join(&request.path);

    let result: Result<RouteRecording, RouteFileError> = {
        let path = path.clone();
        match tokio::task::spawn_blocking(move || load_recording(&path)).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Route loading task failed");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    };

    match result {
        Ok(recording) => {
            state.session.write().await.set_route(&recording);
            Json(RouteLoaded {
                route_name: recording.route_name.clone(),
                total_points: recording.coordinates.len(),
                total_markers: recording.markers.len(),
            })
            .into_response()
        }
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Rejected route");
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn get_timetable(State(state): State<AppState>) -> Response {
    let timetable = state.session.read().await.timetable().clone();
    Json(timetable).into_response()
}
