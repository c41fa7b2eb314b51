use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};

use crate::api::{self, AppState};
use crate::route::store::{save_recording, spawn_writer};
use crate::route::{load_recording, RouteRecorder, RouteRecording};
use crate::session::Session;
use crate::telemetry::client::{DEFAULT_SUBSCRIPTION_ID, KEY_POLL_INTERVAL};
use crate::telemetry::{self, wait_for_key, FetcherConfig, HttpTelemetryClient};

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to run the HTTP server on
    #[arg(short, long, env = "SERVER_PORT", default_value = "8080")]
    pub port: u16,

    /// Base URL of the simulator's external interface
    #[arg(long, env = "TELEMETRY_API_URL", default_value = "http://localhost:31270")]
    pub api_url: String,

    /// File holding the interface key
    #[arg(long, env = "TELEMETRY_KEY_FILE", default_value = "CommAPIKey.txt")]
    pub key_file: PathBuf,

    /// Where recordings are written and listed from
    #[arg(long, env = "ROUTES_DIR", default_value = "routes")]
    pub routes_dir: PathBuf,

    /// Record to <routes-dir>/<NAME>.json, continuing the file if it exists
    #[arg(long, value_name = "NAME")]
    pub record: Option<String>,

    /// Timetable skeleton to start a new recording from
    #[arg(long, value_name = "FILE", requires = "record")]
    pub skeleton: Option<PathBuf>,

    /// Resolved route to project the live position onto
    #[arg(long, value_name = "FILE")]
    pub route: Option<PathBuf>,

    /// Dashboard refresh interval in milliseconds
    #[arg(long, default_value = "500")]
    pub poll_ms: u64,

    /// Position sampling interval while recording, in milliseconds
    #[arg(long, default_value = "125")]
    pub sample_ms: u64,
}

fn recording_path(routes_dir: &Path, name: &str) -> PathBuf {
    routes_dir.join(format!("{name}.json"))
}

/// Pick the starting point for a recording: the existing file, a skeleton, or
/// nothing at all.
fn initial_recording(path: &Path, name: &str, skeleton: Option<&Path>) -> Result<RouteRecording> {
    if path.exists() {
        if skeleton.is_some() {
            warn!(path = %path.display(), "Recording exists, ignoring skeleton");
        }
        let recording = load_recording(path)
            .with_context(|| format!("Cannot resume recording {}", path.display()))?;
        info!(
            path = %path.display(),
            points = recording.coordinates.len(),
            markers = recording.markers.len(),
            "Resuming recording"
        );
        return Ok(recording);
    }

    match skeleton {
        Some(skeleton) => {
            let mut recording = load_recording(skeleton)
                .with_context(|| format!("Cannot load skeleton {}", skeleton.display()))?;
            recording.route_name = name.to_string();
            Ok(recording)
        }
        None => Ok(RouteRecording::new(name)),
    }
}

pub async fn run(args: ServeArgs) -> Result<ExitCode> {
    let mut session = Session::new();

    if let Some(route) = &args.route {
        let recording = load_recording(route)
            .with_context(|| format!("Cannot load route {}", route.display()))?;
        session.set_route(&recording);
    }

    let mut writer_handle = None;
    if let Some(name) = &args.record {
        let path = recording_path(&args.routes_dir, name);
        let recording = initial_recording(&path, name, args.skeleton.as_deref())?;
        save_recording(&path, &recording)
            .with_context(|| format!("Cannot write recording {}", path.display()))?;
        let (sink, handle) = spawn_writer(path);
        session.start_recording(RouteRecorder::new(recording, Box::new(sink)));
        writer_handle = Some(handle);
    }

    info!(key_file = %args.key_file.display(), "Waiting for telemetry key");
    let key = wait_for_key(&args.key_file, KEY_POLL_INTERVAL).await;

    let client = HttpTelemetryClient::new(&args.api_url, key, DEFAULT_SUBSCRIPTION_ID)
        .context("Failed to build telemetry client")?;
    client.register().await;

    let session = Arc::new(RwLock::new(session));
    let (summary_tx, summary_rx) = watch::channel(None);

    let config = FetcherConfig {
        poll_interval: Duration::from_millis(args.poll_ms.max(1)),
        sample_interval: Duration::from_millis(args.sample_ms.max(1)),
    };
    let fetcher_session = session.clone();
    let mut fetcher_handle = tokio::spawn(async move {
        telemetry::run_fetcher(client, fetcher_session, summary_tx, config).await;
    });

    let state = AppState {
        session: session.clone(),
        summary: summary_rx,
        routes_dir: Arc::new(args.routes_dir.clone()),
    };
    let port = args.port;
    let mut api_handle = tokio::spawn(async move { api::run_server(state, port).await });

    let mut code = ExitCode::SUCCESS;
    tokio::select! {
        _ = &mut fetcher_handle => {
            error!("Fetcher task exited");
            code = ExitCode::FAILURE;
        }
        result = &mut api_handle => {
            match result {
                Ok(Ok(())) => error!("API server exited"),
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task panicked"),
            }
            code = ExitCode::FAILURE;
        }
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    fetcher_handle.abort();
    api_handle.abort();

    // Dropping the recorder closes the writer channel; wait for the last snapshot.
    drop(session.write().await.stop_recording());
    if let Some(handle) = writer_handle {
        if let Err(e) = handle.await {
            warn!(error = %e, "Recording writer did not finish cleanly");
        }
    }

    Ok(code)
}
