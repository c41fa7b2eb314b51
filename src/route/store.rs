use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::route::types::RouteRecording;

#[derive(Debug, Error)]
pub enum RouteFileError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid route file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize recording: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Recording writer has stopped")]
    WriterClosed,
}

pub fn load_recording(path: &Path) -> Result<RouteRecording, RouteFileError> {
    let file = File::open(path).map_err(|source| RouteFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).map_err(|source| RouteFileError::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub fn to_json_bytes(recording: &RouteRecording) -> Result<Vec<u8>, RouteFileError> {
    Ok(serde_json::to_vec(recording)?)
}

pub fn save_recording(path: &Path, recording: &RouteRecording) -> Result<(), RouteFileError> {
    let bytes = to_json_bytes(recording)?;
    write_atomic(path, &bytes)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RouteFileError> {
    let io_err = |source| RouteFileError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let tmp = temp_path(path);
    fs::write(&tmp, bytes).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}

pub trait RecordingSink: Send + Sync {
    fn persist(&self, recording: &RouteRecording) -> Result<(), RouteFileError>;
}

/// The writer keeps only the newest pending snapshot.
#[derive(Debug, Clone)]
pub struct BackgroundSink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl RecordingSink for BackgroundSink {
    fn persist(&self, recording: &RouteRecording) -> Result<(), RouteFileError> {
        let bytes = to_json_bytes(recording)?;
        self.tx
            .send(bytes)
            .map_err(|_| RouteFileError::WriterClosed)
    }
}

pub fn spawn_writer(path: PathBuf) -> (BackgroundSink, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let handle = tokio::spawn(async move {
        while let Some(mut bytes) = rx.recv().await {
            while let Ok(newer) = rx.try_recv() {
                bytes = newer;
            }

            let target = path.clone();
            let len = bytes.len();
            let result = tokio::task::spawn_blocking(move || write_atomic(&target, &bytes)).await;

            match result {
                Ok(Ok(())) => debug!(path = %path.display(), bytes = len, "Recording saved"),
                Ok(Err(e)) => warn!(error = %e, "Failed to save recording"),
                Err(e) => warn!(error = %e, "Recording writer task panicked"),
            }
        }
        debug!(path = %path.display(), "Recording writer stopped");
    });

    (BackgroundSink { tx }, handle)
}
