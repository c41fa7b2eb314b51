use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::route::proximity::{nearest_index, walk_forward};
use crate::route::store::{load_recording, to_json_bytes, write_atomic, RouteFileError};
use crate::route::types::{
    Anchor, Coordinate, MarkerDetection, MarkerRecord, ResolvedMarker, RouteRecording, TracePoint,
};

pub const RESOLVED_SUFFIX: &str = ".resolved.json";
pub const RESOLVED_DIR: &str = "resolved";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMethod {
    OnSpot,
    Detection,
    Error,
}

impl fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionMethod::OnSpot => write!(f, "on-spot"),
            ResolutionMethod::Detection => write!(f, "detection"),
            ResolutionMethod::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
    pub on_spot: usize,
    pub detection: usize,
    pub failed: Vec<String>,
    pub already_resolved: usize,
}

impl ResolveReport {
    fn record(&mut self, name: &str, method: ResolutionMethod) {
        match method {
            ResolutionMethod::OnSpot => self.on_spot += 1,
            ResolutionMethod::Detection => self.detection += 1,
            ResolutionMethod::Error => self.failed.push(name.to_string()),
        }
    }
}

fn resolve_anchor(points: &[TracePoint], anchor: &Anchor) -> Option<Coordinate> {
    let start = nearest_index(points, &anchor.position)?;
    walk_forward(points, start, anchor.distance)
}

/// Resolve one marker against the polyline: on-spot first, then detection.
pub fn resolve_marker(
    points: &[TracePoint],
    detection: &MarkerDetection,
) -> (ResolvedMarker, ResolutionMethod) {
    let attempts = [
        (detection.on_spot.as_ref(), ResolutionMethod::OnSpot),
        (detection.detection.as_ref(), ResolutionMethod::Detection),
    ];

    let (position, method) = attempts
        .into_iter()
        .find_map(|(anchor, method)| {
            anchor
                .and_then(|a| resolve_anchor(points, a))
                .map(|position| (Some(position), method))
        })
        .unwrap_or((None, ResolutionMethod::Error));

    let resolved = ResolvedMarker {
        name: detection.name.clone(),
        kind: detection.kind,
        position,
        platform_length: detection.platform_length,
    };
    (resolved, method)
}

pub fn resolve_recording(recording: &RouteRecording) -> (RouteRecording, ResolveReport) {
    let mut report = ResolveReport::default();
    let points = &recording.coordinates;

    let markers = recording
        .markers
        .iter()
        .map(|record| {
            if !record.has_detection_fields() {
                report.already_resolved += 1;
                return record.clone();
            }

            let (resolved, method) = resolve_marker(points, &MarkerDetection::from(record));
            debug!(marker = %resolved.name, %method, "Marker resolved");
            report.record(&resolved.name, method);
            MarkerRecord::from(resolved)
        })
        .collect();

    let resolved = RouteRecording {
        route_name: recording.route_name.clone(),
        duration: recording.duration,
        request_count: recording.request_count,
        coordinates: recording.coordinates.clone(),
        markers,
        timetable: recording.timetable.clone(),
    };
    (resolved, report)
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    File(#[from] RouteFileError),

    #[error("Failed to read directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Processed(ResolveReport),
    Skipped,
}

/// Default output path for a single input: `<stem>.resolved.json` beside it.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}{RESOLVED_SUFFIX}"))
}

pub fn resolve_file(input: &Path, output: &Path, force: bool) -> Result<FileOutcome, ResolveError> {
    if output.exists() && !force {
        info!(output = %output.display(), "Output exists, skipping (use --force to reprocess)");
        return Ok(FileOutcome::Skipped);
    }

    let recording = load_recording(input)?;
    if recording.is_resolved() {
        debug!(input = %input.display(), "Recording is already resolved");
    }
    let (resolved, report) = resolve_recording(&recording);
    write_atomic(output, &to_json_bytes(&resolved)?)?;

    info!(
        input = %input.display(),
        output = %output.display(),
        on_spot = report.on_spot,
        detection = report.detection,
        failed = report.failed.len(),
        already_resolved = report.already_resolved,
        "Route resolved"
    );
    for name in &report.failed {
        warn!(marker = %name, "No usable detection data for marker");
    }

    Ok(FileOutcome::Processed(report))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub errored: usize,
}

fn is_recording_file(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    path.is_file() && name.ends_with(".json") && !name.ends_with(RESOLVED_SUFFIX)
}

pub fn resolve_directory(
    dir: &Path,
    out_dir: &Path,
    force: bool,
) -> Result<BatchSummary, ResolveError> {
    let entries = fs::read_dir(dir).map_err(|source| ResolveError::Directory {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut inputs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_recording_file(path))
        .collect();
    inputs.sort();

    let mut summary = BatchSummary::default();
    for input in inputs {
        let Some(file_name) = input.file_name() else {
            continue;
        };
        let output = out_dir.join(file_name);

        match resolve_file(&input, &output, force) {
            Ok(FileOutcome::Processed(_)) => summary.processed += 1,
            Ok(FileOutcome::Skipped) => summary.skipped += 1,
            Err(e) => {
                warn!(input = %input.display(), error = %e, "Failed to resolve route");
                summary.errored += 1;
            }
        }
    }

    Ok(summary)
}
