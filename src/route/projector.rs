use std::collections::HashMap;

use tracing::debug;

use crate::route::index::PolylineIndex;
use crate::route::proximity::arc_length;
use crate::route::types::{Coordinate, ResolvedMarker, RouteRecording, TracePoint};

#[derive(Debug)]
pub struct RouteProjector {
    route_name: String,
    points: Vec<TracePoint>,
    index: PolylineIndex,
    marker_indices: HashMap<String, usize>,
    marker_count: usize,
}

impl RouteProjector {
    pub fn new(recording: &RouteRecording) -> Self {
        let points = recording.coordinates.clone();
        let index = PolylineIndex::build(&points);

        let mut marker_indices = HashMap::new();
        for marker in recording.markers.iter().map(ResolvedMarker::from) {
            let Some(position) = marker.position else {
                debug!(marker = %marker.name, "Marker has no resolved position");
                continue;
            };
            if let Some(idx) = index.nearest(&position) {
                marker_indices.entry(marker.name).or_insert(idx);
            }
        }

        Self {
            route_name: recording.route_name.clone(),
            points,
            index,
            marker_indices,
            marker_count: recording.markers.len(),
        }
    }

    pub fn route_name(&self) -> &str {
        &self.route_name
    }

    pub fn total_points(&self) -> usize {
        self.points.len()
    }

    pub fn total_markers(&self) -> usize {
        self.marker_count
    }

    pub fn nearest_index(&self, position: &Coordinate) -> Option<usize> {
        self.index.nearest(position)
    }

    pub fn marker_index(&self, name: &str) -> Option<usize> {
        self.marker_indices.get(name).copied()
    }

    /// `Some(0.0)` once the marker is at or behind `live`.
    pub fn distance_to_marker(&self, live: &Coordinate, target: &str) -> Option<f64> {
        let marker_idx = self.marker_index(target)?;
        let live_idx = self.nearest_index(live)?;
        Some(distance_between(&self.points, live_idx, marker_idx))
    }
}

fn distance_between(points: &[TracePoint], live_idx: usize, marker_idx: usize) -> f64 {
    if marker_idx <= live_idx {
        return 0.0;
    }
    arc_length(points, live_idx, marker_idx)
}
