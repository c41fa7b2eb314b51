use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::route::store::RecordingSink;
use crate::route::types::{Anchor, Coordinate, MarkerDetection, MarkerKind, RouteRecording, TracePoint};
use crate::timetable::Timetable;

/// Distance below which a re-sighted timetable marker updates its on-spot anchor.
pub const ON_SPOT_RADIUS_M: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerObservation {
    Created,
    OnSpotUpdated,
    Ignored,
}

pub struct RouteRecorder {
    recording: RouteRecording,
    seen_markers: HashSet<String>,
    last_height: Option<f64>,
    last_gradient: Option<f64>,
    started: Instant,
    base_duration_ms: u64,
    sink: Box<dyn RecordingSink>,
}

impl RouteRecorder {
    pub fn new(recording: RouteRecording, sink: Box<dyn RecordingSink>) -> Self {
        let seen_markers = recording
            .markers
            .iter()
            .map(|m| m.station_name.clone())
            .collect();
        let base_duration_ms = recording.duration;

        info!(
            route = %recording.route_name,
            points = recording.coordinates.len(),
            markers = recording.markers.len(),
            "Recording started"
        );

        Self {
            recording,
            seen_markers,
            last_height: None,
            last_gradient: None,
            started: Instant::now(),
            base_duration_ms,
            sink,
        }
    }

    pub fn recording(&self) -> &RouteRecording {
        &self.recording
    }

    fn elapsed_ms(&self) -> u64 {
        self.base_duration_ms + self.started.elapsed().as_millis() as u64
    }

    /// Attach `timetable` when the recording has none of its own.
    ///
    /// Returns true when it was attached.
    pub fn adopt_timetable(&mut self, timetable: &Timetable) -> bool {
        if self.recording.timetable.is_some() || timetable.is_empty() {
            return false;
        }
        self.recording.timetable = Some(timetable.clone());
        info!(
            route = %self.recording.route_name,
            stops = timetable.len(),
            "Recording uses the active timetable"
        );
        true
    }

    pub fn record_request(&mut self) {
        self.recording.request_count += 1;
    }

    /// Returns true when a point was appended.
    pub fn observe_position(
        &mut self,
        position: Coordinate,
        height: Option<f64>,
        gradient: Option<f64>,
    ) -> bool {
        if height.is_some() {
            self.last_height = height;
        }
        if gradient.is_some() {
            self.last_gradient = gradient;
        }

        if !position.is_finite() {
            return false;
        }
        if self
            .recording
            .last_point()
            .map(|p| p.same_position(&position))
            .unwrap_or(false)
        {
            return false;
        }

        self.recording.coordinates.push(TracePoint::new(
            position,
            self.last_height,
            self.last_gradient,
        ));
        self.persist();
        true
    }

    pub fn observe_marker_candidate(
        &mut self,
        name: &str,
        kind: MarkerKind,
        distance_ahead_m: f64,
        position: Coordinate,
        platform_length: Option<f64>,
    ) -> MarkerObservation {
        if name.is_empty() || !distance_ahead_m.is_finite() || !position.is_finite() {
            return MarkerObservation::Ignored;
        }

        let anchor = Anchor {
            position,
            distance: distance_ahead_m,
        };

        if !self.seen_markers.contains(name) {
            let detection = MarkerDetection {
                name: name.to_string(),
                kind,
                detection: Some(anchor),
                on_spot: None,
                platform_length,
                detected_at: Some(self.elapsed_ms()),
            };
            self.recording.markers.push(detection.into());
            self.seen_markers.insert(name.to_string());

            debug!(marker = name, ?kind, distance_ahead_m, "Marker detected");
            self.persist();
            return MarkerObservation::Created;
        }

        if distance_ahead_m < ON_SPOT_RADIUS_M && self.is_timetable_stop(name) {
            if let Some(record) = self.recording.marker_mut(name) {
                record.set_on_spot(anchor);
                debug!(marker = name, distance_ahead_m, "On-spot position updated");
                self.persist();
                return MarkerObservation::OnSpotUpdated;
            }
        }

        MarkerObservation::Ignored
    }

    fn is_timetable_stop(&self, name: &str) -> bool {
        self.recording
            .timetable
            .as_ref()
            .is_some_and(|t| t.contains_api_name(name))
    }

    fn persist(&mut self) {
        self.recording.duration = self.elapsed_ms();
        if let Err(e) = self.sink.persist(&self.recording) {
            warn!(error = %e, route = %self.recording.route_name, "Failed to persist recording");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::store::RouteFileError;
    use crate::timetable::{Stop, Timetable};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct MemorySink {
        snapshots: Arc<Mutex<Vec<RouteRecording>>>,
    }

    impl RecordingSink for MemorySink {
        fn persist(&self, recording: &RouteRecording) -> Result<(), RouteFileError> {
            self.snapshots.lock().unwrap().push(recording.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl RecordingSink for FailingSink {
        fn persist(&self, _: &RouteRecording) -> Result<(), RouteFileError> {
            Err(RouteFileError::WriterClosed)
        }
    }

    fn recorder_with_timetable(api_names: &[&str]) -> (RouteRecorder, MemorySink) {
        let mut recording = RouteRecording::new("Test");
        recording.timetable = Some(Timetable::new(
            api_names
                .iter()
                .enumerate()
                .map(|(i, name)| Stop {
                    index: i as u32,
                    destination: name.to_string(),
                    arrival: String::new(),
                    departure: String::new(),
                    platform: String::new(),
                    api_name: name.to_string(),
                })
                .collect(),
        ));
        let sink = MemorySink::default();
        (RouteRecorder::new(recording, Box::new(sink.clone())), sink)
    }

    fn persist_count(sink: &MemorySink) -> usize {
        sink.snapshots.lock().unwrap().len()
    }

    #[test]
    fn test_consecutive_duplicates_are_suppressed() {
        let (mut recorder, sink) = recorder_with_timetable(&[]);
        let a = Coordinate::new(50.0, 8.0);
        let b = Coordinate::new(50.0, 8.001);

        assert!(recorder.observe_position(a, None, None));
        for _ in 0..5 {
            assert!(!recorder.observe_position(a, None, None));
        }
        assert!(recorder.observe_position(b, None, None));
        assert!(!recorder.observe_position(b, None, None));
        // Non-adjacent repeats are allowed
        assert!(recorder.observe_position(a, None, None));

        let points = &recorder.recording().coordinates;
        assert_eq!(points.len(), 3);
        for pair in points.windows(2) {
            assert_ne!(pair[0].coordinate(), pair[1].coordinate());
        }
        assert_eq!(persist_count(&sink), 3);
    }

    #[test]
    fn test_points_carry_latest_known_height_and_gradient() {
        let (mut recorder, _) = recorder_with_timetable(&[]);
        recorder.observe_position(Coordinate::new(0.0, 0.0), Some(100.0), Some(1.5));
        recorder.observe_position(Coordinate::new(0.0, 0.001), None, None);
        recorder.observe_position(Coordinate::new(0.0, 0.002), Some(101.0), None);

        let points = &recorder.recording().coordinates;
        assert_eq!(points[1].height, Some(100.0));
        assert_eq!(points[1].gradient, Some(1.5));
        assert_eq!(points[2].height, Some(101.0));
        assert_eq!(points[2].gradient, Some(1.5));
    }

    #[test]
    fn test_first_detection_wins() {
        let (mut recorder, sink) = recorder_with_timetable(&[]);
        let first = Coordinate::new(1.0, 1.0);

        assert_eq!(
            recorder.observe_marker_candidate("Signal 4", MarkerKind::Marker, 800.0, first, None),
            MarkerObservation::Created
        );
        assert_eq!(
            recorder.observe_marker_candidate(
                "Signal 4",
                MarkerKind::Marker,
                300.0,
                Coordinate::new(1.0, 1.002),
                None
            ),
            MarkerObservation::Ignored
        );

        let markers = &recorder.recording().markers;
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].detection_latitude, Some(1.0));
        assert_eq!(markers[0].distance_ahead, Some(800.0));
        assert_eq!(persist_count(&sink), 1);
    }

    #[test]
    fn test_on_spot_updates_only_for_timetable_markers_in_range() {
        let (mut recorder, _) = recorder_with_timetable(&["Central"]);
        let far = Coordinate::new(2.0, 2.0);

        recorder.observe_marker_candidate("Central", MarkerKind::Station, 900.0, far, Some(200.0));
        recorder.observe_marker_candidate("Depot", MarkerKind::Station, 900.0, far, None);

        // Out of range
        assert_eq!(
            recorder.observe_marker_candidate("Central", MarkerKind::Station, 10.0, far, None),
            MarkerObservation::Ignored
        );
        // Not in the timetable
        assert_eq!(
            recorder.observe_marker_candidate("Depot", MarkerKind::Station, 2.0, far, None),
            MarkerObservation::Ignored
        );

        let close = Coordinate::new(2.0, 2.008);
        let closer = Coordinate::new(2.0, 2.0081);
        assert_eq!(
            recorder.observe_marker_candidate("Central", MarkerKind::Station, 8.0, close, None),
            MarkerObservation::OnSpotUpdated
        );
        assert_eq!(
            recorder.observe_marker_candidate("Central", MarkerKind::Station, 1.5, closer, None),
            MarkerObservation::OnSpotUpdated
        );

        let central = &recorder.recording().markers[0];
        assert_eq!(central.on_spot_longitude, Some(2.0081));
        assert_eq!(central.on_spot_distance, Some(1.5));
        assert_eq!(central.detection_longitude, Some(2.0));
        assert_eq!(central.platform_length, Some(200.0));
        assert!(recorder.recording().markers[1].on_spot_distance.is_none());
    }

    #[test]
    fn test_resumed_recording_keeps_seen_markers() {
        let (mut recorder, _) = recorder_with_timetable(&["Central"]);
        recorder.observe_marker_candidate(
            "Central",
            MarkerKind::Station,
            500.0,
            Coordinate::new(3.0, 3.0),
            None,
        );
        let snapshot = recorder.recording().clone();

        let mut resumed = RouteRecorder::new(snapshot, Box::new(MemorySink::default()));
        assert_eq!(
            resumed.observe_marker_candidate(
                "Central",
                MarkerKind::Station,
                400.0,
                Coordinate::new(3.0, 3.1),
                None
            ),
            MarkerObservation::Ignored
        );
        assert_eq!(resumed.recording().markers.len(), 1);
    }

    #[test]
    fn test_persist_failure_keeps_state() {
        let mut recorder = RouteRecorder::new(RouteRecording::new("Failing"), Box::new(FailingSink));
        assert!(recorder.observe_position(Coordinate::new(0.0, 0.0), None, None));
        assert!(recorder.observe_position(Coordinate::new(0.0, 0.001), None, None));
        assert_eq!(recorder.recording().coordinates.len(), 2);
    }

    #[test]
    fn test_adopted_timetable_enables_on_spot() {
        let (donor, _) = recorder_with_timetable(&["Central"]);
        let timetable = donor.recording().timetable.clone().unwrap();

        let mut recorder = RouteRecorder::new(RouteRecording::new("Plain"), Box::new(MemorySink::default()));
        assert!(recorder.adopt_timetable(&timetable));
        let position = Coordinate::new(4.0, 4.0);
        recorder.observe_marker_candidate("Central", MarkerKind::Station, 500.0, position, None);
        assert_eq!(
            recorder.observe_marker_candidate("Central", MarkerKind::Station, 5.0, position, None),
            MarkerObservation::OnSpotUpdated
        );

        // An existing timetable is never replaced
        let (mut skeleton, _) = recorder_with_timetable(&["Own"]);
        assert!(!skeleton.adopt_timetable(&timetable));
        assert!(skeleton.recording().timetable.as_ref().unwrap().contains_api_name("Own"));
        assert!(!recorder.adopt_timetable(&Timetable::default()));
    }

    #[test]
    fn test_request_count() {
        let (mut recorder, sink) = recorder_with_timetable(&[]);
        recorder.record_request();
        recorder.record_request();
        assert_eq!(recorder.recording().request_count, 2);
        assert_eq!(persist_count(&sink), 0);
    }
}
