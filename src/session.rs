use serde::Serialize;
use tracing::{debug, info};

use crate::route::recorder::MarkerObservation;
use crate::route::{RouteProjector, RouteRecorder, RouteRecording};
use crate::telemetry::TelemetryFrame;
use crate::timetable::{evaluate, TargetTracker, Timetable, TimetableDisplay};

const MS_TO_KMH: f64 = 3.6;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStatus {
    pub route_name: String,
    pub total_points: usize,
    pub total_markers: usize,
}

/// One tick's worth of dashboard data.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HudSummary {
    pub local_time: Option<String>,
    pub speed_kmh: Option<f64>,
    pub speed_limit_kmh: Option<f64>,
    pub brake: Option<f64>,
    pub power: Option<f64>,
    pub gradient: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub distance_to_station: Option<i64>,
    pub timetable: TimetableDisplay,
    pub recording: Option<RecordingStatus>,
    pub route_name: Option<String>,
    pub error: Option<String>,
}

#[derive(Default)]
pub struct Session {
    recorder: Option<RouteRecorder>,
    route: Option<RouteProjector>,
    timetable: Timetable,
    targets: TargetTracker,
    last_display: TimetableDisplay,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start recording. A timetable carried by the recording becomes the
    /// active one unless a projection route already supplied one; a recording
    /// without a timetable takes the active one.
    pub fn start_recording(&mut self, mut recorder: RouteRecorder) {
        match &recorder.recording().timetable {
            Some(timetable) if self.timetable.is_empty() => self.timetable = timetable.clone(),
            Some(_) => {}
            None => {
                recorder.adopt_timetable(&self.timetable);
            }
        }
        self.recorder = Some(recorder);
    }

    /// Detach the recorder. Dropping it releases its sink.
    pub fn stop_recording(&mut self) -> Option<RouteRecorder> {
        self.recorder.take()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }

    pub fn recording_status(&self) -> Option<RecordingStatus> {
        self.recorder.as_ref().map(|r| {
            let recording = r.recording();
            RecordingStatus {
                route_name: recording.route_name.clone(),
                total_points: recording.coordinates.len(),
                total_markers: recording.markers.len(),
            }
        })
    }

    /// Replace the projection route. Its timetable, if any, replaces the
    /// active one and the distance cache starts over.
    pub fn set_route(&mut self, recording: &RouteRecording) {
        let projector = RouteProjector::new(recording);
        info!(
            route = projector.route_name(),
            points = projector.total_points(),
            markers = projector.total_markers(),
            "Projection route loaded"
        );

        if let Some(timetable) = &recording.timetable {
            self.timetable = timetable.clone();
        }
        self.route = Some(projector);
        self.targets = TargetTracker::default();
    }

    pub fn route_name(&self) -> Option<&str> {
        self.route.as_ref().map(|r| r.route_name())
    }

    pub fn timetable(&self) -> &Timetable {
        &self.timetable
    }

    /// Feed a frame to the recorder, if one is running.
    pub fn record_frame(&mut self, frame: &TelemetryFrame) {
        let Some(recorder) = self.recorder.as_mut() else {
            return;
        };

        recorder.record_request();

        let Some(position) = frame.position else {
            return;
        };
        recorder.observe_position(position, frame.height, frame.gradient);

        for sighting in &frame.sightings {
            let outcome = recorder.observe_marker_candidate(
                &sighting.name,
                sighting.kind,
                sighting.distance_m,
                position,
                sighting.platform_length_m,
            );
            if outcome != MarkerObservation::Ignored {
                debug!(marker = %sighting.name, ?outcome, "Marker observation");
            }
        }
    }

    /// Build the dashboard view of `frame`.
    ///
    /// When the frame carries no time of day the previous timetable display is
    /// kept, so a single dropped entry does not blank the HUD.
    pub fn process_frame(&mut self, frame: &TelemetryFrame) -> HudSummary {
        let display = match frame.seconds_of_day() {
            Some(now) => evaluate(&self.timetable, now).display(&self.timetable),
            None => self.last_display.clone(),
        };
        self.last_display = display.clone();

        let target = display
            .target
            .as_deref()
            .filter(|_| display.show_distance);
        let fresh = match (&self.route, frame.position, target) {
            (Some(route), Some(position), Some(target)) => {
                route.distance_to_marker(&position, target)
            }
            _ => None,
        };
        if self.targets.target() != target {
            info!(next = ?target, "Stop target changed");
        }
        let distance = self.targets.update(target, fresh);

        HudSummary {
            local_time: frame.local_time.map(|t| t.format("%H:%M:%S").to_string()),
            speed_kmh: frame.speed_ms.map(|v| v * MS_TO_KMH),
            speed_limit_kmh: frame.speed_limit_ms.map(|v| v * MS_TO_KMH),
            brake: frame.brake,
            power: frame.power,
            gradient: frame.gradient,
            latitude: frame.position.map(|p| p.latitude),
            longitude: frame.position.map(|p| p.longitude),
            distance_to_station: distance.map(|d| d.round() as i64),
            timetable: display,
            recording: self.recording_status(),
            route_name: self.route_name().map(str::to_string),
            error: None,
        }
    }

    /// Summary published when a tick could not read the telemetry source.
    pub fn error_summary(&self, error: impl ToString) -> HudSummary {
        HudSummary {
            timetable: self.last_display.clone(),
            recording: self.recording_status(),
            route_name: self.route_name().map(str::to_string),
            error: Some(error.to_string()),
            ..HudSummary::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::store::{RecordingSink, RouteFileError};
    use crate::route::types::{ResolvedMarker, TracePoint};
    use crate::route::{Coordinate, MarkerKind};
    use crate::telemetry::MarkerSighting;
    use crate::timetable::Stop;
    use approx::assert_relative_eq;
    use chrono::NaiveTime;

    struct NullSink;

    impl RecordingSink for NullSink {
        fn persist(&self, _: &RouteRecording) -> Result<(), RouteFileError> {
            Ok(())
        }
    }

    fn timetable() -> Timetable {
        Timetable::new(vec![
            Stop {
                index: 0,
                destination: "Origin".to_string(),
                arrival: String::new(),
                departure: "08:00:00".to_string(),
                platform: "1".to_string(),
                api_name: "ORIGIN".to_string(),
            },
            Stop {
                index: 1,
                destination: "Terminus".to_string(),
                arrival: "09:00:00".to_string(),
                departure: String::new(),
                platform: "2".to_string(),
                api_name: "TERMINUS".to_string(),
            },
        ])
    }

    fn resolved_route() -> RouteRecording {
        let mut recording = RouteRecording::new("Line");
        recording.coordinates = (0..5)
            .map(|i| TracePoint::new(Coordinate::new(0.0, i as f64 * 0.001), None, None))
            .collect();
        recording.markers = vec![ResolvedMarker {
            name: "TERMINUS".to_string(),
            kind: MarkerKind::Station,
            position: Some(Coordinate::new(0.0, 0.004)),
            platform_length: None,
        }
        .into()];
        recording.timetable = Some(timetable());
        recording
    }

    fn frame_at(time: &str, longitude: f64) -> TelemetryFrame {
        TelemetryFrame {
            position: Some(Coordinate::new(0.0, longitude)),
            local_time: NaiveTime::parse_from_str(time, "%H:%M:%S").ok(),
            speed_ms: Some(10.0),
            ..TelemetryFrame::default()
        }
    }

    #[test]
    fn test_summary_before_departure_has_no_distance() {
        let mut session = Session::new();
        session.set_route(&resolved_route());

        let summary = session.process_frame(&frame_at("07:30:00", 0.0));
        assert_eq!(summary.timetable.label.as_deref(), Some("DEPARTURE"));
        assert_eq!(summary.distance_to_station, None);
        assert_eq!(summary.local_time.as_deref(), Some("07:30:00"));
        assert_relative_eq!(summary.speed_kmh.unwrap(), 36.0);
        assert_eq!(summary.route_name.as_deref(), Some("Line"));
    }

    #[test]
    fn test_summary_en_route_projects_distance() {
        let mut session = Session::new();
        session.set_route(&resolved_route());

        let summary = session.process_frame(&frame_at("08:30:00", 0.001));
        assert_eq!(summary.timetable.target.as_deref(), Some("TERMINUS"));
        assert!(summary.timetable.show_distance);
        // Three segments of ~111 m each
        let distance = summary.distance_to_station.unwrap();
        assert!((330..=336).contains(&distance), "got {distance}");

        let passed = session.process_frame(&frame_at("08:31:00", 0.0045));
        assert_eq!(passed.distance_to_station, Some(0));
    }

    #[test]
    fn test_missing_time_keeps_previous_display() {
        let mut session = Session::new();
        session.set_route(&resolved_route());

        let first = session.process_frame(&frame_at("08:30:00", 0.001));
        let mut no_clock = frame_at("08:30:00", 0.001);
        no_clock.local_time = None;
        let second = session.process_frame(&no_clock);

        assert_eq!(second.timetable, first.timetable);
        assert_eq!(second.distance_to_station, first.distance_to_station);
    }

    #[test]
    fn test_recording_through_session() {
        let mut recording = RouteRecording::new("Rec");
        recording.timetable = Some(timetable());
        let mut session = Session::new();
        session.start_recording(RouteRecorder::new(recording, Box::new(NullSink)));
        assert!(session.is_recording());
        assert_eq!(session.timetable().len(), 2);

        let mut frame = frame_at("08:10:00", 0.0);
        frame.sightings.push(MarkerSighting {
            name: "TERMINUS".to_string(),
            kind: MarkerKind::Station,
            distance_m: 4000.0,
            platform_length_m: None,
        });
        session.record_frame(&frame);
        session.record_frame(&frame);

        let status = session.recording_status().unwrap();
        assert_eq!(status.route_name, "Rec");
        assert_eq!(status.total_points, 1);
        assert_eq!(status.total_markers, 1);

        let summary = session.process_frame(&frame);
        assert_eq!(summary.recording, Some(status));
    }

    #[test]
    fn test_recording_takes_route_timetable_for_on_spot() {
        let mut session = Session::new();
        session.set_route(&resolved_route());
        session.start_recording(RouteRecorder::new(RouteRecording::new("Rec"), Box::new(NullSink)));

        let sighting = |distance_m| MarkerSighting {
            name: "TERMINUS".to_string(),
            kind: MarkerKind::Station,
            distance_m,
            platform_length_m: None,
        };
        let mut far = frame_at("08:10:00", 0.0);
        far.sightings.push(sighting(500.0));
        session.record_frame(&far);
        let mut close = frame_at("08:20:00", 0.004);
        close.sightings.push(sighting(5.0));
        session.record_frame(&close);

        let recorder = session.stop_recording().unwrap();
        let recording = recorder.recording();
        assert!(recording.timetable.as_ref().unwrap().contains_api_name("TERMINUS"));
        assert_eq!(recording.markers[0].on_spot_distance, Some(5.0));
        assert_eq!(recording.markers[0].distance_ahead, Some(500.0));
    }

    #[test]
    fn test_error_summary_keeps_context() {
        let mut session = Session::new();
        session.set_route(&resolved_route());
        session.process_frame(&frame_at("08:30:00", 0.001));

        let summary = session.error_summary("connection refused");
        assert_eq!(summary.error.as_deref(), Some("connection refused"));
        assert_eq!(summary.route_name.as_deref(), Some("Line"));
        assert_eq!(summary.timetable.target.as_deref(), Some("TERMINUS"));
        assert_eq!(summary.speed_kmh, None);
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let value = serde_json::to_value(HudSummary::default()).unwrap();
        assert!(value.get("distanceToStation").is_some());
        assert!(value.get("speedLimitKmh").is_some());
        assert_eq!(value["timetable"]["showDistance"], false);
    }
}
