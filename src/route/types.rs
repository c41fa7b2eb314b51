use serde::{Deserialize, Serialize};

use crate::route::proximity::haversine_distance;
use crate::timetable::Timetable;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        haversine_distance(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }

    /// Linear interpolation in lat/lon space; `fraction` 0 is `self`, 1 is `other`.
    pub fn lerp(&self, other: &Coordinate, fraction: f64) -> Coordinate {
        Coordinate {
            latitude: self.latitude + (other.latitude - self.latitude) * fraction,
            longitude: self.longitude + (other.longitude - self.longitude) * fraction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracePoint {
    pub longitude: f64,
    pub latitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gradient: Option<f64>,
}

impl TracePoint {
    pub fn new(position: Coordinate, height: Option<f64>, gradient: Option<f64>) -> Self {
        Self {
            longitude: position.longitude,
            latitude: position.latitude,
            height,
            gradient,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    pub fn same_position(&self, position: &Coordinate) -> bool {
        self.latitude == position.latitude && self.longitude == position.longitude
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    Station,
    Marker,
}

/// A position plus the distance still to travel from it, as reported by the sim.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub position: Coordinate,
    pub distance: f64,
}

impl Anchor {
    fn from_parts(lat: Option<f64>, lon: Option<f64>, distance: Option<f64>) -> Option<Self> {
        let anchor = Anchor {
            position: Coordinate::new(lat?, lon?),
            distance: distance?,
        };
        (anchor.position.is_finite() && anchor.distance.is_finite()).then_some(anchor)
    }
}

/// A marker as stored in a route file, before or after resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerRecord {
    pub station_name: String,
    pub marker_type: MarkerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_length: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_ahead: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_spot_latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_spot_longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_spot_distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_at: Option<u64>,
}

impl MarkerRecord {
    pub fn has_detection_fields(&self) -> bool {
        self.detection_latitude.is_some()
            || self.detection_longitude.is_some()
            || self.distance_ahead.is_some()
            || self.on_spot_latitude.is_some()
            || self.on_spot_longitude.is_some()
            || self.on_spot_distance.is_some()
            || self.detected_at.is_some()
    }

    pub fn set_on_spot(&mut self, anchor: Anchor) {
        self.on_spot_latitude = Some(anchor.position.latitude);
        self.on_spot_longitude = Some(anchor.position.longitude);
        self.on_spot_distance = Some(anchor.distance);
    }

    pub fn position(&self) -> Option<Coordinate> {
        let position = Coordinate::new(self.latitude?, self.longitude?);
        position.is_finite().then_some(position)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerDetection {
    pub name: String,
    pub kind: MarkerKind,
    pub detection: Option<Anchor>,
    pub on_spot: Option<Anchor>,
    pub platform_length: Option<f64>,
    pub detected_at: Option<u64>,
}

impl From<&MarkerRecord> for MarkerDetection {
    fn from(record: &MarkerRecord) -> Self {
        Self {
            name: record.station_name.clone(),
            kind: record.marker_type,
            detection: Anchor::from_parts(
                record.detection_latitude,
                record.detection_longitude,
                record.distance_ahead,
            ),
            on_spot: Anchor::from_parts(
                record.on_spot_latitude,
                record.on_spot_longitude,
                record.on_spot_distance,
            ),
            platform_length: record.platform_length,
            detected_at: record.detected_at,
        }
    }
}

impl From<MarkerDetection> for MarkerRecord {
    fn from(detection: MarkerDetection) -> Self {
        let mut record = MarkerRecord {
            station_name: detection.name,
            marker_type: detection.kind,
            latitude: None,
            longitude: None,
            platform_length: detection.platform_length,
            detection_latitude: None,
            detection_longitude: None,
            distance_ahead: None,
            on_spot_latitude: None,
            on_spot_longitude: None,
            on_spot_distance: None,
            detected_at: detection.detected_at,
        };
        if let Some(anchor) = detection.detection {
            record.detection_latitude = Some(anchor.position.latitude);
            record.detection_longitude = Some(anchor.position.longitude);
            record.distance_ahead = Some(anchor.distance);
        }
        if let Some(anchor) = detection.on_spot {
            record.set_on_spot(anchor);
        }
        record
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMarker {
    pub name: String,
    pub kind: MarkerKind,
    pub position: Option<Coordinate>,
    pub platform_length: Option<f64>,
}

impl From<ResolvedMarker> for MarkerRecord {
    fn from(marker: ResolvedMarker) -> Self {
        MarkerRecord {
            station_name: marker.name,
            marker_type: marker.kind,
            latitude: marker.position.map(|p| p.latitude),
            longitude: marker.position.map(|p| p.longitude),
            platform_length: marker.platform_length,
            detection_latitude: None,
            detection_longitude: None,
            distance_ahead: None,
            on_spot_latitude: None,
            on_spot_longitude: None,
            on_spot_distance: None,
            detected_at: None,
        }
    }
}

impl From<&MarkerRecord> for ResolvedMarker {
    fn from(record: &MarkerRecord) -> Self {
        Self {
            name: record.station_name.clone(),
            kind: record.marker_type,
            position: record.position(),
            platform_length: record.platform_length,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRecording {
    #[serde(default)]
    pub route_name: String,
    /// Milliseconds spent recording.
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub request_count: u64,
    #[serde(default)]
    pub coordinates: Vec<TracePoint>,
    #[serde(default)]
    pub markers: Vec<MarkerRecord>,
    #[serde(default)]
    pub timetable: Option<Timetable>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordingFile<'a> {
    route_name: &'a str,
    total_points: usize,
    total_markers: usize,
    duration: u64,
    request_count: u64,
    coordinates: &'a [TracePoint],
    markers: &'a [MarkerRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    timetable: Option<&'a Timetable>,
}

impl Serialize for RouteRecording {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RecordingFile {
            route_name: &self.route_name,
            total_points: self.coordinates.len(),
            total_markers: self.markers.len(),
            duration: self.duration,
            request_count: self.request_count,
            coordinates: &self.coordinates,
            markers: &self.markers,
            timetable: self.timetable.as_ref(),
        }
        .serialize(serializer)
    }
}

impl RouteRecording {
    pub fn new(route_name: impl Into<String>) -> Self {
        Self {
            route_name: route_name.into(),
            ..Default::default()
        }
    }

    pub fn last_point(&self) -> Option<&TracePoint> {
        self.coordinates.last()
    }

    pub fn marker_mut(&mut self, name: &str) -> Option<&mut MarkerRecord> {
        self.markers.iter_mut().find(|m| m.station_name == name)
    }

    /// True once no marker carries detection-time fields.
    pub fn is_resolved(&self) -> bool {
        !self.markers.iter().any(MarkerRecord::has_detection_fields)
    }
}
