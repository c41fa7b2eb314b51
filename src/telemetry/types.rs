use chrono::{DateTime, NaiveDateTime, NaiveTime, Timelike};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::route::{Coordinate, MarkerKind};

pub const PLAYER_INFO: &str = "DriverAid.PlayerInfo";
pub const TRACK_DATA: &str = "DriverAid.TrackData";
pub const TIME_OF_DAY: &str = "TimeOfDay.Data";
pub const SPEED: &str = "CurrentDrivableActor.Function.HUD_GetSpeed";
pub const SPEED_LIMIT: &str = "CurrentDrivableActor.Function.HUD_GetSpeedLimit";
pub const BRAKE_GAUGE: &str = "CurrentDrivableActor.Function.HUD_GetBrakeGauge_1";
pub const POWER_HANDLE: &str = "CurrentDrivableActor.Function.HUD_GetPowerHandle";

pub const SUBSCRIBED_PATHS: [&str; 7] = [
    PLAYER_INFO,
    TRACK_DATA,
    TIME_OF_DAY,
    SPEED,
    SPEED_LIMIT,
    BRAKE_GAUGE,
    POWER_HANDLE,
];

const CM_PER_M: f64 = 100.0;

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionResponse {
    #[serde(rename = "Entries", default)]
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    #[serde(rename = "Path", default)]
    pub path: String,
    #[serde(rename = "NodeValid", default)]
    pub node_valid: bool,
    #[serde(rename = "Values", default)]
    pub values: serde_json::Value,
}

impl Entry {
    fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        match T::deserialize(&self.values) {
            Ok(v) => Some(v),
            Err(e) => {
                debug!(path = %self.path, error = %e, "Skipping malformed entry");
                None
            }
        }
    }
}

#[derive(Deserialize)]
struct PlayerInfo {
    #[serde(rename = "geoLocation")]
    geo_location: GeoLocation,
}

#[derive(Deserialize)]
struct GeoLocation {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct TrackData {
    #[serde(default)]
    height: Option<f64>,
    #[serde(default)]
    gradient: Option<f64>,
    #[serde(default)]
    stations: Vec<TrackMarker>,
    #[serde(default)]
    markers: Vec<TrackMarker>,
}

#[derive(Deserialize)]
struct TrackMarker {
    #[serde(default)]
    name: String,
    #[serde(rename = "distanceCM")]
    distance_cm: Option<f64>,
    #[serde(rename = "platformLengthCM", default)]
    platform_length_cm: Option<f64>,
}

#[derive(Deserialize)]
struct TimeOfDay {
    #[serde(rename = "LocalTimeISO8601")]
    local_time: String,
}

#[derive(Deserialize)]
struct Speed {
    #[serde(rename = "Speed (ms)")]
    speed: f64,
}

#[derive(Deserialize)]
struct SpeedLimit {
    #[serde(rename = "SpeedLimit (ms)")]
    speed_limit: f64,
}

#[derive(Deserialize)]
struct BrakeGauge {
    #[serde(rename = "BrakeGauge")]
    brake: f64,
}

#[derive(Deserialize)]
struct PowerHandle {
    #[serde(rename = "Power")]
    power: f64,
}

/// A station or marker reported ahead of the train, distances in meters.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSighting {
    pub name: String,
    pub kind: MarkerKind,
    pub distance_m: f64,
    pub platform_length_m: Option<f64>,
}

/// Everything one poll of the feed told us. Fields the feed did not carry (or
/// carried in a shape we could not read) are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryFrame {
    pub position: Option<Coordinate>,
    pub height: Option<f64>,
    pub gradient: Option<f64>,
    pub local_time: Option<NaiveTime>,
    pub speed_ms: Option<f64>,
    pub speed_limit_ms: Option<f64>,
    pub brake: Option<f64>,
    pub power: Option<f64>,
    pub sightings: Vec<MarkerSighting>,
}

impl TelemetryFrame {
    pub fn from_response(response: &SubscriptionResponse) -> Self {
        let mut frame = TelemetryFrame::default();

        for entry in response.entries.iter().filter(|e| e.node_valid) {
            match entry.path.as_str() {
                PLAYER_INFO => {
                    if let Some(info) = entry.decode::<PlayerInfo>() {
                        let position = Coordinate::new(
                            info.geo_location.latitude,
                            info.geo_location.longitude,
                        );
                        frame.position = position.is_finite().then_some(position);
                    }
                }
                TRACK_DATA => {
                    if let Some(track) = entry.decode::<TrackData>() {
                        frame.height = track.height;
                        frame.gradient = track.gradient;
                        frame.sightings.extend(sightings(track.stations, MarkerKind::Station));
                        frame.sightings.extend(sightings(track.markers, MarkerKind::Marker));
                    }
                }
                TIME_OF_DAY => {
                    frame.local_time = entry
                        .decode::<TimeOfDay>()
                        .and_then(|t| parse_local_time(&t.local_time));
                }
                SPEED => frame.speed_ms = entry.decode::<Speed>().map(|v| v.speed),
                SPEED_LIMIT => {
                    frame.speed_limit_ms = entry.decode::<SpeedLimit>().map(|v| v.speed_limit)
                }
                BRAKE_GAUGE => frame.brake = entry.decode::<BrakeGauge>().map(|v| v.brake),
                POWER_HANDLE => frame.power = entry.decode::<PowerHandle>().map(|v| v.power),
                other => debug!(path = other, "Ignoring unknown entry"),
            }
        }

        frame
    }

    pub fn seconds_of_day(&self) -> Option<u32> {
        self.local_time.map(|t| t.num_seconds_from_midnight())
    }
}

fn sightings(markers: Vec<TrackMarker>, kind: MarkerKind) -> impl Iterator<Item = MarkerSighting> {
    markers.into_iter().filter_map(move |m| {
        let distance_m = m.distance_cm? / CM_PER_M;
        if m.name.is_empty() || !distance_m.is_finite() {
            return None;
        }
        Some(MarkerSighting {
            name: m.name,
            kind,
            distance_m,
            platform_length_m: m.platform_length_cm.map(|cm| cm / CM_PER_M),
        })
    })
}

/// The simulator reports its clock as an ISO-8601 timestamp, sometimes with an
/// offset and sometimes without. Only the wall-clock part is kept.
pub fn parse_local_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local().time());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.time());
    }
    NaiveTime::parse_from_str(value, "%H:%M:%S%.f").ok()
}
