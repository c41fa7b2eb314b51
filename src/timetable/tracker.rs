// Times compare as seconds since midnight; schedules crossing midnight are not unwrapped.

use serde::Serialize;

use crate::timetable::types::Timetable;

pub const DEPARTURE_LABEL: &str = "DEPARTURE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Before the first stop's departure.
    BeforeFirst,
    /// Waiting at stop `i` for its departure.
    AtStopDeparture(usize),
    /// Travelling towards stop `i`.
    EnRoute(usize),
    /// Arrived at stop `i`, before its departure.
    AtStopArrival(usize),
    /// Final stop `i` reached in the scan.
    AtFinalStop(usize),
    Exhausted,
}

/// Evaluate progress along `timetable` at `now` (seconds since midnight).
///
/// Stops are scanned in order and the first matching rule wins.
pub fn evaluate(timetable: &Timetable, now: u32) -> Progress {
    let stops = timetable.stops();

    for (i, stop) in stops.iter().enumerate() {
        let departure = stop.departure_secs();

        if i == 0 && departure.is_some_and(|d| now < d) {
            return Progress::BeforeFirst;
        }

        let Some(next) = stops.get(i + 1) else {
            return Progress::AtFinalStop(i);
        };

        let Some(departure) = departure else {
            continue;
        };
        if now < departure {
            return Progress::AtStopDeparture(i);
        }

        let Some(next_arrival) = next.arrival_secs() else {
            continue;
        };
        if now < next_arrival {
            return Progress::EnRoute(i + 1);
        }
        if next.departure_secs().is_some_and(|d| now < d) {
            return Progress::AtStopArrival(i + 1);
        }
    }

    Progress::Exhausted
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableDisplay {
    pub time: Option<String>,
    pub label: Option<String>,
    pub target: Option<String>,
    pub show_distance: bool,
}

impl TimetableDisplay {
    fn departure(time: &str) -> Self {
        Self {
            time: Some(time.to_string()),
            label: Some(DEPARTURE_LABEL.to_string()),
            target: None,
            show_distance: false,
        }
    }
}

impl Progress {
    pub fn display(&self, timetable: &Timetable) -> TimetableDisplay {
        let stops = timetable.stops();
        match *self {
            Progress::BeforeFirst => stops
                .first()
                .map(|s| TimetableDisplay::departure(&s.departure))
                .unwrap_or_default(),
            Progress::AtStopDeparture(i) | Progress::AtStopArrival(i) => stops
                .get(i)
                .map(|s| TimetableDisplay::departure(&s.departure))
                .unwrap_or_default(),
            Progress::EnRoute(i) | Progress::AtFinalStop(i) => stops
                .get(i)
                .map(|s| TimetableDisplay {
                    time: Some(s.arrival.clone()),
                    label: Some(s.destination.clone()),
                    target: s.target().map(str::to_string),
                    show_distance: true,
                })
                .unwrap_or_default(),
            Progress::Exhausted => TimetableDisplay::default(),
        }
    }
}

/// Remembers the last target and distance across ticks.
///
/// A missing distance keeps the previous value for the same target; a new
/// target always starts from nothing.
#[derive(Debug, Clone, Default)]
pub struct TargetTracker {
    last_target: Option<String>,
    last_distance: Option<f64>,
}

impl TargetTracker {
    pub fn target(&self) -> Option<&str> {
        self.last_target.as_deref()
    }

    pub fn update(&mut self, target: Option<&str>, distance: Option<f64>) -> Option<f64> {
        if self.last_target.as_deref() != target {
            self.last_target = target.map(str::to_string);
            self.last_distance = None;
        }

        if self.last_target.is_some() && distance.is_some() {
            self.last_distance = distance;
        }

        self.last_distance
    }
}
