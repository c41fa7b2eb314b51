use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub arrival: String,
    #[serde(default)]
    pub departure: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub api_name: String,
}

impl Stop {
    pub fn arrival_secs(&self) -> Option<u32> {
        parse_time_to_secs(&self.arrival)
    }

    pub fn departure_secs(&self) -> Option<u32> {
        parse_time_to_secs(&self.departure)
    }

    pub fn target(&self) -> Option<&str> {
        (!self.api_name.is_empty()).then_some(self.api_name.as_str())
    }
}

/// Parse `HH:MM[:SS]` into seconds since midnight. Hours may run past 23.
pub fn parse_time_to_secs(time_str: &str) -> Option<u32> {
    let parts: Vec<&str> = time_str.trim().split(':').collect();
    let (hours, mins, secs) = match parts.as_slice() {
        [h, m] => (*h, *m, "0"),
        [h, m, s] => (*h, *m, *s),
        _ => return None,
    };
    let hours: u32 = hours.parse().ok()?;
    let mins: u32 = mins.parse().ok()?;
    let secs: u32 = secs.parse().ok()?;
    if mins >= 60 || secs >= 60 {
        return None;
    }
    hours.checked_mul(3600)?.checked_add(mins * 60 + secs)
}

/// Ordered stop list for one service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timetable {
    stops: Vec<Stop>,
}

impl Timetable {
    pub fn new(stops: Vec<Stop>) -> Self {
        Self { stops }
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    pub fn api_names(&self) -> impl Iterator<Item = &str> {
        self.stops.iter().filter_map(Stop::target)
    }

    pub fn contains_api_name(&self, name: &str) -> bool {
        self.api_names().any(|n| n == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time_to_secs("08:00:00"), Some(8 * 3600));
        assert_eq!(parse_time_to_secs("23:59:59"), Some(86_399));
        assert_eq!(parse_time_to_secs("07:30"), Some(7 * 3600 + 30 * 60));
        assert_eq!(parse_time_to_secs(""), None);
        assert_eq!(parse_time_to_secs("soon"), None);
        assert_eq!(parse_time_to_secs("08:xx:00"), None);
        assert_eq!(parse_time_to_secs("08:00:zz"), None);
        assert_eq!(parse_time_to_secs("25:10:00"), Some(25 * 3600 + 600));
        assert_eq!(parse_time_to_secs("99999999:00:00"), None);
        assert_eq!(parse_time_to_secs("08:00:00:99"), None);
        assert_eq!(parse_time_to_secs("08:60:00"), None);
        assert_eq!(parse_time_to_secs("08:00:75"), None);
        assert_eq!(parse_time_to_secs("08"), None);
    }

    #[test]
    fn test_timetable_is_a_plain_array() {
        let json = r#"[
            {"index": 0, "destination": "Alpha", "arrival": "", "departure": "08:00:00", "platform": "2", "apiName": "ALP"},
            {"index": 1, "destination": "Beta", "arrival": "09:00:00", "departure": "", "platform": "", "apiName": ""}
        ]"#;
        let timetable: Timetable = serde_json::from_str(json).unwrap();
        assert_eq!(timetable.len(), 2);
        assert_eq!(timetable.stops()[0].departure_secs(), Some(8 * 3600));
        assert!(timetable.contains_api_name("ALP"));
        assert!(!timetable.contains_api_name(""));
        assert_eq!(timetable.api_names().count(), 1);
        assert_eq!(timetable.stops()[1].target(), None);
    }
}
