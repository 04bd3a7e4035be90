//! Arrival predictions as delivered by the TfL arrivals feed.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One "vehicle V reaches station S in N seconds" record
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArrivalPrediction {
    pub vehicle_id: Option<String>,
    /// "inbound" or "outbound" on most lines, absent on some
    pub direction: Option<String>,
    pub destination_name: Option<String>,
    pub destination_naptan_id: Option<String>,
    pub towards: Option<String>,
    pub platform_name: Option<String>,
    pub station_name: String,
    pub naptan_id: Option<String>,
    /// Seconds
    pub time_to_station: Option<f64>,
    /// Free text such as "Between Victoria and Pimlico"
    pub current_location: Option<String>,
    pub expected_arrival: Option<DateTime<Utc>>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ArrivalPrediction {
    /// Key grouping the predictions of one vehicle.
    ///
    /// Feeds do not always carry a vehicle id; without one the key is built
    /// from whatever describes the run (direction, destination, platform).
    pub fn vehicle_key(&self) -> String {
        let direction = non_empty(&self.direction).unwrap_or_default();
        let destination = non_empty(&self.destination_name).unwrap_or_default();

        if let Some(vehicle) = non_empty(&self.vehicle_id) {
            return format!("{vehicle}|{direction}|{destination}");
        }

        let parts: Vec<&str> = [
            &self.direction,
            &self.destination_name,
            &self.destination_naptan_id,
            &self.towards,
            &self.platform_name,
        ]
        .into_iter()
        .filter_map(non_empty)
        .collect();
        if parts.is_empty() {
            format!("no-vehicle|{}|{direction}|{destination}", self.station_name)
        } else {
            format!("no-vehicle|{}", parts.join("|"))
        }
    }

    pub fn vehicle_id(&self) -> Option<&str> {
        non_empty(&self.vehicle_id)
    }

    pub fn destination(&self) -> Option<&str> {
        non_empty(&self.destination_name)
    }

    pub fn location(&self) -> Option<&str> {
        non_empty(&self.current_location)
    }

    pub fn naptan_id(&self) -> Option<&str> {
        non_empty(&self.naptan_id)
    }

    /// Seconds until arrival, falling back to the expected arrival timestamp
    pub fn seconds_to_station(&self, now_ms: f64) -> Option<f64> {
        match self.time_to_station {
            Some(seconds) if seconds.is_finite() => Some(seconds),
            _ => self
                .expected_arrival
                .map(|expected| ((expected.timestamp_millis() as f64 - now_ms) / 1000.0).max(0.0)),
        }
    }

    /// Expected arrival as epoch milliseconds
    pub fn expected_arrival_ms(&self) -> Option<f64> {
        self.expected_arrival.map(|expected| expected.timestamp_millis() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_feed_record() {
        let json = r#"{
            "$type": "Tfl.Api.Presentation.Entities.Prediction, Tfl.Api.Presentation.Entities",
            "id": "-1179957359",
            "vehicleId": "203",
            "naptanId": "940GZZLUVIC",
            "stationName": "Victoria Underground Station",
            "lineId": "victoria",
            "platformName": "Northbound - Platform 4",
            "direction": "outbound",
            "destinationName": "Walthamstow Central Underground Station",
            "timeToStation": 148,
            "currentLocation": "Between Pimlico and Victoria",
            "towards": "Walthamstow Central",
            "expectedArrival": "2024-05-01T08:02:28Z"
        }"#;
        let prediction: ArrivalPrediction = serde_json::from_str(json).unwrap();

        assert_eq!(prediction.vehicle_id(), Some("203"));
        assert_eq!(prediction.time_to_station, Some(148.0));
        assert_eq!(prediction.location(), Some("Between Pimlico and Victoria"));
        assert_eq!(
            prediction.vehicle_key(),
            "203|outbound|Walthamstow Central Underground Station"
        );
    }

    #[test]
    fn test_key_without_vehicle_id() {
        let prediction = ArrivalPrediction {
            vehicle_id: Some(" ".into()),
            direction: Some("inbound".into()),
            towards: Some("Brixton".into()),
            station_name: "Oxford Circus".into(),
            ..ArrivalPrediction::default()
        };
        assert_eq!(prediction.vehicle_key(), "no-vehicle|inbound|Brixton");

        let bare = ArrivalPrediction {
            station_name: "Oxford Circus".into(),
            ..ArrivalPrediction::default()
        };
        assert_eq!(bare.vehicle_key(), "no-vehicle|Oxford Circus||");
    }

    #[test]
    fn test_seconds_from_expected_arrival() {
        let expected: DateTime<Utc> = "2024-05-01T08:02:30Z".parse().unwrap();
        let prediction = ArrivalPrediction {
            expected_arrival: Some(expected),
            ..ArrivalPrediction::default()
        };
        let now = expected.timestamp_millis() as f64 - 45_000.0;
        assert_eq!(prediction.seconds_to_station(now), Some(45.0));
        assert_eq!(prediction.seconds_to_station(now + 60_000.0), Some(0.0));
        assert_eq!(ArrivalPrediction::default().seconds_to_station(now), None);
    }
}
