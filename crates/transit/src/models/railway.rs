//! Railways: ordered station paths with precomputed distance offsets.

use std::sync::Arc;

use crate::identifiers::{RailwayIdentifier, StationIdentifier};
use crate::models::types::{RailDirection, Result, TransitError};

/// A named path through an ordered list of stations.
///
/// `station_offsets[i]` is the cumulative distance (km) along the path at
/// `stations[i]`. Offsets are produced by the geometry build and are only
/// monotonic within a single direction of travel.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct Railway {
    pub id: RailwayIdentifier,
    pub title: Arc<str>,
    pub stations: Vec<StationIdentifier>,
    pub station_offsets: Vec<f64>,
    /// Display label for ascending trains (e.g. "Northbound")
    pub ascending: Arc<str>,
    /// Display label for descending trains
    pub descending: Arc<str>,
    /// Trains appear and disappear based on realtime train information
    #[cfg_attr(feature = "serde", serde(default))]
    pub dynamic: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub altitude: Option<f64>,
}

impl Railway {
    /// Check that every station has exactly one finite offset and that the
    /// offsets never decrease along the station list
    pub fn validate(&self) -> Result<()> {
        if self.stations.len() != self.station_offsets.len() {
            return Err(TransitError::InvalidData(format!(
                "Railway {} has {} stations but {} station offsets",
                self.id,
                self.stations.len(),
                self.station_offsets.len()
            )));
        }
        if self.station_offsets.iter().any(|offset| !offset.is_finite()) {
            return Err(TransitError::InvalidData(format!(
                "Railway {} has a non-finite station offset",
                self.id
            )));
        }
        if let Some(index) = self
            .station_offsets
            .windows(2)
            .position(|pair| pair[1] < pair[0])
        {
            return Err(TransitError::InvalidData(format!(
                "Railway {} station offsets decrease after station {}",
                self.id,
                index
            )));
        }
        Ok(())
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    /// Convert a signed index into a valid station index
    pub fn checked_index(&self, index: isize) -> Option<usize> {
        usize::try_from(index).ok().filter(|&i| i < self.stations.len())
    }

    pub fn station_at(&self, index: usize) -> Option<&StationIdentifier> {
        self.stations.get(index)
    }

    pub fn offset_at(&self, index: usize) -> Option<f64> {
        self.station_offsets.get(index).copied()
    }

    /// Find a station scanning in the direction of travel.
    ///
    /// Ascending searches forward from `from` (inclusive), descending searches
    /// backward from `from` (inclusive). Without `from` the whole list is
    /// scanned from the corresponding end.
    pub fn index_of(
        &self,
        station: &StationIdentifier,
        direction: RailDirection,
        from: Option<usize>,
    ) -> Option<usize> {
        match direction {
            RailDirection::Ascending => {
                let start = from.unwrap_or(0);
                self.stations
                    .iter()
                    .enumerate()
                    .skip(start)
                    .find(|(_, s)| *s == station)
                    .map(|(i, _)| i)
            }
            RailDirection::Descending => {
                let end = from
                    .map(|f| (f + 1).min(self.stations.len()))
                    .unwrap_or(self.stations.len());
                self.stations[..end].iter().rposition(|s| s == station)
            }
        }
    }

    /// Physical length of the section `[index, index + length]`
    pub fn section_distance(&self, index: usize, length: isize) -> Option<f64> {
        let end = self.checked_index(index as isize + length)?;
        Some((self.offset_at(end)? - self.offset_at(index)?).abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn loop_line() -> Railway {
        Railway {
            id: RailwayIdentifier::new("test.loop"),
            title: "Loop Line".into(),
            stations: ["a", "b", "c", "b2", "a"]
                .into_iter()
                .map(StationIdentifier::new)
                .collect(),
            station_offsets: vec![0.0, 1.2, 2.0, 3.5, 4.0],
            ascending: "Outer".into(),
            descending: "Inner".into(),
            dynamic: false,
            altitude: None,
        }
    }

    #[test]
    fn test_index_of_respects_direction() {
        let railway = loop_line();
        let a = StationIdentifier::new("a");

        assert_eq!(railway.index_of(&a, RailDirection::Ascending, None), Some(0));
        assert_eq!(railway.index_of(&a, RailDirection::Ascending, Some(1)), Some(4));
        assert_eq!(railway.index_of(&a, RailDirection::Descending, None), Some(4));
        assert_eq!(railway.index_of(&a, RailDirection::Descending, Some(3)), Some(0));
        assert_eq!(
            railway.index_of(&StationIdentifier::new("zz"), RailDirection::Ascending, None),
            None
        );
    }

    #[test]
    fn test_section_distance() {
        let railway = loop_line();
        assert_relative_eq!(railway.section_distance(1, 1).unwrap(), 0.8, epsilon = 1e-9);
        assert_relative_eq!(railway.section_distance(3, -2).unwrap(), 2.3, epsilon = 1e-9);
        assert_eq!(railway.section_distance(4, 1), None);
    }

    #[test]
    fn test_validate_offsets() {
        let mut railway = loop_line();
        assert!(railway.validate().is_ok());
        railway.station_offsets.pop();
        assert!(railway.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_decreasing_offsets() {
        let mut railway = loop_line();
        railway.station_offsets = vec![0.0, 1.2, 1.2, 3.5, 4.0];
        assert!(railway.validate().is_ok());

        railway.station_offsets = vec![0.0, 1.2, 0.9, 3.5, 4.0];
        assert!(railway.validate().is_err());
    }
}
