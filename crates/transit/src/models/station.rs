//! Stations.

use std::sync::Arc;

use geo::Point;

use crate::identifiers::StationIdentifier;

/// A single boarding location
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct Station {
    pub id: StationIdentifier,
    /// English display name, also used for matching live feed station names
    pub name: Arc<str>,
    pub location: Point,
}

impl Station {
    /// Last dotted component of the id, the NaPTAN code for TfL stations
    /// (e.g. `tfl.victoria.940GZZLUBXN` -> `940GZZLUBXN`)
    pub fn naptan_code(&self) -> &str {
        let id = self.id.as_str();
        id.rsplit('.').next().unwrap_or(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_naptan_code() {
        let station = Station {
            id: StationIdentifier::new("tfl.victoria.940GZZLUBXN"),
            name: "Brixton".into(),
            location: Point::new(-0.1146, 51.4627),
        };
        assert_eq!(station.naptan_code(), "940GZZLUBXN");

        let plain = Station {
            id: StationIdentifier::new("Brixton"),
            ..station
        };
        assert_eq!(plain.naptan_code(), "Brixton");
    }
}
