use anyhow::{Context, Result};
use railtrack_core::{EngineConfig, LiveTrackConfig};
use railtrack_transit::prelude::*;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

/// Everything the engine needs, as one JSON document
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct DatasetFile {
    pub stations: Vec<Station>,
    pub railways: Vec<Railway>,
    pub timetables: Vec<Timetable>,
    pub bus_trips: Vec<BusTrip>,
    pub flights: Vec<Flight>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ConfigFile {
    pub engine: EngineConfig,
    pub live: LiveTrackConfig,
}

pub fn read_dataset(path: &Path) -> Result<DatasetFile> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse dataset {}", path.display()))
}

pub fn build_provider(dataset: DatasetFile) -> Result<Arc<dyn TransitProvider>> {
    let provider = StaticTransitProvider::from_data(
        dataset.stations,
        dataset.railways,
        dataset.timetables,
        dataset.bus_trips,
        dataset.flights,
    )
    .context("Dataset failed validation")?;
    Ok(Arc::new(provider))
}

pub fn read_config(path: Option<&Path>) -> Result<ConfigFile> {
    let Some(path) = path else {
        return Ok(ConfigFile::default());
    };
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse config {}", path.display()))
}
