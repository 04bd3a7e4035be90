//! Live track estimation.
//!
//! Vehicles known only through arrival predictions are placed on a section
//! of their railway with a progress fraction inferred from the time left to
//! the next station. Successive polls are smoothed so the rendered position
//! moves forward steadily instead of jumping with every noisy prediction.

use std::collections::HashMap;

use itertools::Itertools;
use railtrack_transit::prelude::*;
use tracing::debug;

use super::location::parse_location;
use super::prediction::ArrivalPrediction;
use crate::config::LiveTrackConfig;
use crate::vehicle::{Section, SectionPosition};

/// Shortest duration (s) used when extrapolating progress
const MIN_EXTRAPOLATION_DURATION: f64 = 0.1;

/// Where progress was, and how fast it moves
#[derive(Clone, Copy, Debug, PartialEq)]
struct Basis {
    progress: f64,
    /// ms
    at: f64,
    /// Seconds for the whole section
    duration: f64,
}

impl Basis {
    fn extrapolate(&self, now: f64) -> f64 {
        let elapsed = ((now - self.at) / 1000.0).max(0.0);
        self.progress + elapsed / self.duration.max(MIN_EXTRAPOLATION_DURATION)
    }
}

/// Inferred position of one live vehicle
#[derive(Clone, Debug, PartialEq)]
pub struct LiveTrackRecord {
    pub key: String,
    pub vehicle_id: String,
    pub railway: RailwayIdentifier,
    pub section: Section,
    pub departure_station: Option<StationIdentifier>,
    pub arrival_station: StationIdentifier,
    pub destination: Option<String>,
    pub current_location: Option<String>,
    /// Seconds
    pub time_to_station: f64,
    /// Progress at `last_update`, after de-overlap. The next update smooths
    /// against this value extrapolated forward.
    pub progress: f64,
    /// Seconds the whole section is expected to take
    pub duration: f64,
    /// ms
    pub last_update: f64,
    /// Estimated departure from the previous station (epoch ms)
    pub departed_at: f64,
    /// Expected arrival at the next station (epoch ms)
    pub arrives_at: f64,
    /// State the last update smoothed against
    basis: Option<Basis>,
}

impl LiveTrackRecord {
    /// Dead-reckoned progress at `now`
    pub fn progress_at(&self, now: f64, max_progress: f64) -> f64 {
        let basis = Basis {
            progress: self.progress,
            at: self.last_update,
            duration: self.duration,
        };
        basis.extrapolate(now).clamp(0.0, max_progress)
    }

    fn current_basis(&self) -> Basis {
        Basis {
            progress: self.progress,
            at: self.last_update,
            duration: self.duration,
        }
    }
}

/// What one `update` did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Vehicles placed on a section
    pub placed: usize,
    /// Known vehicles left extrapolating because the update was ambiguous
    pub preserved: usize,
    /// Unknown vehicles whose predictions could not be placed
    pub dropped: usize,
    pub retired: usize,
}

/// Predictions of one vehicle, with seconds to station resolved
struct VehicleGroup<'a> {
    key: String,
    vehicle_id: Option<&'a str>,
    direction: Option<&'a str>,
    destination: Option<&'a str>,
    location: Option<&'a str>,
    predictions: Vec<(&'a ArrivalPrediction, f64)>,
}

struct StationPrediction {
    station: StationIdentifier,
    index: usize,
    seconds: f64,
    expected: Option<f64>,
}

struct Estimate {
    section: Section,
    departure_station: Option<StationIdentifier>,
    arrival_station: StationIdentifier,
    seconds: f64,
    duration: f64,
    progress: f64,
    expected: Option<f64>,
}

struct Placement {
    key: String,
    section: Section,
    seconds: f64,
    /// Smoothed progress before de-overlap
    smoothed: f64,
    /// De-overlap never moves a record below its own extrapolated progress
    floor: f64,
}

#[derive(Debug, Default)]
pub struct LiveTrackEstimator {
    config: LiveTrackConfig,
    records: HashMap<String, LiveTrackRecord>,
}

impl LiveTrackEstimator {
    pub fn new(config: LiveTrackConfig) -> Self {
        Self {
            config,
            records: HashMap::new(),
        }
    }

    pub fn config(&self) -> &LiveTrackConfig {
        &self.config
    }

    pub fn record(&self, key: &str) -> Option<&LiveTrackRecord> {
        self.records.get(key)
    }

    pub fn records(&self) -> impl Iterator<Item = &LiveTrackRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Positions of every record at `now`
    pub fn positions(&self, now: f64) -> Vec<(&LiveTrackRecord, SectionPosition)> {
        self.records
            .values()
            .map(|record| {
                let position = SectionPosition {
                    section: record.section,
                    progress: record.progress_at(now, self.config.max_progress),
                };
                (record, position)
            })
            .collect()
    }

    /// Apply one poll of predictions for `railway`.
    ///
    /// Re-applying the same predictions at the same `now` leaves the records
    /// unchanged.
    pub fn update(
        &mut self,
        predictions: &[ArrivalPrediction],
        railway: &Railway,
        lookup: &StationLookup,
        now: f64,
    ) -> UpdateSummary {
        let mut summary = UpdateSummary::default();
        let mut indices: HashMap<&StationIdentifier, usize> = HashMap::new();
        for (index, station) in railway.stations.iter().enumerate() {
            indices.entry(station).or_insert(index);
        }

        let mut placements = Vec::new();
        for group in group_by_vehicle(predictions, now) {
            match self.estimate(&group, railway, &indices, lookup) {
                Some(estimate) => {
                    placements.push(self.place(&group, estimate, &railway.id, now));
                    summary.placed += 1;
                }
                None if self.preserve(&group, now) => {
                    debug!(vehicle = %group.key, "no unambiguous section, extrapolating");
                    summary.preserved += 1;
                }
                None => summary.dropped += 1,
            }
        }

        self.de_overlap(placements);
        summary.retired = self.retire_stale(now);
        summary
    }

    /// Remove records not updated within the staleness window
    pub fn retire_stale(&mut self, now: f64) -> usize {
        let stale_after = self.config.stale_after;
        let before = self.records.len();
        self.records
            .retain(|_, record| now - record.last_update < stale_after);
        let retired = before - self.records.len();
        if retired > 0 {
            debug!(retired, "stale live tracks retired");
        }
        retired
    }

    fn estimate(
        &self,
        group: &VehicleGroup<'_>,
        railway: &Railway,
        indices: &HashMap<&StationIdentifier, usize>,
        lookup: &StationLookup,
    ) -> Option<Estimate> {
        let config = &self.config;

        let mut resolved: Vec<StationPrediction> = group
            .predictions
            .iter()
            .filter_map(|(prediction, seconds)| {
                let station = lookup.resolve(prediction.naptan_id(), &prediction.station_name)?;
                Some(StationPrediction {
                    index: *indices.get(station)?,
                    station: station.clone(),
                    seconds: *seconds,
                    expected: prediction.expected_arrival_ms(),
                })
            })
            .collect();
        resolved.sort_by(|a, b| a.seconds.total_cmp(&b.seconds));

        let resolve_index = |name: &str| lookup.resolve_name(name).and_then(|id| indices.get(id).copied());
        let hint = group.location.map(parse_location).unwrap_or_default();
        let mut previous = hint.previous.and_then(resolve_index);
        let hinted_next = hint.next.and_then(resolve_index);

        let next = hinted_next
            .and_then(|index| resolved.iter().find(|p| p.index == index))
            .or_else(|| previous.and_then(|prev| resolved.iter().find(|p| p.index != prev)))
            .or_else(|| resolved.first())?;
        let next_offset = railway.offset_at(next.index)?;
        let following = resolved
            .iter()
            .find(|p| p.index != next.index && p.seconds >= next.seconds);

        let existing = self.records.get(&group.key);
        let step = match following.and_then(|f| railway.offset_at(f.index)) {
            Some(offset) if offset > next_offset => 1,
            Some(_) => -1,
            None => match group.direction {
                Some(d) if d.eq_ignore_ascii_case("outbound") => 1,
                Some(d) if d.eq_ignore_ascii_case("inbound") => -1,
                _ => existing.map_or(0, |record| record.section.length.signum()),
            },
        };

        if previous.is_none() && step != 0 {
            previous = railway.checked_index(next.index as isize - step);
        }
        if previous.is_none() {
            previous = existing.map(|record| record.section.index);
        }
        let previous = previous.filter(|&prev| prev != next.index)?;
        let previous_offset = railway.offset_at(previous)?;

        let segment = (next_offset - previous_offset).abs();
        let duration = if segment > 0.0 {
            let speed = following
                .filter(|f| f.seconds > next.seconds)
                .and_then(|f| {
                    let distance = (railway.offset_at(f.index)? - next_offset).abs();
                    let time = (f.seconds - next.seconds).max(1.0);
                    Some((distance / time).clamp(config.min_implied_speed, config.max_implied_speed))
                })
                .unwrap_or(config.default_speed);
            segment / speed
        } else {
            next.seconds * 2.0
        };
        let duration = duration.max(
            config
                .min_section_duration
                .max(next.seconds * config.arrival_margin),
        );
        if !duration.is_finite() || duration <= 0.0 {
            return None;
        }

        let progress =
            (1.0 - next.seconds.max(config.min_time_to_station) / duration).clamp(0.0, config.max_progress);

        Some(Estimate {
            section: Section::new(previous, next.index as isize - previous as isize),
            departure_station: railway.station_at(previous).cloned(),
            arrival_station: next.station.clone(),
            seconds: next.seconds,
            duration,
            progress,
            expected: next.expected,
        })
    }

    fn place(
        &mut self,
        group: &VehicleGroup<'_>,
        estimate: Estimate,
        railway: &RailwayIdentifier,
        now: f64,
    ) -> Placement {
        let config = &self.config;
        let existing = self.records.get(&group.key);

        let basis = match existing {
            // Same instant again: smooth against what the last update saw
            Some(record) if record.last_update == now && record.section == estimate.section => record.basis,
            Some(record) if record.last_update != now && record.section == estimate.section => {
                Some(record.current_basis())
            }
            _ => None,
        };

        let mut smoothed = estimate.progress;
        let mut floor = 0.0;
        if let Some(basis) = basis {
            let predicted = basis.extrapolate(now);
            floor = predicted.min(config.max_progress);
            if predicted > smoothed {
                smoothed = floor;
            } else if smoothed - predicted > config.max_forward_correction {
                smoothed = (predicted + config.max_forward_correction).min(config.max_progress);
            }
        }

        let arrives_at = estimate.expected.unwrap_or(now + estimate.seconds * 1000.0);
        let record = LiveTrackRecord {
            key: group.key.clone(),
            vehicle_id: group.vehicle_id.map_or_else(|| group.key.clone(), str::to_string),
            railway: railway.clone(),
            section: estimate.section,
            departure_station: estimate.departure_station,
            arrival_station: estimate.arrival_station,
            destination: group.destination.map(str::to_string),
            current_location: group.location.map(str::to_string),
            time_to_station: estimate.seconds,
            progress: smoothed,
            duration: estimate.duration,
            last_update: now,
            departed_at: arrives_at - estimate.duration * 1000.0,
            arrives_at,
            basis,
        };
        self.records.insert(group.key.clone(), record);

        Placement {
            key: group.key.clone(),
            section: estimate.section,
            seconds: estimate.seconds,
            smoothed,
            floor,
        }
    }

    /// Keep a known vehicle moving on dead reckoning
    fn preserve(&mut self, group: &VehicleGroup<'_>, now: f64) -> bool {
        let max_progress = self.config.max_progress;
        let Some(record) = self.records.get_mut(&group.key) else {
            return false;
        };
        if record.last_update != now {
            record.basis = Some(record.current_basis());
            record.progress = record.progress_at(now, max_progress);
            record.last_update = now;
        }
        if group.destination.is_some() {
            record.destination = group.destination.map(str::to_string);
        }
        if group.location.is_some() {
            record.current_location = group.location.map(str::to_string);
        }
        true
    }

    /// Spread vehicles that landed on the same section apart, nearest to
    /// arrival first. A vehicle only ever gives up progress it gained in this
    /// update, so its exposed progress stays monotonic.
    fn de_overlap(&mut self, mut placements: Vec<Placement>) {
        placements.sort_by(|a, b| {
            (a.section.index, a.section.length)
                .cmp(&(b.section.index, b.section.length))
                .then(a.seconds.total_cmp(&b.seconds))
                .then_with(|| a.key.cmp(&b.key))
        });

        let spacing = self.config.overlap_spacing;
        let max_progress = self.config.max_progress;
        for (_, group) in &placements.iter().chunk_by(|p| p.section) {
            for (rank, placement) in group.enumerate() {
                if let Some(record) = self.records.get_mut(&placement.key) {
                    record.progress = (placement.smoothed - rank as f64 * spacing)
                        .max(placement.floor)
                        .clamp(0.0, max_progress);
                }
            }
        }
    }
}

fn group_by_vehicle(predictions: &[ArrivalPrediction], now: f64) -> Vec<VehicleGroup<'_>> {
    let mut groups: Vec<VehicleGroup<'_>> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for prediction in predictions {
        let Some(seconds) = prediction.seconds_to_station(now) else {
            continue;
        };
        let key = prediction.vehicle_key();
        let index = *positions.entry(key.clone()).or_insert_with(|| {
            groups.push(VehicleGroup {
                key,
                vehicle_id: prediction.vehicle_id(),
                direction: prediction.direction.as_deref(),
                destination: prediction.destination(),
                location: None,
                predictions: Vec::new(),
            });
            groups.len() - 1
        });

        let group = &mut groups[index];
        if group.location.is_none() {
            group.location = prediction.location();
        }
        group.predictions.push((prediction, seconds));
    }
    groups
}
