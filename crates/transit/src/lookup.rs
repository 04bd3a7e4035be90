//! Station name resolution for live feeds.
//!
//! Feeds name stations loosely ("King's Cross St. Pancras Underground
//! Station", "Kings Cross St P", ...). Names are normalized into keys, and a
//! lookup falls back to prefix matching and then to trimming short trailing
//! tokens before giving up.

use std::collections::{BTreeSet, HashMap};

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::identifiers::StationIdentifier;
use crate::models::Station;

const STATION_SUFFIX: &str = "UNDERGROUND STATION";

/// Longest trailing token that may be dropped while retrying a match
const MAX_TRIMMED_TOKEN_LEN: usize = 2;

#[derive(Clone, Debug, Default)]
pub struct StationLookup {
    by_key: HashMap<String, StationIdentifier>,
    /// Normalized names eligible for prefix matching, ordered so ties resolve
    /// deterministically
    name_keys: BTreeSet<String>,
}

impl StationLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_stations<'a>(stations: impl IntoIterator<Item = &'a Station>) -> Self {
        let mut lookup = Self::new();
        for station in stations {
            lookup.insert(station);
        }
        lookup
    }

    /// Register a station under its normalized name and its NaPTAN code
    pub fn insert(&mut self, station: &Station) {
        let key = normalize_station_key(&station.name);
        if !key.is_empty() {
            self.by_key.insert(key.clone(), station.id.clone());
            self.name_keys.insert(key);
        }

        let code = station.naptan_code().to_uppercase();
        if !code.is_empty() {
            self.by_key.entry(code).or_insert_with(|| station.id.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.name_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.name_keys.is_empty()
    }

    /// Resolve a prediction's station, preferring its NaPTAN code
    pub fn resolve(&self, code: Option<&str>, name: &str) -> Option<&StationIdentifier> {
        code.filter(|c| !c.is_empty())
            .and_then(|c| self.by_key.get(&c.to_uppercase()))
            .or_else(|| self.resolve_name(name))
    }

    /// Resolve a free-text station name
    pub fn resolve_name(&self, name: &str) -> Option<&StationIdentifier> {
        let normalized = normalize_station_key(name);
        if normalized.is_empty() {
            return None;
        }
        if let Some(id) = self.by_key.get(&normalized) {
            return Some(id);
        }

        let mut tokens: Vec<&str> = normalized.split(' ').collect();
        loop {
            let key = tokens.join(" ");
            if let Some(id) = self.find_by_prefix(&key) {
                return Some(id);
            }

            // Retry by trimming trailing short tokens (handles truncations like "ST P")
            match tokens.last() {
                Some(last) if tokens.len() > 1 && last.len() <= MAX_TRIMMED_TOKEN_LEN => {
                    tokens.pop();
                }
                _ => return None,
            }
        }
    }

    fn find_by_prefix(&self, key: &str) -> Option<&StationIdentifier> {
        let mut best: Option<(&String, usize)> = None;
        for candidate in &self.name_keys {
            if candidate.starts_with(key) || key.starts_with(candidate.as_str()) {
                let delta = candidate.len().abs_diff(key.len());
                if best.map_or(true, |(_, best_delta)| delta < best_delta) {
                    best = Some((candidate, delta));
                }
            }
        }
        best.and_then(|(candidate, _)| self.by_key.get(candidate))
    }
}

/// Normalize a station name into a lookup key.
///
/// Folds accents ("Café" becomes "CAFE"), upper-cases, drops the
/// "Underground Station" suffix, spells out `&`, and collapses anything but
/// ASCII letters and digits into single spaces.
pub fn normalize_station_key(name: &str) -> String {
    let folded: String = name.nfd().filter(|c| !is_combining_mark(*c)).collect();
    let upper = folded.to_uppercase().replace(STATION_SUFFIX, "").replace('&', "AND");
    upper
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
