//! Station reference data.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BikeResult, BikeshareError};

/// Operator-assigned station identifier (e.g. "1", "129", "25b").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(String);

impl StationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Validate the textual form of an identifier from a query string.
    pub fn parse(value: &str) -> BikeResult<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(BikeshareError::invalid("station_id", "must not be empty"));
        }
        let well_formed = trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if trimmed.len() > 32 || !well_formed {
            return Err(BikeshareError::invalid(
                "station_id",
                format!("'{}' is not a valid station identifier", trimmed),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A docking station with its most recent name and position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub station_id: StationId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// In-memory station catalog, loaded once from the snapshot.
///
/// Request validation resolves station identifiers here so unknown stations
/// are rejected without touching the data store.
#[derive(Debug, Clone, Default)]
pub struct StationDirectory {
    stations: BTreeMap<StationId, Station>,
}

impl StationDirectory {
    pub fn new(stations: impl IntoIterator<Item = Station>) -> Self {
        Self {
            stations: stations
                .into_iter()
                .map(|s| (s.station_id.clone(), s))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Stations ordered by identifier.
    pub fn all(&self) -> Vec<Station> {
        self.stations.values().cloned().collect()
    }

    /// Parse and resolve a station identifier from a query value.
    pub fn resolve(&self, value: &str) -> BikeResult<StationId> {
        let id = StationId::parse(value)?;
        if self.stations.contains_key(&id) {
            Ok(id)
        } else {
            Err(BikeshareError::UnknownStation(id.0))
        }
    }

    /// Resolve an optional query value; blank values mean "no filter".
    pub fn resolve_optional(&self, value: Option<&str>) -> BikeResult<Option<StationId>> {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => self.resolve(v).map(Some),
            None => Ok(None),
        }
    }
}
