// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Protocol layer for aircraft-state payloads.
//!
//! Raw upstream records are decoded into [`StateVector`]s, which keep every
//! field optional exactly as the feed reports it. Validation and bounding
//! happen later, when a state vector is normalized into an [`Entity`].

mod opensky;

pub use opensky::OpenSkyParser;

use thiserror::Error;

use crate::units::{meters_to_feet, mps_to_knots};

/// Display value for an aircraft without a callsign.
pub const UNKNOWN_LABEL: &str = "N/A";

/// Errors that can occur during payload parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid payload: {0}")]
    InvalidFormat(#[from] serde_json::Error),

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// One aircraft record as reported by the upstream feed.
#[derive(Debug, Clone, PartialEq)]
pub struct StateVector {
    /// ICAO 24-bit address (hex string).
    pub icao24: String,
    /// Callsign, untrimmed.
    pub callsign: Option<String>,
    /// Country of registration.
    pub origin_country: String,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    /// Barometric altitude in meters.
    pub baro_altitude: Option<f64>,
    pub on_ground: bool,
    /// Ground speed in m/s.
    pub velocity: Option<f64>,
    /// True track in degrees (north = 0).
    pub true_track: Option<f64>,
    /// Vertical rate in m/s.
    pub vertical_rate: Option<f64>,
}

/// Geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// A tracked, airborne aircraft.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Stable id (ICAO 24-bit address).
    pub id: String,
    /// Trimmed callsign; `None` when the feed had none.
    pub label: Option<String>,
    /// Free-text origin country.
    pub origin_region: String,
    pub position: Position,
    /// Altitude in meters.
    pub altitude: Option<f64>,
    /// Ground speed in m/s.
    pub ground_speed: Option<f64>,
    /// Heading in degrees.
    pub heading: Option<f64>,
    /// Vertical rate in m/s.
    pub vertical_rate: Option<f64>,
    pub grounded: bool,
}

impl Entity {
    /// Normalize a raw record. Returns `None` when either coordinate is missing.
    #[must_use]
    pub fn from_state(state: StateVector) -> Option<Self> {
        let (Some(latitude), Some(longitude)) = (state.latitude, state.longitude) else {
            return None;
        };

        let label = state
            .callsign
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        Some(Self {
            id: state.icao24,
            label,
            origin_region: state.origin_country,
            position: Position {
                latitude,
                longitude,
            },
            altitude: state.baro_altitude,
            ground_speed: state.velocity,
            heading: state.true_track,
            vertical_rate: state.vertical_rate,
            grounded: state.on_ground,
        })
    }

    /// Callsign for display, or [`UNKNOWN_LABEL`].
    #[must_use]
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(UNKNOWN_LABEL)
    }

    #[must_use]
    pub fn altitude_ft(&self) -> Option<i64> {
        self.altitude.map(meters_to_feet)
    }

    #[must_use]
    pub fn ground_speed_kt(&self) -> Option<i64> {
        self.ground_speed.map(mps_to_knots)
    }

    /// Compare every field that affects how the entity is drawn.
    ///
    /// Floats are compared by bit pattern so NaN equals NaN and the
    /// comparison stays reflexive.
    #[must_use]
    pub fn render_eq(&self, other: &Self) -> bool {
        fn bits(v: Option<f64>) -> Option<u64> {
            v.map(f64::to_bits)
        }

        self.id == other.id
            && self.label == other.label
            && self.origin_region == other.origin_region
            && self.position.latitude.to_bits() == other.position.latitude.to_bits()
            && self.position.longitude.to_bits() == other.position.longitude.to_bits()
            && bits(self.altitude) == bits(other.altitude)
            && bits(self.ground_speed) == bits(other.ground_speed)
            && bits(self.heading) == bits(other.heading)
            && bits(self.vertical_rate) == bits(other.vertical_rate)
            && self.grounded == other.grounded
    }
}

/// Trait for payload parsers.
///
/// Implement this trait to support another aircraft-state feed format.
pub trait Protocol {
    /// The record type produced by this parser.
    type Record;
    /// The error type for parsing failures.
    type Error;

    /// Parse one response body into records.
    fn parse(&mut self, input: &[u8]) -> Result<Vec<Self::Record>, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(callsign: Option<&str>, lat: Option<f64>, lon: Option<f64>) -> StateVector {
        StateVector {
            icao24: "a1b2c3".to_string(),
            callsign: callsign.map(str::to_string),
            origin_country: "United States".to_string(),
            longitude: lon,
            latitude: lat,
            baro_altitude: Some(10_668.0),
            on_ground: false,
            velocity: Some(231.5),
            true_track: Some(270.0),
            vertical_rate: None,
        }
    }

    #[test]
    fn test_from_state_trims_callsign() {
        let entity = Entity::from_state(state(Some("UAL123  "), Some(34.0), Some(-118.5))).unwrap();
        assert_eq!(entity.label.as_deref(), Some("UAL123"));
        assert_eq!(entity.altitude_ft(), Some(35_000));
        assert_eq!(entity.ground_speed_kt(), Some(450));
    }

    #[test]
    fn test_blank_callsign_is_unknown() {
        let entity = Entity::from_state(state(Some("        "), Some(34.0), Some(-118.5))).unwrap();
        assert!(entity.label.is_none());
        assert_eq!(entity.display_label(), UNKNOWN_LABEL);
    }

    #[test]
    fn test_missing_coordinate_rejected() {
        assert!(Entity::from_state(state(None, None, Some(-118.5))).is_none());
        assert!(Entity::from_state(state(None, Some(34.0), None)).is_none());
    }

    #[test]
    fn test_render_eq_handles_nan() {
        let mut a = Entity::from_state(state(None, Some(34.0), Some(-118.5))).unwrap();
        a.heading = Some(f64::NAN);
        let b = a.clone();
        assert!(a.render_eq(&b));

        let mut c = a.clone();
        c.position.latitude = 34.0001;
        assert!(!a.render_eq(&c));
    }
}
