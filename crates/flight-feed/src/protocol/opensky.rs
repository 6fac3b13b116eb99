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

//! OpenSky `states/all` payload parser.
//!
//! The response is a JSON object whose `states` member is either `null` or an
//! array of positional rows:
//!
//! ```text
//! [icao24, callsign, origin_country, time_position, last_contact,
//!  longitude, latitude, baro_altitude, on_ground, velocity,
//!  true_track, vertical_rate, ...]
//! ```

use log::debug;
use serde_json::Value;

use super::{ParseError, Protocol, StateVector};

const IDX_ICAO24: usize = 0;
const IDX_CALLSIGN: usize = 1;
const IDX_ORIGIN_COUNTRY: usize = 2;
const IDX_LONGITUDE: usize = 5;
const IDX_LATITUDE: usize = 6;
const IDX_BARO_ALTITUDE: usize = 7;
const IDX_ON_GROUND: usize = 8;
const IDX_VELOCITY: usize = 9;
const IDX_TRUE_TRACK: usize = 10;
const IDX_VERTICAL_RATE: usize = 11;

/// Parser for OpenSky state-vector responses.
#[derive(Debug, Default)]
pub struct OpenSkyParser;

impl OpenSkyParser {
    /// Create a new OpenSky parser.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Protocol for OpenSkyParser {
    type Record = StateVector;
    type Error = ParseError;

    fn parse(&mut self, input: &[u8]) -> Result<Vec<StateVector>, ParseError> {
        let body: Value = serde_json::from_slice(input)?;

        let states = body
            .as_object()
            .and_then(|obj| obj.get("states"))
            .ok_or(ParseError::MissingField("states"))?;

        let Some(rows) = states.as_array() else {
            // `"states": null` means nothing in the requested area
            return Ok(Vec::new());
        };

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match row.as_array().and_then(|fields| parse_row(fields)) {
                Some(record) => records.push(record),
                None => debug!("Skipping malformed state row: {row}"),
            }
        }

        Ok(records)
    }
}

fn parse_row(fields: &[Value]) -> Option<StateVector> {
    let icao24 = fields.get(IDX_ICAO24)?.as_str()?.to_string();

    let number = |idx: usize| fields.get(idx).and_then(Value::as_f64);

    Some(StateVector {
        icao24,
        callsign: fields
            .get(IDX_CALLSIGN)
            .and_then(Value::as_str)
            .map(str::to_string),
        origin_country: fields
            .get(IDX_ORIGIN_COUNTRY)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        longitude: number(IDX_LONGITUDE),
        latitude: number(IDX_LATITUDE),
        baro_altitude: number(IDX_BARO_ALTITUDE),
        on_ground: fields
            .get(IDX_ON_GROUND)
            .and_then(Value::as_bool)
            .unwrap_or(false),
        velocity: number(IDX_VELOCITY),
        true_track: number(IDX_TRUE_TRACK),
        vertical_rate: number(IDX_VERTICAL_RATE),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state_row() {
        let body = br#"{"time":1700000000,"states":[
            ["a1b2c3","UAL123  ","United States",1700000000,1700000000,-118.5,34.0,10668.0,false,231.5,270.0,-2.5,null,10972.8,"1200",false,0]
        ]}"#;
        let mut parser = OpenSkyParser::new();
        let records = parser.parse(body).unwrap();

        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.icao24, "a1b2c3");
        assert_eq!(rec.callsign.as_deref(), Some("UAL123  "));
        assert_eq!(rec.origin_country, "United States");
        assert_eq!(rec.latitude, Some(34.0));
        assert_eq!(rec.longitude, Some(-118.5));
        assert_eq!(rec.baro_altitude, Some(10_668.0));
        assert!(!rec.on_ground);
        assert_eq!(rec.vertical_rate, Some(-2.5));
    }

    #[test]
    fn test_parse_null_fields() {
        let body = br#"{"time":1,"states":[["abc123",null,"Canada",null,1,null,null,null,true,null,null,null]]}"#;
        let records = OpenSkyParser::new().parse(body).unwrap();

        assert_eq!(records.len(), 1);
        assert!(records[0].callsign.is_none());
        assert!(records[0].latitude.is_none());
        assert!(records[0].on_ground);
    }

    #[test]
    fn test_parse_null_states() {
        let records = OpenSkyParser::new().parse(br#"{"time":1,"states":null}"#).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_skips_row_without_id() {
        let body = br#"{"time":1,"states":[[null,"X","Y"],["def456","DAL9","United States"]]}"#;
        let records = OpenSkyParser::new().parse(body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].icao24, "def456");
    }

    #[test]
    fn test_missing_states_is_error() {
        let result = OpenSkyParser::new().parse(br#"{"time":1}"#);
        assert!(matches!(result, Err(ParseError::MissingField("states"))));
    }

    #[test]
    fn test_garbage_is_error() {
        let result = OpenSkyParser::new().parse(b"<html>rate limited</html>");
        assert!(matches!(result, Err(ParseError::InvalidFormat(_))));
    }
}
