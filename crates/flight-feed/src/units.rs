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

//! Unit conversions for feed values.
//!
//! The flight feed reports SI units and the weather feed reports metric
//! units; display values are US customary, rounded to whole numbers.

const FEET_PER_METER: f64 = 3.28084;
const KNOTS_PER_MPS: f64 = 1.94384;
const MPH_PER_KPH: f64 = 0.621_371;

#[must_use]
pub fn meters_to_feet(meters: f64) -> i64 {
    round_to_i64(meters * FEET_PER_METER)
}

#[must_use]
pub fn mps_to_knots(mps: f64) -> i64 {
    round_to_i64(mps * KNOTS_PER_MPS)
}

#[must_use]
pub fn celsius_to_fahrenheit(celsius: f64) -> i64 {
    round_to_i64(celsius * 9.0 / 5.0 + 32.0)
}

#[must_use]
pub fn kph_to_mph(kph: f64) -> i64 {
    round_to_i64(kph * MPH_PER_KPH)
}

/// Meters to kilometers, kept to one decimal place.
#[must_use]
pub fn meters_to_km(meters: f64) -> f64 {
    (meters / 100.0).round() / 10.0
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "feed values are far inside the i64 range"
)]
fn round_to_i64(value: f64) -> i64 {
    value.round() as i64
}
