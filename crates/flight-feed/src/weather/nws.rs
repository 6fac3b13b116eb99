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

//! National Weather Service observation lookup.
//!
//! Three chained requests: the grid point for the coordinate names its
//! observation-station collection, the first station in that collection is
//! the nearest, and that station's latest observation is the answer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{Observation, WeatherError, WeatherSource};
use crate::protocol::UNKNOWN_LABEL;
use crate::units::{celsius_to_fahrenheit, kph_to_mph, meters_to_km};

pub const NWS_API_URL: &str = "https://api.weather.gov";

#[derive(Debug, Deserialize)]
struct Feature<P> {
    properties: P,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PointProperties {
    observation_stations: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StationCollection {
    #[serde(default)]
    features: Vec<StationFeature>,
}

#[derive(Debug, Deserialize)]
struct StationFeature {
    id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct QuantitativeValue {
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObservationProperties {
    timestamp: Option<DateTime<Utc>>,
    text_description: Option<String>,
    station: Option<String>,
    #[serde(default)]
    temperature: QuantitativeValue,
    #[serde(default)]
    dewpoint: QuantitativeValue,
    #[serde(default)]
    wind_direction: QuantitativeValue,
    /// km/h
    #[serde(default)]
    wind_speed: QuantitativeValue,
    /// Pa
    #[serde(default)]
    barometric_pressure: QuantitativeValue,
    /// m
    #[serde(default)]
    visibility: QuantitativeValue,
    #[serde(default)]
    relative_humidity: QuantitativeValue,
}

impl ObservationProperties {
    fn into_observation(self) -> Observation {
        Observation {
            temperature_f: self.temperature.value.map(celsius_to_fahrenheit),
            description: self
                .text_description
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
            humidity: self.relative_humidity.value,
            wind_speed_mph: self.wind_speed.value.map(kph_to_mph),
            wind_direction: self.wind_direction.value,
            visibility_km: self.visibility.value.map(meters_to_km),
            pressure_pa: self.barometric_pressure.value,
            dewpoint_f: self.dewpoint.value.map(celsius_to_fahrenheit),
            station: self.station,
            observed_at: self.timestamp,
        }
    }
}

/// Weather source backed by `api.weather.gov`.
#[derive(Debug, Clone)]
pub struct NwsSource {
    http: reqwest::Client,
    base_url: String,
    user_agent: String,
}

impl NwsSource {
    /// NWS rejects requests without a `User-Agent`, so one is required here.
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: String, user_agent: String) -> Self {
        Self {
            http,
            base_url,
            user_agent,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, step: &'static str, url: &str) -> Result<T, WeatherError> {
        debug!("NWS {step} request: {url}");
        let response = self
            .http
            .get(url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .header(reqwest::header::ACCEPT, "application/geo+json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::Status {
                step,
                status: status.as_u16(),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl WeatherSource for NwsSource {
    async fn observation(&self, lat: f64, lon: f64) -> Result<Observation, WeatherError> {
        let points_url = format!("{}/points/{lat:.4},{lon:.4}", self.base_url);
        let point: Feature<PointProperties> = self.get_json("points", &points_url).await?;
        let stations_url = point
            .properties
            .observation_stations
            .ok_or(WeatherError::Malformed("points"))?;

        let stations: StationCollection = self.get_json("stations", &stations_url).await?;
        let station_id = stations
            .features
            .into_iter()
            .next()
            .and_then(|f| f.id)
            .ok_or(WeatherError::NoStation { lat, lon })?;

        let latest_url = format!("{station_id}/observations/latest");
        let latest: Feature<ObservationProperties> = self.get_json("observation", &latest_url).await?;

        Ok(latest.properties.into_observation())
    }
}
