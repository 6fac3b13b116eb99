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

//! Weather observations near a selected aircraft.
//!
//! [`WeatherCache`] rounds coordinates to a 0.01° grid so nearby lookups
//! share one upstream round-trip. Entries live for a fixed TTL and are
//! evicted when a read finds them expired. Failed lookups are logged and
//! answered with `None`; nothing is cached for them, so the next call
//! retries immediately.

mod nws;

pub use nws::{NwsSource, NWS_API_URL};

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde::Serialize;
use thiserror::Error;

use crate::clock::Clock;

/// How long an observation is served from the cache.
pub const DEFAULT_WEATHER_TTL_SECS: i64 = 600;

/// Errors from the three-step weather lookup.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("weather request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{step} returned {status}")]
    Status { step: &'static str, status: u16 },

    #[error("no observation station near {lat:.4},{lon:.4}")]
    NoStation { lat: f64, lon: f64 },

    #[error("unexpected {0} response")]
    Malformed(&'static str),
}

/// Latest surface observation, already converted to display units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub temperature_f: Option<i64>,
    pub description: String,
    /// Relative humidity in percent.
    pub humidity: Option<f64>,
    pub wind_speed_mph: Option<i64>,
    /// Wind direction in degrees.
    pub wind_direction: Option<f64>,
    pub visibility_km: Option<f64>,
    /// Barometric pressure in pascals.
    pub pressure_pa: Option<f64>,
    pub dewpoint_f: Option<i64>,
    /// Station URL.
    pub station: Option<String>,
    pub observed_at: Option<DateTime<Utc>>,
}

/// Upstream provider of observations.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn observation(&self, lat: f64, lon: f64) -> Result<Observation, WeatherError>;
}

/// Cache key: coordinates in hundredths of a degree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridKey {
    lat: i32,
    lon: i32,
}

impl GridKey {
    #[must_use]
    pub fn quantize(lat: f64, lon: f64) -> Self {
        Self {
            lat: hundredths(lat),
            lon: hundredths(lon),
        }
    }
}

impl std::fmt::Display for GridKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.2},{:.2}",
            f64::from(self.lat) / 100.0,
            f64::from(self.lon) / 100.0
        )
    }
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "latitudes and longitudes times 100 fit easily in i32"
)]
fn hundredths(degrees: f64) -> i32 {
    (degrees * 100.0).round() as i32
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Observation,
    expires_at: DateTime<Utc>,
}

/// TTL cache of observations keyed by [`GridKey`].
pub struct WeatherCache<S, C> {
    source: S,
    clock: C,
    ttl: Duration,
    entries: Mutex<HashMap<GridKey, CacheEntry>>,
}

impl<S, C> std::fmt::Debug for WeatherCache<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl<S: WeatherSource, C: Clock> WeatherCache<S, C> {
    #[must_use]
    pub fn new(source: S, clock: C) -> Self {
        Self::with_ttl(source, clock, Duration::seconds(DEFAULT_WEATHER_TTL_SECS))
    }

    #[must_use]
    pub fn with_ttl(source: S, clock: C, ttl: Duration) -> Self {
        Self {
            source,
            clock,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Observation near `(lat, lon)`, or `None` if the lookup failed.
    pub async fn get(&self, lat: f64, lon: f64) -> Option<Observation> {
        let key = GridKey::quantize(lat, lon);

        if let Some(hit) = self.lookup(key) {
            debug!("Weather cache hit for {key}");
            return Some(hit);
        }

        // The lock is not held across the request; concurrent misses for one
        // key may both go upstream and the last write wins.
        match self.source.observation(lat, lon).await {
            Ok(observation) => {
                let expires_at = self.clock.now() + self.ttl;
                self.entries
                    .lock()
                    .expect("Weather cache lock poisoned - unrecoverable state")
                    .insert(
                        key,
                        CacheEntry {
                            value: observation.clone(),
                            expires_at,
                        },
                    );
                Some(observation)
            }
            Err(e) => {
                warn!("Weather lookup for {key} failed: {e}");
                None
            }
        }
    }

    /// Number of stored entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("Weather cache lock poisoned - unrecoverable state")
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let now = self.clock.now();
        self.entries
            .lock()
            .expect("Weather cache lock poisoned - unrecoverable state")
            .retain(|_, entry| now < entry.expires_at);
    }

    fn lookup(&self, key: GridKey) -> Option<Observation> {
        let now = self.clock.now();
        let mut entries = self
            .entries
            .lock()
            .expect("Weather cache lock poisoned - unrecoverable state");

        match entries.get(&key) {
            Some(entry) if now < entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;

    #[derive(Default)]
    struct FakeSource {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl WeatherSource for Arc<FakeSource> {
        async fn observation(&self, _lat: f64, _lon: f64) -> Result<Observation, WeatherError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(WeatherError::Status {
                    step: "points",
                    status: 404,
                });
            }
            Ok(Observation {
                temperature_f: Some(72),
                description: "Clear".to_string(),
                humidity: Some(40.0),
                wind_speed_mph: Some(10),
                wind_direction: Some(270.0),
                visibility_km: Some(16.1),
                pressure_pa: Some(101_325.0),
                dewpoint_f: Some(45),
                station: None,
                observed_at: None,
            })
        }
    }

    fn setup(fail: bool) -> (WeatherCache<Arc<FakeSource>, ManualClock>, Arc<FakeSource>, ManualClock) {
        let source = Arc::new(FakeSource {
            fail,
            ..Default::default()
        });
        let clock = ManualClock::new(Utc::now());
        let cache = WeatherCache::new(Arc::clone(&source), clock.clone());
        (cache, source, clock)
    }

    #[test]
    fn test_quantization_shares_key() {
        assert_eq!(GridKey::quantize(40.001, -75.001), GridKey::quantize(40.004, -74.999));
        assert_ne!(GridKey::quantize(40.001, -75.001), GridKey::quantize(40.006, -75.001));
        assert_eq!(GridKey::quantize(40.001, -75.001).to_string(), "40.00,-75.00");
    }

    #[tokio::test]
    async fn test_nearby_lookup_hits_cache() {
        let (cache, source, clock) = setup(false);

        assert!(cache.get(40.001, -75.001).await.is_some());
        clock.advance(Duration::minutes(5));
        assert!(cache.get(40.004, -74.999).await.is_some());

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_refetched() {
        let (cache, source, clock) = setup(false);

        cache.get(40.0, -75.0).await;
        clock.advance(Duration::seconds(DEFAULT_WEATHER_TTL_SECS));
        cache.get(40.0, -75.0).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_not_cached() {
        let (cache, source, _clock) = setup(true);

        assert!(cache.get(40.0, -75.0).await.is_none());
        assert!(cache.get(40.0, -75.0).await.is_none());

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (cache, _source, clock) = setup(false);

        cache.get(40.0, -75.0).await;
        clock.advance(Duration::minutes(6));
        cache.get(41.0, -75.0).await;
        clock.advance(Duration::minutes(5));

        cache.purge_expired();
        assert_eq!(cache.len(), 1);
    }
}
