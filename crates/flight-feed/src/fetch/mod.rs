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

//! Bounded aircraft-state fetching.
//!
//! [`BoundedFetcher`] asks a [`StateSource`] for the aircraft inside a
//! bounding box and turns the answer into a [`Snapshot`]. The upstream box is
//! only a hint: every record is checked against the bounds again here, and
//! records without a position or on the ground are dropped.
//!
//! Transport, status and payload failures are logged and produce an empty
//! snapshot. Credential failures are returned as errors, since every later
//! request in the cycle would fail the same way.

mod opensky;

pub use opensky::{OpenSkySource, OPENSKY_STATES_URL};

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::CredentialError;
use crate::clock::Clock;
use crate::diff::Snapshot;
use crate::protocol::{Entity, ParseError, Position, StateVector};

/// Rectangle in degrees. Edges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl Bounds {
    /// Contiguous United States.
    pub const CONTINENTAL_US: Self = Self {
        north: 49.38,
        south: 24.52,
        east: -66.95,
        west: -125.0,
    };

    #[must_use]
    pub fn contains(&self, position: &Position) -> bool {
        position.latitude >= self.south
            && position.latitude <= self.north
            && position.longitude >= self.west
            && position.longitude <= self.east
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::CONTINENTAL_US
    }
}

/// Errors a [`StateSource`] can report.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Upstream provider of raw aircraft states.
#[async_trait]
pub trait StateSource: Send + Sync {
    /// Issue one request for the states inside `bounds`.
    async fn fetch_states(&self, bounds: &Bounds) -> Result<Vec<StateVector>, FetchError>;
}

/// Outcome bookkeeping kept beside the pipeline.
///
/// Failures never reach the pipeline, so this is where the application
/// learns that the current (empty) snapshot came from a failed fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub last_success_at: Option<DateTime<Utc>>,
    /// Entity count of the last successful snapshot.
    pub last_success_count: usize,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub total_fetches: u64,
}

/// Keep airborne, positioned records inside `bounds`.
pub fn filter_states(
    states: impl IntoIterator<Item = StateVector>,
    bounds: &Bounds,
    fetched_at: DateTime<Utc>,
) -> Snapshot {
    let entities = states
        .into_iter()
        .filter_map(Entity::from_state)
        .filter(|e| !e.grounded && bounds.contains(&e.position));
    Snapshot::from_entities(fetched_at, entities)
}

/// Fetches aircraft states and filters them into snapshots.
pub struct BoundedFetcher<S, C> {
    source: S,
    clock: C,
    stats: Mutex<FetchStats>,
}

impl<S, C> std::fmt::Debug for BoundedFetcher<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedFetcher")
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<S: StateSource, C: Clock> BoundedFetcher<S, C> {
    #[must_use]
    pub fn new(source: S, clock: C) -> Self {
        Self {
            source,
            clock,
            stats: Mutex::new(FetchStats::default()),
        }
    }

    /// Fetch one snapshot.
    ///
    /// Returns an empty snapshot on any non-credential failure.
    pub async fn fetch(&self, bounds: &Bounds) -> Result<Snapshot, CredentialError> {
        let result = self.source.fetch_states(bounds).await;
        let fetched_at = self.clock.now();

        match result {
            Ok(states) => {
                let total = states.len();
                let snapshot = filter_states(states, bounds, fetched_at);
                info!(
                    "Fetched {} aircraft ({} upstream records)",
                    snapshot.len(),
                    total
                );
                self.record_success(fetched_at, snapshot.len());
                Ok(snapshot)
            }
            Err(FetchError::Credentials(e)) => {
                error!("Flight fetch aborted, credential exchange failed: {e}");
                self.record_failure();
                Err(e)
            }
            Err(e) => {
                warn!("Flight fetch failed: {e}");
                self.record_failure();
                Ok(Snapshot::empty(fetched_at))
            }
        }
    }

    /// Copy of the current outcome counters.
    #[must_use]
    pub fn stats(&self) -> FetchStats {
        self.stats
            .lock()
            .expect("Fetch stats lock poisoned - unrecoverable state")
            .clone()
    }

    fn record_success(&self, at: DateTime<Utc>, count: usize) {
        let mut stats = self.stats.lock().expect("Fetch stats lock poisoned - unrecoverable state");
        stats.total_fetches += 1;
        stats.last_success_at = Some(at);
        stats.last_success_count = count;
        stats.consecutive_failures = 0;
    }

    fn record_failure(&self) {
        let mut stats = self.stats.lock().expect("Fetch stats lock poisoned - unrecoverable state");
        stats.total_fetches += 1;
        stats.total_failures += 1;
        stats.consecutive_failures = stats.consecutive_failures.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;

    enum Canned {
        States(Vec<StateVector>),
        Status(u16),
        Credentials,
    }

    struct CannedSource(Canned);

    #[async_trait]
    impl StateSource for CannedSource {
        async fn fetch_states(&self, _bounds: &Bounds) -> Result<Vec<StateVector>, FetchError> {
            match &self.0 {
                Canned::States(states) => Ok(states.clone()),
                Canned::Status(status) => Err(FetchError::Status {
                    status: *status,
                    body: String::new(),
                }),
                Canned::Credentials => Err(FetchError::Credentials(CredentialError::MissingToken)),
            }
        }
    }

    fn state(id: &str, lat: Option<f64>, lon: Option<f64>, on_ground: bool) -> StateVector {
        StateVector {
            icao24: id.to_string(),
            callsign: Some("TEST1".to_string()),
            origin_country: "United States".to_string(),
            longitude: lon,
            latitude: lat,
            baro_altitude: Some(9_000.0),
            on_ground,
            velocity: Some(220.0),
            true_track: Some(45.0),
            vertical_rate: Some(0.0),
        }
    }

    fn fetcher(canned: Canned) -> BoundedFetcher<CannedSource, Arc<ManualClock>> {
        BoundedFetcher::new(CannedSource(canned), Arc::new(ManualClock::new(Utc::now())))
    }

    #[test]
    fn test_bounds_edges_inclusive() {
        let bounds = Bounds::CONTINENTAL_US;
        let edge = Position {
            latitude: bounds.north,
            longitude: -100.0,
        };
        let beyond = Position {
            latitude: bounds.north + 1.0,
            longitude: -100.0,
        };
        let corner = Position {
            latitude: bounds.south,
            longitude: bounds.west,
        };
        assert!(bounds.contains(&edge));
        assert!(!bounds.contains(&beyond));
        assert!(bounds.contains(&corner));
    }

    #[tokio::test]
    async fn test_filters_records() {
        let north = Bounds::CONTINENTAL_US.north;
        let fetcher = fetcher(Canned::States(vec![
            state("edge", Some(north), Some(-100.0), false),
            state("beyond", Some(north + 1.0), Some(-100.0), false),
            state("grounded", Some(40.0), Some(-100.0), true),
            state("nolat", None, Some(-100.0), false),
            state("nolon", Some(40.0), None, false),
            state("europe", Some(51.5), Some(-0.1), false),
        ]));

        let snapshot = fetcher.fetch(&Bounds::CONTINENTAL_US).await.unwrap();

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get("edge").is_some());
        assert_eq!(fetcher.stats().last_success_count, 1);
    }

    #[tokio::test]
    async fn test_upstream_failure_yields_empty_snapshot() {
        let fetcher = fetcher(Canned::Status(503));

        let snapshot = fetcher.fetch(&Bounds::CONTINENTAL_US).await.unwrap();
        assert!(snapshot.is_empty());

        let stats = fetcher.stats();
        assert_eq!(stats.consecutive_failures, 1);
        assert_eq!(stats.total_failures, 1);
        assert!(stats.last_success_at.is_none());
    }

    #[tokio::test]
    async fn test_credential_failure_propagates() {
        let fetcher = fetcher(Canned::Credentials);

        let result = fetcher.fetch(&Bounds::CONTINENTAL_US).await;
        assert!(matches!(result, Err(CredentialError::MissingToken)));
        assert_eq!(fetcher.stats().consecutive_failures, 1);
    }
}
