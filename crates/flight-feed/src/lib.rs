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

//! Live aircraft feed pipeline.
//!
//! This library polls an aircraft-state API, reduces each response to a
//! snapshot, and hands a renderer the minimal add/update/remove operations
//! between what it last drew and what the feed reports now. The layers can be
//! used independently or composed together:
//!
//! - **Protocol layer**: OpenSky `states/all` parsing into [`Entity`] values
//! - **Auth layer**: OAuth client-credentials exchange behind a [`TokenCache`]
//! - **Fetch layer**: [`BoundedFetcher`] with bounding-box filtering
//! - **Diff layer**: [`SnapshotDiffer`] keeps the last applied snapshot
//! - **Scheduler**: [`UpdateScheduler`] throttles how often diffs materialize
//! - **Side services**: [`WeatherCache`], [`Classifier`] and [`IconCache`]
//!
//! # Quick Start
//!
//! Use [`FeedClient`] for full-stack operation:
//!
//! ```no_run
//! use std::sync::Arc;
//! use flight_feed::{BoundedFetcher, FeedClient, FeedConfig, FeedEvent, OpenSkySource, SystemClock};
//!
//! #[tokio::main]
//! async fn main() {
//!     let source = OpenSkySource::new(
//!         reqwest::Client::new(),
//!         flight_feed::fetch::OPENSKY_STATES_URL.to_string(),
//!     );
//!     let fetcher = Arc::new(BoundedFetcher::new(source, SystemClock));
//!     let mut client = FeedClient::spawn(fetcher, FeedConfig::default());
//!
//!     while let Some(event) = client.recv().await {
//!         if let FeedEvent::Batch(ops) = event {
//!             println!("{} marker changes, {} aircraft", ops.len(), client.aircraft_count());
//!         }
//!     }
//! }
//! ```
//!
//! # Using Individual Layers
//!
//! ## Protocol Layer Only
//!
//! ```
//! use flight_feed::protocol::{OpenSkyParser, Protocol};
//!
//! let mut parser = OpenSkyParser::new();
//! let body = br#"{"time": 0, "states": [["a1b2c3", "UAL123  ", "United States", 0, 0, -100.0, 40.0, 10000.0, false, 230.0, 90.0, 0.0]]}"#;
//! let states = parser.parse(body).unwrap();
//! assert_eq!(states[0].icao24, "a1b2c3");
//! ```
//!
//! ## Diff Layer Only
//!
//! ```
//! use chrono::Utc;
//! use flight_feed::diff::{Snapshot, SnapshotDiffer};
//!
//! let mut differ = SnapshotDiffer::new();
//! let ops = differ.advance(Snapshot::empty(Utc::now()));
//! assert!(ops.is_empty());
//! ```

pub mod auth;
pub mod classify;
pub mod clock;
pub mod diff;
pub mod fetch;
pub mod icon;
pub mod protocol;
pub mod scheduler;
pub mod units;
pub mod weather;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use auth::{ClientCredentialsExchange, CredentialError, TokenCache, TokenProvider};
pub use classify::{Classifier, ColorBucket};
pub use clock::{Clock, ManualClock, SystemClock};
pub use diff::{DiffOperation, Snapshot, SnapshotDiffer};
pub use fetch::{Bounds, BoundedFetcher, FetchStats, OpenSkySource, StateSource};
pub use icon::{IconCache, MarkerIcon};
pub use protocol::{Entity, Position, UNKNOWN_LABEL};
pub use scheduler::{ThrottleState, UpdateScheduler};
pub use weather::{NwsSource, Observation, WeatherCache};

/// Default time between fetch cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for the full-stack client.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Area to fetch.
    pub bounds: Bounds,
    /// Fixed period between fetch cycles.
    pub poll_interval: Duration,
    /// Minimum spacing between two emitted batches.
    pub render_interval: Duration,
    /// Channel buffer size for emitted events.
    pub buffer_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            bounds: Bounds::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            render_interval: scheduler::DEFAULT_RENDER_INTERVAL,
            buffer_size: 64,
        }
    }
}

/// Events emitted to the renderer.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Operations taking the renderer from the previous batch to the newest snapshot.
    Batch(Vec<DiffOperation>),
    /// A cycle was abandoned because credentials could not be obtained.
    CycleFailed(String),
}

/// Full-stack client that wires fetcher, throttle and differ together.
///
/// Each poll tick spawns its fetch as a separate task, so a slow request
/// delays only its own cycle. Snapshots pass through the throttle and are
/// diffed against the last applied snapshot when released, so coalesced
/// snapshots never lose an add or remove.
pub struct FeedClient {
    event_rx: mpsc::Receiver<FeedEvent>,
    differ: Arc<RwLock<SnapshotDiffer>>,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClient")
            .field("cancel_token", &self.cancel_token)
            .finish_non_exhaustive()
    }
}

impl FeedClient {
    /// Spawn the polling, throttling and diffing tasks.
    ///
    /// The first cycle starts immediately.
    #[must_use]
    pub fn spawn<S, C>(fetcher: Arc<BoundedFetcher<S, C>>, config: FeedConfig) -> Self
    where
        S: StateSource + 'static,
        C: Clock + 'static,
    {
        let (event_tx, event_rx) = mpsc::channel(config.buffer_size);
        let (fired_tx, fired_rx) = mpsc::channel(config.buffer_size);
        let differ = Arc::new(RwLock::new(SnapshotDiffer::new()));
        let cancel_token = CancellationToken::new();

        let scheduler = UpdateScheduler::spawn(config.render_interval, fired_tx);

        tokio::spawn(materialize_loop(
            fired_rx,
            event_tx.clone(),
            Arc::clone(&differ),
            cancel_token.clone(),
        ));

        tokio::spawn(poll_loop(
            fetcher,
            scheduler,
            event_tx,
            config,
            cancel_token.clone(),
        ));

        Self {
            event_rx,
            differ,
            cancel_token,
        }
    }

    /// Receive the next event.
    ///
    /// Returns `None` once the client has shut down.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.event_rx.recv().await
    }

    /// Number of aircraft in the applied snapshot.
    #[must_use]
    pub fn aircraft_count(&self) -> usize {
        self.differ.read().map(|d| d.current().len()).unwrap_or(0)
    }

    /// Look up an applied aircraft by callsign.
    #[must_use]
    pub fn find_by_label(&self, label: &str) -> Option<Entity> {
        self.differ
            .read()
            .ok()
            .and_then(|d| d.current().find_by_label(label).cloned())
    }

    /// Shut down the client.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

impl Drop for FeedClient {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Run a single fetch cycle and diff it against `differ`.
///
/// Used for one-shot runs where no throttling is wanted.
pub async fn run_cycle<S: StateSource, C: Clock>(
    fetcher: &BoundedFetcher<S, C>,
    differ: &mut SnapshotDiffer,
    bounds: &Bounds,
) -> Result<Vec<DiffOperation>, CredentialError> {
    let snapshot = fetcher.fetch(bounds).await?;
    Ok(differ.advance(snapshot))
}

async fn poll_loop<S, C>(
    fetcher: Arc<BoundedFetcher<S, C>>,
    scheduler: UpdateScheduler<Snapshot>,
    event_tx: mpsc::Sender<FeedEvent>,
    config: FeedConfig,
    cancel_token: CancellationToken,
) where
    S: StateSource + 'static,
    C: Clock + 'static,
{
    let mut interval = tokio::time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!(
        "Polling every {}s, rendering at most every {}ms",
        config.poll_interval.as_secs(),
        config.render_interval.as_millis()
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            () = cancel_token.cancelled() => {
                info!("Feed polling cancelled");
                scheduler.shutdown();
                return;
            }
        }

        let fetcher = Arc::clone(&fetcher);
        let scheduler = scheduler.clone();
        let event_tx = event_tx.clone();
        let bounds = config.bounds;

        tokio::spawn(async move {
            match fetcher.fetch(&bounds).await {
                Ok(snapshot) => {
                    if !scheduler.submit(snapshot) {
                        debug!("Update scheduler stopped, dropping snapshot");
                    }
                }
                Err(e) => {
                    error!("Fetch cycle failed: {e}");
                    let _ = event_tx.send(FeedEvent::CycleFailed(e.to_string())).await;
                }
            }
        });
    }
}

async fn materialize_loop(
    mut fired_rx: mpsc::Receiver<Snapshot>,
    event_tx: mpsc::Sender<FeedEvent>,
    differ: Arc<RwLock<SnapshotDiffer>>,
    cancel_token: CancellationToken,
) {
    loop {
        let snapshot = tokio::select! {
            received = fired_rx.recv() => match received {
                Some(snapshot) => snapshot,
                None => return,
            },
            () = cancel_token.cancelled() => return,
        };

        let ops = match differ.write() {
            Ok(mut differ) => differ.advance(snapshot),
            Err(_) => {
                error!("Differ lock poisoned, stopping feed");
                return;
            }
        };

        if ops.is_empty() {
            debug!("No marker changes this cycle");
            continue;
        }

        if event_tx.send(FeedEvent::Batch(ops)).await.is_err() {
            return;
        }
    }
}
