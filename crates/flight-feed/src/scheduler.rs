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

//! Leading + trailing throttle for marker updates.
//!
//! [`ThrottleState`] is the pure state machine: the first call in a quiet
//! period fires at once, later calls inside the interval collapse into one
//! deferred call at the end of the interval carrying the newest payload.
//! [`UpdateScheduler`] drives it from a background task.

use std::time::Duration;

use log::{debug, info};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// Minimum spacing between two materialized updates.
pub const DEFAULT_RENDER_INTERVAL: Duration = Duration::from_millis(500);

/// Outcome of [`ThrottleState::call`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Throttle<T> {
    /// Run now with this payload.
    Fire(T),
    /// Stored; will be released by [`ThrottleState::poll`] at this instant.
    Deferred(Instant),
}

#[derive(Debug)]
struct Pending<T> {
    payload: T,
    due: Instant,
}

/// Idle → Pending → Idle throttle state.
#[derive(Debug)]
pub struct ThrottleState<T> {
    interval: Duration,
    last_fire: Option<Instant>,
    pending: Option<Pending<T>>,
}

impl<T> ThrottleState<T> {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fire: None,
            pending: None,
        }
    }

    pub fn call(&mut self, now: Instant, payload: T) -> Throttle<T> {
        if let Some(pending) = &mut self.pending {
            pending.payload = payload;
            return Throttle::Deferred(pending.due);
        }

        match self.last_fire {
            Some(last) if now < last + self.interval => {
                let due = last + self.interval;
                self.pending = Some(Pending { payload, due });
                Throttle::Deferred(due)
            }
            _ => {
                self.last_fire = Some(now);
                Throttle::Fire(payload)
            }
        }
    }

    /// Release the pending payload once its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some(pending) if now >= pending.due => {
                self.last_fire = Some(now);
                self.pending.take().map(|p| p.payload)
            }
            _ => None,
        }
    }

    /// Deadline of the pending call, if any.
    #[must_use]
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.due)
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Handle to a throttle running in a background task.
///
/// Payloads go in through [`submit`](Self::submit); throttled payloads come
/// out on the channel passed to [`spawn`](Self::spawn). Dropping every handle
/// flushes the pending payload, if any, and ends the task.
#[derive(Debug, Clone)]
pub struct UpdateScheduler<T> {
    input_tx: mpsc::UnboundedSender<T>,
    cancel_token: CancellationToken,
}

impl<T: Send + 'static> UpdateScheduler<T> {
    #[must_use]
    pub fn spawn(interval: Duration, output: mpsc::Sender<T>) -> Self {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();

        let task_cancel = cancel_token.clone();
        tokio::spawn(async move {
            throttle_loop(input_rx, output, task_cancel, interval).await;
        });

        Self {
            input_tx,
            cancel_token,
        }
    }

    /// Queue a payload. Returns `false` once the task has stopped.
    pub fn submit(&self, payload: T) -> bool {
        self.input_tx.send(payload).is_ok()
    }

    /// Stop the task without flushing.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

async fn throttle_loop<T>(
    mut input_rx: mpsc::UnboundedReceiver<T>,
    output: mpsc::Sender<T>,
    cancel_token: CancellationToken,
    interval: Duration,
) {
    let mut state = ThrottleState::new(interval);

    loop {
        let due = state.next_due();

        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Update scheduler cancelled");
                return;
            }

            received = input_rx.recv() => {
                let Some(payload) = received else {
                    if let Some(due) = due {
                        sleep_until(due).await;
                        if let Some(payload) = state.poll(Instant::now()) {
                            let _ = output.send(payload).await;
                        }
                    }
                    debug!("Update scheduler inputs closed");
                    return;
                };

                match state.call(Instant::now(), payload) {
                    Throttle::Fire(payload) => {
                        if output.send(payload).await.is_err() {
                            return;
                        }
                    }
                    Throttle::Deferred(_) => debug!("Update coalesced"),
                }
            }

            () = sleep_until(due.unwrap_or_else(Instant::now)), if due.is_some() => {
                if let Some(payload) = state.poll(Instant::now()) {
                    if output.send(payload).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(500);

    #[test]
    fn test_burst_yields_leading_and_trailing() {
        let start = Instant::now();
        let mut state = ThrottleState::new(INTERVAL);
        let mut fired = Vec::new();

        for i in 0..5_u64 {
            let now = start + Duration::from_millis(i * 25);
            if let Throttle::Fire(payload) = state.call(now, i) {
                fired.push(payload);
            }
        }

        assert_eq!(state.poll(start + Duration::from_millis(499)), None);
        fired.extend(state.poll(start + INTERVAL));
        fired.extend(state.poll(start + Duration::from_millis(900)));

        assert_eq!(fired, vec![0, 4]);
        assert!(!state.is_pending());
    }

    #[test]
    fn test_quiet_period_fires_immediately() {
        let start = Instant::now();
        let mut state = ThrottleState::new(INTERVAL);

        assert_eq!(state.call(start, 1), Throttle::Fire(1));
        assert_eq!(
            state.call(start + Duration::from_millis(600), 2),
            Throttle::Fire(2)
        );
    }

    #[test]
    fn test_trailing_fire_restarts_interval() {
        let start = Instant::now();
        let mut state = ThrottleState::new(INTERVAL);

        state.call(start, 1);
        state.call(start + Duration::from_millis(100), 2);
        assert_eq!(state.poll(start + INTERVAL), Some(2));

        let next = state.call(start + Duration::from_millis(600), 3);
        assert_eq!(next, Throttle::Deferred(start + Duration::from_millis(1000)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_coalesces_burst() {
        let (tx, mut rx) = mpsc::channel(8);
        let scheduler = UpdateScheduler::spawn(INTERVAL, tx);
        let start = Instant::now();

        for i in 0..5_u32 {
            assert!(scheduler.submit(i));
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        assert_eq!(rx.recv().await, Some(0));
        assert_eq!(rx.recv().await, Some(4));
        assert!(Instant::now() - start >= INTERVAL);

        let quiet = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert!(quiet.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_flushes_pending() {
        let (tx, mut rx) = mpsc::channel(8);
        let scheduler = UpdateScheduler::spawn(INTERVAL, tx);

        scheduler.submit("first");
        scheduler.submit("second");
        scheduler.submit("third");
        drop(scheduler);

        assert_eq!(rx.recv().await, Some("first"));
        assert_eq!(rx.recv().await, Some("third"));
        assert_eq!(rx.recv().await, None);
    }
}
