//! Keeps a local copy of the shared parking status fresh by polling.
//!
//! A ticker fires every poll interval and starts a fetch unless one is still
//! in flight, in which case the tick is dropped rather than queued. Fetch
//! results land in a [`watch`] channel that presentation code observes.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use shared::domain::ParkingStatus;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{ClientError, StatusClient};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// What the presentation layer should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Loading,
    Success(ParkingStatus),
    Error(String),
}

impl SyncState {
    pub fn status(&self) -> Option<&ParkingStatus> {
        match self {
            Self::Success(status) => Some(status),
            _ => None,
        }
    }
}

struct Shared {
    client: StatusClient,
    state: watch::Sender<SyncState>,
    in_flight: AtomicBool,
    /// Only flipped inside the watch lock, so nothing publishes after teardown.
    active: AtomicBool,
}

impl Shared {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn spawn_poll(self: &Arc<Self>) -> bool {
        if !self.is_active() {
            return false;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("previous status fetch still in flight; skipping tick");
            return false;
        }

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let result = shared.client.fetch_status().await;
            shared.publish(result);
            shared.in_flight.store(false, Ordering::Release);
        });
        true
    }

    fn publish(&self, result: Result<ParkingStatus, ClientError>) {
        let next = match result {
            Ok(status) => SyncState::Success(status),
            Err(error) => {
                warn!(%error, "status fetch failed");
                SyncState::Error(error.to_string())
            }
        };
        let published = self.state.send_if_modified(|current| {
            if !self.active.load(Ordering::Acquire) {
                return false;
            }
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if !published && !self.is_active() {
            debug!("discarding status fetch that finished after teardown");
        }
    }

    fn deactivate(&self) {
        self.state.send_if_modified(|_| {
            self.active.store(false, Ordering::Release);
            false
        });
    }
}

/// A running poller. Dropping it stops polling.
pub struct SyncSession {
    shared: Arc<Shared>,
    ticker: JoinHandle<()>,
}

impl SyncSession {
    /// Starts polling immediately and then every `poll_interval`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(client: StatusClient, poll_interval: Duration) -> Self {
        let (state, _) = watch::channel(SyncState::Loading);
        let shared = Arc::new(Shared {
            client,
            state,
            in_flight: AtomicBool::new(false),
            active: AtomicBool::new(true),
        });
        let ticker = tokio::spawn(run_ticker(Arc::clone(&shared), poll_interval));
        info!(interval_ms = poll_interval.as_millis() as u64, "status polling started");
        Self { shared, ticker }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.shared.state.subscribe()
    }

    pub fn state(&self) -> SyncState {
        self.shared.state.borrow().clone()
    }

    /// Starts an extra fetch now. Returns `false` if one was already running.
    pub fn refresh_now(&self) -> bool {
        self.shared.spawn_poll()
    }

    /// Posts a new location once and reports whether the server accepted it.
    ///
    /// Failures are logged, not retried, and leave the displayed state alone
    /// until the next successful poll.
    pub async fn submit_location(&self, location: &str, user: &str) -> bool {
        match self.shared.client.submit_location(location, user).await {
            Ok(stored) => {
                info!(location = %stored.location, user = %stored.user, "location submitted");
                if self.shared.is_active() {
                    self.refresh_now();
                }
                true
            }
            Err(error) => {
                warn!(%error, "location submit failed");
                false
            }
        }
    }

    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.shared.deactivate();
        self.ticker.abort();
        debug!("status polling stopped");
    }
}

async fn run_ticker(shared: Arc<Shared>, poll_interval: Duration) {
    let mut ticker = time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if !shared.is_active() {
            break;
        }
        shared.spawn_poll();
    }
}

#[cfg(test)]
#[path = "tests/sync_tests.rs"]
mod tests;
