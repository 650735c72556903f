//! Polling fallback for data paths without a push channel
//!
//! A timer task fetches immediately and then once per interval. Ticks
//! are never skipped because an earlier fetch is still pending: requests
//! may overlap and the last resolved response wins. There is no request
//! cancellation or de-duplication.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, warn};

/// Point-in-time view of a polling loop.
#[derive(Clone, Debug)]
pub struct PollSnapshot<T> {
    /// Last successfully fetched value.
    pub last: Option<T>,
    /// Message of the most recent failed fetch; cleared on success.
    pub error: Option<String>,
    /// Fetches currently pending (overlap is allowed).
    pub in_flight: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub next_fetch_at: Option<DateTime<Utc>>,
}

impl<T> Default for PollSnapshot<T> {
    fn default() -> Self {
        Self {
            last: None,
            error: None,
            in_flight: 0,
            last_updated: None,
            next_fetch_at: None,
        }
    }
}

/// Timer-driven fetch loop exposing the same data shape as the push
/// channel consumers see: latest value plus freshness metadata.
pub struct Poller<T> {
    state: Arc<RwLock<PollSnapshot<T>>>,
    timer: JoinHandle<()>,
}

impl<T: Clone + Send + Sync + 'static> Poller<T> {
    /// Starts polling: one immediate fetch, then one per `every`.
    pub fn spawn<F, Fut, E>(every: Duration, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let state: Arc<RwLock<PollSnapshot<T>>> = Arc::new(RwLock::new(PollSnapshot::default()));

        let loop_state = state.clone();
        let timer = tokio::spawn(async move {
            let fetch = Arc::new(fetch);
            let mut ticker = interval(every);
            loop {
                // the first tick fires immediately
                ticker.tick().await;

                {
                    let mut s = loop_state.write();
                    s.in_flight += 1;
                    s.next_fetch_at =
                        chrono::Duration::from_std(every).ok().map(|d| Utc::now() + d);
                }

                let fetch = fetch.clone();
                let state = loop_state.clone();
                tokio::spawn(async move {
                    match fetch().await {
                        Ok(value) => {
                            let mut s = state.write();
                            s.in_flight = s.in_flight.saturating_sub(1);
                            s.last = Some(value);
                            s.error = None;
                            s.last_updated = Some(Utc::now());
                            debug!("poll fetch resolved");
                        }
                        Err(e) => {
                            warn!(error = %e, "poll fetch failed");
                            let mut s = state.write();
                            s.in_flight = s.in_flight.saturating_sub(1);
                            s.error = Some(e.to_string());
                        }
                    }
                });
            }
        });

        Self { state, timer }
    }

    pub fn snapshot(&self) -> PollSnapshot<T> {
        self.state.read().clone()
    }

    /// Clears the timer. In-flight fetches are not cancelled; their
    /// results still land in the snapshot.
    pub fn stop(&self) {
        self.timer.abort();
    }
}

impl<T> Drop for Poller<T> {
    fn drop(&mut self) {
        self.timer.abort();
    }
}
