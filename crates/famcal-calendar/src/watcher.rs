//! Debounced conflict checking for an event being edited.
//!
//! Every edit to the proposed slot calls [`ConflictWatcher::submit`]. Only
//! the latest submission is ever reported: a newer one cancels the pending
//! check, and a check that finishes after being superseded is dropped.

use std::sync::Arc;
use std::time::Duration;

use famcal_core::CalendarSettings;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::conflict::{ConflictDetector, ConflictQuery};
use crate::error::CalendarResult;
use crate::types::ConflictingEvent;

/// Result of one conflict check that was not superseded.
#[derive(Debug)]
pub struct ConflictCheckOutcome {
    pub query: ConflictQuery,
    pub result: CalendarResult<Vec<ConflictingEvent>>,
}

#[derive(Default)]
struct WatchState {
    generation: u64,
    token: Option<CancellationToken>,
}

pub struct ConflictWatcher {
    detector: ConflictDetector,
    debounce: Duration,
    state: Arc<Mutex<WatchState>>,
    tx: mpsc::UnboundedSender<ConflictCheckOutcome>,
}

impl ConflictWatcher {
    /// Create a watcher and the receiver its outcomes are published on.
    pub fn new(
        detector: ConflictDetector,
        debounce: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<ConflictCheckOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = Self {
            detector,
            debounce,
            state: Arc::new(Mutex::new(WatchState::default())),
            tx,
        };
        (watcher, rx)
    }

    /// Watcher using the configured `conflict_debounce_ms`.
    pub fn from_settings(
        detector: ConflictDetector,
        settings: &CalendarSettings,
    ) -> (Self, mpsc::UnboundedReceiver<ConflictCheckOutcome>) {
        Self::new(detector, Duration::from_millis(settings.conflict_debounce_ms))
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Schedule a check for `query`, superseding any earlier submission.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, query: ConflictQuery) -> JoinHandle<()> {
        let token = CancellationToken::new();
        let generation = {
            let mut state = self.state.lock();
            if let Some(previous) = state.token.replace(token.clone()) {
                previous.cancel();
            }
            state.generation += 1;
            state.generation
        };

        let detector = self.detector.clone();
        let debounce = self.debounce;
        let state = Arc::clone(&self.state);
        let tx = self.tx.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::trace!(generation, "Conflict check superseded during debounce");
                    return;
                }
                _ = tokio::time::sleep(debounce) => {}
            }

            let result = tokio::select! {
                _ = token.cancelled() => {
                    tracing::trace!(generation, "Conflict check superseded in flight");
                    return;
                }
                result = detector.check(&query) => result,
            };

            // Compare and publish under the lock so a newer submit cannot
            // slip in between.
            let state = state.lock();
            if state.generation != generation {
                return;
            }
            if tx.send(ConflictCheckOutcome { query, result }).is_err() {
                tracing::debug!("Conflict outcome receiver dropped");
            }
        })
    }

    /// Cancel whatever check is pending without scheduling a new one.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        if let Some(token) = state.token.take() {
            token.cancel();
            tracing::debug!("Pending conflict check cancelled");
        }
    }
}

impl Drop for ConflictWatcher {
    fn drop(&mut self) {
        if let Some(token) = self.state.lock().token.take() {
            token.cancel();
        }
    }
}
