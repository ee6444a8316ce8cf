//! The reconciliation loop.
//!
//! The `Reconciler` owns the cache and the accessor and runs as a single
//! tokio task. It reacts to three events, one at a time:
//!
//! 1. **Cancellation** - stop, closing the notification stream
//! 2. **Poll tick** - fetch the remote state and publish it if it changed
//! 3. **Write request** - publish the requested value, then write it
//!
//! Invariant: the cache and the accessor are touched only from inside
//! `run`. Nothing outside the task can observe the cache except through the
//! values it publishes.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::accessor::RemoteAccessor;
use crate::error::StateError;
use crate::notifications::{hand_off, Delivery, Handoff};
use crate::value::{ObservedState, StateValue};

/// Signals that the loop observed cancellation mid-step.
struct Cancelled;

type Step = Result<(), Cancelled>;

pub(crate) struct Reconciler<T> {
    name: String,
    accessor: Box<dyn RemoteAccessor<T>>,
    cache: StateValue<T>,
    requests: mpsc::Receiver<Handoff<T>>,
    notifications: mpsc::Sender<Handoff<StateValue<T>>>,
    /// Set once the consumer dropped its stream; publishes become no-ops.
    consumer_gone: bool,
}

impl<T: ObservedState> Reconciler<T> {
    pub(crate) fn new(
        name: String,
        accessor: Box<dyn RemoteAccessor<T>>,
        initial: T,
        requests: mpsc::Receiver<Handoff<T>>,
        notifications: mpsc::Sender<Handoff<StateValue<T>>>,
    ) -> Self {
        Self {
            name,
            accessor,
            cache: StateValue::ok(initial),
            requests,
            notifications,
            consumer_gone: false,
        }
    }

    /// Run the loop until `cancel` fires.
    ///
    /// Consumes the reconciler; dropping it on exit closes the notification
    /// stream and fails any write request still waiting to be accepted.
    pub(crate) async fn run(
        mut self,
        cancel: CancellationToken,
        first_poll: Instant,
        poll_interval: Duration,
    ) {
        info!(
            observer = %self.name,
            poll_interval = ?poll_interval,
            "state observer starting"
        );

        let mut ticker = interval_at(first_poll, poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.poll(&cancel).await,
                Some(Handoff { item, ack }) = self.requests.recv() => {
                    // The caller only waits for acceptance, not for the write.
                    if ack.send(()).is_err() {
                        trace!(
                            observer = %self.name,
                            "write request abandoned before acceptance, dropping"
                        );
                        continue;
                    }
                    self.apply(item, &cancel).await
                }
            };

            if step.is_err() {
                break;
            }
        }

        info!(observer = %self.name, "state observer stopped");
    }

    /// Poll tick: reconcile the cache with the remote state.
    async fn poll(&mut self, cancel: &CancellationToken) -> Step {
        trace!(observer = %self.name, "polling remote state");

        let fetched = AssertUnwindSafe(self.accessor.get_state())
            .catch_unwind()
            .await;

        match fetched {
            Ok(Ok(remote)) => {
                if self.cache.holds(&remote) {
                    return Ok(());
                }
                debug!(observer = %self.name, state = ?remote, "remote state changed");
                self.cache = StateValue::ok(remote);
                self.publish(cancel).await
            }
            Ok(Err(e)) => self.record_error(StateError::fetch(&e), cancel).await,
            Err(panic_info) => {
                let panic_msg = extract_panic_message(&panic_info);
                error!(observer = %self.name, panic = %panic_msg, "accessor panicked while reading state");
                self.record_error(StateError::Panicked(panic_msg), cancel).await
            }
        }
    }

    /// Write request: commit optimistically, publish, then write.
    async fn apply(&mut self, requested: T, cancel: &CancellationToken) -> Step {
        if self.cache.holds(&requested) {
            trace!(observer = %self.name, "requested state already cached, ignoring");
            return Ok(());
        }

        debug!(observer = %self.name, state = ?requested, "applying requested state");
        self.cache = StateValue::ok(requested.clone());
        self.publish(cancel).await?;

        let written = AssertUnwindSafe(self.accessor.set_state(requested))
            .catch_unwind()
            .await;

        match written {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => self.record_error(StateError::write(&e), cancel).await,
            Err(panic_info) => {
                let panic_msg = extract_panic_message(&panic_info);
                error!(observer = %self.name, panic = %panic_msg, "accessor panicked while writing state");
                self.record_error(StateError::Panicked(panic_msg), cancel).await
            }
        }
    }

    /// Record an error state, publishing it only if it differs from the
    /// error already cached.
    async fn record_error(&mut self, error: StateError, cancel: &CancellationToken) -> Step {
        if self.cache.has_same_error(&error) {
            trace!(observer = %self.name, error = %error, "error unchanged, not republishing");
            return Ok(());
        }

        warn!(observer = %self.name, error = %error, "observer entered error state");
        self.cache = StateValue::failed(error);
        self.publish(cancel).await
    }

    /// Hand a copy of the cache to the consumer.
    async fn publish(&mut self, cancel: &CancellationToken) -> Step {
        if self.consumer_gone {
            return Ok(());
        }

        match hand_off(&self.notifications, self.cache.clone(), cancel).await {
            Delivery::Taken => Ok(()),
            Delivery::Closed => {
                debug!(observer = %self.name, "notification stream dropped, publishing stops");
                self.consumer_gone = true;
                Ok(())
            }
            Delivery::Cancelled => Err(Cancelled),
        }
    }
}

/// Deadline of the first poll, or `None` when `poll_interval` is too large
/// for the clock to schedule the first two polls.
pub(crate) fn first_poll(poll_interval: Duration) -> Option<Instant> {
    let first = Instant::now().checked_add(poll_interval)?;
    first.checked_add(poll_interval)?;
    Some(first)
}

/// Extract a human-readable message from a panic payload.
fn extract_panic_message(panic_info: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
