//! The public observer handle.
//!
//! A [`StateObserver`] is built around an accessor and an initial value,
//! started once, and then fed write requests. The reconciliation itself
//! happens in a background task; this handle only talks to it through the
//! request channel.

use std::any::{type_name, Any};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::accessor::RemoteAccessor;
use crate::config::ObserverConfig;
use crate::error::ObserverError;
use crate::notifications::{rendezvous, Handoff, Notifications};
use crate::reconciler::{first_poll, Reconciler};
use crate::value::{ObservedState, StateValue};

/// Keeps a cached copy of one remote object's state reconciled.
///
/// # Example
///
/// ```ignore
/// let cancel = CancellationToken::new();
/// let mut observer = StateObserver::new(Thermostat::connect(addr), Setpoint(20));
/// let mut changes = observer.start(cancel.child_token(), Duration::from_secs(5))?;
///
/// tokio::spawn(async move {
///     while let Some(state) = changes.recv().await {
///         tracing::info!(?state, "thermostat changed");
///     }
/// });
///
/// // Returns once the loop accepted the value; the write happens afterwards.
/// observer.request_state(Setpoint(22)).await?;
/// ```
pub struct StateObserver<T> {
    requests: mpsc::Sender<Handoff<T>>,
    /// Present until `start` hands the loop to the background task.
    pending: Option<(Reconciler<T>, mpsc::Receiver<Handoff<StateValue<T>>>)>,
    handle: Option<JoinHandle<()>>,
    /// Interval used by [`start_configured`](Self::start_configured).
    poll_interval: Duration,
}

impl<T: ObservedState> StateObserver<T> {
    /// Create an observer with the default configuration.
    ///
    /// No I/O happens until [`start`](Self::start).
    pub fn new<A>(accessor: A, initial: T) -> Self
    where
        A: RemoteAccessor<T>,
    {
        Self::with_config(accessor, initial, ObserverConfig::default())
    }

    /// Create an observer with a custom configuration.
    pub fn with_config<A>(accessor: A, initial: T, config: ObserverConfig) -> Self
    where
        A: RemoteAccessor<T>,
    {
        let (requests, request_rx) = rendezvous();
        let (notify_tx, notify_rx) = rendezvous();

        Self {
            requests,
            pending: Some((
                Reconciler::new(config.name, Box::new(accessor), initial, request_rx, notify_tx),
                notify_rx,
            )),
            handle: None,
            poll_interval: config.poll_interval,
        }
    }

    /// Start reconciling in the background.
    ///
    /// Spawns the loop on the current tokio runtime and returns the stream
    /// of state changes immediately. The loop runs until `cancel` fires, at
    /// which point the stream ends.
    ///
    /// An observer can only be started once. The first poll happens one
    /// `poll_interval` after the call.
    pub fn start(
        &mut self,
        cancel: CancellationToken,
        poll_interval: Duration,
    ) -> Result<Notifications<T>, ObserverError> {
        if poll_interval.is_zero() {
            return Err(ObserverError::ZeroPollInterval);
        }
        let first = first_poll(poll_interval)
            .ok_or(ObserverError::PollIntervalTooLarge(poll_interval))?;
        let (reconciler, receiver) = self
            .pending
            .take()
            .ok_or(ObserverError::AlreadyStarted)?;

        let notifications = Notifications::new(receiver, cancel.clone());
        self.handle = Some(tokio::spawn(reconciler.run(cancel, first, poll_interval)));
        Ok(notifications)
    }

    /// [`start`](Self::start) with the poll interval from the observer's
    /// [`ObserverConfig`].
    pub fn start_configured(
        &mut self,
        cancel: CancellationToken,
    ) -> Result<Notifications<T>, ObserverError> {
        self.start(cancel, self.poll_interval)
    }

    /// Ask the observer to move the remote object to `value`.
    ///
    /// Waits until the loop accepts the request, then returns. Acceptance is
    /// not confirmation: the loop publishes `value`, then writes it, and any
    /// write failure shows up later on the notification stream. A value equal
    /// to the cached one is accepted and ignored.
    ///
    /// Fails with [`ObserverError::Stopped`] once the loop has terminated.
    pub async fn request_state(&self, value: T) -> Result<(), ObserverError> {
        let (ack, accepted) = oneshot::channel();
        self.requests
            .send(Handoff { item: value, ack })
            .await
            .map_err(|_| ObserverError::Stopped)?;
        accepted.await.map_err(|_| ObserverError::Stopped)
    }

    /// Type-erased variant of [`request_state`](Self::request_state).
    ///
    /// Checks the runtime type of `value` first and fails with
    /// [`ObserverError::TypeMismatch`] without touching the loop when it is
    /// not `T`.
    pub async fn request_any<V>(&self, value: V) -> Result<(), ObserverError>
    where
        V: Any + Send,
    {
        let boxed: Box<dyn Any + Send> = Box::new(value);
        match boxed.downcast::<T>() {
            Ok(value) => self.request_state(*value).await,
            Err(_) => {
                debug!(
                    expected = type_name::<T>(),
                    actual = type_name::<V>(),
                    "rejecting write request of the wrong type"
                );
                Err(ObserverError::TypeMismatch {
                    expected: type_name::<T>(),
                    actual: type_name::<V>(),
                })
            }
        }
    }

    /// Whether the loop has been started.
    pub fn is_started(&self) -> bool {
        self.pending.is_none()
    }

    /// Whether the loop has been started and has since terminated.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_some_and(JoinHandle::is_finished)
    }
}

impl<T> std::fmt::Debug for StateObserver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateObserver")
            .field("started", &self.pending.is_none())
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
