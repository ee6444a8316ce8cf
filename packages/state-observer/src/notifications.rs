//! Rendezvous channels between the loop and the outside world.
//!
//! # Guarantees
//!
//! - **Hand-off, not buffering**: a publish completes only once a consumer has
//!   taken the value; a write request completes only once the loop has
//!   dequeued it
//! - **Ordered**: values arrive in the order the loop produced them
//! - **Finite**: the stream ends when the loop stops and never restarts
//!
//! tokio has no zero-capacity channel, so each item travels through an
//! `mpsc` channel of capacity one together with a `oneshot` acknowledgement.
//! The sending side waits for the acknowledgement. The receiving side shares
//! the loop's cancellation token and refuses to acknowledge once it has
//! fired, so an item still sitting in the buffer at cancellation is dropped
//! and never surfaces.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::value::StateValue;

/// An item plus the acknowledgement its sender is waiting on.
pub(crate) struct Handoff<V> {
    pub(crate) item: V,
    pub(crate) ack: oneshot::Sender<()>,
}

/// Create a rendezvous pair.
pub(crate) fn rendezvous<V>() -> (mpsc::Sender<Handoff<V>>, mpsc::Receiver<Handoff<V>>) {
    mpsc::channel(1)
}

/// Outcome of handing an item to the other side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// The counterpart took the item.
    Taken,
    /// The counterpart is gone; the item was dropped.
    Closed,
    /// Cancellation fired before the counterpart took the item.
    Cancelled,
}

/// Hand `item` over and wait until it has been taken.
///
/// Gives up as soon as `cancel` fires.
pub(crate) async fn hand_off<V>(
    sender: &mpsc::Sender<Handoff<V>>,
    item: V,
    cancel: &CancellationToken,
) -> Delivery {
    let (ack, taken) = oneshot::channel();

    tokio::select! {
        biased;
        _ = cancel.cancelled() => return Delivery::Cancelled,
        sent = sender.send(Handoff { item, ack }) => {
            if sent.is_err() {
                return Delivery::Closed;
            }
        }
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Delivery::Cancelled,
        acked = taken => match acked {
            Ok(()) => Delivery::Taken,
            Err(_) => Delivery::Closed,
        },
    }
}

/// Stream of state changes produced by a running observer.
///
/// Yields every change to the observer's cache exactly once, in order.
/// Returns `None` once the observer has stopped.
///
/// # Example
///
/// ```ignore
/// let mut changes = observer.start(cancel.child_token(), Duration::from_secs(1))?;
/// while let Some(state) = changes.recv().await {
///     match state.error() {
///         Some(e) => tracing::warn!(error = %e, "device unreachable"),
///         None => render(state.value()),
///     }
/// }
/// ```
pub struct Notifications<T> {
    receiver: mpsc::Receiver<Handoff<StateValue<T>>>,
    /// The loop's token; nothing is acknowledged after it fires.
    cancel: CancellationToken,
}

impl<T> Notifications<T> {
    pub(crate) fn new(
        receiver: mpsc::Receiver<Handoff<StateValue<T>>>,
        cancel: CancellationToken,
    ) -> Self {
        Self { receiver, cancel }
    }

    /// Wait for the next state change.
    pub async fn recv(&mut self) -> Option<StateValue<T>> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            let handoff = self.receiver.recv().await?;
            if let Some(item) = self.accept(handoff) {
                return Some(item);
            }
        }
    }

    /// Acknowledge `handoff` unless the observer was cancelled or its sender
    /// gave up.
    fn accept(&self, handoff: Handoff<StateValue<T>>) -> Option<StateValue<T>> {
        let Handoff { item, ack } = handoff;
        if self.cancel.is_cancelled() {
            trace!("discarding notification published before cancellation");
            return None;
        }
        if ack.send(()).is_err() {
            trace!("discarding notification abandoned by a stopped observer");
            return None;
        }
        Some(item)
    }
}

impl<T> Stream for Notifications<T> {
    type Item = StateValue<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if self.cancel.is_cancelled() {
                return Poll::Ready(None);
            }
            match self.receiver.poll_recv(cx) {
                Poll::Ready(Some(handoff)) => {
                    if let Some(item) = self.accept(handoff) {
                        return Poll::Ready(Some(item));
                    }
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<T> std::fmt::Debug for Notifications<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifications")
            .field("closed", &self.receiver.is_closed())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_hand_off_waits_for_consumer() {
        let (tx, rx) = rendezvous::<StateValue<u32>>();
        let cancel = CancellationToken::new();
        let mut notifications = Notifications::new(rx, cancel.clone());

        let producer = tokio::spawn(async move { hand_off(&tx, StateValue::ok(5), &cancel).await });
        tokio::task::yield_now().await;
        assert!(!producer.is_finished());

        assert_eq!(notifications.recv().await, Some(StateValue::ok(5)));
        assert_eq!(producer.await.ok(), Some(Delivery::Taken));
    }

    #[tokio::test]
    async fn test_cancelled_hand_off_is_never_delivered() {
        let (tx, rx) = rendezvous::<StateValue<u32>>();
        let cancel = CancellationToken::new();
        let mut notifications = Notifications::new(rx, cancel.clone());

        let producer = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let delivery = hand_off(&tx, StateValue::ok(9), &cancel).await;
                drop(tx);
                delivery
            })
        };
        tokio::task::yield_now().await;
        cancel.cancel();

        assert_eq!(producer.await.ok(), Some(Delivery::Cancelled));
        assert_eq!(notifications.recv().await, None);
    }

    #[tokio::test]
    async fn test_buffered_item_is_dropped_once_cancelled() {
        let (tx, rx) = rendezvous::<StateValue<u32>>();
        let cancel = CancellationToken::new();
        let mut notifications = Notifications::new(rx, cancel.clone());

        let producer = {
            let cancel = cancel.clone();
            tokio::spawn(async move { hand_off(&tx, StateValue::ok(3), &cancel).await })
        };
        // The item is buffered and the producer is waiting for its ack.
        tokio::task::yield_now().await;
        assert!(!producer.is_finished());

        cancel.cancel();
        assert_eq!(notifications.recv().await, None);
        assert_eq!(producer.await.ok(), Some(Delivery::Cancelled));
        assert_eq!(notifications.next().await, None);
    }

    #[tokio::test]
    async fn test_dropped_consumer_reports_closed() {
        let (tx, rx) = rendezvous::<StateValue<u32>>();
        drop(rx);
        let delivery = hand_off(&tx, StateValue::ok(1), &CancellationToken::new()).await;
        assert_eq!(delivery, Delivery::Closed);
    }

    #[tokio::test]
    async fn test_stream_yields_in_order() {
        let (tx, rx) = rendezvous::<StateValue<u32>>();
        let cancel = CancellationToken::new();
        let notifications = Notifications::new(rx, cancel.clone());

        tokio::spawn(async move {
            for n in 1..=3 {
                hand_off(&tx, StateValue::ok(n), &cancel).await;
            }
        });

        let values: Vec<_> = notifications
            .map(|state| state.value().copied())
            .collect()
            .await;
        assert_eq!(values, vec![Some(1), Some(2), Some(3)]);
    }
}
