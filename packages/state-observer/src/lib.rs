//! # State Observer
//!
//! Keeps a locally cached copy of a remote object's state reconciled with the
//! real thing, through periodic polling plus explicit write requests, and
//! publishes every change exactly once.
//!
//! ## Architecture
//!
//! ```text
//! caller                          observer task
//!   │                                 │
//!   ├─ request_state(v) ──rendezvous──► apply: publish v, then accessor.set_state(v)
//!   │                                 │
//!   │                   poll tick ────► poll: accessor.get_state(), publish if changed
//!   │                                 │
//!   │                   cancel ───────► stop, close stream
//!   │                                 │
//!   ◄──────── Notifications ◄─rendezvous─ publish(cache)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Single owner** - the cache and the accessor live inside one task; no locks
//! 2. **Publish on change only** - values are compared structurally, errors by text
//! 3. **Publish before write** - a requested value is announced before it is written,
//!    and a failing write is followed by a corrective error notification
//! 4. **Panics are contained** - an accessor panic becomes an error state,
//!    the loop keeps running
//! 5. **Backpressure** - both channels are hand-offs; a consumer that stops
//!    reading stalls reconciliation
//!
//! ## Example
//!
//! ```ignore
//! use std::time::Duration;
//! use state_observer::{async_trait, RemoteAccessor, StateObserver};
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Setpoint(u16);
//!
//! struct Thermostat { /* client handle */ }
//!
//! #[async_trait]
//! impl RemoteAccessor<Setpoint> for Thermostat {
//!     async fn get_state(&mut self) -> anyhow::Result<Setpoint> { /* ... */ }
//!     async fn set_state(&mut self, value: Setpoint) -> anyhow::Result<()> { /* ... */ }
//! }
//!
//! let cancel = CancellationToken::new();
//! let mut observer = StateObserver::new(Thermostat { /* ... */ }, Setpoint(20));
//! let mut changes = observer.start(cancel.clone(), Duration::from_secs(5))?;
//!
//! observer.request_state(Setpoint(22)).await?;
//! while let Some(state) = changes.recv().await {
//!     tracing::info!(?state, "thermostat changed");
//! }
//! ```
//!
//! ## What This Is Not
//!
//! No networking, no retries with backoff, no persistence, and no scheduling
//! of several objects: one observer tracks one state slot. Retries happen only
//! through the poll cadence.

mod accessor;
mod config;
mod error;
mod notifications;
mod observer;
mod reconciler;
mod value;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;


pub use accessor::RemoteAccessor;
pub use config::ObserverConfig;
pub use error::{ConfigError, ObserverError, StateError};
pub use notifications::Notifications;
pub use observer::StateObserver;
pub use value::{ObservedState, StateValue};

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
