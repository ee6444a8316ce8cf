//! The remote accessor capability.
//!
//! An accessor knows how to read the remote object's state and how to try
//! writing a new value to it. The observer owns its accessor outright: both
//! methods are only ever called from the reconciliation loop, one at a time.
//!
//! # Key Properties
//!
//! - **Exclusive**: the loop holds `&mut self`, nothing else touches the accessor
//! - **Serial**: `get_state` and `set_state` never run concurrently
//! - **Not preempted**: a slow call stalls the loop until it returns
//!
//! # Example
//!
//! ```ignore
//! use state_observer::{async_trait, RemoteAccessor};
//!
//! struct Thermostat {
//!     client: ThermostatClient,
//! }
//!
//! #[async_trait]
//! impl RemoteAccessor<Setpoint> for Thermostat {
//!     async fn get_state(&mut self) -> anyhow::Result<Setpoint> {
//!         self.client.read_setpoint().await
//!     }
//!
//!     async fn set_state(&mut self, value: Setpoint) -> anyhow::Result<()> {
//!         self.client.write_setpoint(value).await
//!     }
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;

/// Reads and writes the state of one remote object.
///
/// Errors are reported through `anyhow`. The observer records only their
/// text, so two failures with the same message are treated as one error
/// state and announced once.
#[async_trait]
pub trait RemoteAccessor<T>: Send + 'static {
    /// Fetch the current remote state.
    ///
    /// Called on every poll tick. Must be safe to call repeatedly.
    async fn get_state(&mut self) -> Result<T>;

    /// Attempt to apply `value` to the remote object.
    ///
    /// A failed write must not leave the accessor reporting a stale value
    /// from `get_state` without eventually surfacing an error itself.
    async fn set_state(&mut self, value: T) -> Result<()>;
}

#[async_trait]
impl<T, A> RemoteAccessor<T> for Box<A>
where
    T: Send + 'static,
    A: RemoteAccessor<T> + ?Sized,
{
    async fn get_state(&mut self) -> Result<T> {
        (**self).get_state().await
    }

    async fn set_state(&mut self, value: T) -> Result<()> {
        (**self).set_state(value).await
    }
}
