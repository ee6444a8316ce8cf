//! Test support: a scripted in-memory accessor.
//!
//! `InMemoryAccessor` holds the "remote" value behind a mutex and can be told
//! to fail or panic on the next reads and writes. Clones share state, so a
//! test keeps one clone while the observer owns the other.
//!
//! ```ignore
//! let accessor = InMemoryAccessor::new(Setpoint(20));
//! let remote = accessor.clone();
//! let mut observer = StateObserver::new(accessor, Setpoint(20));
//! let mut changes = observer.start(cancel.clone(), Duration::from_millis(100))?;
//!
//! remote.fail_reads("unreachable");
//! assert!(changes.recv().await.unwrap().error().is_some());
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::accessor::RemoteAccessor;

struct Remote<T> {
    value: T,
    read_failure: Option<String>,
    write_failure: Option<String>,
    read_panic: Option<String>,
    write_panic: Option<String>,
    get_calls: usize,
    set_calls: usize,
    writes: Vec<T>,
}

/// In-memory accessor backed by a shared mutex.
pub struct InMemoryAccessor<T> {
    remote: Arc<Mutex<Remote<T>>>,
}

impl<T> Clone for InMemoryAccessor<T> {
    fn clone(&self) -> Self {
        Self {
            remote: Arc::clone(&self.remote),
        }
    }
}

impl<T: Clone> InMemoryAccessor<T> {
    pub fn new(value: T) -> Self {
        Self {
            remote: Arc::new(Mutex::new(Remote {
                value,
                read_failure: None,
                write_failure: None,
                read_panic: None,
                write_panic: None,
                get_calls: 0,
                set_calls: 0,
                writes: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Remote<T>> {
        // A test thread that panicked mid-update leaves plain values behind.
        self.remote.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The value currently held on the "remote" side.
    pub fn remote(&self) -> T {
        self.lock().value.clone()
    }

    /// Change the remote value behind the observer's back.
    pub fn set_remote(&self, value: T) {
        self.lock().value = value;
    }

    /// Make every read fail with `message` until [`restore_reads`](Self::restore_reads).
    pub fn fail_reads(&self, message: impl Into<String>) {
        self.lock().read_failure = Some(message.into());
    }

    pub fn restore_reads(&self) {
        let mut remote = self.lock();
        remote.read_failure = None;
        remote.read_panic = None;
    }

    /// Make every write fail with `message` until [`restore_writes`](Self::restore_writes).
    pub fn fail_writes(&self, message: impl Into<String>) {
        self.lock().write_failure = Some(message.into());
    }

    pub fn restore_writes(&self) {
        let mut remote = self.lock();
        remote.write_failure = None;
        remote.write_panic = None;
    }

    /// Make every read panic with `message`.
    pub fn panic_on_read(&self, message: impl Into<String>) {
        self.lock().read_panic = Some(message.into());
    }

    /// Make every write panic with `message`.
    pub fn panic_on_write(&self, message: impl Into<String>) {
        self.lock().write_panic = Some(message.into());
    }

    /// Number of `get_state` calls so far, including failed ones.
    pub fn get_calls(&self) -> usize {
        self.lock().get_calls
    }

    /// Number of `set_state` calls so far, including failed ones.
    pub fn set_calls(&self) -> usize {
        self.lock().set_calls
    }

    /// Values successfully written, oldest first.
    pub fn writes(&self) -> Vec<T> {
        self.lock().writes.clone()
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> RemoteAccessor<T> for InMemoryAccessor<T> {
    async fn get_state(&mut self) -> Result<T> {
        let panic_msg = {
            let mut remote = self.lock();
            remote.get_calls += 1;
            if let Some(message) = &remote.read_failure {
                return Err(anyhow!("{}", message));
            }
            match &remote.read_panic {
                Some(message) => message.clone(),
                None => return Ok(remote.value.clone()),
            }
        };
        panic!("{}", panic_msg);
    }

    async fn set_state(&mut self, value: T) -> Result<()> {
        let panic_msg = {
            let mut remote = self.lock();
            remote.set_calls += 1;
            if let Some(message) = &remote.write_failure {
                return Err(anyhow!("{}", message));
            }
            match &remote.write_panic {
                Some(message) => message.clone(),
                None => {
                    remote.value = value.clone();
                    remote.writes.push(value);
                    return Ok(());
                }
            }
        };
        panic!("{}", panic_msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_accessor_round_trip() {
        let mut accessor = InMemoryAccessor::new(1u32);
        let remote = accessor.clone();

        assert_eq!(accessor.get_state().await.ok(), Some(1));
        assert!(accessor.set_state(5).await.is_ok());
        assert_eq!(remote.remote(), 5);
        assert_eq!(remote.writes(), vec![5]);
        assert_eq!(remote.get_calls(), 1);
        assert_eq!(remote.set_calls(), 1);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let mut accessor = InMemoryAccessor::new(1u32);
        let remote = accessor.clone();

        remote.fail_reads("unreachable");
        remote.fail_writes("read-only");
        assert_eq!(
            accessor.get_state().await.map_err(|e| e.to_string()),
            Err("unreachable".to_string())
        );
        assert!(accessor.set_state(2).await.is_err());
        assert_eq!(remote.remote(), 1);

        remote.restore_reads();
        remote.restore_writes();
        assert!(accessor.set_state(2).await.is_ok());
        assert_eq!(accessor.get_state().await.ok(), Some(2));
    }
}
