//! Per-key mutation locks.
//!
//! Validate-then-persist of a dependency edge must not interleave with
//! another one in the same project, and two materializations of the same
//! template must not race for the same occurrence number. Callers share one
//! [`KeyedLocks`] and hold the guard for the whole unit of work.
//!
//! These locks only order tasks inside one process. Other processes on the
//! same database are ordered by the storage layer's write transactions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Exclusive access to one key. Dropping it releases the key and forgets
/// it once nobody else holds or awaits it.
#[derive(Debug)]
pub struct KeyGuard<'a> {
    owner: &'a KeyedLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = self
            .owner
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.key)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> KeyGuard<'_> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(key.to_string()).or_default().clone()
        };

        tracing::trace!(key, "Acquiring mutation lock");
        let guard = mutex.lock_owned().await;

        KeyGuard {
            owner: self,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or awaited.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = KeyedLocks::new();
        let _guard = locks.lock("project-1").await;

        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.lock("project-1")).await;
        assert!(blocked.is_err());
    }

    #[tokio::test]
    async fn test_different_keys_do_not_contend() {
        let locks = KeyedLocks::new();
        let _guard = locks.lock("project-1").await;

        let other = tokio::time::timeout(Duration::from_millis(50), locks.lock("project-2")).await;
        assert!(other.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_lock_released_on_drop() {
        let locks = KeyedLocks::new();
        drop(locks.lock("tpl").await);

        let again = tokio::time::timeout(Duration::from_millis(50), locks.lock("tpl")).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_released_keys_are_forgotten() {
        let locks = KeyedLocks::new();
        for key in ["project-1", "project-2", "tpl-1"] {
            drop(locks.lock(key).await);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_key_kept_while_another_task_waits() {
        let locks = KeyedLocks::new();
        let first = locks.lock("project-1").await;

        let (_, second) = tokio::join!(
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                drop(first);
                // The waiter still holds a handle on the key's mutex.
                assert_eq!(locks.len(), 1);
            },
            locks.lock("project-1"),
        );

        assert_eq!(locks.len(), 1);
        drop(second);
        assert!(locks.is_empty());
    }
}
