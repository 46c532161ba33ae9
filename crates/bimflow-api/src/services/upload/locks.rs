use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per key, created on first use and dropped once unused.
#[derive(Default)]
pub(super) struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of a keyed critical section. Dropping it, including
/// when the owning future is cancelled, releases the lock and forgets the key
/// once nobody else holds or waits on it.
pub(super) struct KeyGuard<'a> {
    owner: &'a KeyedLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub(super) async fn lock(&self, key: &str) -> KeyGuard<'_> {
        let lock = self.map().entry(key.to_string()).or_default().clone();
        let mut guard = KeyGuard {
            owner: self,
            key: key.to_string(),
            guard: None,
        };
        guard.guard = Some(lock.lock_owned().await);
        guard
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.map().len()
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.owner.map();
        if let Some(lock) = locks.get(&self.key) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::default());
        let first = locks.lock("abc").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("abc").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::default();
        let _a = locks.lock("a").await;
        let _b = tokio::time::timeout(Duration::from_millis(50), locks.lock("b"))
            .await
            .expect("independent key must not wait");
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_holder_forgets_key() {
        let locks = Arc::new(KeyedLocks::default());

        let holder = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("abc").await;
                // Stands in for a client that disconnects mid-promote
                std::future::pending::<()>().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(locks.len(), 1);

        holder.abort();
        assert!(holder.await.unwrap_err().is_cancelled());
        assert_eq!(locks.len(), 0);

        // The key is usable again
        let _guard = tokio::time::timeout(Duration::from_millis(50), locks.lock("abc"))
            .await
            .expect("lock must be free after cancellation");
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_leak_key() {
        let locks = Arc::new(KeyedLocks::default());
        let first = locks.lock("abc").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("abc").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        waiter.abort();
        let _ = waiter.await;

        drop(first);
        assert_eq!(locks.len(), 0);
    }
}
