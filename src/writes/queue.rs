//! Per-id write queue.

use crate::types::RecordId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

type LockMap = HashMap<RecordId, Arc<tokio::sync::Mutex<()>>>;

/// Serializes writes that target the same record.
///
/// Writers for one id wait in FIFO order (tokio mutexes are fair). Writers
/// for different ids never wait on each other. Entries are removed once no
/// writer holds or waits for them.
#[derive(Clone, Default)]
pub struct IdLocks {
    locks: Arc<Mutex<LockMap>>,
}

impl IdLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the turn of `id`. The turn ends when the guard is dropped.
    pub async fn acquire(&self, id: &RecordId) -> IdGuard {
        let entry = self
            .locks
            .lock()
            .entry(id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();

        let guard = entry.lock_owned().await;
        IdGuard {
            id: id.clone(),
            locks: self.locks.clone(),
            guard: Some(guard),
        }
    }

    /// Number of ids with a holder or waiters.
    pub fn active(&self) -> usize {
        self.locks.lock().len()
    }
}

/// Exclusive turn for one record id.
pub struct IdGuard {
    id: RecordId,
    locks: Arc<Mutex<LockMap>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdGuard {
    fn drop(&mut self) {
        self.guard.take();

        let mut locks = self.locks.lock();
        // Only the map still references an idle entry.
        if locks
            .get(&self.id)
            .map(|entry| Arc::strong_count(entry) == 1)
            .unwrap_or(false)
        {
            locks.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_id_waits() {
        let locks = IdLocks::new();
        let id = RecordId::new("a");

        let first = locks.acquire(&id).await;
        let waiter = {
            let locks = locks.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let _turn = locks.acquire(&id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap();
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn test_different_ids_do_not_wait() {
        let locks = IdLocks::new();
        let _a = locks.acquire(&RecordId::new("a")).await;
        let _b = locks.acquire(&RecordId::new("b")).await;
        assert_eq!(locks.active(), 2);
    }
}
