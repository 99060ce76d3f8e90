use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-token async mutual exclusion.
///
/// Every read-modify-write of a candidate record runs under the token's
/// guard, so two requests racing on one link cannot both score it. Entries
/// are dropped once no guard or waiter references them.
#[derive(Default)]
pub struct TokenLocks {
    slots: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl TokenLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `token`.
    pub async fn acquire(&self, token: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.retain(|_, weak| weak.strong_count() > 0);
            match slots.get(token).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(AsyncMutex::new(()));
                    slots.insert(token.to_string(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }
}
