//! Serialization primitives.
//!
//! [`AssetLocks`]: operations on the same asset run one at a time so two
//! of them never count the same liquidity. Different assets proceed in
//! parallel.
//!
//! [`OperationLock`]: share pricing reads the global supply and the
//! global pool value, so every deposit and withdrawal holds it from the
//! price snapshot to the mint or burn. Read paths take neither lock.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};

use crate::errors::{Result, VaultError};
use crate::state::Address;

#[derive(Debug, Default)]
pub struct AssetLocks {
    locks: Mutex<HashMap<Address, Arc<Mutex<()>>>>,
}

impl AssetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mutex guarding `asset`, created on first use.
    ///
    /// ```rust,ignore
    /// let lock = self.locks.for_asset(&asset);
    /// let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
    /// ```
    pub fn for_asset(&self, asset: &Address) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(*asset)
            .or_default()
            .clone()
    }
}

/// Vault-wide mutex that rejects reentry from the owning thread instead
/// of deadlocking.
#[derive(Debug, Default)]
pub struct OperationLock {
    owner: Mutex<Option<ThreadId>>,
    released: Condvar,
}

impl OperationLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock is free, then hold it until the guard drops.
    ///
    /// ## Errors
    /// * `ReentrantCall` - the current thread already holds it
    pub fn acquire(&self) -> Result<OperationGuard<'_>> {
        let me = thread::current().id();
        let mut owner = self.owner.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            match *owner {
                None => {
                    *owner = Some(me);
                    return Ok(OperationGuard { lock: self });
                }
                Some(holder) if holder == me => return Err(VaultError::ReentrantCall),
                Some(_) => {
                    owner = self
                        .released
                        .wait(owner)
                        .unwrap_or_else(|e| e.into_inner());
                }
            }
        }
    }

    pub fn is_held(&self) -> bool {
        self.owner.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }
}

#[must_use]
pub struct OperationGuard<'a> {
    lock: &'a OperationLock,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        *self.lock.owner.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.lock.released.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_asset_shares_a_lock() {
        let locks = AssetLocks::new();
        let a = Address::from_low_u64(1);
        let b = Address::from_low_u64(2);

        assert!(Arc::ptr_eq(&locks.for_asset(&a), &locks.for_asset(&a)));
        assert!(!Arc::ptr_eq(&locks.for_asset(&a), &locks.for_asset(&b)));

        let lock_a = locks.for_asset(&a);
        let _held = lock_a.lock().unwrap();
        assert!(locks.for_asset(&b).try_lock().is_ok());
        assert!(locks.for_asset(&a).try_lock().is_err());
    }

    #[test]
    fn test_operation_lock_rejects_reentry() {
        let lock = OperationLock::new();
        let guard = lock.acquire().unwrap();
        assert!(lock.is_held());
        assert!(matches!(lock.acquire(), Err(VaultError::ReentrantCall)));
        drop(guard);
        assert!(!lock.is_held());
        assert!(lock.acquire().is_ok());
    }

    #[test]
    fn test_operation_lock_serializes_threads() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let lock = Arc::new(OperationLock::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = lock.clone();
                let inside = inside.clone();
                let overlaps = overlaps.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        let _guard = lock.acquire().unwrap();
                        if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert!(!lock.is_held());
    }
}
