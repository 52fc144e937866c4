use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use firm_types::Address;

type LockMap = DashMap<Address, Arc<Mutex<()>>>;

/// One async mutex per contract address.
///
/// Everything that mutates `/.firm/<address>` holds that address's guard.
/// When two guards are needed the factory's is taken before the child's.
/// An address's mutex is dropped from the map once nobody holds or waits
/// for it.
#[derive(Default)]
pub struct AddressLocks {
    locks: Arc<LockMap>,
}

/// Exclusive access to one address, released on drop.
pub struct AddressGuard {
    guard: Option<OwnedMutexGuard<()>>,
    mutex: Arc<Mutex<()>>,
    address: Address,
    locks: Arc<LockMap>,
}

impl AddressLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, address: Address) -> AddressGuard {
        let mutex = self
            .locks
            .entry(address)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.clone().lock_owned().await;
        AddressGuard {
            guard: Some(guard),
            mutex,
            address,
            locks: self.locks.clone(),
        }
    }

    /// Addresses currently locked or waited on.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for AddressGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Two references left means only the map and this guard know the
        // mutex; a waiter or a concurrent `lock` holds a third.
        self.locks.remove_if(&self.address, |_, mutex| {
            Arc::ptr_eq(mutex, &self.mutex) && Arc::strong_count(mutex) == 2
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_address_is_exclusive() {
        let locks = Arc::new(AddressLocks::new());
        let a = Address::new([1; 20]);
        let guard = locks.lock(a).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock(a).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!contender.is_finished());
        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_addresses_do_not_contend() {
        let locks = AddressLocks::new();
        let _a = locks.lock(Address::new([1; 20])).await;
        let _b = locks.lock(Address::new([2; 20])).await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn released_addresses_are_evicted() {
        let locks = AddressLocks::new();
        for i in 0..10u8 {
            let _guard = locks.lock(Address::new([i; 20])).await;
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn entry_survives_while_someone_waits() {
        let locks = Arc::new(AddressLocks::new());
        let a = Address::new([3; 20]);
        let first = locks.lock(a).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock(a).await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(first);
        assert_eq!(locks.len(), 1);

        // The waiter now holds the same mutex, so a third caller queues
        // behind it instead of getting a fresh one.
        let third = tokio::time::timeout(Duration::from_millis(2), locks.lock(a)).await;
        assert!(third.is_err());
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}
