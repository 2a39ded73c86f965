use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("failed to encode record for {0}")]
    Encode(&'static str),
}

/// Key-value area shared by every context of the extension. Reads and writes
/// are independent; there is no locking across contexts.
#[allow(async_fn_in_trait)]
pub trait StorageArea {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    async fn set(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError>;
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

pub type StorageListener = Rc<dyn Fn(&str)>;

#[derive(Default)]
struct MemoryInner {
    entries: RefCell<HashMap<String, Vec<u8>>>,
    listeners: RefCell<Vec<StorageListener>>,
    fail_reads: Cell<bool>,
    fail_writes: Cell<bool>,
}

/// In-process storage area. Clones share the same entries, so several
/// simulated contexts can sit on one instance.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Rc<MemoryInner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listeners hear about every key written or removed, after the change.
    pub fn subscribe(&self, listener: StorageListener) -> StorageSubscription {
        self.inner.listeners.borrow_mut().push(listener.clone());
        StorageSubscription {
            listener,
            inner: Rc::clone(&self.inner),
        }
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.fail_reads.set(fail);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.set(fail);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.entries.borrow().contains_key(key)
    }

    fn notify(&self, key: &str) {
        let listeners = self.inner.listeners.borrow().clone();
        for listener in listeners {
            (listener)(key);
        }
    }
}

impl StorageArea for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        if self.inner.fail_reads.get() {
            return Err(StorageError::Backend(format!("read of {key} refused")));
        }
        Ok(self.inner.entries.borrow().get(key).cloned())
    }

    async fn set(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        if self.inner.fail_writes.get() {
            return Err(StorageError::Backend(format!("write of {key} refused")));
        }
        self.inner
            .entries
            .borrow_mut()
            .insert(key.to_string(), bytes);
        self.notify(key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        if self.inner.fail_writes.get() {
            return Err(StorageError::Backend(format!("remove of {key} refused")));
        }
        let removed = self.inner.entries.borrow_mut().remove(key).is_some();
        if removed {
            self.notify(key);
        }
        Ok(())
    }
}

pub struct StorageSubscription {
    listener: StorageListener,
    inner: Rc<MemoryInner>,
}

impl Drop for StorageSubscription {
    fn drop(&mut self) {
        let mut listeners = self.inner.listeners.borrow_mut();
        listeners.retain(|item| !Rc::ptr_eq(item, &self.listener));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_entries_and_listeners_see_writes() {
        let storage = MemoryStorage::new();
        let other = storage.clone();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let subscription = {
            let seen = Rc::clone(&seen);
            storage.subscribe(Rc::new(move |key: &str| seen.borrow_mut().push(key.to_string())))
        };
        other.set("a", vec![1]).await.expect("set");
        assert_eq!(storage.get("a").await.expect("get"), Some(vec![1]));
        storage.remove("a").await.expect("remove");
        storage.remove("a").await.expect("remove twice");
        assert_eq!(*seen.borrow(), vec!["a".to_string(), "a".to_string()]);

        drop(subscription);
        other.set("b", vec![2]).await.expect("set");
        assert_eq!(seen.borrow().len(), 2);
    }

    #[tokio::test]
    async fn injected_failures_surface_as_errors() {
        let storage = MemoryStorage::new();
        storage.set_fail_writes(true);
        assert!(storage.set("a", vec![1]).await.is_err());
        assert!(!storage.contains_key("a"));
        storage.set_fail_writes(false);
        storage.set_fail_reads(true);
        assert!(storage.get("a").await.is_err());
    }
}
