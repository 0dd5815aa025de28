//! Session store contract.

use crate::error::SessionResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Key-value backend holding encoded session records.
///
/// Implementations are shared by every in-flight request and must tolerate
/// concurrent calls. Records are opaque strings; the store never inspects
/// them.
///
/// # Failure semantics
///
/// The middleware treats an `Err` from [`load`](Self::load) as "no record"
/// and carries on with a fresh session. Errors from [`save`](Self::save) and
/// [`delete`](Self::delete) are reported to the caller.
///
/// # Examples
///
/// ```
/// use satchel_session::{MemorySessionStore, SessionStore};
///
/// # tokio_test::block_on(async {
/// let store = MemorySessionStore::new();
/// store.save("sid", "e30=").await.unwrap();
/// assert_eq!(store.load("sid").await.unwrap().as_deref(), Some("e30="));
///
/// store.delete("sid").await.unwrap();
/// assert_eq!(store.load("sid").await.unwrap(), None);
/// # });
/// ```
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the record for `identifier`. `Ok(None)` on a miss.
    async fn load(&self, identifier: &str) -> SessionResult<Option<String>>;

    /// Store `record` under `identifier`, replacing any previous value.
    async fn save(&self, identifier: &str, record: &str) -> SessionResult<()>;

    /// Remove the record for `identifier`. Deleting a missing record is not
    /// an error.
    async fn delete(&self, identifier: &str) -> SessionResult<()>;
}

#[async_trait]
impl<S: SessionStore + ?Sized> SessionStore for Arc<S> {
    async fn load(&self, identifier: &str) -> SessionResult<Option<String>> {
        (**self).load(identifier).await
    }

    async fn save(&self, identifier: &str, record: &str) -> SessionResult<()> {
        (**self).save(identifier, record).await
    }

    async fn delete(&self, identifier: &str) -> SessionResult<()> {
        (**self).delete(identifier).await
    }
}

/// In-process store for tests and single-instance development.
///
/// Records live only as long as the process. There is no expiry.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: RwLock<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, identifier: &str) -> SessionResult<Option<String>> {
        Ok(self.records.read().await.get(identifier).cloned())
    }

    async fn save(&self, identifier: &str, record: &str) -> SessionResult<()> {
        self.records
            .write()
            .await
            .insert(identifier.to_string(), record.to_string());
        Ok(())
    }

    async fn delete(&self, identifier: &str) -> SessionResult<()> {
        self.records.write().await.remove(identifier);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_crud() {
        let store = MemorySessionStore::new();
        assert!(store.is_empty().await);
        assert_eq!(store.load("sid").await.unwrap(), None);

        store.save("sid", "record-1").await.unwrap();
        store.save("sid", "record-2").await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.load("sid").await.unwrap().as_deref(), Some("record-2"));

        store.delete("sid").await.unwrap();
        store.delete("sid").await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_shared_through_arc() {
        let store = Arc::new(MemorySessionStore::new());
        let handle: Arc<dyn SessionStore> = store.clone();

        handle.save("sid", "record").await.unwrap();
        assert_eq!(store.load("sid").await.unwrap().as_deref(), Some("record"));
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let store = Arc::new(MemorySessionStore::new());
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.save(&format!("sid-{i}"), "r").await })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(store.len().await, 16);
    }
}
