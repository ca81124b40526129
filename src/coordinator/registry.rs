//! Collection registry
//!
//! Authoritative map from collection name to its lifecycle record. Each
//! entry carries an async mutex that serializes state-changing operations
//! on that name; operations on different names never wait on each other.
//!
//! The map itself sits behind a short-lived `RwLock` that is never held
//! across an `.await`. Record mutations go through `update`, which applies
//! the change under the write lock so readers only ever see whole records.

use crate::common::{Error, Result};
use crate::coordinator::model::{CollectionDefinition, CollectionRecord};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{Mutex, OwnedMutexGuard};

struct Entry {
    /// Insertion order, for stable listings
    seq: u64,
    record: CollectionRecord,
    op_lock: Arc<Mutex<()>>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

#[derive(Default)]
pub struct CollectionRegistry {
    inner: RwLock<Inner>,
}

impl CollectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves `definition.name` with a fresh `Creating` record and returns
    /// it together with the already-held operation lock for that name.
    pub fn create(
        &self,
        definition: CollectionDefinition,
    ) -> Result<(CollectionRecord, OwnedMutexGuard<()>)> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.entries.contains_key(&definition.name) {
            return Err(Error::AlreadyExists(definition.name));
        }

        let op_lock = Arc::new(Mutex::new(()));
        let guard = op_lock
            .clone()
            .try_lock_owned()
            .map_err(|e| Error::Internal(format!("fresh operation lock is held: {}", e)))?;

        let record = CollectionRecord::new(definition);
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            record.name().to_string(),
            Entry {
                seq,
                record: record.clone(),
                op_lock,
            },
        );
        Ok((record, guard))
    }

    pub fn get(&self, name: &str) -> Result<CollectionRecord> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .entries
            .get(name)
            .map(|e| e.record.clone())
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.entries.contains_key(name)
    }

    /// Applies `f` to the stored record and returns the updated copy.
    pub fn update<F>(&self, name: &str, f: F) -> Result<CollectionRecord>
    where
        F: FnOnce(&mut CollectionRecord),
    {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let entry = inner
            .entries
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        f(&mut entry.record);
        entry.record.touch();
        Ok(entry.record.clone())
    }

    pub fn remove(&self, name: &str) -> Result<CollectionRecord> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner
            .entries
            .remove(name)
            .map(|e| e.record)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// All records in creation order. Without `with_size` the size and
    /// memory figures are zeroed.
    pub fn list(&self, with_size: bool) -> Vec<CollectionRecord> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<&Entry> = inner.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries
            .into_iter()
            .map(|e| {
                let mut record = e.record.clone();
                if !with_size {
                    record.size = 0;
                    record.memory = 0;
                }
                record
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits for exclusive operation rights on `name`.
    ///
    /// If the entry is deleted (or deleted and recreated) while waiting, the
    /// stale guard is dropped and the lookup starts over, so a holder always
    /// owns the lock of the entry currently registered under `name`.
    pub async fn lock(&self, name: &str) -> Result<OwnedMutexGuard<()>> {
        loop {
            let op_lock = self.op_lock(name)?;
            let guard = op_lock.clone().lock_owned().await;
            match self.op_lock(name) {
                Ok(current) if Arc::ptr_eq(&current, &op_lock) => return Ok(guard),
                Ok(_) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn op_lock(&self, name: &str) -> Result<Arc<Mutex<()>>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .entries
            .get(name)
            .map(|e| e.op_lock.clone())
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::model::{CollectionStatus, Distance};
    use std::time::Duration;

    fn def(name: &str) -> CollectionDefinition {
        CollectionDefinition::new(name, 8, Distance::L2sq)
    }

    #[test]
    fn test_create_and_get() {
        let registry = CollectionRegistry::new();
        let (record, _guard) = registry.create(def("docs")).unwrap();
        assert_eq!(record.status, CollectionStatus::Creating);
        assert_eq!(registry.get("docs").unwrap().name(), "docs");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_create() {
        let registry = CollectionRegistry::new();
        let _first = registry.create(def("docs")).unwrap();
        let err = registry.create(def("docs")).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(name) if name == "docs"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_list_preserves_creation_order() {
        let registry = CollectionRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            drop(registry.create(def(name)).unwrap());
        }
        registry
            .update("alpha", |r| {
                r.size = 10;
                r.memory = 20;
            })
            .unwrap();

        let names: Vec<String> = registry
            .list(true)
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);

        assert_eq!(registry.list(true)[1].size, 10);
        assert_eq!(registry.list(false)[1].size, 0);
        assert_eq!(registry.list(false)[1].memory, 0);
    }

    #[test]
    fn test_remove_missing() {
        let registry = CollectionRegistry::new();
        assert!(matches!(registry.remove("nope"), Err(Error::NotFound(_))));
        assert!(matches!(
            registry.update("nope", |_| {}),
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_lock_waits_for_creator() {
        let registry = Arc::new(CollectionRegistry::new());
        let (_, guard) = registry.create(def("docs")).unwrap();

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.lock("docs").await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_lock_after_delete_reports_not_found() {
        let registry = Arc::new(CollectionRegistry::new());
        let (_, guard) = registry.create(def("docs")).unwrap();

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.lock("docs").await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.remove("docs").unwrap();
        drop(guard);

        assert!(matches!(waiter.await.unwrap(), Err(Error::NotFound(_))));
    }
}
