//! In-memory transactional complaint store.
//!
//! Committed state lives in tables behind a `parking_lot::RwLock`. Row locks
//! are `tokio::sync::Mutex`es keyed by id; a transaction holds the owned
//! guards it acquired until commit or drop, which is what serializes
//! concurrent writers on the same record. Writes are staged inside the
//! transaction and applied under one write guard at commit, where the
//! natural-key unique index is validated before anything is applied.

use crate::model::{Complaint, NaturalKey};
use crate::store::{ComplaintStore, SortOrder, StoreError, StoreTransaction};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    by_id: HashMap<Uuid, Complaint>,
    natural_key: HashMap<NaturalKey, Uuid>,
}

struct StoreInner {
    tables: RwLock<Tables>,
    row_locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            inner: Arc::new(StoreInner {
                tables: RwLock::new(Tables::default()),
                row_locks: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ComplaintStore for MemoryStore {
    type Txn = MemoryTransaction;

    async fn begin(&self) -> Result<Self::Txn, StoreError> {
        Ok(MemoryTransaction {
            inner: self.inner.clone(),
            locks: HashMap::new(),
            staged: Vec::new(),
        })
    }
}

pub struct MemoryTransaction {
    inner: Arc<StoreInner>,
    // Row locks held by this transaction, released on commit or drop.
    locks: HashMap<Uuid, OwnedMutexGuard<()>>,
    staged: Vec<Complaint>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn find_by_natural_key(
        &self,
        product_id: &str,
        reporter: &str,
    ) -> Result<Option<Complaint>, StoreError> {
        let key = NaturalKey {
            product_id: product_id.into(),
            reporter: reporter.into(),
        };
        let tables = self.inner.tables.read();
        Ok(tables
            .natural_key
            .get(&key)
            .and_then(|id| tables.by_id.get(id).cloned()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Complaint>, StoreError> {
        Ok(self.inner.tables.read().by_id.get(&id).cloned())
    }

    async fn find_by_id_for_update(&mut self, id: Uuid) -> Result<Complaint, StoreError> {
        if !self.locks.contains_key(&id) {
            let lock = {
                let mut row_locks = self.inner.row_locks.lock();
                row_locks
                    .entry(id)
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                    .clone()
            };
            let guard = lock.lock_owned().await;
            self.locks.insert(id, guard);
        }

        // Read committed state only once the lock is held, so the previous
        // holder's commit is visible.
        let found = self.inner.tables.read().by_id.get(&id).cloned();
        match found {
            Some(complaint) => Ok(complaint),
            None => {
                self.locks.remove(&id);
                Err(StoreError::NotFound)
            }
        }
    }

    async fn save(&mut self, mut complaint: Complaint) -> Result<Complaint, StoreError> {
        if complaint.id.is_nil() {
            complaint.id = Uuid::new_v4();
            complaint.created_at = Utc::now();
        }
        self.staged.retain(|c| c.id != complaint.id);
        self.staged.push(complaint.clone());
        Ok(complaint)
    }

    async fn list_page(
        &self,
        offset: usize,
        limit: usize,
        order: SortOrder,
    ) -> Result<Vec<Complaint>, StoreError> {
        let mut rows: Vec<Complaint> = {
            let tables = self.inner.tables.read();
            tables.by_id.values().cloned().collect()
        };

        match order {
            SortOrder::CreatedDesc => {
                rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)))
            }
            SortOrder::CreatedAsc => {
                rows.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)))
            }
        }

        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn commit(self) -> Result<(), StoreError> {
        let MemoryTransaction {
            inner,
            locks,
            staged,
        } = self;

        let mut tables = inner.tables.write();

        // Validate natural-key uniqueness for every staged row before
        // applying anything; a conflicting insert rolls the whole
        // transaction back.
        for complaint in &staged {
            if let Some(owner) = tables.natural_key.get(&complaint.natural_key())
                && *owner != complaint.id
            {
                return Err(StoreError::Conflict);
            }
        }

        for complaint in staged {
            tables.natural_key.insert(complaint.natural_key(), complaint.id);
            tables.by_id.insert(complaint.id, complaint);
        }

        drop(tables);
        drop(locks);
        Ok(())
    }
}
