use crate::model::Complaint;
use async_trait::async_trait;
use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("a complaint already exists for this product and reporter")]
    Conflict,
    #[error("storage backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    CreatedDesc,
    CreatedAsc,
}

/// Transactional repository for complaints. Each public service operation
/// runs inside one transaction obtained from `begin`.
#[async_trait]
pub trait ComplaintStore: Send + Sync + 'static {
    type Txn: StoreTransaction;

    async fn begin(&self) -> Result<Self::Txn, StoreError>;
}

/// A single transaction. Writes are staged and only become visible on
/// `commit`; dropping an uncommitted transaction rolls everything back and
/// releases any row locks it holds.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Unlocked read of committed state, used only to decide existence.
    async fn find_by_natural_key(
        &self,
        product_id: &str,
        reporter: &str,
    ) -> Result<Option<Complaint>, StoreError>;

    /// Unlocked read for pure queries.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Complaint>, StoreError>;

    /// Acquires the row's exclusive lock for the remainder of this
    /// transaction, then reads it. A concurrent holder blocks this call until
    /// it commits or rolls back. Required before any mutation.
    async fn find_by_id_for_update(&mut self, id: Uuid) -> Result<Complaint, StoreError>;

    /// Upsert. Assigns `id` and `created_at` on first save.
    async fn save(&mut self, complaint: Complaint) -> Result<Complaint, StoreError>;

    /// Paged listing over committed state.
    async fn list_page(
        &self,
        offset: usize,
        limit: usize,
        order: SortOrder,
    ) -> Result<Vec<Complaint>, StoreError>;

    /// Atomically validates natural-key uniqueness for staged inserts and
    /// applies the staged writes. On `Conflict` nothing is applied.
    async fn commit(self) -> Result<(), StoreError>;
}
