use crate::errors::ComplaintError;
use crate::metrics_defs::{SUBMIT_CREATE_RETRIES, SUBMIT_CREATED, SUBMIT_DEDUPLICATED};
use crate::model::Complaint;
use crate::store::{ComplaintStore, SortOrder, StoreError, StoreTransaction};
use shared::counter;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: usize = 10;
const MAX_PAGE_SIZE: usize = 100;

// A submission that loses the create race to a concurrent one fails its
// commit with a conflict; by then the winner's record is committed, so one
// retry is enough to reach the increment path.
const CREATE_RETRY_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct NewComplaint {
    pub product_id: String,
    pub content: String,
    pub reporter: String,
    pub country: String,
}

/// Coordinates complaint writes and queries over a transactional store.
/// Every mutation goes through the same discipline: acquire the row lock via
/// the locked read, mutate, save, commit.
pub struct ComplaintService<S> {
    store: S,
}

impl<S: ComplaintStore> ComplaintService<S> {
    pub fn new(store: S) -> Self {
        ComplaintService { store }
    }

    /// Records a submission: creates a new complaint for a fresh
    /// (`product_id`, `reporter`) pair, or folds a repeated one into the
    /// existing record by incrementing its report count.
    pub async fn submit(&self, submission: NewComplaint) -> Result<Complaint, ComplaintError> {
        let mut attempt = 1;
        loop {
            match self.try_submit(&submission).await {
                Err(ComplaintError::CreationFailed(StoreError::Conflict))
                    if attempt < CREATE_RETRY_ATTEMPTS =>
                {
                    tracing::debug!(
                        product_id = %submission.product_id,
                        reporter = %submission.reporter,
                        attempt,
                        "create raced a concurrent submission, retrying"
                    );
                    counter!(SUBMIT_CREATE_RETRIES).increment(1);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn try_submit(&self, submission: &NewComplaint) -> Result<Complaint, ComplaintError> {
        let mut txn = self
            .store
            .begin()
            .await
            .map_err(ComplaintError::CreationFailed)?;

        let existing = txn
            .find_by_natural_key(&submission.product_id, &submission.reporter)
            .await
            .map_err(ComplaintError::CreationFailed)?;

        match existing {
            None => {
                let draft = Complaint::draft(
                    submission.product_id.clone(),
                    submission.content.clone(),
                    submission.reporter.clone(),
                    submission.country.clone(),
                );
                let saved = txn.save(draft).await.map_err(ComplaintError::CreationFailed)?;
                txn.commit().await.map_err(ComplaintError::CreationFailed)?;
                counter!(SUBMIT_CREATED).increment(1);
                Ok(saved)
            }
            Some(found) => {
                // Re-read under the row lock; the record may have been
                // incremented or removed since the unlocked lookup. A
                // NotFound here surfaces as-is, never as CreationFailed.
                let mut complaint =
                    txn.find_by_id_for_update(found.id).await.map_err(|err| match err {
                        StoreError::NotFound => ComplaintError::NotFound(found.id),
                        other => ComplaintError::CreationFailed(other),
                    })?;

                // The duplicate's content and country never replace the
                // stored ones; only the counter moves.
                complaint.report_count += 1;
                let saved = txn.save(complaint).await.map_err(ComplaintError::CreationFailed)?;
                txn.commit().await.map_err(ComplaintError::CreationFailed)?;
                counter!(SUBMIT_DEDUPLICATED).increment(1);
                Ok(saved)
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Complaint, ComplaintError> {
        let txn = self.store.begin().await.map_err(ComplaintError::Unexpected)?;
        txn.find_by_id(id)
            .await
            .map_err(ComplaintError::Unexpected)?
            .ok_or(ComplaintError::NotFound(id))
    }

    /// Paged listing, newest first. An out-of-range page yields an empty
    /// vec, not an error.
    pub async fn list(&self, page: usize, size: usize) -> Result<Vec<Complaint>, ComplaintError> {
        let size = size.clamp(1, MAX_PAGE_SIZE);
        let offset = page.saturating_mul(size);

        let txn = self.store.begin().await.map_err(ComplaintError::Unexpected)?;
        txn.list_page(offset, size, SortOrder::CreatedDesc)
            .await
            .map_err(ComplaintError::Unexpected)
    }

    /// Replaces the complaint's content. An empty or absent `content` is a
    /// no-op that returns the current record without writing anything.
    pub async fn update_content(
        &self,
        id: Uuid,
        content: Option<String>,
    ) -> Result<Complaint, ComplaintError> {
        let mut txn = self.store.begin().await.map_err(ComplaintError::UpdateFailed)?;

        let mut complaint = txn.find_by_id_for_update(id).await.map_err(|err| match err {
            StoreError::NotFound => ComplaintError::NotFound(id),
            other => ComplaintError::UpdateFailed(other),
        })?;

        let Some(content) = content.filter(|c| !c.is_empty()) else {
            return Ok(complaint);
        };

        complaint.content = content;
        let saved = txn.save(complaint).await.map_err(ComplaintError::UpdateFailed)?;
        txn.commit().await.map_err(ComplaintError::UpdateFailed)?;
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::{MemoryStore, MemoryTransaction};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    fn submission(product_id: &str, reporter: &str, content: &str) -> NewComplaint {
        NewComplaint {
            product_id: product_id.into(),
            content: content.into(),
            reporter: reporter.into(),
            country: "Poland".into(),
        }
    }

    fn service() -> ComplaintService<MemoryStore> {
        ComplaintService::new(MemoryStore::new())
    }

    /// Store wrapper used the way the original suite used repository mocks:
    /// counts saves, can be switched to fail them, and can present a record
    /// from the natural-key lookup that no longer exists behind it.
    #[derive(Clone)]
    struct TestStore {
        inner: MemoryStore,
        saves: Arc<AtomicUsize>,
        fail_saves: Arc<AtomicBool>,
        ghost: Option<Complaint>,
    }

    impl TestStore {
        fn new() -> Self {
            TestStore {
                inner: MemoryStore::new(),
                saves: Arc::new(AtomicUsize::new(0)),
                fail_saves: Arc::new(AtomicBool::new(false)),
                ghost: None,
            }
        }
    }

    struct TestTransaction {
        inner: MemoryTransaction,
        saves: Arc<AtomicUsize>,
        fail_saves: Arc<AtomicBool>,
        ghost: Option<Complaint>,
    }

    #[async_trait]
    impl ComplaintStore for TestStore {
        type Txn = TestTransaction;

        async fn begin(&self) -> Result<Self::Txn, StoreError> {
            Ok(TestTransaction {
                inner: self.inner.begin().await?,
                saves: self.saves.clone(),
                fail_saves: self.fail_saves.clone(),
                ghost: self.ghost.clone(),
            })
        }
    }

    #[async_trait]
    impl StoreTransaction for TestTransaction {
        async fn find_by_natural_key(
            &self,
            product_id: &str,
            reporter: &str,
        ) -> Result<Option<Complaint>, StoreError> {
            if let Some(ghost) = &self.ghost
                && ghost.product_id == product_id
                && ghost.reporter == reporter
            {
                return Ok(Some(ghost.clone()));
            }
            self.inner.find_by_natural_key(product_id, reporter).await
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<Complaint>, StoreError> {
            self.inner.find_by_id(id).await
        }

        async fn find_by_id_for_update(&mut self, id: Uuid) -> Result<Complaint, StoreError> {
            self.inner.find_by_id_for_update(id).await
        }

        async fn save(&mut self, complaint: Complaint) -> Result<Complaint, StoreError> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("connection lost".into()));
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.inner.save(complaint).await
        }

        async fn list_page(
            &self,
            offset: usize,
            limit: usize,
            order: SortOrder,
        ) -> Result<Vec<Complaint>, StoreError> {
            self.inner.list_page(offset, limit, order).await
        }

        async fn commit(self) -> Result<(), StoreError> {
            self.inner.commit().await
        }
    }

    #[tokio::test]
    async fn submit_creates_new_complaint() {
        let service = service();
        let complaint = service
            .submit(submission("p1", "r1", "arrived broken"))
            .await
            .unwrap();

        assert!(!complaint.id.is_nil());
        assert_eq!(complaint.report_count, 1);
        assert_eq!(complaint.country, "Poland");
        assert_eq!(complaint.content, "arrived broken");
    }

    #[tokio::test]
    async fn repeated_submissions_fold_into_one_record() {
        let service = service();
        service.submit(submission("p1", "r1", "c1")).await.unwrap();
        service.submit(submission("p1", "r1", "c2")).await.unwrap();
        let third = service.submit(submission("p1", "r1", "c3")).await.unwrap();

        assert_eq!(third.report_count, 3);
        // The dedup path never touches content.
        assert_eq!(third.content, "c1");

        let all = service.list(0, DEFAULT_PAGE_SIZE).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].report_count, 3);
    }

    #[tokio::test]
    async fn duplicate_submission_keeps_original_country() {
        let service = service();
        let first = service.submit(submission("p1", "r1", "c1")).await.unwrap();

        let mut duplicate = submission("p1", "r1", "c1");
        duplicate.country = "Germany".into();
        let second = service.submit(duplicate).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.country, "Poland");
    }

    #[tokio::test]
    async fn different_reporters_get_separate_records() {
        let service = service();
        service.submit(submission("p1", "r1", "c1")).await.unwrap();
        service.submit(submission("p1", "r2", "c1")).await.unwrap();

        let all = service.list(0, DEFAULT_PAGE_SIZE).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|c| c.report_count == 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submissions_yield_one_record_with_full_count() {
        const SUBMISSIONS: usize = 16;

        let service = Arc::new(service());
        let mut handles = Vec::new();
        for _ in 0..SUBMISSIONS {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.submit(submission("p1", "r1", "c1")).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let all = service.list(0, DEFAULT_PAGE_SIZE).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].report_count, SUBMISSIONS as u32);
    }

    #[tokio::test]
    async fn get_unknown_id_yields_not_found() {
        let service = service();
        let id = Uuid::new_v4();
        assert!(matches!(
            service.get(id).await,
            Err(ComplaintError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn update_unknown_id_yields_not_found() {
        let service = service();
        let id = Uuid::new_v4();
        assert!(matches!(
            service.update_content(id, Some("new content".into())).await,
            Err(ComplaintError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn update_replaces_content_only() {
        let service = service();
        let created = service.submit(submission("p1", "r1", "c1")).await.unwrap();

        let updated = service
            .update_content(created.id, Some("better description".into()))
            .await
            .unwrap();

        assert_eq!(updated.content, "better description");
        assert_eq!(updated.report_count, created.report_count);
        assert_eq!(updated.country, created.country);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn empty_update_is_a_noop_without_a_save() {
        let store = TestStore::new();
        let service = ComplaintService::new(store.clone());
        let created = service.submit(submission("p1", "r1", "c1")).await.unwrap();
        let saves_after_create = store.saves.load(Ordering::SeqCst);

        let unchanged = service.update_content(created.id, None).await.unwrap();
        assert_eq!(unchanged, created);

        let unchanged = service
            .update_content(created.id, Some(String::new()))
            .await
            .unwrap();
        assert_eq!(unchanged, created);

        assert_eq!(store.saves.load(Ordering::SeqCst), saves_after_create);
    }

    #[tokio::test]
    async fn not_found_from_locked_reread_is_not_wrapped() {
        // The natural-key lookup reports a record that is gone by the time
        // the locked read runs.
        let mut store = TestStore::new();
        store.ghost = Some(Complaint {
            id: Uuid::new_v4(),
            product_id: "p1".into(),
            content: "c1".into(),
            created_at: chrono::Utc::now(),
            reporter: "r1".into(),
            country: "Poland".into(),
            report_count: 1,
        });
        let ghost_id = store.ghost.as_ref().unwrap().id;
        let service = ComplaintService::new(store);

        assert!(matches!(
            service.submit(submission("p1", "r1", "c1")).await,
            Err(ComplaintError::NotFound(id)) if id == ghost_id
        ));
    }

    #[tokio::test]
    async fn store_failure_during_submit_is_creation_failed() {
        let store = TestStore::new();
        store.fail_saves.store(true, Ordering::SeqCst);
        let service = ComplaintService::new(store);

        assert!(matches!(
            service.submit(submission("p1", "r1", "c1")).await,
            Err(ComplaintError::CreationFailed(StoreError::Backend(_)))
        ));
    }

    #[tokio::test]
    async fn store_failure_during_update_is_update_failed() {
        let store = TestStore::new();
        let service = ComplaintService::new(store.clone());
        let created = service.submit(submission("p1", "r1", "c1")).await.unwrap();

        store.fail_saves.store(true, Ordering::SeqCst);
        assert!(matches!(
            service.update_content(created.id, Some("new".into())).await,
            Err(ComplaintError::UpdateFailed(StoreError::Backend(_)))
        ));
    }

    #[tokio::test]
    async fn list_pages_newest_first() {
        let service = service();
        for n in 0..3 {
            service
                .submit(submission(&format!("p{n}"), "r1", "c"))
                .await
                .unwrap();
            sleep(Duration::from_millis(5)).await;
        }

        let first_page = service.list(0, 2).await.unwrap();
        assert_eq!(first_page.len(), 2);
        assert_eq!(first_page[0].product_id, "p2");
        assert_eq!(first_page[1].product_id, "p1");

        let second_page = service.list(1, 2).await.unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].product_id, "p0");

        assert!(service.list(7, 10).await.unwrap().is_empty());
    }
}
