use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A recorded complaint. Repeated submissions for the same
/// (`product_id`, `reporter`) pair collapse into one record whose
/// `report_count` tracks the number of submissions.
#[derive(Debug, Clone, PartialEq)]
pub struct Complaint {
    pub id: Uuid,
    pub product_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub reporter: String,
    /// Derived from the submitter's network address at creation time and
    /// never re-derived afterwards.
    pub country: String,
    pub report_count: u32,
}

impl Complaint {
    /// A draft record; the store assigns `id` and `created_at` at first save.
    pub fn draft(product_id: String, content: String, reporter: String, country: String) -> Self {
        Complaint {
            id: Uuid::nil(),
            product_id,
            content,
            created_at: Utc::now(),
            reporter,
            country,
            report_count: 1,
        }
    }

    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            product_id: self.product_id.clone(),
            reporter: self.reporter.clone(),
        }
    }
}

/// Identifies the logical complaint for deduplication, as opposed to the
/// generated `id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    pub product_id: String,
    pub reporter: String,
}
