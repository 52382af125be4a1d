use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one execution of the migration pipeline.
///
/// Immutable once created. The id is stamped onto every derived chunk
/// document so documents from stale runs remain distinguishable; deleting
/// documents from prior runs is a separately-specified future extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlRun {
    pub id: String,
    /// Expected total document count, `-1` when unknown.
    pub expected_total: i64,
    /// Derived page count, `-1` when the total is unknown.
    pub pages: i64,
}

impl CrawlRun {
    pub fn new(id: impl Into<String>, expected_total: i64, pages: i64) -> Self {
        Self {
            id: id.into(),
            expected_total,
            pages,
        }
    }

    pub fn generate_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn total_is_known(&self) -> bool {
        self.expected_total >= 0
    }
}
