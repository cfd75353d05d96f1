//! Chat topic lookup used to size an extraction batch.

use chrono::{DateTime, Utc};
use memoria_types::TopicId;
use memoria_types::error::RepositoryError;

/// Which topics of a user are eligible for extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicQuery {
    pub user_id: String,
    /// Inclusive lower bound on topic creation time.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on topic creation time.
    pub to: Option<DateTime<Utc>>,
    /// Include topics whose memories were already extracted.
    pub include_extracted: bool,
}

pub trait TopicRepository: Send + Sync {
    /// Eligible topic IDs, oldest first.
    fn list_eligible_topics(
        &self,
        query: &TopicQuery,
    ) -> impl std::future::Future<Output = Result<Vec<TopicId>, RepositoryError>> + Send;
}
