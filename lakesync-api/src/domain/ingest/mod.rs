//! The two-phase ingestion pipeline: metadata ingestion feeding a bounded
//! queue of transformation tasks drained by a worker pool.

mod ingester;
mod job;
mod queue;
mod service;
mod worker;

pub use ingester::MetadataIngester;
pub use job::{IngestionJob, IngestionJobView, JobRegistry, JobStatus};
pub use queue::{QueueStats, TransformationQueue};
pub use service::{BatchIngestionService, BatchSyncRequest};
pub use worker::{TextExtractor, TextSource, TransformWorkerPool, WorkerContext};

use time::OffsetDateTime;

/// Unit of work handed from metadata ingestion to the transformation workers.
#[derive(Debug, Clone)]
pub struct TransformationTask {
    pub source_id: String,
    pub lake_id: String,
    pub mime_type: Option<String>,
    /// Original document name, used for metadata-enriched embedding.
    pub document_name: Option<String>,
    /// Source repository path, used for metadata-enriched embedding.
    pub document_path: Option<String>,
    pub created_at: OffsetDateTime,
    pub retry_count: u32,
}

impl TransformationTask {
    pub fn new(
        source_id: impl Into<String>,
        lake_id: impl Into<String>,
        mime_type: Option<String>,
        document_name: Option<String>,
        document_path: Option<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            lake_id: lake_id.into(),
            mime_type,
            document_name,
            document_path,
            created_at: OffsetDateTime::now_utc(),
            retry_count: 0,
        }
    }
}
