use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

/// One ingestion job with monotonically non-decreasing counters.
pub struct IngestionJob {
    pub id: String,
    pub started_at: OffsetDateTime,
    status: Mutex<JobStatus>,
    completed_at: Mutex<Option<OffsetDateTime>>,
    discovered: AtomicU64,
    ingested: AtomicU64,
    failed: AtomicU64,
}

impl IngestionJob {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            started_at: OffsetDateTime::now_utc(),
            status: Mutex::new(JobStatus::Running),
            completed_at: Mutex::new(None),
            discovered: AtomicU64::new(0),
            ingested: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn increment_discovered(&self) {
        self.discovered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_ingested(&self) {
        self.ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn complete(&self) {
        *self.status.lock().unwrap() = JobStatus::Completed;
        *self.completed_at.lock().unwrap() = Some(OffsetDateTime::now_utc());
    }

    pub fn fail(&self) {
        *self.status.lock().unwrap() = JobStatus::Failed;
        *self.completed_at.lock().unwrap() = Some(OffsetDateTime::now_utc());
    }

    pub fn status(&self) -> JobStatus {
        *self.status.lock().unwrap()
    }

    pub fn discovered(&self) -> u64 {
        self.discovered.load(Ordering::Relaxed)
    }

    pub fn ingested(&self) -> u64 {
        self.ingested.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> IngestionJobView {
        IngestionJobView {
            job_id: self.id.clone(),
            status: self.status(),
            started_at: self.started_at,
            completed_at: *self.completed_at.lock().unwrap(),
            discovered_count: self.discovered(),
            ingested_count: self.ingested(),
            failed_count: self.failed(),
        }
    }
}

impl Default for IngestionJob {
    fn default() -> Self {
        Self::new()
    }
}

/// JSON-facing projection of a job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionJobView {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    pub discovered_count: u64,
    pub ingested_count: u64,
    pub failed_count: u64,
}

/// Tracks jobs by id for status inspection.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, std::sync::Arc<IngestionJob>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, job: std::sync::Arc<IngestionJob>) {
        self.jobs.write().await.insert(job.id.clone(), job);
    }

    pub async fn get(&self, job_id: &str) -> Option<std::sync::Arc<IngestionJob>> {
        self.jobs.read().await.get(job_id).cloned()
    }

    pub async fn snapshot_all(&self) -> Vec<IngestionJobView> {
        let jobs = self.jobs.read().await;
        let mut views: Vec<IngestionJobView> = jobs.values().map(|j| j.snapshot()).collect();
        views.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        views
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counters_accumulate() {
        let job = IngestionJob::new();
        job.increment_discovered();
        job.increment_discovered();
        job.increment_ingested();
        job.increment_failed();

        assert_eq!(job.discovered(), 2);
        assert_eq!(job.ingested(), 1);
        assert_eq!(job.failed(), 1);
        assert_eq!(job.status(), JobStatus::Running);
    }

    #[test]
    fn completion_sets_status_and_timestamp() {
        let job = IngestionJob::new();
        job.complete();

        let view = job.snapshot();
        assert_eq!(view.status, JobStatus::Completed);
        assert!(view.completed_at.is_some());
    }

    #[tokio::test]
    async fn registry_returns_registered_jobs() {
        let registry = JobRegistry::new();
        let job = Arc::new(IngestionJob::new());
        let id = job.id.clone();

        registry.register(job).await;
        assert!(registry.get(&id).await.is_some());
        assert!(registry.get("missing").await.is_none());
        assert_eq!(registry.snapshot_all().await.len(), 1);
    }
}
