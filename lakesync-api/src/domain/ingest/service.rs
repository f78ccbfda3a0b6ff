use std::sync::Arc;

use futures::StreamExt;
use lake_client::LakeClient;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{error, info};

use super::ingester::MetadataIngester;
use super::job::{IngestionJob, JobRegistry};
use super::queue::TransformationQueue;
use crate::config::SourceFolderSettings;
use crate::domain::discovery::{Discovery, DiscoveryRoot};

/// Parameters of an ad-hoc batch synchronization.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSyncRequest {
    pub folders: Vec<String>,
    #[serde(default = "default_recursive")]
    pub recursive: bool,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub mime_types: Vec<String>,
}

fn default_recursive() -> bool {
    true
}

impl BatchSyncRequest {
    fn roots(&self) -> Vec<DiscoveryRoot> {
        self.folders
            .iter()
            .map(|folder| DiscoveryRoot {
                folder: folder.clone(),
                recursive: self.recursive,
                types: self.types.clone(),
                mime_types: self.mime_types.clone(),
            })
            .collect()
    }
}

/// Orchestrates asynchronous ingestion jobs: discovery feeds the metadata
/// ingester, which feeds the transformation queue. Jobs run on spawned tasks
/// gated by a small permit pool so ingestion stays effectively serial.
pub struct BatchIngestionService {
    discovery: Arc<Discovery>,
    ingester: Arc<MetadataIngester>,
    queue: Arc<TransformationQueue>,
    jobs: Arc<JobRegistry>,
    lake: Arc<LakeClient>,
    configured_sources: Vec<SourceFolderSettings>,
    job_permits: Arc<Semaphore>,
}

impl BatchIngestionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        discovery: Arc<Discovery>,
        ingester: Arc<MetadataIngester>,
        queue: Arc<TransformationQueue>,
        jobs: Arc<JobRegistry>,
        lake: Arc<LakeClient>,
        configured_sources: Vec<SourceFolderSettings>,
        max_concurrent_jobs: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            discovery,
            ingester,
            queue,
            jobs,
            lake,
            configured_sources,
            job_permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        })
    }

    /// Starts a batch synchronization over the requested folders.
    pub async fn start_batch_sync(self: Arc<Self>, request: BatchSyncRequest) -> Arc<IngestionJob> {
        let roots = request.roots();
        self.start_job("batch sync", roots).await
    }

    /// Starts a synchronization over the configured sources.
    pub async fn start_configured_sync(self: Arc<Self>) -> Arc<IngestionJob> {
        let roots = self.configured_sources.iter().map(DiscoveryRoot::from).collect();
        self.start_job("configured sync", roots).await
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.jobs
    }

    async fn start_job(self: Arc<Self>, label: &str, roots: Vec<DiscoveryRoot>) -> Arc<IngestionJob> {
        let job = Arc::new(IngestionJob::new());
        self.jobs.register(job.clone()).await;

        info!(job_id = %job.id, label, "Starting ingestion job");

        let service = self;
        let spawned_job = job.clone();
        tokio::spawn(async move {
            let _permit = service
                .job_permits
                .clone()
                .acquire_owned()
                .await
                .expect("job permit semaphore closed");
            service.run_sync(spawned_job, roots).await;
        });

        job
    }

    async fn run_sync(&self, job: Arc<IngestionJob>, roots: Vec<DiscoveryRoot>) {
        if let Err(e) = self.lake.ensure_folder(self.ingester.target_path()).await {
            error!(job_id = %job.id, error = %e, "Could not prepare target folder");
            job.fail();
            return;
        }

        let mut stream = self.discovery.stream(roots);

        while let Some(item) = stream.next().await {
            let node = match item {
                Ok(node) => node,
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "Discovery failed");
                    job.fail();
                    return;
                }
            };

            job.increment_discovered();

            match self.ingester.ingest(&node).await {
                Ok(task) => {
                    job.increment_ingested();
                    if let Err(e) = self.queue.enqueue(task).await {
                        error!(node_id = %node.id, error = %e, "Could not enqueue transformation");
                        job.increment_failed();
                    }
                }
                Err(e) => {
                    job.increment_failed();
                    error!(node_id = %node.id, error = %e, "Failed to ingest metadata");
                }
            }
        }

        job.complete();
        info!(
            job_id = %job.id,
            discovered = job.discovered(),
            ingested = job.ingested(),
            failed = job.failed(),
            "Ingestion job completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_request_defaults_to_recursive() {
        let request: BatchSyncRequest =
            serde_json::from_str(r#"{ "folders": ["folder-1"] }"#).unwrap();
        assert!(request.recursive);
        assert!(request.types.is_empty());
        assert!(request.mime_types.is_empty());
    }

    #[test]
    fn batch_request_fans_out_to_roots() {
        let request: BatchSyncRequest = serde_json::from_str(
            r#"{
                "folders": ["f1", "f2"],
                "recursive": false,
                "mimeTypes": ["application/pdf"]
            }"#,
        )
        .unwrap();

        let roots = request.roots();
        assert_eq!(roots.len(), 2);
        assert!(!roots[0].recursive);
        assert_eq!(roots[1].folder, "f2");
        assert_eq!(roots[0].mime_types, vec!["application/pdf".to_string()]);
    }
}
