use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lake_client::{EmbeddingLocation, LakeEmbedding};
use repo_client::SourceClient;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::queue::TransformationQueue;
use super::TransformationTask;
use crate::domain::chunking::ChunkingService;
use crate::domain::embedding::EmbeddingService;
use crate::domain::error::{PipelineError, Result};
use crate::domain::traits::{DocumentStore, EmbeddingModel};
use crate::domain::transform::{extension_for_mime, TransformClient};

/// How long shutdown waits for in-flight tasks before abandoning them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const TEXT_MIME_TYPES: [&str; 8] = [
    "text/plain",
    "text/html",
    "text/xml",
    "text/csv",
    "text/markdown",
    "application/json",
    "application/xml",
    "application/javascript",
];

/// Produces the plain text of a task's source document.
#[async_trait]
pub trait TextSource: Send + Sync {
    async fn extract(&self, task: &TransformationTask) -> Result<String>;
}

/// Default [`TextSource`]: decodes text formats directly, routes everything
/// else through the extraction service via a temp file.
pub struct TextExtractor {
    repo: Arc<SourceClient>,
    transform: Arc<TransformClient>,
    transform_enabled: bool,
}

impl TextExtractor {
    pub fn new(
        repo: Arc<SourceClient>,
        transform: Arc<TransformClient>,
        transform_enabled: bool,
    ) -> Self {
        Self {
            repo,
            transform,
            transform_enabled,
        }
    }
}

#[async_trait]
impl TextSource for TextExtractor {
    async fn extract(&self, task: &TransformationTask) -> Result<String> {
        let mime = task.mime_type.as_deref();

        if is_text_mime(mime) {
            debug!(source_id = %task.source_id, mime, "Decoding text content directly");
            let content = self.repo.get_content(&task.source_id).await?;
            return Ok(String::from_utf8_lossy(&content).into_owned());
        }

        let Some(mime) = mime else {
            return Err(PipelineError::Backend(format!(
                "document {} has no mime type to transform from",
                task.source_id
            )));
        };

        if !self.transform_enabled {
            return Err(PipelineError::Backend(format!(
                "extraction service is disabled, cannot extract {} content",
                mime
            )));
        }

        info!(source_id = %task.source_id, mime, "Requesting text extraction");

        let file_name = format!("{}{}", task.source_id, extension_for_mime(mime));
        let temp_path = self
            .repo
            .download_to_temp_file(&task.source_id, &file_name)
            .await?;

        let result = self.transform.transform_to_text(&temp_path, mime).await;

        // The temp file goes away on every exit path, including extraction
        // failures.
        if let Err(e) = tokio::fs::remove_file(&temp_path).await {
            debug!(path = %temp_path.display(), error = %e, "Could not delete temp file");
        }

        result
    }
}

pub fn is_text_mime(mime_type: Option<&str>) -> bool {
    let Some(mime) = mime_type else {
        return false;
    };
    TEXT_MIME_TYPES.contains(&mime)
        || mime.starts_with("text/")
        || mime.ends_with("+xml")
        || mime.ends_with("+json")
}

/// Everything a worker needs to process tasks.
pub struct WorkerContext<X, S, M> {
    pub queue: Arc<TransformationQueue>,
    pub extractor: Arc<X>,
    pub store: Arc<S>,
    pub chunking: Arc<ChunkingService>,
    pub embedding: Arc<EmbeddingService<M>>,
}

impl<X, S, M> Clone for WorkerContext<X, S, M> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            extractor: self.extractor.clone(),
            store: self.store.clone(),
            chunking: self.chunking.clone(),
            embedding: self.embedding.clone(),
        }
    }
}

/// Fixed-size pool of workers draining the transformation queue.
pub struct TransformWorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl TransformWorkerPool {
    pub fn start<X, S, M>(worker_count: usize, ctx: WorkerContext<X, S, M>) -> Self
    where
        X: TextSource + 'static,
        S: DocumentStore + 'static,
        M: EmbeddingModel + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handles = (0..worker_count.max(1))
            .map(|worker| {
                let ctx = ctx.clone();
                let mut shutdown = shutdown_rx.clone();
                tokio::spawn(async move {
                    info!(worker, "Transformation worker started");
                    loop {
                        tokio::select! {
                            _ = shutdown.changed() => break,
                            task = ctx.queue.dequeue() => match task {
                                Some(task) => process_task(&ctx, &task).await,
                                None => break,
                            },
                        }
                    }
                    info!(worker, "Transformation worker stopped");
                })
            })
            .collect();

        info!(workers = worker_count.max(1), "Started transformation workers");

        Self {
            handles,
            shutdown_tx,
        }
    }

    /// Stops the accept loops, then waits up to the grace period for
    /// in-flight tasks before abandoning them.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);

        for mut handle in self.handles {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
                Ok(_) => {}
                Err(_) => {
                    warn!("Transformation worker did not stop within the grace period");
                    handle.abort();
                }
            }
        }
    }
}

async fn process_task<X, S, M>(ctx: &WorkerContext<X, S, M>, task: &TransformationTask)
where
    X: TextSource,
    S: DocumentStore,
    M: EmbeddingModel,
{
    debug!(source_id = %task.source_id, "Processing transformation task");

    match run_task(ctx, task).await {
        Ok(embeddings) => {
            ctx.queue.mark_completed();
            info!(
                source_id = %task.source_id,
                embeddings, "Completed transformation"
            );
        }
        Err(e) => {
            error!(source_id = %task.source_id, error = %e, "Failed transformation");
            let failure = json!({ "syncStatus": "Failed", "syncError": e.to_string() });
            if let Err(update_err) = ctx.store.update_document(&task.lake_id, failure).await {
                debug!(
                    lake_id = %task.lake_id,
                    error = %update_err,
                    "Could not record failure status"
                );
            }
            ctx.queue.mark_failed();
        }
    }
}

/// Extract → chunk → embed → replace. Returns the number of embeddings
/// written.
async fn run_task<X, S, M>(
    ctx: &WorkerContext<X, S, M>,
    task: &TransformationTask,
) -> Result<usize>
where
    X: TextSource,
    S: DocumentStore,
    M: EmbeddingModel,
{
    let text = ctx.extractor.extract(task).await?;

    if text.trim().is_empty() {
        warn!(
            source_id = %task.source_id,
            mime = task.mime_type.as_deref(),
            "Extraction produced empty text"
        );
        mark_indexed(ctx, task, None).await;
        return Ok(0);
    }

    let chunks = ctx
        .chunking
        .chunk(&text, &task.source_id, task.mime_type.as_deref());

    info!(
        source_id = %task.source_id,
        mime = task.mime_type.as_deref(),
        text_len = text.len(),
        chunks = chunks.len(),
        "Chunked extracted text"
    );

    if chunks.is_empty() {
        mark_indexed(ctx, task, Some(&text)).await;
        return Ok(0);
    }

    let context = document_context(task);
    let embedded = ctx
        .embedding
        .embed_chunks(&chunks, context.as_deref())
        .await?;

    let lake_embeddings: Vec<LakeEmbedding> = embedded
        .iter()
        .map(|e| LakeEmbedding {
            embedding_type: ctx.embedding.model_name().to_string(),
            text: e.chunk.text.clone(),
            vector: e.vector.clone(),
            location: Some(EmbeddingLocation::paragraph(e.chunk.index)),
        })
        .collect();

    // Replace order within one task: clear old embeddings (best-effort),
    // write the new list, then the full text. Readers may observe
    // intermediate states between the calls.
    if let Err(e) = ctx.store.delete_embeddings(&task.lake_id).await {
        debug!(lake_id = %task.lake_id, error = %e, "No existing embeddings to delete");
    }

    ctx.store
        .update_embeddings(&task.lake_id, &lake_embeddings)
        .await?;

    ctx.store
        .update_document(
            &task.lake_id,
            json!({ "fullText": text, "syncStatus": "Indexed" }),
        )
        .await?;

    Ok(lake_embeddings.len())
}

/// Flips the document to its terminal state when there is nothing to embed.
async fn mark_indexed<X, S, M>(
    ctx: &WorkerContext<X, S, M>,
    task: &TransformationTask,
    full_text: Option<&str>,
) where
    X: TextSource,
    S: DocumentStore,
    M: EmbeddingModel,
{
    let payload = match full_text {
        Some(text) => json!({ "fullText": text, "syncStatus": "Indexed" }),
        None => json!({ "syncStatus": "Indexed" }),
    };
    if let Err(e) = ctx.store.update_document(&task.lake_id, payload).await {
        debug!(lake_id = %task.lake_id, error = %e, "Could not record indexed status");
    }
}

/// Metadata prefix sent to the embedding model alongside each chunk.
fn document_context(task: &TransformationTask) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(name) = task.document_name.as_deref().filter(|n| !n.trim().is_empty()) {
        parts.push(format!("Document: {}", name));
    }
    if let Some(path) = task.document_path.as_deref().filter(|p| !p.trim().is_empty()) {
        parts.push(format!("Path: {}", path));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chunking::{AdaptiveChunking, ChunkingConfig, NoiseReduction};
    use crate::domain::embedding::mock::MockEmbeddingModel;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug)]
    enum StoreOp {
        DeleteEmbeddings,
        UpdateEmbeddings(Vec<LakeEmbedding>),
        UpdateDocument(Value),
    }

    #[derive(Default)]
    struct RecordingStore {
        ops: Mutex<Vec<StoreOp>>,
        fail_update_embeddings: bool,
    }

    impl RecordingStore {
        fn failing_embeddings() -> Self {
            Self {
                fail_update_embeddings: true,
                ..Default::default()
            }
        }

        fn ops(&self) -> std::sync::MutexGuard<'_, Vec<StoreOp>> {
            self.ops.lock().unwrap()
        }
    }

    #[async_trait]
    impl DocumentStore for RecordingStore {
        async fn delete_embeddings(&self, _lake_id: &str) -> Result<()> {
            self.ops.lock().unwrap().push(StoreOp::DeleteEmbeddings);
            Ok(())
        }

        async fn update_embeddings(
            &self,
            _lake_id: &str,
            embeddings: &[LakeEmbedding],
        ) -> Result<()> {
            if self.fail_update_embeddings {
                return Err(PipelineError::Backend("lake write failed".to_string()));
            }
            self.ops
                .lock()
                .unwrap()
                .push(StoreOp::UpdateEmbeddings(embeddings.to_vec()));
            Ok(())
        }

        async fn update_document(&self, _lake_id: &str, payload: Value) -> Result<()> {
            self.ops
                .lock()
                .unwrap()
                .push(StoreOp::UpdateDocument(payload));
            Ok(())
        }
    }

    struct ScriptedTextSource {
        texts: HashMap<String, String>,
        fail: bool,
    }

    impl ScriptedTextSource {
        fn with_text(source_id: &str, text: &str) -> Self {
            let mut texts = HashMap::new();
            texts.insert(source_id.to_string(), text.to_string());
            Self { texts, fail: false }
        }

        fn failing() -> Self {
            Self {
                texts: HashMap::new(),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl TextSource for ScriptedTextSource {
        async fn extract(&self, task: &TransformationTask) -> Result<String> {
            if self.fail {
                return Err(PipelineError::Backend("extraction failed".to_string()));
            }
            Ok(self
                .texts
                .get(&task.source_id)
                .cloned()
                .unwrap_or_default())
        }
    }

    fn context(
        extractor: ScriptedTextSource,
        store: RecordingStore,
    ) -> WorkerContext<ScriptedTextSource, RecordingStore, MockEmbeddingModel> {
        WorkerContext {
            queue: Arc::new(TransformationQueue::new(10)),
            extractor: Arc::new(extractor),
            store: Arc::new(store),
            chunking: Arc::new(ChunkingService::new(
                NoiseReduction::new(false),
                ChunkingConfig::default(),
                Box::new(AdaptiveChunking),
            )),
            embedding: Arc::new(EmbeddingService::new(
                MockEmbeddingModel::new(8),
                "test-model",
                true,
            )),
        }
    }

    fn task() -> TransformationTask {
        TransformationTask::new(
            "node-1",
            "lake-1",
            Some("text/plain".to_string()),
            Some("report.pdf".to_string()),
            Some("/Company Home/Reports".to_string()),
        )
    }

    #[tokio::test]
    async fn successful_task_replaces_embeddings_then_fulltext() {
        let text = "A sentence about budgets. Another sentence about schedules.";
        let ctx = context(
            ScriptedTextSource::with_text("node-1", text),
            RecordingStore::default(),
        );

        process_task(&ctx, &task()).await;

        let ops = ctx.store.ops();
        assert!(matches!(ops[0], StoreOp::DeleteEmbeddings));
        let StoreOp::UpdateEmbeddings(embeddings) = &ops[1] else {
            panic!("expected embeddings update, got {:?}", ops[1]);
        };
        assert_eq!(embeddings.len(), 1);
        assert_eq!(embeddings[0].embedding_type, "test-model");
        assert_eq!(embeddings[0].vector.len(), 8);
        assert_eq!(
            embeddings[0]
                .location
                .as_ref()
                .unwrap()
                .text
                .as_ref()
                .unwrap()
                .paragraph,
            Some(0)
        );

        let StoreOp::UpdateDocument(payload) = &ops[2] else {
            panic!("expected document update, got {:?}", ops[2]);
        };
        assert_eq!(payload["fullText"], text);
        assert_eq!(payload["syncStatus"], "Indexed");

        let stats = ctx.queue.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn stored_chunk_text_has_no_document_context() {
        let text = "Chunk body without any prefix.";
        let ctx = context(
            ScriptedTextSource::with_text("node-1", text),
            RecordingStore::default(),
        );

        process_task(&ctx, &task()).await;

        let ops = ctx.store.ops();
        let StoreOp::UpdateEmbeddings(embeddings) = &ops[1] else {
            panic!("expected embeddings update");
        };
        assert!(!embeddings[0].text.contains("Document:"));
        assert!(!embeddings[0].text.contains("Path:"));
    }

    #[tokio::test]
    async fn blank_text_completes_and_indexes_without_embeddings() {
        let ctx = context(
            ScriptedTextSource::with_text("node-1", "   \n  "),
            RecordingStore::default(),
        );

        process_task(&ctx, &task()).await;

        let ops = ctx.store.ops();
        assert_eq!(ops.len(), 1);
        let StoreOp::UpdateDocument(payload) = &ops[0] else {
            panic!("expected document update");
        };
        assert_eq!(payload["syncStatus"], "Indexed");
        assert!(payload.get("fullText").is_none());

        assert_eq!(ctx.queue.stats().completed, 1);
    }

    #[tokio::test]
    async fn extraction_failure_marks_task_failed() {
        let ctx = context(ScriptedTextSource::failing(), RecordingStore::default());

        process_task(&ctx, &task()).await;

        let stats = ctx.queue.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 0);

        let ops = ctx.store.ops();
        let StoreOp::UpdateDocument(payload) = &ops[0] else {
            panic!("expected failure status update");
        };
        assert_eq!(payload["syncStatus"], "Failed");
        assert!(payload["syncError"].as_str().unwrap().contains("extraction"));
    }

    #[tokio::test]
    async fn lake_write_failure_marks_task_failed() {
        let ctx = context(
            ScriptedTextSource::with_text("node-1", "Some content to embed."),
            RecordingStore::failing_embeddings(),
        );

        process_task(&ctx, &task()).await;

        assert_eq!(ctx.queue.stats().failed, 1);
    }

    #[tokio::test]
    async fn pool_drains_queue_and_shuts_down() {
        let text = "Worker pool content. It gets chunked and embedded.";
        let ctx = context(
            ScriptedTextSource::with_text("node-1", text),
            RecordingStore::default(),
        );

        ctx.queue.enqueue(task()).await.unwrap();
        let pool = TransformWorkerPool::start(2, ctx.clone());

        // Give the workers a moment to drain the task.
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if ctx.queue.stats().completed >= 1 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("task should complete");

        pool.shutdown().await;
        assert_eq!(ctx.queue.stats().completed, 1);
    }

    #[test]
    fn text_mime_detection() {
        assert!(is_text_mime(Some("text/plain")));
        assert!(is_text_mime(Some("text/x-custom")));
        assert!(is_text_mime(Some("application/json")));
        assert!(is_text_mime(Some("application/atom+xml")));
        assert!(is_text_mime(Some("application/ld+json")));
        assert!(!is_text_mime(Some("application/pdf")));
        assert!(!is_text_mime(None));
    }

    #[test]
    fn document_context_joins_name_and_path() {
        assert_eq!(
            document_context(&task()).unwrap(),
            "Document: report.pdf | Path: /Company Home/Reports"
        );

        let bare = TransformationTask::new("n", "l", None, None, None);
        assert!(document_context(&bare).is_none());

        let name_only = TransformationTask::new("n", "l", None, Some("a.pdf".to_string()), None);
        assert_eq!(document_context(&name_only).unwrap(), "Document: a.pdf");
    }
}
