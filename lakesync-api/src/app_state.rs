use std::sync::Arc;

use lake_client::LakeClient;
use repo_client::SourceClient;

use crate::domain::chat::OpenAiChatModel;
use crate::domain::embedding::OpenAiEmbeddingModel;
use crate::domain::ingest::{BatchIngestionService, TransformationQueue};
use crate::domain::rag::RagService;
use crate::domain::search::SemanticSearchService;

pub type SearchServiceImpl = SemanticSearchService<OpenAiEmbeddingModel, LakeClient, SourceClient>;
pub type RagServiceImpl =
    RagService<OpenAiEmbeddingModel, LakeClient, SourceClient, OpenAiChatModel>;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<SourceClient>,
    pub lake: Arc<LakeClient>,
    pub queue: Arc<TransformationQueue>,
    pub ingestion: Arc<BatchIngestionService>,
    pub search: Arc<SearchServiceImpl>,
    pub rag: Arc<RagServiceImpl>,
    pub embedding_model_name: String,
    pub chat_model_name: String,
}

impl AppState {
    pub fn embedding_model_name(&self) -> &str {
        &self.embedding_model_name
    }
}
